//! Profile cache with single-flight fetches.

use std::collections::HashMap;
use std::sync::Arc;

use livechat_domain::{KIND_METADATA, Profile, ProfileContent, RelaySet};
use livechat_relay::RelayTransport;
use nostr::{Filter, Kind, PublicKey};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::Revision;

/// Identity → profile. A placeholder entry marks a fetch that is in flight or failed.
#[derive(Clone)]
pub struct ProfileResolver {
	cache: Arc<Mutex<HashMap<String, Profile>>>,
	transport: Arc<dyn RelayTransport>,
	revision: Revision,
}

impl ProfileResolver {
	pub fn new(transport: Arc<dyn RelayTransport>, revision: Revision) -> Self {
		Self {
			cache: Arc::new(Mutex::new(HashMap::new())),
			transport,
			revision,
		}
	}

	/// Start fetching `identity`'s metadata unless it was already requested.
	///
	/// The placeholder is inserted before the fetch is spawned, so concurrent callers for the
	/// same identity issue at most one request. Identities that are not hex public keys are never
	/// fetched. Returns whether a fetch was started.
	pub fn resolve_if_needed(&self, identity: &str, relays: &RelaySet) -> bool {
		if identity.is_empty() {
			return false;
		}
		let public_key = match PublicKey::from_hex(identity) {
			Ok(public_key) => public_key,
			Err(err) => {
				debug!(identity = %identity, error = %err, "not a public key; skipping profile fetch");
				return false;
			}
		};

		{
			let mut cache = self.cache.lock();
			if cache.contains_key(identity) {
				return false;
			}
			cache.insert(identity.to_string(), Profile::placeholder(identity));
		}

		metrics::counter!("livechat_profile_fetches_total").increment(1);
		tokio::spawn(fetch_profile(
			self.transport.clone(),
			self.cache.clone(),
			self.revision.clone(),
			identity.to_string(),
			public_key,
			relays.clone(),
		));
		true
	}

	pub fn get(&self, identity: &str) -> Option<Profile> {
		self.cache.lock().get(identity).cloned()
	}

	/// Run `f` against the cache while holding its lock.
	pub fn with_cache<R>(&self, f: impl FnOnce(&HashMap<String, Profile>) -> R) -> R {
		f(&self.cache.lock())
	}
}

async fn fetch_profile(
	transport: Arc<dyn RelayTransport>,
	cache: Arc<Mutex<HashMap<String, Profile>>>,
	revision: Revision,
	identity: String,
	public_key: PublicKey,
	relays: RelaySet,
) {
	let filter = Filter::new().kind(Kind::from(KIND_METADATA)).author(public_key);

	let event = match transport.get_one(&relays, filter).await {
		Ok(Some(event)) => event,
		Ok(None) => {
			debug!(identity = %identity, "no profile metadata found");
			return;
		}
		Err(err) => {
			metrics::counter!("livechat_profile_fetch_failures_total").increment(1);
			warn!(identity = %identity, error = %err, "profile fetch failed");
			return;
		}
	};

	match ProfileContent::from_json(&event.content) {
		Ok(content) => {
			cache.lock().insert(identity.clone(), Profile::resolved(identity, content));
			revision.bump();
		}
		Err(err) => {
			metrics::counter!("livechat_profile_fetch_failures_total").increment(1);
			warn!(identity = %identity, error = %err, "invalid profile metadata");
		}
	}
}
