//! Live chat session: address → relays → three subscriptions → store → feed.

use std::sync::Arc;

use livechat_domain::{
	DEFAULT_RELAYS, FeedItem, KIND_LIVE_CHAT_MESSAGE, KIND_ZAP_RECEIPT, Profile, RawEvent, RelaySet, StreamAddress,
	StreamInfo,
};
use livechat_relay::{RelayTransport, Subscription, SubscriptionHandle, SubscriptionItem, TransportError};
use nostr::{Alphabet, Filter, Kind, PublicKey, SingleLetterTag};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::Revision;
use crate::feed::compose_feed;
use crate::profiles::ProfileResolver;
use crate::store::EventStore;

#[derive(Debug, Error)]
pub enum SessionError {
	#[error("failed to open subscriptions: {0}")]
	Transport(#[from] TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
	#[default]
	Idle,
	Connecting,
	Active,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
	/// Lowest-priority relays for every connect.
	pub default_relays: Vec<String>,
	/// Appended to the relays passed to each connect.
	pub extra_relays: Vec<String>,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			default_relays: DEFAULT_RELAYS.iter().map(|r| r.to_string()).collect(),
			extra_relays: Vec::new(),
		}
	}
}

#[derive(Debug, Clone, Copy)]
enum Route {
	Metadata,
	Chat,
	Receipt,
}

impl Route {
	fn as_str(self) -> &'static str {
		match self {
			Route::Metadata => "metadata",
			Route::Chat => "chat",
			Route::Receipt => "receipt",
		}
	}
}

#[derive(Debug, Default)]
struct SessionInner {
	state: SessionState,
	/// Bumped on every disconnect; routing tasks of older sessions are ignored.
	generation: u64,
	address: Option<StreamAddress>,
	relays: RelaySet,
	store: EventStore,
}

struct SessionShared {
	inner: Mutex<SessionInner>,
	profiles: ProfileResolver,
	revision: Revision,
}

impl SessionShared {
	fn ingest(&self, route: Route, generation: u64, event: RawEvent) {
		let mut inner = self.inner.lock();
		if inner.generation != generation {
			return;
		}

		let resolve = match route {
			Route::Metadata => {
				if inner.store.set_activity(event) {
					debug!("stream activity updated");
					None
				} else {
					return;
				}
			}
			Route::Chat => match inner.store.insert_chat(&event) {
				Some(message) => {
					metrics::counter!("livechat_chat_messages_total").increment(1);
					Some(message.author.clone())
				}
				None => {
					metrics::counter!("livechat_duplicate_events_total").increment(1);
					return;
				}
			},
			Route::Receipt => match inner.store.insert_receipt(&event) {
				Ok(Some(receipt)) => {
					metrics::counter!("livechat_zap_receipts_total").increment(1);
					Some(receipt.sender.clone())
				}
				Ok(None) => {
					metrics::counter!("livechat_duplicate_events_total").increment(1);
					return;
				}
				Err(err) => {
					metrics::counter!("livechat_zap_receipts_dropped_total").increment(1);
					debug!(event_id = %event.id, error = %err, "dropping zap receipt");
					return;
				}
			},
		};

		let relays = inner.relays.clone();
		drop(inner);

		if let Some(identity) = resolve {
			self.profiles.resolve_if_needed(&identity, &relays);
		}
		self.revision.bump();
	}
}

/// Read side of a session. Cheap to clone; always reflects the current state.
#[derive(Clone)]
pub struct SessionView {
	shared: Arc<SessionShared>,
}

impl SessionView {
	/// Merged feed, recomputed from the current messages, receipts and profiles.
	pub fn feed(&self) -> Vec<FeedItem> {
		let inner = self.shared.inner.lock();
		self.shared
			.profiles
			.with_cache(|profiles| compose_feed(inner.store.messages(), inner.store.receipts(), profiles))
	}

	pub fn state(&self) -> SessionState {
		self.shared.inner.lock().state
	}

	pub fn is_connected(&self) -> bool {
		self.state() == SessionState::Active
	}

	pub fn address(&self) -> Option<StreamAddress> {
		self.shared.inner.lock().address.clone()
	}

	pub fn relays(&self) -> RelaySet {
		self.shared.inner.lock().relays.clone()
	}

	pub fn current_activity(&self) -> Option<RawEvent> {
		self.shared.inner.lock().store.activity().cloned()
	}

	pub fn stream_info(&self) -> Option<StreamInfo> {
		self.shared.inner.lock().store.activity().map(StreamInfo::from_event)
	}

	pub fn message_count(&self) -> usize {
		self.shared.inner.lock().store.messages().len()
	}

	pub fn receipt_count(&self) -> usize {
		self.shared.inner.lock().store.receipts().len()
	}

	pub fn profile(&self, identity: &str) -> Option<Profile> {
		self.shared.profiles.get(identity)
	}

	/// Fires after every observable change.
	pub fn updates(&self) -> watch::Receiver<u64> {
		self.shared.revision.subscribe()
	}
}

/// Owns the subscriptions of at most one stream at a time.
pub struct LiveChatSession {
	transport: Arc<dyn RelayTransport>,
	config: SessionConfig,
	shared: Arc<SessionShared>,
	handles: Vec<SubscriptionHandle>,
	tasks: Vec<JoinHandle<()>>,
}

impl LiveChatSession {
	pub fn new(transport: Arc<dyn RelayTransport>) -> Self {
		Self::with_config(transport, SessionConfig::default())
	}

	pub fn with_config(transport: Arc<dyn RelayTransport>, config: SessionConfig) -> Self {
		let revision = Revision::new();
		let profiles = ProfileResolver::new(transport.clone(), revision.clone());
		Self {
			transport,
			config,
			shared: Arc::new(SessionShared {
				inner: Mutex::new(SessionInner::default()),
				profiles,
				revision,
			}),
			handles: Vec::new(),
			tasks: Vec::new(),
		}
	}

	pub fn view(&self) -> SessionView {
		SessionView {
			shared: self.shared.clone(),
		}
	}

	pub fn profiles(&self) -> &ProfileResolver {
		&self.shared.profiles
	}

	pub fn state(&self) -> SessionState {
		self.shared.inner.lock().state
	}

	pub fn is_connected(&self) -> bool {
		self.state() == SessionState::Active
	}

	pub fn feed(&self) -> Vec<FeedItem> {
		self.view().feed()
	}

	/// Tear down any current session and subscribe to the stream at `address`.
	///
	/// An undecodable address is logged and yields `Ok(None)` with the session left idle.
	/// Transport failures opening the subscriptions are returned.
	pub async fn connect(&mut self, address: &str, extra_relays: &[String]) -> Result<Option<StreamAddress>, SessionError> {
		self.disconnect();

		let addr = match StreamAddress::decode(address) {
			Ok(addr) => addr,
			Err(err) => {
				warn!(error = %err, "invalid stream address; not connecting");
				return Ok(None);
			}
		};

		let author = match PublicKey::from_hex(&addr.author) {
			Ok(author) => author,
			Err(err) => {
				warn!(error = %err, "invalid stream author; not connecting");
				return Ok(None);
			}
		};

		let relays = RelaySet::resolve(
			&addr.relay_hints,
			extra_relays.iter().chain(&self.config.extra_relays),
			&self.config.default_relays,
		);
		let coordinate = addr.coordinate();

		let generation = {
			let mut inner = self.shared.inner.lock();
			inner.state = SessionState::Connecting;
			inner.address = Some(addr.clone());
			inner.relays = relays.clone();
			inner.generation
		};
		self.shared.revision.bump();
		info!(coordinate = %coordinate, relays = relays.len(), "connecting to stream");

		let a_tag = SingleLetterTag::lowercase(Alphabet::A);
		let metadata = Filter::new()
			.kind(Kind::from(addr.kind))
			.author(author)
			.identifier(addr.identifier.clone());
		let chat = Filter::new()
			.kind(Kind::from(KIND_LIVE_CHAT_MESSAGE))
			.custom_tag(a_tag, coordinate.clone());
		let receipts = Filter::new()
			.kind(Kind::from(KIND_ZAP_RECEIPT))
			.custom_tag(a_tag, coordinate.clone());

		let opened = tokio::try_join!(
			self.transport.subscribe(&relays, metadata),
			self.transport.subscribe(&relays, chat),
			self.transport.subscribe(&relays, receipts),
		);
		let (metadata, chat, receipts) = match opened {
			Ok(subs) => subs,
			Err(err) => {
				warn!(coordinate = %coordinate, error = %err, "failed to open stream subscriptions");
				self.reset();
				return Err(err.into());
			}
		};

		self.shared.inner.lock().state = SessionState::Active;
		for (route, subscription) in [(Route::Metadata, metadata), (Route::Chat, chat), (Route::Receipt, receipts)] {
			self.track(route, generation, subscription);
		}
		self.shared.revision.bump();
		info!(coordinate = %coordinate, "stream subscriptions open");

		Ok(Some(addr))
	}

	fn track(&mut self, route: Route, generation: u64, subscription: Subscription) {
		let (handle, items) = subscription.split();
		debug!(route = route.as_str(), sub_id = %handle.id(), "tracking subscription");
		self.handles.push(handle);
		self.tasks
			.push(tokio::spawn(route_items(self.shared.clone(), route, generation, items)));
	}

	/// Close every subscription and clear messages, receipts and activity. Profiles are kept.
	/// Safe to call when idle.
	pub fn disconnect(&mut self) {
		for handle in self.handles.drain(..) {
			handle.close();
		}
		for task in self.tasks.drain(..) {
			task.abort();
		}
		if self.reset() {
			info!("disconnected");
		}
	}

	/// Returns whether there was anything to reset.
	fn reset(&self) -> bool {
		let mut inner = self.shared.inner.lock();
		let had_session = inner.state != SessionState::Idle || !inner.store.is_empty();
		inner.generation = inner.generation.wrapping_add(1);
		inner.state = SessionState::Idle;
		inner.address = None;
		inner.relays = RelaySet::default();
		inner.store.clear();
		drop(inner);

		if had_session {
			self.shared.revision.bump();
		}
		had_session
	}
}

impl Drop for LiveChatSession {
	fn drop(&mut self) {
		self.disconnect();
	}
}

async fn route_items(
	shared: Arc<SessionShared>,
	route: Route,
	generation: u64,
	mut items: mpsc::UnboundedReceiver<SubscriptionItem>,
) {
	while let Some(item) = items.recv().await {
		match item {
			SubscriptionItem::Event { event, .. } => shared.ingest(route, generation, *event),
			SubscriptionItem::EndOfStoredEvents { relay } => {
				debug!(route = route.as_str(), relay = %relay, "end of stored events");
			}
			SubscriptionItem::Closed { relay, reason } => {
				debug!(route = route.as_str(), relay = %relay, reason = %reason, "relay closed subscription");
			}
		}
	}
}
