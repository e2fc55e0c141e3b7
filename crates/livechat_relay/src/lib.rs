#![forbid(unsafe_code)]

pub mod pool;

use std::fmt;
use std::time::Duration;

use livechat_domain::{RawEvent, RelaySet};
use nostr::Filter;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;

pub use pool::{RelayPool, RelayPoolConfig};

/// Errors opening or running a subscription.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
	#[error("no relays given")]
	NoRelays,
	#[error("no valid relay url in: {0}")]
	InvalidRelayUrl(String),
	#[error("no relay reachable within {0:?}")]
	Unreachable(Duration),
	#[error("transport closed")]
	Closed,
	#[error("timed out after {0:?}")]
	Timeout(Duration),
}

/// Item delivered on a subscription. Events have a verified id and signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionItem {
	Event { relay: String, event: Box<RawEvent> },

	/// The relay finished replaying stored events.
	EndOfStoredEvents { relay: String },

	/// The relay refused or ended the subscription.
	Closed { relay: String, reason: String },
}

type CloseFn = Box<dyn FnOnce() + Send>;

/// Owned handle to an open subscription. Closing is idempotent; dropping closes.
pub struct SubscriptionHandle {
	id: String,
	on_close: Mutex<Option<CloseFn>>,
}

impl SubscriptionHandle {
	pub fn new(id: impl Into<String>, on_close: impl FnOnce() + Send + 'static) -> Self {
		Self {
			id: id.into(),
			on_close: Mutex::new(Some(Box::new(on_close))),
		}
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	pub fn close(&self) {
		let on_close = self.on_close.lock().take();
		if let Some(on_close) = on_close {
			on_close();
		}
	}

	pub fn is_closed(&self) -> bool {
		self.on_close.lock().is_none()
	}
}

impl fmt::Debug for SubscriptionHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SubscriptionHandle")
			.field("id", &self.id)
			.field("closed", &self.is_closed())
			.finish()
	}
}

impl Drop for SubscriptionHandle {
	fn drop(&mut self) {
		self.close();
	}
}

/// An open subscription: its handle plus the item stream.
#[derive(Debug)]
pub struct Subscription {
	handle: SubscriptionHandle,
	relays: Vec<String>,
	items: mpsc::UnboundedReceiver<SubscriptionItem>,
}

impl Subscription {
	pub fn new(handle: SubscriptionHandle, relays: Vec<String>, items: mpsc::UnboundedReceiver<SubscriptionItem>) -> Self {
		Self { handle, relays, items }
	}

	pub fn id(&self) -> &str {
		self.handle.id()
	}

	/// Relays the subscription was sent to.
	pub fn relays(&self) -> &[String] {
		&self.relays
	}

	pub async fn next(&mut self) -> Option<SubscriptionItem> {
		self.items.recv().await
	}

	pub fn close(&self) {
		self.handle.close();
	}

	pub fn split(self) -> (SubscriptionHandle, mpsc::UnboundedReceiver<SubscriptionItem>) {
		(self.handle, self.items)
	}
}

/// Network collaborator used by the aggregation engine.
#[async_trait::async_trait]
pub trait RelayTransport: Send + Sync + 'static {
	/// Open a subscription on every relay in `relays`.
	async fn subscribe(&self, relays: &RelaySet, filter: Filter) -> Result<Subscription, TransportError>;

	/// Newest event matching `filter` across `relays` (highest `created_at`), or `None` if every
	/// relay finished without one. Bounded by a transport-managed timeout.
	async fn get_one(&self, relays: &RelaySet, filter: Filter) -> Result<Option<RawEvent>, TransportError>;
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	#[test]
	fn handle_closes_once() {
		let calls = Arc::new(AtomicUsize::new(0));
		let c = calls.clone();
		let handle = SubscriptionHandle::new("s1", move || {
			c.fetch_add(1, Ordering::SeqCst);
		});
		assert!(!handle.is_closed());
		handle.close();
		handle.close();
		assert!(handle.is_closed());
		drop(handle);
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn dropping_subscription_closes_it() {
		let calls = Arc::new(AtomicUsize::new(0));
		let c = calls.clone();
		let (_tx, rx) = mpsc::unbounded_channel();
		let sub = Subscription::new(
			SubscriptionHandle::new("s2", move || {
				c.fetch_add(1, Ordering::SeqCst);
			}),
			vec!["wss://a".into()],
			rx,
		);
		assert_eq!(sub.id(), "s2");
		drop(sub);
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}
}
