#![forbid(unsafe_code)]

pub mod config;
pub mod feed;
pub mod profiles;
pub mod session;
pub mod store;


use std::sync::Arc;

use tokio::sync::watch;

pub use feed::{compose_feed, render_feed_line};
pub use profiles::ProfileResolver;
pub use session::{LiveChatSession, SessionConfig, SessionError, SessionState, SessionView};
pub use store::EventStore;

/// Monotonic change counter shared by everything that mutates observable session state.
#[derive(Debug, Clone)]
pub struct Revision(Arc<watch::Sender<u64>>);

impl Revision {
	pub fn new() -> Self {
		let (tx, _rx) = watch::channel(0);
		Self(Arc::new(tx))
	}

	pub fn bump(&self) {
		self.0.send_modify(|rev| *rev = rev.wrapping_add(1));
	}

	pub fn current(&self) -> u64 {
		*self.0.borrow()
	}

	pub fn subscribe(&self) -> watch::Receiver<u64> {
		self.0.subscribe()
	}
}

impl Default for Revision {
	fn default() -> Self {
		Self::new()
	}
}
