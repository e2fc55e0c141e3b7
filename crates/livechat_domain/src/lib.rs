#![forbid(unsafe_code)]

pub mod address;
pub mod format;
pub mod invoice;
pub mod model;
pub mod relays;

pub use address::{DecodeError, StreamAddress};
pub use format::{format_sats, shorten_identity};
pub use invoice::parse_amount_sats;
pub use model::{
	ChatMessage, EnrichedChatMessage, EnrichedZapReceipt, FeedItem, Profile, ProfileContent, ReceiptError, StreamInfo,
	ZapReceipt,
};
pub use relays::{DEFAULT_RELAYS, RelaySet, parse_relay_list};

use serde::{Deserialize, Serialize};

/// User metadata (profile document).
pub const KIND_METADATA: u16 = 0;

/// Zap receipt.
pub const KIND_ZAP_RECEIPT: u16 = 9735;

/// Live activity chat message.
pub const KIND_LIVE_CHAT_MESSAGE: u16 = 1311;

/// Live activity (stream metadata), addressable.
pub const KIND_LIVE_EVENT: u16 = 30311;

/// Plain view of a relay event. Only built from events whose id and signature were verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
	pub id: String,

	pub pubkey: String,

	pub created_at: u64,

	pub kind: u16,

	#[serde(default)]
	pub tags: Vec<Vec<String>>,

	#[serde(default)]
	pub content: String,

	#[serde(default)]
	pub sig: String,
}

impl RawEvent {
	/// First tag whose name matches.
	pub fn tag(&self, name: &str) -> Option<&[String]> {
		self.tags
			.iter()
			.find(|t| t.first().map(String::as_str) == Some(name))
			.map(Vec::as_slice)
	}

	/// First value of the first tag named `name`.
	pub fn tag_value(&self, name: &str) -> Option<&str> {
		self.tag(name).and_then(|t| t.get(1)).map(String::as_str)
	}
}

impl From<&nostr::Event> for RawEvent {
	fn from(event: &nostr::Event) -> Self {
		Self {
			id: event.id.to_hex(),
			pubkey: event.pubkey.to_hex(),
			created_at: event.created_at.as_u64(),
			kind: event.kind.as_u16(),
			tags: event.tags.iter().map(|t| t.as_slice().to_vec()).collect(),
			content: event.content.clone(),
			sig: event.sig.to_string(),
		}
	}
}
