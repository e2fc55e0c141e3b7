use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::format::shorten_identity;
use crate::invoice::parse_amount_sats;
use crate::RawEvent;

/// Why a zap receipt was dropped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReceiptError {
	#[error("receipt has no description tag")]
	MissingDescription,
	#[error("invalid zap request description: {0}")]
	InvalidDescription(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
	pub id: String,
	pub author: String,
	pub content: String,
	pub created_at: u64,
}

impl ChatMessage {
	pub fn from_event(ev: &RawEvent) -> Self {
		Self {
			id: ev.id.clone(),
			author: ev.pubkey.clone(),
			content: ev.content.clone(),
			created_at: ev.created_at,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZapReceipt {
	pub id: String,
	/// Author of the embedded zap request, not the receipt signer.
	pub sender: String,
	pub recipient: String,
	pub amount_sats: u64,
	/// Comment carried by the zap request.
	pub content: String,
	pub created_at: u64,
}

/// The subset of the embedded zap request we read.
#[derive(Debug, Deserialize)]
struct ZapRequestDescription {
	pubkey: String,
	#[serde(default)]
	content: Option<String>,
}

impl ZapReceipt {
	pub fn from_event(ev: &RawEvent) -> Result<Self, ReceiptError> {
		let description = ev.tag_value("description").ok_or(ReceiptError::MissingDescription)?;
		let request: ZapRequestDescription =
			serde_json::from_str(description).map_err(|e| ReceiptError::InvalidDescription(e.to_string()))?;

		Ok(Self {
			id: ev.id.clone(),
			sender: request.pubkey,
			recipient: ev.tag_value("p").unwrap_or_default().to_string(),
			amount_sats: parse_amount_sats(ev.tag_value("bolt11").unwrap_or_default()),
			content: request.content.unwrap_or_default(),
			created_at: ev.created_at,
		})
	}
}

/// Cached profile for one identity. Only `identity` set means the fetch is still pending
/// (or failed).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
	pub identity: String,
	pub name: Option<String>,
	pub display_name: Option<String>,
	pub picture: Option<String>,
	/// NIP-05 identifier.
	pub nip05: Option<String>,
}

impl Profile {
	pub fn placeholder(identity: impl Into<String>) -> Self {
		Self {
			identity: identity.into(),
			..Self::default()
		}
	}

	pub fn is_placeholder(&self) -> bool {
		self.name.is_none() && self.display_name.is_none() && self.picture.is_none() && self.nip05.is_none()
	}

	pub fn resolved(identity: impl Into<String>, content: ProfileContent) -> Self {
		Self {
			identity: identity.into(),
			name: content.name,
			display_name: content.display_name,
			picture: content.picture,
			nip05: content.nip05,
		}
	}

	/// `display_name`, then `name`, then the shortened identity.
	pub fn label(&self) -> String {
		self.display_name
			.clone()
			.or_else(|| self.name.clone())
			.unwrap_or_else(|| shorten_identity(&self.identity))
	}
}

/// Fields read from a kind 0 metadata document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileContent {
	pub name: Option<String>,
	pub display_name: Option<String>,
	pub picture: Option<String>,
	pub nip05: Option<String>,
}

impl ProfileContent {
	pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
		let value: Value = serde_json::from_str(content)?;
		let Value::Object(map) = value else {
			return Err(serde::de::Error::custom("profile metadata is not a JSON object"));
		};

		let field = |key: &str| {
			map.get(key)
				.and_then(Value::as_str)
				.filter(|s| !s.is_empty())
				.map(str::to_string)
		};

		Ok(Self {
			name: field("name"),
			display_name: field("display_name").or_else(|| field("displayName")),
			picture: field("picture"),
			nip05: field("nip05"),
		})
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedChatMessage {
	#[serde(flatten)]
	pub message: ChatMessage,
	pub author_name: String,
	pub author_picture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedZapReceipt {
	#[serde(flatten)]
	pub receipt: ZapReceipt,
	pub sender_name: String,
	pub sender_picture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum FeedItem {
	Message(EnrichedChatMessage),
	Zap(EnrichedZapReceipt),
}

impl FeedItem {
	pub fn created_at(&self) -> u64 {
		match self {
			FeedItem::Message(m) => m.message.created_at,
			FeedItem::Zap(z) => z.receipt.created_at,
		}
	}

	pub fn id(&self) -> &str {
		match self {
			FeedItem::Message(m) => &m.message.id,
			FeedItem::Zap(z) => &z.receipt.id,
		}
	}
}

/// Display fields of a live activity event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
	pub title: Option<String>,
	pub summary: Option<String>,
	pub image: Option<String>,
	pub status: Option<String>,
	pub streaming: Option<String>,
}

impl StreamInfo {
	pub fn from_event(ev: &RawEvent) -> Self {
		let tag = |name: &str| ev.tag_value(name).filter(|s| !s.is_empty()).map(str::to_string);
		Self {
			title: tag("title"),
			summary: tag("summary"),
			image: tag("image"),
			status: tag("status"),
			streaming: tag("streaming"),
		}
	}

	pub fn is_live(&self) -> bool {
		self.status.as_deref() == Some("live")
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::KIND_ZAP_RECEIPT;

	fn receipt(tags: Vec<Vec<&str>>) -> RawEvent {
		RawEvent {
			id: "r1".into(),
			pubkey: "zapper-service".into(),
			created_at: 42,
			kind: KIND_ZAP_RECEIPT,
			tags: tags
				.into_iter()
				.map(|t| t.into_iter().map(str::to_string).collect())
				.collect(),
			content: String::new(),
			sig: String::new(),
		}
	}

	#[test]
	fn receipt_reads_request_invoice_and_recipient() {
		let ev = receipt(vec![
			vec!["p", "streamer"],
			vec!["bolt11", "lnbc210u1pjabc"],
			vec!["description", r#"{"pubkey":"fan","content":"great stream","kind":9734}"#],
		]);
		let zap = ZapReceipt::from_event(&ev).unwrap();
		assert_eq!(zap.sender, "fan");
		assert_eq!(zap.recipient, "streamer");
		assert_eq!(zap.amount_sats, 21_000);
		assert_eq!(zap.content, "great stream");
		assert_eq!(zap.created_at, 42);
	}

	#[test]
	fn receipt_tolerates_missing_invoice_recipient_and_comment() {
		let ev = receipt(vec![vec!["description", r#"{"pubkey":"fan"}"#]]);
		let zap = ZapReceipt::from_event(&ev).unwrap();
		assert_eq!(zap.amount_sats, 0);
		assert_eq!(zap.recipient, "");
		assert_eq!(zap.content, "");
	}

	#[test]
	fn receipt_without_valid_description_is_rejected() {
		assert_eq!(
			ZapReceipt::from_event(&receipt(vec![vec!["bolt11", "lnbc1u"]])),
			Err(ReceiptError::MissingDescription)
		);
		assert!(matches!(
			ZapReceipt::from_event(&receipt(vec![vec!["description", "not json"]])),
			Err(ReceiptError::InvalidDescription(_))
		));
		assert!(matches!(
			ZapReceipt::from_event(&receipt(vec![vec!["description", r#"{"content":"x"}"#]])),
			Err(ReceiptError::InvalidDescription(_))
		));
	}

	#[test]
	fn profile_content_accepts_both_display_name_spellings() {
		let a = ProfileContent::from_json(r#"{"name":"bob","display_name":"Bob"}"#).unwrap();
		assert_eq!(a.display_name.as_deref(), Some("Bob"));
		let b = ProfileContent::from_json(r#"{"displayName":"Bobby","picture":"https://p/x.png"}"#).unwrap();
		assert_eq!(b.display_name.as_deref(), Some("Bobby"));
		assert_eq!(b.picture.as_deref(), Some("https://p/x.png"));
	}

	#[test]
	fn profile_content_ignores_empty_and_non_string_fields() {
		let c = ProfileContent::from_json(r#"{"name":"","display_name":7,"nip05":"bob@example.com"}"#).unwrap();
		assert_eq!(c.name, None);
		assert_eq!(c.display_name, None);
		assert_eq!(c.nip05.as_deref(), Some("bob@example.com"));
		assert!(ProfileContent::from_json("[1,2]").is_err());
		assert!(ProfileContent::from_json("{").is_err());
	}

	#[test]
	fn label_falls_back_to_name_then_short_identity() {
		let id = "32e1827635450ebb3c5a7d12c1f8e7b2b514439ac10a67eef3d9fd9c5c68e245";
		let mut p = Profile::placeholder(id);
		assert!(p.is_placeholder());
		assert_eq!(p.label(), "32e182...68e245");
		p.name = Some("bob".into());
		assert_eq!(p.label(), "bob");
		p.display_name = Some("Bob".into());
		assert_eq!(p.label(), "Bob");
	}

	#[test]
	fn feed_item_serializes_as_tagged_union() {
		let item = FeedItem::Message(EnrichedChatMessage {
			message: ChatMessage {
				id: "m1".into(),
				author: "a".into(),
				content: "hi".into(),
				created_at: 5,
			},
			author_name: "a".into(),
			author_picture: None,
		});
		let json = serde_json::to_value(&item).unwrap();
		assert_eq!(json["kind"], "message");
		assert_eq!(json["data"]["content"], "hi");
		assert_eq!(item.created_at(), 5);
		assert_eq!(item.id(), "m1");
	}

	#[test]
	fn stream_info_reads_activity_tags() {
		let mut ev = receipt(vec![
			vec!["d", "stream"],
			vec!["title", "Late night coding"],
			vec!["status", "live"],
			vec!["streaming", "https://cdn.example/live.m3u8"],
			vec!["summary", ""],
		]);
		ev.kind = crate::KIND_LIVE_EVENT;
		let info = StreamInfo::from_event(&ev);
		assert_eq!(info.title.as_deref(), Some("Late night coding"));
		assert_eq!(info.summary, None);
		assert!(info.is_live());
	}
}
