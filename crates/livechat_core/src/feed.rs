//! Merged, time-ordered view over chat messages and zap receipts.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone};
use livechat_domain::{
	ChatMessage, EnrichedChatMessage, EnrichedZapReceipt, FeedItem, Profile, ZapReceipt, format_sats, shorten_identity,
};

fn display_for(identity: &str, profiles: &HashMap<String, Profile>) -> (String, Option<String>) {
	match profiles.get(identity) {
		Some(profile) => (profile.label(), profile.picture.clone()),
		None => (shorten_identity(identity), None),
	}
}

/// Enrich and merge. Ordered by `created_at`; ties keep messages before receipts and
/// insertion order within each.
pub fn compose_feed(messages: &[ChatMessage], receipts: &[ZapReceipt], profiles: &HashMap<String, Profile>) -> Vec<FeedItem> {
	let mut items = Vec::with_capacity(messages.len() + receipts.len());

	for message in messages {
		let (author_name, author_picture) = display_for(&message.author, profiles);
		items.push(FeedItem::Message(EnrichedChatMessage {
			message: message.clone(),
			author_name,
			author_picture,
		}));
	}

	for receipt in receipts {
		let (sender_name, sender_picture) = display_for(&receipt.sender, profiles);
		items.push(FeedItem::Zap(EnrichedZapReceipt {
			receipt: receipt.clone(),
			sender_name,
			sender_picture,
		}));
	}

	items.sort_by_key(FeedItem::created_at);
	items
}

/// One terminal line: `[HH:MM] name: text` or `[HH:MM] ⚡ name zapped 1.2k sats: comment`.
pub fn render_feed_line<Tz: TimeZone>(item: &FeedItem, tz: &Tz) -> String
where
	Tz::Offset: std::fmt::Display,
{
	let time = i64::try_from(item.created_at())
		.ok()
		.and_then(|secs| DateTime::from_timestamp(secs, 0))
		.map(|dt| dt.with_timezone(tz).format("%H:%M").to_string())
		.unwrap_or_else(|| "--:--".to_string());

	match item {
		FeedItem::Message(m) => format!("[{time}] {}: {}", m.author_name, m.message.content),
		FeedItem::Zap(z) => {
			let mut line = format!(
				"[{time}] ⚡ {} zapped {} sats",
				z.sender_name,
				format_sats(z.receipt.amount_sats)
			);
			if !z.receipt.content.is_empty() {
				line.push_str(": ");
				line.push_str(&z.receipt.content);
			}
			line
		}
	}
}
