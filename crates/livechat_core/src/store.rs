use std::collections::HashSet;

use livechat_domain::{ChatMessage, RawEvent, ReceiptError, ZapReceipt};

/// Session-scoped collections of decoded events, deduplicated by event id.
#[derive(Debug, Default)]
pub struct EventStore {
	messages: Vec<ChatMessage>,
	receipts: Vec<ZapReceipt>,
	message_ids: HashSet<String>,
	receipt_ids: HashSet<String>,
	activity: Option<RawEvent>,
}

impl EventStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Store a chat event. `None` if its id was already seen.
	pub fn insert_chat(&mut self, ev: &RawEvent) -> Option<&ChatMessage> {
		if !self.message_ids.insert(ev.id.clone()) {
			return None;
		}
		self.messages.push(ChatMessage::from_event(ev));
		self.messages.last()
	}

	/// Store a zap receipt. `Ok(None)` if its id was already seen; an undecodable receipt is
	/// not remembered.
	pub fn insert_receipt(&mut self, ev: &RawEvent) -> Result<Option<&ZapReceipt>, ReceiptError> {
		if self.receipt_ids.contains(&ev.id) {
			return Ok(None);
		}
		let receipt = ZapReceipt::from_event(ev)?;
		self.receipt_ids.insert(ev.id.clone());
		self.receipts.push(receipt);
		Ok(self.receipts.last())
	}

	/// Keep `ev` as the current activity unless a newer one is already stored.
	pub fn set_activity(&mut self, ev: RawEvent) -> bool {
		if let Some(current) = &self.activity
			&& current.created_at > ev.created_at
		{
			return false;
		}
		self.activity = Some(ev);
		true
	}

	pub fn messages(&self) -> &[ChatMessage] {
		&self.messages
	}

	pub fn receipts(&self) -> &[ZapReceipt] {
		&self.receipts
	}

	pub fn activity(&self) -> Option<&RawEvent> {
		self.activity.as_ref()
	}

	pub fn is_empty(&self) -> bool {
		self.messages.is_empty() && self.receipts.is_empty() && self.activity.is_none()
	}

	pub fn clear(&mut self) {
		self.messages.clear();
		self.receipts.clear();
		self.message_ids.clear();
		self.receipt_ids.clear();
		self.activity = None;
	}
}
