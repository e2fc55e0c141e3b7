//! Websocket relay pool: one background connection task per relay url.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use livechat_domain::{RawEvent, RelaySet};
use livechat_util::endpoint::validate_relay_url;
use nostr::filter::MatchEventOptions;
use nostr::{ClientMessage, Filter, JsonUtil, RelayMessage, SubscriptionId};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{RelayTransport, Subscription, SubscriptionHandle, SubscriptionItem, TransportError};

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

#[derive(Debug, Clone)]
pub struct RelayPoolConfig {
	/// How long `subscribe` waits for at least one relay to connect.
	pub connect_timeout: Duration,
	/// Upper bound for `get_one`.
	pub get_timeout: Duration,
	pub reconnect_min_delay: Duration,
	pub reconnect_max_delay: Duration,
}

impl Default for RelayPoolConfig {
	fn default() -> Self {
		Self {
			connect_timeout: Duration::from_secs(10),
			get_timeout: Duration::from_secs(5),
			reconnect_min_delay: Duration::from_millis(500),
			reconnect_max_delay: Duration::from_secs(30),
		}
	}
}

#[derive(Clone)]
pub struct RelayPool {
	inner: Arc<PoolInner>,
}

struct PoolInner {
	config: RelayPoolConfig,
	relays: Mutex<HashMap<String, RelayConnection>>,
}

struct RelayConnection {
	command_tx: mpsc::UnboundedSender<Command>,
	connected: watch::Receiver<bool>,
	/// Open subscriptions sent to this relay. The entry (and with it the connection task) goes
	/// away when this drops to zero.
	subscriptions: usize,
}

#[derive(Debug)]
enum Command {
	Subscribe {
		sub_id: SubscriptionId,
		filter: Filter,
		handler: mpsc::UnboundedSender<SubscriptionItem>,
	},
	Unsubscribe {
		sub_id: SubscriptionId,
	},
}

impl RelayPool {
	pub fn new(config: RelayPoolConfig) -> Self {
		Self {
			inner: Arc::new(PoolInner {
				config,
				relays: Mutex::new(HashMap::new()),
			}),
		}
	}

	pub fn config(&self) -> &RelayPoolConfig {
		&self.inner.config
	}

	/// Relays that currently have an open websocket.
	pub fn connected_relays(&self) -> Vec<String> {
		let relays = self.inner.relays.lock();
		let mut out: Vec<String> = relays
			.iter()
			.filter(|(_, conn)| *conn.connected.borrow())
			.map(|(url, _)| url.clone())
			.collect();
		out.sort();
		out
	}
}

impl PoolInner {
	/// Count one more subscription on `url`, spawning its connection task if there is none.
	fn acquire(&self, url: &str) -> (mpsc::UnboundedSender<Command>, watch::Receiver<bool>) {
		let mut relays = self.relays.lock();
		if let Some(conn) = relays.get_mut(url)
			&& !conn.command_tx.is_closed()
		{
			conn.subscriptions += 1;
			return (conn.command_tx.clone(), conn.connected.clone());
		}

		let (command_tx, command_rx) = mpsc::unbounded_channel();
		let (connected_tx, connected_rx) = watch::channel(false);
		tokio::spawn(run_relay(url.to_string(), self.config.clone(), command_rx, connected_tx));

		relays.insert(
			url.to_string(),
			RelayConnection {
				command_tx: command_tx.clone(),
				connected: connected_rx.clone(),
				subscriptions: 1,
			},
		);
		(command_tx, connected_rx)
	}

	/// Close `sub_id` on `urls`. A relay left without subscriptions loses its last command
	/// sender, so its task sends the CLOSE, drops the websocket and exits.
	fn release(&self, sub_id: &SubscriptionId, urls: &[String]) {
		let mut relays = self.relays.lock();
		for url in urls {
			let Some(conn) = relays.get_mut(url) else {
				continue;
			};
			let _ = conn.command_tx.send(Command::Unsubscribe { sub_id: sub_id.clone() });
			conn.subscriptions = conn.subscriptions.saturating_sub(1);
			if conn.subscriptions == 0 {
				relays.remove(url);
				debug!(relay = %url, "relay idle; closing connection");
			}
		}
	}
}

#[async_trait::async_trait]
impl RelayTransport for RelayPool {
	async fn subscribe(&self, relays: &RelaySet, filter: Filter) -> Result<Subscription, TransportError> {
		if relays.is_empty() {
			return Err(TransportError::NoRelays);
		}

		let urls: Vec<String> = relays
			.iter()
			.filter(|url| match validate_relay_url(url) {
				Ok(()) => true,
				Err(err) => {
					warn!(relay = %url, error = %err, "skipping invalid relay url");
					false
				}
			})
			.map(str::to_string)
			.collect();
		if urls.is_empty() {
			return Err(TransportError::InvalidRelayUrl(relays.as_slice().join(", ")));
		}

		let sub_id = SubscriptionId::new(Uuid::new_v4().simple().to_string());
		let (tx, rx) = mpsc::unbounded_channel();
		let mut watchers = Vec::with_capacity(urls.len());
		for url in &urls {
			let (command_tx, connected) = self.inner.acquire(url);
			let _ = command_tx.send(Command::Subscribe {
				sub_id: sub_id.clone(),
				filter: filter.clone(),
				handler: tx.clone(),
			});
			watchers.push(connected);
		}
		drop(tx);

		let handle = {
			let inner = self.inner.clone();
			let id = sub_id.to_string();
			let sub_id = sub_id.clone();
			let urls = urls.clone();
			SubscriptionHandle::new(id, move || inner.release(&sub_id, &urls))
		};
		let subscription = Subscription::new(handle, urls, rx);

		let connect_timeout = self.inner.config.connect_timeout;
		match tokio::time::timeout(connect_timeout, wait_any_connected(watchers)).await {
			Ok(true) => {
				debug!(sub_id = %sub_id, relays = subscription.relays().len(), "subscription opened");
				Ok(subscription)
			}
			Ok(false) => Err(TransportError::Closed),
			Err(_) => {
				warn!(sub_id = %sub_id, "no relay connected before timeout");
				Err(TransportError::Unreachable(connect_timeout))
			}
		}
	}

	async fn get_one(&self, relays: &RelaySet, filter: Filter) -> Result<Option<RawEvent>, TransportError> {
		let mut subscription = self.subscribe(relays, filter.limit(1)).await?;
		let expected = subscription.relays().len();
		let get_timeout = self.inner.config.get_timeout;

		let mut newest: Option<RawEvent> = None;
		let collect = async {
			let mut finished = HashSet::new();
			while let Some(item) = subscription.next().await {
				match item {
					SubscriptionItem::Event { event, .. } => {
						if newest.as_ref().is_none_or(|n| event.created_at > n.created_at) {
							newest = Some(*event);
						}
					}
					SubscriptionItem::EndOfStoredEvents { relay } | SubscriptionItem::Closed { relay, .. } => {
						finished.insert(relay);
						if finished.len() >= expected {
							break;
						}
					}
				}
			}
		};
		let timed_out = tokio::time::timeout(get_timeout, collect).await.is_err();
		subscription.close();

		match newest {
			Some(event) => Ok(Some(event)),
			None if timed_out => Err(TransportError::Timeout(get_timeout)),
			None => Ok(None),
		}
	}
}

async fn wait_any_connected(watchers: Vec<watch::Receiver<bool>>) -> bool {
	let mut pending: Vec<_> = watchers
		.into_iter()
		.map(|mut rx| Box::pin(async move { rx.wait_for(|connected| *connected).await.is_ok() }))
		.collect();

	while !pending.is_empty() {
		let (connected, _, rest) = futures_util::future::select_all(pending).await;
		if connected {
			return true;
		}
		pending = rest;
	}
	false
}

fn encode(msg: &ClientMessage<'_>) -> Option<String> {
	match msg.try_as_json() {
		Ok(text) => Some(text),
		Err(err) => {
			warn!(error = %err, "failed to encode client message");
			None
		}
	}
}

fn req_json(sub_id: &SubscriptionId, filter: &Filter) -> Option<String> {
	encode(&ClientMessage::Req {
		subscription_id: Cow::Borrowed(sub_id),
		filter: Cow::Borrowed(filter),
	})
}

#[derive(Default)]
struct RelayState {
	subscriptions: HashMap<SubscriptionId, (Filter, mpsc::UnboundedSender<SubscriptionItem>)>,
}

impl RelayState {
	fn apply(&mut self, cmd: Command) -> Option<String> {
		match cmd {
			Command::Subscribe {
				sub_id,
				filter,
				handler,
			} => {
				let req = req_json(&sub_id, &filter);
				self.subscriptions.insert(sub_id, (filter, handler));
				req
			}
			Command::Unsubscribe { sub_id } => {
				self.subscriptions.remove(&sub_id)?;
				encode(&ClientMessage::Close(Cow::Borrowed(&sub_id)))
			}
		}
	}

	fn deliver(&mut self, relay: &str, msg: RelayMessage<'_>) {
		match msg {
			RelayMessage::Event { subscription_id, event } => {
				let Some((filter, handler)) = self.subscriptions.get(&*subscription_id) else {
					return;
				};
				if let Err(err) = event.verify() {
					metrics::counter!("livechat_invalid_events_total").increment(1);
					warn!(relay = %relay, sub_id = %subscription_id, event_id = %event.id, error = %err, "dropping event with bad id or signature");
					return;
				}
				if !filter.match_event(&event, MatchEventOptions::new()) {
					debug!(relay = %relay, sub_id = %subscription_id, "dropping event outside filter");
					return;
				}
				let _ = handler.send(SubscriptionItem::Event {
					relay: relay.to_string(),
					event: Box::new(RawEvent::from(&*event)),
				});
			}
			RelayMessage::EndOfStoredEvents(subscription_id) => {
				debug!(relay = %relay, sub_id = %subscription_id, "end of stored events");
				if let Some((_, handler)) = self.subscriptions.get(&*subscription_id) {
					let _ = handler.send(SubscriptionItem::EndOfStoredEvents {
						relay: relay.to_string(),
					});
				}
			}
			RelayMessage::Closed {
				subscription_id,
				message,
			} => {
				warn!(relay = %relay, sub_id = %subscription_id, reason = %message, "relay closed subscription");
				if let Some((_, handler)) = self.subscriptions.remove(&*subscription_id) {
					let _ = handler.send(SubscriptionItem::Closed {
						relay: relay.to_string(),
						reason: message.into_owned(),
					});
				}
			}
			RelayMessage::Notice(message) => {
				warn!(relay = %relay, notice = %message, "relay notice");
			}
			RelayMessage::Ok { event_id, status, .. } => {
				debug!(relay = %relay, event_id = %event_id, accepted = status, "relay ok");
			}
			other => {
				debug!(relay = %relay, message = ?other, "ignoring relay message");
			}
		}
	}
}

async fn run_relay(
	url: String,
	config: RelayPoolConfig,
	mut command_rx: mpsc::UnboundedReceiver<Command>,
	connected_tx: watch::Sender<bool>,
) {
	let mut state = RelayState::default();
	let mut delay = config.reconnect_min_delay;

	loop {
		info!(relay = %url, "connecting to relay");
		let connect = tokio::time::timeout(config.connect_timeout, tokio_tungstenite::connect_async(url.as_str())).await;
		let mut ws = match connect {
			Ok(Ok((ws, _))) => ws,
			Ok(Err(err)) => {
				warn!(relay = %url, error = %err, "relay connect failed");
				metrics::counter!("livechat_relay_connect_failures_total").increment(1);
				if !backoff(delay, &mut command_rx, &mut state).await {
					debug!(relay = %url, "relay released while reconnecting");
					return;
				}
				delay = next_delay(delay, &config);
				continue;
			}
			Err(_) => {
				warn!(relay = %url, "relay connect timed out");
				metrics::counter!("livechat_relay_connect_failures_total").increment(1);
				if !backoff(delay, &mut command_rx, &mut state).await {
					debug!(relay = %url, "relay released while reconnecting");
					return;
				}
				delay = next_delay(delay, &config);
				continue;
			}
		};

		metrics::counter!("livechat_relay_connects_total").increment(1);
		info!(relay = %url, subscriptions = state.subscriptions.len(), "relay connected");
		delay = config.reconnect_min_delay;
		resubscribe_all(&url, &state, &mut ws).await;
		connected_tx.send_replace(true);

		loop {
			tokio::select! {
				cmd = command_rx.recv() => {
					let Some(cmd) = cmd else {
						debug!(relay = %url, "relay released; closing websocket");
						let _ = ws.close(None).await;
						connected_tx.send_replace(false);
						return;
					};
					if let Some(text) = state.apply(cmd) {
						send_text(&url, &mut ws, text).await;
					}
				}
				msg = ws.next() => {
					let Some(msg) = msg else {
						warn!(relay = %url, "relay websocket closed");
						break;
					};
					match msg {
						Ok(Message::Text(text)) => match RelayMessage::from_json(text.as_str()) {
							Ok(msg) => state.deliver(&url, msg),
							Err(err) => debug!(relay = %url, error = %err, "ignoring relay message"),
						},
						Ok(Message::Close(frame)) => {
							warn!(relay = %url, ?frame, "relay websocket closed");
							break;
						}
						Ok(_) => {}
						Err(err) => {
							warn!(relay = %url, error = %err, "relay websocket error");
							break;
						}
					}
				}
			}
		}

		connected_tx.send_replace(false);
		if !backoff(delay, &mut command_rx, &mut state).await {
			return;
		}
		delay = next_delay(delay, &config);
	}
}

/// Sleep for `delay` while still tracking subscribe/unsubscribe commands.
/// Returns false once the command channel is closed.
async fn backoff(delay: Duration, command_rx: &mut mpsc::UnboundedReceiver<Command>, state: &mut RelayState) -> bool {
	let sleep = tokio::time::sleep(delay);
	tokio::pin!(sleep);

	loop {
		tokio::select! {
			_ = &mut sleep => return true,
			cmd = command_rx.recv() => {
				let Some(cmd) = cmd else {
					return false;
				};
				let _ = state.apply(cmd);
			}
		}
	}
}

fn next_delay(delay: Duration, config: &RelayPoolConfig) -> Duration {
	delay.saturating_mul(2).min(config.reconnect_max_delay)
}

async fn resubscribe_all(url: &str, state: &RelayState, ws: &mut WsStream) {
	for (sub_id, (filter, _)) in &state.subscriptions {
		if let Some(text) = req_json(sub_id, filter) {
			send_text(url, ws, text).await;
		}
	}
}

async fn send_text(url: &str, ws: &mut WsStream, text: String) {
	if let Err(err) = ws.send(Message::Text(text.into())).await {
		warn!(relay = %url, error = %err, "relay send failed");
	}
}
