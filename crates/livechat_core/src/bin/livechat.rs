#![forbid(unsafe_code)]

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context as _;
use livechat_core::config::{default_config_path, load_config_from_path};
use livechat_core::{LiveChatSession, render_feed_line};
use livechat_domain::parse_relay_list;
use livechat_relay::RelayPool;
use tracing::{info, warn};

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: livechat <naddr> [--relay wss://host]... [--relays a,b,c]\n\
\n\
Options:\n\
	--relay     Extra relay to query (repeatable)\n\
	--relays    Comma separated extra relays\n\
	--help      Show this help\n\
\n\
Notes:\n\
	Relays from the address come first, then extra relays, then the built-in defaults.\n\
	Config is read from ~/.livechat/config.toml (LIVECHAT_* env vars override it).\n\
\n\
Examples:\n\
	livechat naddr1qqyhxarjv4sk6tf5...\n\
	livechat nostr:naddr1qqyhxarjv4sk6tf5... --relays wss://nos.lol,wss://relay.damus.io\n"
	);
	std::process::exit(2)
}

fn init_rustls_crypto_provider() {
	let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

fn init_tracing() {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,livechat_core=debug".to_string());
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.with_writer(std::io::stderr)
		.init();
}

fn init_metrics(bind: Option<&str>) {
	let Some(bind) = bind else {
		return;
	};

	match bind.parse::<std::net::SocketAddr>() {
		Ok(addr) => {
			if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new()
				.with_http_listener(addr)
				.install()
			{
				warn!(error = %e, "failed to start metrics exporter");
			} else {
				info!(%addr, "metrics exporter listening");
			}
		}
		Err(e) => {
			warn!(error = %e, %bind, "invalid metrics bind address (expected host:port)");
		}
	}
}

fn parse_args() -> (String, Vec<String>) {
	let mut address: Option<String> = None;
	let mut relays: Vec<String> = Vec::new();

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--relay" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--relay must be non-empty (expected wss://host)");
					usage_and_exit();
				}
				relays.push(v);
			}
			"--relays" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				relays.extend(parse_relay_list(&v));
			}
			other if other.starts_with("--") => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
			other => {
				if address.is_some() {
					eprintln!("Only one stream address may be given");
					usage_and_exit();
				}
				address = Some(other.to_string());
			}
		}
	}

	let Some(address) = address else {
		usage_and_exit();
	};
	(address, relays)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_rustls_crypto_provider();
	init_tracing();

	let (address, extra_relays) = parse_args();

	let config_path = default_config_path()?;
	let cfg = load_config_from_path(&config_path)?;
	info!(path = %config_path.display(), "loaded config (toml + env overrides)");

	init_metrics(cfg.metrics_bind.as_deref());

	let pool = RelayPool::new(cfg.pool_config());
	let mut session = LiveChatSession::with_config(Arc::new(pool), cfg.session_config());
	let view = session.view();
	let mut updates = view.updates();

	let Some(addr) = session.connect(&address, &extra_relays).await.context("connect to stream")? else {
		eprintln!("Invalid stream address (expected naddr1...): {address}");
		std::process::exit(2);
	};
	info!(coordinate = %addr.coordinate(), relays = view.relays().len(), "watching stream; ctrl-c to quit");

	let mut printed: HashSet<String> = HashSet::new();
	let mut last_title: Option<String> = None;

	loop {
		tokio::select! {
			_ = tokio::signal::ctrl_c() => {
				info!("interrupted");
				break;
			}
			changed = updates.changed() => {
				if changed.is_err() {
					break;
				}

				if let Some(info) = view.stream_info()
					&& info.title.is_some()
					&& info.title != last_title
				{
					let live = if info.is_live() { " [live]" } else { "" };
					println!("== {}{live} ==", info.title.as_deref().unwrap_or_default());
					last_title = info.title;
				}

				for item in view.feed() {
					if printed.insert(item.id().to_string()) {
						println!("{}", render_feed_line(&item, &chrono::Local));
					}
				}
			}
		}
	}

	session.disconnect();
	Ok(())
}
