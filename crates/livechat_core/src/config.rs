use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use livechat_domain::parse_relay_list;
use livechat_relay::RelayPoolConfig;
use serde::Deserialize;
use tracing::{info, warn};

use crate::session::SessionConfig;

/// Default config path: `~/.livechat/config.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".livechat").join("config.toml"))
}

/// Load the config from TOML and env overrides.
pub fn load_config() -> anyhow::Result<LivechatConfig> {
	let path = default_config_path()?;
	load_config_from_path(&path)
}

/// Same as `load_config` but with an explicit config path.
pub fn load_config_from_path(path: &Path) -> anyhow::Result<LivechatConfig> {
	let file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	let mut cfg = LivechatConfig::from_file(file_cfg);

	apply_overrides(&mut cfg, |key| std::env::var(key).ok());

	Ok(cfg)
}

#[derive(Debug, Clone, Default)]
pub struct LivechatConfig {
	pub relays: RelaySettings,
	/// Optional Prometheus exporter bind address (host:port).
	pub metrics_bind: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RelaySettings {
	/// Added to the relays of every connect, after the address hints.
	pub extra: Vec<String>,
	pub connect_timeout: Duration,
	/// Upper bound for a single profile lookup.
	pub get_timeout: Duration,
	pub reconnect_min_delay: Duration,
	pub reconnect_max_delay: Duration,
}

impl Default for RelaySettings {
	fn default() -> Self {
		let pool = RelayPoolConfig::default();
		Self {
			extra: Vec::new(),
			connect_timeout: pool.connect_timeout,
			get_timeout: pool.get_timeout,
			reconnect_min_delay: pool.reconnect_min_delay,
			reconnect_max_delay: pool.reconnect_max_delay,
		}
	}
}

impl LivechatConfig {
	pub fn pool_config(&self) -> RelayPoolConfig {
		RelayPoolConfig {
			connect_timeout: self.relays.connect_timeout,
			get_timeout: self.relays.get_timeout,
			reconnect_min_delay: self.relays.reconnect_min_delay,
			reconnect_max_delay: self.relays.reconnect_max_delay,
		}
	}

	pub fn session_config(&self) -> SessionConfig {
		SessionConfig {
			extra_relays: self.relays.extra.clone(),
			..SessionConfig::default()
		}
	}

	fn from_file(file: FileConfig) -> Self {
		let defaults = RelaySettings::default();
		Self {
			relays: RelaySettings {
				extra: file
					.relays
					.extra
					.into_iter()
					.map(|r| r.trim().to_string())
					.filter(|r| !r.is_empty())
					.collect(),
				connect_timeout: file
					.relays
					.connect_timeout_ms
					.map(Duration::from_millis)
					.unwrap_or(defaults.connect_timeout),
				get_timeout: file
					.relays
					.get_timeout_ms
					.map(Duration::from_millis)
					.unwrap_or(defaults.get_timeout),
				reconnect_min_delay: file
					.relays
					.reconnect_min_delay_ms
					.map(Duration::from_millis)
					.unwrap_or(defaults.reconnect_min_delay),
				reconnect_max_delay: file
					.relays
					.reconnect_max_delay_ms
					.map(Duration::from_millis)
					.unwrap_or(defaults.reconnect_max_delay),
			},
			metrics_bind: file.metrics_bind.filter(|s| !s.trim().is_empty()),
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	#[serde(default)]
	relays: FileRelaySettings,

	metrics_bind: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileRelaySettings {
	#[serde(default)]
	extra: Vec<String>,
	connect_timeout_ms: Option<u64>,
	get_timeout_ms: Option<u64>,
	reconnect_min_delay_ms: Option<u64>,
	reconnect_max_delay_ms: Option<u64>,
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s).context("parse TOML")?;
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}

fn apply_overrides(cfg: &mut LivechatConfig, env: impl Fn(&str) -> Option<String>) {
	if let Some(v) = env("LIVECHAT_EXTRA_RELAYS") {
		let relays = parse_relay_list(&v);
		if !relays.is_empty() {
			cfg.relays.extra = relays;
			info!(count = cfg.relays.extra.len(), "relay config: extra overridden by env");
		}
	}

	if let Some(v) = env("LIVECHAT_CONNECT_TIMEOUT_MS")
		&& let Ok(ms) = v.trim().parse::<u64>()
	{
		cfg.relays.connect_timeout = Duration::from_millis(ms);
		info!(ms, "relay config: connect_timeout overridden by env");
	}

	if let Some(v) = env("LIVECHAT_GET_TIMEOUT_MS")
		&& let Ok(ms) = v.trim().parse::<u64>()
	{
		cfg.relays.get_timeout = Duration::from_millis(ms);
		info!(ms, "relay config: get_timeout overridden by env");
	}

	if let Some(v) = env("LIVECHAT_RECONNECT_MIN_DELAY_MS")
		&& let Ok(min_ms) = v.trim().parse::<u64>()
	{
		cfg.relays.reconnect_min_delay = Duration::from_millis(min_ms);
		info!(min_ms, "relay config: reconnect_min_delay overridden by env");
	}

	if let Some(v) = env("LIVECHAT_RECONNECT_MAX_DELAY_MS")
		&& let Ok(max_ms) = v.trim().parse::<u64>()
	{
		cfg.relays.reconnect_max_delay = Duration::from_millis(max_ms);
		info!(max_ms, "relay config: reconnect_max_delay overridden by env");
	}

	if let Some(v) = env("LIVECHAT_METRICS_BIND") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.metrics_bind = Some(v);
			info!("config: metrics_bind overridden by env");
		}
	}

	if cfg.relays.reconnect_min_delay > cfg.relays.reconnect_max_delay {
		warn!(
			min_ms = cfg.relays.reconnect_min_delay.as_millis(),
			max_ms = cfg.relays.reconnect_max_delay.as_millis(),
			"relay config: reconnect_min_delay > reconnect_max_delay; swapping"
		);
		std::mem::swap(&mut cfg.relays.reconnect_min_delay, &mut cfg.relays.reconnect_max_delay);
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::*;

	fn parse(toml_src: &str) -> LivechatConfig {
		let file: FileConfig = toml::from_str(toml_src).unwrap();
		LivechatConfig::from_file(file)
	}

	#[test]
	fn empty_file_gives_defaults() {
		let cfg = parse("");
		assert!(cfg.relays.extra.is_empty());
		assert_eq!(cfg.relays.connect_timeout, Duration::from_secs(10));
		assert_eq!(cfg.relays.get_timeout, Duration::from_secs(5));
		assert_eq!(cfg.relays.reconnect_min_delay, Duration::from_millis(500));
		assert_eq!(cfg.relays.reconnect_max_delay, Duration::from_secs(30));
		assert_eq!(cfg.metrics_bind, None);
	}

	#[test]
	fn reads_relay_section() {
		let cfg = parse(
			r#"
metrics_bind = "127.0.0.1:9100"

[relays]
extra = ["wss://relay.example.com", "  "]
connect_timeout_ms = 2500
get_timeout_ms = 1000
"#,
		);
		assert_eq!(cfg.relays.extra, vec!["wss://relay.example.com".to_string()]);
		assert_eq!(cfg.relays.connect_timeout, Duration::from_millis(2500));
		assert_eq!(cfg.pool_config().get_timeout, Duration::from_secs(1));
		assert_eq!(cfg.metrics_bind.as_deref(), Some("127.0.0.1:9100"));
		assert_eq!(cfg.session_config().extra_relays, cfg.relays.extra);
		assert_eq!(cfg.session_config().default_relays.len(), 10);
	}

	#[test]
	fn env_overrides_apply_and_swap_delays() {
		let env: HashMap<&str, &str> = HashMap::from([
			("LIVECHAT_EXTRA_RELAYS", "wss://a, wss://b"),
			("LIVECHAT_GET_TIMEOUT_MS", "750"),
			("LIVECHAT_CONNECT_TIMEOUT_MS", "not a number"),
			("LIVECHAT_RECONNECT_MIN_DELAY_MS", "9000"),
			("LIVECHAT_RECONNECT_MAX_DELAY_MS", "100"),
			("LIVECHAT_METRICS_BIND", " "),
		]);
		let mut cfg = LivechatConfig::default();
		apply_overrides(&mut cfg, |key| env.get(key).map(|v| v.to_string()));

		assert_eq!(cfg.relays.extra, vec!["wss://a".to_string(), "wss://b".to_string()]);
		assert_eq!(cfg.relays.get_timeout, Duration::from_millis(750));
		assert_eq!(cfg.relays.connect_timeout, Duration::from_secs(10));
		assert_eq!(cfg.relays.reconnect_min_delay, Duration::from_millis(100));
		assert_eq!(cfg.relays.reconnect_max_delay, Duration::from_millis(9000));
		assert_eq!(cfg.metrics_bind, None);
	}

	#[test]
	fn missing_file_is_not_an_error() {
		let path = std::env::temp_dir().join(format!("livechat-missing-{}.toml", std::process::id()));
		let cfg = load_config_from_path(&path).unwrap();
		assert_eq!(cfg.relays.get_timeout, Duration::from_secs(5));
	}

	#[test]
	fn invalid_toml_is_reported() {
		let path = std::env::temp_dir().join(format!("livechat-invalid-{}.toml", std::process::id()));
		fs::write(&path, "relays = 3").unwrap();
		let err = load_config_from_path(&path).unwrap_err();
		let _ = fs::remove_file(&path);
		assert!(format!("{err:#}").contains("parse TOML"));
	}
}
