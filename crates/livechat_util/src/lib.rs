#![forbid(unsafe_code)]

pub mod endpoint {
	/// Parsed `ws://` / `wss://` relay endpoint.
	#[derive(Debug, Clone, PartialEq, Eq, Hash)]
	pub struct RelayEndpoint {
		pub secure: bool,
		pub host: String,
		pub port: Option<u16>,
		/// Path, query and fragment exactly as given (may be empty).
		pub path: String,
	}

	impl RelayEndpoint {
		pub fn scheme(&self) -> &'static str {
			if self.secure { "wss" } else { "ws" }
		}

		/// Returns `host` or `host:port` (IPv6 stays bracketed).
		pub fn hostport(&self) -> String {
			match self.port {
				Some(port) => format!("{}:{}", self.host, port),
				None => self.host.clone(),
			}
		}

		/// Canonical URL string, without a trailing `/` on an empty path.
		pub fn to_url(&self) -> String {
			let path = if self.path == "/" { "" } else { self.path.as_str() };
			format!("{}://{}{}", self.scheme(), self.hostport(), path)
		}

		/// Parse a relay endpoint in the form `wss://host[:port][/path]`.
		pub fn parse(s: &str) -> Result<Self, String> {
			let s = s.trim();
			if s.is_empty() {
				return Err("relay url must be non-empty (expected wss://host)".to_string());
			}

			let lower = s.to_ascii_lowercase();
			let (secure, rest) = if lower.starts_with("wss://") {
				(true, &s["wss://".len()..])
			} else if lower.starts_with("ws://") {
				(false, &s["ws://".len()..])
			} else {
				return Err(format!("invalid relay url (expected ws:// or wss://): {s}"));
			};

			let split_at = rest.find(['/', '?', '#']).unwrap_or(rest.len());
			let (authority, path) = rest.split_at(split_at);

			if authority.contains('@') {
				return Err(format!("invalid relay url (userinfo is not supported): {s}"));
			}

			let (host, port_str) = if authority.starts_with('[') {
				let close = authority
					.find(']')
					.ok_or_else(|| format!("invalid relay url (unterminated IPv6 host): {s}"))?;
				let host = &authority[..=close];
				let after = &authority[close + 1..];
				if after.is_empty() {
					(host, None)
				} else {
					let port = after
						.strip_prefix(':')
						.ok_or_else(|| format!("invalid relay url host: {s}"))?;
					(host, Some(port))
				}
			} else {
				match authority.rsplit_once(':') {
					Some((host, port)) => (host, Some(port)),
					None => (authority, None),
				}
			};

			if host.is_empty() {
				return Err(format!("invalid relay url (missing host): {s}"));
			}

			if host.contains(':') && !host.starts_with('[') {
				return Err(format!(
					"invalid relay url host (IPv6 must be bracketed like ws://[::1]:7777): {s}"
				));
			}

			let port = match port_str {
				Some(p) => {
					let port: u16 = p
						.trim()
						.parse()
						.map_err(|_| format!("invalid relay url port (expected 1..=65535): {s}"))?;
					if port == 0 {
						return Err(format!("invalid relay url port (expected 1..=65535): {s}"));
					}
					Some(port)
				}
				None => None,
			};

			Ok(Self {
				secure,
				host: host.to_ascii_lowercase(),
				port,
				path: path.to_string(),
			})
		}
	}

	/// Trim whitespace and a single trailing `/`.
	pub fn normalize_relay_url(s: &str) -> String {
		let s = s.trim();
		s.strip_suffix('/').unwrap_or(s).to_string()
	}

	/// Validate `ws://` / `wss://` relay urls.
	pub fn validate_relay_url(s: &str) -> Result<(), String> {
		let _ = RelayEndpoint::parse(s)?;
		Ok(())
	}

	#[cfg(test)]
	mod tests {
		use super::*;

		#[test]
		fn parses_plain_wss_host() {
			let e = RelayEndpoint::parse("wss://relay.damus.io").unwrap();
			assert!(e.secure);
			assert_eq!(e.host, "relay.damus.io");
			assert_eq!(e.port, None);
			assert_eq!(e.to_url(), "wss://relay.damus.io");
		}

		#[test]
		fn parses_port_and_path() {
			let e = RelayEndpoint::parse("ws://127.0.0.1:7777/nostr?x=1").unwrap();
			assert!(!e.secure);
			assert_eq!(e.hostport(), "127.0.0.1:7777");
			assert_eq!(e.path, "/nostr?x=1");
			assert_eq!(e.to_url(), "ws://127.0.0.1:7777/nostr?x=1");
		}

		#[test]
		fn trailing_slash_is_dropped_from_canonical_url() {
			let e = RelayEndpoint::parse("wss://nos.lol/").unwrap();
			assert_eq!(e.to_url(), "wss://nos.lol");
		}

		#[test]
		fn parses_bracketed_ipv6() {
			let e = RelayEndpoint::parse("ws://[::1]:7777").unwrap();
			assert_eq!(e.host, "[::1]");
			assert_eq!(e.port, Some(7777));
		}

		#[test]
		fn rejects_other_schemes_and_bad_ports() {
			assert!(RelayEndpoint::parse("https://relay.damus.io").is_err());
			assert!(RelayEndpoint::parse("relay.damus.io").is_err());
			assert!(RelayEndpoint::parse("wss://relay.damus.io:0").is_err());
			assert!(RelayEndpoint::parse("wss://relay.damus.io:http").is_err());
			assert!(RelayEndpoint::parse("wss://").is_err());
			assert!(RelayEndpoint::parse("ws://::1:7777").is_err());
		}

		#[test]
		fn normalize_trims_and_strips_one_slash() {
			assert_eq!(normalize_relay_url("  wss://a.example/ "), "wss://a.example");
			assert_eq!(normalize_relay_url("wss://a.example"), "wss://a.example");
			assert_eq!(normalize_relay_url(""), "");
		}
	}
}
