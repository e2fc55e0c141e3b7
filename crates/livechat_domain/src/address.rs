//! Stream address (NIP-19 `naddr`) decoding.

use core::fmt;
use core::str::FromStr;

use livechat_util::endpoint::normalize_relay_url;
use nostr::nips::nip19::{FromBech32, Nip19};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// URI scheme prefix accepted in front of an encoded address.
const NOSTR_URI_PREFIX: &str = "nostr:";

/// Errors for decoding a stream address.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
	#[error("empty address")]
	Empty,
	#[error("malformed address: {0}")]
	Malformed(String),
	#[error("expected naddr, got {0}")]
	UnexpectedEntity(&'static str),
}

/// Decoded reference to an addressable live activity event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamAddress {
	pub kind: u16,
	/// Hex public key of the stream author.
	pub author: String,
	/// The `d` tag of the addressable event.
	pub identifier: String,
	pub relay_hints: Vec<String>,
}

impl StreamAddress {
	/// Decode an `naddr1...` string (optionally `nostr:` prefixed).
	pub fn decode(address: &str) -> Result<Self, DecodeError> {
		let s = address.trim();
		let s = s.strip_prefix(NOSTR_URI_PREFIX).unwrap_or(s);
		if s.is_empty() {
			return Err(DecodeError::Empty);
		}

		let decoded = Nip19::from_bech32(s).map_err(|e| DecodeError::Malformed(e.to_string()))?;
		match decoded {
			Nip19::Coordinate(coord) => Ok(Self {
				kind: coord.coordinate.kind.as_u16(),
				author: coord.coordinate.public_key.to_hex(),
				identifier: coord.coordinate.identifier.clone(),
				relay_hints: coord
					.relays
					.iter()
					.map(|r| normalize_relay_url(&r.to_string()))
					.filter(|r| !r.is_empty())
					.collect(),
			}),
			Nip19::Pubkey(_) => Err(DecodeError::UnexpectedEntity("npub")),
			Nip19::Profile(_) => Err(DecodeError::UnexpectedEntity("nprofile")),
			Nip19::EventId(_) => Err(DecodeError::UnexpectedEntity("note")),
			Nip19::Event(_) => Err(DecodeError::UnexpectedEntity("nevent")),
			Nip19::Secret(_) => Err(DecodeError::UnexpectedEntity("nsec")),
			#[allow(unreachable_patterns)]
			_ => Err(DecodeError::UnexpectedEntity("unknown")),
		}
	}

	/// Composite `a` tag value: `<kind>:<author>:<identifier>`.
	pub fn coordinate(&self) -> String {
		format!("{}:{}:{}", self.kind, self.author, self.identifier)
	}
}

impl fmt::Display for StreamAddress {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.coordinate())
	}
}

impl FromStr for StreamAddress {
	type Err = DecodeError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		StreamAddress::decode(s)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const AUTHOR: &str = "32e1827635450ebb3c5a7d12c1f8e7b2b514439ac10a67eef3d9fd9c5c68e245";

	// kind 30311, d = "stream-42", relay hint wss://relay.example.com
	const NADDR_WITH_HINT: &str = "naddr1qqyhxarjv4sk6tf5xgq3wamnwvaz7tmjv4kxz7fwv4uxzmtsd3jjucm0d5pzqvhpsfmr23gwhv795lgjc8uw0v44z3pe4sg2vlh08k0an3wx3cj9qvzqqqrkvup37cz3";

	// kind 30311, d = "1700000000", no relay hints
	const NADDR_NO_HINTS: &str =
		"naddr1qq9rzdesxqcrqvpsxqcqygpjuxp8vd29p6ancknaztql3eajk52y8xkppfn7au7elkw9c68zg5psgqqqwens2n986r";

	// kind 30023, d = "article", two relay hints
	const NADDR_TWO_HINTS: &str = "naddr1qqrkzun5d93kcegppamhxue69uhkztn90psk6urvv5qs7amnwvaz7tmz9ejhsctdwpkx2q3qxtscya34g58tk0z605fvr788k263gsu6cy9x0mhnm87echrgufzsxpqqqp65w4x99jg";

	const NPUB: &str = "npub1xtscya34g58tk0z605fvr788k263gsu6cy9x0mhnm87echrgufzsevkk5s";

	#[test]
	fn decodes_naddr_with_relay_hint() {
		let addr = StreamAddress::decode(NADDR_WITH_HINT).unwrap();
		assert_eq!(addr.kind, 30311);
		assert_eq!(addr.author, AUTHOR);
		assert_eq!(addr.identifier, "stream-42");
		assert_eq!(addr.relay_hints, vec!["wss://relay.example.com".to_string()]);
		assert_eq!(addr.coordinate(), format!("30311:{AUTHOR}:stream-42"));
	}

	#[test]
	fn decodes_naddr_without_hints_and_with_uri_prefix() {
		let addr = StreamAddress::decode(&format!("  nostr:{NADDR_NO_HINTS} ")).unwrap();
		assert_eq!(addr.identifier, "1700000000");
		assert!(addr.relay_hints.is_empty());
	}

	#[test]
	fn keeps_relay_hint_order() {
		let addr: StreamAddress = NADDR_TWO_HINTS.parse().unwrap();
		assert_eq!(addr.kind, 30023);
		assert_eq!(
			addr.relay_hints,
			vec!["wss://a.example".to_string(), "wss://b.example".to_string()]
		);
	}

	#[test]
	fn rejects_other_entities() {
		assert_eq!(StreamAddress::decode(NPUB), Err(DecodeError::UnexpectedEntity("npub")));
	}

	#[test]
	fn rejects_garbage_and_empty() {
		assert_eq!(StreamAddress::decode("   "), Err(DecodeError::Empty));
		assert!(matches!(
			StreamAddress::decode("naddr1notreallyanaddress"),
			Err(DecodeError::Malformed(_))
		));
		assert!(matches!(StreamAddress::decode("hello"), Err(DecodeError::Malformed(_))));
	}
}
