//! Relay-set resolution.

use std::collections::HashSet;

use livechat_util::endpoint::normalize_relay_url;
use serde::{Deserialize, Serialize};

/// Well-known public relays, lowest priority source for every connection.
pub const DEFAULT_RELAYS: [&str; 10] = [
	"wss://relay.damus.io",
	"wss://relay.nostr.band",
	"wss://nos.lol",
	"wss://relay.snort.social",
	"wss://relay.primal.net",
	"wss://nostr.wine",
	"wss://relay.nostr.bg",
	"wss://nostr-pub.wellorder.net",
	"wss://offchain.pub",
	"wss://relay.current.fyi",
];

/// Deduplicated relay urls, in first-occurrence order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelaySet(Vec<String>);

impl RelaySet {
	/// Union of `hints`, then `extra`, then `defaults`.
	pub fn resolve<H, E, D>(hints: H, extra: E, defaults: D) -> Self
	where
		H: IntoIterator,
		H::Item: AsRef<str>,
		E: IntoIterator,
		E::Item: AsRef<str>,
		D: IntoIterator,
		D::Item: AsRef<str>,
	{
		let mut set = Self::default();
		let mut seen = HashSet::new();

		let hints = hints.into_iter().map(|s| normalize_relay_url(s.as_ref()));
		let extra = extra.into_iter().map(|s| normalize_relay_url(s.as_ref()));
		let defaults = defaults.into_iter().map(|s| normalize_relay_url(s.as_ref()));

		for url in hints.chain(extra).chain(defaults) {
			if url.is_empty() {
				continue;
			}
			if seen.insert(url.clone()) {
				set.0.push(url);
			}
		}

		set
	}

	/// Union of `hints` and `extra` with [`DEFAULT_RELAYS`].
	pub fn with_defaults<H, E>(hints: H, extra: E) -> Self
	where
		H: IntoIterator,
		H::Item: AsRef<str>,
		E: IntoIterator,
		E::Item: AsRef<str>,
	{
		Self::resolve(hints, extra, DEFAULT_RELAYS)
	}

	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.0.iter().map(String::as_str)
	}

	pub fn as_slice(&self) -> &[String] {
		&self.0
	}

	pub fn contains(&self, url: &str) -> bool {
		let url = normalize_relay_url(url);
		self.0.iter().any(|u| *u == url)
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl<'a> IntoIterator for &'a RelaySet {
	type Item = &'a String;
	type IntoIter = std::slice::Iter<'a, String>;

	fn into_iter(self) -> Self::IntoIter {
		self.0.iter()
	}
}

/// Split a comma separated relay list (`"wss://a, wss://b"`).
pub fn parse_relay_list(s: &str) -> Vec<String> {
	s.split(',')
		.map(str::trim)
		.filter(|r| !r.is_empty())
		.map(str::to_string)
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn merges_sources_without_duplicates() {
		let set = RelaySet::resolve(["wss://a"], ["wss://b"], ["wss://c", "wss://a"]);
		assert_eq!(set.as_slice(), ["wss://a", "wss://b", "wss://c"]);
	}

	#[test]
	fn hints_come_first_then_extra_then_defaults() {
		let set = RelaySet::resolve(["wss://h"], ["wss://d", "wss://e"], ["wss://d", "wss://z"]);
		assert_eq!(set.as_slice(), ["wss://h", "wss://d", "wss://e", "wss://z"]);
	}

	#[test]
	fn normalizes_before_deduplicating() {
		let set = RelaySet::resolve([" wss://a/ "], ["wss://a", ""], Vec::<String>::new());
		assert_eq!(set.as_slice(), ["wss://a"]);
		assert!(set.contains("wss://a/"));
	}

	#[test]
	fn defaults_are_ten_distinct_relays() {
		let set = RelaySet::with_defaults(Vec::<String>::new(), Vec::<String>::new());
		assert_eq!(set.len(), 10);
		assert_eq!(set.iter().next(), Some("wss://relay.damus.io"));
	}

	#[test]
	fn parses_comma_separated_lists() {
		assert_eq!(parse_relay_list("wss://a, wss://b,,  "), vec!["wss://a", "wss://b"]);
		assert!(parse_relay_list("").is_empty());
	}
}
