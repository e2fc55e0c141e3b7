//! Display helpers.

const SHORT_IDENTITY_EDGE: usize = 6;

/// Compact sats amount: `999`, `1.5k`, `2.5M`.
pub fn format_sats(sats: u64) -> String {
	if sats >= 1_000_000 {
		format!("{:.1}M", sats as f64 / 1_000_000.0)
	} else if sats >= 1_000 {
		format!("{:.1}k", sats as f64 / 1_000.0)
	} else {
		sats.to_string()
	}
}

/// First and last six characters of long identities, joined by `...`.
pub fn shorten_identity(identity: &str) -> String {
	let len = identity.chars().count();
	if len <= SHORT_IDENTITY_EDGE * 2 {
		return identity.to_string();
	}

	let head: String = identity.chars().take(SHORT_IDENTITY_EDGE).collect();
	let tail: String = identity.chars().skip(len - SHORT_IDENTITY_EDGE).collect();
	format!("{head}...{tail}")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn formats_sats() {
		assert_eq!(format_sats(0), "0");
		assert_eq!(format_sats(999), "999");
		assert_eq!(format_sats(1_000), "1.0k");
		assert_eq!(format_sats(1_500), "1.5k");
		assert_eq!(format_sats(21_000), "21.0k");
		assert_eq!(format_sats(2_500_000), "2.5M");
	}

	#[test]
	fn shortens_long_identities_only() {
		assert_eq!(shorten_identity("abcdef"), "abcdef");
		assert_eq!(shorten_identity("abcdefghijkl"), "abcdefghijkl");
		assert_eq!(shorten_identity("abcdefghijklm"), "abcdef...hijklm");
		assert_eq!(
			shorten_identity("32e1827635450ebb3c5a7d12c1f8e7b2b514439ac10a67eef3d9fd9c5c68e245"),
			"32e182...68e245"
		);
	}
}
