//! Best-effort amount extraction from lightning (`lnbc`) invoices.

const PREFIX: &str = "lnbc";

/// Amount in sats encoded in the human-readable part of a bolt11 invoice.
///
/// Returns 0 when nothing recognisable is found. Matching is case-insensitive and uses the
/// first `lnbc` that is followed by at least one digit. The multiplier letter is
/// case-insensitive too, so `LNBC10U` reads as 10 micro-BTC rather than 10 BTC.
pub fn parse_amount_sats(invoice: &str) -> u64 {
	let lower = invoice.to_ascii_lowercase();

	for (idx, _) in lower.match_indices(PREFIX) {
		let rest = &lower[idx + PREFIX.len()..];
		let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
		if digits_len == 0 {
			continue;
		}

		let Ok(amount) = rest[..digits_len].parse::<u64>() else {
			return 0;
		};

		return match rest.as_bytes().get(digits_len) {
			Some(b'm') => amount.saturating_mul(100_000),
			Some(b'u') => amount.saturating_mul(100),
			Some(b'n') => amount / 10,
			Some(b'p') => amount / 10_000,
			_ => amount.saturating_mul(100_000_000),
		};
	}

	0
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn applies_multipliers() {
		assert_eq!(parse_amount_sats("lnbc10u1pjxyz"), 1_000);
		assert_eq!(parse_amount_sats("lnbc2500n1p3abc"), 250);
		assert_eq!(parse_amount_sats("lnbc1m1pxyz"), 100_000);
		assert_eq!(parse_amount_sats("lnbc10000p1pxyz"), 1);
		assert_eq!(parse_amount_sats("lnbc1"), 100_000_000);
		assert_eq!(parse_amount_sats("lnbc100m"), 10_000_000);
		assert_eq!(parse_amount_sats("lnbc25p"), 0);
		assert_eq!(parse_amount_sats("lnbc2"), 200_000_000);
		assert_eq!(parse_amount_sats("not-an-invoice"), 0);
	}

	#[test]
	fn is_case_insensitive() {
		assert_eq!(parse_amount_sats("LNBC10U1PJXYZ"), 1_000);
		assert_eq!(parse_amount_sats("LnBc2M"), 200_000);
	}

	#[test]
	fn returns_zero_without_amount() {
		assert_eq!(parse_amount_sats(""), 0);
		assert_eq!(parse_amount_sats("lntb10u1"), 0);
		assert_eq!(parse_amount_sats("lnbcrt"), 0);
	}

	#[test]
	fn skips_prefix_without_digits() {
		assert_eq!(parse_amount_sats("lnbc lnbc21u"), 2_100);
	}

	#[test]
	fn sub_sat_amounts_round_down() {
		assert_eq!(parse_amount_sats("lnbc9n1"), 0);
		assert_eq!(parse_amount_sats("lnbc9999p1"), 0);
	}

	#[test]
	fn huge_amounts_do_not_overflow() {
		assert_eq!(parse_amount_sats("lnbc99999999999999999999999"), 0);
		assert_eq!(parse_amount_sats("lnbc18446744073709551"), u64::MAX);
	}

	proptest! {
		#[test]
		fn never_panics(s in "\\PC*") {
			let _ = parse_amount_sats(&s);
		}

		#[test]
		fn micro_amounts_scale_by_hundred(n in 0u64..1_000_000_000) {
			prop_assert_eq!(parse_amount_sats(&format!("lnbc{n}u1p")), n * 100);
		}
	}
}
