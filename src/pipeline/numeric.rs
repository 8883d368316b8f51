//! Base-unit token amounts to display strings.

use alloy::primitives::utils::format_units;
use alloy::primitives::U256;

/// Shift `value` by `decimals` places, dropping trailing zeros.
/// `(1500000000000000000, 18)` → `"1.5"`.
pub fn scale_units(value: U256, decimals: u8) -> String {
    match format_units(value, decimals) {
        Ok(s) => strip_trailing_zeros(&s),
        Err(_) => "0".to_string(),
    }
}

/// [`scale_units`] for an integer string off the wire. Non-integer input yields `"0"`.
pub fn parse_precision(raw: &str, decimals: u8) -> String {
    match U256::from_str_radix(raw.trim(), 10) {
        Ok(value) => scale_units(value, decimals),
        Err(_) => "0".to_string(),
    }
}

fn strip_trailing_zeros(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

/// Truncate (never round) the fractional part to at most `digits` places.
pub fn trim_number_string(s: &str, digits: usize) -> String {
    let s = s.trim();
    match s.split_once('.') {
        None => s.to_string(),
        Some((int_part, _)) if digits == 0 => int_part.to_string(),
        Some((int_part, frac)) => {
            let frac: String = frac.chars().take(digits).collect();
            if frac.is_empty() {
                int_part.to_string()
            } else {
                format!("{int_part}.{frac}")
            }
        }
    }
}
