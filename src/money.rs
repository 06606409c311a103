//! Money formatting and parsing for chat replies and commands

use crate::{Error, Result};

/// Format with thousands separators and two decimals, dropping a trailing
/// `.00`: `1234.5` → `"1,234.50"`, `1000.0` → `"1,000"`.
pub fn format_money(money: f64) -> String {
    let fixed = format!("{:.2}", money.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if money < 0.0 && fixed != "0.00" { "-" } else { "" };
    if cents == "00" {
        format!("{sign}{grouped}")
    } else {
        format!("{sign}{grouped}.{cents}")
    }
}

/// Parse a user-typed amount such as `250`, `$1,500.75` or `2.5k`.
///
/// Suffixes `k`, `m` and `b` multiply by a thousand, million and billion.
/// Negative, non-finite and empty amounts are rejected.
pub fn parse_amount(input: &str) -> Result<f64> {
    let invalid = || Error::InvalidInput(format!("invalid amount: {input:?}"));

    let cleaned: String = input
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',' && *c != '_')
        .collect::<String>()
        .to_ascii_lowercase();

    let (number, multiplier) = match cleaned.chars().last() {
        Some('k') => (&cleaned[..cleaned.len() - 1], 1e3),
        Some('m') => (&cleaned[..cleaned.len() - 1], 1e6),
        Some('b') => (&cleaned[..cleaned.len() - 1], 1e9),
        Some(_) => (cleaned.as_str(), 1.0),
        None => return Err(invalid()),
    };

    // f64::from_str accepts "inf" and "nan"; only plain decimals are amounts
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(invalid());
    }

    let value: f64 = number.parse().map_err(|_| invalid())?;
    let amount = value * multiplier;
    if !amount.is_finite() {
        return Err(invalid());
    }
    Ok(amount)
}
