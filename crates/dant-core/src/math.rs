//! 18-decimal fixed-point helpers.
//!
//! Every product is formed in 256 bits and truncated toward zero on the final
//! division. No rounding compensation is applied anywhere.

use primitive_types::U256;

use crate::constants::WAD;
use crate::error::DantError;
use crate::types::Balance;

fn narrow(v: U256) -> Result<u128, DantError> {
    if v > U256::from(u128::MAX) {
        return Err(DantError::Overflow);
    }
    Ok(v.as_u128())
}

/// `a * b / denom`, truncated.
pub fn mul_div(a: u128, b: u128, denom: u128) -> Result<u128, DantError> {
    if denom == 0 {
        return Err(DantError::Other("division by zero".into()));
    }
    // (2^128 - 1)^2 < 2^256, so the product cannot overflow.
    narrow(U256::from(a) * U256::from(b) / U256::from(denom))
}

/// `amount * rate / 1e18`.
pub fn wad_mul(amount: Balance, rate: u128) -> Result<Balance, DantError> {
    mul_div(amount, rate, WAD)
}

/// Time-proportional reward: `amount * reward_per_sec * elapsed / 1e18`.
/// Non-positive `elapsed` yields zero.
pub fn accrued(amount: Balance, reward_per_sec: u128, elapsed: i64) -> Result<Balance, DantError> {
    if elapsed <= 0 || amount == 0 || reward_per_sec == 0 {
        return Ok(0);
    }
    let num = (U256::from(amount) * U256::from(reward_per_sec))
        .checked_mul(U256::from(elapsed as u64))
        .ok_or(DantError::Overflow)?;
    narrow(num / U256::from(WAD))
}

/// Parse a decimal token string (`"1000"`, `"0.5"`) into base units.
pub fn parse_units(s: &str, decimals: u8) -> Result<Balance, DantError> {
    let bad = || DantError::InvalidAmount(s.to_string());
    let s = s.trim();
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(bad());
    }
    if !int_part.chars().all(|c| c.is_ascii_digit()) || !frac_part.chars().all(|c| c.is_ascii_digit()) {
        return Err(bad());
    }
    if frac_part.len() > decimals as usize {
        return Err(bad());
    }

    let scale = 10u128.checked_pow(decimals as u32).ok_or(DantError::Overflow)?;
    let int_val: u128 = if int_part.is_empty() { 0 } else { int_part.parse().map_err(|_| bad())? };
    let frac_val: u128 = if frac_part.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", frac_part, width = decimals as usize);
        padded.parse().map_err(|_| bad())?
    };

    int_val
        .checked_mul(scale)
        .and_then(|v| v.checked_add(frac_val))
        .ok_or(DantError::Overflow)
}

/// Render base units as a decimal string with trailing zeros trimmed.
pub fn format_units(value: Balance, decimals: u8) -> String {
    if decimals == 0 {
        return value.to_string();
    }
    let scale = 10u128.pow(decimals as u32);
    let int_val = value / scale;
    let frac_val = value % scale;
    if frac_val == 0 {
        return int_val.to_string();
    }
    let frac = format!("{:0>width$}", frac_val, width = decimals as usize);
    format!("{}.{}", int_val, frac.trim_end_matches('0'))
}
