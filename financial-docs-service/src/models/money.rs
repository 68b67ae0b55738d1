//! Decimal money helpers.
//!
//! All monetary arithmetic stays in [`Decimal`]. Rounding to the currency's
//! minor unit happens once, when totals are finalised for storage or display.

use rust_decimal::{Decimal, RoundingStrategy};

/// Minor units used when a currency is not in the exception table.
pub const DEFAULT_MINOR_UNITS: u32 = 2;

/// Number of decimal places in the currency's minor unit (ISO 4217).
pub fn minor_units_for(currency: &str) -> u32 {
    match currency.to_ascii_uppercase().as_str() {
        "JPY" | "KRW" | "UGX" | "RWF" | "VND" | "XAF" | "XOF" | "CLP" | "ISK" => 0,
        "BHD" | "KWD" | "OMR" | "JOD" | "TND" | "LYD" | "IQD" => 3,
        _ => DEFAULT_MINOR_UNITS,
    }
}

/// Round half-up (away from zero) to `minor_units` decimal places.
pub fn round_minor(amount: Decimal, minor_units: u32) -> Decimal {
    amount.round_dp_with_strategy(minor_units, RoundingStrategy::MidpointAwayFromZero)
}

/// `amount * rate / 100`, unrounded. Saturates instead of overflowing.
pub fn percent_of(amount: Decimal, rate: Decimal) -> Decimal {
    amount.saturating_mul(rate) / Decimal::ONE_HUNDRED
}

/// Format a Decimal as a normalized string.
pub fn format_decimal(d: &Decimal) -> String {
    let s = d.to_string();
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

/// Format an amount for print: rounded, fixed minor units, thousands separators.
pub fn format_money(amount: Decimal, minor_units: u32) -> String {
    let mut rounded = round_minor(amount, minor_units);
    rounded.rescale(minor_units);

    let text = rounded.abs().to_string();
    let (int_part, frac_part) = match text.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (text.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };

    match frac_part {
        Some(frac) => format!("{}{}.{}", sign, grouped, frac),
        None => format!("{}{}", sign, grouped),
    }
}
