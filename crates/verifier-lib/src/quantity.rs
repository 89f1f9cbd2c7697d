//! Kubernetes resource quantity parsing
//!
//! Converts quantity strings such as `500m`, `1.5`, `64Gi`, `100M` or `1e3`
//! into integer millicores or bytes. Fractional results are rounded up, the
//! same way the API server reports milli-values.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,
    #[error("invalid quantity '{0}'")]
    Invalid(String),
    #[error("quantity '{0}' is out of range")]
    Overflow(String),
}

/// Scale applied by a quantity suffix
#[derive(Debug, Clone, Copy)]
enum Scale {
    Binary(u32),
    Decimal(i32),
}

fn suffix_scale(suffix: &str) -> Option<Scale> {
    let scale = match suffix {
        "" => Scale::Decimal(0),
        "n" => Scale::Decimal(-9),
        "u" => Scale::Decimal(-6),
        "m" => Scale::Decimal(-3),
        "k" => Scale::Decimal(3),
        "M" => Scale::Decimal(6),
        "G" => Scale::Decimal(9),
        "T" => Scale::Decimal(12),
        "P" => Scale::Decimal(15),
        "E" => Scale::Decimal(18),
        "Ki" => Scale::Binary(10),
        "Mi" => Scale::Binary(20),
        "Gi" => Scale::Binary(30),
        "Ti" => Scale::Binary(40),
        "Pi" => Scale::Binary(50),
        "Ei" => Scale::Binary(60),
        _ => {
            // Decimal exponent form, e.g. "1e3" or "5E-2"
            let mut chars = suffix.chars();
            match chars.next() {
                Some('e') | Some('E') if suffix.len() > 1 => {
                    Scale::Decimal(chars.as_str().parse().ok()?)
                }
                _ => return None,
            }
        }
    };
    Some(scale)
}

fn div_ceil(value: i128, divisor: i128) -> i128 {
    let quotient = value / divisor;
    if value % divisor > 0 {
        quotient + 1
    } else {
        quotient
    }
}

/// Parse a quantity into thousandths of its base unit
pub fn parse_milli_units(quantity: &str) -> Result<i128, QuantityError> {
    let raw = quantity.trim();
    if raw.is_empty() {
        return Err(QuantityError::Empty);
    }
    let invalid = || QuantityError::Invalid(raw.to_string());
    let overflow = || QuantityError::Overflow(raw.to_string());

    let (negative, unsigned) = match raw.as_bytes()[0] {
        b'-' => (true, &raw[1..]),
        b'+' => (false, &raw[1..]),
        _ => (false, raw),
    };

    let number_len = unsigned
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(unsigned.len());
    let (number, suffix) = unsigned.split_at(number_len);

    let (integer, fraction) = match number.split_once('.') {
        Some((integer, fraction)) => (integer, fraction),
        None => (number, ""),
    };
    if (integer.is_empty() && fraction.is_empty()) || fraction.contains('.') {
        return Err(invalid());
    }

    let mut mantissa: i128 = 0;
    for digit in integer.bytes().chain(fraction.bytes()) {
        mantissa = mantissa
            .checked_mul(10)
            .and_then(|m| m.checked_add(i128::from(digit - b'0')))
            .ok_or_else(overflow)?;
    }
    if negative {
        mantissa = -mantissa;
    }

    let scale = suffix_scale(suffix).ok_or_else(invalid)?;
    let (binary_shift, decimal_exponent) = match scale {
        Scale::Binary(shift) => (shift, 0),
        Scale::Decimal(exponent) => (0, exponent),
    };

    let value = mantissa
        .checked_mul(1i128 << binary_shift)
        .ok_or_else(overflow)?;

    // Result is value * 10^(exponent + 3 - fraction digits)
    let exponent = i64::from(decimal_exponent) + 3 - fraction.len() as i64;
    if exponent >= 0 {
        let factor = u32::try_from(exponent)
            .ok()
            .and_then(|e| 10i128.checked_pow(e))
            .ok_or_else(overflow)?;
        value.checked_mul(factor).ok_or_else(overflow)
    } else {
        match u32::try_from(-exponent).ok().and_then(|e| 10i128.checked_pow(e)) {
            Some(divisor) => Ok(div_ceil(value, divisor)),
            // Divisor exceeds any representable value: only the rounding remains.
            None => Ok(if value > 0 { 1 } else { 0 }),
        }
    }
}

/// Parse a CPU quantity into millicores
pub fn parse_cpu_millis(quantity: &str) -> Result<i64, QuantityError> {
    let milli = parse_milli_units(quantity)?;
    i64::try_from(milli).map_err(|_| QuantityError::Overflow(quantity.trim().to_string()))
}

/// Parse a memory or storage quantity into bytes
pub fn parse_bytes(quantity: &str) -> Result<i64, QuantityError> {
    let milli = parse_milli_units(quantity)?;
    i64::try_from(div_ceil(milli, 1000))
        .map_err(|_| QuantityError::Overflow(quantity.trim().to_string()))
}
