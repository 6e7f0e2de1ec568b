//! SI-prefixed decimal decoding.
//!
//! Simulator listings print values like `1.500n`, `2.000k` or `3.3`. A value is
//! a decimal mantissa (optional sign, fraction and `e` exponent) followed by at
//! most one magnitude suffix:
//!
//! ```text
//! a 1e-18   f 1e-15   p 1e-12   n 1e-9    u 1e-6   m 1e-3
//! k 1e3     x,M 1e6   g,G 1e9   t,T 1e12
//! ```
//!
//! Suffixes are case-sensitive (`m` is milli, `M` is mega).

use std::str::FromStr;

use nom::character::complete::anychar;
use nom::combinator::{all_consuming, map_opt, opt};
use nom::number::complete::recognize_float;
use nom::IResult;
use nom::Parser;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

/// Decode a whole token as an SI-prefixed decimal.
///
/// Returns `None` for a malformed mantissa, an unknown suffix, or trailing
/// characters after the suffix.
pub fn parse_si_decimal(token: &str) -> Option<Decimal> {
    all_consuming(si_value)
        .parse(token)
        .ok()
        .map(|(_, value)| value)
}

/// Parse an SI-prefixed value at the start of `input`, nom style.
pub fn si_value(input: &str) -> IResult<&str, Decimal> {
    let (rest, (mantissa, multiplier)) = (recognize_float, opt(si_suffix)).parse(input)?;
    let value = parse_mantissa(mantissa)
        .and_then(|v| v.checked_mul(multiplier.unwrap_or(Decimal::ONE)))
        .ok_or_else(|| {
            nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Float,
            ))
        })?;
    Ok((rest, value))
}

/// Match a single suffix letter and return its multiplier.
fn si_suffix(input: &str) -> IResult<&str, Decimal> {
    map_opt(anychar, suffix_multiplier).parse(input)
}

fn suffix_multiplier(c: char) -> Option<Decimal> {
    let m = match c {
        'a' => Decimal::new(1, 18),
        'f' => Decimal::new(1, 15),
        'p' => Decimal::new(1, 12),
        'n' => Decimal::new(1, 9),
        'u' => Decimal::new(1, 6),
        'm' => Decimal::new(1, 3),
        'k' => Decimal::new(1_000, 0),
        'x' | 'M' => Decimal::new(1_000_000, 0),
        'g' | 'G' => Decimal::new(1_000_000_000, 0),
        't' | 'T' => Decimal::new(1_000_000_000_000, 0),
        _ => return None,
    };
    Some(m)
}

fn parse_mantissa(text: &str) -> Option<Decimal> {
    if text.contains(['e', 'E']) {
        // Exponents beyond Decimal's 28-digit scale round through f64.
        Decimal::from_scientific(text)
            .ok()
            .or_else(|| f64::from_str(text).ok().and_then(Decimal::from_f64))
    } else {
        // HSPICE prints bare zeros as `0.`
        Decimal::from_str(text.strip_suffix('.').unwrap_or(text)).ok()
    }
}
