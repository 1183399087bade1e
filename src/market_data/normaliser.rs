// Convert wire strings into canonical floats.
// Snapshot and delta paths both go through here so price equality holds.

use crate::market_data::adapters::ProtocolError;

pub fn parse_price(s: &str) -> Result<f64, ProtocolError> {
    parse_number("price", s)
}

pub fn parse_size(s: &str) -> Result<f64, ProtocolError> {
    parse_number("size", s)
}

/// Millisecond timestamps some venues send as strings (e.g. `"1695716059516"`).
pub fn parse_millis(s: &str) -> Result<u64, ProtocolError> {
    let trimmed = s.trim();
    if let Ok(ms) = trimmed.parse::<u64>() {
        return Ok(ms);
    }
    // fall back to float notation, truncating fractional millis
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v as u64),
        _ => Err(ProtocolError::InvalidNumber { field: "timestamp", value: s.to_string() }),
    }
}

/// Convert `[price, size]` string tuples into `(price, size)` pairs.
pub fn norm_side(levels: &[(String, String)]) -> Result<Vec<(f64, f64)>, ProtocolError> {
    levels
        .iter()
        .map(|(px, sz)| Ok((parse_price(px)?, parse_size(sz)?)))
        .collect()
}

fn parse_number(field: &'static str, s: &str) -> Result<f64, ProtocolError> {
    match s.trim().parse::<f64>() {
        // sizes and prices are never negative on the wire
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(ProtocolError::InvalidNumber { field, value: s.to_string() }),
    }
}
