//! Field normalization shared by every source.
//!
//! RULE: Nothing is compared, looked up or stored before it passes through
//! one of these functions. None of them panic; malformed input degrades
//! to None.

use serde_json::Value;

/// Characters removed anywhere in a vessel name.
const NAME_STRIP: &[char] = &['"', '\'', '`', '!', '*', '-', '.', '_', '/'];

/// Normalize a vessel name: strip punctuation, collapse whitespace, trim,
/// uppercase. Never returns an empty string.
pub fn normalize_name(raw: Option<&str>) -> Option<String> {
    let raw = raw?;
    let stripped: String = raw.chars().filter(|c| !NAME_STRIP.contains(c)).collect();
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    let upper = collapsed.to_uppercase();
    if upper.is_empty() {
        None
    } else {
        Some(upper)
    }
}

/// Trim and uppercase a country name or country code.
pub fn normalize_country(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}

/// Whitespace-only callsigns are stored as null.
pub fn normalize_callsign(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Trim an MMSI or IMO. Empty → None.
pub fn normalize_identifier(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Render a scalar JSON value as text. Integral floats lose their
/// fractional part so `123.0` and `123` produce the same identifier.
pub fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                let f = n.as_f64()?;
                if f.fract() == 0.0 && f.is_finite() {
                    Some(format!("{f:.0}"))
                } else {
                    Some(f.to_string())
                }
            }
        }
        _ => None,
    }
}

/// Coerce a JSON number or numeric string to f64.
pub fn to_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}
