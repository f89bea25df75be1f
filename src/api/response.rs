use super::Error;
use serde_json::{Map, Value};

/// Closing sequences tried after each truncation when salvaging a cut-off payload
const SALVAGE_SUFFIXES: [&str; 6] = ["}", "}}", "}}}", "}}}}", "]}", "]}}"];
const SALVAGE_ROUNDS: usize = 10;

/// Read the whole body of `response` and parse it with [`parse_tolerant_str`].
pub async fn parse_tolerant(response: reqwest::Response, label: &str) -> Result<Value, Error> {
    let text = response
        .text()
        .await
        .map_err(|e| Error::Network(format!("Error reading {} response: {}", label, e)))?;

    parse_tolerant_str(&text, label)
}

/// Parse JSON coming from a data endpoint.
///
/// An HTML body means upstream bounced us to its login page, reported as
/// `Error::SessionExpired`. Truncated JSON is salvaged where possible; anything else
/// degrades to an empty object.
pub fn parse_tolerant_str(text: &str, label: &str) -> Result<Value, Error> {
    log::trace!("{}: {}", label, text);

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Ok(value);
    }

    if text.trim_start().starts_with('<') {
        return Err(Error::SessionExpired(label.to_string()));
    }

    match salvage(text) {
        Some(value) => {
            log::warn!("{}: salvaged truncated JSON response", label);
            Ok(value)
        }
        None => {
            log::warn!(
                "{}: unparsable response ({} bytes), using empty object",
                label,
                text.len()
            );
            Ok(empty_object())
        }
    }
}

/// Cut `text` at its last comma and try to close it, up to `SALVAGE_ROUNDS` times.
fn salvage(text: &str) -> Option<Value> {
    let mut candidate = text;

    for _ in 0..SALVAGE_ROUNDS {
        let cut = candidate.rfind(',')?;
        candidate = &candidate[..cut];

        for suffix in SALVAGE_SUFFIXES.iter() {
            let attempt = format!("{}{}", candidate, suffix);
            if let Ok(value) = serde_json::from_str::<Value>(&attempt) {
                return Some(value);
            }
        }
    }

    None
}

pub fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Return the object stored under `key`, the value itself when it is an object without
/// that envelope, or an empty object.
pub fn unwrap_envelope(value: Value, key: &str) -> Value {
    match value {
        Value::Object(mut map) => match map.remove(key) {
            Some(inner @ Value::Object(_)) => inner,
            Some(_) => empty_object(),
            None => Value::Object(map),
        },
        _ => empty_object(),
    }
}

/// Identifier-like value as string; upstream mixes numbers and strings for ids.
pub fn json_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First candidate key of `object` holding a usable string.
pub fn first_string(object: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find_map(json_string)
}
