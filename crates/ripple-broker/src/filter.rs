//! Field-equality filter evaluation.
//!
//! A filter is a JSON object. An event payload matches when every key present
//! in both the filter and the payload holds deeply equal values. Keys missing
//! from the payload do not constrain; keys missing from the filter are free.
//! Numbers compare by value, so `1` equals `1.0`.

use serde_json::{Map, Value};

/// Whether `payload` satisfies `filter`.
///
/// `None`, `null`, and non-object filters match everything.
pub fn matches(payload: &Map<String, Value>, filter: Option<&Value>) -> bool {
    let Some(Value::Object(filter)) = filter else {
        return true;
    };
    filter.iter().all(|(key, expected)| {
        payload
            .get(key)
            .is_none_or(|actual| values_equal(actual, expected))
    })
}

#[allow(clippy::float_cmp)]
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}
