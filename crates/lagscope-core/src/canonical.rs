//! Canonical JSON encoding.
//!
//! Deterministic serialization used for content hashes and stable sort
//! tie-breaks: object keys are emitted in lexicographic order at every
//! nesting level, array order is preserved, integers print without a
//! decimal point while floats keep one (`1` vs `1.0`), and strings are
//! escaped only as far as JSON structurally requires.

use std::fmt::Write;

use serde::Serialize;
use serde_json::Value;

use crate::errors::CanonicalError;

/// Encode a JSON value into its canonical string form.
///
/// Two logically-equal trees produce byte-identical output regardless of
/// map insertion order.
pub fn encode(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

/// Bridge a serializable model value into a [`Value`] for [`encode`].
pub fn to_value<T: Serialize>(value: &T) -> Result<Value, CanonicalError> {
    Ok(serde_json::to_value(value)?)
}

/// Round a millisecond (or megabyte) metric to 3 decimal places, the
/// precision applied to every numeric field at emission.
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        // serde_json's itoa/ryu formatting supplies the integer/float
        // distinction the canonical form requires.
        Value::Number(number) => {
            let _ = write!(out, "{number}");
        }
        Value::String(text) => write_string(text, out),
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            // Keys are sorted here, never taken on map iteration order.
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();

            out.push('{');
            for (index, key) in keys.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                if let Some(item) = map.get(key) {
                    write_value(item, out);
                }
            }
            out.push('}');
        }
    }
}

fn write_string(text: &str, out: &mut String) {
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ch if (ch as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", ch as u32);
            }
            ch => out.push(ch),
        }
    }
    out.push('"');
}
