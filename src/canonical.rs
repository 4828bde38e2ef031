//! Canonical JSON form used to decide whether two record bodies are equal.
//!
//! Canonical JSON has:
//! - Object keys sorted lexicographically (UTF-8 byte order)
//! - No whitespace
//! - Whole-valued floats written as integers (`10.0` and `10` compare equal)
//! - The storage identity field `_id` removed from the top level

use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::io::Write;

/// Top-level fields assigned by storage, never part of a record's content.
pub const STORAGE_FIELDS: &[&str] = &["_id"];

/// Remove storage-only identity fields from a top-level object.
pub fn strip_storage_fields(value: &mut Value) {
    if let Value::Object(map) = value {
        for field in STORAGE_FIELDS {
            map.remove(*field);
        }
    }
}

/// Serialize `value` into canonical JSON.
pub fn to_canonical_string<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let mut v = serde_json::to_value(value)?;
    strip_storage_fields(&mut v);
    let mut out = Vec::<u8>::new();
    write_value(&v, &mut out)?;
    // Only valid UTF-8 is ever written.
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Content equality of two bodies regardless of key order.
pub fn equivalent(a: &Value, b: &Value) -> bool {
    match (to_canonical_string(a), to_canonical_string(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn write_value(v: &Value, out: &mut Vec<u8>) -> Result<(), serde_json::Error> {
    match v {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => write_number(n, out)?,
        Value::String(s) => serde_json::to_writer(&mut *out, s)?,
        Value::Array(arr) => {
            out.push(b'[');
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(item, out)?;
            }
            out.push(b']');
        }
        Value::Object(map) => write_object(map, out)?,
    }
    Ok(())
}

fn write_object(map: &Map<String, Value>, out: &mut Vec<u8>) -> Result<(), serde_json::Error> {
    out.push(b'{');

    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    for (i, k) in keys.iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        serde_json::to_writer(&mut *out, *k)?;
        out.push(b':');
        if let Some(val) = map.get(*k) {
            write_value(val, out)?;
        }
    }

    out.push(b'}');
    Ok(())
}

// Largest integer an f64 represents exactly.
const MAX_EXACT_F64: f64 = 9_007_199_254_740_992.0;

fn write_number(n: &Number, out: &mut Vec<u8>) -> Result<(), serde_json::Error> {
    if let Some(i) = n.as_i64() {
        write!(out, "{i}").map_err(serde_json::Error::io)?;
    } else if let Some(u) = n.as_u64() {
        write!(out, "{u}").map_err(serde_json::Error::io)?;
    } else if let Some(f) = n.as_f64() {
        if f.fract() == 0.0 && f.abs() < MAX_EXACT_F64 {
            write!(out, "{}", f as i64).map_err(serde_json::Error::io)?;
        } else {
            serde_json::to_writer(&mut *out, &f)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_matter() {
        let a: Value = serde_json::from_str(r#"{"b":1,"a":{"y":2,"x":[1,{"q":1,"p":2}]}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a":{"x":[1,{"p":2,"q":1}],"y":2},"b":1}"#).unwrap();
        assert!(equivalent(&a, &b));
        assert_eq!(
            to_canonical_string(&a).unwrap(),
            r#"{"a":{"x":[1,{"p":2,"q":1}],"y":2},"b":1}"#
        );
    }

    #[test]
    fn array_order_matters() {
        assert!(!equivalent(&json!({"a": [1, 2]}), &json!({"a": [2, 1]})));
    }

    #[test]
    fn storage_ids_are_ignored() {
        let stored = json!({"_id": "abc", "notamId": "4/1234", "stopDate": 5});
        let fresh = json!({"notamId": "4/1234", "stopDate": 5});
        assert!(equivalent(&stored, &fresh));
    }

    #[test]
    fn plain_id_is_content() {
        let mut body = json!({"_id": "abc", "id": "KXMR", "temperature": 80});
        strip_storage_fields(&mut body);
        assert_eq!(body, json!({"id": "KXMR", "temperature": 80}));
        assert!(!equivalent(&json!({"id": 1}), &json!({"id": 2})));
    }

    #[test]
    fn whole_floats_match_integers() {
        assert!(equivalent(&json!({"t": 10.0}), &json!({"t": 10})));
        assert!(!equivalent(&json!({"t": 10.5}), &json!({"t": 10})));
        assert_eq!(to_canonical_string(&json!({"t": 10.5})).unwrap(), r#"{"t":10.5}"#);
    }

    #[test]
    fn strings_are_escaped() {
        assert_eq!(
            to_canonical_string(&json!({"s": "a\"b"})).unwrap(),
            r#"{"s":"a\"b"}"#
        );
    }
}
