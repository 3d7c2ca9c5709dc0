// SPDX-License-Identifier: MIT OR Apache-2.0

//! RFC 8785 (JCS) canonical serialization of JSON values.
//!
//! The canonical form is the byte-level contract for every hash and
//! signature in Signet: two semantically equal values must serialize to
//! identical bytes. The rules:
//!
//! - object keys are Unicode-NFC normalized and sorted by code point;
//! - strings are NFC normalized, with only `"`, `\`, and control
//!   characters escaped (lowercase `\u00xx` for bare control codes);
//!   non-ASCII characters are emitted as raw UTF-8;
//! - integral numbers print without a decimal point, fractional numbers in
//!   shortest round-trip form without exponents; non-finite values are
//!   rejected;
//! - no whitespace anywhere.

use std::fmt::Write as _;

use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

/// Errors from canonical serialization.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CanonError {
    /// A number was not representable as a finite IEEE 754 double.
    #[error("non-finite number cannot be canonicalized")]
    NonFiniteNumber,
    /// Two object keys collapsed to the same string after NFC normalization.
    #[error("duplicate object key after normalization: {key}")]
    DuplicateKey {
        /// The colliding key.
        key: String,
    },
}

/// Serialize a JSON value to its canonical string form.
///
/// # Errors
///
/// Returns [`CanonError`] for non-finite numbers or NFC key collisions.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use signet_core::canonical_json;
///
/// let a = canonical_json(&json!({"b": 1, "a": 2})).unwrap();
/// assert_eq!(a, r#"{"a":2,"b":1}"#);
/// ```
pub fn canonical_json(value: &Value) -> Result<String, CanonError> {
    let mut out = String::new();
    write_value(value, &mut out)?;
    Ok(out)
}

/// Serialize a JSON value to its canonical UTF-8 bytes.
pub fn canonical_bytes(value: &Value) -> Result<Vec<u8>, CanonError> {
    canonical_json(value).map(String::into_bytes)
}

fn write_value(value: &Value, out: &mut String) -> Result<(), CanonError> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => write_number(n, out)?,
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            // Keys are normalized before sorting so that visually identical
            // keys occupy one slot. UTF-8 byte order equals code-point order.
            let mut entries: Vec<(String, &Value)> = map
                .iter()
                .map(|(k, v)| (k.nfc().collect::<String>(), v))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            for pair in entries.windows(2) {
                if pair[0].0 == pair[1].0 {
                    return Err(CanonError::DuplicateKey {
                        key: pair[0].0.clone(),
                    });
                }
            }
            out.push('{');
            for (i, (key, val)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_escaped(key, out);
                out.push(':');
                write_value(val, out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn write_number(n: &serde_json::Number, out: &mut String) -> Result<(), CanonError> {
    if let Some(i) = n.as_i64() {
        let _ = write!(out, "{i}");
        return Ok(());
    }
    if let Some(u) = n.as_u64() {
        let _ = write!(out, "{u}");
        return Ok(());
    }
    let f = n.as_f64().ok_or(CanonError::NonFiniteNumber)?;
    if !f.is_finite() {
        return Err(CanonError::NonFiniteNumber);
    }
    // Integral doubles (including -0.0) print without a decimal point as
    // long as they sit inside the exact-integer range of f64.
    if f == f.trunc() && f.abs() < 9_007_199_254_740_992.0 {
        let _ = write!(out, "{}", f as i64);
    } else {
        // Rust's shortest round-trip formatting: no trailing zeros, no
        // exponent notation, no `+` signs.
        let _ = write!(out, "{f}");
    }
    Ok(())
}

fn write_string(s: &str, out: &mut String) {
    let normalized: String = s.nfc().collect();
    write_escaped(&normalized, out);
}

/// Escape an already-normalized string into `out`.
fn write_escaped(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{0008}' => out.push_str("\\b"),
            '\u{000C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars() {
        assert_eq!(canonical_json(&json!(null)).unwrap(), "null");
        assert_eq!(canonical_json(&json!(true)).unwrap(), "true");
        assert_eq!(canonical_json(&json!(false)).unwrap(), "false");
    }

    #[test]
    fn keys_sorted_by_code_point() {
        let v = json!({"b": 1, "a": 2, "B": 3, "0": 4});
        // '0' < 'B' < 'a' < 'b' in code-point order.
        assert_eq!(
            canonical_json(&v).unwrap(),
            r#"{"0":4,"B":3,"a":2,"b":1}"#
        );
    }

    #[test]
    fn nested_structures_have_no_whitespace() {
        let v = json!({"a": [1, {"z": null, "y": [true]}], "b": "x"});
        assert_eq!(
            canonical_json(&v).unwrap(),
            r#"{"a":[1,{"y":[true],"z":null}],"b":"x"}"#
        );
    }

    #[test]
    fn integers_print_without_decimal_point() {
        assert_eq!(canonical_json(&json!(1000)).unwrap(), "1000");
        assert_eq!(canonical_json(&json!(-7)).unwrap(), "-7");
        assert_eq!(canonical_json(&json!(0)).unwrap(), "0");
        assert_eq!(
            canonical_json(&json!(u64::MAX)).unwrap(),
            "18446744073709551615"
        );
    }

    #[test]
    fn integral_doubles_print_as_integers() {
        let v: Value = serde_json::from_str("10.0").unwrap();
        assert_eq!(canonical_json(&v).unwrap(), "10");
        let v: Value = serde_json::from_str("-0.0").unwrap();
        assert_eq!(canonical_json(&v).unwrap(), "0");
    }

    #[test]
    fn fractional_values_keep_shortest_form() {
        let v: Value = serde_json::from_str("10.5").unwrap();
        assert_eq!(canonical_json(&v).unwrap(), "10.5");
        let v: Value = serde_json::from_str("0.1").unwrap();
        assert_eq!(canonical_json(&v).unwrap(), "0.1");
        // Trailing zeros in the source do not survive.
        let v: Value = serde_json::from_str("1.2500").unwrap();
        assert_eq!(canonical_json(&v).unwrap(), "1.25");
    }

    #[test]
    fn control_characters_escape_lowercase() {
        let v = json!("a\u{0001}b");
        assert_eq!(canonical_json(&v).unwrap(), "\"a\\u0001b\"");
        let v = json!("tab\there\nand\r");
        assert_eq!(canonical_json(&v).unwrap(), r#""tab\there\nand\r""#);
    }

    #[test]
    fn non_ascii_emitted_raw() {
        let v = json!("héllo ☃");
        assert_eq!(canonical_json(&v).unwrap(), "\"héllo ☃\"");
    }

    #[test]
    fn strings_are_nfc_normalized() {
        // U+0065 U+0301 (e + combining acute) normalizes to U+00E9 (é).
        let decomposed = json!("e\u{0301}");
        let composed = json!("é");
        assert_eq!(
            canonical_json(&decomposed).unwrap(),
            canonical_json(&composed).unwrap()
        );
    }

    #[test]
    fn nfc_key_collision_is_an_error() {
        let mut map = serde_json::Map::new();
        map.insert("e\u{0301}".to_string(), json!(1));
        map.insert("é".to_string(), json!(2));
        let err = canonical_json(&Value::Object(map)).unwrap_err();
        assert!(matches!(err, CanonError::DuplicateKey { .. }));
    }

    #[test]
    fn quote_and_backslash_escaped() {
        let v = json!("say \"hi\" \\ bye");
        assert_eq!(canonical_json(&v).unwrap(), r#""say \"hi\" \\ bye""#);
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let v = json!({
            "invoice_id": "INV-1",
            "amount": 1000,
            "nested": {"z": [1.5, "é"], "a": null}
        });
        let once = canonical_json(&v).unwrap();
        let reparsed: Value = serde_json::from_str(&once).unwrap();
        let twice = canonical_json(&reparsed).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn semantically_equal_representations_agree() {
        let a: Value = serde_json::from_str(r#"{ "x" : 1.0 , "y" : "é" }"#).unwrap();
        let b: Value = serde_json::from_str("{\"y\":\"é\",\"x\":1}").unwrap();
        assert_eq!(canonical_json(&a).unwrap(), canonical_json(&b).unwrap());
    }

    #[test]
    fn canonical_bytes_matches_string() {
        let v = json!({"k": "v"});
        assert_eq!(
            canonical_bytes(&v).unwrap(),
            canonical_json(&v).unwrap().into_bytes()
        );
    }
}
