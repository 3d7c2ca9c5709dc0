// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic invariants between the original (malformed) argument text and
//! the repaired object.
//!
//! The original text never parsed, so comparison works on whatever literal
//! values loose regex parsing can recover from it: `"key": 123` and
//! `"key": "value"` pairs. A repair may fix syntax; it may not move money,
//! change a currency, or rewrite an identifier.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// `"key": <string or number literal>` pairs recoverable by loose parsing.
static KEY_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#""([A-Za-z_][A-Za-z0-9_]*)"\s*:\s*(?:"((?:[^"\\]|\\.)*)"|(-?\d+(?:\.\d+)?))"#,
    )
    .expect("literal-recovery regex compiles")
});

/// Literal values recovered from malformed JSON text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecoveredLiterals {
    /// Numeric literals by key.
    pub numbers: BTreeMap<String, f64>,
    /// String literals by key.
    pub strings: BTreeMap<String, String>,
}

/// Loosely parse malformed JSON text, recovering flat `key: literal` pairs.
///
/// Later occurrences of a key win, matching how a strict parser would treat
/// duplicate keys.
#[must_use]
pub fn recover_literals(text: &str) -> RecoveredLiterals {
    let mut out = RecoveredLiterals::default();
    for caps in KEY_LITERAL.captures_iter(text) {
        let key = caps[1].to_string();
        if let Some(s) = caps.get(2) {
            out.numbers.remove(&key);
            out.strings.insert(key, s.as_str().to_string());
        } else if let Some(n) = caps.get(3) {
            if let Ok(parsed) = n.as_str().parse::<f64>() {
                out.strings.remove(&key);
                out.numbers.insert(key, parsed);
            }
        }
    }
    out
}

fn is_quantity_key(key: &str) -> bool {
    key.contains("amount")
        || key.contains("price")
        || key.contains("total")
        || key.contains("quantity")
}

fn is_identifier_key(key: &str) -> bool {
    key == "id" || key.ends_with("_id")
}

fn is_currency_key(key: &str) -> bool {
    key.contains("currency")
}

fn looks_like_currency_code(s: &str) -> bool {
    s.len() == 3 && s.chars().all(|c| c.is_ascii_uppercase())
}

/// Minor units per major unit for the `amount` → `amount_minor`
/// normalization rule.
const MINOR_UNITS_MULTIPLIER: f64 = 100.0;

/// Compare recovered literals against the repaired object and list every
/// violated invariant. An empty list means the repair is admissible.
///
/// Violation codes are stable: `amount_changed:<key>`,
/// `currency_changed:<key>`, `identifier_changed:<key>`,
/// `required_field_dropped:<key>`, and `repaired_not_object`.
#[must_use]
pub fn check_invariants(
    recovered: &RecoveredLiterals,
    repaired: &Value,
    required_fields: &[String],
) -> Vec<String> {
    let mut violations = Vec::new();
    let Some(obj) = repaired.as_object() else {
        return vec!["repaired_not_object".to_string()];
    };

    for (key, original) in &recovered.numbers {
        if !is_quantity_key(key) {
            continue;
        }
        if let Some(now) = obj.get(key).and_then(Value::as_f64) {
            if now != *original {
                violations.push(format!("amount_changed:{key}"));
            }
        } else if let Some(minor) = obj
            .get(&format!("{key}_minor"))
            .and_then(Value::as_f64)
        {
            // Unit-normalized comparison: amount and amount_minor agree
            // when scaled by the minor-units multiplier.
            if minor != original * MINOR_UNITS_MULTIPLIER {
                violations.push(format!("amount_changed:{key}"));
            }
        }
    }

    for (key, original) in &recovered.strings {
        if is_currency_key(key) && looks_like_currency_code(original) {
            match obj.get(key).and_then(Value::as_str) {
                Some(now) if now == original => {}
                _ => violations.push(format!("currency_changed:{key}")),
            }
        } else if is_identifier_key(key) {
            if let Some(now) = obj.get(key).and_then(Value::as_str) {
                if now != original {
                    violations.push(format!("identifier_changed:{key}"));
                }
            }
        }
    }

    for field in required_fields {
        if !obj.contains_key(field) {
            violations.push(format!("required_field_dropped:{field}"));
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BROKEN: &str = r#"{"invoice_id":"INV-2","amount":1000,"currency":"USD","#;

    fn required() -> Vec<String> {
        vec!["invoice_id".into(), "amount".into(), "currency".into()]
    }

    #[test]
    fn recovers_literals_from_truncated_object() {
        let rec = recover_literals(BROKEN);
        assert_eq!(rec.numbers["amount"], 1000.0);
        assert_eq!(rec.strings["invoice_id"], "INV-2");
        assert_eq!(rec.strings["currency"], "USD");
    }

    #[test]
    fn recovers_negative_and_decimal_numbers() {
        let rec = recover_literals(r#"{"amount": -12.75, "total": 3"#);
        assert_eq!(rec.numbers["amount"], -12.75);
        assert_eq!(rec.numbers["total"], 3.0);
    }

    #[test]
    fn later_duplicate_key_wins() {
        let rec = recover_literals(r#"{"amount": 1, "amount": 2,"#);
        assert_eq!(rec.numbers["amount"], 2.0);
    }

    #[test]
    fn faithful_repair_passes() {
        let repaired = json!({"invoice_id": "INV-2", "amount": 1000, "currency": "USD"});
        let violations = check_invariants(&recover_literals(BROKEN), &repaired, &required());
        assert!(violations.is_empty(), "unexpected: {violations:?}");
    }

    #[test]
    fn amount_mutation_detected() {
        let repaired = json!({"invoice_id": "INV-2", "amount": 10, "currency": "USD"});
        let violations = check_invariants(&recover_literals(BROKEN), &repaired, &required());
        assert!(violations.contains(&"amount_changed:amount".to_string()));
    }

    #[test]
    fn amount_minor_unit_normalization_accepted() {
        let repaired = json!({
            "invoice_id": "INV-2",
            "amount_minor": 100000,
            "currency": "USD",
            "amount": 1000
        });
        let violations = check_invariants(&recover_literals(BROKEN), &repaired, &[]);
        assert!(violations.is_empty(), "unexpected: {violations:?}");
    }

    #[test]
    fn inconsistent_amount_minor_detected() {
        let repaired = json!({"invoice_id": "INV-2", "amount_minor": 1000, "currency": "USD"});
        let violations = check_invariants(&recover_literals(BROKEN), &repaired, &[]);
        assert!(violations.contains(&"amount_changed:amount".to_string()));
    }

    #[test]
    fn currency_mutation_detected() {
        let repaired = json!({"invoice_id": "INV-2", "amount": 1000, "currency": "EUR"});
        let violations = check_invariants(&recover_literals(BROKEN), &repaired, &required());
        assert!(violations.contains(&"currency_changed:currency".to_string()));
    }

    #[test]
    fn dropped_currency_detected() {
        let repaired = json!({"invoice_id": "INV-2", "amount": 1000});
        let violations = check_invariants(&recover_literals(BROKEN), &repaired, &required());
        assert!(violations.contains(&"currency_changed:currency".to_string()));
        assert!(violations.contains(&"required_field_dropped:currency".to_string()));
    }

    #[test]
    fn identifier_mutation_detected() {
        let repaired = json!({"invoice_id": "INV-99", "amount": 1000, "currency": "USD"});
        let violations = check_invariants(&recover_literals(BROKEN), &repaired, &required());
        assert!(violations.contains(&"identifier_changed:invoice_id".to_string()));
    }

    #[test]
    fn non_quantity_numbers_unconstrained() {
        let rec = recover_literals(r#"{"retries": 3, "amount": 5"#);
        let repaired = json!({"retries": 9, "amount": 5});
        assert!(check_invariants(&rec, &repaired, &[]).is_empty());
    }

    #[test]
    fn non_currency_strings_unconstrained() {
        let rec = recover_literals(r#"{"memo": "abc", "amount": 5"#);
        let repaired = json!({"memo": "different", "amount": 5});
        assert!(check_invariants(&rec, &repaired, &[]).is_empty());
    }

    #[test]
    fn non_object_repair_rejected() {
        let violations = check_invariants(&recover_literals(BROKEN), &json!([1, 2]), &[]);
        assert_eq!(violations, vec!["repaired_not_object".to_string()]);
    }

    #[test]
    fn lowercase_three_letter_string_is_not_a_currency_code() {
        let rec = recover_literals(r#"{"currency_hint": "usd","#);
        let repaired = json!({"currency_hint": "eur"});
        assert!(check_invariants(&rec, &repaired, &[]).is_empty());
    }
}
