// SPDX-License-Identifier: MIT OR Apache-2.0

//! The built-in invoice mapping: OpenAI tool-use invoice arguments to an
//! ISO 20022-style normalized invoice.

use serde_json::{Value, json};

use crate::{MappingError, object_schema};

/// Source type tag for OpenAI tool-use invoice payloads.
pub const INVOICE_SOURCE: &str = "openai.tooluse.invoice.v1";

/// Target type tag for normalized invoices.
pub const INVOICE_TARGET: &str = "invoice.iso20022.v1";

/// Minor units per major unit for the two-decimal currencies this mapping
/// covers.
const MINOR_UNITS_MULTIPLIER: i64 = 100;

pub(crate) fn input_schema() -> Value {
    object_schema(
        json!({
            "invoice_id": {"type": "string", "minLength": 1},
            "amount": {"type": "number"},
            "currency": {"type": "string", "minLength": 3, "maxLength": 3},
        }),
        &["invoice_id", "amount", "currency"],
        true,
    )
}

pub(crate) fn output_schema() -> Value {
    object_schema(
        json!({
            "invoice_id": {"type": "string", "minLength": 1},
            "amount_minor": {"type": "integer"},
            "currency": {"type": "string", "minLength": 3, "maxLength": 3},
        }),
        &["invoice_id", "amount_minor", "currency"],
        false,
    )
}

/// Convert an invoice tool-call object into minor-unit form.
///
/// `amount` × 100 becomes the integer `amount_minor`; `invoice_id` and
/// `currency` pass through verbatim. Total on schema-valid input; the error
/// paths exist for defense against callers that skip schema validation.
///
/// # Errors
///
/// [`MappingError::TransformFailed`] when a field is missing, mistyped, or
/// the scaled amount leaves the integer range.
pub fn invoice_transform(input: &Value) -> Result<Value, MappingError> {
    let obj = input
        .as_object()
        .ok_or_else(|| reject("input is not an object"))?;
    let invoice_id = obj
        .get("invoice_id")
        .and_then(Value::as_str)
        .ok_or_else(|| reject("invoice_id missing or not a string"))?;
    let currency = obj
        .get("currency")
        .and_then(Value::as_str)
        .ok_or_else(|| reject("currency missing or not a string"))?;
    let amount = obj
        .get("amount")
        .ok_or_else(|| reject("amount missing"))?;

    let amount_minor = if let Some(i) = amount.as_i64() {
        i.checked_mul(MINOR_UNITS_MULTIPLIER)
            .ok_or_else(|| reject("amount out of range"))?
    } else if let Some(f) = amount.as_f64() {
        let scaled = (f * MINOR_UNITS_MULTIPLIER as f64).round();
        if !scaled.is_finite() || scaled.abs() >= i64::MAX as f64 {
            return Err(reject("amount out of range"));
        }
        scaled as i64
    } else {
        return Err(reject("amount is not a number"));
    };

    Ok(json!({
        "invoice_id": invoice_id,
        "amount_minor": amount_minor,
        "currency": currency,
    }))
}

fn reject(reason: &str) -> MappingError {
    MappingError::TransformFailed {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin_registry;

    #[test]
    fn integer_amount_scales_to_minor_units() {
        let out = invoice_transform(&json!({
            "invoice_id": "INV-1",
            "amount": 1000,
            "currency": "USD"
        }))
        .unwrap();
        assert_eq!(
            out,
            json!({"invoice_id": "INV-1", "amount_minor": 100000, "currency": "USD"})
        );
    }

    #[test]
    fn decimal_amount_rounds_to_minor_units() {
        let out = invoice_transform(&json!({
            "invoice_id": "INV-2",
            "amount": 12.345,
            "currency": "EUR"
        }))
        .unwrap();
        assert_eq!(out["amount_minor"], 1235);
    }

    #[test]
    fn integral_double_amount_scales_exactly() {
        let amount: Value = serde_json::from_str("10.0").unwrap();
        let out = invoice_transform(&json!({
            "invoice_id": "INV-3",
            "amount": amount,
            "currency": "USD"
        }))
        .unwrap();
        assert_eq!(out["amount_minor"], 1000);
    }

    #[test]
    fn invoice_id_preserved_verbatim() {
        let out = invoice_transform(&json!({
            "invoice_id": "INV-00x/ü",
            "amount": 1,
            "currency": "CHF"
        }))
        .unwrap();
        assert_eq!(out["invoice_id"], "INV-00x/ü");
    }

    #[test]
    fn currency_treated_as_opaque() {
        let out = invoice_transform(&json!({
            "invoice_id": "I",
            "amount": 5,
            "currency": "XTS"
        }))
        .unwrap();
        assert_eq!(out["currency"], "XTS");
    }

    #[test]
    fn missing_fields_rejected() {
        assert!(invoice_transform(&json!({"amount": 1, "currency": "USD"})).is_err());
        assert!(invoice_transform(&json!({"invoice_id": "I", "currency": "USD"})).is_err());
        assert!(invoice_transform(&json!({"invoice_id": "I", "amount": 1})).is_err());
        assert!(invoice_transform(&json!("not an object")).is_err());
    }

    #[test]
    fn overflow_amount_rejected() {
        assert!(invoice_transform(&json!({
            "invoice_id": "I",
            "amount": i64::MAX,
            "currency": "USD"
        }))
        .is_err());
    }

    #[test]
    fn transform_is_deterministic() {
        let input = json!({"invoice_id": "INV-9", "amount": 42.5, "currency": "GBP"});
        let a = invoice_transform(&input).unwrap();
        let b = invoice_transform(&input).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn output_passes_output_schema() {
        let reg = builtin_registry();
        let entry = reg.lookup(INVOICE_SOURCE, INVOICE_TARGET).unwrap();
        let out = entry
            .transform(&json!({"invoice_id": "INV-1", "amount": 1000, "currency": "USD"}))
            .unwrap();
        assert!(entry.validate_output(&out).is_ok());
    }

    #[test]
    fn output_schema_rejects_extra_fields() {
        let reg = builtin_registry();
        let entry = reg.lookup(INVOICE_SOURCE, INVOICE_TARGET).unwrap();
        let bad = json!({
            "invoice_id": "INV-1",
            "amount_minor": 100,
            "currency": "USD",
            "extra": 1
        });
        assert!(entry.validate_output(&bad).is_err());
    }
}
