// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Mapping registry: (source, target) pairs resolving to pure transforms with schemas."]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # signet-mapping
//!
//! Maps `(payload_type, target_type)` pairs to a pure, deterministic
//! transform together with compiled input/output JSON-Schema validators.
//! Transforms never perform I/O; anything effectful lives in the pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};

mod invoice;

pub use invoice::{INVOICE_SOURCE, INVOICE_TARGET, invoice_transform};

// ── Errors ──────────────────────────────────────────────────────────────

/// Errors from mapping registration and transforms.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum MappingError {
    /// The requested (source, target) pair is not registered.
    #[error("no mapping registered for {source_type} -> {target}")]
    NoMapping {
        /// Source payload type.
        source_type: String,
        /// Target payload type.
        target: String,
    },
    /// A schema failed to compile at registration time.
    #[error("{which} schema failed to compile: {reason}")]
    SchemaCompile {
        /// `"input"` or `"output"`.
        which: String,
        /// Compiler diagnostic.
        reason: String,
    },
    /// The transform received input it cannot normalize.
    #[error("transform rejected input: {reason}")]
    TransformFailed {
        /// Why the input was rejected.
        reason: String,
    },
}

// ── Entry ───────────────────────────────────────────────────────────────

/// A pure transform from schema-valid input to a normalized payload.
pub type Transform = fn(&Value) -> Result<Value, MappingError>;

/// One registered mapping: transform plus compiled schemas.
pub struct MappingEntry {
    /// Source payload type tag.
    pub source: String,
    /// Target payload type tag.
    pub target: String,
    transform: Transform,
    input_schema: Value,
    input_validator: jsonschema::Validator,
    output_validator: jsonschema::Validator,
    input_properties: Vec<String>,
    required_input: Vec<String>,
}

impl std::fmt::Debug for MappingEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingEntry")
            .field("source", &self.source)
            .field("target", &self.target)
            .finish()
    }
}

impl MappingEntry {
    /// Compile a mapping entry from schemas and a transform.
    ///
    /// # Errors
    ///
    /// [`MappingError::SchemaCompile`] when either schema is invalid.
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        transform: Transform,
        input_schema: Value,
        output_schema: Value,
    ) -> Result<Self, MappingError> {
        let input_validator =
            jsonschema::validator_for(&input_schema).map_err(|e| MappingError::SchemaCompile {
                which: "input".into(),
                reason: e.to_string(),
            })?;
        let output_validator =
            jsonschema::validator_for(&output_schema).map_err(|e| MappingError::SchemaCompile {
                which: "output".into(),
                reason: e.to_string(),
            })?;
        let input_properties = schema_keys(&input_schema, "properties");
        let required_input = schema_strings(&input_schema, "required");
        Ok(Self {
            source: source.into(),
            target: target.into(),
            transform,
            input_schema,
            input_validator,
            output_validator,
            input_properties,
            required_input,
        })
    }

    /// The raw input schema, handed to the repair provider as guidance.
    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    /// Fields the input schema marks as required.
    pub fn required_input_fields(&self) -> &[String] {
        &self.required_input
    }

    /// Drop fields outside the declared input surface. Non-objects pass
    /// through untouched; canonicalization handles ordering later.
    pub fn sanitize(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .filter(|(k, _)| self.input_properties.iter().any(|p| p == *k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Validate a value against the input schema, collecting every error.
    ///
    /// # Errors
    ///
    /// A list of human-readable schema violations.
    pub fn validate_input(&self, value: &Value) -> Result<(), Vec<String>> {
        collect_errors(&self.input_validator, value)
    }

    /// Validate a value against the output schema, collecting every error.
    ///
    /// # Errors
    ///
    /// A list of human-readable schema violations.
    pub fn validate_output(&self, value: &Value) -> Result<(), Vec<String>> {
        collect_errors(&self.output_validator, value)
    }

    /// Apply the pure transform.
    ///
    /// # Errors
    ///
    /// [`MappingError::TransformFailed`] when the input cannot be normalized.
    pub fn transform(&self, value: &Value) -> Result<Value, MappingError> {
        (self.transform)(value)
    }
}

fn collect_errors(validator: &jsonschema::Validator, value: &Value) -> Result<(), Vec<String>> {
    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|e| format!("{}: {e}", e.instance_path))
        .collect();
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn schema_keys(schema: &Value, field: &str) -> Vec<String> {
    schema
        .get(field)
        .and_then(Value::as_object)
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default()
}

fn schema_strings(schema: &Value, field: &str) -> Vec<String> {
    schema
        .get(field)
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

// ── Registry ────────────────────────────────────────────────────────────

/// Collects [`MappingEntry`]s and resolves `(source, target)` lookups.
#[derive(Debug, Default)]
pub struct MappingRegistry {
    entries: HashMap<(String, String), Arc<MappingEntry>>,
}

impl MappingRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry, replacing any existing entry for the same pair.
    pub fn insert(&mut self, entry: MappingEntry) {
        let key = (entry.source.clone(), entry.target.clone());
        self.entries.insert(key, Arc::new(entry));
    }

    /// Looks up a mapping by source and target type tags.
    #[must_use]
    pub fn lookup(&self, source: &str, target: &str) -> Option<Arc<MappingEntry>> {
        self.entries
            .get(&(source.to_string(), target.to_string()))
            .cloned()
    }

    /// Returns the number of registered mappings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the registry contains no mappings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Pre-populates a registry with the built-in mappings.
#[must_use]
pub fn builtin_registry() -> MappingRegistry {
    let mut reg = MappingRegistry::new();
    reg.insert(
        MappingEntry::new(
            INVOICE_SOURCE,
            INVOICE_TARGET,
            invoice_transform,
            invoice::input_schema(),
            invoice::output_schema(),
        )
        .expect("built-in invoice schemas compile"),
    );
    reg
}

/// JSON Schema for an `amount`/`currency`/`invoice_id` tool-call payload.
pub(crate) fn object_schema(
    properties: Value,
    required: &[&str],
    additional: bool,
) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": additional,
    })
}
