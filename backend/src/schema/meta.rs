//! Meta-schema for validation schema documents.
//!
//! The meta-schema is a JSON Schema (draft 7) embedded at compile time from
//! `schemas/validation-config.schema.json`. It is an offline contract check
//! for template authors (tests and the `check-schema` command); the
//! validation pipeline never calls it.

use once_cell::sync::Lazy;
use serde_json::Value;

static VALIDATION_CONFIG_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/validation-config.schema.json"))
        .expect("Invalid embedded schema")
});

/// The JSON Schema describing validation schema documents.
pub fn validation_config_json_schema() -> &'static Value {
    &VALIDATION_CONFIG_SCHEMA
}

/// Validate a JSON document against a JSON Schema.
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(Vec<String>)` with every violation otherwise
///
/// # Example
/// ```ignore
/// let schema = json!({ "type": "object", "required": ["name"] });
/// assert!(validate(&schema, &json!({ "name": "x" })).is_ok());
/// assert!(validate(&schema, &json!({})).is_err());
/// ```
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator = jsonschema::draft7::new(schema).map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Check a validation schema document against the meta-schema.
pub fn check_config(config: &Value) -> Result<(), Vec<String>> {
    validate(validation_config_json_schema(), config)
}
