//! The pluggable validation seam (spec §6, §9 "Validator pluggability"). The
//! core never constructs a validator itself — callers pass `&dyn Validator`
//! into [`crate::store::Store::validate_instance`].

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

pub trait Validator {
    /// Validates `instance` against `schema`.
    ///
    /// # Errors
    /// Returns the list of violations found, empty-free (a `Vec` is only
    /// returned on failure; success is `Ok(())`).
    fn validate(&self, instance: &Value, schema: &Value) -> Result<(), Vec<ValidationError>>;
}

/// Default validator backed by the `jsonschema` crate, compiled against
/// JSON Schema Draft 2020-12.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonschemaValidator;

impl Validator for JsonschemaValidator {
    fn validate(&self, instance: &Value, schema: &Value) -> Result<(), Vec<ValidationError>> {
        let compiled = jsonschema::JSONSchema::options()
            .with_draft(jsonschema::Draft::Draft202012)
            .compile(schema)
            .map_err(|e| {
                vec![ValidationError {
                    path: String::new(),
                    message: format!("invalid schema: {e}"),
                }]
            })?;

        let errors: Vec<ValidationError> = match compiled.validate(instance) {
            Ok(()) => Vec::new(),
            Err(iter) => iter
                .map(|e| ValidationError {
                    path: e.instance_path.to_string(),
                    message: e.to_string(),
                })
                .collect(),
        };

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_instance_passes() {
        let schema = json!({"type": "object", "required": ["a"], "properties": {"a": {"type": "string"}}});
        let instance = json!({"a": "hello"});
        assert!(JsonschemaValidator.validate(&instance, &schema).is_ok());
    }

    #[test]
    fn invalid_instance_reports_errors() {
        let schema = json!({"type": "object", "required": ["a"]});
        let instance = json!({});
        let errors = JsonschemaValidator.validate(&instance, &schema).unwrap_err();
        assert!(!errors.is_empty());
    }
}
