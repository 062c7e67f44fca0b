//! Cast engine: transforms an instance document across minor versions of the
//! same schema, following the backward-compatibility relation (spec §4.5).

use serde_json::{Map, Value};

use crate::compat;
use crate::error::StoreError;
use crate::id::Id;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CastDiagnostics {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub defaulted: Vec<String>,
}

/// Casts `instance_doc` (identified by `source_id`) from `source_schema_doc`
/// to `target_schema_doc`, re-stamping the instance's schema reference and
/// preserving its identity suffix.
///
/// # Errors
/// Returns [`StoreError::MajorMismatch`] if the schemas differ in MAJOR, or
/// [`StoreError::NotCastable`] if the source schema is not backward
/// compatible with the target.
pub fn cast(
    source_id: &Id,
    source_schema_id: &Id,
    source_schema_doc: &Value,
    target_schema_id: &Id,
    target_schema_doc: &Value,
    instance_doc: &Value,
    instance_id_key: &str,
) -> Result<(Value, CastDiagnostics), StoreError> {
    if source_schema_id.major != target_schema_id.major {
        return Err(StoreError::MajorMismatch {
            a: source_schema_id.raw.clone(),
            b: target_schema_id.raw.clone(),
        });
    }

    let verdict = compat::compare(source_schema_id, source_schema_doc, target_schema_id, target_schema_doc)?;
    if !verdict.backward {
        return Err(StoreError::NotCastable {
            instance: source_id.raw.clone(),
            target: target_schema_id.raw.clone(),
            offending: verdict.backward_issues,
        });
    }

    let mut diagnostics = CastDiagnostics::default();
    let transformed = transform(
        "",
        source_schema_doc,
        target_schema_doc,
        instance_doc,
        &mut diagnostics,
    );

    let mut transformed = transformed;
    if let Some(inst) = &source_id.instance
        && let Value::Object(obj) = &mut transformed
    {
        let new_id = format!("{}{}", target_schema_id.raw, inst.raw);
        obj.insert(instance_id_key.to_owned(), Value::String(new_id));
    }

    Ok((transformed, diagnostics))
}

/// Recursively transforms `value` from `source_schema` to `target_schema`.
/// Non-object values pass through unchanged.
fn transform(
    path: &str,
    source_schema: &Value,
    target_schema: &Value,
    value: &Value,
    diagnostics: &mut CastDiagnostics,
) -> Value {
    let Value::Object(source_obj) = value else {
        return value.clone();
    };

    let target_props = target_schema.get("properties").and_then(Value::as_object);
    let source_props_schema = source_schema.get("properties").and_then(Value::as_object);
    let target_required: Vec<String> = target_schema
        .get("required")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect())
        .unwrap_or_default();
    let additional_allowed = target_schema.get("additionalProperties") != Some(&Value::Bool(false));

    let mut result = Map::new();

    for (key, value) in source_obj {
        let field_path = format!("{path}.{key}");
        let target_field_schema = target_props.and_then(|m| m.get(key));
        match target_field_schema {
            Some(target_sub) => {
                let source_sub = source_props_schema.and_then(|m| m.get(key)).unwrap_or(&Value::Null);
                let new_value = if let Some(constant) = target_sub.get("const") {
                    constant.clone()
                } else if value.is_object() || value.is_array() {
                    transform(&field_path, source_sub, target_sub, value, diagnostics)
                } else {
                    value.clone()
                };
                result.insert(key.clone(), new_value);
            }
            None => {
                if additional_allowed {
                    result.insert(key.clone(), value.clone());
                } else {
                    diagnostics.removed.push(field_path);
                }
            }
        }
    }

    if let Some(target_props) = target_props {
        for (key, field_schema) in target_props {
            if result.contains_key(key) {
                continue;
            }
            if target_required.contains(key) {
                if let Some(default) = field_schema.get("default") {
                    result.insert(key.clone(), default.clone());
                    let field_path = format!("{path}.{key}");
                    diagnostics.added.push(field_path.clone());
                    diagnostics.defaulted.push(field_path);
                }
            }
        }
    }

    Value::Object(result)
}
