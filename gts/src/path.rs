//! Attribute-path resolution: dotted/bracketed navigation into a JSON document,
//! plus `@`-prefixed metadata paths that select segments of an entity's id
//! instead of document fields.

use serde_json::Value;

use crate::error::PathError;
use crate::id::Id;

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Key(String),
    Index(usize),
}

/// Splits a path string into its navigable parts.
///
/// Accepts dotted notation (`a.b.c`), integer array indices either dotted
/// (`a.0.b`) or bracketed (`a[0].b`), and single/double-quoted bracket keys
/// (`a["b.c"]`).
fn split_parts(path: &str) -> Result<Vec<Part>, PathError> {
    if path.is_empty() {
        return Err(PathError::EmptyPath);
    }

    let mut parts = Vec::new();
    let mut chars = path.chars().peekable();
    let mut current = String::new();

    let flush = |current: &mut String, parts: &mut Vec<Part>| {
        if !current.is_empty() {
            let token = std::mem::take(current);
            match token.parse::<usize>() {
                Ok(idx) => parts.push(Part::Index(idx)),
                Err(_) => parts.push(Part::Key(token)),
            }
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '.' => flush(&mut current, &mut parts),
            '[' => {
                flush(&mut current, &mut parts);
                let mut bracket = String::new();
                let mut quote: Option<char> = None;
                for bc in chars.by_ref() {
                    match (bc, quote) {
                        (']', None) => break,
                        ('\'' | '"', None) => quote = Some(bc),
                        (q, Some(active)) if q == active => quote = None,
                        _ => bracket.push(bc),
                    }
                }
                if let Ok(idx) = bracket.parse::<usize>() {
                    parts.push(Part::Index(idx));
                } else {
                    parts.push(Part::Key(bracket));
                }
                // Skip a following '.' if the user wrote `a[0].b`.
                if chars.peek() == Some(&'.') {
                    chars.next();
                }
            }
            _ => current.push(c),
        }
    }
    flush(&mut current, &mut parts);

    Ok(parts)
}

fn navigate<'a>(value: &'a Value, parts: &[Part], path: &str) -> Result<&'a Value, PathError> {
    let mut current = value;
    for part in parts {
        current = match (current, part) {
            (Value::Object(map), Part::Key(key)) => {
                map.get(key).ok_or_else(|| PathError::NoSuchPath { path: path.to_owned() })?
            }
            (Value::Array(arr), Part::Index(idx)) => {
                arr.get(*idx).ok_or_else(|| PathError::NoSuchPath { path: path.to_owned() })?
            }
            (Value::Object(_) | Value::Array(_), _) => {
                return Err(PathError::NoSuchPath { path: path.to_owned() });
            }
            _ => return Err(PathError::PathTypeMismatch { path: path.to_owned() }),
        };
    }
    Ok(current)
}

/// Resolves a metadata path (`@id`, `@schema`, `@vendor`, ...) against an id.
fn resolve_metadata(id: &Id, field: &str) -> Result<Value, PathError> {
    let value = match field {
        "id" => Value::String(id.raw.clone()),
        "schema" => Value::String(id.schema_id()),
        "vendor" => Value::String(id.vendor.clone()),
        "package" => Value::String(id.package.clone()),
        "namespace" => Value::Array(id.namespace.iter().cloned().map(Value::String).collect()),
        "type" => Value::String(id.type_name.clone()),
        "major" => Value::Number(id.major.into()),
        "minor" => id.minor.map_or(Value::Null, |m| Value::Number(m.into())),
        "patch" => id.patch.map_or(Value::Null, |p| Value::Number(p.into())),
        "instance" => id.instance.as_ref().map_or(Value::Null, |i| Value::String(i.raw.clone())),
        _ => return Err(PathError::NoSuchPath { path: format!("@{field}") }),
    };
    Ok(value)
}

/// Resolves `path` against `document`/`id`. A leading `@` selects metadata
/// derived from `id`; otherwise the path navigates `document`.
///
/// # Errors
/// Returns [`PathError::EmptyPath`], [`PathError::NoSuchPath`], or
/// [`PathError::PathTypeMismatch`] as appropriate.
pub fn resolve(document: &Value, id: &Id, path: &str) -> Result<Value, PathError> {
    if path.is_empty() {
        return Err(PathError::EmptyPath);
    }
    if let Some(field) = path.strip_prefix('@') {
        if field.is_empty() {
            return Err(PathError::EmptyPath);
        }
        let parts = split_parts(field)?;
        let Part::Key(head) = &parts[0] else {
            return Err(PathError::NoSuchPath { path: path.to_owned() });
        };
        let base = resolve_metadata(id, head)?;
        return navigate(&base, &parts[1..], path).cloned();
    }

    let parts = split_parts(path)?;
    navigate(document, &parts, path).cloned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_id() -> Id {
        Id::parse("gts.x.core.events.event.v1.2~i.v1").expect("test")
    }

    #[test]
    fn navigates_nested_objects() {
        let doc = json!({"a": {"b": {"c": 42}}});
        let v = resolve(&doc, &sample_id(), "a.b.c").expect("test");
        assert_eq!(v, json!(42));
    }

    #[test]
    fn navigates_array_by_dotted_index() {
        let doc = json!({"a": [{"b": 1}, {"b": 2}]});
        let v = resolve(&doc, &sample_id(), "a.1.b").expect("test");
        assert_eq!(v, json!(2));
    }

    #[test]
    fn navigates_array_by_bracket_index() {
        let doc = json!({"a": [10, 20, 30]});
        let v = resolve(&doc, &sample_id(), "a[2]").expect("test");
        assert_eq!(v, json!(30));
    }

    #[test]
    fn missing_field_is_no_such_path() {
        let doc = json!({"a": 1});
        let err = resolve(&doc, &sample_id(), "b").unwrap_err();
        assert!(matches!(err, PathError::NoSuchPath { .. }));
    }

    #[test]
    fn scalar_intermediate_is_type_mismatch() {
        let doc = json!({"a": 1});
        let err = resolve(&doc, &sample_id(), "a.b").unwrap_err();
        assert!(matches!(err, PathError::PathTypeMismatch { .. }));
    }

    #[test]
    fn metadata_path_selects_id_segments() {
        let id = sample_id();
        assert_eq!(resolve(&json!({}), &id, "@vendor").expect("test"), json!("x"));
        assert_eq!(resolve(&json!({}), &id, "@major").expect("test"), json!(1));
        assert_eq!(resolve(&json!({}), &id, "@id").expect("test"), json!(id.raw));
    }

    #[test]
    fn metadata_path_namespace_is_array() {
        let id = sample_id();
        assert_eq!(resolve(&json!({}), &id, "@namespace").expect("test"), json!(["events"]));
    }

    #[test]
    fn empty_path_errors() {
        let err = resolve(&json!({}), &sample_id(), "").unwrap_err();
        assert!(matches!(err, PathError::EmptyPath));
    }
}
