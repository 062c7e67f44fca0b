//! Minor-version compatibility engine: decides backward/forward/full
//! compatibility between two schema bodies sharing vendor/package/namespace/
//! type/MAJOR.
//!
//! Implemented as an explicit worklist over `(path, producing_node,
//! accepting_node)` triples rather than naive recursion, per the REDESIGN
//! FLAGS note on bounding stack depth over arbitrary JSON Schema trees.

use serde_json::Value;
use std::collections::VecDeque;

use crate::error::StoreError;
use crate::id::Id;

const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub backward: bool,
    pub forward: bool,
    pub full: bool,
    pub backward_issues: Vec<String>,
    pub forward_issues: Vec<String>,
}

/// Checks that `a` and `b` share vendor/package/namespace/type/MAJOR, then
/// computes the compatibility triple.
///
/// # Errors
/// Returns [`StoreError::Incomparable`] if `a` and `b` differ in identity or MAJOR.
pub fn compare(a_id: &Id, a_schema: &Value, b_id: &Id, b_schema: &Value) -> Result<Verdict, StoreError> {
    let same_identity = a_id.vendor == b_id.vendor
        && a_id.package == b_id.package
        && a_id.namespace == b_id.namespace
        && a_id.type_name == b_id.type_name
        && a_id.major == b_id.major;

    if !same_identity {
        return Err(StoreError::Incomparable {
            a: a_id.raw.clone(),
            b: b_id.raw.clone(),
        });
    }

    let (backward, backward_issues) = accepts_instances_of(b_schema, a_schema);
    let (forward, forward_issues) = accepts_instances_of(a_schema, b_schema);

    Ok(Verdict {
        backward,
        forward,
        full: backward && forward,
        backward_issues,
        forward_issues,
    })
}

/// Whether `accepting` validates every instance that `producing` validates.
#[must_use]
pub fn accepts_instances_of(accepting: &Value, producing: &Value) -> (bool, Vec<String>) {
    let mut issues = Vec::new();
    let mut worklist: VecDeque<(String, Value, Value, usize)> = VecDeque::new();
    worklist.push_back((String::new(), producing.clone(), accepting.clone(), 0));

    while let Some((path, prod, acc, depth)) = worklist.pop_front() {
        if depth > MAX_DEPTH {
            issues.push(format!("{path}: max recursion depth exceeded"));
            continue;
        }
        compare_node(&path, &prod, &acc, depth, &mut worklist, &mut issues);
    }

    (issues.is_empty(), issues)
}

fn compare_node(
    path: &str,
    prod: &Value,
    acc: &Value,
    depth: usize,
    worklist: &mut VecDeque<(String, Value, Value, usize)>,
    issues: &mut Vec<String>,
) {
    compare_type(path, prod, acc, issues);
    compare_enum(path, prod, acc, issues);
    compare_required(path, prod, acc, issues);
    compare_properties(path, prod, acc, depth, worklist, issues);
    compare_items(path, prod, acc, depth, worklist, issues);
    compare_composition(path, prod, acc, "oneOf", issues);
    compare_composition(path, prod, acc, "anyOf", issues);
}

fn compare_type(path: &str, prod: &Value, acc: &Value, issues: &mut Vec<String>) {
    if let (Some(pt), Some(at)) = (prod.get("type"), acc.get("type"))
        && pt != at
    {
        issues.push(format!("{path}: type changed from {pt} to {at}"));
    }
}

fn compare_enum(path: &str, prod: &Value, acc: &Value, issues: &mut Vec<String>) {
    let p_enum = prod.get("enum").and_then(Value::as_array);
    let a_enum = acc.get("enum").and_then(Value::as_array);
    match (p_enum, a_enum) {
        (Some(p), Some(a)) => {
            if !p.iter().all(|v| a.contains(v)) {
                issues.push(format!("{path}: enum narrowed"));
            }
        }
        (None, Some(_)) => {
            issues.push(format!("{path}: unconstrained value vs enum-constrained acceptor"));
        }
        (Some(_), None) | (None, None) => {}
    }
}

fn string_array(v: &Value, key: &str) -> Vec<String> {
    v.get(key)
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect())
        .unwrap_or_default()
}

fn compare_required(path: &str, prod: &Value, acc: &Value, issues: &mut Vec<String>) {
    let p_req = string_array(prod, "required");
    let a_req = string_array(acc, "required");

    for r in &p_req {
        if !a_req.contains(r) {
            issues.push(format!("{path}: required field '{r}' dropped by acceptor"));
        }
    }

    for r in &a_req {
        if !p_req.contains(r) {
            let has_default = acc
                .get("properties")
                .and_then(|p| p.get(r))
                .and_then(|s| s.get("default"))
                .is_some();
            if !has_default {
                issues.push(format!(
                    "{path}: new required field '{r}' has no default"
                ));
            }
        }
    }
}

fn compare_properties(
    path: &str,
    prod: &Value,
    acc: &Value,
    depth: usize,
    worklist: &mut VecDeque<(String, Value, Value, usize)>,
    issues: &mut Vec<String>,
) {
    let Some(p_props) = prod.get("properties").and_then(Value::as_object) else {
        return;
    };
    let a_props = acc.get("properties").and_then(Value::as_object);
    let additional_allowed = acc.get("additionalProperties") != Some(&Value::Bool(false));

    for (key, p_sub) in p_props {
        let sub_path = format!("{path}.{key}");
        match a_props.and_then(|m| m.get(key)) {
            Some(a_sub) => worklist.push_back((sub_path, p_sub.clone(), a_sub.clone(), depth + 1)),
            None => {
                if !additional_allowed {
                    issues.push(format!(
                        "{sub_path}: rejected by acceptor's additionalProperties: false"
                    ));
                }
            }
        }
    }
}

fn compare_items(
    path: &str,
    prod: &Value,
    acc: &Value,
    depth: usize,
    worklist: &mut VecDeque<(String, Value, Value, usize)>,
    issues: &mut Vec<String>,
) {
    let (Some(p_items), Some(a_items)) = (prod.get("items"), acc.get("items")) else {
        if prod.get("items").is_none() && acc.get("items").is_some() {
            issues.push(format!("{path}: unconstrained array items vs acceptor item schema"));
        }
        return;
    };

    match (p_items.as_array(), a_items.as_array()) {
        (Some(p_tuple), Some(a_tuple)) => {
            if p_tuple.len() != a_tuple.len() {
                issues.push(format!("{path}.items: tuple length changed"));
                return;
            }
            for (i, (p, a)) in p_tuple.iter().zip(a_tuple.iter()).enumerate() {
                worklist.push_back((format!("{path}.items[{i}]"), p.clone(), a.clone(), depth + 1));
            }
        }
        (Some(p_tuple), None) => {
            for (i, p) in p_tuple.iter().enumerate() {
                worklist.push_back((format!("{path}.items[{i}]"), p.clone(), a_items.clone(), depth + 1));
            }
        }
        (None, Some(a_tuple)) => {
            for (i, a) in a_tuple.iter().enumerate() {
                worklist.push_back((format!("{path}.items[{i}]"), p_items.clone(), a.clone(), depth + 1));
            }
        }
        (None, None) => {
            worklist.push_back((format!("{path}.items"), p_items.clone(), a_items.clone(), depth + 1));
        }
    }
}

/// `oneOf`/`anyOf`: every alternative the producer can emit must be covered by
/// some alternative the acceptor allows. A side lacking the keyword is treated
/// as a single alternative equal to the rest of its own schema.
fn compare_composition(path: &str, prod: &Value, acc: &Value, key: &str, issues: &mut Vec<String>) {
    if prod.get(key).is_none() && acc.get(key).is_none() {
        return;
    }

    let alt_list = |v: &Value| -> Vec<Value> {
        v.get(key).and_then(Value::as_array).map_or_else(
            || {
                let mut clone = v.clone();
                if let Some(obj) = clone.as_object_mut() {
                    obj.remove("oneOf");
                    obj.remove("anyOf");
                }
                vec![clone]
            },
            Vec::clone,
        )
    };

    let p_alts = alt_list(prod);
    let a_alts = alt_list(acc);

    for p_alt in &p_alts {
        let covered = a_alts.iter().any(|a_alt| accepts_instances_of(a_alt, p_alt).0);
        if !covered {
            issues.push(format!("{path}.{key}: no acceptor alternative covers a producer alternative"));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(s: &str) -> Id {
        Id::parse(s).expect("test")
    }

    #[test]
    fn identical_schema_is_fully_compatible() {
        let schema = json!({"type": "object", "required": ["a"], "properties": {"a": {"type": "string"}}});
        let verdict = compare(
            &id("gts.x.core.events.event.v1.0~"),
            &schema,
            &id("gts.x.core.events.event.v1.0~"),
            &schema,
        )
        .expect("test");
        assert_eq!(verdict, Verdict {
            backward: true,
            forward: true,
            full: true,
            backward_issues: vec![],
            forward_issues: vec![],
        });
    }

    #[test]
    fn literal_fixture_optional_field_with_default_is_fully_compatible() {
        let a = json!({"type": "object", "required": ["a"], "properties": {"a": {"type": "string"}}});
        let b = json!({
            "type": "object",
            "required": ["a"],
            "properties": {"a": {"type": "string"}, "b": {"type": "integer", "default": 0}}
        });
        let verdict = compare(
            &id("gts.x.core.events.event.v1.0~"),
            &a,
            &id("gts.x.core.events.event.v1.1~"),
            &b,
        )
        .expect("test");
        assert!(verdict.backward);
        assert!(verdict.forward);
        assert!(verdict.full);
    }

    #[test]
    fn literal_fixture_required_field_without_default_breaks_backward_only() {
        let a = json!({"type": "object", "required": ["a"], "properties": {"a": {"type": "string"}}});
        let b = json!({
            "type": "object",
            "required": ["a", "b"],
            "properties": {"a": {"type": "string"}, "b": {"type": "integer"}}
        });
        let verdict = compare(
            &id("gts.x.core.events.event.v1.0~"),
            &a,
            &id("gts.x.core.events.event.v1.1~"),
            &b,
        )
        .expect("test");
        assert!(!verdict.backward);
        assert!(verdict.forward);
    }

    #[test]
    fn enum_narrowing_breaks_backward_not_forward() {
        let a = json!({"type": "string", "enum": ["a", "b", "c"]});
        let b = json!({"type": "string", "enum": ["a", "b"]});
        let verdict = compare(
            &id("gts.x.core.events.event.v1.0~"),
            &a,
            &id("gts.x.core.events.event.v1.1~"),
            &b,
        )
        .expect("test");
        assert!(!verdict.backward);
        assert!(verdict.forward);
    }

    #[test]
    fn type_change_breaks_both_directions() {
        let a = json!({"type": "string"});
        let b = json!({"type": "integer"});
        let verdict = compare(
            &id("gts.x.core.events.event.v1.0~"),
            &a,
            &id("gts.x.core.events.event.v1.1~"),
            &b,
        )
        .expect("test");
        assert!(!verdict.backward);
        assert!(!verdict.forward);
    }

    #[test]
    fn removing_a_property_preserves_backward_only() {
        let a = json!({
            "type": "object",
            "properties": {"a": {"type": "string"}, "b": {"type": "string"}},
            "additionalProperties": false
        });
        let b = json!({
            "type": "object",
            "properties": {"a": {"type": "string"}},
            "additionalProperties": false
        });
        let verdict = compare(
            &id("gts.x.core.events.event.v1.0~"),
            &a,
            &id("gts.x.core.events.event.v1.1~"),
            &b,
        )
        .expect("test");
        assert!(verdict.backward);
        assert!(!verdict.forward);
    }

    #[test]
    fn nested_object_optional_add_is_backward_compatible() {
        let a = json!({
            "type": "object",
            "properties": {"inner": {"type": "object", "properties": {"x": {"type": "string"}}}}
        });
        let b = json!({
            "type": "object",
            "properties": {"inner": {"type": "object", "properties": {"x": {"type": "string"}, "y": {"type": "string"}}}}
        });
        let verdict = compare(
            &id("gts.x.core.events.event.v1.0~"),
            &a,
            &id("gts.x.core.events.event.v1.1~"),
            &b,
        )
        .expect("test");
        assert!(verdict.backward);
    }

    #[test]
    fn array_item_type_change_breaks_both() {
        let a = json!({"type": "array", "items": {"type": "string"}});
        let b = json!({"type": "array", "items": {"type": "integer"}});
        let verdict = compare(
            &id("gts.x.core.events.event.v1.0~"),
            &a,
            &id("gts.x.core.events.event.v1.1~"),
            &b,
        )
        .expect("test");
        assert!(!verdict.backward);
        assert!(!verdict.forward);
    }

    #[test]
    fn identical_schema_self_compatible_property() {
        let schema = json!({"type": "object"});
        let verdict = compare(
            &id("gts.x.core.events.event.v1~"),
            &schema,
            &id("gts.x.core.events.event.v1~"),
            &schema,
        )
        .expect("test");
        assert_eq!(verdict, Verdict {
            backward: true,
            forward: true,
            full: true,
            backward_issues: vec![],
            forward_issues: vec![],
        });
    }

    #[test]
    fn differing_major_is_incomparable() {
        let schema = json!({"type": "object"});
        let err = compare(
            &id("gts.x.core.events.event.v1~"),
            &schema,
            &id("gts.x.core.events.event.v2~"),
            &schema,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Incomparable { .. }));
    }

    #[test]
    fn differing_identity_is_incomparable() {
        let schema = json!({"type": "object"});
        let err = compare(
            &id("gts.x.core.events.event.v1~"),
            &schema,
            &id("gts.y.core.events.event.v1~"),
            &schema,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Incomparable { .. }));
    }

    #[test]
    fn tuple_arrays_require_same_length() {
        let a = json!({"type": "array", "items": [{"type": "string"}, {"type": "integer"}]});
        let b = json!({"type": "array", "items": [{"type": "string"}]});
        let verdict = compare(
            &id("gts.x.core.events.event.v1.0~"),
            &a,
            &id("gts.x.core.events.event.v1.1~"),
            &b,
        )
        .expect("test");
        assert!(!verdict.backward);
        assert!(!verdict.forward);
    }
}
