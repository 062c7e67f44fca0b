//! Query grammar: `<wildcard-pattern>[<path> <op> <literal>, ...]`, executed
//! over a store's entities (spec §4.6).

use serde_json::Value;

use crate::entity::Entity;
use crate::error::StoreError;
use crate::id::Wildcard;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
}

#[derive(Debug, Clone)]
struct Predicate {
    path: String,
    op: Op,
    literal: Value,
}

#[derive(Debug, Clone)]
pub struct Query {
    pub pattern: Wildcard,
    predicates: Vec<Predicate>,
}

/// Splits `q` into its pattern and bracketed predicate list, respecting
/// double-quoted literals and rejecting unbalanced brackets.
fn split_pattern_and_predicates(q: &str) -> Result<(&str, Option<&str>), StoreError> {
    let malformed = |cause: &str| StoreError::MalformedQuery {
        query: q.to_owned(),
        cause: cause.to_owned(),
    };

    let Some(open) = q.find('[') else {
        if q.contains(']') {
            return Err(malformed("unbalanced ']'"));
        }
        return Ok((q, None));
    };

    if !q.ends_with(']') {
        return Err(malformed("predicate list must end with ']'"));
    }

    let pattern = &q[..open];
    let body = &q[open + 1..q.len() - 1];
    if body.contains('[') || body.contains(']') {
        return Err(malformed("nested brackets are not supported"));
    }
    Ok((pattern, Some(body)))
}

/// Splits a predicate list on top-level commas, treating commas inside
/// double-quoted literals as content.
fn split_predicates(body: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in body.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => {
                parts.push(current.trim().to_owned());
                current = String::new();
            }
            _ => current.push(c),
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        parts.push(tail.to_owned());
    }
    parts
}

const OPS: &[(&str, Op)] = &[
    ("!=", Op::Ne),
    ("<=", Op::Le),
    (">=", Op::Ge),
    ("=", Op::Eq),
    ("<", Op::Lt),
    (">", Op::Gt),
    ("~", Op::Contains),
];

fn parse_predicate(raw: &str) -> Result<Predicate, StoreError> {
    let malformed = |cause: &str| StoreError::MalformedQuery {
        query: raw.to_owned(),
        cause: cause.to_owned(),
    };

    let (idx, op, op_str) = OPS
        .iter()
        .filter_map(|(tok, op)| raw.find(tok).map(|i| (i, *op, *tok)))
        .min_by_key(|(i, ..)| *i)
        .ok_or_else(|| malformed("missing comparison operator"))?;

    let path = raw[..idx].trim().to_owned();
    let literal_str = raw[idx + op_str.len()..].trim();
    if path.is_empty() {
        return Err(malformed("missing path"));
    }

    let literal = parse_literal(literal_str).ok_or_else(|| malformed("invalid literal"))?;

    Ok(Predicate { path, op, literal })
}

fn parse_literal(s: &str) -> Option<Value> {
    if let Some(inner) = s.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return Some(Value::String(inner.to_owned()));
    }
    match s {
        "true" => return Some(Value::Bool(true)),
        "false" => return Some(Value::Bool(false)),
        "null" => return Some(Value::Null),
        _ => {}
    }
    if let Ok(n) = s.parse::<i64>() {
        return Some(Value::Number(n.into()));
    }
    if let Ok(f) = s.parse::<f64>() {
        return serde_json::Number::from_f64(f).map(Value::Number);
    }
    if !s.is_empty() {
        return Some(Value::String(s.to_owned()));
    }
    None
}

impl Query {
    /// Parses a query string.
    ///
    /// # Errors
    /// Returns [`StoreError::MalformedQuery`] if the pattern or any predicate
    /// does not parse.
    pub fn parse(q: &str) -> Result<Self, StoreError> {
        let (pattern_str, predicates_str) = split_pattern_and_predicates(q)?;
        let pattern = Wildcard::parse(pattern_str).map_err(|e| StoreError::MalformedQuery {
            query: q.to_owned(),
            cause: e.to_string(),
        })?;

        let predicates = match predicates_str {
            None => Vec::new(),
            Some(body) if body.trim().is_empty() => Vec::new(),
            Some(body) => split_predicates(body)
                .iter()
                .map(|p| parse_predicate(p))
                .collect::<Result<Vec<_>, _>>()?,
        };

        Ok(Query { pattern, predicates })
    }

    fn matches(&self, entity: &Entity) -> bool {
        if !entity.id().wildcard_match(&self.pattern) {
            return false;
        }
        self.predicates.iter().all(|pred| {
            entity
                .resolve_path(&pred.path)
                .is_ok_and(|value| compare(&value, pred.op, &pred.literal))
        })
    }
}

fn compare(value: &Value, op: Op, literal: &Value) -> bool {
    match op {
        Op::Eq => value == literal,
        Op::Ne => value != literal,
        Op::Contains => match (value.as_str(), literal.as_str()) {
            (Some(v), Some(l)) => v.contains(l),
            _ => false,
        },
        Op::Lt | Op::Le | Op::Gt | Op::Ge => match (value.as_f64(), literal.as_f64()) {
            (Some(v), Some(l)) => match op {
                Op::Lt => v < l,
                Op::Le => v <= l,
                Op::Gt => v > l,
                Op::Ge => v >= l,
                Op::Eq | Op::Ne | Op::Contains => unreachable!(),
            },
            _ => false,
        },
    }
}

#[derive(Debug, Clone)]
pub struct QueryResult<'a> {
    pub count: usize,
    pub results: Vec<&'a Entity>,
}

/// Executes `query` over `entities`, returning matches sorted by canonical id.
#[must_use]
pub fn execute<'a>(entities: impl Iterator<Item = &'a Entity>, query: &Query) -> QueryResult<'a> {
    let mut results: Vec<&Entity> = entities.filter(|e| query.matches(e)).collect();
    results.sort_by(|a, b| a.id().raw.cmp(&b.id().raw));
    QueryResult { count: results.len(), results }
}
