//! The store: an in-memory directory of entities built once by [`Store::load`]
//! and queried read-only thereafter (spec §4.3).

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::cast::{self, CastDiagnostics};
use crate::compat::{self, Verdict};
use crate::config::Config;
use crate::entity::Entity;
use crate::error::StoreError;
use crate::query::{self, Query, QueryResult};
use crate::reader::Reader;
use crate::validator::Validator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateId {
    pub id: String,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokenReference {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    pub duplicates: Vec<DuplicateId>,
    pub broken_references: Vec<BrokenReference>,
}

/// A read-only directory of entities. [`Store::load`] is the only way to
/// build one and the only place documents are ingested.
pub struct Store {
    entities: HashMap<String, Entity>,
    instances_of: HashMap<String, Vec<String>>,
    references: HashMap<String, Vec<String>>,
    diagnostics: Diagnostics,
    config: Config,
}

fn collect_refs(value: &Value, path: &str, cfg: &Config, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = format!("{path}.{key}");
                let eligible = key == &cfg.reference_key || !cfg.strict_references;
                if eligible
                    && let Some(s) = child.as_str()
                    && crate::id::Id::parse(s).is_ok()
                {
                    out.push(s.to_owned());
                }
                collect_refs(child, &child_path, cfg, out);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                collect_refs(child, &format!("{path}[{i}]"), cfg, out);
            }
        }
        _ => {}
    }
}

fn extract_references(entities: &HashMap<String, Entity>, cfg: &Config) -> HashMap<String, Vec<String>> {
    let mut references = HashMap::new();
    for (id, entity) in entities {
        if !entity.is_schema() {
            continue;
        }
        let mut refs = Vec::new();
        collect_refs(entity.document(), "", cfg, &mut refs);
        refs.retain(|r| r != id);
        refs.sort();
        refs.dedup();
        if !refs.is_empty() {
            references.insert(id.clone(), refs);
        }
    }
    references
}

impl Store {
    /// Loads every document `reader` yields, recognizing entities per `config`
    /// and building the reverse instance index and schema reference graph.
    /// Unrecognized documents are skipped. Duplicate ids and references to
    /// missing entities are recorded as diagnostics rather than rejected.
    #[must_use]
    pub fn load(mut reader: impl Reader, config: Config) -> Self {
        tracing::info!("loading store");
        let mut entities = HashMap::new();
        let mut instances_of: HashMap<String, Vec<String>> = HashMap::new();
        let mut sources_by_id: HashMap<String, Vec<String>> = HashMap::new();

        while let Some((source, document)) = reader.next_document() {
            let Some(entity) = Entity::from_document(&source, document, &config) else {
                continue;
            };
            let id = entity.id().raw.clone();
            let first_seen = !entities.contains_key(&id);
            sources_by_id.entry(id.clone()).or_default().push(source);

            if first_seen && let Entity::Instance(inst) = &entity {
                instances_of.entry(inst.schema_id.clone()).or_default().push(id.clone());
            }

            entities.entry(id).or_insert(entity);
        }

        for ids in instances_of.values_mut() {
            ids.sort();
        }

        let duplicates: Vec<DuplicateId> = sources_by_id
            .into_iter()
            .filter(|(_, sources)| sources.len() > 1)
            .map(|(id, sources)| DuplicateId { id, sources })
            .collect();
        for dup in &duplicates {
            tracing::warn!(id = %dup.id, sources = ?dup.sources, "duplicate id; first-loaded document wins");
        }

        let references = extract_references(&entities, &config);
        let broken_references: Vec<BrokenReference> = references
            .iter()
            .flat_map(|(from, tos)| {
                tos.iter()
                    .filter(|to| !entities.contains_key(*to))
                    .map(move |to| BrokenReference {
                        from: from.clone(),
                        to: to.clone(),
                    })
            })
            .collect();
        for broken in &broken_references {
            tracing::warn!(from = %broken.from, to = %broken.to, "broken reference");
        }

        tracing::info!(entities = entities.len(), "store loaded");

        Store {
            entities,
            instances_of,
            references,
            diagnostics: Diagnostics { duplicates, broken_references },
            config,
        }
    }

    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    #[must_use]
    pub fn instances_of(&self, schema_id: &str) -> &[String] {
        self.instances_of.get(schema_id).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Derives `id`'s deterministic UUID under this store's configured
    /// namespace (`Config::uuid_namespace`, the spec's fixed DNS namespace
    /// unless overridden). Returns `None` if `id` is not in the store.
    #[must_use]
    pub fn uuid_of(&self, id: &str) -> Option<uuid::Uuid> {
        self.entities.get(id).map(|e| e.id().to_uuid_in(&self.config.uuid_namespace))
    }

    /// Builds the dependency graph rooted at `id`: a tree of reference edges
    /// with cycles collapsed to a repeated-id leaf rather than recursed into.
    ///
    /// # Errors
    /// Returns [`StoreError::NoSuchEntity`] if `id` itself is not in the store.
    pub fn build_schema_graph(&self, id: &str) -> Result<Value, StoreError> {
        if !self.entities.contains_key(id) {
            return Err(StoreError::NoSuchEntity { id: id.to_owned() });
        }
        let mut seen = HashSet::new();
        Ok(self.graph_node(id, &mut seen))
    }

    fn graph_node(&self, id: &str, seen: &mut HashSet<String>) -> Value {
        let mut node = Map::new();
        node.insert("id".to_owned(), Value::String(id.to_owned()));

        if !seen.insert(id.to_owned()) {
            node.insert("cycle".to_owned(), Value::Bool(true));
            return Value::Object(node);
        }

        if !self.entities.contains_key(id) {
            node.insert("broken".to_owned(), Value::Bool(true));
            return Value::Object(node);
        }

        if let Some(targets) = self.references.get(id) {
            let refs: Vec<Value> = targets.iter().map(|t| self.graph_node(t, seen)).collect();
            node.insert("refs".to_owned(), Value::Array(refs));
        }

        Value::Object(node)
    }

    fn schema_doc(&self, id: &str) -> Result<(&crate::id::Id, &Value), StoreError> {
        match self.entities.get(id) {
            Some(Entity::Schema(s)) => {
                tracing::debug!(id = %s.id.raw, document = %s.document, "resolved schema");
                Ok((&s.id, &s.document))
            }
            Some(Entity::Instance(_)) | None => Err(StoreError::NoSuchSchema { id: id.to_owned() }),
        }
    }

    /// Validates an instance's document against its own schema.
    ///
    /// # Errors
    /// Returns [`StoreError::NoSuchInstance`], [`StoreError::NoSuchSchema`], or
    /// [`StoreError::SchemaViolation`] on failure.
    pub fn validate_instance(&self, instance_id: &str, validator: &dyn Validator) -> Result<(), StoreError> {
        tracing::info!(instance = %instance_id, "validating instance");
        let Some(Entity::Instance(inst)) = self.entities.get(instance_id) else {
            return Err(StoreError::NoSuchInstance { id: instance_id.to_owned() });
        };
        let (_, schema_doc) = self.schema_doc(&inst.schema_id)?;

        validator.validate(&inst.document, schema_doc).map_err(|errors| StoreError::SchemaViolation {
            instance: instance_id.to_owned(),
            schema: inst.schema_id.clone(),
            detail: errors.iter().map(|e| format!("{}: {}", e.path, e.message)).collect::<Vec<_>>().join("; "),
        })
    }

    /// Compares two schemas of the same MAJOR and namespace.
    ///
    /// # Errors
    /// Returns [`StoreError::NoSuchSchema`] or [`StoreError::Incomparable`].
    pub fn is_minor_compatible(&self, schema_a: &str, schema_b: &str) -> Result<Verdict, StoreError> {
        let (id_a, doc_a) = self.schema_doc(schema_a)?;
        let (id_b, doc_b) = self.schema_doc(schema_b)?;
        compat::compare(id_a, doc_a, id_b, doc_b)
    }

    /// Casts an instance to a target schema of the same MAJOR.
    ///
    /// # Errors
    /// Returns [`StoreError::NoSuchInstance`], [`StoreError::NoSuchSchema`],
    /// [`StoreError::MajorMismatch`], or [`StoreError::NotCastable`].
    pub fn cast(&self, instance_id: &str, target_schema_id: &str) -> Result<(Value, CastDiagnostics), StoreError> {
        let Some(Entity::Instance(inst)) = self.entities.get(instance_id) else {
            return Err(StoreError::NoSuchInstance { id: instance_id.to_owned() });
        };
        let (source_schema_id, source_doc) = self.schema_doc(&inst.schema_id)?;
        let (target_id, target_doc) = self.schema_doc(target_schema_id)?;

        cast::cast(
            &inst.id,
            source_schema_id,
            source_doc,
            target_id,
            target_doc,
            &inst.document,
            &self.config.instance_id_key,
        )
    }

    /// Parses and executes a query against this store's entities.
    ///
    /// # Errors
    /// Returns [`StoreError::MalformedQuery`] if `q` does not parse.
    pub fn query(&self, q: &str) -> Result<QueryResult<'_>, StoreError> {
        let parsed = Query::parse(q)?;
        Ok(query::execute(self.entities.values(), &parsed))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    struct VecReader(Vec<(String, Value)>);

    impl Reader for VecReader {
        fn next_document(&mut self) -> Option<(String, Value)> {
            self.0.pop()
        }
    }

    fn schema_doc(id: &str) -> Value {
        json!({"$id": id, "type": "object"})
    }

    #[test]
    fn loads_schema_and_instance_and_builds_reverse_index() {
        let reader = VecReader(vec![
            ("schema.json".to_owned(), schema_doc("gts.x.core.events.event.v1~")),
            (
                "inst.json".to_owned(),
                json!({"gtsId": "gts.x.core.events.event.v1~a.v1"}),
            ),
        ]);
        let store = Store::load(reader, Config::default());

        assert!(store.get("gts.x.core.events.event.v1~").is_some());
        assert_eq!(
            store.instances_of("gts.x.core.events.event.v1~"),
            &["gts.x.core.events.event.v1~a.v1".to_owned()]
        );
    }

    #[test]
    fn duplicate_ids_are_collected_not_rejected() {
        let reader = VecReader(vec![
            ("a.json".to_owned(), schema_doc("gts.x.core.events.event.v1~")),
            ("b.json".to_owned(), schema_doc("gts.x.core.events.event.v1~")),
        ]);
        let store = Store::load(reader, Config::default());
        assert_eq!(store.diagnostics().duplicates.len(), 1);
        assert_eq!(store.diagnostics().duplicates[0].sources.len(), 2);
    }

    #[test]
    fn duplicate_id_keeps_first_loaded_document() {
        let mut first = schema_doc("gts.x.core.events.event.v1~");
        first["title"] = Value::String("first".to_owned());
        let mut second = schema_doc("gts.x.core.events.event.v1~");
        second["title"] = Value::String("second".to_owned());

        // `VecReader` yields by popping from the back, so push in reverse load order.
        let reader = VecReader(vec![("b.json".to_owned(), second), ("a.json".to_owned(), first)]);
        let store = Store::load(reader, Config::default());

        let entity = store.get("gts.x.core.events.event.v1~").expect("test");
        assert_eq!(entity.document()["title"], "first");
        assert_eq!(entity.source(), "a.json");
    }

    #[test]
    fn duplicate_instance_id_is_not_listed_twice_in_reverse_index() {
        let reader = VecReader(vec![
            (
                "b.json".to_owned(),
                json!({"gtsId": "gts.x.core.events.event.v1~a.v1"}),
            ),
            (
                "a.json".to_owned(),
                json!({"gtsId": "gts.x.core.events.event.v1~a.v1"}),
            ),
        ]);
        let store = Store::load(reader, Config::default());
        assert_eq!(
            store.instances_of("gts.x.core.events.event.v1~"),
            &["gts.x.core.events.event.v1~a.v1".to_owned()]
        );
    }

    #[test]
    fn broken_reference_is_recorded() {
        let schema = json!({
            "$id": "gts.x.core.events.event.v1~",
            "type": "object",
            "properties": {"payload": {"x-gts-ref": "gts.x.core.events.missing.v1~"}}
        });
        let reader = VecReader(vec![("a.json".to_owned(), schema)]);
        let store = Store::load(reader, Config::default());
        assert_eq!(store.diagnostics().broken_references.len(), 1);
        assert_eq!(
            store.diagnostics().broken_references[0].to,
            "gts.x.core.events.missing.v1~"
        );
    }

    #[test]
    fn schema_graph_detects_cycle() {
        let a = json!({
            "$id": "gts.x.core.events.a.v1~",
            "properties": {"b": {"x-gts-ref": "gts.x.core.events.b.v1~"}}
        });
        let b = json!({
            "$id": "gts.x.core.events.b.v1~",
            "properties": {"a": {"x-gts-ref": "gts.x.core.events.a.v1~"}}
        });
        let reader = VecReader(vec![("a.json".to_owned(), a), ("b.json".to_owned(), b)]);
        let store = Store::load(reader, Config::default());
        let graph = store.build_schema_graph("gts.x.core.events.a.v1~").expect("test");
        assert_eq!(graph["refs"][0]["refs"][0]["cycle"], Value::Bool(true));
    }

    #[test]
    fn uuid_of_honors_configured_namespace() {
        let reader = VecReader(vec![("a.json".to_owned(), schema_doc("gts.x.core.events.event.v1~"))]);
        let store = Store::load(reader, Config::default());
        let default_uuid = store.uuid_of("gts.x.core.events.event.v1~").expect("test");

        let mut overridden_cfg = Config::default();
        overridden_cfg.uuid_namespace = uuid::Uuid::NAMESPACE_URL;
        let reader = VecReader(vec![("a.json".to_owned(), schema_doc("gts.x.core.events.event.v1~"))]);
        let overridden_store = Store::load(reader, overridden_cfg);
        let overridden_uuid = overridden_store.uuid_of("gts.x.core.events.event.v1~").expect("test");

        assert_ne!(default_uuid, overridden_uuid);
        assert!(store.uuid_of("gts.x.core.events.event.missing.v1~").is_none());
    }

    #[test]
    fn graph_of_missing_root_is_no_such_entity() {
        let store = Store::load(VecReader(vec![]), Config::default());
        let err = store.build_schema_graph("gts.x.core.events.a.v1~").unwrap_err();
        assert!(matches!(err, StoreError::NoSuchEntity { .. }));
    }

    #[test]
    fn validate_instance_reports_schema_violation() {
        let schema = json!({
            "$id": "gts.x.core.events.event.v1~",
            "type": "object",
            "required": ["a"]
        });
        let reader = VecReader(vec![
            ("s.json".to_owned(), schema),
            ("i.json".to_owned(), json!({"gtsId": "gts.x.core.events.event.v1~i.v1"})),
        ]);
        let store = Store::load(reader, Config::default());
        let err = store
            .validate_instance(
                "gts.x.core.events.event.v1~i.v1",
                &crate::validator::JsonschemaValidator,
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::SchemaViolation { .. }));
    }

    #[test]
    fn cast_delegates_to_cast_module() {
        let source = json!({
            "$id": "gts.x.core.events.event.v1.0~",
            "type": "object",
            "required": ["a"],
            "properties": {"a": {"type": "string"}}
        });
        let target = json!({
            "$id": "gts.x.core.events.event.v1.1~",
            "type": "object",
            "required": ["a", "b"],
            "properties": {"a": {"type": "string"}, "b": {"type": "integer", "default": 0}}
        });
        let reader = VecReader(vec![
            ("s1.json".to_owned(), source),
            ("s2.json".to_owned(), target),
            (
                "i.json".to_owned(),
                json!({"gtsId": "gts.x.core.events.event.v1.0~i.v1", "a": "hi"}),
            ),
        ]);
        let store = Store::load(reader, Config::default());
        let (doc, _) = store
            .cast("gts.x.core.events.event.v1.0~i.v1", "gts.x.core.events.event.v1.1~")
            .expect("test");
        assert_eq!(doc["gtsId"], "gts.x.core.events.event.v1.1~i.v1");
        assert_eq!(doc["b"], 0);
    }

    #[test]
    fn query_delegates_to_query_module() {
        let reader = VecReader(vec![
            ("s.json".to_owned(), schema_doc("gts.x.core.events.event.v1~")),
            (
                "i.json".to_owned(),
                json!({"gtsId": "gts.x.core.events.event.v1~a.v1"}),
            ),
        ]);
        let store = Store::load(reader, Config::default());
        let result = store.query("gts.x.core.events.event.v1~*").expect("test");
        assert_eq!(result.count, 1);
    }
}
