//! Configuration recognized by the store and entity layers (spec §6).

use uuid::Uuid;

use crate::id::DEFAULT_NAMESPACE;

/// Options controlling how documents are read into entities and how
/// references are extracted from schema bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// JSON property from which a schema's id is read.
    pub schema_id_key: String,
    /// JSON property from which an instance's id is read.
    pub instance_id_key: String,
    /// JSON property whose value is treated as a GTS reference.
    pub reference_key: String,
    /// If true, only `reference_key` values are treated as references;
    /// otherwise any string parsing as a valid id is.
    pub strict_references: bool,
    /// Fixed UUID used as the v5 namespace for [`crate::id::Id::to_uuid`].
    pub uuid_namespace: Uuid,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_id_key: "$id".to_owned(),
            instance_id_key: "gtsId".to_owned(),
            reference_key: "x-gts-ref".to_owned(),
            strict_references: false,
            uuid_namespace: DEFAULT_NAMESPACE,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = Config::default();
        assert_eq!(cfg.schema_id_key, "$id");
        assert_eq!(cfg.instance_id_key, "gtsId");
        assert_eq!(cfg.reference_key, "x-gts-ref");
        assert!(!cfg.strict_references);
        assert_eq!(cfg.uuid_namespace, DEFAULT_NAMESPACE);
    }
}
