//! GTS identifier grammar: parsing, segmentation, wildcard matching, and
//! deterministic UUID derivation.
//!
//! Canonical shape:
//! `gts.<vendor>.<package>.<namespace>*.<type>.v<MAJOR>[.<MINOR>[.<PATCH>]]~[<instance-suffix>]`

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;
use uuid::Uuid;

pub const PREFIX: &str = "gts.";

/// RFC 4122 DNS namespace, mandated by the spec as the fixed v5 namespace for GTS ids.
pub const DEFAULT_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6b, 0xa7, 0xb8, 0x10, 0x9d, 0xad, 0x11, 0xd1, 0x80, 0xb4, 0x00, 0xc0, 0x4f, 0xd4, 0x30, 0xc8,
]);

static DEFAULT_NAMESPACE_CELL: LazyLock<Uuid> = LazyLock::new(|| DEFAULT_NAMESPACE);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("malformed GTS id '{id}': {cause}")]
    MalformedId { id: String, cause: String },

    #[error("malformed GTS wildcard '{pattern}': {cause}")]
    MalformedWildcard { pattern: String, cause: String },
}

#[inline]
fn is_segment_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-'
}

/// Validates a segment token: non-empty, lowercase alphanumerics plus `_` and `-`.
fn is_valid_segment(token: &str) -> bool {
    !token.is_empty() && token.chars().all(is_segment_char)
}

/// Parses a `v<MAJOR>[.<MINOR>[.<PATCH>]]` version token from its dot-split parts,
/// starting at `tokens[start]`. Returns the parsed version and the number of tokens
/// consumed (1, 2, or 3).
fn parse_version(tokens: &[&str], start: usize) -> Option<(u64, Option<u64>, Option<u64>, usize)> {
    let first = tokens.get(start)?;
    if !first.starts_with('v') {
        return None;
    }
    let major = parse_version_number(&first[1..])?;

    let mut consumed = 1;
    let mut minor = None;
    let mut patch = None;

    if let Some(tok) = tokens.get(start + 1) {
        if let Some(n) = parse_version_number(tok) {
            minor = Some(n);
            consumed = 2;
            if let Some(tok3) = tokens.get(start + 2)
                && let Some(p) = parse_version_number(tok3)
            {
                patch = Some(p);
                consumed = 3;
            }
        }
    }

    Some((major, minor, patch, consumed))
}

/// Scans `tokens` from the right for a `v<MAJOR>[.<MINOR>[.<PATCH>]]` span,
/// preferring the longest span that still leaves room for vendor, package,
/// and type before it. Returns `(span_start_index, major, minor, patch)`.
fn locate_version_span(tokens: &[&str]) -> Option<(usize, u64, Option<u64>, Option<u64>)> {
    let n = tokens.len();
    for span in [3usize, 2, 1] {
        if n < span + 3 {
            continue;
        }
        let start = n - span;
        if let Some((major, minor, patch, consumed)) = parse_version(tokens, start)
            && consumed == span
        {
            return Some((start, major, minor, patch));
        }
    }
    None
}

fn parse_version_number(tok: &str) -> Option<u64> {
    if tok.is_empty() || !tok.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let n: u64 = tok.parse().ok()?;
    if n.to_string() != tok {
        return None;
    }
    Some(n)
}

/// The suffix naming an instance of the schema on the left of `~`.
///
/// Shape: `<type>.v<MAJOR>[.<MINOR>[.<PATCH>]][.<identity>]`. The trailing identity
/// segment, if present, is opaque and preserved verbatim across casts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceSuffix {
    pub raw: String,
    pub type_name: String,
    pub major: u64,
    pub minor: Option<u64>,
    pub patch: Option<u64>,
    pub identity: Option<String>,
}

impl InstanceSuffix {
    fn parse(raw: &str) -> Result<Self, String> {
        if raw.is_empty() {
            return Err("instance suffix is empty".to_owned());
        }
        let tokens: Vec<&str> = raw.split('.').collect();
        if tokens.is_empty() || !is_valid_segment(tokens[0]) {
            return Err(format!("invalid instance type segment '{}'", tokens[0]));
        }
        let type_name = tokens[0].to_owned();

        let (major, minor, patch, consumed) = parse_version(&tokens, 1)
            .ok_or_else(|| "instance suffix is missing a version token".to_owned())?;

        let identity = if tokens.len() > 1 + consumed {
            let rest = tokens[1 + consumed..].join(".");
            if rest.is_empty() || !rest.split('.').all(is_valid_segment) {
                return Err(format!("invalid instance identity '{rest}'"));
            }
            Some(rest)
        } else {
            None
        };

        Ok(InstanceSuffix {
            raw: raw.to_owned(),
            type_name,
            major,
            minor,
            patch,
            identity,
        })
    }
}

impl fmt::Display for InstanceSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// A validated GTS identifier, either a schema id (no instance suffix) or an
/// instance id (has one).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Id {
    pub raw: String,
    pub vendor: String,
    pub package: String,
    pub namespace: Vec<String>,
    pub type_name: String,
    pub major: u64,
    pub minor: Option<u64>,
    pub patch: Option<u64>,
    pub instance: Option<InstanceSuffix>,
}

impl Id {
    /// Parses and validates a GTS identifier string.
    ///
    /// # Errors
    /// Returns [`IdError::MalformedId`] if `s` does not satisfy the canonical grammar.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        let raw = s.trim();
        let malformed = |cause: &str| IdError::MalformedId {
            id: s.to_owned(),
            cause: cause.to_owned(),
        };

        if raw != raw.to_lowercase() {
            return Err(malformed("must be lowercase"));
        }
        if !raw.starts_with(PREFIX) {
            return Err(malformed("must start with 'gts.'"));
        }

        let tilde_count = raw.matches('~').count();
        if tilde_count == 0 {
            return Err(malformed("missing required '~' separator"));
        }
        if tilde_count > 1 {
            return Err(malformed("at most one '~' separator is supported"));
        }

        let tilde_pos = raw.find('~').expect("checked above");
        let core = &raw[PREFIX.len()..tilde_pos];
        let instance_part = &raw[tilde_pos + 1..];

        let tokens: Vec<&str> = core.split('.').collect();
        if tokens.len() < 4 {
            return Err(malformed(
                "expected at least vendor.package.type.version before '~'",
            ));
        }

        let (version_start, major, minor, patch) = locate_version_span(&tokens)
            .ok_or_else(|| malformed("missing or invalid version token before '~'"))?;

        let vendor = tokens[0];
        let package = tokens[1];
        let type_name = tokens[version_start - 1];
        let namespace_toks = &tokens[2..version_start - 1];

        for tok in [vendor, package, type_name].into_iter().chain(namespace_toks.iter().copied())
        {
            if !is_valid_segment(tok) {
                return Err(malformed(&format!("invalid segment '{tok}'")));
            }
        }

        let instance = if instance_part.is_empty() {
            None
        } else {
            Some(InstanceSuffix::parse(instance_part).map_err(|cause| IdError::MalformedId {
                id: s.to_owned(),
                cause,
            })?)
        };

        Ok(Id {
            raw: raw.to_owned(),
            vendor: vendor.to_owned(),
            package: package.to_owned(),
            namespace: namespace_toks.iter().map(|s| (*s).to_owned()).collect(),
            type_name: type_name.to_owned(),
            major,
            minor,
            patch,
            instance,
        })
    }

    #[must_use]
    pub fn is_valid(s: &str) -> bool {
        Self::parse(s).is_ok()
    }

    #[must_use]
    pub fn is_schema(&self) -> bool {
        self.instance.is_none()
    }

    #[must_use]
    pub fn is_instance(&self) -> bool {
        self.instance.is_some()
    }

    /// Returns the schema id this id refers to: itself if it already is a schema id,
    /// or the id with its instance suffix stripped.
    #[must_use]
    pub fn schema_id(&self) -> String {
        let tilde = self.raw.find('~').unwrap_or(self.raw.len());
        format!("{}~", &self.raw[..tilde])
    }

    /// Deterministic UUID v5 over the fixed DNS namespace and the canonical id string.
    #[must_use]
    pub fn to_uuid(&self) -> Uuid {
        self.to_uuid_in(&DEFAULT_NAMESPACE_CELL)
    }

    #[must_use]
    pub fn to_uuid_in(&self, namespace: &Uuid) -> Uuid {
        Uuid::new_v5(namespace, self.raw.as_bytes())
    }

    /// Checks whether this id matches a wildcard pattern.
    #[must_use]
    pub fn wildcard_match(&self, pattern: &Wildcard) -> bool {
        pattern.matches(self)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl FromStr for Id {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

/// A single segment position within a dotted pattern: either a literal value or
/// a single-segment wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Exact(String),
    Any,
}

impl Slot {
    fn matches(&self, value: &str) -> bool {
        match self {
            Slot::Exact(s) => s == value,
            Slot::Any => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct VersionPattern {
    major: u64,
    minor: Option<u64>,
    /// `true` when the pattern used the `~*` / trailing `*` refinement marker,
    /// meaning any minor/patch beyond what's pinned above is accepted.
    refine: bool,
    patch: Option<u64>,
}

impl VersionPattern {
    fn matches(&self, major: u64, minor: Option<u64>, patch: Option<u64>) -> bool {
        if self.major != major {
            return false;
        }
        if self.refine {
            if let Some(m) = self.minor
                && Some(m) != minor
            {
                return false;
            }
            return true;
        }
        if self.minor != minor {
            return false;
        }
        self.patch == patch
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum WildcardShape {
    /// Matches every entity, schema or instance (`*`, `*~*`).
    AnyEntity,
    /// Matches every schema entity (`*~`).
    AnySchema,
    /// A structured pattern over vendor/package/namespace/type/version, with an
    /// optional instance-suffix restriction.
    Pattern {
        vendor: Slot,
        package: Slot,
        namespace: Vec<Slot>,
        type_name: Slot,
        version: VersionPattern,
        instance: InstanceRestriction,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum InstanceRestriction {
    /// Pattern has no `~`-suffix content: only matches schema ids.
    SchemaOnly,
    /// Pattern has an instance suffix: only matches instance ids, structurally.
    Instance {
        type_name: Slot,
        version: VersionPattern,
        identity: Option<Slot>,
    },
    /// Pattern is a bare `~*` version refinement: matches the schema itself and
    /// any of its instances, with no further restriction on the instance part.
    Any,
}

/// A GTS wildcard pattern: an id in which any single segment, or the version's
/// minor/patch refinement, may be replaced by `*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wildcard {
    pub raw: String,
    shape: WildcardShape,
}

impl Wildcard {
    /// Parses a wildcard pattern.
    ///
    /// # Errors
    /// Returns [`IdError::MalformedWildcard`] if the pattern is malformed.
    pub fn parse(pattern: &str) -> Result<Self, IdError> {
        let raw = pattern.trim();
        let malformed = |cause: &str| IdError::MalformedWildcard {
            pattern: pattern.to_owned(),
            cause: cause.to_owned(),
        };

        match raw {
            "*~" => {
                return Ok(Wildcard {
                    raw: raw.to_owned(),
                    shape: WildcardShape::AnySchema,
                });
            }
            "*" | "*~*" => {
                return Ok(Wildcard {
                    raw: raw.to_owned(),
                    shape: WildcardShape::AnyEntity,
                });
            }
            _ => {}
        }

        if !raw.starts_with(PREFIX) {
            return Err(malformed("must start with 'gts.' (or be one of '*', '*~', '*~*')"));
        }

        let tilde_count = raw.matches('~').count();
        if tilde_count != 1 {
            return Err(malformed("pattern must contain exactly one '~'"));
        }
        let tilde_pos = raw.find('~').expect("checked above");
        let core = &raw[PREFIX.len()..tilde_pos];
        let instance_part = &raw[tilde_pos + 1..];

        // A bare `*` right after the tilde (with nothing else following) is the
        // version-refinement marker: `v1~*` means "major 1, any minor/patch",
        // matching the schema itself and any instance of it alike.
        let (instance_part, bare_star_refine) = match instance_part {
            "*" => ("", true),
            other => (other, false),
        };

        let (core_body, explicit_core_refine) = core
            .strip_suffix('*')
            .map(|b| (b.trim_end_matches('.'), true))
            .unwrap_or((core, false));
        let refine = explicit_core_refine || bare_star_refine;
        let tokens: Vec<&str> = core_body.split('.').collect();
        if tokens.len() < 4 {
            return Err(malformed("expected at least vendor.package.type.version"));
        }

        let (version_start, major, minor, patch) =
            locate_version_span(&tokens).ok_or_else(|| malformed("missing or invalid version token"))?;

        let vendor = parse_slot(tokens[0]).ok_or_else(|| malformed("invalid vendor segment"))?;
        let package = parse_slot(tokens[1]).ok_or_else(|| malformed("invalid package segment"))?;
        let type_name =
            parse_slot(tokens[version_start - 1]).ok_or_else(|| malformed("invalid type segment"))?;
        let namespace = tokens[2..version_start - 1]
            .iter()
            .map(|t| parse_slot(t).ok_or_else(|| malformed(&format!("invalid namespace segment '{t}'"))))
            .collect::<Result<Vec<_>, _>>()?;

        let version = VersionPattern { major, minor, patch, refine };

        let instance = if bare_star_refine {
            InstanceRestriction::Any
        } else if instance_part.is_empty() {
            InstanceRestriction::SchemaOnly
        } else {
            let (body, irefine) = instance_part
                .strip_suffix('*')
                .map(|b| (b.trim_end_matches('.'), true))
                .unwrap_or((instance_part, false));
            let itoks: Vec<&str> = body.split('.').collect();
            if itoks.is_empty() || itoks[0].is_empty() {
                return Err(malformed("invalid instance suffix"));
            }
            let itype = parse_slot(itoks[0]).ok_or_else(|| malformed("invalid instance type segment"))?;

            let (imajor, iminor, ipatch, iconsumed) =
                parse_version(&itoks, 1).ok_or_else(|| malformed("invalid instance version token"))?;
            let iversion = VersionPattern {
                major: imajor,
                minor: iminor,
                patch: ipatch,
                refine: irefine,
            };

            let identity = if itoks.len() > 1 + iconsumed {
                Some(parse_identity_slot(&itoks[1 + iconsumed..]).ok_or_else(|| malformed("invalid instance identity"))?)
            } else {
                None
            };
            InstanceRestriction::Instance {
                type_name: itype,
                version: iversion,
                identity,
            }
        };

        Ok(Wildcard {
            raw: raw.to_owned(),
            shape: WildcardShape::Pattern {
                vendor,
                package,
                namespace,
                type_name,
                version,
                instance,
            },
        })
    }

    #[must_use]
    pub fn matches(&self, id: &Id) -> bool {
        match &self.shape {
            WildcardShape::AnyEntity => true,
            WildcardShape::AnySchema => id.is_schema(),
            WildcardShape::Pattern {
                vendor,
                package,
                namespace,
                type_name,
                version,
                instance,
            } => {
                if !vendor.matches(&id.vendor)
                    || !package.matches(&id.package)
                    || !type_name.matches(&id.type_name)
                {
                    return false;
                }
                if namespace.len() != id.namespace.len() {
                    return false;
                }
                if !namespace
                    .iter()
                    .zip(id.namespace.iter())
                    .all(|(slot, seg)| slot.matches(seg))
                {
                    return false;
                }
                if !version.matches(id.major, id.minor, id.patch) {
                    return false;
                }
                match instance {
                    InstanceRestriction::SchemaOnly => id.is_schema(),
                    InstanceRestriction::Any => true,
                    InstanceRestriction::Instance {
                        type_name: itype,
                        version: iversion,
                        identity,
                    } => {
                        let Some(inst) = &id.instance else {
                            return false;
                        };
                        if !itype.matches(&inst.type_name) {
                            return false;
                        }
                        if !iversion.matches(inst.major, inst.minor, inst.patch) {
                            return false;
                        }
                        match identity {
                            None => true,
                            Some(slot) => match &inst.identity {
                                Some(id_str) => slot.matches(id_str),
                                None => false,
                            },
                        }
                    }
                }
            }
        }
    }
}

fn parse_slot(tok: &str) -> Option<Slot> {
    if tok == "*" {
        return Some(Slot::Any);
    }
    if is_valid_segment(tok) {
        return Some(Slot::Exact(tok.to_owned()));
    }
    None
}

/// Parses the (possibly multi-segment) instance identity tail of a wildcard's
/// instance suffix into a single `Slot` over the joined, dot-separated string.
fn parse_identity_slot(toks: &[&str]) -> Option<Slot> {
    if toks == ["*"] {
        return Some(Slot::Any);
    }
    if toks.iter().all(|t| is_valid_segment(t)) {
        return Some(Slot::Exact(toks.join(".")));
    }
    None
}

impl fmt::Display for Wildcard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl FromStr for Wildcard {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Wildcard {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}
