//! Deterministic identifiers shared by the serializers, the importer and the merge builder.
//!
//! Ids are UUIDv5 values under a fixed namespace, so the same (kind, scope, natural key)
//! always produces the same id. Changing the namespace or the name layout invalidates every
//! scene produced so far.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use uuid::Uuid;

pub const NAMESPACE_NAME: &str = "cjm-ui-convertor";

fn namespace() -> &'static Uuid {
    static NS: OnceLock<Uuid> = OnceLock::new();
    NS.get_or_init(|| Uuid::new_v5(&Uuid::NAMESPACE_DNS, NAMESPACE_NAME.as_bytes()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StableId(Uuid);

impl StableId {
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Positive 31-bit value for the editor's `seed`; never zero.
    pub fn seed(&self) -> i64 {
        let b = self.0.as_bytes();
        nonzero_31(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Positive 31-bit value for the editor's `versionNonce`; never zero.
    pub fn version_nonce(&self) -> i64 {
        let b = self.0.as_bytes();
        nonzero_31(u32::from_be_bytes([b[4], b[5], b[6], b[7]]))
    }
}

fn nonzero_31(raw: u32) -> i64 {
    match raw & 0x7fff_ffff {
        0 => 1,
        v => i64::from(v),
    }
}

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Derives the id of an entity of `kind` identified by `natural_key` inside `scope`
/// (usually the owning procedure). Parts are joined with `|` after the kind; `|` and `\`
/// inside a part are backslash-escaped. Each kind uses a fixed number of scope and key parts.
pub fn derive(scope: &[&str], kind: &str, natural_key: &[&str]) -> StableId {
    let mut name = String::from(kind);
    for part in scope.iter().chain(natural_key) {
        name.push('|');
        push_escaped(&mut name, part);
    }
    StableId(Uuid::new_v5(namespace(), name.as_bytes()))
}

fn push_escaped(name: &mut String, part: &str) {
    for c in part.chars() {
        if matches!(c, '|' | '\\') {
            name.push('\\');
        }
        name.push(c);
    }
}

/// Shorthand for ids without a scope (document-level entities).
pub fn derive_global(kind: &str, natural_key: &[&str]) -> StableId {
    derive(&[], kind, natural_key)
}
