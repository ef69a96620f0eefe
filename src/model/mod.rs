//! Attribution data model
//!
//! Flat stores of manual and external attribution records, the record type
//! itself (`PackageInfo`), and the discrete scales attached to it. The
//! hierarchical side of the model lives in [`resources`]; the path↔id
//! mapping in [`index`].

pub mod index;
pub mod resources;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ─── Attribution Identity ──────────────────────────────────────────

/// Opaque, stable attribution identifier (a uuid for freshly created ones,
/// whatever the upstream signal collector chose for external ones).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttributionId(pub String);

impl AttributionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh identifier for a user-created attribution.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttributionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which of the two attribution sources a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributionKind {
    /// Authored by the analyst; fully editable.
    Manual,
    /// Produced by upstream signal collection; read-only except for the
    /// per-id resolved (dismissed) flag.
    External,
}

// ─── Discrete Scales ───────────────────────────────────────────────

/// Externally assigned criticality of the attributed package. An input to
/// this core, never computed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Criticality {
    #[default]
    None,
    Medium,
    High,
}

/// Discrete confidence scale for an attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DiscreteConfidence {
    Low,
    #[default]
    High,
}

impl DiscreteConfidence {
    /// Numeric score used by the original scale (Low = 30, High = 80).
    pub fn score(self) -> u8 {
        match self {
            Self::Low => 30,
            Self::High => 80,
        }
    }
}

// ─── Attribution Record ────────────────────────────────────────────

/// A single attribution: package/license metadata tied to one or more
/// resources through the index. Immutable once stored, until an edit
/// commit replaces it wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageInfo {
    pub package_name: Option<String>,
    pub package_version: Option<String>,
    pub package_namespace: Option<String>,
    pub package_type: Option<String>,
    pub copyright: Option<String>,
    pub license_name: Option<String>,
    pub license_text: Option<String>,
    pub criticality: Criticality,
    pub attribution_confidence: DiscreteConfidence,
    pub comment: Option<String>,
    /// Source URLs the attribution was derived from.
    pub urls: Vec<String>,
    /// Signal was pre-selected by the collector and can be promoted to a
    /// manual attribution without review.
    pub pre_selected: bool,
    /// Excluded from the generated notice document.
    pub exclude_from_notice: bool,
}

impl PackageInfo {
    /// True when no user-visible field carries content. Used by the edit
    /// flow to decide whether a draft is worth guarding.
    pub fn is_empty(&self) -> bool {
        self.package_name.is_none()
            && self.package_version.is_none()
            && self.package_namespace.is_none()
            && self.package_type.is_none()
            && self.copyright.is_none()
            && self.license_name.is_none()
            && self.license_text.is_none()
            && self.comment.is_none()
            && self.urls.is_empty()
    }
}

// ─── Attribution Store ─────────────────────────────────────────────

/// Flat collection of attribution records for one kind, keyed by id.
/// Replaced wholesale on project load; append/update-only during a session.
#[derive(Debug, Clone, Default)]
pub struct AttributionStore {
    records: HashMap<AttributionId, PackageInfo>,
}

impl AttributionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: HashMap<AttributionId, PackageInfo>) -> Self {
        Self { records }
    }

    /// Lookup by id. Absence is a value, not an error.
    pub fn get(&self, id: &AttributionId) -> Option<&PackageInfo> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &AttributionId) -> bool {
        self.records.contains_key(id)
    }

    /// Insert or replace a record.
    pub fn upsert(&mut self, id: AttributionId, info: PackageInfo) {
        self.records.insert(id, info);
    }

    /// Remove a record, returning it if present.
    pub fn remove(&mut self, id: &AttributionId) -> Option<PackageInfo> {
        self.records.remove(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &AttributionId> {
        self.records.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AttributionId, &PackageInfo)> {
        self.records.iter()
    }
}
