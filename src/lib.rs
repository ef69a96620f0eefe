//! # merkja — Resource–Attribution Tree Core
//!
//! The data core of a license audit tool: it maps a filesystem-like resource
//! hierarchy to attributions (package/license metadata) from two sources —
//! user-authored ("manual") and tool-derived ("external") — and lets an
//! analyst resolve, edit, and navigate them without losing uncommitted work.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        AuditSession                          │
//! │  ┌────────────┐ ┌─────────────┐ ┌──────────┐ ┌────────────┐ │
//! │  │ResourceTree│ │ Attribution │ │TreePolicy│ │ Navigation │ │
//! │  │ (path      │ │ Store+Index │ │(breakpts,│ │   Guard    │ │
//! │  │  arena)    │ │(bidirection)│ │ virtual  │ │ (3 states) │ │
//! │  └─────┬──────┘ └──────┬──────┘ │ folders) │ └────────────┘ │
//! │        │               │        └────┬─────┘                │
//! │  ┌─────▼───────────────▼─────────────▼─────┐                │
//! │  │ CoverageWorker (dedicated thread)       │  seeded once,  │
//! │  │ seq-correlated requests, stale discard  │  deltas only   │
//! │  └─────────────────────────────────────────┘                │
//! │  ┌─────────────────────────────────────────┐                │
//! │  │ Tree presenter: visible rows, sorting,  │  synchronous   │
//! │  │ auto-expand chains, windowed slices     │                │
//! │  └─────────────────────────────────────────┘                │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The presentation layer, persistence format readers/writers, application
//! shell, and report generation are external collaborators; they consume
//! this crate through [`project::AuditSession`] and the row/summary types
//! it exposes.

pub mod guard;
pub mod model;
pub mod policy;
pub mod progress;
pub mod project;
pub mod view;

pub use guard::{GuardState, NavigationGuard, StagedDestination};
pub use model::index::AttributionIndex;
pub use model::resources::{ResourceInput, ResourceTree};
pub use model::{
    AttributionId, AttributionKind, AttributionStore, Criticality, DiscreteConfidence, PackageInfo,
};
pub use policy::TreePolicy;
pub use progress::ProgressSummary;
pub use project::{AuditSession, ProjectSnapshot};
pub use view::VisibleRow;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MerkjaError {
    /// The loaded project references data that does not exist (dangling
    /// attribution id or unknown resource path). Fatal to the load; the
    /// caller must surface a reload/re-import request.
    #[error("Project consistency fault: {0}")]
    Consistency(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type MerkjaResult<T> = Result<T, MerkjaError>;
