//! Plan-shaped values threaded between scan, destination and transfer
//! (spec.md §3 "PreparedFiles" / "OutputPlan / TransferPlan").

use std::collections::BTreeMap;
use std::path::PathBuf;

/// One human-readable step in a processing plan, captured for debug traces
/// (spec.md §3, §4.8 "PlanStep log").
#[derive(Debug, Clone)]
pub struct PlanStep {
    pub name: String,
    pub details: BTreeMap<String, String>,
}

impl PlanStep {
    pub fn new(name: impl Into<String>) -> Self {
        PlanStep {
            name: name.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Result of the scan phase (spec.md §4.2).
#[derive(Debug, Clone, Default)]
pub struct PreparedFiles {
    /// Source file paths in natural sort order.
    pub files: Vec<PathBuf>,
    /// Paths rejected by format filtering, kept for diagnostics only.
    pub rejected: Vec<PathBuf>,
    /// Paths under the managed workspace to remove once the transfer phase
    /// finishes, regardless of outcome.
    pub workspace_cleanup: Vec<PathBuf>,
    /// Set when the scan itself failed (e.g. permission denied at the
    /// root); mutually exclusive with a non-empty `files`.
    pub error: Option<String>,
}

impl PreparedFiles {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// The strategy `transfer` selects for one prepared file (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStrategy {
    Hardlink,
    Copy,
    Move,
}

/// One planned transfer: a prepared source, its rendered destination
/// template, the metadata used to render it, and the chosen strategy.
#[derive(Debug, Clone)]
pub struct TransferPlan {
    pub source: PathBuf,
    pub destination_template: String,
    pub metadata: BTreeMap<String, String>,
    pub strategy: TransferStrategy,
}

/// The full sequence of transfers to perform for one task.
#[derive(Debug, Clone, Default)]
pub struct OutputPlan {
    pub transfers: Vec<TransferPlan>,
    pub steps: Vec<PlanStep>,
}
