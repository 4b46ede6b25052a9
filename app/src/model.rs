//! Task and metadata types consumed from the scheduler.
//!
//! These are typed at the boundary (Design Note: "dynamic config access")
//! so the rest of the pipeline never has to re-parse stringly-typed values.

use serde::{Deserialize, Serialize};

/// Where a completed download originated.
///
/// Splits semantically into managed (the service produced the file itself,
/// e.g. `DirectDownload`) and external (a download client produced it in a
/// location the pipeline does not own).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSource {
    DirectDownload,
    Prowlarr,
    Other,
}

impl TaskSource {
    /// Whether this source denotes an external (torrent/usenet) client
    /// rather than a location the service itself staged.
    pub fn is_external_client(self) -> bool {
        matches!(self, TaskSource::Prowlarr | TaskSource::Other)
    }
}

/// Categorical content tag. `Audiobook` switches destination, template,
/// hardlink toggle and the supported-format set; other values may trigger
/// content-type routing overrides.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Fiction,
    NonFiction,
    Unknown,
    Magazine,
    Comic,
    Standards,
    MusicalScore,
    Audiobook,
    Other,
}

impl ContentType {
    pub fn is_audiobook(&self) -> bool {
        matches!(self, ContentType::Audiobook)
    }
}

/// Search mode affects defaulting when a value is unspecified; `Universal`
/// unlocks audiobook-specific settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Direct,
    Universal,
}

/// Inputs to a single pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadTask {
    pub task_id: String,
    pub source: TaskSource,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub series: Option<String>,
    #[serde(default)]
    pub series_position: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub part_number: Option<u32>,
    /// Primary expected file extension, without the leading dot.
    pub format: String,
    pub content_type: ContentType,
    #[serde(default)]
    pub search_mode: Option<SearchMode>,
    /// When present and equal to the input path, this task is an external
    /// torrent-like source whose file must be preserved for seeding.
    #[serde(default)]
    pub original_download_path: Option<std::path::PathBuf>,
}

impl DownloadTask {
    /// `search_mode`, defaulted per spec.md §6 ("affects defaulting when
    /// unspecified") to `Direct` behavior for a missing or unrecognized value.
    pub fn effective_search_mode(&self) -> SearchMode {
        self.search_mode.unwrap_or(SearchMode::Direct)
    }
}
