//! Typed configuration (spec.md §6, SPEC_FULL.md §4.10).
//!
//! Loaded once from TOML, the way the teacher's `app::settings` module
//! loads `Settings` via `serde` + `toml` + `anyhow::Context` — recognized
//! keys are parsed into this struct at the edge, not re-read per call site
//! (Design Note §9 "dynamic config access").

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::ContentType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOrganization {
    None,
    Rename,
    Organize,
}

fn default_book_destination() -> PathBuf {
    PathBuf::from("/books")
}

fn default_file_organization() -> FileOrganization {
    FileOrganization::Rename
}

fn default_template_rename() -> String {
    "{Author} - {Title} ({Year})".to_string()
}

fn default_template_organize() -> String {
    "{Author}/{Title} ({Year})".to_string()
}

fn default_audiobook_template_rename() -> String {
    "{Author} - {Title}".to_string()
}

fn default_audiobook_template_organize() -> String {
    "{Author}/{Title}".to_string()
}

fn default_book_formats() -> Vec<String> {
    ["epub", "mobi", "azw3", "fb2", "djvu", "cbz", "cbr"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_audiobook_formats() -> Vec<String> {
    ["m4b", "mp3"].into_iter().map(String::from).collect()
}

/// Per-category override directories for `AA_CONTENT_TYPE_ROUTING` (spec.md
/// §4.6, §6). Keys mirror `cwa_book_downloader.config.settings`'
/// `AA_CONTENT_TYPE_DIR_*` fields, minus the `audiobook`/`other` catch-alls
/// handled by `DESTINATION`/`DESTINATION_AUDIOBOOK` directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentTypeRouting {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub fiction: Option<PathBuf>,
    #[serde(default)]
    pub non_fiction: Option<PathBuf>,
    #[serde(default)]
    pub unknown: Option<PathBuf>,
    #[serde(default)]
    pub magazine: Option<PathBuf>,
    #[serde(default)]
    pub comic: Option<PathBuf>,
    #[serde(default)]
    pub standards: Option<PathBuf>,
    #[serde(default)]
    pub musical_score: Option<PathBuf>,
    #[serde(default)]
    pub other: Option<PathBuf>,
}

impl ContentTypeRouting {
    /// The override directory for `content_type`, if routing is enabled and
    /// one is configured. `Audiobook` never routes here (spec.md §4.6: only
    /// "non-audiobook" tasks consult this table).
    pub fn directory_for(&self, content_type: &ContentType) -> Option<&Path> {
        if !self.enabled {
            return None;
        }
        let slot = match content_type {
            ContentType::Fiction => &self.fiction,
            ContentType::NonFiction => &self.non_fiction,
            ContentType::Unknown => &self.unknown,
            ContentType::Magazine => &self.magazine,
            ContentType::Comic => &self.comic,
            ContentType::Standards => &self.standards,
            ContentType::MusicalScore => &self.musical_score,
            ContentType::Audiobook => return None,
            ContentType::Other => &self.other,
        };
        slot.as_deref()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_book_destination")]
    pub destination: PathBuf,
    #[serde(default)]
    pub destination_audiobook: Option<PathBuf>,

    #[serde(default = "default_file_organization")]
    pub file_organization: FileOrganization,
    #[serde(default = "default_file_organization")]
    pub file_organization_audiobook: FileOrganization,

    #[serde(default = "default_template_rename")]
    pub template_rename: String,
    #[serde(default = "default_template_organize")]
    pub template_organize: String,
    #[serde(default = "default_audiobook_template_rename")]
    pub template_audiobook_rename: String,
    #[serde(default = "default_audiobook_template_organize")]
    pub template_audiobook_organize: String,

    #[serde(default = "default_book_formats")]
    pub supported_formats: Vec<String>,
    #[serde(default = "default_audiobook_formats")]
    pub supported_audiobook_formats: Vec<String>,

    #[serde(default)]
    pub hardlink_torrents: bool,
    #[serde(default)]
    pub hardlink_torrents_audiobook: bool,

    #[serde(default)]
    pub custom_script: Option<PathBuf>,

    #[serde(default)]
    pub content_type_routing: ContentTypeRouting,

    /// Unrecognized keys, kept for forward compatibility with the host's
    /// key/value store rather than rejecting unknown settings.
    #[serde(flatten)]
    pub extra: HashMap<String, toml::Value>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            destination: default_book_destination(),
            destination_audiobook: None,
            file_organization: default_file_organization(),
            file_organization_audiobook: default_file_organization(),
            template_rename: default_template_rename(),
            template_organize: default_template_organize(),
            template_audiobook_rename: default_audiobook_template_rename(),
            template_audiobook_organize: default_audiobook_template_organize(),
            supported_formats: default_book_formats(),
            supported_audiobook_formats: default_audiobook_formats(),
            hardlink_torrents: false,
            hardlink_torrents_audiobook: true,
            custom_script: None,
            content_type_routing: ContentTypeRouting::default(),
            extra: HashMap::new(),
        }
    }
}

impl Config {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("parsing configuration TOML")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml_str(&contents)
    }

    /// Book destination, or the audiobook-specific one when `is_audiobook`.
    pub fn destination_for(&self, is_audiobook: bool) -> &Path {
        if is_audiobook {
            self.destination_audiobook
                .as_deref()
                .unwrap_or(&self.destination)
        } else {
            &self.destination
        }
    }

    pub fn file_organization_for(&self, is_audiobook: bool) -> FileOrganization {
        if is_audiobook {
            self.file_organization_audiobook
        } else {
            self.file_organization
        }
    }

    pub fn template_rename_for(&self, is_audiobook: bool) -> &str {
        if is_audiobook {
            &self.template_audiobook_rename
        } else {
            &self.template_rename
        }
    }

    pub fn template_organize_for(&self, is_audiobook: bool) -> &str {
        if is_audiobook {
            &self.template_audiobook_organize
        } else {
            &self.template_organize
        }
    }

    pub fn hardlink_enabled_for(&self, is_audiobook: bool) -> bool {
        if is_audiobook {
            self.hardlink_torrents_audiobook
        } else {
            self.hardlink_torrents
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_recognized_keys() {
        let config = Config::default();
        assert_eq!(config.destination, PathBuf::from("/books"));
        assert!(config.supported_formats.contains(&"epub".to_string()));
        assert!(config.supported_audiobook_formats.contains(&"mp3".to_string()));
        assert!(config.hardlink_torrents_audiobook);
        assert!(!config.hardlink_torrents);
    }

    #[test]
    fn partial_toml_overlays_onto_defaults() {
        let config = Config::from_toml_str(
            r#"
            destination = "/ingest"
            hardlink_torrents = true

            [content_type_routing]
            enabled = true
            comic = "/ingest/comics"
            "#,
        )
        .unwrap();

        assert_eq!(config.destination, PathBuf::from("/ingest"));
        assert!(config.hardlink_torrents);
        assert_eq!(
            config.content_type_routing.directory_for(&ContentType::Comic),
            Some(Path::new("/ingest/comics"))
        );
        assert_eq!(
            config.content_type_routing.directory_for(&ContentType::Audiobook),
            None
        );
    }
}
