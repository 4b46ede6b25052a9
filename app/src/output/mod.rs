//! Output handler implementations (spec.md §4.8). `folder` is the default,
//! core handler described by §4.1–§4.7; alternative handlers (e.g. upload
//! to a remote library API) would live as sibling modules here, consuming
//! the same `PipelineContext` and honoring the same workspace discipline.

pub mod folder;

pub use folder::FolderHandler;
