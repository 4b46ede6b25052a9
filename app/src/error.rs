//! Pipeline-level error type.
//!
//! Leaf modules (`fs_ops`, `archive`) expose their own small `thiserror`
//! enums, matching the teacher crate's `fs_op::mv::MvError` /
//! `fs_op::create::CreateError` split; this type is the single error
//! surfaced by `Pipeline::run` once those are folded in with `#[from]`.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("scan failed at {root}: {source}")]
    ScanFailed {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no supported files found in {0}")]
    NothingToImport(PathBuf),

    #[error("no output handler accepted {0}")]
    NoHandlerAccepted(PathBuf),

    #[error("transfer failed {src} -> {dst}: {source}")]
    TransferFailed {
        src: PathBuf,
        dst: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "file transfer incomplete, data loss may have occurred: '{dest}' was {actual} bytes instead of expected {expected}"
    )]
    SizeMismatch {
        dest: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("could not find a free destination name after {attempts} attempts: {desired}")]
    CollisionExhausted { desired: PathBuf, attempts: u32 },

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
