//! External download-client protocol surface (spec.md §4.9).
//!
//! The pipeline does not download anything itself; this module exists
//! because a client's `original_download_path`/completion contract is what
//! shapes the classification rules in `transfer::is_torrent_source`.

pub mod nzbget;

use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Downloading,
    Paused,
    Queued,
    Processing,
    Complete,
    Error,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct DownloadStatus {
    pub progress: f64,
    pub state: DownloadState,
    pub message: String,
    pub complete: bool,
    pub file_path: Option<String>,
    pub download_speed: Option<i64>,
    pub eta: Option<i64>,
}

impl DownloadStatus {
    pub fn error(message: impl Into<String>) -> Self {
        DownloadStatus {
            progress: 0.0,
            state: DownloadState::Error,
            message: message.into(),
            complete: true,
            file_path: None,
            download_speed: None,
            eta: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Capability interface for a download-client integration (spec.md §4.9).
/// A faithful reference implementation (NZBGet) lives in `rpc::nzbget`.
pub trait DownloadClient {
    fn test_connection(&self) -> (bool, String);
    fn add_download(
        &self,
        url: &str,
        name: &str,
        category: Option<&str>,
    ) -> Result<String, ClientError>;
    fn get_status(&self, download_id: &str) -> DownloadStatus;
    fn remove(&self, download_id: &str, delete_files: bool) -> bool;
}

/// Retry an RPC call a fixed number of times with linear backoff, matching
/// the original client's `@with_retry()` decorator.
pub fn with_retry<T, E>(
    attempts: u32,
    backoff: Duration,
    mut call: impl FnMut() -> Result<T, E>,
) -> Result<T, E> {
    let mut last_err = None;
    for attempt in 0..attempts {
        match call() {
            Ok(value) => return Ok(value),
            Err(e) => {
                last_err = Some(e);
                if attempt + 1 < attempts {
                    std::thread::sleep(backoff);
                }
            }
        }
    }
    Err(last_err.expect("attempts is always >= 1"))
}
