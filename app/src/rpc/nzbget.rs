//! NZBGet JSON-RPC 2.0 client (spec.md §4.9), grounded line-for-line on
//! `examples/original_source/shelfmark/release_sources/prowlarr/clients/nzbget.py`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Value};
use std::time::Duration;

use super::{ClientError, DownloadClient, DownloadState, DownloadStatus, DEFAULT_TIMEOUT};

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

pub struct NzbGetClient {
    url: String,
    username: String,
    password: String,
    category: String,
    http: reqwest::blocking::Client,
}

impl NzbGetClient {
    pub fn new(url: &str, username: &str, password: &str, category: &str) -> Self {
        NzbGetClient {
            url: url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            category: category.to_string(),
            http: reqwest::blocking::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .expect("reqwest client builds with a static timeout"),
        }
    }

    fn rpc_call(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let rpc_url = format!("{}/jsonrpc", self.url);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        super::with_retry(RETRY_ATTEMPTS, RETRY_BACKOFF, || -> Result<Value, ClientError> {
            let response = self
                .http
                .post(&rpc_url)
                .basic_auth(&self.username, Some(&self.password))
                .json(&payload)
                .send()?
                .error_for_status()?;
            let body: Value = response.json()?;

            if let Some(error) = body.get("error") {
                if !error.is_null() {
                    let message = error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("RPC error")
                        .to_string();
                    return Err(ClientError::Rpc(message));
                }
            }

            body.get("result")
                .cloned()
                .ok_or_else(|| ClientError::InvalidResponse("response missing result".to_string()))
        })
    }
}

fn hi_lo(value: &Value, hi_key: &str, lo_key: &str) -> i64 {
    let hi = value.get(hi_key).and_then(Value::as_i64).unwrap_or(0);
    let lo = value.get(lo_key).and_then(Value::as_i64).unwrap_or(0);
    (hi << 32) + lo
}

fn title_case(input: &str) -> String {
    input
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// The prioritized `editqueue` command list for `remove()` (spec.md §4.9,
/// Design Note §9(a): both `HistoryFinalDelete` and `HistoryDelete` are
/// kept since the original notes the latter as a compatibility fallback
/// for servers it does not further identify).
fn remove_commands(delete_files: bool) -> &'static [&'static str] {
    if delete_files {
        &["GroupFinalDelete", "HistoryFinalDelete", "HistoryDelete"]
    } else {
        &["GroupDelete", "HistoryDelete"]
    }
}

impl DownloadClient for NzbGetClient {
    fn test_connection(&self) -> (bool, String) {
        match self.rpc_call("status", json!([])) {
            Ok(status) => {
                let version = status.get("Version").and_then(Value::as_str).unwrap_or("unknown");
                (true, format!("Connected to NZBGet {version}"))
            }
            Err(ClientError::Request(e)) if e.is_timeout() => {
                (false, "Connection timed out".to_string())
            }
            Err(ClientError::Request(e)) if e.is_connect() => {
                (false, "Could not connect to NZBGet".to_string())
            }
            Err(e) => (false, format!("Connection failed: {e}")),
        }
    }

    fn add_download(
        &self,
        url: &str,
        name: &str,
        category: Option<&str>,
    ) -> Result<String, ClientError> {
        let category = category.unwrap_or(&self.category);

        let response = self.http.get(url).send()?.error_for_status()?;
        let bytes = response.bytes()?;
        let encoded = BASE64.encode(&bytes);
        let filename = if name.ends_with(".nzb") {
            name.to_string()
        } else {
            format!("{name}.nzb")
        };

        // NZBFilename, Content, Category, Priority, AddToTop, AddPaused,
        // DupeKey, DupeScore, DupeMode, PPParameters — all ten required.
        let params = json!([filename, encoded, category, 0, false, false, "", 0, "SCORE", []]);
        let result = self.rpc_call("append", params)?;

        match result.as_i64() {
            Some(id) if id > 0 => Ok(id.to_string()),
            _ => Err(ClientError::InvalidResponse(
                "NZBGet returned invalid ID".to_string(),
            )),
        }
    }

    fn get_status(&self, download_id: &str) -> DownloadStatus {
        let Ok(nzb_id) = download_id.parse::<i64>() else {
            return DownloadStatus::error("invalid download id");
        };

        let groups = match self.rpc_call("listgroups", json!([0])) {
            Ok(v) => v,
            Err(e) => return DownloadStatus::error(e.to_string()),
        };

        if let Some(group) = groups
            .as_array()
            .into_iter()
            .flatten()
            .find(|g| g.get("NZBID").and_then(Value::as_i64) == Some(nzb_id))
        {
            let file_size = hi_lo(group, "FileSizeHi", "FileSizeLo");
            let remaining = hi_lo(group, "RemainingSizeHi", "RemainingSizeLo");
            let progress = if file_size > 0 {
                (file_size - remaining) as f64 / file_size as f64 * 100.0
            } else {
                0.0
            };
            let status = group.get("Status").and_then(Value::as_str).unwrap_or("");
            let state = if status.contains("DOWNLOADING") {
                DownloadState::Downloading
            } else if status.contains("PAUSED") {
                DownloadState::Paused
            } else if status.contains("QUEUED") {
                DownloadState::Queued
            } else if status.contains("POST-PROCESSING") || status.contains("UNPACKING") {
                DownloadState::Processing
            } else {
                DownloadState::Unknown
            };

            return DownloadStatus {
                progress,
                state,
                message: title_case(&status.replace('-', " ")),
                complete: false,
                file_path: None,
                download_speed: group.get("DownloadRate").and_then(Value::as_i64),
                eta: group
                    .get("RemainingSec")
                    .and_then(Value::as_i64)
                    .filter(|s| *s > 0),
            };
        }

        let history = match self.rpc_call("history", json!([false])) {
            Ok(v) => v,
            Err(e) => return DownloadStatus::error(e.to_string()),
        };

        if let Some(item) = history
            .as_array()
            .into_iter()
            .flatten()
            .find(|item| item.get("NZBID").and_then(Value::as_i64) == Some(nzb_id))
        {
            let status = item.get("Status").and_then(Value::as_str).unwrap_or("");
            let final_dir = item
                .get("FinalDir")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty());
            let dest_dir = item
                .get("DestDir")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty());
            let file_path = final_dir.or(dest_dir).map(str::to_string);

            return if status.contains("SUCCESS") {
                DownloadStatus {
                    progress: 100.0,
                    state: DownloadState::Complete,
                    message: "Complete".to_string(),
                    complete: true,
                    file_path,
                    download_speed: None,
                    eta: None,
                }
            } else {
                DownloadStatus {
                    progress: 100.0,
                    state: DownloadState::Error,
                    message: format!("Download failed: {status}"),
                    complete: true,
                    file_path: None,
                    download_speed: None,
                    eta: None,
                }
            };
        }

        DownloadStatus::error("Download not found")
    }

    fn remove(&self, download_id: &str, delete_files: bool) -> bool {
        let Ok(nzb_id) = download_id.parse::<i64>() else {
            return false;
        };

        let mut last_error = None;
        for command in remove_commands(delete_files) {
            match self.rpc_call("editqueue", json!([command, 0, "", nzb_id])) {
                Ok(result) if result.as_bool().unwrap_or(false) => {
                    tracing::info!(command, download_id, "removed NZB from NZBGet");
                    return true;
                }
                Ok(_) => {}
                Err(e) => last_error = Some(e),
            }
        }

        if let Some(e) = last_error {
            tracing::warn!(download_id, error = %e, "failed to remove NZB from NZBGet");
        }
        false
    }
}
