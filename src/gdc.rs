use std::fs::File;
use std::path::Path;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;

use crate::error::SkcmError;
use crate::table::{Table, TableOptions};

pub const GDC_API: &str = "https://api.gdc.cancer.gov";

/// One row of a GDC portal manifest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestEntry {
    pub id: String,
    pub filename: String,
    pub md5: Option<String>,
    pub size: Option<u64>,
    pub state: Option<String>,
}

/// Parses a GDC manifest (`id filename md5 size state`, tab separated).
pub fn read_manifest(path: &Path) -> Result<Vec<ManifestEntry>, SkcmError> {
    let table = Table::read(path, &TableOptions::default())?;
    manifest_entries(&table)
}

pub fn manifest_entries(table: &Table) -> Result<Vec<ManifestEntry>, SkcmError> {
    let id_col = table
        .column("id")
        .map_err(|_| SkcmError::InvalidManifest("missing `id` column".to_string()))?;
    let name_col = table
        .column("filename")
        .map_err(|_| SkcmError::InvalidManifest("missing `filename` column".to_string()))?;
    let md5_col = table.column("md5").ok();
    let size_col = table.column("size").ok();
    let state_col = table.column("state").ok();

    let optional = |row: usize, column: Option<usize>| {
        column
            .map(|column| table.cell(row, column).to_string())
            .filter(|value| !value.is_empty())
    };

    let mut entries = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        let id = table.cell(row, id_col).to_string();
        let filename = table.cell(row, name_col).to_string();
        if id.is_empty() || filename.is_empty() {
            return Err(SkcmError::InvalidManifest(format!(
                "row {} has an empty id or filename",
                row + 1
            )));
        }
        if filename.contains(['/', '\\']) || id.contains(['/', '\\']) {
            return Err(SkcmError::InvalidManifest(format!(
                "row {} contains a path separator",
                row + 1
            )));
        }
        let size = match optional(row, size_col) {
            Some(value) => Some(value.parse::<u64>().map_err(|_| {
                SkcmError::InvalidManifest(format!("row {}: invalid size {value}", row + 1))
            })?),
            None => None,
        };
        entries.push(ManifestEntry {
            id,
            filename,
            md5: optional(row, md5_col),
            size,
            state: optional(row, state_col),
        });
    }
    if entries.is_empty() {
        return Err(SkcmError::InvalidManifest(format!(
            "{} lists no files",
            table.path().display()
        )));
    }
    Ok(entries)
}

pub trait GdcClient: Send + Sync {
    /// Streams the file with the given GDC id into `destination` and returns
    /// the number of bytes written.
    fn download_file(&self, file_id: &str, destination: &Path) -> Result<u64, SkcmError>;
}

#[derive(Clone)]
pub struct GdcHttpClient {
    client: Client,
    base_url: String,
}

impl GdcHttpClient {
    pub fn new() -> Result<Self, SkcmError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("tcga-skcm/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SkcmError::Filesystem(err.to_string()))?,
        );

        if let Ok(token) = std::env::var("GDC_TOKEN") {
            if !token.trim().is_empty() {
                headers.insert(
                    "X-Auth-Token",
                    HeaderValue::from_str(token.trim())
                        .map_err(|err| SkcmError::GdcHttp(err.to_string()))?,
                );
            }
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(|err| SkcmError::GdcHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: GDC_API.to_string(),
        })
    }

    pub fn data_url(&self, file_id: &str) -> String {
        format!("{}/data/{file_id}", self.base_url)
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<reqwest::blocking::Response, SkcmError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 500;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        tracing::warn!(status, attempt, "GDC request failed, retrying");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        tracing::warn!(error = %err, attempt, "GDC request failed, retrying");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(SkcmError::GdcHttp(err.to_string()));
                }
            }
        }
    }
}

impl GdcClient for GdcHttpClient {
    fn download_file(&self, file_id: &str, destination: &Path) -> Result<u64, SkcmError> {
        let url = self.data_url(file_id);
        let mut response = self.send_with_retries(|| self.client.get(&url))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "GDC request failed".to_string());
            return Err(SkcmError::GdcStatus { status, message });
        }
        let mut file =
            File::create(destination).map_err(|err| SkcmError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| SkcmError::GdcHttp(format!("reading body of {file_id}: {err}")))
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy() {
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(429));
        assert!(!is_retryable_status(404));
    }
}
