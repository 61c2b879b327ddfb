//! Client for the redirect-based distributed file gateway.
//!
//! Writes and reads are two-phase: the name node answers with a temporary
//! redirect to the data node holding the file, and the payload moves in a
//! second request against that `Location`.

use ::std::path::Path;
use ::std::time::Duration;

use ::bytes::Bytes;
use ::rand::Rng;
use ::reqwest::{header, RequestBuilder, Response, StatusCode};
use ::serde::{Deserialize, Serialize};
use ::sparkwrap_common::{
    anyhow::anyhow,
    error::{ErrorTarget, Result, SparkwrapError},
    tokio::time::sleep,
    tracing::{info, warn},
};

use crate::{
    http::{RetryPolicy, RetryingClient},
    Credentials,
};

/// Entry type in a directory listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileType {
    File,
    Directory,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStatus {
    pub path_suffix: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
}

#[derive(Debug, Deserialize)]
struct FileStatuses {
    #[serde(rename = "FileStatus")]
    file_status: Vec<FileStatus>,
}

#[derive(Debug, Deserialize)]
struct ListStatusResponse {
    #[serde(rename = "FileStatuses")]
    file_statuses: FileStatuses,
}

#[derive(Debug, Deserialize)]
struct DeleteResponse {
    boolean: bool,
}

/// Outcome of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Finished,
    Skipped,
}

/// Report returned once an upload has been verified or skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub status: UploadStatus,
    pub location: String,
}

enum UploadDisposition {
    Absent,
    PresentSkip,
    PresentOverwrite,
}

/// Streamed file handed back by the gateway.
#[derive(Debug)]
pub struct FileDownload {
    file_name: String,
    response: Response,
}

impl FileDownload {
    /// Served as a generic byte stream regardless of what the data node
    /// reports.
    pub const CONTENT_TYPE: &'static str = "application/octet-stream";

    /// Final segment of the resolved file path.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content_disposition(&self) -> String {
        format!("attachment;filename=\"{}\"", self.file_name)
    }

    pub async fn bytes(self) -> Result<Bytes> {
        self.response.bytes().await.map_err(SparkwrapError::fail_to_transfer)
    }

    pub fn bytes_stream(self) -> impl ::futures_util::Stream<Item = reqwest::Result<Bytes>> {
        self.response.bytes_stream()
    }
}

/// Maximum number of extra create/redirect/write cycles run when a write
/// lands on a data node that does not know the file yet.
const WRITE_RACE_RETRIES: u32 = 5;

/// Client for the distributed file gateway.
#[derive(Debug, Clone)]
pub struct WebHdfsClient {
    base_url: String,
    credentials: Option<Credentials>,
    http: RetryingClient,
    http_no_redirect: RetryingClient,
    race_backoff_unit: Duration,
}

impl WebHdfsClient {
    pub fn new(gateway_url: impl Into<String>, credentials: Option<Credentials>) -> Result<Self> {
        Self::with_retry_policy(gateway_url, credentials, RetryPolicy::default())
    }

    pub fn with_retry_policy(
        gateway_url: impl Into<String>,
        credentials: Option<Credentials>,
        policy: RetryPolicy,
    ) -> Result<Self> {
        Ok(Self {
            base_url: format!("{}/webhdfs/v1", gateway_url.into()),
            credentials,
            http: RetryingClient::new(policy.clone()),
            http_no_redirect: RetryingClient::without_redirects(policy)?,
            race_backoff_unit: Duration::from_secs(1),
        })
    }

    /// Override the unit the write-race backoff is drawn in. Mainly lets
    /// tests run at millisecond scale.
    pub fn with_race_backoff_unit(mut self, race_backoff_unit: Duration) -> Self {
        self.race_backoff_unit = race_backoff_unit;
        self
    }

    /// Absolute URL of `path` on the gateway.
    pub(crate) fn file_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn build_url(&self, path: &str, op: &str) -> String {
        format!("{}?op={}", self.file_url(path), op)
    }

    /// List the entries under `path`, or `None` when the path does not
    /// exist. A file lists as a single entry with an empty name.
    pub async fn list_status(&self, path: &str) -> Result<Option<Vec<FileStatus>>> {
        let url = self.build_url(path, "LISTSTATUS");
        let builder = self.enable_auth_for_request(self.http.get(&url));
        let response = self.http.send(builder).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if !status.is_success() => Err(SparkwrapError::fail_to_transfer(anyhow!(
                "Attempt to list {} failed with {}.",
                path,
                status
            ))
            .with_target(ErrorTarget::new("file", path))),
            _ => {
                let listing: ListStatusResponse =
                    response.json().await.map_err(SparkwrapError::fail_to_transfer)?;
                Ok(Some(listing.file_statuses.file_status))
            }
        }
    }

    /// Resolve `path` to the file it denotes, descending through
    /// directories that hold exactly one entry. A directory with several
    /// entries cannot be narrowed down to a file and is rejected.
    pub async fn resolve_download_path(&self, path: &str) -> Result<String> {
        let mut current = path.to_owned();
        loop {
            let entries = self.list_status(&current).await?.ok_or_else(|| {
                SparkwrapError::not_found(anyhow!("File {} not found.", current))
                    .with_target(ErrorTarget::new("file", current.clone()))
            })?;
            match entries.as_slice() {
                [] => return Ok(current),
                [entry] if entry.path_suffix.is_empty() => return Ok(current),
                [entry] => {
                    let next = format!("{}/{}", current, entry.path_suffix);
                    match entry.file_type {
                        FileType::File => return Ok(next),
                        FileType::Directory => current = next,
                    }
                }
                _ => {
                    return Err(SparkwrapError::ambiguous_path(anyhow!(
                        "Path {} holds more than one entry and cannot be resolved to a single file.",
                        current
                    ))
                    .with_target(ErrorTarget::new("file", current.clone())))
                }
            }
        }
    }

    /// Resolve `path` and open the file behind it for streaming.
    pub async fn download_file(&self, path: &str) -> Result<FileDownload> {
        let resolved = self.resolve_download_path(path).await?;
        self.open_file(&resolved).await
    }

    /// Open `path` without resolving it first; it must name a plain file.
    pub(crate) async fn open_file(&self, path: &str) -> Result<FileDownload> {
        let url = self.build_url(path, "OPEN");
        let builder = self.enable_auth_for_request(self.http_no_redirect.get(&url));
        let response = self.http_no_redirect.send(builder).await?;
        let location = match response.status() {
            StatusCode::TEMPORARY_REDIRECT => Self::redirect_location(&response, path)?,
            StatusCode::NOT_FOUND => {
                return Err(SparkwrapError::not_found(anyhow!("File {} not found.", path))
                    .with_target(ErrorTarget::new("file", path)))
            }
            status => {
                return Err(SparkwrapError::fail_to_transfer(anyhow!(
                    "Attempt to open file {} failed with {}.",
                    path,
                    status
                ))
                .with_target(ErrorTarget::new("file", path)))
            }
        };
        let builder = self.enable_auth_for_request(self.http.get(&location));
        let response = self.http.send(builder).await?;
        if !response.status().is_success() {
            return Err(SparkwrapError::fail_to_transfer(anyhow!(
                "Attempt to download file {} failed with {}.",
                path,
                response.status()
            ))
            .with_target(ErrorTarget::new("file", path)));
        }
        let file_name = path.rsplit('/').next().unwrap_or(path).to_owned();
        Ok(FileDownload {
            file_name,
            response,
        })
    }

    /// Write `data` to `path` and verify the file is visible afterwards.
    ///
    /// With `overwrite` unset, a path that already exists is left alone and
    /// the report comes back as skipped.
    pub async fn upload_file(&self, path: &str, data: Bytes, overwrite: bool) -> Result<UploadReport> {
        match self.check_upload_disposition(path, overwrite).await? {
            UploadDisposition::PresentSkip => {
                info!("File {} already exists, skipping upload", path);
                return Ok(UploadReport {
                    status: UploadStatus::Skipped,
                    location: path.to_owned(),
                });
            }
            UploadDisposition::Absent | UploadDisposition::PresentOverwrite => {}
        }

        let mut response = self.create_and_write(path, data.clone(), overwrite).await?;

        // Concurrent writes race inside the gateway: the payload can land on
        // a data node that does not know the file yet and answers 404.
        // Re-running the whole create/redirect/write cycle with a growing
        // jittered delay gets past it.
        if response.status() == StatusCode::NOT_FOUND {
            let mut backoff = self.race_backoff_unit.mul_f64(rand::rng().random_range(1.0..5.0));
            let mut retry_attempt = 0;
            while response.status() == StatusCode::NOT_FOUND && retry_attempt < WRITE_RACE_RETRIES {
                retry_attempt += 1;
                warn!("Re-attempt {} of file {} upload", retry_attempt, path);
                sleep(backoff).await;
                backoff = backoff.mul_f64(1.5);
                response = self.create_and_write(path, data.clone(), overwrite).await?;
            }
            if response.status() == StatusCode::NOT_FOUND {
                return Err(SparkwrapError::fail_to_transfer(anyhow!(
                    "Attempt to write to file {} kept failing with 404 after {} retries.",
                    path,
                    retry_attempt
                ))
                .with_target(ErrorTarget::new("file", path)));
            }
        }

        if !response.status().is_success() {
            return Err(SparkwrapError::fail_to_transfer(anyhow!(
                "Attempt to write to file {} failed with {}.",
                path,
                response.status()
            ))
            .with_target(ErrorTarget::new("file", path)));
        }

        // The gateway has been seen acknowledging a write that never became
        // visible. Re-list the path before reporting success.
        if self.list_status(path).await?.is_none() {
            return Err(SparkwrapError::fail_to_transfer(anyhow!("File {} not found after write.", path))
                .with_target(ErrorTarget::new("file", path)));
        }

        Ok(UploadReport {
            status: UploadStatus::Finished,
            location: path.to_owned(),
        })
    }

    async fn check_upload_disposition(&self, path: &str, overwrite: bool) -> Result<UploadDisposition> {
        match self.list_status(path).await? {
            None => Ok(UploadDisposition::Absent),
            Some(_) if overwrite => Ok(UploadDisposition::PresentOverwrite),
            Some(_) => Ok(UploadDisposition::PresentSkip),
        }
    }

    /// One create/redirect/write cycle. Returns the data node's response to
    /// the write so the caller can tell a race from a real failure.
    async fn create_and_write(&self, path: &str, data: Bytes, overwrite: bool) -> Result<Response> {
        let mut url = self.build_url(path, "CREATE");
        if overwrite {
            url.push_str("&overwrite=true");
        }
        let builder = self.enable_auth_for_request(self.http_no_redirect.put(&url));
        let response = self.http_no_redirect.send(builder).await?;
        if response.status() != StatusCode::TEMPORARY_REDIRECT {
            return Err(SparkwrapError::fail_to_transfer(anyhow!(
                "Attempt to create file {} failed with {}.",
                path,
                response.status()
            ))
            .with_target(ErrorTarget::new("file", path)));
        }
        let location = Self::redirect_location(&response, path)?;
        let builder = self.enable_auth_for_request(self.http.put(&location).body(data));
        self.http.send(builder).await
    }

    /// Delete `path`. A path without a file extension is taken to be a
    /// directory and deleted recursively.
    pub async fn delete_file(&self, path: &str) -> Result<()> {
        let mut url = self.build_url(path, "DELETE");
        if Self::has_no_extension(path) {
            url.push_str("&recursive=true");
        }
        let builder = self.enable_auth_for_request(self.http.delete(&url));
        let response = self.http.send(builder).await?;
        if !response.status().is_success() {
            return Err(SparkwrapError::fail_to_transfer(anyhow!(
                "Attempt to delete file {} failed with {}.",
                path,
                response.status()
            ))
            .with_target(ErrorTarget::new("file", path)));
        }
        Ok(())
    }

    /// Delete the directory at `path` and everything under it.
    pub async fn delete_directory(&self, path: &str) -> Result<()> {
        let url = format!("{}&recursive=true", self.build_url(path, "DELETE"));
        let builder = self.enable_auth_for_request(self.http.delete(&url));
        let response = self.http.send(builder).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SparkwrapError::fail_to_transfer(anyhow!("Directory {} not found.", path))
                .with_target(ErrorTarget::new("directory", path)));
        }
        if !status.is_success() {
            return Err(SparkwrapError::fail_to_transfer(anyhow!(
                "Attempt to delete directory {} failed with {}.",
                path,
                status
            ))
            .with_target(ErrorTarget::new("directory", path)));
        }
        // The gateway reports "nothing was deleted" as a success with a
        // false flag in the body.
        let outcome: DeleteResponse = response.json().await.map_err(SparkwrapError::fail_to_transfer)?;
        if !outcome.boolean {
            return Err(SparkwrapError::fail_to_transfer(anyhow!("Directory {} was not deleted.", path))
                .with_target(ErrorTarget::new("directory", path)));
        }
        Ok(())
    }

    fn redirect_location(response: &Response, path: &str) -> Result<String> {
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .ok_or_else(|| {
                SparkwrapError::fail_to_transfer(anyhow!(
                    "Gateway redirect for {} carries no usable Location header.",
                    path
                ))
                .with_target(ErrorTarget::new("file", path))
            })
    }

    fn has_no_extension(path: &str) -> bool {
        Path::new(path).extension().is_none()
    }

    fn enable_auth_for_request(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some(Credentials::Basic { username, password }) => builder.basic_auth(username, password.as_ref()),
            Some(Credentials::Bearer { token }) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::sparkwrap_common::serde_json::{self, json};

    #[test]
    fn paths_without_extension_are_treated_as_directories() {
        assert!(WebHdfsClient::has_no_extension("user/gateway/models"));
        assert!(WebHdfsClient::has_no_extension("user/gateway/.staging"));
        assert!(!WebHdfsClient::has_no_extension("user/gateway/models/model.pkl"));
        assert!(!WebHdfsClient::has_no_extension("user/gateway/archive.tar.gz"));
        assert!(!WebHdfsClient::has_no_extension("user/gateway.v2/data.csv"));
    }

    #[test]
    fn listing_entries_deserialize_from_gateway_payload() {
        let listing: ListStatusResponse = serde_json::from_value(json!({
            "FileStatuses": {
                "FileStatus": [
                    {"pathSuffix": "part-00000.csv", "type": "FILE", "length": 24930},
                    {"pathSuffix": "checkpoints", "type": "DIRECTORY", "length": 0},
                ]
            }
        }))
        .unwrap();
        assert_eq!(
            listing.file_statuses.file_status,
            vec![
                FileStatus {
                    path_suffix: "part-00000.csv".to_owned(),
                    file_type: FileType::File,
                },
                FileStatus {
                    path_suffix: "checkpoints".to_owned(),
                    file_type: FileType::Directory,
                },
            ]
        );
    }

    #[test]
    fn upload_report_serializes_with_lowercase_status() {
        let report = UploadReport {
            status: UploadStatus::Finished,
            location: "user/gateway/models/model.pkl".to_owned(),
        };
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({"status": "finished", "location": "user/gateway/models/model.pkl"})
        );
    }
}
