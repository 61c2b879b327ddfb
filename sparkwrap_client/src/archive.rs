//! Directory transfer as gzip tar archives.
//!
//! Directories cross the wire packed: a download walks the remote tree,
//! fetches the files a few at a time into a scratch directory and packs
//! them; an upload unpacks into a scratch directory and pushes every file
//! back out. Scratch space is cleaned up on every exit path.

use ::std::path::{Path, PathBuf};
use ::std::sync::Arc;

use ::bytes::Bytes;
use ::flate2::{read::GzDecoder, write::GzEncoder, Compression};
use ::sparkwrap_common::{
    anyhow::anyhow,
    error::{ErrorTarget, Result, SparkwrapError},
    tokio::{self, fs, io::AsyncWriteExt, sync::Semaphore, task},
    tracing::{debug, info},
};
use ::tar::{Archive, Builder};
use ::tempfile::TempDir;

use crate::webhdfs::{FileStatus, FileType, WebHdfsClient};

/// A directory packed into a gzip tar blob, named after the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryArchive {
    pub file_name: String,
    pub bytes: Bytes,
}

impl DirectoryArchive {
    pub const CONTENT_TYPE: &'static str = "application/octet-stream";

    pub fn content_disposition(&self) -> String {
        format!("attachment;filename=\"{}\"", self.file_name)
    }
}

/// Pack the contents of `dir` into a gzip tar held in memory.
fn pack_directory(dir: &Path) -> Result<Bytes> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);
    builder
        .append_dir_all(".", dir)
        .map_err(SparkwrapError::fail_to_transfer)?;
    let encoder = builder.into_inner().map_err(SparkwrapError::fail_to_transfer)?;
    let compressed = encoder.finish().map_err(SparkwrapError::fail_to_transfer)?;
    Ok(Bytes::from(compressed))
}

/// Unpack a gzip tar blob into `dest` and return the relative paths of the
/// regular files it contained.
fn unpack_archive(blob: &[u8], dest: &Path) -> Result<Vec<PathBuf>> {
    let mut archive = Archive::new(GzDecoder::new(blob));
    let mut files = Vec::new();
    let entries = archive.entries().map_err(SparkwrapError::fail_to_transfer)?;
    for entry in entries {
        let mut entry = entry.map_err(SparkwrapError::fail_to_transfer)?;
        let is_file = entry.header().entry_type().is_file();
        let path = entry
            .path()
            .map_err(SparkwrapError::fail_to_transfer)?
            .into_owned();
        let path = path.strip_prefix(".").map(Path::to_path_buf).unwrap_or(path);
        entry.unpack_in(dest).map_err(SparkwrapError::fail_to_transfer)?;
        if is_file && !path.as_os_str().is_empty() {
            files.push(path);
        }
    }
    Ok(files)
}

impl WebHdfsClient {
    /// Number of files fetched concurrently while a directory is packed.
    const CONCURRENT_DOWNLOADS: usize = 5;

    /// Pack the directory at `path` into a gzip tar archive named after its
    /// final segment.
    pub async fn download_directory(&self, path: &str) -> Result<DirectoryArchive> {
        let path = path.trim_end_matches('/');
        let entries = self.list_status(path).await?.ok_or_else(|| {
            SparkwrapError::fail_to_transfer(anyhow!("Directory {} not found.", path))
                .with_target(ErrorTarget::new("directory", path))
        })?;
        let files = self.collect_files(path, entries).await?;
        info!("Downloading {} files from {}", files.len(), path);

        let staging = TempDir::new().map_err(SparkwrapError::fail_to_transfer)?;
        let semaphore = Arc::new(Semaphore::new(Self::CONCURRENT_DOWNLOADS));
        let mut handles = Vec::with_capacity(files.len());
        for rel in files {
            let fetcher = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let remote = format!("{}/{}", path, rel);
            let dest = staging.path().join(&rel);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await;
                fetcher.fetch_to_file(&remote, &dest).await
            }));
        }
        for handle in handles {
            handle
                .await
                .map_err(|error| SparkwrapError::fail_to_transfer(anyhow!("Download task failed: {error}")))??;
        }

        let directory_name = path.rsplit('/').next().unwrap_or(path).to_owned();
        let staged = staging.path().to_path_buf();
        let bytes = task::spawn_blocking(move || pack_directory(&staged))
            .await
            .map_err(|error| SparkwrapError::fail_to_transfer(anyhow!("Archive task failed: {error}")))??;
        Ok(DirectoryArchive {
            file_name: format!("{}.tar.gz", directory_name),
            bytes,
        })
    }

    /// Unpack a gzip tar blob and upload every file it contains under
    /// `path`, preserving the relative layout. Existing files are
    /// overwritten. Returns the absolute URL of the directory.
    pub async fn upload_directory(&self, path: &str, archive: Bytes) -> Result<String> {
        let staging = TempDir::new().map_err(SparkwrapError::fail_to_transfer)?;
        let dest = staging.path().to_path_buf();
        let files = task::spawn_blocking(move || unpack_archive(&archive, &dest))
            .await
            .map_err(|error| SparkwrapError::fail_to_transfer(anyhow!("Unpack task failed: {error}")))??;

        let path = path.trim_end_matches('/');
        info!("Uploading {} files into {}", files.len(), path);
        for rel in &files {
            let rel = rel.to_str().ok_or_else(|| {
                SparkwrapError::fail_to_transfer(anyhow!("Archive holds a non UTF-8 path: {:?}", rel))
                    .with_target(ErrorTarget::new("directory", path))
            })?;
            let data = fs::read(staging.path().join(rel))
                .await
                .map_err(SparkwrapError::fail_to_transfer)?;
            self.upload_file(&format!("{}/{}", path, rel), Bytes::from(data), true)
                .await?;
        }
        Ok(self.file_url(path))
    }

    /// Walk the remote tree under `root` and return the contained file
    /// paths relative to it.
    async fn collect_files(&self, root: &str, root_entries: Vec<FileStatus>) -> Result<Vec<String>> {
        let mut files = Vec::new();
        let mut pending = vec![(String::new(), root_entries)];
        while let Some((prefix, entries)) = pending.pop() {
            for entry in entries {
                if entry.path_suffix.is_empty() {
                    return Err(SparkwrapError::fail_to_transfer(anyhow!(
                        "Path {} is not a directory.",
                        root
                    ))
                    .with_target(ErrorTarget::new("directory", root)));
                }
                let rel = if prefix.is_empty() {
                    entry.path_suffix
                } else {
                    format!("{}/{}", prefix, entry.path_suffix)
                };
                match entry.file_type {
                    FileType::File => files.push(rel),
                    FileType::Directory => {
                        let absolute = format!("{}/{}", root, rel);
                        let children = self.list_status(&absolute).await?.ok_or_else(|| {
                            SparkwrapError::fail_to_transfer(anyhow!(
                                "Directory {} vanished while it was being walked.",
                                absolute
                            ))
                            .with_target(ErrorTarget::new("directory", absolute.clone()))
                        })?;
                        pending.push((rel, children));
                    }
                }
            }
        }
        Ok(files)
    }

    async fn fetch_to_file(&self, remote: &str, dest: &Path) -> Result<()> {
        use ::futures_util::StreamExt;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(SparkwrapError::fail_to_transfer)?;
        }
        debug!("Fetching {} into {}", remote, dest.display());
        let download = self.open_file(remote).await?;
        let mut file = fs::File::create(dest).await.map_err(SparkwrapError::fail_to_transfer)?;
        let mut stream = download.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(SparkwrapError::fail_to_transfer)?;
            file.write_all(&chunk).await.map_err(SparkwrapError::fail_to_transfer)?;
        }
        file.flush().await.map_err(SparkwrapError::fail_to_transfer)?;
        Ok(())
    }
}
