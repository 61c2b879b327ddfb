//! File transfers with location resolution applied up front.

use ::bytes::Bytes;
use ::sparkwrap_client::{
    archive::DirectoryArchive,
    webhdfs::{FileDownload, UploadReport, WebHdfsClient},
};
use ::sparkwrap_common::{config::GatewayConfig, error::Result, tracing::debug};

use crate::{context::RequestContext, location::FileLocation};

/// Resolves caller paths against the configured base location and drives
/// them through the file gateway.
pub struct FileOrchestrator {
    config: GatewayConfig,
}

impl FileOrchestrator {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    pub async fn upload_file(
        &self,
        ctx: &RequestContext,
        path: &str,
        data: Bytes,
        overwrite: bool,
    ) -> Result<UploadReport> {
        let location = self.locate(path);
        self.gateway(ctx)?
            .upload_file(location.resolved(), data, overwrite)
            .await
    }

    pub async fn download_file(&self, ctx: &RequestContext, path: &str) -> Result<FileDownload> {
        let location = self.locate(path);
        self.gateway(ctx)?.download_file(location.resolved()).await
    }

    pub async fn delete_file(&self, ctx: &RequestContext, path: &str) -> Result<()> {
        let location = self.locate(path);
        self.gateway(ctx)?.delete_file(location.resolved()).await
    }

    /// Unpack `archive` and upload its files under `path`. Returns the
    /// absolute URL of the directory on the gateway.
    pub async fn upload_directory(&self, ctx: &RequestContext, path: &str, archive: Bytes) -> Result<String> {
        let location = self.locate(path);
        self.gateway(ctx)?
            .upload_directory(location.resolved(), archive)
            .await
    }

    pub async fn download_directory(&self, ctx: &RequestContext, path: &str) -> Result<DirectoryArchive> {
        let location = self.locate(path);
        self.gateway(ctx)?
            .download_directory(location.resolved())
            .await
    }

    pub async fn delete_directory(&self, ctx: &RequestContext, path: &str) -> Result<()> {
        let location = self.locate(path);
        self.gateway(ctx)?
            .delete_directory(location.resolved())
            .await
    }

    fn locate(&self, path: &str) -> FileLocation {
        let location = FileLocation::resolve(path, self.config.base_hdfs_location.as_deref());
        debug!("Resolved {} to {}", location.raw(), location.resolved());
        location
    }

    fn gateway(&self, ctx: &RequestContext) -> Result<WebHdfsClient> {
        WebHdfsClient::new(self.config.web_hdfs_url.clone(), ctx.credentials.clone())
    }
}
