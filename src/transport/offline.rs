//! Offline transport serving responses from fixture files

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use tokio::io::AsyncWriteExt;

use super::{Transport, persist_download, staging_file};
use crate::multipart::MultipartForm;
use crate::progress::ProgressReporter;
use crate::request::{DownloadDestination, PreparedRequest};
use crate::response::Response;
use crate::{Error, Result};

const MISSING_FIXTURE: &str = "missing test data";

/// Answers every request with the contents of its fixture file
///
/// Responses carry status 200 and no request or transport metadata. A
/// request without a readable fixture fails with a bad request error.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineTransport;

impl OfflineTransport {
    /// Create a new offline transport
    pub fn new() -> Self {
        Self
    }

    async fn fixture(request: &PreparedRequest) -> Result<Bytes> {
        let path = request
            .request()
            .fixture()
            .ok_or_else(|| Error::bad_request(MISSING_FIXTURE))?;
        read_fixture(path).await
    }
}

async fn read_fixture(path: &Path) -> Result<Bytes> {
    match tokio::fs::read(path).await {
        Ok(content) => Ok(Bytes::from(content)),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "fixture unreadable");
            Err(Error::bad_request(MISSING_FIXTURE))
        }
    }
}

#[async_trait]
impl Transport for OfflineTransport {
    async fn data(
        &self,
        request: &PreparedRequest,
        progress: &ProgressReporter,
    ) -> Result<Response> {
        let content = Self::fixture(request).await?;
        let len = content.len() as u64;
        progress.report(len, Some(len));
        Ok(Response::data(StatusCode::OK, content))
    }

    async fn download(
        &self,
        request: &PreparedRequest,
        destination: Option<&DownloadDestination>,
        progress: &ProgressReporter,
    ) -> Result<Response> {
        let content = Self::fixture(request).await?;

        let staged = staging_file(destination).map_err(Error::transport)?;
        let std_file = staged.as_file().try_clone().map_err(Error::transport)?;
        let mut file = tokio::fs::File::from_std(std_file);
        file.write_all(&content).await.map_err(Error::transport)?;
        file.flush().await.map_err(Error::transport)?;
        drop(file);

        let path = persist_download(staged, destination).map_err(Error::transport)?;

        let len = content.len() as u64;
        progress.report(len, Some(len));
        Ok(Response::download(StatusCode::OK, Some(path)))
    }

    async fn upload_multipart(
        &self,
        request: &PreparedRequest,
        form: &MultipartForm,
        _threshold: u64,
        progress: &ProgressReporter,
    ) -> Result<Response> {
        let content = Self::fixture(request).await?;
        let len = form.content_length();
        progress.report(len, Some(len));
        Ok(Response::data(StatusCode::OK, content))
    }
}
