//! Transport abstraction for executing requests

pub mod offline;
#[cfg(feature = "backend-reqwest")]
pub mod reqwest;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::NamedTempFile;

use crate::Result;
use crate::multipart::MultipartForm;
use crate::progress::ProgressReporter;
use crate::request::{DownloadDestination, PreparedRequest};
use crate::response::Response;

pub use offline::OfflineTransport;
#[cfg(feature = "backend-reqwest")]
pub use self::reqwest::ReqwestTransport;

/// Configuration for transport creation
#[derive(Clone, Debug, Default)]
pub struct TransportConfig {
    /// Request timeout
    pub timeout: Option<Duration>,
    /// Connection timeout
    pub connect_timeout: Option<Duration>,
    /// User agent string
    pub user_agent: Option<String>,
    /// Default headers to add to all requests
    pub default_headers: Option<http::HeaderMap>,
}

/// Executes prepared requests against the network or a stand-in
///
/// Implementations report progress through the supplied reporter, stop
/// early once it reports cancellation, and run status validation through
/// [`PreparedRequest::validate`] before returning a response.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Execute a request and buffer the response body
    async fn data(&self, request: &PreparedRequest, progress: &ProgressReporter)
    -> Result<Response>;

    /// Execute a request and stream the response body to disk
    async fn download(
        &self,
        request: &PreparedRequest,
        destination: Option<&DownloadDestination>,
        progress: &ProgressReporter,
    ) -> Result<Response>;

    /// Upload `form` as a multipart body
    ///
    /// Forms of `threshold` bytes or more are encoded to a temporary file
    /// rather than held in memory.
    async fn upload_multipart(
        &self,
        request: &PreparedRequest,
        form: &MultipartForm,
        threshold: u64,
        progress: &ProgressReporter,
    ) -> Result<Response>;
}

/// Create a temporary file next to where `destination` will end up
pub(crate) fn staging_file(destination: Option<&DownloadDestination>) -> io::Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(".netlayer-download-");

    let Some(destination) = destination else {
        return builder.tempfile();
    };

    match destination.path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            if destination.options.create_intermediate_directories {
                std::fs::create_dir_all(parent)?;
            }
            builder.tempfile_in(parent)
        }
        _ => builder.tempfile_in("."),
    }
}

/// Move a finished download into place
///
/// Without a destination the temporary file is kept and its path returned.
pub(crate) fn persist_download(
    staged: NamedTempFile,
    destination: Option<&DownloadDestination>,
) -> io::Result<PathBuf> {
    let Some(destination) = destination else {
        let (_, path) = staged.keep().map_err(|e| e.error)?;
        return Ok(path);
    };

    let target = destination.path.clone();
    if destination.options.remove_previous_file {
        match std::fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }

    staged.persist_noclobber(&target).map_err(|e| e.error)?;
    Ok(target)
}
