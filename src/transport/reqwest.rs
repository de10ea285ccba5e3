//! Reqwest transport for real network traffic

use std::io;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, Stream, StreamExt};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderValue};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use super::{Transport, TransportConfig, persist_download, staging_file};
use crate::error::TransportError;
use crate::multipart::{EncodedForm, MultipartForm};
use crate::progress::ProgressReporter;
use crate::request::{DownloadDestination, PreparedRequest};
use crate::response::{Response, ResponseMeta};
use crate::{Error, Result};

const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

type ChunkStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + Sync>>;

/// Transport backed by a shared `reqwest::Client`
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a new reqwest transport
    pub fn new() -> Result<Self> {
        Self::with_config(TransportConfig::default())
    }

    /// Create a new reqwest transport with configuration
    pub fn with_config(config: TransportConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        if let Some(connect_timeout) = config.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }

        if let Some(user_agent) = config.user_agent {
            builder = builder.user_agent(user_agent);
        }

        if let Some(default_headers) = config.default_headers {
            builder = builder.default_headers(default_headers);
        }

        let client = builder.build().map_err(|e| {
            Error::transport(TransportError::Internal(format!(
                "Failed to create reqwest client: {}",
                e
            )))
        })?;

        Ok(Self { client })
    }

    /// Get the underlying reqwest client
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    fn builder(&self, request: &PreparedRequest) -> reqwest::RequestBuilder {
        self.client
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone())
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = builder.send().await.map_err(Error::transport)?;
        tracing::trace!(status = %response.status(), url = %response.url(), "response headers received");
        Ok(response)
    }

    /// Buffer the body of `response`, reporting download progress if asked
    async fn collect(
        request: &PreparedRequest,
        response: reqwest::Response,
        progress: Option<&ProgressReporter>,
    ) -> Result<Response> {
        let status = response.status();
        let meta = meta_of(&response);
        let total = response.content_length();

        let mut body = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            if progress.is_some_and(ProgressReporter::is_cancelled) {
                return Err(Error::cancelled());
            }
            match chunk {
                Ok(chunk) => {
                    body.extend_from_slice(&chunk);
                    if let Some(progress) = progress {
                        progress.report(body.len() as u64, total);
                    }
                }
                Err(e) => {
                    let partial = Response::data(status, body.freeze())
                        .with_request(request.info())
                        .with_meta(meta);
                    return Err(Error::with_response(e, partial));
                }
            }
        }

        let envelope = Response::data(status, body.freeze())
            .with_request(request.info())
            .with_meta(meta);
        request.validate(envelope)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn data(
        &self,
        request: &PreparedRequest,
        progress: &ProgressReporter,
    ) -> Result<Response> {
        let mut builder = self.builder(request);
        if let Some(body) = request.body() {
            builder = builder.body(body.to_bytes()?);
        }

        let response = self.send(builder).await?;
        Self::collect(request, response, Some(progress)).await
    }

    async fn download(
        &self,
        request: &PreparedRequest,
        destination: Option<&DownloadDestination>,
        progress: &ProgressReporter,
    ) -> Result<Response> {
        let mut builder = self.builder(request);
        if let Some(body) = request.body() {
            builder = builder.body(body.to_bytes()?);
        }

        let response = self.send(builder).await?;
        let status = response.status();
        let meta = meta_of(&response);
        let total = response.content_length();

        // Nothing touches the destination unless the status is acceptable
        request.validate(
            Response::download(status, None)
                .with_request(request.info())
                .with_meta(meta.clone()),
        )?;

        let staged = staging_file(destination).map_err(Error::transport)?;
        let std_file = staged.as_file().try_clone().map_err(Error::transport)?;
        let mut file = tokio::fs::File::from_std(std_file);

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        loop {
            let chunk = tokio::select! {
                biased;
                _ = progress.cancelled() => {
                    tracing::debug!(bytes = written, "download cancelled, discarding staged file");
                    return Err(Error::cancelled());
                }
                chunk = stream.next() => chunk,
            };
            let chunk = match chunk {
                None => break,
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    let partial = Response::download(status, None)
                        .with_request(request.info())
                        .with_meta(meta);
                    return Err(Error::with_response(e, partial));
                }
            };
            file.write_all(&chunk).await.map_err(Error::transport)?;
            written += chunk.len() as u64;
            progress.report(written, total);
        }
        file.flush().await.map_err(Error::transport)?;
        drop(file);

        let path = persist_download(staged, destination).map_err(Error::transport)?;
        tracing::debug!(bytes = written, path = %path.display(), "download stored");

        Ok(Response::download(status, Some(path))
            .with_request(request.info())
            .with_meta(meta))
    }

    async fn upload_multipart(
        &self,
        request: &PreparedRequest,
        form: &MultipartForm,
        threshold: u64,
        progress: &ProgressReporter,
    ) -> Result<Response> {
        let encoded = form
            .encode_with_threshold(threshold)
            .await
            .map_err(Error::transport)?;
        let len = encoded.len();

        let chunks: ChunkStream = match &encoded {
            EncodedForm::InMemory(bytes) => {
                let chunks = (0..bytes.len())
                    .step_by(UPLOAD_CHUNK_SIZE)
                    .map(|start| {
                        Ok::<_, io::Error>(
                            bytes.slice(start..(start + UPLOAD_CHUNK_SIZE).min(bytes.len())),
                        )
                    })
                    .collect::<Vec<_>>();
                Box::pin(stream::iter(chunks))
            }
            EncodedForm::OnDisk { file, .. } => {
                let reopened = file.reopen().map_err(Error::transport)?;
                Box::pin(ReaderStream::with_capacity(
                    tokio::fs::File::from_std(reopened),
                    UPLOAD_CHUNK_SIZE,
                ))
            }
        };

        let reporter = progress.clone();
        let mut sent = 0u64;
        let counted = chunks.map(move |chunk| {
            if let Ok(chunk) = &chunk {
                sent += chunk.len() as u64;
                reporter.report(sent, Some(len));
            }
            chunk
        });

        let content_type = HeaderValue::from_str(&form.content_type()).map_err(|e| {
            Error::bad_request(format!("Invalid multipart boundary: {}", e))
        })?;
        let builder = self
            .builder(request)
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, len)
            .body(reqwest::Body::wrap_stream(counted));

        let response = self.send(builder).await?;
        // Keep any spilled form on disk until the upload finished
        drop(encoded);
        Self::collect(request, response, None).await
    }
}

fn meta_of(response: &reqwest::Response) -> ResponseMeta {
    ResponseMeta {
        url: response.url().clone(),
        version: response.version(),
        headers: response.headers().clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn cancelled_download_stops_before_writing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 1024]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.bin");
        let destination = DownloadDestination::new(&target);
        let prepared = Request::get(server.uri()).build().prepare().unwrap();
        let token = CancellationToken::new();
        let progress = ProgressReporter::new(None, token.clone());
        token.cancel();

        let error = ReqwestTransport::new()
            .unwrap()
            .download(&prepared, Some(&destination), &progress)
            .await
            .unwrap_err();

        assert!(error.is_cancelled());
        assert!(!target.exists());
    }
}
