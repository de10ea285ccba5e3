//! Client facade dispatching requests to a transport

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::future::{self, BoxFuture};
use http::{HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use tokio::runtime::Handle;

use crate::decode::{self, DecodableRequest, Decoded, Decoder, JsonDecoder};
use crate::error::TransportError;
use crate::multipart::{ENCODING_MEMORY_THRESHOLD, MultipartForm};
use crate::progress::{ProgressHandler, ProgressReporter};
use crate::request::{PreparedRequest, Request, RequestKind};
use crate::response::Response;
use crate::task::{TaskHandle, TaskRegistry};
use crate::transport::{OfflineTransport, Transport, TransportConfig};
use crate::{Error, Result};

/// Per-call options
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    progress: Option<ProgressHandler>,
    callback_runtime: Option<Handle>,
}

impl SendOptions {
    /// Create empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive progress events for this call
    pub fn progress(mut self, handler: ProgressHandler) -> Self {
        self.progress = Some(handler);
        self
    }

    /// Run completions and progress callbacks on `runtime`
    pub fn callback_runtime(mut self, runtime: Handle) -> Self {
        self.callback_runtime = Some(runtime);
        self
    }
}

/// An in-flight call, resolved by awaiting it
///
/// Dropping a `Call` abandons the operation.
pub struct Call {
    handle: Option<TaskHandle>,
    future: BoxFuture<'static, Result<Response>>,
}

impl Call {
    /// Cancellation handle, absent when the request was rejected before dispatch
    pub fn handle(&self) -> Option<&TaskHandle> {
        self.handle.as_ref()
    }
}

impl Future for Call {
    type Output = Result<Response>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.future.as_mut().poll(cx)
    }
}

impl fmt::Debug for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Facade for sending requests through a transport
///
/// Clones share the transport and the set of outstanding operations.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    registry: TaskRegistry,
    encoding_memory_threshold: u64,
    runtime: Option<Handle>,
}

impl Client {
    /// Create a new client using the reqwest transport
    #[cfg(feature = "backend-reqwest")]
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Create a client answering from fixture files
    pub fn offline() -> Self {
        Self::with_transport(OfflineTransport)
    }

    /// Create a client around `transport` with default settings
    pub fn with_transport(transport: impl Transport) -> Self {
        Self {
            transport: Arc::new(transport),
            registry: TaskRegistry::default(),
            encoding_memory_threshold: ENCODING_MEMORY_THRESHOLD,
            runtime: None,
        }
    }

    /// Create a client builder
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Size above which multipart forms are encoded to disk
    pub fn encoding_memory_threshold(&self) -> u64 {
        self.encoding_memory_threshold
    }

    /// Start a call, returning its cancellation handle alongside the future
    ///
    /// Nothing is sent until the returned [`Call`] is polled. A descriptor
    /// that fails validation yields a call with no handle that resolves to
    /// [`Error::BadRequest`] without touching the transport.
    pub fn call(&self, request: &Request, options: SendOptions) -> Call {
        let prepared = match request.prepare() {
            Ok(prepared) => prepared,
            Err(error) => {
                tracing::debug!(error = %error, "request rejected before dispatch");
                return Call {
                    handle: None,
                    future: Box::pin(future::ready(Err(error))),
                };
            }
        };

        let (handle, guard) = self.registry.register();
        let token = handle.token().clone();
        let id = handle.id();
        tracing::trace!(id, "task registered");

        let default_runtime = options.callback_runtime.or_else(|| self.runtime.clone());
        let handler = options
            .progress
            .map(|handler| handler.or_on(default_runtime));
        let reporter = ProgressReporter::new(handler, token.clone());

        let transport = self.transport.clone();
        let threshold = self.encoding_memory_threshold;
        let future = async move {
            let _guard = guard;
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::debug!(id, "request cancelled");
                    Err(Error::cancelled())
                }
                result = dispatch(transport.as_ref(), &prepared, threshold, &reporter) => result,
            }
        };

        Call {
            handle: Some(handle),
            future: Box::pin(future),
        }
    }

    /// Send a request and wait for its envelope
    pub async fn send(&self, request: &Request) -> Result<Response> {
        self.call(request, SendOptions::default()).await
    }

    /// Send a request and hand the outcome to `completion`
    ///
    /// The call and its completion run on the callback runtime from
    /// `options`, the client default, or the current runtime, in that order.
    /// `completion` is invoked exactly once.
    pub fn send_with<F>(
        &self,
        request: &Request,
        options: SendOptions,
        completion: F,
    ) -> Option<TaskHandle>
    where
        F: FnOnce(Result<Response>) + Send + 'static,
    {
        let runtime = match self.callback_runtime(&options) {
            Ok(runtime) => runtime,
            Err(error) => {
                completion(Err(error));
                return None;
            }
        };

        let call = self.call(request, options);
        let handle = call.handle().cloned();
        runtime.spawn(async move { completion(call.await) });
        handle
    }

    /// Send a request and decode its body as JSON
    pub async fn send_decoded<T>(&self, request: &Request) -> Result<Decoded<T>>
    where
        T: DeserializeOwned,
    {
        self.send_decoded_using(request, &JsonDecoder).await
    }

    /// Send a request and decode its body with `decoder`
    pub async fn send_decoded_using<T, D>(&self, request: &Request, decoder: &D) -> Result<Decoded<T>>
    where
        T: DeserializeOwned,
        D: Decoder,
    {
        let response = self.send(request).await?;
        decode::decode(response, decoder)
    }

    /// Callback flavour of [`Client::send_decoded_using`]
    pub fn send_decoded_with<T, D, F>(
        &self,
        request: &Request,
        decoder: D,
        options: SendOptions,
        completion: F,
    ) -> Option<TaskHandle>
    where
        T: DeserializeOwned + Send + 'static,
        D: Decoder + 'static,
        F: FnOnce(Result<Decoded<T>>) + Send + 'static,
    {
        self.send_with(request, options, move |result| {
            completion(result.and_then(|response| decode::decode(response, &decoder)))
        })
    }

    /// Send a typed request and decode its declared output
    pub async fn fetch<R>(&self, request: &R) -> Result<Decoded<R::Output>>
    where
        R: DecodableRequest,
    {
        self.send_decoded(&request.request()).await
    }

    /// Cancel every outstanding operation issued through this client
    ///
    /// Returns the number of operations that were cancelled.
    pub fn cancel_all(&self) -> usize {
        let cancelled = self.registry.cancel_all();
        tracing::debug!(cancelled, "cancelled all outstanding requests");
        cancelled
    }

    /// Number of operations still in flight
    pub fn outstanding(&self) -> usize {
        self.registry.outstanding()
    }

    fn callback_runtime(&self, options: &SendOptions) -> Result<Handle> {
        if let Some(runtime) = options.callback_runtime.clone().or_else(|| self.runtime.clone()) {
            return Ok(runtime);
        }
        Handle::try_current().map_err(|e| {
            Error::transport(TransportError::Internal(format!(
                "No runtime to deliver completion on: {}",
                e
            )))
        })
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("encoding_memory_threshold", &self.encoding_memory_threshold)
            .field("outstanding", &self.outstanding())
            .finish_non_exhaustive()
    }
}

async fn dispatch(
    transport: &dyn Transport,
    request: &PreparedRequest,
    threshold: u64,
    progress: &ProgressReporter,
) -> Result<Response> {
    let kind = request.request().kind();
    tracing::debug!(
        method = %request.method(),
        url = %request.url(),
        mode = mode_name(kind),
        "dispatching request"
    );

    let result = match kind {
        RequestKind::Data => transport.data(request, progress).await,
        RequestKind::Download(destination) => {
            transport
                .download(request, destination.as_ref(), progress)
                .await
        }
        RequestKind::UploadMultipart(parts) => {
            let form = MultipartForm::from_parts(parts);
            transport
                .upload_multipart(request, &form, threshold, progress)
                .await
        }
    };

    match &result {
        Ok(response) => tracing::debug!(status = response.status(), "request completed"),
        Err(Error::Unknown) => {
            tracing::error!(url = %request.url(), "transport returned neither a response nor an error")
        }
        Err(error) => tracing::debug!(error = %error, "request failed"),
    }
    result
}

fn mode_name(kind: &RequestKind) -> &'static str {
    match kind {
        RequestKind::Data => "data",
        RequestKind::Download(_) => "download",
        RequestKind::UploadMultipart(_) => "multipart",
    }
}

/// Builder for creating clients
pub struct ClientBuilder {
    transport: Option<Arc<dyn Transport>>,
    config: TransportConfig,
    headers: Vec<(String, String)>,
    encoding_memory_threshold: u64,
    runtime: Option<Handle>,
}

impl ClientBuilder {
    /// Create a new client builder
    pub fn new() -> Self {
        Self {
            transport: None,
            config: TransportConfig::default(),
            headers: Vec::new(),
            encoding_memory_threshold: ENCODING_MEMORY_THRESHOLD,
            runtime: None,
        }
    }

    /// Use `transport` instead of the default network transport
    ///
    /// Transport settings on this builder are ignored when a transport is
    /// injected.
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Replace the transport configuration
    pub fn config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }

    /// Set request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Set connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Set user agent
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    /// Add a default header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the size above which multipart forms are encoded to disk
    pub fn encoding_memory_threshold(mut self, threshold: u64) -> Self {
        self.encoding_memory_threshold = threshold;
        self
    }

    /// Default runtime for completions and progress callbacks
    pub fn callback_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Build the client
    pub fn build(mut self) -> Result<Client> {
        if !self.headers.is_empty() {
            let mut default_headers = self.config.default_headers.take().unwrap_or_default();
            for (name, value) in &self.headers {
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| Error::bad_request(format!("Invalid header name: {}", e)))?;
                let value = HeaderValue::from_str(value)
                    .map_err(|e| Error::bad_request(format!("Invalid header value: {}", e)))?;
                default_headers.append(name, value);
            }
            self.config.default_headers = Some(default_headers);
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport(self.config)?,
        };

        Ok(Client {
            transport,
            registry: TaskRegistry::default(),
            encoding_memory_threshold: self.encoding_memory_threshold,
            runtime: self.runtime,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "backend-reqwest")]
fn default_transport(config: TransportConfig) -> Result<Arc<dyn Transport>> {
    Ok(Arc::new(crate::transport::ReqwestTransport::with_config(config)?))
}

#[cfg(not(feature = "backend-reqwest"))]
fn default_transport(_config: TransportConfig) -> Result<Arc<dyn Transport>> {
    Err(Error::transport(TransportError::Internal(
        "No transport configured and the reqwest backend is disabled".to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_rejects_invalid_default_header() {
        let error = Client::builder()
            .transport(OfflineTransport)
            .header("bad header", "value")
            .build()
            .unwrap_err();
        assert!(error.is_bad_request());
    }

    #[test]
    fn builder_keeps_threshold() {
        let client = Client::builder()
            .transport(OfflineTransport)
            .encoding_memory_threshold(1024)
            .build()
            .unwrap();
        assert_eq!(client.encoding_memory_threshold(), 1024);
        assert_eq!(Client::offline().encoding_memory_threshold(), ENCODING_MEMORY_THRESHOLD);
    }

    #[tokio::test]
    async fn invalid_request_has_no_handle() {
        let client = Client::offline();
        let call = client.call(&Request::get("").build(), SendOptions::default());

        assert!(call.handle().is_none());
        assert!(call.await.unwrap_err().is_bad_request());
        assert_eq!(client.outstanding(), 0);
    }

    #[tokio::test]
    async fn finished_call_leaves_registry() {
        let client = Client::offline();
        let call = client.call(&Request::get("https://example.com").build(), SendOptions::default());

        assert_eq!(client.outstanding(), 1);
        let _ = call.await;
        assert_eq!(client.outstanding(), 0);
    }
}
