#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, StatusCode};
use netlayer::{
    DownloadDestination, Error, FormEntry, MultipartForm, PreparedRequest, ProgressReporter,
    Response, Result, Transport, TransportError,
};

pub const FOO_BODY: &str = r#"{"foo":"test","fooz":"tester"}"#;

#[derive(Debug, Clone, serde::Deserialize, PartialEq, Eq)]
pub struct Foo {
    pub foo: String,
    pub fooz: String,
}

/// What the mock answers with
#[derive(Debug, Clone)]
pub enum Reply {
    /// A response with this status and body, validated like a real transport
    Status(u16, Bytes),
    /// A connection failure before any response
    Fail,
    /// Neither a response nor an error
    Unknown,
    /// Never completes
    Hang,
}

impl Reply {
    pub fn ok(body: &str) -> Self {
        Reply::Status(200, Bytes::copy_from_slice(body.as_bytes()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Data,
    Download,
    Multipart,
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub mode: Mode,
    pub method: Method,
    pub url: String,
    pub entries: Vec<FormEntry>,
    pub threshold: Option<u64>,
}

#[derive(Default)]
struct State {
    calls: Vec<Recorded>,
    replies: VecDeque<Reply>,
    fallback: Option<Reply>,
}

/// Transport recording every call and answering from a script
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer with `reply` once all scripted replies are used up
    pub fn fallback(self, reply: Reply) -> Self {
        self.state.lock().unwrap().fallback = Some(reply);
        self
    }

    /// Queue `reply` for the next call
    pub fn then(self, reply: Reply) -> Self {
        self.state.lock().unwrap().replies.push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    fn record(
        &self,
        mode: Mode,
        request: &PreparedRequest,
        form: Option<&MultipartForm>,
        threshold: Option<u64>,
    ) -> Reply {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Recorded {
            mode,
            method: request.method().clone(),
            url: request.url().to_string(),
            entries: form.map(|f| f.entries().to_vec()).unwrap_or_default(),
            threshold,
        });
        state
            .replies
            .pop_front()
            .or_else(|| state.fallback.clone())
            .unwrap_or_else(|| Reply::ok(FOO_BODY))
    }

    async fn answer(
        reply: Reply,
        request: &PreparedRequest,
        progress: &ProgressReporter,
        download: Option<Option<&DownloadDestination>>,
    ) -> Result<Response> {
        match reply {
            Reply::Status(status, body) => {
                let len = body.len() as u64;
                progress.report(len / 2, Some(len));
                progress.report(len, Some(len));

                let status = StatusCode::from_u16(status).unwrap();
                let envelope = match download {
                    Some(destination) => Response::download(
                        status,
                        destination.map(|d| d.path.clone()),
                    ),
                    None => Response::data(status, body),
                };
                request.validate(envelope.with_request(request.info()))
            }
            Reply::Fail => Err(Error::Response {
                source: TransportError::Network {
                    code: -1009,
                    message: "The Internet connection appears to be offline.".to_string(),
                },
                response: None,
            }),
            Reply::Unknown => Err(Error::Unknown),
            Reply::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn data(&self, request: &PreparedRequest, progress: &ProgressReporter) -> Result<Response> {
        let reply = self.record(Mode::Data, request, None, None);
        Self::answer(reply, request, progress, None).await
    }

    async fn download(
        &self,
        request: &PreparedRequest,
        destination: Option<&DownloadDestination>,
        progress: &ProgressReporter,
    ) -> Result<Response> {
        let reply = self.record(Mode::Download, request, None, None);
        Self::answer(reply, request, progress, Some(destination)).await
    }

    async fn upload_multipart(
        &self,
        request: &PreparedRequest,
        form: &MultipartForm,
        threshold: u64,
        progress: &ProgressReporter,
    ) -> Result<Response> {
        let reply = self.record(Mode::Multipart, request, Some(form), Some(threshold));
        Self::answer(reply, request, progress, None).await
    }
}
