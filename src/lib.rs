//! Transport-agnostic HTTP request layer with a bounded polling engine
//!
//! Requests are described once with [`Request`] and executed by a [`Client`]
//! through any [`Transport`]: the reqwest backend, the fixture-backed
//! [`OfflineTransport`], or your own. Responses can be decoded into typed
//! values, and [`Poller`] repeats a request until its response is accepted
//! or a retry budget runs out.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]

pub use body::{Body, MultipartPart};
pub use client::{Call, Client, ClientBuilder, SendOptions};
pub use decode::{DecodableRequest, Decoded, Decoder, JsonDecoder, decode};
pub use error::{BoxError, Error, Result, TransportError};
pub use multipart::{ENCODING_MEMORY_THRESHOLD, EncodedForm, FormEntry, MultipartForm};
pub use poll::{DEFAULT_MAX_RETRIES, DEFAULT_POLL_DELAY, Poller};
pub use progress::{Progress, ProgressCallback, ProgressHandler, ProgressReporter};
pub use request::{
    DownloadDestination, DownloadOptions, Header, PreparedRequest, Query, QueryEncoding, Request,
    RequestBuilder, RequestKind,
};
pub use response::{RequestInfo, Response, ResponseKind, ResponseMeta};
pub use task::TaskHandle;
#[cfg(feature = "backend-reqwest")]
#[cfg_attr(docsrs, doc(cfg(feature = "backend-reqwest")))]
pub use transport::ReqwestTransport;
pub use transport::{OfflineTransport, Transport, TransportConfig};

mod body;
mod client;
mod decode;
mod error;
mod multipart;
mod poll;
mod progress;
mod request;
mod response;
mod task;
pub mod transport;
