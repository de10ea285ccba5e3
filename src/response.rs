//! Response handling

use std::path::{Path, PathBuf};

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode, Version};
use url::Url;

use crate::{Error, Result};

/// The outbound request a response answers
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// HTTP method
    pub method: Method,
    /// Resolved URL
    pub url: Url,
    /// Headers that were sent
    pub headers: HeaderMap,
}

/// Transport-level metadata of a received response
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    /// Final URL after redirects
    pub url: Url,
    /// HTTP version
    pub version: Version,
    /// Response headers
    pub headers: HeaderMap,
}

/// Whether a response holds its body or points at a downloaded file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseKind {
    /// Body is held in memory
    Data,
    /// Body was written to disk
    Download {
        /// Where the file ended up
        destination: Option<PathBuf>,
    },
}

/// Normalised result of executing a request
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    body: Bytes,
    request: Option<RequestInfo>,
    meta: Option<ResponseMeta>,
    kind: ResponseKind,
}

impl Response {
    /// Create a plain response
    pub fn data(status: StatusCode, body: Bytes) -> Self {
        Self {
            status,
            body,
            request: None,
            meta: None,
            kind: ResponseKind::Data,
        }
    }

    /// Create a download response; the body is always empty
    pub fn download(status: StatusCode, destination: Option<PathBuf>) -> Self {
        Self {
            status,
            body: Bytes::new(),
            request: None,
            meta: None,
            kind: ResponseKind::Download { destination },
        }
    }

    /// Attach the originating request
    pub fn with_request(mut self, request: RequestInfo) -> Self {
        self.request = Some(request);
        self
    }

    /// Attach transport metadata
    pub fn with_meta(mut self, meta: ResponseMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Get the response status code
    pub fn status(&self) -> u16 {
        self.status.as_u16()
    }

    /// Get the response status as [`StatusCode`]
    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    /// Check if the response status indicates success (2xx)
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Raw body bytes
    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Body as UTF-8 text
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec()).map_err(|e| Error::Decode {
            source: Box::new(e),
            response: Box::new(self.clone()),
        })
    }

    /// The originating request, when the transport recorded one
    pub fn request(&self) -> Option<&RequestInfo> {
        self.request.as_ref()
    }

    /// Transport metadata, when available
    pub fn meta(&self) -> Option<&ResponseMeta> {
        self.meta.as_ref()
    }

    /// Get all headers
    pub fn headers(&self) -> Option<&HeaderMap> {
        self.meta.as_ref().map(|meta| &meta.headers)
    }

    /// Get a header value
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers()?.get(name)?.to_str().ok()
    }

    /// Plain or download
    pub fn kind(&self) -> &ResponseKind {
        &self.kind
    }

    /// Whether this is a download response
    pub fn is_download(&self) -> bool {
        matches!(self.kind, ResponseKind::Download { .. })
    }

    /// Location of the downloaded file
    pub fn destination(&self) -> Option<&Path> {
        match &self.kind {
            ResponseKind::Download { destination } => destination.as_deref(),
            ResponseKind::Data => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_has_empty_body_and_destination() {
        let response = Response::download(StatusCode::OK, Some(PathBuf::from("temp")));

        assert!(response.is_download());
        assert!(response.bytes().is_empty());
        assert_eq!(response.destination(), Some(Path::new("temp")));
    }

    #[test]
    fn header_lookup_goes_through_meta() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        let response = Response::data(StatusCode::OK, Bytes::from_static(b"{}")).with_meta(
            ResponseMeta {
                url: Url::parse("https://example.com").unwrap(),
                version: Version::HTTP_11,
                headers,
            },
        );

        assert_eq!(response.header("content-type"), Some("application/json"));
        assert!(Response::data(StatusCode::OK, Bytes::new()).header("content-type").is_none());
    }

    #[test]
    fn text_failure_is_a_decode_error() {
        let response = Response::data(StatusCode::OK, Bytes::from_static(&[0xff, 0xfe]));
        assert!(response.text().unwrap_err().is_decode());
    }
}
