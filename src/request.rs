//! Request descriptors and builders

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use url::Url;

use crate::body::{Body, MultipartPart};
use crate::error::TransportError;
use crate::response::{RequestInfo, Response};
use crate::{Error, Result};

/// A single request header
///
/// Headers keep their insertion order and the same name may appear more than once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Header name
    pub name: String,
    /// Header value
    pub value: String,
}

impl Header {
    /// Create a header
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl<K: Into<String>, V: Into<String>> From<(K, V)> for Header {
    fn from((name, value): (K, V)) -> Self {
        Self::new(name, value)
    }
}

/// How query parameter names and values are percent-encoded
#[derive(Clone, Default)]
pub enum QueryEncoding {
    /// Encode everything outside the RFC 3986 unreserved set
    #[default]
    Standard,
    /// Caller-supplied encoder, applied to each name and value
    Custom(Arc<dyn Fn(&str) -> String + Send + Sync>),
}

impl QueryEncoding {
    /// Create a custom encoding policy
    pub fn custom<F>(encode: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(encode))
    }

    fn apply(&self, input: &str) -> String {
        match self {
            QueryEncoding::Standard => urlencoding::encode(input).into_owned(),
            QueryEncoding::Custom(encode) => encode(input),
        }
    }
}

impl fmt::Debug for QueryEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryEncoding::Standard => f.write_str("Standard"),
            QueryEncoding::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Ordered query parameters plus their encoding policy
#[derive(Debug, Clone, Default)]
pub struct Query {
    parameters: Vec<(String, String)>,
    encoding: QueryEncoding,
}

impl Query {
    /// Create a query from name/value pairs
    pub fn new<K, V>(parameters: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            parameters: parameters
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            encoding: QueryEncoding::Standard,
        }
    }

    /// Replace the encoding policy
    pub fn with_encoding(mut self, encoding: QueryEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// The raw parameters in insertion order
    pub fn parameters(&self) -> &[(String, String)] {
        &self.parameters
    }

    /// Whether there are no parameters
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Render the query string, without the leading `?`
    pub fn encode(&self) -> String {
        self.parameters
            .iter()
            .map(|(k, v)| format!("{}={}", self.encoding.apply(k), self.encoding.apply(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Options applied when moving a finished download into place
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Create missing parent directories of the destination
    pub create_intermediate_directories: bool,
    /// Replace a file already present at the destination
    pub remove_previous_file: bool,
}

/// Where a download should be stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadDestination {
    /// Destination file path
    pub path: PathBuf,
    /// Placement options
    pub options: DownloadOptions,
}

impl DownloadDestination {
    /// Create a destination with no options set
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            options: DownloadOptions::default(),
        }
    }

    /// Create missing parent directories
    pub fn create_intermediate_directories(mut self) -> Self {
        self.options.create_intermediate_directories = true;
        self
    }

    /// Overwrite an existing file at the destination
    pub fn remove_previous_file(mut self) -> Self {
        self.options.remove_previous_file = true;
        self
    }
}

/// What the transport should do with a request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RequestKind {
    /// Plain request, body returned in memory
    #[default]
    Data,
    /// Stream the body to disk; `None` uses a temporary file
    Download(Option<DownloadDestination>),
    /// Multipart form upload of the given parts, in order
    UploadMultipart(Vec<MultipartPart>),
}

/// An immutable description of an HTTP call
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    base_url: String,
    path: String,
    headers: Vec<Header>,
    query: Option<Query>,
    body: Option<Body>,
    kind: RequestKind,
    acceptable_status_codes: BTreeSet<u16>,
    acceptable_empty_response_codes: BTreeSet<u16>,
    fixture: Option<PathBuf>,
}

impl Request {
    /// Start building a request
    pub fn builder(method: Method, base_url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(method, base_url)
    }

    /// Create a GET request
    pub fn get(base_url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Method::GET, base_url)
    }

    /// Create a POST request
    pub fn post(base_url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Method::POST, base_url)
    }

    /// Create a PUT request
    pub fn put(base_url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Method::PUT, base_url)
    }

    /// Create a DELETE request
    pub fn delete(base_url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Method::DELETE, base_url)
    }

    /// Create a PATCH request
    pub fn patch(base_url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Method::PATCH, base_url)
    }

    /// Create a HEAD request
    pub fn head(base_url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Method::HEAD, base_url)
    }

    /// HTTP method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Base URL as given
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Path appended to the base URL
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Headers in insertion order
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// Query parameters
    pub fn query(&self) -> Option<&Query> {
        self.query.as_ref()
    }

    /// Request body
    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Request mode
    pub fn kind(&self) -> &RequestKind {
        &self.kind
    }

    /// Local file served by the offline transport
    pub fn fixture(&self) -> Option<&Path> {
        self.fixture.as_deref()
    }

    /// Whether `status` counts as success
    pub fn accepts_status(&self, status: u16) -> bool {
        self.acceptable_status_codes.contains(&status)
    }

    /// Whether an empty body is acceptable for `status`
    pub fn accepts_empty_body(&self, status: u16) -> bool {
        self.acceptable_empty_response_codes.contains(&status)
    }

    /// Resolve the target URL, including path and query
    ///
    /// The path is appended to the base URL's own path. Any query or
    /// fragment already on the base URL is kept.
    pub fn url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            Error::bad_request(format!("Bad URL Request: {:?} ({})", self.base_url, e))
        })?;

        if !url.has_host() {
            return Err(Error::bad_request(format!(
                "Bad URL Request: {:?} has no host",
                self.base_url
            )));
        }

        if !self.path.is_empty() {
            let joined = format!(
                "{}/{}",
                url.path().trim_end_matches('/'),
                self.path.trim_start_matches('/')
            );
            url.set_path(&joined);
        }

        if let Some(query) = self.query.as_ref().filter(|q| !q.is_empty()) {
            let encoded = query.encode();
            let full = match url.query() {
                Some(existing) if !existing.is_empty() => format!("{}&{}", existing, encoded),
                _ => encoded,
            };
            url.set_query(Some(&full));
        }

        Ok(url)
    }

    /// Validate the descriptor and resolve everything a transport needs
    pub fn prepare(&self) -> Result<PreparedRequest> {
        let url = self.url()?;

        let mut headers = HeaderMap::new();
        for header in &self.headers {
            let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(|e| {
                Error::bad_request(format!("Invalid header name {:?}: {}", header.name, e))
            })?;
            let value = HeaderValue::from_str(&header.value).map_err(|e| {
                Error::bad_request(format!("Invalid value for header {:?}: {}", header.name, e))
            })?;
            headers.append(name, value);
        }

        if let Some(content_type) = self.body.as_ref().and_then(Body::content_type) {
            if !headers.contains_key(CONTENT_TYPE) {
                let value = HeaderValue::from_str(content_type).map_err(|e| {
                    Error::bad_request(format!("Invalid content type {:?}: {}", content_type, e))
                })?;
                headers.insert(CONTENT_TYPE, value);
            }
        }

        Ok(PreparedRequest {
            url,
            headers,
            request: self.clone(),
        })
    }
}

/// Request builder
#[derive(Debug)]
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    /// Create a builder for `method` against `base_url`
    pub fn new(method: Method, base_url: impl Into<String>) -> Self {
        Self {
            request: Request {
                method,
                base_url: base_url.into(),
                path: String::new(),
                headers: Vec::new(),
                query: None,
                body: None,
                kind: RequestKind::Data,
                acceptable_status_codes: (200..300).collect(),
                acceptable_empty_response_codes: [204, 205].into_iter().collect(),
                fixture: None,
            },
        }
    }

    /// Set the path appended to the base URL
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.request.path = path.into();
        self
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.push(Header::new(name, value));
        self
    }

    /// Add several headers, keeping their order
    pub fn headers<H: Into<Header>>(mut self, headers: impl IntoIterator<Item = H>) -> Self {
        self.request
            .headers
            .extend(headers.into_iter().map(Into::into));
        self
    }

    /// Add a query parameter
    pub fn query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request
            .query
            .get_or_insert_with(Query::default)
            .parameters
            .push((name.into(), value.into()));
        self
    }

    /// Replace the query
    pub fn query(mut self, query: Query) -> Self {
        self.request.query = Some(query);
        self
    }

    /// Set the request body
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.request.body = Some(body.into());
        self
    }

    /// Set a JSON body
    pub fn json(mut self, value: impl serde::Serialize) -> Result<Self> {
        self.request.body = Some(Body::json(value)?);
        Ok(self)
    }

    /// Set a text body
    pub fn text(mut self, content: impl Into<String>) -> Self {
        self.request.body = Some(Body::text(content));
        self
    }

    /// Stream the response to disk
    pub fn download(mut self, destination: Option<DownloadDestination>) -> Self {
        self.request.kind = RequestKind::Download(destination);
        self
    }

    /// Upload the parts as a multipart form
    pub fn multipart(mut self, parts: Vec<MultipartPart>) -> Self {
        self.request.kind = RequestKind::UploadMultipart(parts);
        self
    }

    /// Replace the set of status codes treated as success
    pub fn acceptable_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.request.acceptable_status_codes = codes.into_iter().collect();
        self
    }

    /// Replace the set of status codes for which an empty body is fine
    pub fn acceptable_empty_response_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.request.acceptable_empty_response_codes = codes.into_iter().collect();
        self
    }

    /// Serve this request from a local file when using the offline transport
    pub fn fixture(mut self, path: impl Into<PathBuf>) -> Self {
        self.request.fixture = Some(path.into());
        self
    }

    /// Finish building
    pub fn build(self) -> Request {
        self.request
    }
}

/// A validated request, ready for a transport
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    url: Url,
    headers: HeaderMap,
    request: Request,
}

impl PreparedRequest {
    /// Resolved URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// HTTP method
    pub fn method(&self) -> &Method {
        self.request.method()
    }

    /// Resolved headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Request body
    pub fn body(&self) -> Option<&Body> {
        self.request.body()
    }

    /// The descriptor this was prepared from
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Snapshot of the outbound request for response envelopes
    pub fn info(&self) -> RequestInfo {
        RequestInfo {
            method: self.request.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
        }
    }

    /// Apply status code and empty body validation
    pub fn validate(&self, response: Response) -> Result<Response> {
        let status = response.status();

        if !self.request.accepts_status(status) {
            return Err(Error::with_response(
                TransportError::UnacceptableStatus { status },
                response,
            ));
        }

        if !response.is_download()
            && response.bytes().is_empty()
            && self.request.method != Method::HEAD
            && !self.request.accepts_empty_body(status)
        {
            return Err(Error::with_response(
                TransportError::EmptyBody { status },
                response,
            ));
        }

        Ok(response)
    }
}
