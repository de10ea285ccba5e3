//! Request body types

use bytes::Bytes;
use std::borrow::Cow;

use crate::{Error, Result};

/// Request body types
#[derive(Debug, Clone)]
pub enum Body {
    /// Empty body
    Empty,

    /// Raw bytes with content type
    Bytes {
        /// The content
        content: Bytes,
        /// Content type
        content_type: String,
    },

    /// Form-encoded data
    Form {
        /// Form fields
        fields: Vec<(Cow<'static, str>, Cow<'static, str>)>,
    },

    /// JSON data
    Json {
        /// JSON value
        value: serde_json::Value,
    },
}

impl Body {
    /// Create an empty body
    pub fn empty() -> Self {
        Self::Empty
    }

    /// Create a body from bytes
    pub fn bytes(content: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self::Bytes {
            content: content.into(),
            content_type: content_type.into(),
        }
    }

    /// Create a body from text
    pub fn text(content: impl Into<String>) -> Self {
        Self::Bytes {
            content: content.into().into(),
            content_type: "text/plain; charset=utf-8".to_string(),
        }
    }

    /// Create a form body
    pub fn form(fields: Vec<(impl Into<Cow<'static, str>>, impl Into<Cow<'static, str>>)>) -> Self {
        Self::Form {
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Create a JSON body
    pub fn json(value: impl serde::Serialize) -> Result<Self> {
        let value = serde_json::to_value(value)
            .map_err(|e| Error::bad_request(format!("Failed to encode JSON body: {}", e)))?;
        Ok(Self::Json { value })
    }

    /// The content type tag sent with this body, if any
    pub fn content_type(&self) -> Option<&str> {
        match self {
            Body::Empty => None,
            Body::Bytes { content_type, .. } => Some(content_type),
            Body::Form { .. } => Some("application/x-www-form-urlencoded"),
            Body::Json { .. } => Some("application/json"),
        }
    }

    /// Encode the body to the bytes sent on the wire
    pub fn to_bytes(&self) -> Result<Bytes> {
        match self {
            Body::Empty => Ok(Bytes::new()),
            Body::Bytes { content, .. } => Ok(content.clone()),
            Body::Form { fields } => Ok(Bytes::from(encode_form_fields(fields))),
            Body::Json { value } => serde_json::to_vec(value)
                .map(Bytes::from)
                .map_err(|e| Error::bad_request(format!("Failed to encode JSON body: {}", e))),
        }
    }
}

// Convenience From implementations
impl From<String> for Body {
    fn from(content: String) -> Self {
        Self::text(content)
    }
}

impl From<&str> for Body {
    fn from(content: &str) -> Self {
        Self::text(content)
    }
}

impl From<Vec<u8>> for Body {
    fn from(content: Vec<u8>) -> Self {
        Self::bytes(content, "application/octet-stream")
    }
}

impl From<&[u8]> for Body {
    fn from(content: &[u8]) -> Self {
        Self::bytes(content.to_vec(), "application/octet-stream")
    }
}

impl From<Bytes> for Body {
    fn from(content: Bytes) -> Self {
        Self::bytes(content, "application/octet-stream")
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Self::Json { value }
    }
}

/// A named part of a multipart upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartPart {
    /// Field name
    pub name: String,
    /// Content
    pub content: Bytes,
    /// Filename
    pub filename: Option<String>,
    /// MIME type
    pub content_type: Option<String>,
}

impl MultipartPart {
    /// Create a plain field part
    pub fn field(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            filename: None,
            content_type: None,
        }
    }

    /// Create a file attachment part
    pub fn file(
        name: impl Into<String>,
        content: impl Into<Bytes>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            filename: Some(filename.into()),
            content_type: Some(content_type.into()),
        }
    }

    /// Create a file part from a file path
    pub async fn from_file<P: AsRef<std::path::Path>>(
        name: impl Into<String>,
        path: P,
        content_type: impl Into<String>,
    ) -> std::io::Result<Self> {
        let content = tokio::fs::read(&path).await?;
        let filename = path
            .as_ref()
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("file")
            .to_string();

        Ok(Self::file(name, content, filename, content_type))
    }

    /// Filename and MIME type, when both are present
    ///
    /// Only such parts are sent as file attachments.
    pub fn attachment(&self) -> Option<(&str, &str)> {
        match (&self.filename, &self.content_type) {
            (Some(filename), Some(content_type)) => Some((filename, content_type)),
            _ => None,
        }
    }
}

fn encode_form_fields(fields: &[(Cow<'static, str>, Cow<'static, str>)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}
