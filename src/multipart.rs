//! Multipart form assembly and encoding

use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tempfile::NamedTempFile;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::body::MultipartPart;

/// Forms larger than this many bytes are encoded to a temporary file
pub const ENCODING_MEMORY_THRESHOLD: u64 = 10_000_000;

const CRLF: &[u8] = b"\r\n";

/// One entry of a multipart form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEntry {
    /// Plain form field
    Field {
        /// Field name
        name: String,
        /// Field content
        content: Bytes,
    },
    /// File attachment
    File {
        /// Field name
        name: String,
        /// Attachment filename
        filename: String,
        /// Attachment MIME type
        content_type: String,
        /// File content
        content: Bytes,
    },
}

impl FormEntry {
    fn content(&self) -> &Bytes {
        match self {
            FormEntry::Field { content, .. } | FormEntry::File { content, .. } => content,
        }
    }

    fn headers(&self) -> String {
        match self {
            FormEntry::Field { name, .. } => {
                format!("Content-Disposition: form-data; name=\"{}\"\r\n", name)
            }
            FormEntry::File {
                name,
                filename,
                content_type,
                ..
            } => format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n",
                name, filename, content_type
            ),
        }
    }
}

/// An encoded form, either buffered or spilled to disk
#[derive(Debug)]
pub enum EncodedForm {
    /// Encoded in memory
    InMemory(Bytes),
    /// Encoded to a temporary file, removed on drop
    OnDisk {
        /// The temporary file
        file: NamedTempFile,
        /// Encoded length in bytes
        len: u64,
    },
}

impl EncodedForm {
    /// Encoded length in bytes
    pub fn len(&self) -> u64 {
        match self {
            EncodedForm::InMemory(bytes) => bytes.len() as u64,
            EncodedForm::OnDisk { len, .. } => *len,
        }
    }

    /// Whether nothing was encoded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A multipart/form-data body under construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartForm {
    boundary: String,
    entries: Vec<FormEntry>,
}

impl MultipartForm {
    /// Create an empty form with a fresh boundary
    pub fn new() -> Self {
        Self::with_boundary(generate_boundary())
    }

    /// Create an empty form with a fixed boundary
    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            entries: Vec::new(),
        }
    }

    /// Build a form from request parts, in order
    ///
    /// Parts carrying both a filename and a MIME type become file
    /// attachments, everything else a plain field.
    pub fn from_parts(parts: &[MultipartPart]) -> Self {
        let mut form = Self::new();
        for part in parts {
            match part.attachment() {
                Some((filename, content_type)) => form.append_file(
                    part.name.clone(),
                    part.content.clone(),
                    filename,
                    content_type,
                ),
                None => form.append_field(part.name.clone(), part.content.clone()),
            }
        }
        form
    }

    /// Append a plain field
    pub fn append_field(&mut self, name: impl Into<String>, content: impl Into<Bytes>) {
        self.entries.push(FormEntry::Field {
            name: name.into(),
            content: content.into(),
        });
    }

    /// Append a file attachment
    pub fn append_file(
        &mut self,
        name: impl Into<String>,
        content: impl Into<Bytes>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
    ) {
        self.entries.push(FormEntry::File {
            name: name.into(),
            filename: filename.into(),
            content_type: content_type.into(),
            content: content.into(),
        });
    }

    /// Entries in the order they will be encoded
    pub fn entries(&self) -> &[FormEntry] {
        &self.entries
    }

    /// The boundary separating entries
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Value for the `Content-Type` header
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    fn opening(&self, index: usize) -> String {
        if index == 0 {
            format!("--{}\r\n", self.boundary)
        } else {
            format!("\r\n--{}\r\n", self.boundary)
        }
    }

    fn closing(&self) -> String {
        if self.entries.is_empty() {
            format!("--{}--\r\n", self.boundary)
        } else {
            format!("\r\n--{}--\r\n", self.boundary)
        }
    }

    /// Exact encoded length in bytes
    pub fn content_length(&self) -> u64 {
        let parts: usize = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                self.opening(i).len() + entry.headers().len() + CRLF.len() + entry.content().len()
            })
            .sum();
        (parts + self.closing().len()) as u64
    }

    /// Write the encoded form to `writer`
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for (i, entry) in self.entries.iter().enumerate() {
            writer.write_all(self.opening(i).as_bytes())?;
            writer.write_all(entry.headers().as_bytes())?;
            writer.write_all(CRLF)?;
            writer.write_all(entry.content())?;
        }
        writer.write_all(self.closing().as_bytes())
    }

    /// Encode the whole form in memory
    pub fn encode(&self) -> Bytes {
        let mut data = Vec::with_capacity(self.content_length() as usize);
        // Writing into a Vec cannot fail
        let _ = self.write_to(&mut data);
        Bytes::from(data)
    }

    /// Encode in memory below `threshold` bytes, otherwise to a temporary file
    pub async fn encode_with_threshold(&self, threshold: u64) -> io::Result<EncodedForm> {
        let len = self.content_length();
        if len < threshold {
            return Ok(EncodedForm::InMemory(self.encode()));
        }

        let file = tempfile::Builder::new()
            .prefix("netlayer-multipart-")
            .tempfile()?;
        let mut writer = BufWriter::new(tokio::fs::File::from_std(file.as_file().try_clone()?));
        for (i, entry) in self.entries.iter().enumerate() {
            writer.write_all(self.opening(i).as_bytes()).await?;
            writer.write_all(entry.headers().as_bytes()).await?;
            writer.write_all(CRLF).await?;
            writer.write_all(entry.content()).await?;
        }
        writer.write_all(self.closing().as_bytes()).await?;
        writer.flush().await?;

        tracing::debug!(len, path = %file.path().display(), "multipart form spilled to disk");
        Ok(EncodedForm::OnDisk { file, len })
    }
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

fn generate_boundary() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("netlayer.boundary.{:08x}{:08x}", timestamp as u32, count as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 35 characters wide
    const BOUNDARY: &str = "fixture.boundary.0123456789abcdef00";

    #[test]
    fn single_file_part_layout() {
        let mut form = MultipartForm::with_boundary(BOUNDARY);
        form.append_file("foo", Bytes::new(), "foo.png", "image/png");

        let encoded = form.encode();
        assert_eq!(encoded.len(), 173);
        assert_eq!(form.content_length(), 173);

        let text = String::from_utf8(encoded.to_vec()).unwrap();
        assert!(text.starts_with(&format!("--{}\r\n", BOUNDARY)));
        assert!(text.contains("name=\"foo\"; filename=\"foo.png\"\r\nContent-Type: image/png\r\n\r\n"));
        assert!(text.ends_with(&format!("\r\n--{}--\r\n", BOUNDARY)));
    }

    #[test]
    fn parts_split_into_files_and_fields() {
        let parts = vec![
            MultipartPart::file("avatar", "png-bytes", "a.png", "image/png"),
            MultipartPart::field("comment", "hello"),
            MultipartPart {
                name: "half".to_string(),
                content: Bytes::from_static(b"x"),
                filename: Some("half.txt".to_string()),
                content_type: None,
            },
        ];

        let form = MultipartForm::from_parts(&parts);
        assert!(matches!(&form.entries()[0], FormEntry::File { filename, .. } if filename == "a.png"));
        assert!(matches!(&form.entries()[1], FormEntry::Field { name, .. } if name == "comment"));
        assert!(matches!(&form.entries()[2], FormEntry::Field { name, .. } if name == "half"));
    }

    #[test]
    fn content_length_matches_encoding() {
        let mut form = MultipartForm::new();
        form.append_field("a", "1");
        form.append_field("b", "22");
        form.append_file("c", vec![0u8; 100], "c.bin", "application/octet-stream");

        assert_eq!(form.content_length(), form.encode().len() as u64);
    }

    #[tokio::test]
    async fn threshold_spills_to_disk() {
        let mut form = MultipartForm::new();
        form.append_field("big", vec![b'x'; 4096]);

        let in_memory = form.encode_with_threshold(ENCODING_MEMORY_THRESHOLD).await.unwrap();
        assert!(matches!(in_memory, EncodedForm::InMemory(_)));

        let on_disk = form.encode_with_threshold(1024).await.unwrap();
        match &on_disk {
            EncodedForm::OnDisk { file, len } => {
                assert_eq!(*len, form.content_length());
                assert_eq!(std::fs::read(file.path()).unwrap(), form.encode().to_vec());
            }
            EncodedForm::InMemory(_) => panic!("expected the form on disk"),
        }
    }

    #[test]
    fn boundaries_are_unique() {
        assert_ne!(MultipartForm::new().boundary(), MultipartForm::new().boundary());
    }
}
