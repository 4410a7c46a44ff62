//! Multipart form data support.
//!
//! Provides RFC 2388 `multipart/form-data` encoding for string fields and
//! file uploads. File parts are streamed from disk while the body is sent.
//!
//! # Example
//! ```ignore
//! use nethttp::http::entity::MultipartEntity;
//!
//! let mut form = MultipartEntity::new();
//! form.add_string_part("username", "user123")?;
//! form.add_file_part("upload", "/tmp/doc.txt")?;
//! request.set_entity(form)?;
//! ```

use super::stringentity::encode;
use super::HttpEntity;
use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use bytes::Bytes;
use std::borrow::Cow;
use std::collections::VecDeque;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// MIME type of string parts added without one.
pub const STRING_PART_DEFAULT_MIME_TYPE: &str = "text/plain";
/// MIME type of file parts added without one.
pub const FILE_PART_DEFAULT_MIME_TYPE: &str = "application/octet-stream";

const DEFAULT_CHARSET: &str = "ISO-8859-1";
const MAX_BOUNDARY_LEN: usize = 70;

#[derive(Debug)]
enum PartBody {
    Text(Bytes),
    File { path: PathBuf, len: u64 },
    Buffer(Bytes),
}

impl PartBody {
    fn len(&self) -> u64 {
        match self {
            PartBody::Text(b) | PartBody::Buffer(b) => b.len() as u64,
            PartBody::File { len, .. } => *len,
        }
    }
}

#[derive(Debug)]
struct Part {
    name: String,
    file_name: Option<String>,
    mime_type: String,
    charset: Option<String>,
    body: PartBody,
}

impl Part {
    /// Format the part headers, including the blank line that ends them.
    fn format_headers(&self) -> String {
        let mut header = format!(
            "Content-Disposition: form-data; name=\"{}\"",
            escape_quotes(&self.name)
        );

        if let Some(ref filename) = self.file_name {
            header.push_str(&format!("; filename=\"{}\"", escape_quotes(filename)));
        }

        header.push_str("\r\nContent-Type: ");
        header.push_str(&self.mime_type);
        if let Some(ref charset) = self.charset {
            header.push_str("; charset=");
            header.push_str(charset);
        }

        let transfer = match self.body {
            PartBody::Text(_) => "8bit",
            _ => "binary",
        };
        header.push_str("\r\nContent-Transfer-Encoding: ");
        header.push_str(transfer);
        header.push_str("\r\n\r\n");
        header
    }
}

enum Segment {
    Bytes(Bytes),
    File { path: PathBuf, len: u64 },
}

struct OpenFile {
    file: File,
    remaining: u64,
}

/// A `multipart/form-data` body.
pub struct MultipartEntity {
    boundary: String,
    parts: Vec<Part>,
    pending: Option<VecDeque<Segment>>,
    open_file: Option<OpenFile>,
}

impl std::fmt::Debug for MultipartEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultipartEntity")
            .field("boundary", &self.boundary)
            .field("parts", &self.parts)
            .finish()
    }
}

impl Default for MultipartEntity {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartEntity {
    /// Create a new empty form with a generated boundary.
    pub fn new() -> Self {
        Self {
            boundary: generate_boundary(),
            parts: Vec::new(),
            pending: None,
            open_file: None,
        }
    }

    /// Create a new empty form with a caller chosen boundary.
    pub fn with_boundary(boundary: &str) -> Result<Self, NetError> {
        validate_boundary(boundary)?;
        Ok(Self {
            boundary: boundary.to_string(),
            ..Self::new()
        })
    }

    /// Get the boundary string.
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Adds a `text/plain` ISO-8859-1 field.
    pub fn add_string_part(&mut self, name: &str, text: &str) -> Result<(), NetError> {
        self.add_string_part_with(name, text, STRING_PART_DEFAULT_MIME_TYPE, DEFAULT_CHARSET)
    }

    pub fn add_string_part_with(
        &mut self,
        name: &str,
        text: &str,
        mime_type: &str,
        charset: &str,
    ) -> Result<(), NetError> {
        self.check_open(name, mime_type)?;
        let data = encode(text, charset)?;
        self.parts.push(Part {
            name: name.to_string(),
            file_name: None,
            mime_type: mime_type.to_string(),
            charset: Some(charset.to_string()),
            body: PartBody::Text(data),
        });
        Ok(())
    }

    /// Adds a file part named after the file on disk.
    pub fn add_file_part(&mut self, name: &str, path: impl AsRef<Path>) -> Result<(), NetError> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .ok_or(NetError::InvalidArgument)?;
        self.add_file_part_with(name, path, &file_name, FILE_PART_DEFAULT_MIME_TYPE, None)
    }

    pub fn add_file_part_with(
        &mut self,
        name: &str,
        path: impl AsRef<Path>,
        file_name: &str,
        mime_type: &str,
        charset: Option<&str>,
    ) -> Result<(), NetError> {
        self.check_open(name, mime_type)?;
        let path = path.as_ref();
        let meta = std::fs::metadata(path).file_context()?;
        if !meta.is_file() {
            return Err(NetError::InvalidArgument);
        }
        self.parts.push(Part {
            name: name.to_string(),
            file_name: Some(file_name.to_string()),
            mime_type: mime_type.to_string(),
            charset: charset.map(str::to_string),
            body: PartBody::File {
                path: path.to_path_buf(),
                len: meta.len(),
            },
        });
        Ok(())
    }

    /// Adds an in-memory buffer sent as a file upload.
    pub fn add_file_part_by_buffer(
        &mut self,
        name: &str,
        file_name: &str,
        buffer: impl Into<Bytes>,
    ) -> Result<(), NetError> {
        self.add_file_part_by_buffer_with(name, file_name, buffer, FILE_PART_DEFAULT_MIME_TYPE, None)
    }

    pub fn add_file_part_by_buffer_with(
        &mut self,
        name: &str,
        file_name: &str,
        buffer: impl Into<Bytes>,
        mime_type: &str,
        charset: Option<&str>,
    ) -> Result<(), NetError> {
        self.check_open(name, mime_type)?;
        if file_name.is_empty() {
            return Err(NetError::InvalidArgument);
        }
        self.parts.push(Part {
            name: name.to_string(),
            file_name: Some(file_name.to_string()),
            mime_type: mime_type.to_string(),
            charset: charset.map(str::to_string),
            body: PartBody::Buffer(buffer.into()),
        });
        Ok(())
    }

    fn check_open(&self, name: &str, mime_type: &str) -> Result<(), NetError> {
        if self.pending.is_some() {
            return Err(NetError::InvalidState);
        }
        if name.is_empty() || mime_type.is_empty() {
            return Err(NetError::InvalidArgument);
        }
        Ok(())
    }

    /// Lays the body out as a queue of in-memory and on-disk segments.
    fn segments(&self) -> VecDeque<Segment> {
        let mut out = VecDeque::new();
        if self.parts.is_empty() {
            return out;
        }

        for part in &self.parts {
            let mut head = format!("--{}\r\n", self.boundary);
            head.push_str(&part.format_headers());
            out.push_back(Segment::Bytes(Bytes::from(head)));

            match &part.body {
                PartBody::Text(b) | PartBody::Buffer(b) => out.push_back(Segment::Bytes(b.clone())),
                PartBody::File { path, len } => out.push_back(Segment::File {
                    path: path.clone(),
                    len: *len,
                }),
            }
            out.push_back(Segment::Bytes(Bytes::from_static(b"\r\n")));
        }

        // Final boundary
        out.push_back(Segment::Bytes(Bytes::from(format!("--{}--\r\n", self.boundary))));
        out
    }

    fn pending(&mut self) -> &mut VecDeque<Segment> {
        if self.pending.is_none() {
            self.pending = Some(self.segments());
        }
        self.pending.get_or_insert_with(VecDeque::new)
    }

    fn read_file(&mut self, recommended_size: usize) -> Result<Option<Bytes>, NetError> {
        let Some(open) = self.open_file.as_mut() else {
            return Ok(None);
        };
        let want = (recommended_size.max(1) as u64).min(open.remaining) as usize;
        let mut buf = vec![0u8; want];
        let n = open.file.read(&mut buf).entity_read_context()?;
        if n == 0 {
            // The file shrank after it was added.
            return Err(NetError::InvalidContent);
        }
        buf.truncate(n);
        open.remaining -= n as u64;
        if open.remaining == 0 {
            self.open_file = None;
        }
        Ok(Some(Bytes::from(buf)))
    }
}

impl HttpEntity for MultipartEntity {
    fn content_length(&self) -> i64 {
        if self.parts.is_empty() {
            return 0;
        }

        let mut length = 0u64;
        for part in &self.parts {
            // --boundary\r\n
            length += 2 + self.boundary.len() as u64 + 2;
            length += part.format_headers().len() as u64;
            length += part.body.len();
            // \r\n
            length += 2;
        }
        // --boundary--\r\n
        length += 2 + self.boundary.len() as u64 + 4;
        length as i64
    }

    fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    fn has_next_data(&mut self) -> Result<bool, NetError> {
        let open_file = self.open_file.is_some();
        Ok(open_file || !self.pending().is_empty())
    }

    fn next_data(&mut self, recommended_size: usize) -> Result<Bytes, NetError> {
        if let Some(chunk) = self.read_file(recommended_size)? {
            return Ok(chunk);
        }

        loop {
            match self.pending().pop_front() {
                None => return Err(NetError::InvalidState),
                Some(Segment::Bytes(b)) if b.is_empty() => continue,
                Some(Segment::Bytes(mut b)) => {
                    let take = recommended_size.max(1).min(b.len());
                    let chunk = b.split_to(take);
                    if !b.is_empty() {
                        self.pending().push_front(Segment::Bytes(b));
                    }
                    return Ok(chunk);
                }
                Some(Segment::File { len: 0, .. }) => continue,
                Some(Segment::File { path, len }) => {
                    let file = File::open(&path).file_context()?;
                    tracing::debug!(path = %path.display(), len, "streaming multipart file part");
                    self.open_file = Some(OpenFile {
                        file,
                        remaining: len,
                    });
                    if let Some(chunk) = self.read_file(recommended_size)? {
                        return Ok(chunk);
                    }
                }
            }
        }
    }
}

/// Escape quotes and backslashes in a string.
fn escape_quotes(s: &str) -> Cow<'_, str> {
    if s.contains('"') || s.contains('\\') || s.contains('\r') || s.contains('\n') {
        Cow::Owned(
            s.replace('\\', "\\\\")
                .replace('"', "\\\"")
                .replace('\r', "\\r")
                .replace('\n', "\\n"),
        )
    } else {
        Cow::Borrowed(s)
    }
}

/// RFC 2046 `bchars`, at most 70 of them, not ending in a space.
fn validate_boundary(boundary: &str) -> Result<(), NetError> {
    let valid_char = |c: char| c.is_ascii_alphanumeric() || "'()+_,-./:=? ".contains(c);
    if boundary.is_empty()
        || boundary.len() > MAX_BOUNDARY_LEN
        || boundary.ends_with(' ')
        || !boundary.chars().all(valid_char)
    {
        return Err(NetError::InvalidArgument);
    }
    Ok(())
}

/// Generate a random boundary string.
fn generate_boundary() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let nanos = now.as_nanos();

    // Use timestamp + process id for uniqueness
    format!(
        "----nethttp-boundary-{:016x}{:08x}",
        nanos,
        std::process::id()
    )
}
