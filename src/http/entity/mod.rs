//! Pull-style request bodies.
//!
//! An entity hands its body to the engine piece by piece: the engine asks
//! [`HttpEntity::has_next_data`] and then pulls a chunk with
//! [`HttpEntity::next_data`]. Entities with a known length are framed with
//! `Content-Length`; those reporting `-1` are sent chunked.

mod multipart;
mod stringentity;
mod urlencoded;
mod xmlentity;

pub use multipart::{MultipartEntity, FILE_PART_DEFAULT_MIME_TYPE, STRING_PART_DEFAULT_MIME_TYPE};
pub use stringentity::StringEntity;
pub use urlencoded::UrlEncodedEntity;
pub use xmlentity::{XmlDomEntity, XmlElement, XmlNode};

use crate::base::neterror::NetError;
use bytes::Bytes;

/// Request body source.
///
/// Calls happen on a blocking worker thread, so implementations may do
/// synchronous file I/O inside `next_data`.
pub trait HttpEntity: Send {
    /// Total body length in bytes, or `-1` when unknown.
    fn content_length(&self) -> i64;

    /// Value for the `Content-Type` request header.
    fn content_type(&self) -> String;

    /// Returns `true` while more data remains.
    fn has_next_data(&mut self) -> Result<bool, NetError>;

    /// Returns up to `recommended_size` bytes (the entity may return less).
    /// Fails with `InvalidState` once the body is exhausted.
    fn next_data(&mut self, recommended_size: usize) -> Result<Bytes, NetError>;
}

/// Read position over an in-memory body.
#[derive(Debug, Clone, Default)]
pub(crate) struct BytesCursor {
    data: Bytes,
    offset: usize,
}

impl BytesCursor {
    pub(crate) fn new(data: Bytes) -> Self {
        Self { data, offset: 0 }
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn has_remaining(&self) -> bool {
        self.offset < self.data.len()
    }

    pub(crate) fn next(&mut self, recommended_size: usize) -> Result<Bytes, NetError> {
        if !self.has_remaining() {
            return Err(NetError::InvalidState);
        }
        let end = self
            .offset
            .saturating_add(recommended_size.max(1))
            .min(self.data.len());
        let chunk = self.data.slice(self.offset..end);
        self.offset = end;
        Ok(chunk)
    }
}

/// Raw bytes with a caller supplied content type.
#[derive(Debug, Clone)]
pub struct ByteEntity {
    cursor: BytesCursor,
    content_type: String,
}

impl ByteEntity {
    pub fn new(data: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            cursor: BytesCursor::new(data.into()),
            content_type: content_type.into(),
        }
    }
}

impl HttpEntity for ByteEntity {
    fn content_length(&self) -> i64 {
        self.cursor.len() as i64
    }

    fn content_type(&self) -> String {
        self.content_type.clone()
    }

    fn has_next_data(&mut self) -> Result<bool, NetError> {
        Ok(self.cursor.has_remaining())
    }

    fn next_data(&mut self, recommended_size: usize) -> Result<Bytes, NetError> {
        self.cursor.next(recommended_size)
    }
}

/// Drains an entity into memory.
pub fn read_to_end(entity: &mut dyn HttpEntity, chunk_size: usize) -> Result<Vec<u8>, NetError> {
    let mut out = Vec::new();
    while entity.has_next_data()? {
        out.extend_from_slice(&entity.next_data(chunk_size)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_entity_chunks() {
        let mut entity = ByteEntity::new(&b"abcdefg"[..], "application/octet-stream");
        assert_eq!(entity.content_length(), 7);
        assert!(entity.has_next_data().unwrap());
        assert_eq!(entity.next_data(3).unwrap(), Bytes::from_static(b"abc"));
        assert_eq!(entity.next_data(3).unwrap(), Bytes::from_static(b"def"));
        assert_eq!(entity.next_data(3).unwrap(), Bytes::from_static(b"g"));
        assert!(!entity.has_next_data().unwrap());
        assert_eq!(entity.next_data(3), Err(NetError::InvalidState));
    }

    #[test]
    fn test_empty_entity_has_no_data() {
        let mut entity = ByteEntity::new(Bytes::new(), "text/plain");
        assert_eq!(entity.content_length(), 0);
        assert!(!entity.has_next_data().unwrap());
    }

    #[test]
    fn test_read_to_end() {
        let mut entity = ByteEntity::new(&b"hello world"[..], "text/plain");
        assert_eq!(read_to_end(&mut entity, 4).unwrap(), b"hello world");
    }
}
