use super::{BytesCursor, HttpEntity};
use crate::base::neterror::NetError;
use bytes::Bytes;

const DEFAULT_MIME_TYPE: &str = "text/plain";
const DEFAULT_CHARSET: &str = "ISO-8859-1";

/// Text body encoded in a named character set.
#[derive(Debug, Clone)]
pub struct StringEntity {
    cursor: BytesCursor,
    mime_type: String,
    charset: String,
}

impl StringEntity {
    /// `text/plain` in ISO-8859-1.
    pub fn new(text: &str) -> Result<Self, NetError> {
        Self::with_type(text, DEFAULT_MIME_TYPE, DEFAULT_CHARSET)
    }

    /// Fails with `InvalidArgument` for an unsupported charset, or when the
    /// text has characters the charset cannot represent.
    pub fn with_type(text: &str, mime_type: &str, charset: &str) -> Result<Self, NetError> {
        if mime_type.is_empty() {
            return Err(NetError::InvalidArgument);
        }
        let encoded = encode(text, charset)?;
        Ok(Self {
            cursor: BytesCursor::new(encoded),
            mime_type: mime_type.to_string(),
            charset: charset.to_string(),
        })
    }

    pub fn charset(&self) -> &str {
        &self.charset
    }
}

pub(crate) fn encode(text: &str, charset: &str) -> Result<Bytes, NetError> {
    let limit = match charset.to_ascii_lowercase().as_str() {
        "utf-8" | "utf8" => return Ok(Bytes::copy_from_slice(text.as_bytes())),
        "iso-8859-1" | "latin1" | "latin-1" => 0xFF,
        "us-ascii" | "ascii" => 0x7F,
        _ => return Err(NetError::InvalidArgument),
    };

    text.chars()
        .map(|c| {
            let code = c as u32;
            if code <= limit {
                Ok(code as u8)
            } else {
                Err(NetError::InvalidArgument)
            }
        })
        .collect::<Result<Vec<u8>, _>>()
        .map(Bytes::from)
}

impl HttpEntity for StringEntity {
    fn content_length(&self) -> i64 {
        self.cursor.len() as i64
    }

    fn content_type(&self) -> String {
        format!("{}; charset={}", self.mime_type, self.charset)
    }

    fn has_next_data(&mut self) -> Result<bool, NetError> {
        Ok(self.cursor.has_remaining())
    }

    fn next_data(&mut self, recommended_size: usize) -> Result<Bytes, NetError> {
        self.cursor.next(recommended_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_type() {
        let entity = StringEntity::new("hello world").unwrap();
        assert_eq!(entity.content_length(), 11);
        assert_eq!(entity.content_type(), "text/plain; charset=ISO-8859-1");
    }

    #[test]
    fn test_latin1_encoding() {
        let mut entity = StringEntity::new("caf\u{e9}").unwrap();
        assert_eq!(entity.content_length(), 4);
        assert_eq!(entity.next_data(16).unwrap().as_ref(), b"caf\xe9");
    }

    #[test]
    fn test_utf8_encoding() {
        let entity = StringEntity::with_type("caf\u{e9}", "text/html", "UTF-8").unwrap();
        assert_eq!(entity.content_length(), 5);
        assert_eq!(entity.content_type(), "text/html; charset=UTF-8");
    }

    #[test]
    fn test_unrepresentable_text() {
        assert_eq!(
            StringEntity::new("\u{4e2d}").unwrap_err(),
            NetError::InvalidArgument
        );
        assert_eq!(
            StringEntity::with_type("x", "text/plain", "KOI8-R").unwrap_err(),
            NetError::InvalidArgument
        );
    }
}
