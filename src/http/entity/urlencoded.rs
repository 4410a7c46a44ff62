use super::{BytesCursor, HttpEntity};
use crate::base::neterror::NetError;
use bytes::Bytes;
use url::form_urlencoded;

/// `application/x-www-form-urlencoded` body built from name/value pairs.
///
/// Parameters may be added until the engine starts pulling data.
#[derive(Debug, Clone, Default)]
pub struct UrlEncodedEntity {
    params: Vec<(String, String)>,
    cursor: Option<BytesCursor>,
}

impl UrlEncodedEntity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_parameter(&mut self, name: &str, value: &str) -> Result<(), NetError> {
        if self.cursor.is_some() {
            return Err(NetError::InvalidState);
        }
        if name.is_empty() {
            return Err(NetError::InvalidArgument);
        }
        self.params.push((name.to_string(), value.to_string()));
        Ok(())
    }

    fn cursor(&mut self) -> &mut BytesCursor {
        let params = &self.params;
        self.cursor
            .get_or_insert_with(|| BytesCursor::new(Bytes::from(encode(params))))
    }
}

fn encode(params: &[(String, String)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish()
}

impl HttpEntity for UrlEncodedEntity {
    fn content_length(&self) -> i64 {
        match &self.cursor {
            Some(cursor) => cursor.len() as i64,
            None => encode(&self.params).len() as i64,
        }
    }

    fn content_type(&self) -> String {
        "application/x-www-form-urlencoded".to_string()
    }

    fn has_next_data(&mut self) -> Result<bool, NetError> {
        Ok(self.cursor().has_remaining())
    }

    fn next_data(&mut self, recommended_size: usize) -> Result<Bytes, NetError> {
        self.cursor().next(recommended_size)
    }
}
