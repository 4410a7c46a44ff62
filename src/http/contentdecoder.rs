//! Streaming `Content-Encoding` decoding for response bodies.

use crate::base::neterror::NetError;
use bytes::Bytes;
use flate2::write::{GzDecoder, ZlibDecoder};
use std::io::Write;

pub(crate) enum ContentDecoder {
    Identity,
    Gzip(GzDecoder<Vec<u8>>),
    Deflate(ZlibDecoder<Vec<u8>>),
}

impl ContentDecoder {
    /// Picks a decoder for a `Content-Encoding` value. Codings this crate
    /// never advertises are passed through untouched.
    pub(crate) fn for_encoding(encoding: Option<&str>) -> Self {
        match encoding.map(|e| e.trim().to_ascii_lowercase()).as_deref() {
            Some("gzip") | Some("x-gzip") => ContentDecoder::Gzip(GzDecoder::new(Vec::new())),
            Some("deflate") => ContentDecoder::Deflate(ZlibDecoder::new(Vec::new())),
            _ => ContentDecoder::Identity,
        }
    }

    pub(crate) fn is_identity(&self) -> bool {
        matches!(self, ContentDecoder::Identity)
    }

    /// Feeds encoded bytes and returns whatever decoded output is ready.
    pub(crate) fn decode(&mut self, input: Bytes) -> Result<Bytes, NetError> {
        match self {
            ContentDecoder::Identity => Ok(input),
            ContentDecoder::Gzip(d) => {
                d.write_all(&input).map_err(|_| NetError::ContentDecodingFailed)?;
                Ok(Bytes::from(std::mem::take(d.get_mut())))
            }
            ContentDecoder::Deflate(d) => {
                d.write_all(&input).map_err(|_| NetError::ContentDecodingFailed)?;
                Ok(Bytes::from(std::mem::take(d.get_mut())))
            }
        }
    }

    /// Flushes the tail of the stream once the body has ended.
    pub(crate) fn finish(&mut self) -> Result<Bytes, NetError> {
        match self {
            ContentDecoder::Identity => Ok(Bytes::new()),
            ContentDecoder::Gzip(d) => {
                d.try_finish().map_err(|_| NetError::ContentDecodingFailed)?;
                Ok(Bytes::from(std::mem::take(d.get_mut())))
            }
            ContentDecoder::Deflate(d) => {
                d.try_finish().map_err(|_| NetError::ContentDecodingFailed)?;
                Ok(Bytes::from(std::mem::take(d.get_mut())))
            }
        }
    }
}
