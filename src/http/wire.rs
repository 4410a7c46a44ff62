//! HTTP/1.1 message framing: request heads out, response heads and body
//! framing in.

use crate::base::neterror::NetError;
use crate::http::chunked::ChunkedDecoder;
use crate::http::header::HttpHeader;
use bytes::Bytes;
use http::Version;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Upper bound on the status line plus all header lines of a response.
pub(crate) const MAX_RESPONSE_HEADER_BYTES: usize = 256 * 1024;

/// Serializes a request line and header block, including the blank line.
pub(crate) fn encode_request_head(
    method: &str,
    target: &str,
    version: Version,
    fields: &[(String, String)],
) -> Vec<u8> {
    let version = if version == Version::HTTP_10 {
        "HTTP/1.0"
    } else {
        "HTTP/1.1"
    };
    let mut out = format!("{} {} {}\r\n", method, target, version);
    for (name, value) in fields {
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
        out.push_str("\r\n");
    }
    out.push_str("\r\n");
    out.into_bytes()
}

/// Status line and headers of a response.
#[derive(Debug, Clone)]
pub(crate) struct ResponseHead {
    pub version: Version,
    pub status: u16,
    pub reason: String,
    pub header: HttpHeader,
    /// Bytes the status line and header block occupied on the wire.
    pub raw_len: usize,
}

impl ResponseHead {
    pub(crate) fn is_interim(&self) -> bool {
        (100..200).contains(&self.status) && self.status != 101
    }
}

/// Header slots offered to the parser; more fields than this is treated
/// like an oversized head.
const MAX_RESPONSE_HEADERS: usize = 128;

/// Reads a status line and header block, leaving the reader positioned at
/// the first body byte.
pub(crate) async fn read_response_head<R>(reader: &mut R) -> Result<ResponseHead, NetError>
where
    R: AsyncBufRead + Unpin,
{
    let mut config = httparse::ParserConfig::default();
    config.allow_obsolete_multiline_headers_in_responses(true);

    let mut buf: Vec<u8> = Vec::new();
    loop {
        let available = reader.fill_buf().await.map_err(NetError::from)?;
        if available.is_empty() {
            return Err(if buf.is_empty() {
                NetError::EmptyResponse
            } else {
                NetError::InvalidResponse
            });
        }
        let prev = buf.len();
        buf.extend_from_slice(available);
        let got = available.len();

        let mut headers = [httparse::EMPTY_HEADER; MAX_RESPONSE_HEADERS];
        let mut response = httparse::Response::new(&mut headers);
        match config.parse_response(&mut response, &buf) {
            Ok(httparse::Status::Complete(n)) => {
                let head = build_head(&response, n)?;
                reader.consume(n.saturating_sub(prev).min(got));
                return Ok(head);
            }
            Ok(httparse::Status::Partial) => {
                reader.consume(got);
                if buf.len() > MAX_RESPONSE_HEADER_BYTES {
                    return Err(NetError::ResponseHeadersTooBig);
                }
            }
            Err(httparse::Error::TooManyHeaders) => return Err(NetError::ResponseHeadersTooBig),
            Err(e) => {
                tracing::debug!(error = %e, "malformed response head");
                return Err(NetError::InvalidResponse);
            }
        }
    }
}

fn build_head(response: &httparse::Response<'_, '_>, raw_len: usize) -> Result<ResponseHead, NetError> {
    if raw_len > MAX_RESPONSE_HEADER_BYTES {
        return Err(NetError::ResponseHeadersTooBig);
    }
    let version = match response.version {
        Some(0) => Version::HTTP_10,
        Some(1) => Version::HTTP_11,
        _ => return Err(NetError::InvalidResponse),
    };
    let status = response.code.ok_or(NetError::InvalidResponse)?;
    if status < 100 {
        return Err(NetError::InvalidResponse);
    }

    let mut header = HttpHeader::new();
    for field in response.headers.iter() {
        let value = String::from_utf8_lossy(field.value);
        // obs-fold continuations collapse to a single space
        let value = value
            .split('\n')
            .map(|piece| piece.trim_matches(&[' ', '\t', '\r'][..]))
            .filter(|piece| !piece.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        header.append_received(field.name, &value);
    }

    Ok(ResponseHead {
        version,
        status,
        reason: response.reason.unwrap_or("").trim().to_string(),
        header,
        raw_len,
    })
}

/// How the end of a response body is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyFraming {
    Empty,
    Length(u64),
    Chunked,
    UntilClose,
}

pub(crate) fn body_framing(request_is_head: bool, head: &ResponseHead) -> Result<BodyFraming, NetError> {
    if request_is_head || head.status < 200 || head.status == 204 || head.status == 304 {
        return Ok(BodyFraming::Empty);
    }

    let codings: Vec<String> = head
        .header
        .values_ignore_case("Transfer-Encoding")
        .flat_map(|v| v.split(','))
        .map(|c| c.trim().to_ascii_lowercase())
        .filter(|c| !c.is_empty())
        .collect();
    if !codings.is_empty() {
        // chunked must be the final coding; otherwise the body runs to close
        return Ok(if codings.last().map(String::as_str) == Some("chunked") {
            BodyFraming::Chunked
        } else {
            BodyFraming::UntilClose
        });
    }

    let mut length: Option<u64> = None;
    for value in head.header.values_ignore_case("Content-Length") {
        for item in value.split(',') {
            let parsed: u64 = item.trim().parse().map_err(|_| NetError::InvalidResponse)?;
            match length {
                Some(existing) if existing != parsed => return Err(NetError::InvalidResponse),
                _ => length = Some(parsed),
            }
        }
    }

    Ok(match length {
        Some(0) => BodyFraming::Empty,
        Some(n) => BodyFraming::Length(n),
        None => BodyFraming::UntilClose,
    })
}

/// Whether the connection may carry another request after this response.
pub(crate) fn is_keep_alive(head: &ResponseHead, framing: BodyFraming) -> bool {
    if framing == BodyFraming::UntilClose {
        return false;
    }
    let has_token = |token: &str| {
        head.header
            .values_ignore_case("Connection")
            .flat_map(|v| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    };
    if head.version == Version::HTTP_10 {
        has_token("keep-alive")
    } else {
        !has_token("close")
    }
}

/// Pulls body data according to the response framing.
#[derive(Debug)]
pub(crate) struct BodyReader {
    framing: BodyFraming,
    remaining: u64,
    chunked: ChunkedDecoder,
    done: bool,
}

impl BodyReader {
    pub(crate) fn new(framing: BodyFraming) -> Self {
        let remaining = match framing {
            BodyFraming::Length(n) => n,
            _ => 0,
        };
        Self {
            framing,
            remaining,
            chunked: ChunkedDecoder::new(),
            done: framing == BodyFraming::Empty,
        }
    }

    /// Declared body length, when the response carried one.
    pub(crate) fn content_length(&self) -> Option<u64> {
        match self.framing {
            BodyFraming::Length(n) => Some(n),
            BodyFraming::Empty => Some(0),
            _ => None,
        }
    }

    pub(crate) async fn next_chunk<R>(&mut self, reader: &mut R, max: usize) -> Result<Option<Bytes>, NetError>
    where
        R: AsyncBufRead + Unpin,
    {
        if self.done {
            return Ok(None);
        }
        let chunk = match self.framing {
            BodyFraming::Empty => None,
            BodyFraming::Chunked => self.chunked.next_chunk(reader, max).await?,
            BodyFraming::Length(_) => {
                let buf = reader.fill_buf().await.map_err(NetError::from)?;
                if buf.is_empty() {
                    return Err(NetError::ContentLengthMismatch);
                }
                let n = buf.len().min(max.max(1)).min(self.remaining as usize);
                let data = Bytes::copy_from_slice(&buf[..n]);
                reader.consume(n);
                self.remaining -= n as u64;
                if self.remaining == 0 {
                    self.done = true;
                }
                Some(data)
            }
            BodyFraming::UntilClose => {
                let buf = reader.fill_buf().await.map_err(NetError::from)?;
                if buf.is_empty() {
                    None
                } else {
                    let n = buf.len().min(max.max(1));
                    let data = Bytes::copy_from_slice(&buf[..n]);
                    reader.consume(n);
                    Some(data)
                }
            }
        };
        if chunk.is_none() {
            self.done = true;
        }
        Ok(chunk)
    }
}
