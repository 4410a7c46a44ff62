//! `Transfer-Encoding: chunked` framing (RFC 7230 §4.1).

use crate::base::neterror::NetError;
use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Terminating zero-length chunk with an empty trailer section.
pub(crate) const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

const MAX_CHUNK_LINE: u64 = 4096;

/// Frames `data` as one chunk. Empty input must be sent as [`LAST_CHUNK`]
/// instead, since a zero-size chunk ends the body.
pub(crate) fn encode_chunk(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 12);
    out.extend_from_slice(format!("{:X}\r\n", data.len()).as_bytes());
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Size,
    Data,
    Done,
}

/// Incremental decoder for a chunked response body.
#[derive(Debug)]
pub(crate) struct ChunkedDecoder {
    state: DecodeState,
    remaining: u64,
}

impl ChunkedDecoder {
    pub(crate) fn new() -> Self {
        Self {
            state: DecodeState::Size,
            remaining: 0,
        }
    }

    /// Returns the next piece of body data, at most `max` bytes, or `None`
    /// once the last chunk and its trailers have been consumed.
    pub(crate) async fn next_chunk<R>(&mut self, reader: &mut R, max: usize) -> Result<Option<Bytes>, NetError>
    where
        R: AsyncBufRead + Unpin,
    {
        loop {
            match self.state {
                DecodeState::Done => return Ok(None),
                DecodeState::Size => {
                    let size = read_chunk_size(reader).await?;
                    if size == 0 {
                        skip_trailers(reader).await?;
                        self.state = DecodeState::Done;
                        return Ok(None);
                    }
                    self.remaining = size;
                    self.state = DecodeState::Data;
                }
                DecodeState::Data => {
                    let buf = reader.fill_buf().await.map_err(NetError::from)?;
                    if buf.is_empty() {
                        return Err(NetError::IncompleteChunkedEncoding);
                    }
                    let n = buf.len().min(max.max(1)).min(self.remaining as usize);
                    let data = Bytes::copy_from_slice(&buf[..n]);
                    reader.consume(n);
                    self.remaining -= n as u64;

                    if self.remaining == 0 {
                        let crlf = read_line(reader).await?;
                        if !crlf.is_empty() {
                            return Err(NetError::InvalidChunkedEncoding);
                        }
                        self.state = DecodeState::Size;
                    }
                    return Ok(Some(data));
                }
            }
        }
    }
}

/// Reads one line including its terminator, bounded by `MAX_CHUNK_LINE`.
async fn read_raw_line<R>(reader: &mut R) -> Result<Vec<u8>, NetError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let n = (&mut *reader)
        .take(MAX_CHUNK_LINE)
        .read_until(b'\n', &mut line)
        .await
        .map_err(NetError::from)?;
    if n == 0 {
        return Err(NetError::IncompleteChunkedEncoding);
    }
    if line.last() != Some(&b'\n') {
        return Err(if (n as u64) >= MAX_CHUNK_LINE {
            NetError::InvalidChunkedEncoding
        } else {
            NetError::IncompleteChunkedEncoding
        });
    }
    Ok(line)
}

/// Reads one line, without its terminator.
async fn read_line<R>(reader: &mut R) -> Result<String, NetError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = read_raw_line(reader).await?;
    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    String::from_utf8(line).map_err(|_| NetError::InvalidChunkedEncoding)
}

/// Reads a chunk-size line; chunk extensions are skipped.
async fn read_chunk_size<R>(reader: &mut R) -> Result<u64, NetError>
where
    R: AsyncBufRead + Unpin,
{
    let line = read_raw_line(reader).await?;
    // httparse reads an empty line as size 0
    if !line.first().is_some_and(u8::is_ascii_hexdigit) {
        return Err(NetError::InvalidChunkedEncoding);
    }
    match httparse::parse_chunk_size(&line) {
        Ok(httparse::Status::Complete((_, size))) => Ok(size),
        Ok(httparse::Status::Partial) => Err(NetError::IncompleteChunkedEncoding),
        Err(_) => Err(NetError::InvalidChunkedEncoding),
    }
}

async fn skip_trailers<R>(reader: &mut R) -> Result<(), NetError>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        if read_line(reader).await?.is_empty() {
            return Ok(());
        }
    }
}
