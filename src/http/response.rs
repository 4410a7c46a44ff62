//! Response side of a transaction.

use crate::base::neterror::NetError;
use crate::cookies::httpcookie::HttpCookie;
use crate::http::header::HttpHeader;
use crate::http::wire::ResponseHead;
use bytes::{Bytes, BytesMut};
use http::{StatusCode, Version};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
struct ResponseState {
    status: u16,
    status_text: String,
    version: Version,
    header: HttpHeader,
    cookies: Vec<HttpCookie>,
    body: VecDeque<Bytes>,
    available: usize,
    complete: bool,
}

/// Status line, headers, cookies and the body queue of a response.
///
/// The engine creates it when the header block has been parsed and keeps
/// appending body chunks while the application drains them. Clones share
/// the same state.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    inner: Arc<Mutex<ResponseState>>,
}

impl HttpResponse {
    pub(crate) fn from_head(head: &ResponseHead, cookies: Vec<HttpCookie>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ResponseState {
                status: head.status,
                status_text: head.reason.clone(),
                version: head.version,
                header: head.header.clone(),
                cookies,
                body: VecDeque::new(),
                available: 0,
                complete: false,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, ResponseState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Status as an [`http::StatusCode`]. Codes outside 100..=999 map to 500.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.state().status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Status exactly as received.
    pub fn http_status_code(&self) -> u16 {
        self.state().status
    }

    pub fn status_text(&self) -> String {
        self.state().status_text.clone()
    }

    pub fn version(&self) -> Version {
        self.state().version
    }

    pub fn header(&self) -> HttpHeader {
        self.state().header.clone()
    }

    /// Cookies parsed from the response's `Set-Cookie` headers.
    pub fn cookies(&self) -> Vec<HttpCookie> {
        self.state().cookies.clone()
    }

    /// Bytes received and not yet read.
    pub fn available_body_len(&self) -> usize {
        self.state().available
    }

    /// True once the whole body has been received.
    pub fn is_complete(&self) -> bool {
        self.state().complete
    }

    /// Removes and returns the oldest pending body chunk.
    ///
    /// Fails with `EmptyBody` when nothing is pending.
    pub fn read_body(&self) -> Result<Bytes, NetError> {
        let mut state = self.state();
        let chunk = state.body.pop_front().ok_or(NetError::EmptyBody)?;
        state.available -= chunk.len();
        Ok(chunk)
    }

    /// Removes every pending chunk and returns them joined.
    pub fn read_all_body(&self) -> Bytes {
        let mut state = self.state();
        let mut out = BytesMut::with_capacity(state.available);
        for chunk in state.body.drain(..) {
            out.extend_from_slice(&chunk);
        }
        state.available = 0;
        out.freeze()
    }

    pub(crate) fn push_body(&self, chunk: Bytes) -> usize {
        let mut state = self.state();
        if !chunk.is_empty() {
            state.available += chunk.len();
            state.body.push_back(chunk);
        }
        state.available
    }

    pub(crate) fn mark_complete(&self) {
        self.state().complete = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head(status: u16) -> ResponseHead {
        let mut header = HttpHeader::new();
        header.append_received("Content-Type", "text/plain");
        ResponseHead {
            version: Version::HTTP_11,
            status,
            reason: "OK".to_string(),
            header,
            raw_len: 0,
        }
    }

    #[test]
    fn test_status_accessors() {
        let response = HttpResponse::from_head(&head(404), Vec::new());
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(response.http_status_code(), 404);
        assert_eq!(response.status_text(), "OK");
        assert_eq!(
            response.header().first_value_ignore_case("content-type"),
            Some("text/plain")
        );
    }

    #[test]
    fn test_body_queue_consumes() {
        let response = HttpResponse::from_head(&head(200), Vec::new());
        assert_eq!(response.read_body(), Err(NetError::EmptyBody));

        assert_eq!(response.push_body(Bytes::from_static(b"abc")), 3);
        assert_eq!(response.push_body(Bytes::from_static(b"de")), 5);
        assert_eq!(response.read_body().unwrap(), Bytes::from_static(b"abc"));
        assert_eq!(response.available_body_len(), 2);
        assert_eq!(response.read_all_body(), Bytes::from_static(b"de"));
        assert_eq!(response.read_body(), Err(NetError::EmptyBody));
        assert!(!response.is_complete());
        response.mark_complete();
        assert!(response.is_complete());
    }
}
