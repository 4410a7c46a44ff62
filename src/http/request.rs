//! Outgoing request owned by an [`HttpTransaction`](crate::http::transaction::HttpTransaction).

use crate::base::neterror::NetError;
use crate::http::entity::HttpEntity;
use crate::http::header::HttpHeader;
use bytes::Bytes;
use http::header::HeaderValue;
use http::Version;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use url::Url;

/// Standard request methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Options,
    Head,
    Delete,
    Trace,
    Post,
    Put,
    Connect,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Trace => "TRACE",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Connect => "CONNECT",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accept-Encoding codings the engine knows how to decode.
const SUPPORTED_CODINGS: &[&str] = &["identity", "gzip", "deflate"];

/// Value sent when the application asked for every supported coding.
pub(crate) const ALL_CODINGS: &str = "gzip, deflate";

/// Body handed to the engine at submit time.
pub(crate) enum RequestBody {
    Empty,
    Buffered(Vec<Bytes>),
    Entity(Box<dyn HttpEntity>),
}

impl RequestBody {
    pub(crate) fn is_empty(&self) -> bool {
        match self {
            RequestBody::Empty => true,
            RequestBody::Buffered(parts) => parts.iter().all(Bytes::is_empty),
            RequestBody::Entity(_) => false,
        }
    }

    /// Bodies that can be sent again on a new connection or after a redirect.
    pub(crate) fn is_replayable(&self) -> bool {
        !matches!(self, RequestBody::Entity(_))
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Buffered(parts) => f
                .debug_tuple("Buffered")
                .field(&parts.iter().map(Bytes::len).sum::<usize>())
                .finish(),
            RequestBody::Entity(e) => f.debug_tuple("Entity").field(&e.content_length()).finish(),
        }
    }
}

/// Application side of a ready-to-write upload.
///
/// The engine grants one permit per `ReadyToWrite` event; each
/// [`HttpRequest::write_body`] call after submit spends it.
#[derive(Debug, Clone)]
pub(crate) struct UploadHandle {
    tx: mpsc::UnboundedSender<Bytes>,
    permits: Arc<AtomicUsize>,
}

/// Engine side of a ready-to-write upload.
#[derive(Debug)]
pub(crate) struct UploadStream {
    rx: mpsc::UnboundedReceiver<Bytes>,
    permits: Arc<AtomicUsize>,
}

pub(crate) fn upload_channel() -> (UploadHandle, UploadStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    let permits = Arc::new(AtomicUsize::new(0));
    (
        UploadHandle {
            tx,
            permits: permits.clone(),
        },
        UploadStream { rx, permits },
    )
}

impl UploadHandle {
    fn write(&self, data: Bytes) -> Result<(), NetError> {
        self.permits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |p| p.checked_sub(1))
            .map_err(|_| NetError::InvalidState)?;
        self.tx.send(data).map_err(|_| NetError::InvalidState)
    }
}

impl UploadStream {
    /// Allows the application to write one more chunk.
    pub(crate) fn grant(&self) {
        self.permits.fetch_add(1, Ordering::SeqCst);
    }

    /// Next chunk from the application. An empty chunk ends the upload;
    /// `None` means the transaction handle went away.
    pub(crate) async fn next(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

/// A request message.
///
/// Exactly one of [`write_body`](Self::write_body) and
/// [`set_entity`](Self::set_entity) supplies the body. Every mutator fails
/// with `InvalidState` once the owning transaction has been submitted.
pub struct HttpRequest {
    method: HttpMethod,
    custom_method: Option<String>,
    version: Version,
    uri: Option<String>,
    header: HttpHeader,
    body: VecDeque<Bytes>,
    entity: Option<Box<dyn HttpEntity>>,
    cookie: Option<String>,
    accept_encoding: Option<String>,
    manual_cookies: bool,
    sealed: bool,
    upload: Option<UploadHandle>,
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method_str())
            .field("version", &self.version)
            .field("uri", &self.uri)
            .field("header", &self.header)
            .field("sealed", &self.sealed)
            .finish_non_exhaustive()
    }
}

impl HttpRequest {
    pub(crate) fn new(manual_cookies: bool) -> Self {
        Self {
            method: HttpMethod::Get,
            custom_method: None,
            version: Version::HTTP_11,
            uri: None,
            header: HttpHeader::new(),
            body: VecDeque::new(),
            entity: None,
            cookie: None,
            accept_encoding: None,
            manual_cookies,
            sealed: false,
            upload: None,
        }
    }

    fn check_mutable(&self) -> Result<(), NetError> {
        if self.sealed {
            return Err(NetError::InvalidState);
        }
        Ok(())
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn set_method(&mut self, method: HttpMethod) -> Result<(), NetError> {
        self.check_mutable()?;
        self.method = method;
        self.custom_method = None;
        Ok(())
    }

    pub fn custom_method(&self) -> Option<&str> {
        self.custom_method.as_deref()
    }

    /// Sets an extension method. It must be an RFC 7230 token.
    pub fn set_custom_method(&mut self, method: &str) -> Result<(), NetError> {
        self.check_mutable()?;
        http::Method::from_bytes(method.as_bytes()).map_err(|_| NetError::InvalidArgument)?;
        self.custom_method = Some(method.to_string());
        Ok(())
    }

    /// Method as it goes on the wire.
    pub fn method_str(&self) -> &str {
        self.custom_method
            .as_deref()
            .unwrap_or_else(|| self.method.as_str())
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Only HTTP/1.0 and HTTP/1.1 are accepted.
    pub fn set_version(&mut self, version: Version) -> Result<(), NetError> {
        self.check_mutable()?;
        if version != Version::HTTP_10 && version != Version::HTTP_11 {
            return Err(NetError::InvalidArgument);
        }
        self.version = version;
        Ok(())
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    /// Sets the target. Relative references are resolved against the
    /// session host when the transaction is submitted.
    pub fn set_uri(&mut self, uri: &str) -> Result<(), NetError> {
        self.check_mutable()?;
        if uri.trim().is_empty() || uri.chars().any(|c| c.is_control() || c == ' ') {
            return Err(NetError::InvalidArgument);
        }
        if Url::parse(uri).is_err() {
            let base = Url::parse("http://localhost/").map_err(|_| NetError::InvalidArgument)?;
            base.join(uri).map_err(|_| NetError::InvalidArgument)?;
        }
        self.uri = Some(uri.to_string());
        Ok(())
    }

    pub fn header(&self) -> &HttpHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> Result<&mut HttpHeader, NetError> {
        self.check_mutable()?;
        Ok(&mut self.header)
    }

    /// Queues body bytes.
    ///
    /// Before submit this appends to the body. After submit it is only
    /// allowed once per ready-to-write event; an empty write ends the upload.
    pub fn write_body(&mut self, data: impl Into<Bytes>) -> Result<(), NetError> {
        let data = data.into();
        if self.sealed {
            return match &self.upload {
                Some(upload) => upload.write(data),
                None => Err(NetError::InvalidState),
            };
        }
        if self.entity.is_some() {
            return Err(NetError::InvalidState);
        }
        if !data.is_empty() {
            self.body.push_back(data);
        }
        Ok(())
    }

    /// Attaches an entity as the body. Fails if bytes were already written.
    pub fn set_entity<E: HttpEntity + 'static>(&mut self, entity: E) -> Result<(), NetError> {
        self.check_mutable()?;
        if !self.body.is_empty() {
            return Err(NetError::InvalidState);
        }
        self.entity = Some(Box::new(entity));
        Ok(())
    }

    pub fn has_entity(&self) -> bool {
        self.entity.is_some()
    }

    pub(crate) fn has_body(&self) -> bool {
        self.entity.is_some() || !self.body.is_empty()
    }

    /// Length the body will have on the wire, `None` when an entity does
    /// not know its length.
    pub(crate) fn body_len(&self) -> Option<i64> {
        match &self.entity {
            Some(entity) => (entity.content_length() >= 0).then(|| entity.content_length()),
            None => Some(self.body.iter().map(|b| b.len() as i64).sum()),
        }
    }

    /// Removes and returns the oldest queued body chunk.
    pub fn read_body(&mut self) -> Result<Bytes, NetError> {
        self.body.pop_front().ok_or(NetError::EmptyBody)
    }

    pub fn cookie(&self) -> Option<&str> {
        self.cookie.as_deref()
    }

    /// Sets the `Cookie` header value. Only valid in manual cookie mode.
    pub fn set_cookie(&mut self, cookie: &str) -> Result<(), NetError> {
        self.check_mutable()?;
        if !self.manual_cookies {
            return Err(NetError::InvalidState);
        }
        HeaderValue::from_str(cookie).map_err(|_| NetError::InvalidArgument)?;
        self.cookie = Some(cookie.to_string());
        Ok(())
    }

    pub fn accept_encoding(&self) -> Option<&str> {
        self.accept_encoding.as_deref()
    }

    /// Restricts the response codings. `""` asks for every supported one.
    pub fn set_accept_encoding(&mut self, encoding: &str) -> Result<(), NetError> {
        self.check_mutable()?;
        if !encoding.trim().is_empty() {
            for coding in encoding.split(',') {
                let token = coding.split(';').next().unwrap_or("").trim();
                if !SUPPORTED_CODINGS
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case(token))
                {
                    return Err(NetError::InvalidArgument);
                }
            }
        }
        self.accept_encoding = Some(encoding.trim().to_string());
        Ok(())
    }

    /// Wire value for `Accept-Encoding`, if one should be sent.
    pub(crate) fn accept_encoding_value(&self) -> Option<&str> {
        match self.accept_encoding.as_deref() {
            Some("") => Some(ALL_CODINGS),
            other => other,
        }
    }

    pub(crate) fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Freezes the request and hands its body to the engine.
    pub(crate) fn seal(&mut self, upload: Option<UploadHandle>) -> RequestBody {
        self.sealed = true;
        self.upload = upload;
        if let Some(entity) = self.entity.take() {
            return RequestBody::Entity(entity);
        }
        if self.body.is_empty() {
            RequestBody::Empty
        } else {
            RequestBody::Buffered(self.body.drain(..).collect())
        }
    }

    /// Copy of the request metadata with a replayable body, used to build
    /// an authenticated retry.
    pub(crate) fn clone_for_retry(&self, body: Option<&[Bytes]>) -> Self {
        let mut copy = HttpRequest::new(self.manual_cookies);
        copy.method = self.method;
        copy.custom_method = self.custom_method.clone();
        copy.version = self.version;
        copy.uri = self.uri.clone();
        copy.header = self.header.clone();
        copy.cookie = self.cookie.clone();
        copy.accept_encoding = self.accept_encoding.clone();
        if let Some(parts) = body {
            copy.body = parts.iter().cloned().collect();
        }
        copy
    }
}
