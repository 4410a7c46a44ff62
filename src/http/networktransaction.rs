//! The engine side of a transaction: connect, write the request, read the
//! response, follow redirects. Pipelined sessions share one connection
//! through a writer task and a reader task.

use crate::base::loadstate::LoadState;
use crate::base::neterror::NetError;
use crate::cookies::httpcookie::HttpCookie;
use crate::http::auth::Challenge;
use crate::http::chunked::{encode_chunk, LAST_CHUNK};
use crate::http::contentdecoder::ContentDecoder;
use crate::http::entity::HttpEntity;
use crate::http::events::{ProgressEvent, TransactionEvent};
use crate::http::header::HttpHeader;
use crate::http::request::{RequestBody, UploadStream};
use crate::http::response::HttpResponse;
use crate::http::session::{CertVerificationPolicy, CookieFlag, SessionContext, SessionMode};
use crate::http::streamfactory::{origin_key, HttpStream};
use crate::http::transaction::{CertDecision, TransactionShared, TransactionState};
use crate::http::wire::{
    body_framing, encode_request_head, is_keep_alive, read_response_head, BodyReader, ResponseHead,
};
use crate::socket::connectjob::CertStatus;
use crate::socket::stream::BoxedSocket;
use bytes::Bytes;
use http::Version;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Instant;
use url::{Position, Url};

/// Largest body piece read from the socket at once.
const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Chunk size asked from entities and suggested to ready-to-write writers.
pub(crate) const UPLOAD_CHUNK_SIZE: usize = 8192;

const MAX_REDIRECTS: usize = 20;

/// Everything the engine needs to run a submitted transaction.
pub(crate) struct RequestJob {
    pub txn: Arc<TransactionShared>,
    pub url: Url,
    pub method: String,
    pub version: Version,
    pub header: HttpHeader,
    pub body: RequestBody,
    pub upload: Option<UploadStream>,
    pub cookie: Option<String>,
    /// `Accept-Encoding` wire value.
    pub accept_encoding: Option<String>,
    pub deadline: Option<Instant>,
}

impl RequestJob {
    fn is_replayable(&self) -> bool {
        self.upload.is_none() && self.body.is_replayable()
    }

    fn is_head(&self) -> bool {
        self.method.eq_ignore_ascii_case("HEAD")
    }

    fn decodes_content(&self) -> bool {
        !self
            .accept_encoding
            .as_deref()
            .map_or(false, |v| v.trim().eq_ignore_ascii_case("identity"))
    }
}

/// Internal state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    CreateStream,
    VerifyCertificate,
    SendRequest,
    ReadResponse,
    Done,
}

impl State {
    fn to_load_state(self) -> LoadState {
        match self {
            State::CreateStream => LoadState::Connecting,
            State::VerifyCertificate => LoadState::WaitingForCertificateDecision,
            State::SendRequest => LoadState::SendingRequest,
            State::ReadResponse => LoadState::WaitingForResponse,
            State::Done => LoadState::Idle,
        }
    }
}

/// Runs one transaction to its end on a dedicated connection (or the
/// session's idle one).
pub(crate) async fn run(job: RequestJob, ctx: Arc<SessionContext>) {
    let txn = job.txn.clone();
    let deadline = job.deadline;
    let mut network = NetworkTransaction::new(job, ctx);
    tokio::select! {
        _ = txn.cancelled() => {}
        result = with_deadline(deadline, network.start()) => {
            if let Err(e) = result {
                txn.abort(e);
            }
        }
    }
}

async fn with_deadline<F, T>(deadline: Option<Instant>, fut: F) -> Result<T, NetError>
where
    F: Future<Output = Result<T, NetError>>,
{
    match deadline {
        Some(at) => tokio::time::timeout_at(at, fut)
            .await
            .map_err(|_| NetError::TimedOut)?,
        None => fut.await,
    }
}

struct NetworkTransaction {
    job: RequestJob,
    ctx: Arc<SessionContext>,
    state: State,
    stream: Option<HttpStream>,
    cert: CertStatus,
    /// The stream came from a previous exchange and may have gone stale.
    reused: bool,
    /// Skip the idle connection on the next CreateStream.
    fresh_only: bool,
    keep_alive: bool,
    redirects: usize,
}

impl NetworkTransaction {
    fn new(job: RequestJob, ctx: Arc<SessionContext>) -> Self {
        Self {
            job,
            ctx,
            state: State::CreateStream,
            stream: None,
            cert: CertStatus::NotTls,
            reused: false,
            fresh_only: false,
            keep_alive: false,
            redirects: 0,
        }
    }

    async fn start(&mut self) -> Result<(), NetError> {
        self.do_loop().await
    }

    async fn do_loop(&mut self) -> Result<(), NetError> {
        loop {
            self.job.txn.set_load_state(self.state.to_load_state());
            match self.state {
                State::CreateStream => {
                    self.state = if self.acquire_stream().await? {
                        State::SendRequest
                    } else {
                        State::VerifyCertificate
                    };
                }
                State::VerifyCertificate => {
                    check_certificate(&self.ctx, &self.job.txn, &self.cert).await?;
                    self.state = State::SendRequest;
                }
                State::SendRequest => {
                    let stream = self.stream.as_mut().ok_or(NetError::InvalidState)?;
                    let sent = send_request(&mut stream.writer, &mut self.job, &self.ctx).await;
                    match sent {
                        Ok(()) => self.state = State::ReadResponse,
                        Err(e) if self.reused && self.job.is_replayable() => {
                            tracing::debug!(error = %e, "reused connection failed on write, reconnecting");
                            self.reconnect();
                        }
                        Err(e) => return Err(e),
                    }
                }
                State::ReadResponse => {
                    let stream = self.stream.as_mut().ok_or(NetError::InvalidState)?;
                    let received = receive_response(&mut stream.reader, &mut self.job, &self.ctx, true).await;
                    match received {
                        Ok(Received::Done { keep_alive }) => {
                            self.keep_alive = keep_alive;
                            self.state = State::Done;
                        }
                        Ok(Received::Redirect {
                            location,
                            status,
                            keep_alive,
                        }) => {
                            self.redirects += 1;
                            if self.redirects > MAX_REDIRECTS {
                                return Err(NetError::TooManyRedirects);
                            }
                            tracing::debug!(status, location = %location, "following redirect");
                            if !keep_alive {
                                self.stream = None;
                            }
                            apply_redirect(&mut self.job, status, location);
                            self.reused = self.stream.is_some();
                            self.state = State::CreateStream;
                        }
                        Err(e)
                            if self.reused
                                && self.job.is_replayable()
                                && matches!(
                                    e,
                                    NetError::EmptyResponse
                                        | NetError::ConnectionClosed
                                        | NetError::ConnectionReset
                                ) =>
                        {
                            tracing::debug!(error = %e, "reused connection was closed, reconnecting");
                            self.reconnect();
                        }
                        Err(e) => return Err(e),
                    }
                }
                State::Done => {
                    if let Some(stream) = self.stream.take() {
                        if self.keep_alive {
                            *self.ctx.idle.lock().await = Some(stream);
                        }
                    }
                    self.job.txn.complete();
                    return Ok(());
                }
            }
        }
    }

    fn reconnect(&mut self) {
        self.stream = None;
        self.reused = false;
        self.fresh_only = true;
        self.state = State::CreateStream;
    }

    /// Gets a connection for the job's origin. Returns true when an
    /// existing connection is reused and needs no certificate check.
    async fn acquire_stream(&mut self) -> Result<bool, NetError> {
        let origin = origin_key(&self.job.url);
        if self.stream.as_ref().map_or(false, |s| s.origin != origin) {
            self.stream = None;
        }
        if self.stream.is_none() && !self.fresh_only {
            let mut idle = self.ctx.idle.lock().await;
            if idle.as_ref().map_or(false, |s| s.origin == origin) {
                self.stream = idle.take();
            }
        }
        if self.stream.is_some() {
            self.reused = true;
            return Ok(true);
        }

        let txn = self.job.txn.clone();
        let (stream, cert) = self
            .ctx
            .factory
            .create_stream(&self.job.url, &move |s| txn.set_load_state(s))
            .await?;
        self.stream = Some(stream);
        self.cert = cert;
        self.reused = false;
        self.fresh_only = false;
        Ok(false)
    }
}

/// Applies the session's certificate policy to a fresh connection.
async fn check_certificate(
    ctx: &SessionContext,
    txn: &TransactionShared,
    cert: &CertStatus,
) -> Result<(), NetError> {
    let (pem, trusted) = match cert {
        CertStatus::NotTls => return Ok(()),
        CertStatus::Verified(pem) => (pem, true),
        CertStatus::Untrusted(pem) => (pem, false),
    };
    let ask = match ctx.cert_policy {
        CertVerificationPolicy::Ignored => false,
        CertVerificationPolicy::Automatic => !trusted,
        CertVerificationPolicy::Manual => true,
    };
    if !ask {
        return Ok(());
    }

    txn.reset_cert_decision();
    txn.set_state(TransactionState::CertVerificationRequired);
    txn.set_load_state(LoadState::WaitingForCertificateDecision);
    txn.emit(TransactionEvent::CertVerificationRequired {
        certificate: pem.clone(),
    });
    match txn.cert_decision().await {
        CertDecision::Resume => {
            txn.set_state(TransactionState::Submitted);
            Ok(())
        }
        _ => Err(NetError::ServerCertUntrusted),
    }
}

/// How the request body goes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadFraming {
    None,
    Length(u64),
    Chunked,
}

fn has_field(fields: &[(String, String)], name: &str) -> bool {
    fields.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
}

/// Request target: absolute form for plain http through a proxy,
/// origin form otherwise.
fn request_target(url: &Url, via_proxy: bool) -> String {
    if via_proxy && url.scheme() == "http" {
        url[..Position::AfterQuery].to_string()
    } else {
        url[Position::BeforePath..Position::AfterQuery].to_string()
    }
}

/// Header fields in wire order plus the body framing.
fn build_head(job: &RequestJob, ctx: &SessionContext) -> Result<(Vec<(String, String)>, UploadFraming), NetError> {
    let mut fields: Vec<(String, String)> = Vec::new();
    for (name, value) in ctx.common_header.iter() {
        if !job.header.contains_ignore_case(name) {
            fields.push((name.to_string(), value.to_string()));
        }
    }
    fields.extend(job.header.iter().map(|(n, v)| (n.to_string(), v.to_string())));

    if !has_field(&fields, "Host") {
        let host = &job.url[Position::BeforeHost..Position::AfterPort];
        fields.push(("Host".to_string(), host.to_string()));
    }

    let cookie = match ctx.cookie_flag {
        CookieFlag::AutomaticCookies => ctx.jar.cookie_header(&job.url),
        CookieFlag::ManualCookies => job.cookie.clone(),
        CookieFlag::None => None,
    };
    if let Some(cookie) = cookie.filter(|c| !c.is_empty()) {
        if !has_field(&fields, "Cookie") {
            fields.push(("Cookie".to_string(), cookie));
        }
    }

    if let Some(encoding) = &job.accept_encoding {
        if !has_field(&fields, "Accept-Encoding") {
            fields.push(("Accept-Encoding".to_string(), encoding.clone()));
        }
    }

    if let Some(proxy) = ctx.factory.proxy() {
        if job.url.scheme() == "http" && !has_field(&fields, "Proxy-Authorization") {
            if let Some(auth) = proxy.auth_header() {
                fields.push(("Proxy-Authorization".to_string(), auth));
            }
        }
    }

    let mut framing = match &job.body {
        RequestBody::Buffered(parts) => {
            UploadFraming::Length(parts.iter().map(|p| p.len() as u64).sum())
        }
        RequestBody::Entity(entity) => {
            if !has_field(&fields, "Content-Type") {
                fields.push(("Content-Type".to_string(), entity.content_type()));
            }
            match u64::try_from(entity.content_length()) {
                Ok(len) => UploadFraming::Length(len),
                Err(_) => UploadFraming::Chunked,
            }
        }
        RequestBody::Empty if job.upload.is_some() => UploadFraming::Chunked,
        RequestBody::Empty
            if job.method.eq_ignore_ascii_case("POST") || job.method.eq_ignore_ascii_case("PUT") =>
        {
            UploadFraming::Length(0)
        }
        RequestBody::Empty => UploadFraming::None,
    };
    if has_field(&fields, "Transfer-Encoding") {
        framing = UploadFraming::Chunked;
    }

    match framing {
        UploadFraming::Chunked => {
            if job.version == Version::HTTP_10 {
                return Err(NetError::InvalidArgument);
            }
            if !has_field(&fields, "Transfer-Encoding") {
                fields.push(("Transfer-Encoding".to_string(), "chunked".to_string()));
            }
        }
        UploadFraming::Length(len) => {
            if !has_field(&fields, "Content-Length") {
                fields.push(("Content-Length".to_string(), len.to_string()));
            }
        }
        UploadFraming::None => {}
    }
    Ok((fields, framing))
}

async fn send_request<W>(writer: &mut W, job: &mut RequestJob, ctx: &SessionContext) -> Result<(), NetError>
where
    W: AsyncWrite + Unpin,
{
    let (fields, framing) = build_head(job, ctx)?;
    let target = request_target(&job.url, ctx.factory.proxy().is_some());
    job.txn.set_load_state(LoadState::SendingRequest);
    let head = encode_request_head(&job.method, &target, job.version, &fields);
    writer.write_all(&head).await?;

    let chunked = framing == UploadFraming::Chunked;
    let total = match framing {
        UploadFraming::Length(len) => len as i64,
        _ => -1,
    };
    let mut sent: i64 = 0;

    if let RequestBody::Buffered(parts) = &job.body {
        for part in parts.iter().filter(|p| !p.is_empty()) {
            write_body_part(writer, part, chunked).await?;
            sent += part.len() as i64;
            job.txn.emit_progress(ProgressEvent::Upload { current: sent, total });
        }
    }
    if matches!(job.body, RequestBody::Entity(_)) {
        if let RequestBody::Entity(entity) = std::mem::replace(&mut job.body, RequestBody::Empty) {
            sent = send_entity(writer, entity, &job.txn, chunked, total).await?;
        }
    }

    if let Some(upload) = job.upload.as_mut() {
        writer.flush().await?;
        loop {
            upload.grant();
            job.txn.emit(TransactionEvent::ReadyToWrite {
                recommended_chunk_size: UPLOAD_CHUNK_SIZE,
            });
            let chunk = upload.next().await.ok_or(NetError::OperationCanceled)?;
            if chunk.is_empty() {
                break;
            }
            write_body_part(writer, &chunk, true).await?;
            writer.flush().await?;
            sent += chunk.len() as i64;
            job.txn.emit_progress(ProgressEvent::Upload { current: sent, total: -1 });
        }
    }

    if chunked {
        writer.write_all(LAST_CHUNK).await?;
    }
    writer.flush().await?;
    Ok(())
}

/// Streams an entity; a declared length must match what it produced.
async fn send_entity<W>(
    writer: &mut W,
    mut entity: Box<dyn HttpEntity>,
    txn: &TransactionShared,
    chunked: bool,
    total: i64,
) -> Result<i64, NetError>
where
    W: AsyncWrite + Unpin,
{
    let mut sent: i64 = 0;
    loop {
        let (returned, chunk) = pull_entity(entity).await?;
        entity = returned;
        let Some(chunk) = chunk else { break };
        if chunk.is_empty() {
            continue;
        }
        write_body_part(writer, &chunk, chunked).await?;
        sent += chunk.len() as i64;
        txn.emit_progress(ProgressEvent::Upload { current: sent, total });
    }
    if total >= 0 && sent != total {
        tracing::debug!(declared = total, produced = sent, "entity length mismatch");
        return Err(NetError::InvalidContent);
    }
    Ok(sent)
}

async fn write_body_part<W>(writer: &mut W, data: &[u8], chunked: bool) -> Result<(), NetError>
where
    W: AsyncWrite + Unpin,
{
    if chunked {
        writer.write_all(&encode_chunk(data)).await?;
    } else {
        writer.write_all(data).await?;
    }
    Ok(())
}

/// Pulls one chunk on the blocking pool; entities may do file I/O.
async fn pull_entity(
    mut entity: Box<dyn HttpEntity>,
) -> Result<(Box<dyn HttpEntity>, Option<Bytes>), NetError> {
    let (entity, chunk) = tokio::task::spawn_blocking(move || {
        let chunk = match entity.has_next_data() {
            Ok(true) => entity.next_data(UPLOAD_CHUNK_SIZE).map(Some),
            Ok(false) => Ok(None),
            Err(e) => Err(e),
        };
        (entity, chunk)
    })
    .await
    .map_err(|_| NetError::System)?;
    Ok((entity, chunk?))
}

enum Received {
    Done { keep_alive: bool },
    Redirect { location: Url, status: u16, keep_alive: bool },
}

/// Parses `Set-Cookie` lines and stores them in the jar in automatic mode.
fn collect_cookies(head: &ResponseHead, url: &Url, ctx: &SessionContext) -> Vec<HttpCookie> {
    let mut cookies = Vec::new();
    for line in head.header.values_ignore_case("Set-Cookie") {
        match HttpCookie::parse(url, line) {
            Ok(cookie) => {
                if ctx.cookie_flag == CookieFlag::AutomaticCookies {
                    ctx.jar.set_cookie(cookie.clone());
                }
                cookies.push(cookie);
            }
            Err(e) => tracing::debug!(line = %line, error = %e, "rejected Set-Cookie"),
        }
    }
    cookies
}

fn redirect_target(head: &ResponseHead, job: &RequestJob, ctx: &SessionContext) -> Option<Url> {
    if !ctx.auto_redirect.load(Ordering::SeqCst) || ctx.mode == SessionMode::Pipelining {
        return None;
    }
    if !matches!(head.status, 301 | 302 | 303 | 307 | 308) || !job.is_replayable() {
        return None;
    }
    let location = head.header.first_value_ignore_case("Location")?;
    let next = job.url.join(location.trim()).ok()?;
    matches!(next.scheme(), "http" | "https").then_some(next)
}

/// Rewrites the job for the next hop of a redirect.
fn apply_redirect(job: &mut RequestJob, status: u16, location: Url) {
    let method_changes = (status == 303 && !job.is_head())
        || (matches!(status, 301 | 302) && job.method.eq_ignore_ascii_case("POST"));
    if method_changes {
        job.method = "GET".to_string();
        job.body = RequestBody::Empty;
        for name in ["Content-Type", "Content-Length", "Transfer-Encoding"] {
            job.header.remove_ignore_case(name);
        }
    }
    if origin_key(&location) != origin_key(&job.url) {
        job.header.remove_ignore_case("Authorization");
    }
    job.url = location;
}

/// Reads one response. With `follow_redirects`, a redirect is drained and
/// handed back instead of being delivered to the application.
async fn receive_response<R>(
    reader: &mut R,
    job: &mut RequestJob,
    ctx: &SessionContext,
    follow_redirects: bool,
) -> Result<Received, NetError>
where
    R: AsyncBufRead + Unpin,
{
    job.txn.set_load_state(LoadState::WaitingForResponse);
    let head = loop {
        let head = read_response_head(reader).await?;
        if !head.is_interim() {
            break head;
        }
        tracing::trace!(status = head.status, "skipping interim response");
    };
    let framing = body_framing(job.is_head(), &head)?;
    let keep_alive = is_keep_alive(&head, framing);
    let cookies = collect_cookies(&head, &job.url, ctx);
    tracing::debug!(status = head.status, framing = ?framing, keep_alive, "response head received");

    if follow_redirects {
        if let Some(location) = redirect_target(&head, job, ctx) {
            let mut body = BodyReader::new(framing);
            while body.next_chunk(reader, READ_CHUNK_SIZE).await?.is_some() {}
            return Ok(Received::Redirect {
                location,
                status: head.status,
                keep_alive,
            });
        }
    }

    let auth_required = matches!(head.status, 401 | 407);
    if auth_required {
        job.txn.set_challenge(Challenge::from_response(head.status, &head.header));
    }

    let response = HttpResponse::from_head(&head, cookies);
    job.txn.set_response(response.clone());
    job.txn.set_state(TransactionState::HeaderReceived);
    job.txn.emit(TransactionEvent::HeaderCompleted {
        header_len: head.raw_len,
        auth_required,
    });

    job.txn.set_load_state(LoadState::ReadingResponse);
    let mut decoder = if job.decodes_content() {
        ContentDecoder::for_encoding(head.header.first_value_ignore_case("Content-Encoding"))
    } else {
        ContentDecoder::Identity
    };
    let mut body = BodyReader::new(framing);
    let total = match (decoder.is_identity(), body.content_length()) {
        (true, Some(len)) => len as i64,
        _ => -1,
    };
    let mut delivered: i64 = 0;

    let deliver = |data: Bytes, delivered: &mut i64| {
        if data.is_empty() {
            return;
        }
        job.txn.set_state(TransactionState::BodyStreaming);
        *delivered += data.len() as i64;
        let available = response.push_body(data);
        job.txn.emit(TransactionEvent::ReadyToRead {
            available_body_len: available,
        });
        job.txn.emit_progress(ProgressEvent::Download {
            current: *delivered,
            total,
        });
    };

    while let Some(chunk) = body.next_chunk(reader, READ_CHUNK_SIZE).await? {
        deliver(decoder.decode(chunk)?, &mut delivered);
    }
    deliver(decoder.finish()?, &mut delivered);
    response.mark_complete();
    Ok(Received::Done { keep_alive })
}

/// Connection shared by a pipelined session.
struct PipelineConn {
    writer: WriteHalf<BoxedSocket>,
    inflight: mpsc::UnboundedSender<RequestJob>,
    broken: Arc<AtomicBool>,
}

/// Starts the pipeline writer. Jobs sent to the returned channel go out
/// on one connection in submission order; responses are matched FIFO.
pub(crate) fn spawn_pipeline(ctx: Arc<SessionContext>, handle: &Handle) -> mpsc::UnboundedSender<RequestJob> {
    let (tx, rx) = mpsc::unbounded_channel();
    handle.spawn(pipeline_writer(ctx, rx));
    tx
}

async fn pipeline_writer(ctx: Arc<SessionContext>, mut jobs: mpsc::UnboundedReceiver<RequestJob>) {
    let mut conn: Option<PipelineConn> = None;
    while let Some(mut job) = jobs.recv().await {
        if job.txn.state().is_terminal() {
            continue;
        }
        if conn.as_ref().map_or(true, |c| c.broken.load(Ordering::SeqCst)) {
            conn = None;
            match open_pipeline(&ctx, &job.txn, &job.url, job.deadline).await {
                Ok(c) => conn = Some(c),
                Err(e) => {
                    job.txn.abort(e);
                    continue;
                }
            }
        }
        let Some(c) = conn.as_mut() else { continue };

        let deadline = job.deadline;
        match with_deadline(deadline, send_request(&mut c.writer, &mut job, &ctx)).await {
            Ok(()) => {
                job.txn.set_load_state(LoadState::WaitingForResponse);
                if let Err(mpsc::error::SendError(job)) = c.inflight.send(job) {
                    c.broken.store(true, Ordering::SeqCst);
                    job.txn.abort(NetError::ConnectionReset);
                }
            }
            Err(e) => {
                c.broken.store(true, Ordering::SeqCst);
                job.txn.abort(e);
            }
        }
    }
    tracing::debug!("pipeline writer finished");
}

async fn open_pipeline(
    ctx: &Arc<SessionContext>,
    job_txn: &Arc<TransactionShared>,
    job_url: &Url,
    job_deadline: Option<Instant>,
) -> Result<PipelineConn, NetError> {
    let txn = job_txn.clone();
    let (stream, cert) = with_deadline(
        job_deadline,
        ctx.factory
            .create_stream(job_url, &move |s| txn.set_load_state(s)),
    )
    .await?;
    check_certificate(ctx, job_txn, &cert).await?;

    let (reader, writer) = stream.into_parts();
    let (inflight, pending) = mpsc::unbounded_channel();
    let broken = Arc::new(AtomicBool::new(false));
    tokio::spawn(pipeline_reader(ctx.clone(), reader, pending, broken.clone()));
    Ok(PipelineConn {
        writer,
        inflight,
        broken,
    })
}

/// Aborts a pipelined transaction with `TimedOut` once `at` passes, even
/// while it is still queued behind earlier responses.
pub(crate) fn arm_pipeline_deadline(txn: Arc<TransactionShared>, at: Instant, handle: &Handle) {
    handle.spawn(async move {
        tokio::select! {
            _ = txn.cancelled() => {}
            _ = tokio::time::sleep_until(at) => txn.abort(NetError::TimedOut),
        }
    });
}

/// Reads responses in request order. Deadlines are enforced by
/// [`arm_pipeline_deadline`]; a response whose transaction already ended is
/// still read off the connection, with its events suppressed, so the
/// following responses stay framed.
async fn pipeline_reader(
    ctx: Arc<SessionContext>,
    mut reader: BufReader<ReadHalf<BoxedSocket>>,
    mut inflight: mpsc::UnboundedReceiver<RequestJob>,
    broken: Arc<AtomicBool>,
) {
    while let Some(mut job) = inflight.recv().await {
        let txn = job.txn.clone();
        match receive_response(&mut reader, &mut job, &ctx, false).await {
            Ok(Received::Done { keep_alive }) => {
                txn.complete();
                if !keep_alive {
                    break;
                }
            }
            Ok(Received::Redirect { .. }) => {
                txn.complete();
            }
            Err(e) => {
                txn.abort(e);
                break;
            }
        }
    }

    broken.store(true, Ordering::SeqCst);
    inflight.close();
    while let Ok(job) = inflight.try_recv() {
        job.txn.abort(NetError::ConnectionReset);
    }
}
