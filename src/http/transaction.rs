//! One request/response exchange.
//!
//! An [`HttpTransaction`] owns its request until [`submit`](HttpTransaction::submit),
//! then the engine task drives the exchange and reports progress through
//! the subscriptions. The state shared with the engine lives in
//! [`TransactionShared`].

use crate::base::loadstate::LoadState;
use crate::base::neterror::NetError;
use crate::http::auth::{Challenge, HttpAuthentication};
use crate::http::events::{ProgressEvent, ProgressEvents, TransactionEvent, TransactionEvents};
use crate::http::networktransaction::RequestJob;
use crate::http::request::{upload_channel, HttpMethod, HttpRequest, RequestBody};
use crate::http::response::HttpResponse;
use crate::http::session::{SessionMode, SessionShared};
use crate::http::streamfactory::origin_key;
use bytes::Bytes;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use url::Url;

/// Lifecycle of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Created; the request can still be changed.
    Idle,
    Submitted,
    /// Suspended until `resume()` or `pause()` decides on the server certificate.
    CertVerificationRequired,
    HeaderReceived,
    BodyStreaming,
    Completed,
    Aborted,
    Cancelled,
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Completed | TransactionState::Aborted | TransactionState::Cancelled
        )
    }

    /// Submitted and not finished yet.
    pub fn is_active(&self) -> bool {
        !self.is_terminal() && *self != TransactionState::Idle
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CertDecision {
    Pending,
    Resume,
    Pause,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// State the application handle and the engine task both see.
///
/// Lock order is `state` before `listeners`/`progress`. Once the state is
/// terminal no event is delivered anymore.
pub(crate) struct TransactionShared {
    id: u64,
    state: Mutex<TransactionState>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<TransactionEvent>>>,
    progress: Mutex<Vec<mpsc::UnboundedSender<ProgressEvent>>>,
    response: Mutex<Option<HttpResponse>>,
    challenge: Mutex<Option<Challenge>>,
    load_state: Mutex<LoadState>,
    cancel: watch::Sender<bool>,
    cert_decision: watch::Sender<CertDecision>,
    /// Set when the session dropped the transaction from its table.
    detached: AtomicBool,
}

impl std::fmt::Debug for TransactionShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionShared")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl TransactionShared {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            state: Mutex::new(TransactionState::Idle),
            listeners: Mutex::new(Vec::new()),
            progress: Mutex::new(Vec::new()),
            response: Mutex::new(None),
            challenge: Mutex::new(None),
            load_state: Mutex::new(LoadState::Idle),
            cancel: watch::channel(false).0,
            cert_decision: watch::channel(CertDecision::Pending).0,
            detached: AtomicBool::new(false),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn state(&self) -> TransactionState {
        *lock(&self.state)
    }

    /// Moves to a non-terminal state unless the transaction already finished.
    pub(crate) fn set_state(&self, next: TransactionState) {
        let mut state = lock(&self.state);
        if !state.is_terminal() {
            *state = next;
        }
    }

    pub(crate) fn load_state(&self) -> LoadState {
        *lock(&self.load_state)
    }

    pub(crate) fn set_load_state(&self, next: LoadState) {
        if !self.state().is_terminal() {
            *lock(&self.load_state) = next;
        }
    }

    pub(crate) fn emit(&self, event: TransactionEvent) {
        let state = lock(&self.state);
        if state.is_terminal() {
            return;
        }
        lock(&self.listeners).retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub(crate) fn emit_progress(&self, event: ProgressEvent) {
        let state = lock(&self.state);
        if state.is_terminal() {
            return;
        }
        lock(&self.progress).retain(|tx| tx.send(event).is_ok());
    }

    pub(crate) fn complete(&self) {
        self.finish(TransactionState::Completed, TransactionEvent::Completed);
    }

    pub(crate) fn abort(&self, error: NetError) {
        tracing::debug!(id = self.id, error = %error, "transaction aborted");
        self.finish(TransactionState::Aborted, TransactionEvent::Aborted(error));
    }

    /// Delivers the terminal event and closes every subscription.
    fn finish(&self, next: TransactionState, event: TransactionEvent) {
        let mut state = lock(&self.state);
        if state.is_terminal() {
            return;
        }
        *state = next;
        for tx in lock(&self.listeners).drain(..) {
            let _ = tx.send(event.clone());
        }
        lock(&self.progress).clear();
        *lock(&self.load_state) = LoadState::Idle;
    }

    /// Stops the exchange. Subscriptions end without a terminal event.
    pub(crate) fn cancel(&self) -> Result<(), NetError> {
        let mut state = lock(&self.state);
        match *state {
            TransactionState::Idle => return Err(NetError::InvalidState),
            TransactionState::Cancelled => return Err(NetError::OperationCanceled),
            s if s.is_terminal() => return Err(NetError::InvalidState),
            _ => {}
        }
        *state = TransactionState::Cancelled;
        lock(&self.listeners).clear();
        lock(&self.progress).clear();
        *lock(&self.load_state) = LoadState::Idle;
        self.cancel.send_replace(true);
        tracing::debug!(id = self.id, "transaction cancelled");
        Ok(())
    }

    /// Resolves once the transaction has been cancelled.
    pub(crate) async fn cancelled(&self) {
        let mut rx = self.cancel.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    pub(crate) fn reset_cert_decision(&self) {
        self.cert_decision.send_replace(CertDecision::Pending);
    }

    pub(crate) async fn cert_decision(&self) -> CertDecision {
        let mut rx = self.cert_decision.subscribe();
        let decision = match rx.wait_for(|d| *d != CertDecision::Pending).await {
            Ok(d) => *d,
            Err(_) => CertDecision::Pause,
        };
        decision
    }

    fn decide_cert(&self, decision: CertDecision) -> Result<(), NetError> {
        if self.state() != TransactionState::CertVerificationRequired {
            return Err(NetError::InvalidState);
        }
        self.cert_decision.send_replace(decision);
        Ok(())
    }

    /// Ignored once the transaction ended, so a response drained after a
    /// timeout never shows up on the handle.
    pub(crate) fn set_response(&self, response: HttpResponse) {
        let state = lock(&self.state);
        if !state.is_terminal() {
            *lock(&self.response) = Some(response);
        }
    }

    pub(crate) fn set_challenge(&self, challenge: Option<Challenge>) {
        let state = lock(&self.state);
        if !state.is_terminal() {
            *lock(&self.challenge) = challenge;
        }
    }

    pub(crate) fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }

    fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> TransactionEvents {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = lock(&self.state);
        // A finished transaction hands out a subscription that is already closed.
        if !state.is_terminal() {
            lock(&self.listeners).push(tx);
        }
        TransactionEvents::new(rx)
    }

    fn subscribe_progress(&self) -> ProgressEvents {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = lock(&self.state);
        if !state.is_terminal() {
            lock(&self.progress).push(tx);
        }
        ProgressEvents::new(rx)
    }
}

/// Handle to one exchange, owned by the application.
///
/// Dropping the handle closes the transaction and cancels it if it is
/// still running.
pub struct HttpTransaction {
    shared: Arc<TransactionShared>,
    session: Weak<SessionShared>,
    request: HttpRequest,
    timeout: Option<Duration>,
    ready_to_write: bool,
    client_certificate: Option<i32>,
    user_object: Option<Arc<dyn Any + Send + Sync>>,
    resolved_url: Option<Url>,
    /// Copy of a buffered body, kept for authenticated retries.
    retry_body: Option<Vec<Bytes>>,
}

impl std::fmt::Debug for HttpTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransaction")
            .field("id", &self.shared.id)
            .field("state", &self.shared.state())
            .field("request", &self.request)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpTransaction {
    pub(crate) fn new(shared: Arc<TransactionShared>, session: Weak<SessionShared>, manual_cookies: bool) -> Self {
        Self {
            shared,
            session,
            request: HttpRequest::new(manual_cookies),
            timeout: None,
            ready_to_write: false,
            client_certificate: None,
            user_object: None,
            resolved_url: None,
            retry_body: None,
        }
    }

    pub(crate) fn shared(&self) -> &Arc<TransactionShared> {
        &self.shared
    }

    pub(crate) fn belongs_to(&self, session: &Arc<SessionShared>) -> bool {
        self.session
            .upgrade()
            .map_or(false, |own| Arc::ptr_eq(&own, session))
    }

    pub(crate) fn replace_request(&mut self, request: HttpRequest) {
        self.request = request;
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut HttpRequest {
        &mut self.request
    }

    /// The response, once its header block has been received.
    pub fn response(&self) -> Option<HttpResponse> {
        lock(&self.shared.response).clone()
    }

    pub fn state(&self) -> TransactionState {
        self.shared.state()
    }

    pub fn load_state(&self) -> LoadState {
        self.shared.load_state()
    }

    pub fn set_user_object(&mut self, object: Arc<dyn Any + Send + Sync>) {
        self.user_object = Some(object);
    }

    pub fn user_object(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.user_object.as_ref()
    }

    /// New subscription to this transaction's events.
    pub fn subscribe(&self) -> TransactionEvents {
        self.shared.subscribe()
    }

    pub fn subscribe_progress(&self) -> ProgressEvents {
        self.shared.subscribe_progress()
    }

    fn check_idle(&self) -> Result<(), NetError> {
        if self.shared.state() != TransactionState::Idle {
            return Err(NetError::InvalidState);
        }
        Ok(())
    }

    /// Streams the request body through `ReadyToWrite` events instead of
    /// requiring it up front. The body goes out chunked.
    pub fn enable_transaction_ready_to_write(&mut self) -> Result<(), NetError> {
        self.check_idle()?;
        self.ready_to_write = true;
        Ok(())
    }

    pub fn is_ready_to_write_enabled(&self) -> bool {
        self.ready_to_write
    }

    /// Records the client certificate id to present. Stored only; client
    /// certificate authentication is not performed.
    pub fn set_client_certificate(&mut self, certificate_id: i32) -> Result<(), NetError> {
        self.check_idle()?;
        if certificate_id < 0 {
            return Err(NetError::InvalidArgument);
        }
        self.client_certificate = Some(certificate_id);
        Ok(())
    }

    pub fn client_certificate(&self) -> Option<i32> {
        self.client_certificate
    }

    /// Bounds the whole exchange. `0` removes the limit.
    pub fn set_timeout(&mut self, seconds: i64) -> Result<(), NetError> {
        self.check_idle()?;
        if seconds < 0 {
            return Err(NetError::InvalidArgument);
        }
        self.timeout = (seconds > 0).then(|| Duration::from_secs(seconds as u64));
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Accepts the server certificate and continues the exchange.
    pub fn resume(&self) -> Result<(), NetError> {
        self.shared.decide_cert(CertDecision::Resume)
    }

    /// Rejects the server certificate; the transaction aborts with
    /// `ServerCertUntrusted`.
    pub fn pause(&self) -> Result<(), NetError> {
        self.shared.decide_cert(CertDecision::Pause)
    }

    /// Opens the authentication context for the challenge this transaction
    /// received. Fails with `InvalidState` when there was none.
    pub fn open_authentication_info(&self) -> Result<HttpAuthentication, NetError> {
        let challenge = lock(&self.shared.challenge)
            .clone()
            .ok_or(NetError::InvalidState)?;
        let target = self.resolved_url.clone().ok_or(NetError::InvalidState)?;
        Ok(HttpAuthentication::new(
            challenge,
            self.session.clone(),
            &self.request,
            self.retry_body.as_deref(),
            target,
        ))
    }

    /// Hands the request to the engine.
    ///
    /// Validation failures are returned here; anything that happens on the
    /// network is reported through the subscriptions. Must be called from
    /// within a Tokio runtime.
    pub fn submit(&mut self) -> Result<(), NetError> {
        let session = self.session.upgrade().ok_or(NetError::InvalidSession)?;
        if session.is_closed() {
            return Err(NetError::InvalidSession);
        }
        if self.shared.is_detached() {
            return Err(NetError::InvalidTransaction);
        }
        self.check_idle()?;

        let ctx = session.context().clone();
        let url = self.resolve_target(&session)?;
        self.validate_body()?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| NetError::System)?;

        {
            let _admission = lock(session.admission());
            let active = session.active_count();
            if active >= session.max_transactions() {
                return Err(NetError::MaxExceeded);
            }
            if ctx.mode == SessionMode::Normal && active > 0 {
                return Err(NetError::InvalidOperation);
            }

            let (upload_handle, upload) = if self.ready_to_write {
                let (h, s) = upload_channel();
                (Some(h), Some(s))
            } else {
                (None, None)
            };
            let body = self.request.seal(upload_handle);
            self.retry_body = match &body {
                RequestBody::Empty => Some(Vec::new()),
                RequestBody::Buffered(parts) => Some(parts.clone()),
                RequestBody::Entity(_) => None,
            };
            self.resolved_url = Some(url.clone());
            self.shared.set_state(TransactionState::Submitted);
            self.shared.set_challenge(None);

            let job = RequestJob {
                txn: self.shared.clone(),
                url,
                method: self.request.method_str().to_string(),
                version: self.request.version(),
                header: self.request.header().clone(),
                body,
                upload,
                cookie: self.request.cookie().map(str::to_string),
                accept_encoding: self.request.accept_encoding_value().map(str::to_string),
                deadline: self.timeout.map(|t| tokio::time::Instant::now() + t),
            };
            tracing::debug!(id = self.shared.id, method = %job.method, url = %job.url, "submitting");
            session.dispatch(job, &runtime);
        }
        Ok(())
    }

    fn resolve_target(&self, session: &SessionShared) -> Result<Url, NetError> {
        let ctx = session.context();
        let uri = self.request.uri().ok_or(NetError::InvalidArgument)?;
        let url = match Url::parse(uri) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => ctx
                .host
                .as_ref()
                .ok_or(NetError::InvalidArgument)?
                .join(uri)
                .map_err(|_| NetError::InvalidArgument)?,
            Err(_) => return Err(NetError::InvalidArgument),
        };
        if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
            return Err(NetError::InvalidArgument);
        }
        if ctx.mode != SessionMode::MultipleHost {
            if let Some(host) = &ctx.host {
                if origin_key(host) != origin_key(&url) {
                    return Err(NetError::InvalidArgument);
                }
            }
        }
        Ok(url)
    }

    fn validate_body(&self) -> Result<(), NetError> {
        let request = &self.request;
        let needs_body = matches!(request.method(), HttpMethod::Post | HttpMethod::Put)
            && request.custom_method().is_none();
        if needs_body && !request.has_body() && !self.ready_to_write {
            return Err(NetError::EmptyBody);
        }

        let header = request.header();
        if let Some(te) = header.first_value_ignore_case("Transfer-Encoding") {
            if !te.trim().eq_ignore_ascii_case("chunked") {
                return Err(NetError::InvalidHeader);
            }
        }
        if let Some(cl) = header.first_value_ignore_case("Content-Length") {
            let declared: i64 = cl.trim().parse().map_err(|_| NetError::InvalidHeader)?;
            if self.ready_to_write || request.body_len() != Some(declared) {
                return Err(NetError::InvalidHeader);
            }
        }
        Ok(())
    }
}

impl Drop for HttpTransaction {
    fn drop(&mut self) {
        if let Some(session) = self.session.upgrade() {
            session.forget(self.shared.id);
        }
        if self.shared.state().is_active() {
            let _ = self.shared.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_classification() {
        assert!(!TransactionState::Idle.is_active());
        assert!(TransactionState::Submitted.is_active());
        assert!(TransactionState::CertVerificationRequired.is_active());
        assert!(TransactionState::Cancelled.is_terminal());
        assert!(!TransactionState::Completed.is_active());
    }

    #[tokio::test]
    async fn test_terminal_event_closes_subscriptions() {
        let shared = TransactionShared::new(1);
        let mut events = shared.subscribe();
        let mut progress = shared.subscribe_progress();
        shared.set_state(TransactionState::Submitted);

        shared.emit(TransactionEvent::ReadyToRead {
            available_body_len: 3,
        });
        shared.emit_progress(ProgressEvent::Download { current: 3, total: 3 });
        shared.complete();
        shared.emit(TransactionEvent::Completed);

        assert!(matches!(
            events.next_event().await,
            Some(TransactionEvent::ReadyToRead { available_body_len: 3 })
        ));
        assert_eq!(events.next_event().await, Some(TransactionEvent::Completed));
        assert_eq!(events.next_event().await, None);
        assert!(progress.next_event().await.is_some());
        assert_eq!(progress.next_event().await, None);

        // Late subscribers see a closed stream
        let mut late = shared.subscribe();
        assert_eq!(late.next_event().await, None);
    }

    #[tokio::test]
    async fn test_cancel_rules() {
        let shared = TransactionShared::new(2);
        assert_eq!(shared.cancel(), Err(NetError::InvalidState));

        shared.set_state(TransactionState::Submitted);
        let mut events = shared.subscribe();
        shared.cancel().unwrap();
        assert_eq!(shared.cancel(), Err(NetError::OperationCanceled));
        assert_eq!(events.next_event().await, None);
        shared.cancelled().await;

        // Abort after cancel is ignored
        shared.abort(NetError::TimedOut);
        assert_eq!(shared.state(), TransactionState::Cancelled);
    }

    #[tokio::test]
    async fn test_cert_decision() {
        let shared = Arc::new(TransactionShared::new(3));
        shared.set_state(TransactionState::Submitted);
        assert_eq!(shared.decide_cert(CertDecision::Resume), Err(NetError::InvalidState));

        shared.set_state(TransactionState::CertVerificationRequired);
        shared.reset_cert_decision();
        let waiter = {
            let shared = shared.clone();
            tokio::spawn(async move { shared.cert_decision().await })
        };
        shared.decide_cert(CertDecision::Pause).unwrap();
        assert_eq!(waiter.await.unwrap(), CertDecision::Pause);
    }
}
