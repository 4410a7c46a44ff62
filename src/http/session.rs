//! Sessions: connection mode, cookie policy and the set of open transactions.
//!
//! ```rust,ignore
//! use nethttp::http::session::{HttpSession, SessionMode};
//!
//! let session = HttpSession::builder()
//!     .mode(SessionMode::Normal)
//!     .host_address("http://example.com")
//!     .build()?;
//! let mut txn = session.open_transaction()?;
//! txn.request_mut().set_uri("/index.html")?;
//! let mut events = txn.subscribe();
//! txn.submit()?;
//! while let Some(event) = events.next_event().await { /* ... */ }
//! ```

use crate::base::neterror::NetError;
use crate::cookies::jar::CookieJar;
use crate::dns::{HickoryResolver, Resolve};
use crate::http::auth::HttpAuthentication;
use crate::http::header::HttpHeader;
use crate::http::networktransaction::{self, RequestJob};
use crate::http::streamfactory::{HttpStream, HttpStreamFactory};
use crate::http::transaction::{HttpTransaction, TransactionShared};
use crate::socket::proxy::ProxySettings;
use crate::socket::tls::TlsConfig;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use url::Url;

/// How transactions of a session share the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
    /// One transaction in flight at a time, all to the session host.
    #[default]
    Normal,
    /// Requests to the session host are written back to back on one
    /// connection; responses arrive in request order.
    Pipelining,
    /// Each transaction names its own host and runs independently.
    MultipleHost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CookieFlag {
    /// Cookies are neither stored nor sent.
    None,
    /// `Set-Cookie` responses fill the jar and matching cookies are sent.
    AutomaticCookies,
    /// The application sets the `Cookie` value per request.
    #[default]
    ManualCookies,
}

/// What to do with a server certificate after the TLS handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CertVerificationPolicy {
    /// Ask the application only when the chain does not verify.
    #[default]
    Automatic,
    /// Always ask the application.
    Manual,
    /// Never ask; untrusted certificates are accepted.
    Ignored,
}

/// Default cap on open transactions per session.
pub const DEFAULT_MAX_TRANSACTIONS: usize = 20;

/// Session settings. Use [`HttpSession::builder`] to fill them in.
#[derive(Clone)]
pub struct SessionConfig {
    pub mode: SessionMode,
    pub proxy_address: Option<String>,
    pub host_address: Option<String>,
    pub common_header: Option<HttpHeader>,
    pub cookie_flag: CookieFlag,
    pub max_transactions: usize,
    pub cert_policy: CertVerificationPolicy,
    pub auto_redirect: bool,
    pub tls: TlsConfig,
    /// `None` uses the hickory resolver.
    pub resolver: Option<Arc<dyn Resolve>>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: SessionMode::Normal,
            proxy_address: None,
            host_address: None,
            common_header: None,
            cookie_flag: CookieFlag::ManualCookies,
            max_transactions: DEFAULT_MAX_TRANSACTIONS,
            cert_policy: CertVerificationPolicy::Automatic,
            auto_redirect: false,
            tls: TlsConfig::default(),
            resolver: None,
        }
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("mode", &self.mode)
            .field("host_address", &self.host_address)
            .field("cookie_flag", &self.cookie_flag)
            .field("max_transactions", &self.max_transactions)
            .field("cert_policy", &self.cert_policy)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct SessionBuilder {
    config: SessionConfig,
}

impl SessionBuilder {
    pub fn mode(mut self, mode: SessionMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// HTTP proxy, as `host:port` or `http://[user:pass@]host:port`.
    pub fn proxy_address(mut self, address: &str) -> Self {
        self.config.proxy_address = Some(address.to_string());
        self
    }

    /// Origin the transactions talk to. Required unless the mode is
    /// [`SessionMode::MultipleHost`].
    pub fn host_address(mut self, address: &str) -> Self {
        self.config.host_address = Some(address.to_string());
        self
    }

    /// Fields added to every request that does not set them itself.
    pub fn common_header(mut self, header: HttpHeader) -> Self {
        self.config.common_header = Some(header);
        self
    }

    pub fn cookie_flag(mut self, flag: CookieFlag) -> Self {
        self.config.cookie_flag = flag;
        self
    }

    pub fn max_transactions(mut self, max: usize) -> Self {
        self.config.max_transactions = max;
        self
    }

    pub fn cert_verification_policy(mut self, policy: CertVerificationPolicy) -> Self {
        self.config.cert_policy = policy;
        self
    }

    pub fn auto_redirect(mut self, enabled: bool) -> Self {
        self.config.auto_redirect = enabled;
        self
    }

    pub fn tls_config(mut self, tls: TlsConfig) -> Self {
        self.config.tls = tls;
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn Resolve>) -> Self {
        self.config.resolver = Some(resolver);
        self
    }

    pub fn build(self) -> Result<HttpSession, NetError> {
        HttpSession::new(self.config)
    }
}

/// Per-session state the engine tasks use.
pub(crate) struct SessionContext {
    pub mode: SessionMode,
    pub host: Option<Url>,
    pub common_header: HttpHeader,
    pub cookie_flag: CookieFlag,
    pub jar: CookieJar,
    pub factory: HttpStreamFactory,
    pub cert_policy: CertVerificationPolicy,
    pub auto_redirect: AtomicBool,
    /// Keep-alive connection left by the last finished exchange.
    pub idle: tokio::sync::Mutex<Option<HttpStream>>,
}

pub(crate) struct SessionShared {
    ctx: Arc<SessionContext>,
    proxy_address: Option<String>,
    transactions: DashMap<u64, Arc<TransactionShared>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    max_transactions: usize,
    /// Serializes the admission checks of concurrent submits.
    admission: Mutex<()>,
    pipeline: Mutex<Option<mpsc::UnboundedSender<RequestJob>>>,
}

impl SessionShared {
    pub(crate) fn context(&self) -> &Arc<SessionContext> {
        &self.ctx
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn admission(&self) -> &Mutex<()> {
        &self.admission
    }

    pub(crate) fn max_transactions(&self) -> usize {
        self.max_transactions
    }

    pub(crate) fn active_count(&self) -> usize {
        self.transactions
            .iter()
            .filter(|entry| entry.value().state().is_active())
            .count()
    }

    pub(crate) fn open_transaction(self: &Arc<Self>) -> Result<HttpTransaction, NetError> {
        if self.is_closed() {
            return Err(NetError::InvalidSession);
        }
        if self.transactions.len() >= self.max_transactions {
            return Err(NetError::MaxExceeded);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let shared = Arc::new(TransactionShared::new(id));
        self.transactions.insert(id, shared.clone());
        let manual = self.ctx.cookie_flag == CookieFlag::ManualCookies;
        tracing::debug!(id, "transaction opened");
        Ok(HttpTransaction::new(shared, Arc::downgrade(self), manual))
    }

    pub(crate) fn forget(&self, id: u64) {
        self.transactions.remove(&id);
    }

    /// Starts the engine for a submitted job.
    pub(crate) fn dispatch(&self, job: RequestJob, handle: &Handle) {
        if self.ctx.mode != SessionMode::Pipelining {
            handle.spawn(networktransaction::run(job, self.ctx.clone()));
            return;
        }

        if let Some(at) = job.deadline {
            networktransaction::arm_pipeline_deadline(job.txn.clone(), at, handle);
        }
        let mut pipeline = self.pipeline.lock().unwrap_or_else(|e| e.into_inner());
        let sender = pipeline.get_or_insert_with(|| networktransaction::spawn_pipeline(self.ctx.clone(), handle));
        if let Err(mpsc::error::SendError(job)) = sender.send(job) {
            // Writer task gone (runtime restarted); start a new one.
            let sender = networktransaction::spawn_pipeline(self.ctx.clone(), handle);
            if let Err(mpsc::error::SendError(job)) = sender.send(job) {
                job.txn.abort(NetError::System);
            }
            *pipeline = Some(sender);
        }
    }

    fn cancel_all(&self) {
        for entry in self.transactions.iter() {
            if entry.value().state().is_active() {
                let _ = entry.value().cancel();
            }
        }
    }
}

/// An HTTP client session.
pub struct HttpSession {
    shared: Arc<SessionShared>,
}

impl std::fmt::Debug for HttpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSession")
            .field("mode", &self.shared.ctx.mode)
            .field("host", &self.shared.ctx.host.as_ref().map(Url::as_str))
            .field("transactions", &self.shared.transactions.len())
            .finish_non_exhaustive()
    }
}

impl HttpSession {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    pub fn new(config: SessionConfig) -> Result<Self, NetError> {
        let host = match config.host_address.as_deref() {
            Some(address) => Some(parse_host(address)?),
            None if config.mode == SessionMode::MultipleHost => None,
            None => return Err(NetError::InvalidAddress),
        };
        let proxy = config
            .proxy_address
            .as_deref()
            .map(ProxySettings::parse)
            .transpose()?;
        let common_header = match config.common_header {
            Some(header) if header.is_empty() => return Err(NetError::InvalidHeader),
            Some(header) => header,
            None => HttpHeader::new(),
        };
        if config.max_transactions == 0 {
            return Err(NetError::InvalidArgument);
        }
        let resolver = config
            .resolver
            .unwrap_or_else(|| Arc::new(HickoryResolver::new()));

        let ctx = SessionContext {
            mode: config.mode,
            host,
            common_header,
            cookie_flag: config.cookie_flag,
            jar: CookieJar::new(),
            factory: HttpStreamFactory::new(resolver, proxy, config.tls),
            cert_policy: config.cert_policy,
            auto_redirect: AtomicBool::new(config.auto_redirect),
            idle: tokio::sync::Mutex::new(None),
        };
        tracing::debug!(mode = ?ctx.mode, host = ?ctx.host.as_ref().map(Url::as_str), "session created");

        Ok(Self {
            shared: Arc::new(SessionShared {
                ctx: Arc::new(ctx),
                proxy_address: config.proxy_address,
                transactions: DashMap::new(),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
                max_transactions: config.max_transactions,
                admission: Mutex::new(()),
                pipeline: Mutex::new(None),
            }),
        })
    }

    /// Opens a transaction. Fails with `MaxExceeded` once the session
    /// holds its maximum number of open transactions.
    pub fn open_transaction(&self) -> Result<HttpTransaction, NetError> {
        self.shared.open_transaction()
    }

    /// Opens a transaction that repeats a challenged request with the
    /// credentials already given to `auth`.
    pub fn open_transaction_with_auth(&self, auth: &mut HttpAuthentication) -> Result<HttpTransaction, NetError> {
        auth.build_transaction(&self.shared)
    }

    /// Cancels a running transaction of this session.
    pub fn cancel_transaction(&self, txn: &HttpTransaction) -> Result<(), NetError> {
        if !txn.belongs_to(&self.shared) || !self.shared.transactions.contains_key(&txn.id()) {
            return Err(NetError::NotFound);
        }
        txn.shared().cancel()
    }

    /// Closes a transaction, cancelling it if it is still running.
    pub fn close_transaction(&self, txn: HttpTransaction) -> Result<(), NetError> {
        if !txn.belongs_to(&self.shared) {
            return Err(NetError::NotFound);
        }
        drop(txn);
        Ok(())
    }

    /// Cancels and detaches every open transaction. Handles still held by
    /// the application can no longer be submitted.
    pub fn close_all_transactions(&self) -> Result<(), NetError> {
        if self.shared.transactions.is_empty() {
            return Err(NetError::NotFound);
        }
        self.shared.cancel_all();
        for entry in self.shared.transactions.iter() {
            entry.value().detach();
        }
        self.shared.transactions.clear();
        Ok(())
    }

    pub fn set_auto_redirection_enabled(&self, enabled: bool) {
        self.shared.ctx.auto_redirect.store(enabled, Ordering::SeqCst);
    }

    pub fn is_auto_redirection_enabled(&self) -> bool {
        self.shared.ctx.auto_redirect.load(Ordering::SeqCst)
    }

    pub fn active_transaction_count(&self) -> usize {
        self.shared.active_count()
    }

    pub fn open_transaction_count(&self) -> usize {
        self.shared.transactions.len()
    }

    pub fn max_transaction_count(&self) -> usize {
        self.shared.max_transactions
    }

    pub fn cookie_storage_manager(&self) -> &CookieJar {
        &self.shared.ctx.jar
    }

    pub fn mode(&self) -> SessionMode {
        self.shared.ctx.mode
    }

    pub fn host_address(&self) -> Option<&str> {
        self.shared.ctx.host.as_ref().map(Url::as_str)
    }

    pub fn proxy_address(&self) -> Option<&str> {
        self.shared.proxy_address.as_deref()
    }

    pub fn cookie_flag(&self) -> CookieFlag {
        self.shared.ctx.cookie_flag
    }
}

impl Drop for HttpSession {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.cancel_all();
        for entry in self.shared.transactions.iter() {
            entry.value().detach();
        }
        self.shared
            .pipeline
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }
}

/// Parses a session host. A bare `host[:port]` means `http://`.
fn parse_host(address: &str) -> Result<Url, NetError> {
    let address = address.trim();
    let url = match Url::parse(address) {
        Ok(url) if url.has_host() => url,
        _ => Url::parse(&format!("http://{}", address)).map_err(|_| NetError::InvalidAddress)?,
    };
    if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
        return Err(NetError::InvalidAddress);
    }
    Ok(url)
}
