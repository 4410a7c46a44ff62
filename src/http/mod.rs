//! HTTP/1.1 client engine.
//!
//! - [`session`]: connection mode, cookie policy, open transactions
//! - [`transaction`]: one request/response exchange and its state machine
//! - [`request`] / [`response`]: the messages, each with a [`header::HttpHeader`]
//! - [`entity`]: pull based request bodies
//! - [`events`]: event and progress subscriptions
//! - [`auth`]: 401/407 challenges and authenticated retries

pub mod auth;
pub(crate) mod chunked;
pub(crate) mod contentdecoder;
pub mod digestauth;
pub mod entity;
pub mod events;
pub mod header;
pub(crate) mod networktransaction;
pub mod request;
pub mod response;
pub mod session;
pub(crate) mod streamfactory;
pub mod transaction;
pub(crate) mod wire;

pub use auth::{AuthScheme, AuthState, HttpAuthentication, HttpCredentials};
pub use events::{
    dispatch_all, ProgressEvent, ProgressEventListener, ProgressEvents, TransactionEvent,
    TransactionEventListener, TransactionEvents,
};
pub use header::HttpHeader;
pub use request::{HttpMethod, HttpRequest};
pub use response::HttpResponse;
pub use session::{
    CertVerificationPolicy, CookieFlag, HttpSession, SessionBuilder, SessionConfig, SessionMode,
};
pub use transaction::{HttpTransaction, TransactionState};
