//! # nethttp
//!
//! An asynchronous HTTP/1.0 and HTTP/1.1 client engine built on Tokio and
//! BoringSSL.
//!
//! A [`HttpSession`](http::HttpSession) fixes the connection mode (normal,
//! pipelining or multiple hosts), the proxy, common header fields and the
//! cookie policy. Transactions opened from it carry one request and one
//! response each; progress is reported through event subscriptions.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use nethttp::http::{HttpSession, TransactionEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), nethttp::base::neterror::NetError> {
//!     let session = HttpSession::builder()
//!         .host_address("http://example.com")
//!         .build()?;
//!     let mut txn = session.open_transaction()?;
//!     txn.request_mut().set_uri("/")?;
//!     let mut events = txn.subscribe();
//!     txn.submit()?;
//!     while let Some(event) = events.next_event().await {
//!         if let TransactionEvent::Completed = event {
//!             let body = txn.response().map(|r| r.read_all_body());
//!             println!("{:?}", body);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error codes and load states
//! - [`cookies`] - Cookie parsing and the per-session jar
//! - [`dns`] - Pluggable host resolution
//! - [`http`] - Sessions, transactions, messages, entities and authentication
//! - [`socket`] - Connect jobs, proxy tunnels and TLS

pub mod base;
pub mod cookies;
pub mod dns;
pub mod http;
pub mod socket;
