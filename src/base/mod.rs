//! Base types and error handling.
//!
//! - [`NetError`](neterror::NetError): error codes, with a coarse
//!   [`ErrorKind`](neterror::ErrorKind) taxonomy
//! - [`LoadState`](loadstate::LoadState): what a transaction is waiting on

pub mod context;
pub mod loadstate;
pub mod neterror;
