//! Transport: connect jobs, proxies and TLS.
//!
//! - [`connectjob`]: DNS → TCP → proxy tunnel → TLS
//! - [`proxy`]: HTTP proxy settings
//! - [`tls`]: BoringSSL client configuration
//! - [`stream`]: type-erased socket

pub mod connectjob;
pub mod proxy;
pub mod stream;
pub mod tls;
