//! Pluggable host name resolution.
//!
//! Connect jobs resolve through the [`Resolve`] trait so a session can use
//! the async hickory resolver (default), the system `getaddrinfo`, or fixed
//! overrides in tests.

mod gai;
mod hickory;
mod resolve;

pub use gai::GaiResolver;
pub use hickory::HickoryResolver;
pub use resolve::{Addrs, DnsResolverWithOverrides, Name, Resolve, Resolving};
