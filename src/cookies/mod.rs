//! Cookie parsing and storage.
//!
//! - [`HttpCookie`](httpcookie::HttpCookie): one parsed `Set-Cookie` entry,
//!   validated against the public suffix list
//! - [`CookieJar`](jar::CookieJar): per-session store with RFC 6265
//!   domain/path matching and LRU eviction
//!
//! In automatic cookie mode the session ingests every `Set-Cookie` header
//! into its jar and attaches matching cookies to outgoing requests. In
//! manual mode the jar is left alone and the application sets the
//! `Cookie` header itself.

pub mod httpcookie;
pub mod jar;
