//! Resolver trait and the types every resolver shares.
//!
//! A session holds one `Arc<dyn Resolve>` and every connect job goes
//! through it, so swapping resolvers never touches the socket layer.

use crate::base::neterror::NetError;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;

/// Host name handed to a resolver.
///
/// Lowercased on construction so overrides and caches compare names
/// case-insensitively.
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct Name(Box<str>);

impl Name {
    /// Wraps `host`, lowercasing ASCII letters.
    pub fn new(host: &str) -> Self {
        Name(host.to_ascii_lowercase().into_boxed_str())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Name {
    fn from(host: &str) -> Self {
        Name::new(host)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.0)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolved addresses. Ports are 0; the connect job fills them in.
///
/// Connect jobs try the addresses in iteration order.
pub type Addrs = Box<dyn Iterator<Item = SocketAddr> + Send>;

/// Future returned by [`Resolve::resolve`].
pub type Resolving = Pin<Box<dyn Future<Output = Result<Addrs, NetError>> + Send>>;

/// Host resolution service used by connect jobs.
///
/// Sessions take one through `SessionBuilder::resolver`; without it they
/// share the process-wide [`HickoryResolver`](super::HickoryResolver).
/// Literal IP hosts never reach a resolver.
///
/// # Contract
///
/// - Takes `&self`, so one instance serves concurrent lookups.
/// - Returns a boxed future so the trait stays object safe.
/// - A name with no addresses is an error, never an empty [`Addrs`].
///   Failures should carry the host, as `NetError::NameNotResolvedFor` does.
pub trait Resolve: Send + Sync {
    /// Resolves `name` to addresses with port 0.
    fn resolve(&self, name: Name) -> Resolving;
}

impl<R: Resolve + ?Sized> Resolve for Arc<R> {
    fn resolve(&self, name: Name) -> Resolving {
        R::resolve(self, name)
    }
}

pub(crate) fn addrs_from(ips: impl IntoIterator<Item = IpAddr>) -> Addrs {
    let addrs: Vec<SocketAddr> = ips.into_iter().map(|ip| SocketAddr::new(ip, 0)).collect();
    Box::new(addrs.into_iter())
}

/// Answers configured names from a fixed table and everything else from
/// an inner resolver.
///
/// Handy for pointing a real host name at a local server while the `Host`
/// header, cookies and TLS SNI keep using the original name. Lookups of
/// overridden names complete immediately and never touch `inner`.
///
/// ```
/// use nethttp::dns::{DnsResolverWithOverrides, GaiResolver};
/// use std::net::{IpAddr, Ipv4Addr};
/// use std::sync::Arc;
///
/// let resolver = DnsResolverWithOverrides::new(Arc::new(GaiResolver::new()))
///     .with_override("api.example.com", [IpAddr::V4(Ipv4Addr::LOCALHOST)]);
/// assert_eq!(resolver.override_count(), 1);
/// ```
#[derive(Clone)]
pub struct DnsResolverWithOverrides {
    inner: Arc<dyn Resolve>,
    overrides: HashMap<Name, Vec<IpAddr>>,
}

impl DnsResolverWithOverrides {
    /// Empty table in front of `inner`.
    pub fn new(inner: Arc<dyn Resolve>) -> Self {
        Self {
            inner,
            overrides: HashMap::new(),
        }
    }

    /// Maps `host` (case-insensitive) to `addrs`. A later call for the
    /// same host replaces the earlier entry.
    pub fn with_override(mut self, host: &str, addrs: impl IntoIterator<Item = IpAddr>) -> Self {
        self.overrides.insert(Name::new(host), addrs.into_iter().collect());
        self
    }

    /// Number of distinct overridden host names.
    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }
}

impl Resolve for DnsResolverWithOverrides {
    fn resolve(&self, name: Name) -> Resolving {
        match self.overrides.get(&name) {
            Some(ips) => {
                tracing::debug!(host = %name, "answered from override table");
                let addrs = addrs_from(ips.iter().copied());
                Box::pin(async move { Ok(addrs) })
            }
            None => self.inner.resolve(name),
        }
    }
}

impl fmt::Debug for DnsResolverWithOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnsResolverWithOverrides")
            .field("overrides", &self.overrides.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
