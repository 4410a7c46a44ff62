//! Async resolver backed by hickory-dns. This is the session default.

use super::resolve::addrs_from;
use super::{Name, Resolve, Resolving};
use crate::base::context::IoResultExt;
use hickory_resolver::config::{LookupIpStrategy, ResolverConfig};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioResolver;
use std::io;
use std::net::IpAddr;
use std::sync::{Arc, OnceLock};

/// Handle on the process-wide hickory resolver.
///
/// Every session shares the same instance and therefore the same cache,
/// so repeated lookups across sessions are answered without a query until
/// the record TTL runs out.
///
/// The resolver reads the system configuration (`/etc/resolv.conf` on
/// Unix) on first use and falls back to hickory's default upstreams when
/// that fails. Both A and AAAA records are queried.
#[derive(Debug, Clone)]
pub struct HickoryResolver {
    inner: Arc<TokioResolver>,
}

fn shared() -> Arc<TokioResolver> {
    static SHARED: OnceLock<Arc<TokioResolver>> = OnceLock::new();
    SHARED
        .get_or_init(|| {
            let mut builder = match TokioResolver::builder_tokio() {
                Ok(builder) => builder,
                Err(e) => {
                    tracing::warn!(error = %e, "system resolver config unreadable, using hickory defaults");
                    TokioResolver::builder_with_config(
                        ResolverConfig::default(),
                        TokioConnectionProvider::default(),
                    )
                }
            };
            builder.options_mut().ip_strategy = LookupIpStrategy::Ipv4AndIpv6;
            Arc::new(builder.build())
        })
        .clone()
}

impl HickoryResolver {
    /// Returns a handle on the shared resolver, creating it on first call.
    pub fn new() -> Self {
        Self { inner: shared() }
    }
}

impl Default for HickoryResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolve for HickoryResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let resolver = self.inner.clone();
        Box::pin(async move {
            let ips: Vec<IpAddr> = resolver
                .lookup_ip(name.as_str())
                .await
                .map(|lookup| lookup.iter().collect())
                .map_err(|e| io::Error::new(io::ErrorKind::NotFound, e.to_string()))
                .dns_context(name.as_str())?;

            if ips.is_empty() {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no addresses"))
                    .dns_context(name.as_str());
            }
            tracing::debug!(host = %name, count = ips.len(), "resolved");
            Ok(addrs_from(ips))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::neterror::NetError;

    #[test]
    fn test_handles_share_one_resolver() {
        let a = HickoryResolver::new();
        let b = HickoryResolver::default();
        assert!(Arc::ptr_eq(&a.inner, &b.inner));
    }

    #[tokio::test]
    async fn test_reserved_tld_fails_with_name() {
        match HickoryResolver::new().resolve(Name::new("nethttp-test.invalid")).await {
            Err(NetError::NameNotResolvedFor { domain, .. }) => assert_eq!(domain, "nethttp-test.invalid"),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!(".invalid must not resolve"),
        }
    }
}
