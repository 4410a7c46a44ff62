//! Operating system resolver (`getaddrinfo`), run on the blocking pool.

use super::resolve::addrs_from;
use super::{Name, Resolve, Resolving};
use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use std::io;
use std::net::{IpAddr, ToSocketAddrs};

/// Honours `/etc/hosts` and the platform resolver configuration.
#[derive(Clone, Debug, Default)]
pub struct GaiResolver;

impl GaiResolver {
    /// Each lookup occupies one blocking-pool thread until it returns.
    pub fn new() -> Self {
        GaiResolver
    }
}

fn lookup(host: &str) -> io::Result<Vec<IpAddr>> {
    let ips: Vec<IpAddr> = (host, 0u16).to_socket_addrs()?.map(|a| a.ip()).collect();
    if ips.is_empty() {
        return Err(io::Error::new(io::ErrorKind::NotFound, "no addresses"));
    }
    Ok(ips)
}

impl Resolve for GaiResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(async move {
            let host = name.to_string();
            let ips = tokio::task::spawn_blocking(move || lookup(&host))
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "getaddrinfo task failed");
                    NetError::NameNotResolved
                })?
                .dns_context(name.as_str())?;
            tracing::debug!(host = %name, count = ips.len(), "resolved via getaddrinfo");
            Ok(addrs_from(ips))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_localhost_is_loopback() {
        let addrs: Vec<_> = GaiResolver::new()
            .resolve(Name::new("localhost"))
            .await
            .unwrap()
            .collect();
        assert!(!addrs.is_empty());
        assert!(addrs.iter().all(|a| a.ip().is_loopback() && a.port() == 0));
    }
}
