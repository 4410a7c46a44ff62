//! Turns a URL into a ready socket for the HTTP layer.

use crate::base::context::IoResultExt;
use crate::base::loadstate::LoadState;
use crate::base::neterror::NetError;
use crate::dns::{Name, Resolve};
use crate::http::wire::read_response_head;
use crate::socket::proxy::ProxySettings;
use crate::socket::stream::{boxed, BoxedSocket};
use crate::socket::tls::TlsConfig;
use boring::x509::X509VerifyResult;
use std::net::{IpAddr, SocketAddr};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use url::{Host, Url};

/// Outcome of server certificate verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertStatus {
    /// Plain `http://`; there is nothing to verify.
    NotTls,
    /// Chain verified; carries the PEM encoded leaf.
    Verified(Option<String>),
    /// Chain did not verify; carries the PEM encoded leaf.
    Untrusted(Option<String>),
}

/// A connected, possibly tunneled and TLS wrapped, socket.
#[derive(Debug)]
pub struct ConnectedSocket {
    pub socket: BoxedSocket,
    /// Verdict for the origin's certificate. A proxy in front of the
    /// origin is never TLS, so this always describes the origin.
    pub cert: CertStatus,
}

/// Manages the connection process: DNS -> TCP -> proxy tunnel -> TLS.
///
/// With a proxy, the proxy host is resolved and connected instead of the
/// origin; `https://` origins are then tunneled with `CONNECT` before the
/// handshake. `on_state` is told each [`LoadState`] as the job moves
/// through the stages.
pub struct ConnectJob<'a> {
    resolver: &'a dyn Resolve,
    proxy: Option<&'a ProxySettings>,
    tls: &'a TlsConfig,
    on_state: &'a (dyn Fn(LoadState) + Send + Sync),
}

impl<'a> ConnectJob<'a> {
    /// Borrows everything from the session; a job lives for one connect.
    pub fn new(
        resolver: &'a dyn Resolve,
        proxy: Option<&'a ProxySettings>,
        tls: &'a TlsConfig,
        on_state: &'a (dyn Fn(LoadState) + Send + Sync),
    ) -> Self {
        Self {
            resolver,
            proxy,
            tls,
            on_state,
        }
    }

    /// Connects to the origin of `url`.
    ///
    /// Addresses are tried in resolver order. Fails with the error of the
    /// last address tried, with `TunnelConnectionFailed` when the proxy
    /// refuses the tunnel, or with `SslProtocolError` when the handshake
    /// fails. An untrusted certificate is not an error here; it is
    /// reported through [`CertStatus::Untrusted`].
    pub async fn connect(&self, url: &Url) -> Result<ConnectedSocket, NetError> {
        let target_host = url.host().ok_or(NetError::InvalidUrl)?.to_owned();
        let target_port = url.port_or_known_default().ok_or(NetError::InvalidUrl)?;
        let https = url.scheme() == "https";

        let mut stream = match self.proxy {
            Some(proxy) => {
                let (host, port) = proxy.host_port()?;
                let host = Host::parse(host).map_err(|_| NetError::InvalidProxy)?;
                self.connect_tcp(&host, port).await?
            }
            None => self.connect_tcp(&target_host, target_port).await?,
        };

        // Plain http through a proxy needs no tunnel; requests go in absolute form.
        if let (Some(proxy), true) = (self.proxy, https) {
            (self.on_state)(LoadState::EstablishingProxyTunnel);
            self.establish_tunnel(&mut stream, proxy, &target_host, target_port)
                .await?;
        }

        if !https {
            return Ok(ConnectedSocket {
                socket: boxed(stream),
                cert: CertStatus::NotTls,
            });
        }

        (self.on_state)(LoadState::SslHandshake);
        let host = target_host.to_string();
        let connector = self.tls.connector()?;
        let mut config = connector
            .configure()
            .map_err(|_| NetError::SslProtocolError)?;
        let sni = TlsConfig::uses_sni(&host);
        config.set_use_server_name_indication(sni);
        config.set_verify_hostname(sni);

        let tls_stream = tokio_boring::connect(config, &host, stream)
            .await
            .map_err(|e| {
                tracing::debug!(host = %host, error = ?e, "TLS handshake failed");
                NetError::SslProtocolError
            })?;

        let ssl = tls_stream.ssl();
        let pem = ssl
            .peer_certificate()
            .and_then(|cert| cert.to_pem().ok())
            .map(|pem| String::from_utf8_lossy(&pem).into_owned());
        let cert = if ssl.verify_result() == X509VerifyResult::OK {
            CertStatus::Verified(pem)
        } else {
            tracing::debug!(
                host = %host,
                reason = %ssl.verify_result().error_string(),
                "server certificate not trusted"
            );
            CertStatus::Untrusted(pem)
        };

        Ok(ConnectedSocket {
            socket: boxed(tls_stream),
            cert,
        })
    }

    async fn resolve(&self, host: &Host<String>, port: u16) -> Result<Vec<SocketAddr>, NetError> {
        let domain = match host {
            Host::Ipv4(ip) => return Ok(vec![SocketAddr::new(IpAddr::V4(*ip), port)]),
            Host::Ipv6(ip) => return Ok(vec![SocketAddr::new(IpAddr::V6(*ip), port)]),
            Host::Domain(domain) => domain,
        };

        (self.on_state)(LoadState::ResolvingHost);
        let addrs = self.resolver.resolve(Name::new(domain.as_str())).await?;
        let addrs: Vec<SocketAddr> = addrs
            .map(|mut addr| {
                addr.set_port(port);
                addr
            })
            .collect();
        if addrs.is_empty() {
            return Err(NetError::NameNotResolved);
        }
        Ok(addrs)
    }

    /// Tries every resolved address in order and keeps the first that connects.
    async fn connect_tcp(&self, host: &Host<String>, port: u16) -> Result<TcpStream, NetError> {
        let addrs = self.resolve(host, port).await?;
        (self.on_state)(LoadState::Connecting);

        let host_str = host.to_string();
        let mut last_err = NetError::ConnectionFailed;
        for addr in addrs {
            match TcpStream::connect(addr).await.connection_context(&host_str, port) {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    tracing::debug!(host = %host_str, addr = %addr, "connected");
                    return Ok(stream);
                }
                Err(e) => {
                    tracing::debug!(addr = %addr, error = %e, "connect attempt failed");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    async fn establish_tunnel(
        &self,
        stream: &mut TcpStream,
        proxy: &ProxySettings,
        host: &Host<String>,
        port: u16,
    ) -> Result<(), NetError> {
        let target = format!("{}:{}", host, port);
        let mut request = format!("CONNECT {} HTTP/1.1\r\nHost: {}\r\n", target, target);
        if let Some(auth) = proxy.auth_header() {
            request.push_str(&format!("Proxy-Authorization: {}\r\n", auth));
        }
        request.push_str("\r\n");

        stream
            .write_all(request.as_bytes())
            .await
            .map_err(|_| NetError::TunnelConnectionFailed)?;

        // The proxy sends nothing past its header block until we speak TLS.
        let mut reader = BufReader::new(&mut *stream);
        let head = read_response_head(&mut reader)
            .await
            .map_err(|_| NetError::TunnelConnectionFailed)?;
        if !(200..300).contains(&head.status) {
            tracing::debug!(target = %target, status = head.status, "proxy refused tunnel");
            return Err(NetError::TunnelConnectionFailed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::GaiResolver;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn no_state(_: LoadState) {}

    #[tokio::test]
    async fn test_connect_plain_ip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let resolver = GaiResolver::new();
        let tls = TlsConfig::default();
        let job = ConnectJob::new(&resolver, None, &tls, &no_state);
        let url = Url::parse(&format!("http://127.0.0.1:{}/", port)).unwrap();
        let connected = job.connect(&url).await.unwrap();
        assert_eq!(connected.cert, CertStatus::NotTls);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind and drop to get a port nobody listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let resolver = GaiResolver::new();
        let tls = TlsConfig::default();
        let job = ConnectJob::new(&resolver, None, &tls, &no_state);
        let url = Url::parse(&format!("http://127.0.0.1:{}/", port)).unwrap();
        match job.connect(&url).await {
            Err(NetError::ConnectionFailedTo { host, port: p, .. }) => {
                assert_eq!(host, "127.0.0.1");
                assert_eq!(p, port);
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_tunnel_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 1024];
            let _ = sock.read(&mut buf).await;
            let _ = sock
                .write_all(b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n\r\n")
                .await;
        });

        let resolver = GaiResolver::new();
        let tls = TlsConfig::default();
        let proxy = ProxySettings::parse(&format!("127.0.0.1:{}", port)).unwrap();
        let job = ConnectJob::new(&resolver, Some(&proxy), &tls, &no_state);
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(
            job.connect(&url).await.err(),
            Some(NetError::TunnelConnectionFailed)
        );
    }
}
