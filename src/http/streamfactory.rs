use crate::base::loadstate::LoadState;
use crate::base::neterror::NetError;
use crate::dns::Resolve;
use crate::socket::connectjob::{CertStatus, ConnectJob};
use crate::socket::proxy::ProxySettings;
use crate::socket::stream::BoxedSocket;
use crate::socket::tls::TlsConfig;
use std::sync::Arc;
use tokio::io::{BufReader, ReadHalf, WriteHalf};
use url::Url;

/// An HTTP/1.1 connection split into a buffered read side and a write side.
#[derive(Debug)]
pub(crate) struct HttpStream {
    pub reader: BufReader<ReadHalf<BoxedSocket>>,
    pub writer: WriteHalf<BoxedSocket>,
    /// `scheme://host:port` of the server the connection talks to.
    pub origin: String,
}

impl HttpStream {
    fn new(socket: BoxedSocket, origin: String) -> Self {
        let (read, write) = tokio::io::split(socket);
        Self {
            reader: BufReader::new(read),
            writer: write,
            origin,
        }
    }

    pub(crate) fn into_parts(self) -> (BufReader<ReadHalf<BoxedSocket>>, WriteHalf<BoxedSocket>) {
        (self.reader, self.writer)
    }
}

/// Key identifying connections that can be shared between requests.
pub(crate) fn origin_key(url: &Url) -> String {
    format!(
        "{}://{}:{}",
        url.scheme(),
        url.host_str().unwrap_or(""),
        url.port_or_known_default().unwrap_or(0)
    )
}

/// Opens connections for a session.
pub(crate) struct HttpStreamFactory {
    resolver: Arc<dyn Resolve>,
    proxy: Option<ProxySettings>,
    tls: TlsConfig,
}

impl std::fmt::Debug for HttpStreamFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpStreamFactory")
            .field("proxy", &self.proxy)
            .field("tls", &self.tls)
            .finish_non_exhaustive()
    }
}

impl HttpStreamFactory {
    pub(crate) fn new(resolver: Arc<dyn Resolve>, proxy: Option<ProxySettings>, tls: TlsConfig) -> Self {
        Self {
            resolver,
            proxy,
            tls,
        }
    }

    pub(crate) fn proxy(&self) -> Option<&ProxySettings> {
        self.proxy.as_ref()
    }

    pub(crate) async fn create_stream(
        &self,
        url: &Url,
        on_state: &(dyn Fn(LoadState) + Send + Sync),
    ) -> Result<(HttpStream, CertStatus), NetError> {
        let job = ConnectJob::new(&*self.resolver, self.proxy.as_ref(), &self.tls, on_state);
        let connected = job.connect(url).await?;
        tracing::debug!(origin = %origin_key(url), cert = ?connected.cert, "stream created");
        Ok((HttpStream::new(connected.socket, origin_key(url)), connected.cert))
    }
}
