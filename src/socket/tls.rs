use crate::base::neterror::NetError;
use boring::error::ErrorStack;
use boring::ssl::{SslConnector, SslConnectorBuilder, SslMethod, SslVerifyMode, SslVersion};
use std::net::IpAddr;
use std::path::PathBuf;

/// Client TLS settings for a session.
///
/// Peer verification never fails the handshake itself. The chain is
/// verified against the trust store and the verdict is handed to the
/// session's certificate policy, which may ask the application.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub min_version: Option<SslVersion>,
    pub max_version: Option<SslVersion>,
    /// OpenSSL cipher string; `None` keeps the BoringSSL defaults.
    pub cipher_list: Option<String>,
    /// Extra PEM bundle added to the default trust store.
    pub ca_file: Option<PathBuf>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        TlsConfig {
            min_version: Some(SslVersion::TLS1_2),
            max_version: Some(SslVersion::TLS1_3),
            cipher_list: None,
            ca_file: None,
        }
    }
}

const HTTP11_ALPN: &[u8] = b"\x08http/1.1";

impl TlsConfig {
    /// Builds a connector. Any BoringSSL rejection of the settings is
    /// reported as `SslProtocolError`.
    pub fn connector(&self) -> Result<SslConnector, NetError> {
        self.configure()
            .map(SslConnectorBuilder::build)
            .map_err(|e| {
                tracing::warn!(error = %e, "rejected TLS settings");
                NetError::SslProtocolError
            })
    }

    fn configure(&self) -> Result<SslConnectorBuilder, ErrorStack> {
        let mut b = SslConnector::builder(SslMethod::tls())?;
        b.set_min_proto_version(self.min_version)?;
        b.set_max_proto_version(self.max_version)?;
        if let Some(ciphers) = self.cipher_list.as_deref() {
            b.set_cipher_list(ciphers)?;
        }
        if let Some(path) = self.ca_file.as_ref() {
            b.set_ca_file(path)?;
        }
        b.set_alpn_protos(HTTP11_ALPN)?;
        b.set_verify(SslVerifyMode::NONE);
        Ok(b)
    }

    /// Literal addresses (bracketed or not) are sent without SNI (RFC 6066 §3).
    pub fn uses_sni(host: &str) -> bool {
        let bare = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(host);
        bare.parse::<IpAddr>().is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sni_skipped_for_literals() {
        assert!(TlsConfig::uses_sni("example.com"));
        assert!(!TlsConfig::uses_sni("127.0.0.1"));
        assert!(!TlsConfig::uses_sni("[::1]"));
    }

    #[test]
    fn test_default_connector() {
        assert!(TlsConfig::default().connector().is_ok());
    }

    #[test]
    fn test_bad_cipher_list() {
        let config = TlsConfig {
            cipher_list: Some("NOT-A-CIPHER".to_string()),
            ..TlsConfig::default()
        };
        assert_eq!(config.connector().err(), Some(NetError::SslProtocolError));
    }
}
