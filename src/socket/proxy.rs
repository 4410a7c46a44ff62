use crate::base::neterror::NetError;
use url::Url;
use zeroize::Zeroizing;

/// HTTP proxy a session sends its traffic through.
///
/// Plain `http://` requests are forwarded in absolute form; `https://`
/// targets are tunneled with `CONNECT`.
#[derive(Clone)]
pub struct ProxySettings {
    /// Proxy URL (e.g., `http://proxy.com:8080`)
    pub url: Url,
    pub username: Option<String>,
    /// Zeroized on drop
    pub password: Option<Zeroizing<String>>,
}

impl std::fmt::Debug for ProxySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxySettings")
            .field("host", &self.url.host_str())
            .field("port", &self.url.port_or_known_default())
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl ProxySettings {
    /// Parses a proxy address. A bare `host:port` is read as `http://host:port`;
    /// credentials in the userinfo part are used for `Proxy-Authorization`.
    pub fn parse(address: &str) -> Result<Self, NetError> {
        let address = address.trim();
        let url = match Url::parse(address) {
            Ok(url) if url.has_host() => url,
            _ => Url::parse(&format!("http://{}", address)).map_err(|_| NetError::InvalidProxy)?,
        };
        if url.scheme() != "http" || url.host_str().is_none() {
            return Err(NetError::InvalidProxy);
        }

        let username = (!url.username().is_empty()).then(|| url.username().to_string());
        let password = url.password().map(|p| Zeroizing::new(p.to_string()));
        Ok(Self {
            url,
            username,
            password,
        })
    }

    /// Add authentication credentials.
    pub fn with_auth(mut self, user: &str, pass: &str) -> Self {
        self.username = Some(user.to_string());
        self.password = Some(Zeroizing::new(pass.to_string()));
        self
    }

    pub fn host_port(&self) -> Result<(&str, u16), NetError> {
        let host = self.url.host_str().ok_or(NetError::InvalidProxy)?;
        Ok((host, self.url.port().unwrap_or(80)))
    }

    /// `Proxy-Authorization` value, when credentials are configured.
    pub fn auth_header(&self) -> Option<String> {
        use base64::{engine::general_purpose, Engine as _};
        let user = self.username.as_ref()?;
        let pass = self.password.as_ref().map(|p| p.as_str()).unwrap_or("");
        let creds = Zeroizing::new(format!("{}:{}", user, pass));
        Some(format!("Basic {}", general_purpose::STANDARD.encode(creds.as_bytes())))
    }
}
