//! 401/407 challenge handling.
//!
//! A transaction that received a challenge hands out an
//! [`HttpAuthentication`]. Supplying credentials to it produces a new,
//! unsubmitted transaction carrying the `Authorization` (or
//! `Proxy-Authorization`) header; the challenged transaction is left as is.

use crate::base::neterror::NetError;
use crate::http::digestauth::{parse_param, split_params, DigestAuthHandler};
use crate::http::header::HttpHeader;
use crate::http::request::HttpRequest;
use crate::http::session::SessionShared;
use crate::http::transaction::HttpTransaction;
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use std::sync::{Arc, Weak};
use url::{Position, Url};
use zeroize::Zeroizing;

/// Scheme and origin (server or proxy) of a challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthScheme {
    #[default]
    None,
    ProxyBasic,
    ProxyDigest,
    WwwBasic,
    WwwDigest,
    ProxyNtlm,
    WwwNtlm,
    WwwNegotiate,
}

impl AuthScheme {
    pub fn is_proxy(&self) -> bool {
        matches!(
            self,
            AuthScheme::ProxyBasic | AuthScheme::ProxyDigest | AuthScheme::ProxyNtlm
        )
    }

    /// Header the answer to this challenge goes into.
    fn authorization_field(&self) -> &'static str {
        if self.is_proxy() {
            "Proxy-Authorization"
        } else {
            "Authorization"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    NoChallenge,
    ChallengeReceived,
    /// Credentials were supplied and a retry transaction was created.
    Retrying,
}

/// User name and password. The password is wiped on drop.
#[derive(Clone)]
pub struct HttpCredentials {
    name: String,
    password: Zeroizing<String>,
}

impl HttpCredentials {
    pub fn new(name: &str, password: &str) -> Self {
        Self {
            name: name.to_string(),
            password: Zeroizing::new(password.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for HttpCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCredentials")
            .field("name", &self.name)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Challenge parsed from a 401/407 response.
#[derive(Debug, Clone)]
pub(crate) struct Challenge {
    pub scheme: AuthScheme,
    pub realm: String,
    pub digest: Option<DigestAuthHandler>,
}

impl Challenge {
    /// Picks the strongest challenge the response offers:
    /// Digest, then Basic, then NTLM and Negotiate.
    pub(crate) fn from_response(status: u16, header: &HttpHeader) -> Option<Self> {
        let (field, proxy) = match status {
            401 => ("WWW-Authenticate", false),
            407 => ("Proxy-Authenticate", true),
            _ => return None,
        };

        let mut best: Option<(u8, Challenge)> = None;
        for value in header.values_ignore_case(field) {
            let Some(challenge) = parse_challenge(value, proxy) else {
                tracing::debug!(value = %value, "ignoring unparsable challenge");
                continue;
            };
            let rank = match challenge.scheme {
                AuthScheme::WwwDigest | AuthScheme::ProxyDigest => 3,
                AuthScheme::WwwBasic | AuthScheme::ProxyBasic => 2,
                _ => 1,
            };
            if best.as_ref().map_or(true, |(r, _)| rank > *r) {
                best = Some((rank, challenge));
            }
        }
        best.map(|(_, c)| c)
    }
}

fn parse_challenge(value: &str, proxy: bool) -> Option<Challenge> {
    let value = value.trim();
    let (scheme, params) = value.split_once(' ').unwrap_or((value, ""));

    let realm = split_params(params)
        .into_iter()
        .filter_map(|p| parse_param(p).ok())
        .find(|(k, _)| k.eq_ignore_ascii_case("realm"))
        .map(|(_, v)| v.to_string())
        .unwrap_or_default();

    let (scheme, digest) = match (scheme.to_ascii_lowercase().as_str(), proxy) {
        ("basic", false) => (AuthScheme::WwwBasic, None),
        ("basic", true) => (AuthScheme::ProxyBasic, None),
        ("digest", p) => {
            let handler = DigestAuthHandler::parse_challenge(params).ok()?;
            let scheme = if p {
                AuthScheme::ProxyDigest
            } else {
                AuthScheme::WwwDigest
            };
            (scheme, Some(handler))
        }
        ("ntlm", false) => (AuthScheme::WwwNtlm, None),
        ("ntlm", true) => (AuthScheme::ProxyNtlm, None),
        ("negotiate", false) => (AuthScheme::WwwNegotiate, None),
        _ => return None,
    };
    Some(Challenge {
        scheme,
        realm,
        digest,
    })
}

/// Authentication context opened from a challenged transaction.
pub struct HttpAuthentication {
    realm: String,
    scheme: AuthScheme,
    state: AuthState,
    digest: Option<DigestAuthHandler>,
    credentials: Option<HttpCredentials>,
    session: Weak<SessionShared>,
    template: HttpRequest,
    /// Body of the challenged request; `None` when it came from an entity
    /// that cannot be replayed.
    body: Option<Vec<Bytes>>,
    target: Url,
}

impl std::fmt::Debug for HttpAuthentication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAuthentication")
            .field("realm", &self.realm)
            .field("scheme", &self.scheme)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl HttpAuthentication {
    pub(crate) fn new(
        challenge: Challenge,
        session: Weak<SessionShared>,
        request: &HttpRequest,
        body: Option<&[Bytes]>,
        target: Url,
    ) -> Self {
        Self {
            realm: challenge.realm,
            scheme: challenge.scheme,
            state: AuthState::ChallengeReceived,
            digest: challenge.digest,
            credentials: None,
            session,
            template: request.clone_for_retry(None),
            body: body.map(<[Bytes]>::to_vec),
            target,
        }
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn scheme(&self) -> AuthScheme {
        self.scheme
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Stores `credentials` and returns a new transaction that repeats the
    /// challenged request with them. The transaction still has to be
    /// submitted.
    pub fn set_credentials(&mut self, credentials: HttpCredentials) -> Result<HttpTransaction, NetError> {
        if self.state != AuthState::ChallengeReceived {
            return Err(NetError::InvalidState);
        }
        match self.scheme {
            AuthScheme::WwwBasic | AuthScheme::ProxyBasic => {
                // RFC 7617: the user-id cannot contain a colon
                if credentials.name.contains(':') {
                    return Err(NetError::InvalidAuthCredentials);
                }
            }
            AuthScheme::WwwDigest | AuthScheme::ProxyDigest => {
                if credentials.name.is_empty() {
                    return Err(NetError::InvalidAuthCredentials);
                }
            }
            _ => return Err(NetError::UnsupportedAuthScheme),
        }

        let session = self.session.upgrade().ok_or(NetError::InvalidSession)?;
        self.credentials = Some(credentials);
        let txn = self.build_transaction(&session)?;
        self.state = AuthState::Retrying;
        Ok(txn)
    }

    /// Builds another authorized transaction from the stored credentials.
    pub(crate) fn build_transaction(&mut self, session: &Arc<SessionShared>) -> Result<HttpTransaction, NetError> {
        let credentials = self.credentials.clone().ok_or(NetError::InvalidState)?;
        if let Some(own) = self.session.upgrade() {
            if !Arc::ptr_eq(&own, session) {
                return Err(NetError::InvalidArgument);
            }
        }

        let value = self.authorization_value(&credentials)?;
        let mut request = self.template.clone_for_retry(self.body.as_deref());
        let header = request.header_mut()?;
        let field = self.scheme.authorization_field();
        header.remove_ignore_case(field);
        header.add_field(field, &value)?;

        let mut txn = session.open_transaction()?;
        txn.replace_request(request);
        tracing::debug!(scheme = ?self.scheme, realm = %self.realm, "authorized retry created");
        Ok(txn)
    }

    fn authorization_value(&mut self, credentials: &HttpCredentials) -> Result<String, NetError> {
        match self.scheme {
            AuthScheme::WwwBasic | AuthScheme::ProxyBasic => {
                let raw = Zeroizing::new(format!("{}:{}", credentials.name, credentials.password()));
                Ok(format!("Basic {}", general_purpose::STANDARD.encode(raw.as_bytes())))
            }
            AuthScheme::WwwDigest | AuthScheme::ProxyDigest => {
                let digest = self.digest.as_mut().ok_or(NetError::InvalidState)?;
                let uri = &self.target[Position::BeforePath..Position::AfterQuery];
                digest.generate_auth_token(
                    self.template.method_str(),
                    uri,
                    &credentials.name,
                    credentials.password(),
                )
            }
            _ => Err(NetError::UnsupportedAuthScheme),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(field: &str, values: &[&str]) -> HttpHeader {
        let mut h = HttpHeader::new();
        for v in values {
            h.add_field(field, v).unwrap();
        }
        h
    }

    #[test]
    fn test_basic_challenge() {
        let h = header("WWW-Authenticate", &["Basic realm=\"x\""]);
        let c = Challenge::from_response(401, &h).unwrap();
        assert_eq!(c.scheme, AuthScheme::WwwBasic);
        assert_eq!(c.realm, "x");
        assert!(c.digest.is_none());
    }

    #[test]
    fn test_digest_preferred_over_basic() {
        let h = header(
            "WWW-Authenticate",
            &[
                "Basic realm=\"plain\"",
                "Digest realm=\"secure\", nonce=\"abc\", qop=\"auth\"",
            ],
        );
        let c = Challenge::from_response(401, &h).unwrap();
        assert_eq!(c.scheme, AuthScheme::WwwDigest);
        assert_eq!(c.realm, "secure");
    }

    #[test]
    fn test_proxy_challenge() {
        let h = header("Proxy-Authenticate", &["Basic realm=\"corp\""]);
        let c = Challenge::from_response(407, &h).unwrap();
        assert_eq!(c.scheme, AuthScheme::ProxyBasic);
        assert!(c.scheme.is_proxy());
        assert_eq!(c.scheme.authorization_field(), "Proxy-Authorization");
        // The server header is ignored on a 407
        assert!(Challenge::from_response(401, &h).is_none());
    }

    #[test]
    fn test_ntlm_and_unknown() {
        let h = header("WWW-Authenticate", &["NTLM", "Bearer realm=\"api\""]);
        let c = Challenge::from_response(401, &h).unwrap();
        assert_eq!(c.scheme, AuthScheme::WwwNtlm);
        assert!(Challenge::from_response(200, &h).is_none());
    }

    #[test]
    fn test_credentials_debug_redacts() {
        let creds = HttpCredentials::new("user", "hunter2");
        let shown = format!("{:?}", creds);
        assert!(shown.contains("user"));
        assert!(!shown.contains("hunter2"));
    }
}
