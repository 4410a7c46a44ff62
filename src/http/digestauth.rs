//! Digest access authentication (RFC 7616, RFC 2617).
//!
//! A [`DigestAuthHandler`] is built from the parameters of one `Digest`
//! challenge and produces the `Authorization` (or `Proxy-Authorization`)
//! value for each retried request. MD5, MD5-sess, SHA-256 and
//! SHA-256-sess are supported with `qop=auth`; a challenge without a usable
//! qop is answered in RFC 2069 form.

use crate::base::neterror::NetError;
use boring::hash::{hash, MessageDigest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlgorithm {
    /// Challenge named no algorithm: MD5, and nothing is echoed back.
    #[default]
    Unspecified,
    Md5,
    Md5Sess,
    Sha256,
    Sha256Sess,
}

impl DigestAlgorithm {
    fn from_token(token: &str) -> Result<Self, NetError> {
        const KNOWN: [(&str, DigestAlgorithm); 4] = [
            ("MD5", DigestAlgorithm::Md5),
            ("MD5-sess", DigestAlgorithm::Md5Sess),
            ("SHA-256", DigestAlgorithm::Sha256),
            ("SHA-256-sess", DigestAlgorithm::Sha256Sess),
        ];
        KNOWN
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(token))
            .map(|(_, algorithm)| *algorithm)
            .ok_or(NetError::UnsupportedAuthScheme)
    }

    fn token(self) -> Option<&'static str> {
        match self {
            Self::Unspecified => None,
            Self::Md5 => Some("MD5"),
            Self::Md5Sess => Some("MD5-sess"),
            Self::Sha256 => Some("SHA-256"),
            Self::Sha256Sess => Some("SHA-256-sess"),
        }
    }

    fn digest(self) -> MessageDigest {
        match self {
            Self::Sha256 | Self::Sha256Sess => MessageDigest::sha256(),
            _ => MessageDigest::md5(),
        }
    }

    fn hex(self, input: &str) -> Result<String, NetError> {
        let bytes = hash(self.digest(), input.as_bytes()).map_err(|_| NetError::System)?;
        Ok(to_hex(&bytes))
    }
}

/// Server parameters of one challenge plus the nonce counter for the
/// values generated from it.
#[derive(Debug, Clone)]
pub struct DigestAuthHandler {
    realm: String,
    nonce: String,
    opaque: Option<String>,
    algorithm: DigestAlgorithm,
    qop_auth: bool,
    stale: bool,
    userhash: bool,
    nonce_count: u32,
}

impl DigestAuthHandler {
    /// Parses the text after the `Digest` token, e.g.
    /// `realm="api", nonce="abc123", qop="auth"`.
    ///
    /// A missing nonce is `InvalidResponse`; an algorithm this crate cannot
    /// compute is `UnsupportedAuthScheme`.
    pub fn parse_challenge(params: &str) -> Result<Self, NetError> {
        let mut realm = String::new();
        let mut nonce = None;
        let mut opaque = None;
        let mut algorithm = DigestAlgorithm::Unspecified;
        let mut qop_auth = false;
        let mut stale = false;
        let mut userhash = false;

        for param in split_params(params) {
            let (key, value) = parse_param(param)?;
            let flag = value.eq_ignore_ascii_case("true");
            match key.to_ascii_lowercase().as_str() {
                "realm" => realm = value.to_string(),
                "nonce" => nonce = Some(value.to_string()),
                "opaque" => opaque = Some(value.to_string()),
                "algorithm" => algorithm = DigestAlgorithm::from_token(value)?,
                "qop" => qop_auth = value.split(',').any(|q| q.trim().eq_ignore_ascii_case("auth")),
                "stale" => stale = flag,
                "userhash" => userhash = flag,
                _ => {}
            }
        }

        let nonce = nonce.filter(|n| !n.is_empty()).ok_or(NetError::InvalidResponse)?;
        Ok(Self {
            realm,
            nonce,
            opaque,
            algorithm,
            qop_auth,
            stale,
            userhash,
            nonce_count: 0,
        })
    }

    /// `Digest ...` header value for one request. `uri` is the request
    /// target exactly as it appears on the request line.
    pub fn generate_auth_token(
        &mut self,
        method: &str,
        uri: &str,
        username: &str,
        password: &str,
    ) -> Result<String, NetError> {
        let cnonce = random_cnonce()?;
        self.token_with_cnonce(method, uri, username, password, &cnonce)
    }

    fn token_with_cnonce(
        &mut self,
        method: &str,
        uri: &str,
        username: &str,
        password: &str,
        cnonce: &str,
    ) -> Result<String, NetError> {
        self.nonce_count = self.nonce_count.wrapping_add(1);
        let nc = format!("{:08x}", self.nonce_count);
        let alg = self.algorithm;

        let mut ha1 = alg.hex(&[username, self.realm.as_str(), password].join(":"))?;
        if matches!(alg, DigestAlgorithm::Md5Sess | DigestAlgorithm::Sha256Sess) {
            ha1 = alg.hex(&[ha1.as_str(), self.nonce.as_str(), cnonce].join(":"))?;
        }
        let ha2 = alg.hex(&[method, uri].join(":"))?;
        let response = if self.qop_auth {
            alg.hex(&[ha1.as_str(), self.nonce.as_str(), nc.as_str(), cnonce, "auth", ha2.as_str()].join(":"))?
        } else {
            alg.hex(&[ha1.as_str(), self.nonce.as_str(), ha2.as_str()].join(":"))?
        };
        let user = if self.userhash {
            alg.hex(&[username, self.realm.as_str()].join(":"))?
        } else {
            username.to_string()
        };

        let mut fields: Vec<(&str, String, bool)> = vec![
            ("username", user, true),
            ("realm", self.realm.clone(), true),
            ("nonce", self.nonce.clone(), true),
            ("uri", uri.to_string(), true),
        ];
        if let Some(token) = alg.token() {
            fields.push(("algorithm", token.to_string(), false));
        }
        fields.push(("response", response, true));
        if let Some(opaque) = &self.opaque {
            fields.push(("opaque", opaque.clone(), true));
        }
        if self.qop_auth {
            fields.push(("qop", "auth".to_string(), false));
            fields.push(("nc", nc, false));
            fields.push(("cnonce", cnonce.to_string(), true));
        }
        if self.userhash {
            fields.push(("userhash", "true".to_string(), false));
        }

        let params: Vec<String> = fields
            .into_iter()
            .map(|(key, value, quoted)| match quoted {
                true => format!("{}=\"{}\"", key, value),
                false => format!("{}={}", key, value),
            })
            .collect();
        Ok(format!("Digest {}", params.join(", ")))
    }

    /// True when the server flagged the previous nonce as expired.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }
}

fn random_cnonce() -> Result<String, NetError> {
    let mut buf = [0u8; 8];
    boring::rand::rand_bytes(&mut buf).map_err(|_| NetError::System)?;
    Ok(to_hex(&buf))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Splits a challenge parameter list on commas outside quoted strings.
pub(crate) fn split_params(params: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut quoted = false;
    let mut from = 0;
    for (idx, ch) in params.char_indices() {
        if ch == '"' {
            quoted = !quoted;
        } else if ch == ',' && !quoted {
            out.push(&params[from..idx]);
            from = idx + 1;
        }
    }
    out.push(&params[from..]);
    out.into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// `key=value` or `key="value"`.
pub(crate) fn parse_param(param: &str) -> Result<(&str, &str), NetError> {
    let (key, raw) = param.split_once('=').ok_or(NetError::InvalidResponse)?;
    let raw = raw.trim();
    let value = match raw.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        Some(inner) => inner,
        None => raw,
    };
    Ok((key.trim(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RFC2617_CHALLENGE: &str = r#"realm="testrealm@host.com", qop="auth,auth-int", nonce="dcd98b7102dd2f0e8b11d0f600bfb0c093", opaque="5ccc069c403ebaf9f0171e9517f40e41""#;

    #[test]
    fn test_rfc2617_example() {
        let mut handler = DigestAuthHandler::parse_challenge(RFC2617_CHALLENGE).unwrap();
        let token = handler
            .token_with_cnonce("GET", "/dir/index.html", "Mufasa", "Circle Of Life", "0a4f113b")
            .unwrap();

        assert_eq!(
            token,
            "Digest username=\"Mufasa\", realm=\"testrealm@host.com\", \
             nonce=\"dcd98b7102dd2f0e8b11d0f600bfb0c093\", uri=\"/dir/index.html\", \
             response=\"6629fae49393a05397450978507c4ef1\", \
             opaque=\"5ccc069c403ebaf9f0171e9517f40e41\", qop=auth, nc=00000001, \
             cnonce=\"0a4f113b\""
        );
    }

    #[test]
    fn test_challenge_fields() {
        let handler = DigestAuthHandler::parse_challenge(
            r#"realm="vault", nonce="abc", algorithm=sha-256-sess, stale=TRUE"#,
        )
        .unwrap();
        assert_eq!(handler.realm(), "vault");
        assert_eq!(handler.algorithm(), DigestAlgorithm::Sha256Sess);
        assert!(handler.is_stale());
        assert!(!handler.qop_auth);
    }

    #[test]
    fn test_challenge_errors() {
        assert_eq!(
            DigestAuthHandler::parse_challenge(r#"realm="x""#).err(),
            Some(NetError::InvalidResponse)
        );
        assert_eq!(
            DigestAuthHandler::parse_challenge(r#"realm="x", nonce="n", algorithm=SHA-512-256"#).err(),
            Some(NetError::UnsupportedAuthScheme)
        );
        assert!(DigestAuthHandler::parse_challenge("realm").is_err());
    }

    #[test]
    fn test_nonce_count_advances() {
        let mut handler =
            DigestAuthHandler::parse_challenge(r#"realm="r", nonce="n", qop="auth""#).unwrap();
        let first = handler.token_with_cnonce("GET", "/", "u", "p", "c").unwrap();
        let second = handler.token_with_cnonce("GET", "/", "u", "p", "c").unwrap();
        assert!(first.contains("nc=00000001"));
        assert!(second.contains("nc=00000002"));
        assert_ne!(first, second);
    }

    #[test]
    fn test_rfc2069_form_without_qop() {
        let mut handler = DigestAuthHandler::parse_challenge(r#"realm="r", nonce="n""#).unwrap();
        let token = handler.generate_auth_token("GET", "/", "u", "p").unwrap();

        let md5 = DigestAlgorithm::Md5;
        let ha1 = md5.hex("u:r:p").unwrap();
        let ha2 = md5.hex("GET:/").unwrap();
        let expected = md5.hex(&format!("{}:n:{}", ha1, ha2)).unwrap();
        assert!(token.contains(&format!("response=\"{}\"", expected)));
        assert!(!token.contains("qop="));
        assert!(!token.contains("algorithm="));
    }

    #[test]
    fn test_sha256_digest() {
        assert_eq!(
            DigestAlgorithm::Sha256.hex("test").unwrap(),
            "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        );
        assert_eq!(
            DigestAlgorithm::Unspecified.hex("test").unwrap(),
            "098f6bcd4621d373cade4e832627b4f6"
        );
    }

    #[test]
    fn test_userhash_hides_name() {
        let mut handler =
            DigestAuthHandler::parse_challenge(r#"realm="r", nonce="n", userhash=true"#).unwrap();
        let token = handler.token_with_cnonce("GET", "/", "alice", "pw", "c").unwrap();
        let hashed = DigestAlgorithm::Md5.hex("alice:r").unwrap();
        assert!(token.starts_with(&format!("Digest username=\"{}\"", hashed)));
        assert!(token.ends_with("userhash=true"));
    }

    #[test]
    fn test_split_params_respects_quotes() {
        let parts = split_params(r#" realm="a, b", nonce=x ,, "#);
        assert_eq!(parts, vec![r#"realm="a, b""#, "nonce=x"]);
        assert_eq!(parse_param(parts[0]).unwrap(), ("realm", "a, b"));
        assert_eq!(parse_param("nonce= x ").unwrap(), ("nonce", "x"));
    }
}
