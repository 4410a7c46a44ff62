use crate::base::neterror::NetError;
use psl::{List, Psl};
use time::{Duration, OffsetDateTime};
use url::{Host, Url};

/// A cookie received in a `Set-Cookie` header.
///
/// Carries both the RFC 6265 attributes and the RFC 2965 ones
/// (`Version`, `Comment`, `CommentURL`, `Port`, `Discard`) some servers
/// still send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// 0 for Netscape style cookies, 1 when the server sent `Version=1`.
    pub version: u32,
    /// Absolute expiry. Derived from `Max-Age` when present.
    pub expires: Option<OffsetDateTime>,
    /// Raw `Max-Age` in seconds.
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
    pub comment: Option<String>,
    pub comment_url: Option<String>,
    pub ports: Option<String>,
    pub discard: bool,
    /// Set when the cookie had no `Domain` attribute and only matches the
    /// exact host that set it.
    pub host_only: bool,
    pub creation_time: OffsetDateTime,
}

impl HttpCookie {
    /// Parses one `Set-Cookie` value received from `url`.
    ///
    /// Fails with `InvalidContent` when the line is malformed, names a
    /// domain the URL may not set cookies for, or breaks the `__Secure-`
    /// and `__Host-` prefix rules.
    pub fn parse(url: &Url, line: &str) -> Result<Self, NetError> {
        let parsed = cookie::Cookie::parse(line).map_err(|_| NetError::InvalidContent)?;
        let host = url
            .host_str()
            .ok_or(NetError::InvalidArgument)?
            .to_ascii_lowercase();
        let now = OffsetDateTime::now_utc();

        let (domain, host_only) = match parsed.domain() {
            Some(d) if !d.trim_start_matches('.').is_empty() => {
                let d = d.trim_start_matches('.').to_ascii_lowercase();
                if d == host && is_public_suffix(&d) {
                    // RFC 6265 §5.3 step 5: the host itself, cookie stays host-only
                    (host, true)
                } else if domain_allowed(&d, url) {
                    (d, false)
                } else {
                    return Err(NetError::InvalidContent);
                }
            }
            _ => (host, true),
        };

        let path = match parsed.path() {
            Some(p) if p.starts_with('/') => p.to_string(),
            _ => default_path(url.path()),
        };

        // Max-Age wins over Expires
        let max_age = parsed.max_age().map(|d| d.whole_seconds());
        let expires = match max_age {
            Some(secs) => Some(now + Duration::seconds(secs.max(0))),
            None => parsed.expires().and_then(|e| e.datetime()),
        };

        let mut cookie = HttpCookie {
            name: parsed.name().to_string(),
            value: parsed.value().to_string(),
            domain,
            path,
            version: 0,
            expires,
            max_age,
            secure: parsed.secure().unwrap_or(false),
            http_only: parsed.http_only().unwrap_or(false),
            comment: None,
            comment_url: None,
            ports: None,
            discard: false,
            host_only,
            creation_time: now,
        };
        cookie.read_rfc2965_attributes(line);
        cookie.validate_prefix(url.scheme() == "https")?;
        Ok(cookie)
    }

    /// Picks up the attributes the `cookie` crate does not model.
    fn read_rfc2965_attributes(&mut self, line: &str) {
        for attr in line.split(';').skip(1) {
            let (key, value) = match attr.split_once('=') {
                Some((k, v)) => (k.trim(), Some(v.trim().trim_matches('"'))),
                None => (attr.trim(), None),
            };
            match (key.to_ascii_lowercase().as_str(), value) {
                ("version", Some(v)) => self.version = v.parse().unwrap_or(0),
                ("comment", Some(v)) => self.comment = Some(v.to_string()),
                ("commenturl", Some(v)) => self.comment_url = Some(v.to_string()),
                ("port", v) => self.ports = Some(v.unwrap_or_default().to_string()),
                ("discard", _) => self.discard = true,
                _ => {}
            }
        }
    }

    pub fn is_expired(&self, current_time: OffsetDateTime) -> bool {
        self.expires.is_some_and(|expiry| expiry <= current_time)
    }

    /// Validate __Secure- and __Host- cookie prefixes per RFC 6265bis.
    fn validate_prefix(&self, secure_origin: bool) -> Result<(), NetError> {
        if self.name.starts_with("__Secure-") && (!self.secure || !secure_origin) {
            return Err(NetError::InvalidContent);
        }
        if self.name.starts_with("__Host-")
            && (!self.secure || self.path != "/" || !self.host_only || !secure_origin)
        {
            return Err(NetError::InvalidContent);
        }
        Ok(())
    }
}

/// RFC 6265 domain matching.
pub(crate) fn domain_matches(cookie_domain: &str, request_host: &str, host_only: bool) -> bool {
    if host_only || cookie_domain.eq_ignore_ascii_case(request_host) {
        return cookie_domain.eq_ignore_ascii_case(request_host);
    }
    let host = request_host.to_ascii_lowercase();
    host.strip_suffix(&cookie_domain.to_ascii_lowercase())
        .is_some_and(|prefix| prefix.ends_with('.'))
}

/// RFC 6265 path matching.
pub(crate) fn path_matches(cookie_path: &str, request_path: &str) -> bool {
    match request_path.strip_prefix(cookie_path) {
        Some("") => true,
        Some(rest) => cookie_path.ends_with('/') || rest.starts_with('/'),
        None => false,
    }
}

/// RFC 6265 default-path: the request path up to, not including, its last `/`.
fn default_path(request_path: &str) -> String {
    match request_path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => request_path[..idx].to_string(),
    }
}

/// A `Domain` attribute must cover the request host and must not be a
/// public suffix such as `com` or `co.uk`.
fn domain_allowed(cookie_domain: &str, url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(host)) => {
            !is_public_suffix(cookie_domain) && domain_matches(cookie_domain, host, false)
        }
        // IP literals can only set cookies on themselves.
        Some(_) => url
            .host_str()
            .is_some_and(|h| h.eq_ignore_ascii_case(cookie_domain)),
        None => false,
    }
}

fn is_public_suffix(domain: &str) -> bool {
    List.suffix(domain.as_bytes())
        .is_some_and(|s| s.as_bytes() == domain.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_suffix_domain_equal_to_host_is_host_only() {
        let c = HttpCookie::parse(&url("http://co.uk/"), "a=1; Domain=co.uk").unwrap();
        assert_eq!(c.domain, "co.uk");
        assert!(c.host_only);
        assert!(domain_matches(&c.domain, "co.uk", c.host_only));
        assert!(!domain_matches(&c.domain, "shop.co.uk", c.host_only));

        // Any other host still may not widen a cookie to a public suffix
        assert_eq!(
            HttpCookie::parse(&url("http://shop.co.uk/"), "a=1; Domain=co.uk"),
            Err(NetError::InvalidContent)
        );
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_parse_basic() {
        let c = HttpCookie::parse(&url("http://example.com/a/b"), "sid=abc; HttpOnly").unwrap();
        assert_eq!(c.name, "sid");
        assert_eq!(c.value, "abc");
        assert_eq!(c.domain, "example.com");
        assert_eq!(c.path, "/a");
        assert!(c.host_only);
        assert!(c.http_only);
        assert!(!c.secure);
        assert_eq!(c.expires, None);
    }

    #[test]
    fn test_max_age_wins_over_expires() {
        let c = HttpCookie::parse(
            &url("http://example.com/"),
            "a=1; Expires=Wed, 21 Oct 2099 07:28:00 GMT; Max-Age=0",
        )
        .unwrap();
        assert_eq!(c.max_age, Some(0));
        assert!(c.is_expired(OffsetDateTime::now_utc()));
    }

    #[test]
    fn test_rfc2965_attributes() {
        let c = HttpCookie::parse(
            &url("http://example.com/"),
            "a=1; Version=1; Comment=\"hello\"; CommentURL=\"http://example.com/c\"; Port=\"80,8080\"; Discard",
        )
        .unwrap();
        assert_eq!(c.version, 1);
        assert_eq!(c.comment.as_deref(), Some("hello"));
        assert_eq!(c.comment_url.as_deref(), Some("http://example.com/c"));
        assert_eq!(c.ports.as_deref(), Some("80,8080"));
        assert!(c.discard);
    }

    #[test]
    fn test_public_suffix_domain_rejected() {
        let res = HttpCookie::parse(&url("http://example.com/"), "a=1; Domain=com");
        assert_eq!(res, Err(NetError::InvalidContent));
    }

    #[test]
    fn test_foreign_domain_rejected() {
        let res = HttpCookie::parse(&url("http://example.com/"), "a=1; Domain=other.org");
        assert_eq!(res, Err(NetError::InvalidContent));
    }

    #[test]
    fn test_parent_domain_accepted() {
        let c = HttpCookie::parse(&url("http://a.example.com/"), "a=1; Domain=.example.com")
            .unwrap();
        assert_eq!(c.domain, "example.com");
        assert!(!c.host_only);
    }

    #[test]
    fn test_prefix_rules() {
        assert!(HttpCookie::parse(&url("http://example.com/"), "__Secure-a=1; Secure").is_err());
        assert!(HttpCookie::parse(&url("https://example.com/"), "__Secure-a=1; Secure").is_ok());
        assert!(HttpCookie::parse(
            &url("https://example.com/"),
            "__Host-a=1; Secure; Path=/; Domain=example.com"
        )
        .is_err());
    }

    #[test]
    fn test_matching_helpers() {
        assert!(domain_matches("example.com", "a.example.com", false));
        assert!(!domain_matches("example.com", "a.example.com", true));
        assert!(!domain_matches("example.com", "badexample.com", false));

        assert!(path_matches("/", "/anything"));
        assert!(path_matches("/foo", "/foo/bar"));
        assert!(!path_matches("/foo", "/foobar"));
        assert_eq!(default_path("/"), "/");
        assert_eq!(default_path("/docs/index.html"), "/docs");
    }
}
