use crate::base::neterror::NetError;
use crate::cookies::httpcookie::{domain_matches, path_matches, HttpCookie};
use dashmap::DashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use url::Url;

/// Maximum cookies per domain.
const MAX_COOKIES_PER_DOMAIN: usize = 50;

/// Maximum total cookies.
const MAX_COOKIES_TOTAL: usize = 3000;

/// Cookie storage shared by every transaction of a session.
///
/// Cloning is cheap; clones share the same store.
#[derive(Clone, Default)]
pub struct CookieJar {
    // Map<Domain, List<Cookie>>
    store: Arc<DashMap<String, Vec<HttpCookie>>>,
}

impl std::fmt::Debug for CookieJar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieJar")
            .field("cookies", &self.total_cookie_count())
            .finish()
    }
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `cookie`, replacing one with the same name, domain and path.
    /// An already expired cookie only deletes its stored counterpart.
    pub fn set_cookie(&self, cookie: HttpCookie) {
        let mut entry = self.store.entry(cookie.domain.clone()).or_default();
        entry.retain(|c| c.name != cookie.name || c.path != cookie.path);

        if cookie.is_expired(OffsetDateTime::now_utc()) {
            tracing::debug!(name = %cookie.name, domain = %cookie.domain, "expired cookie removed");
            return;
        }

        // Per-domain limit, oldest first
        while entry.len() >= MAX_COOKIES_PER_DOMAIN {
            match entry
                .iter()
                .enumerate()
                .min_by_key(|(_, c)| c.creation_time)
                .map(|(i, _)| i)
            {
                Some(oldest_idx) => {
                    entry.remove(oldest_idx);
                }
                None => break,
            }
        }

        entry.push(cookie);
        drop(entry); // Release lock before checking global count

        self.enforce_global_limit();
    }

    /// Parses a `Set-Cookie` value received from `url` and stores it.
    /// Returns the stored cookie, or `None` when the line was rejected.
    pub fn parse_and_save_cookie(&self, url: &Url, cookie_line: &str) -> Option<HttpCookie> {
        match HttpCookie::parse(url, cookie_line) {
            Ok(cookie) => {
                self.set_cookie(cookie.clone());
                Some(cookie)
            }
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "rejected Set-Cookie");
                None
            }
        }
    }

    fn enforce_global_limit(&self) {
        while self.total_cookie_count() > MAX_COOKIES_TOTAL {
            let mut oldest: Option<(String, usize, OffsetDateTime)> = None;

            for entry in self.store.iter() {
                for (idx, cookie) in entry.value().iter().enumerate() {
                    let older = oldest
                        .as_ref()
                        .map_or(true, |(_, _, time)| cookie.creation_time < *time);
                    if older {
                        oldest = Some((entry.key().clone(), idx, cookie.creation_time));
                    }
                }
            }

            let Some((domain, idx, _)) = oldest else {
                break;
            };
            if let Some(mut entry) = self.store.get_mut(&domain) {
                if idx < entry.len() {
                    entry.remove(idx);
                }
            }
        }
    }

    /// Cookies that should accompany a request to `url`, most specific
    /// path first.
    pub fn cookies_for_url(&self, url: &Url) -> Vec<HttpCookie> {
        let host = url.host_str().unwrap_or("");
        let now = OffsetDateTime::now_utc();

        let mut result: Vec<HttpCookie> = candidate_domains(host)
            .iter()
            .filter_map(|domain| self.store.get(domain))
            .flat_map(|entry| entry.value().clone())
            .filter(|c| domain_matches(&c.domain, host, c.host_only))
            .filter(|c| path_matches(&c.path, url.path()))
            .filter(|c| !c.secure || url.scheme() == "https")
            .filter(|c| !c.is_expired(now))
            .collect();

        result.sort_by(|a, b| {
            b.path
                .len()
                .cmp(&a.path.len())
                .then_with(|| a.creation_time.cmp(&b.creation_time))
        });
        result
    }

    /// `Cookie` header value for `url`, or `None` when nothing matches.
    pub(crate) fn cookie_header(&self, url: &Url) -> Option<String> {
        let cookies = self.cookies_for_url(url);
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// `name=value` pairs that apply to `url`, joined with `"; "`.
    /// Empty when no cookie applies.
    pub fn get_cookies(&self, url: &str) -> Result<String, NetError> {
        let url = parse_cookie_url(url)?;
        Ok(self.cookie_header(&url).unwrap_or_default())
    }

    /// Deletes every stored cookie that applies to `url`, regardless of
    /// its `Secure` flag or expiry.
    pub fn remove_cookies(&self, url: &str) -> Result<(), NetError> {
        let url = parse_cookie_url(url)?;
        let host = url.host_str().unwrap_or("");

        for domain in candidate_domains(host) {
            if let Some(mut entry) = self.store.get_mut(&domain) {
                entry.retain(|c| {
                    !(domain_matches(&c.domain, host, c.host_only)
                        && path_matches(&c.path, url.path()))
                });
            }
        }
        self.store.retain(|_, cookies| !cookies.is_empty());
        Ok(())
    }

    /// Deletes every cookie. Idempotent.
    pub fn remove_all_cookies(&self) {
        self.store.clear();
    }

    pub fn total_cookie_count(&self) -> usize {
        self.store.iter().map(|e| e.value().len()).sum()
    }

    pub fn iter_all_cookies(&self) -> impl Iterator<Item = HttpCookie> + '_ {
        self.store.iter().flat_map(|entry| entry.value().clone())
    }
}

fn parse_cookie_url(url: &str) -> Result<Url, NetError> {
    let url = Url::parse(url).map_err(|_| NetError::InvalidArgument)?;
    if url.host_str().is_none() {
        return Err(NetError::InvalidArgument);
    }
    Ok(url)
}

/// The host itself and every parent domain
/// ("a.b.example.com" -> "b.example.com", "example.com").
fn candidate_domains(host: &str) -> Vec<String> {
    let host = host.to_ascii_lowercase();
    let mut domains = vec![host.clone()];
    let parts: Vec<&str> = host.split('.').collect();
    for i in 1..parts.len().saturating_sub(1) {
        domains.push(parts[i..].join("."));
    }
    domains
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_replaces_same_name_and_path() {
        let jar = CookieJar::new();
        let u = url("http://example.com/");
        jar.parse_and_save_cookie(&u, "a=1");
        jar.parse_and_save_cookie(&u, "a=2");
        assert_eq!(jar.total_cookie_count(), 1);
        assert_eq!(jar.get_cookies("http://example.com/").unwrap(), "a=2");
    }

    #[test]
    fn test_expired_cookie_deletes() {
        let jar = CookieJar::new();
        let u = url("http://example.com/");
        jar.parse_and_save_cookie(&u, "a=1");
        jar.parse_and_save_cookie(&u, "a=gone; Max-Age=0");
        assert_eq!(jar.total_cookie_count(), 0);
    }

    #[test]
    fn test_per_domain_limit_evicts_oldest() {
        let jar = CookieJar::new();
        let u = url("http://example.com/");
        let base = OffsetDateTime::now_utc() - Duration::hours(1);
        for i in 0..(MAX_COOKIES_PER_DOMAIN + 5) {
            let mut c = HttpCookie::parse(&u, &format!("c{}=v", i)).unwrap();
            c.creation_time = base + Duration::seconds(i as i64);
            jar.set_cookie(c);
        }
        assert_eq!(jar.total_cookie_count(), MAX_COOKIES_PER_DOMAIN);
        assert!(!jar.iter_all_cookies().any(|c| c.name == "c0"));
        assert!(jar.iter_all_cookies().any(|c| c.name == "c54"));
    }

    #[test]
    fn test_parent_domain_lookup() {
        let jar = CookieJar::new();
        let u = url("http://a.example.com/");
        jar.parse_and_save_cookie(&u, "host=1");
        jar.parse_and_save_cookie(&u, "dom=2; Domain=example.com");

        let names: Vec<_> = jar
            .cookies_for_url(&url("http://b.a.example.com/"))
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["dom"]);
    }

    #[test]
    fn test_get_cookies_invalid_url() {
        let jar = CookieJar::new();
        assert_eq!(jar.get_cookies("not a url"), Err(NetError::InvalidArgument));
    }

    #[test]
    fn test_candidate_domains() {
        assert_eq!(
            candidate_domains("a.b.example.com"),
            vec!["a.b.example.com", "b.example.com", "example.com"]
        );
        assert_eq!(candidate_domains("localhost"), vec!["localhost"]);
    }
}
