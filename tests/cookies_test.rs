use nethttp::base::neterror::NetError;
use nethttp::cookies::httpcookie::HttpCookie;
use nethttp::cookies::jar::CookieJar;
use time::{Duration, OffsetDateTime};
use url::Url;

#[test]
fn test_domain_and_path_matching() {
    let jar = CookieJar::new();
    let url = Url::parse("https://www.example.com/account/settings").unwrap();
    jar.parse_and_save_cookie(&url, "sid=abc; Domain=example.com; Path=/account")
        .unwrap();
    jar.parse_and_save_cookie(&url, "theme=dark; Path=/").unwrap();

    assert_eq!(
        jar.get_cookies("https://www.example.com/account/profile").unwrap(),
        "sid=abc; theme=dark"
    );
    assert_eq!(jar.get_cookies("https://api.example.com/account").unwrap(), "sid=abc");
    assert_eq!(jar.get_cookies("https://www.example.com/home").unwrap(), "theme=dark");
    assert_eq!(jar.get_cookies("https://other.org/").unwrap(), "");
}

#[test]
fn test_secure_cookie_needs_https() {
    let jar = CookieJar::new();
    let url = Url::parse("https://example.com/").unwrap();
    jar.parse_and_save_cookie(&url, "token=1; Secure").unwrap();

    assert_eq!(jar.get_cookies("http://example.com/").unwrap(), "");
    assert_eq!(jar.get_cookies("https://example.com/").unwrap(), "token=1");
}

#[test]
fn test_same_name_replaces() {
    let jar = CookieJar::new();
    let url = Url::parse("http://example.com/").unwrap();
    jar.parse_and_save_cookie(&url, "a=1").unwrap();
    jar.parse_and_save_cookie(&url, "a=2").unwrap();
    assert_eq!(jar.total_cookie_count(), 1);
    assert_eq!(jar.get_cookies("http://example.com/").unwrap(), "a=2");
}

#[test]
fn test_expired_cookie_not_sent() {
    let jar = CookieJar::new();
    let url = Url::parse("http://example.com/").unwrap();
    let mut cookie = HttpCookie::parse(&url, "old=1").unwrap();
    cookie.expires = Some(OffsetDateTime::now_utc() - Duration::hours(1));
    assert!(cookie.is_expired(OffsetDateTime::now_utc()));
    jar.set_cookie(cookie);

    assert_eq!(jar.get_cookies("http://example.com/").unwrap(), "");
}

#[test]
fn test_remove_cookies_for_url() {
    let jar = CookieJar::new();
    let a = Url::parse("http://a.test/").unwrap();
    let b = Url::parse("http://b.test/").unwrap();
    jar.parse_and_save_cookie(&a, "x=1").unwrap();
    jar.parse_and_save_cookie(&b, "y=2").unwrap();

    jar.remove_cookies("http://a.test/").unwrap();
    assert_eq!(jar.get_cookies("http://a.test/").unwrap(), "");
    assert_eq!(jar.get_cookies("http://b.test/").unwrap(), "y=2");
}

#[test]
fn test_remove_all_is_idempotent() {
    let jar = CookieJar::new();
    let url = Url::parse("http://example.com/").unwrap();
    jar.parse_and_save_cookie(&url, "a=1").unwrap();

    jar.remove_all_cookies();
    jar.remove_all_cookies();
    assert_eq!(jar.total_cookie_count(), 0);
    assert_eq!(jar.get_cookies("http://example.com/").unwrap(), "");
}

#[test]
fn test_invalid_url() {
    let jar = CookieJar::new();
    assert_eq!(jar.get_cookies("not a url"), Err(NetError::InvalidArgument));
    assert_eq!(jar.remove_cookies("mailto:someone@example.com"), Err(NetError::InvalidArgument));
}
