use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nethttp::cookies::httpcookie::HttpCookie;
use nethttp::cookies::jar::CookieJar;
use url::Url;

fn benchmark_cookie_parse(c: &mut Criterion) {
    let url = Url::parse("https://example.com/account").unwrap();

    c.bench_function("cookie_parse", |b| {
        b.iter(|| {
            HttpCookie::parse(
                black_box(&url),
                black_box("sid=abc123; Domain=example.com; Path=/; Max-Age=3600; Secure; HttpOnly"),
            )
            .unwrap()
        })
    });
}

fn benchmark_cookie_insert(c: &mut Criterion) {
    let jar = CookieJar::new();
    let url = Url::parse("https://example.com").unwrap();

    c.bench_function("cookie_parse_and_save", |b| {
        b.iter(|| {
            jar.parse_and_save_cookie(black_box(&url), black_box("foo=bar; Path=/; Secure"));
        })
    });
}

fn benchmark_cookie_get(c: &mut Criterion) {
    let jar = CookieJar::new();
    let url = Url::parse("https://www.example.com/foo/bar").unwrap();
    for i in 0..100 {
        jar.parse_and_save_cookie(&url, &format!("cookie{}=val; Path=/foo", i));
    }

    c.bench_function("cookie_get_for_url", |b| {
        b.iter(|| black_box(jar.get_cookies(black_box("https://www.example.com/foo/bar")).unwrap()))
    });
}

criterion_group!(benches, benchmark_cookie_parse, benchmark_cookie_insert, benchmark_cookie_get);
criterion_main!(benches);
