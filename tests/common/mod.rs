#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

/// One request as seen by the mock server, with the body de-chunked.
#[derive(Debug, Clone, Default)]
pub struct Recorded {
    pub head: String,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or("")
    }

    /// First value of `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<String> {
        self.head.lines().skip(1).find_map(|line| {
            let (n, v) = line.split_once(':')?;
            n.trim()
                .eq_ignore_ascii_case(name)
                .then(|| v.trim().to_string())
        })
    }

    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub async fn read_request<R: AsyncBufRead + Unpin>(reader: &mut R) -> Option<Recorded> {
    let mut head = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await.ok()? == 0 {
            return None;
        }
        if line == "\r\n" {
            if head.is_empty() {
                continue;
            }
            break;
        }
        head.push_str(&line);
    }

    let mut req = Recorded {
        head,
        body: Vec::new(),
    };
    if let Some(len) = req.header("Content-Length") {
        let len: usize = len.parse().ok()?;
        req.body = vec![0u8; len];
        reader.read_exact(&mut req.body).await.ok()?;
    } else if req
        .header("Transfer-Encoding")
        .map_or(false, |te| te.eq_ignore_ascii_case("chunked"))
    {
        loop {
            let mut size_line = String::new();
            reader.read_line(&mut size_line).await.ok()?;
            let size = usize::from_str_radix(size_line.trim(), 16).ok()?;
            if size == 0 {
                let mut crlf = String::new();
                reader.read_line(&mut crlf).await.ok()?;
                break;
            }
            let mut chunk = vec![0u8; size + 2];
            reader.read_exact(&mut chunk).await.ok()?;
            req.body.extend_from_slice(&chunk[..size]);
        }
    }
    Some(req)
}

pub type Handler = Arc<dyn Fn(&Recorded) -> Vec<u8> + Send + Sync>;

/// Keep-alive mock server. Every request is recorded and answered with
/// whatever `handler` returns.
pub struct MockServer {
    pub base_url: String,
    pub requests: Arc<Mutex<Vec<Recorded>>>,
    pub connections: Arc<Mutex<usize>>,
}

impl MockServer {
    pub async fn start(handler: Handler) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(Mutex::new(0usize));

        let recorded = requests.clone();
        let accepted = connections.clone();
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                *accepted.lock().unwrap() += 1;
                let handler = handler.clone();
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    let (read, mut write) = socket.into_split();
                    let mut reader = BufReader::new(read);
                    while let Some(req) = read_request(&mut reader).await {
                        let response = handler(&req);
                        recorded.lock().unwrap().push(req);
                        if write.write_all(&response).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            requests,
            connections,
        }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn connection_count(&self) -> usize {
        *self.connections.lock().unwrap()
    }
}

pub fn ok(body: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
    .into_bytes()
}

/// Accepts connections and never answers.
pub async fn silent_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{}", addr)
}

/// Self-signed certificate for `localhost`, valid for one day.
fn self_signed() -> (boring::pkey::PKey<boring::pkey::Private>, boring::x509::X509) {
    use boring::asn1::Asn1Time;
    use boring::bn::BigNum;
    use boring::hash::MessageDigest;
    use boring::pkey::PKey;
    use boring::rsa::Rsa;
    use boring::x509::{X509NameBuilder, X509};

    let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", "localhost").unwrap();
    let name = name.build();

    let mut cert = X509::builder().unwrap();
    cert.set_version(2).unwrap();
    let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
    cert.set_serial_number(&serial).unwrap();
    cert.set_subject_name(&name).unwrap();
    cert.set_issuer_name(&name).unwrap();
    cert.set_pubkey(&key).unwrap();
    cert.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
    cert.set_not_after(&Asn1Time::days_from_now(1).unwrap()).unwrap();
    cert.sign(&key, MessageDigest::sha256()).unwrap();
    (key, cert.build())
}

/// TLS server with an untrusted self-signed certificate. Answers every
/// request with `body`.
pub async fn tls_server(body: &'static str) -> String {
    use boring::ssl::{SslAcceptor, SslMethod};

    let (key, cert) = self_signed();
    let mut acceptor = SslAcceptor::mozilla_intermediate(SslMethod::tls()).unwrap();
    acceptor.set_private_key(&key).unwrap();
    acceptor.set_certificate(&cert).unwrap();
    let acceptor = acceptor.build();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let Ok(stream) = tokio_boring::accept(&acceptor, socket).await else {
                    return;
                };
                let (read, mut write) = tokio::io::split(stream);
                let mut reader = BufReader::new(read);
                while read_request(&mut reader).await.is_some() {
                    if write.write_all(&ok(body)).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    format!("https://127.0.0.1:{}", addr.port())
}
