#![allow(dead_code)]

//! Shared utilities for integration testing.
//!
//! Upstreams are raw TCP servers so tests control every header byte,
//! including lengths that do not match the body.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use media_proxy::config::{ProxyConfig, RecordConfig};
use media_proxy::http::HttpServer;
use media_proxy::lifecycle::Shutdown;
use media_proxy::security::StaticResolver;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Name every test upstream is reached through. Allow-listed, so plain
/// `http` to a loopback address is permitted for it.
pub const UPSTREAM_HOST: &str = "cdn.example";

pub const JPEG: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x01, 0x00, 0x00, 0x01,
    0x00, 0x01, 0x00, 0x00, 0xFF, 0xDB, 0x00, 0x43, 0x00, 0x08, 0x06, 0x06, 0x07, 0x06, 0x05, 0x08,
    0x07, 0x07, 0x07, 0x09, 0x09, 0x08, 0x0A, 0x0C, 0x14, 0x0D, 0x0C, 0x0B, 0x0B, 0x0C, 0x19, 0x12,
    0xFF, 0xD9,
];

/// What a mock upstream sends back.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// `Some(n)` sends `Content-Length: n` verbatim, whatever the body size.
    /// `None` sends no length and closes the connection after the body.
    pub content_length: Option<u64>,
    /// Wait this long before answering.
    pub delay: Duration,
    /// Send this many body bytes, then pause for the given time before the rest.
    pub stall: Option<(usize, Duration)>,
}

impl MockResponse {
    pub fn ok(content_type: Option<&str>, body: &[u8]) -> Self {
        let mut headers = Vec::new();
        if let Some(ct) = content_type {
            headers.push(("Content-Type".to_string(), ct.to_string()));
        }
        Self {
            status: 200,
            headers,
            body: body.to_vec(),
            content_length: Some(body.len() as u64),
            delay: Duration::ZERO,
            stall: None,
        }
    }

    pub fn redirect(location: &str) -> Self {
        Self {
            status: 302,
            headers: vec![("Location".to_string(), location.to_string())],
            body: Vec::new(),
            content_length: Some(0),
            delay: Duration::ZERO,
            stall: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
            content_length: Some(0),
            delay: Duration::ZERO,
            stall: None,
        }
    }

    pub fn with_content_length(mut self, length: Option<u64>) -> Self {
        self.content_length = length;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_stall_after(mut self, bytes: usize, pause: Duration) -> Self {
        self.stall = Some((bytes, pause));
        self
    }
}

/// A running mock upstream.
pub struct MockUpstream {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl MockUpstream {
    /// Requests received so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// URL of `path` on this upstream, via the allow-listed name.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}:{}{}", UPSTREAM_HOST, self.addr.port(), path)
    }
}

/// Start a programmable upstream. `f` maps the request path to a response.
pub async fn start_mock_upstream<F>(f: F) -> MockUpstream
where
    F: Fn(&str) -> MockResponse + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let f = Arc::new(f);

    let counter = hits.clone();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let f = f.clone();
                    let counter = counter.clone();
                    tokio::spawn(async move {
                        handle_connection(socket, &counter, f.as_ref()).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    MockUpstream { addr, hits }
}

async fn handle_connection<F>(mut socket: TcpStream, counter: &AtomicUsize, f: &F)
where
    F: Fn(&str) -> MockResponse,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    counter.fetch_add(1, Ordering::SeqCst);

    let head = String::from_utf8_lossy(&buf);
    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
    let response = f(&path);

    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }
    write_response(&mut socket, &response).await;
}

async fn write_response(socket: &mut TcpStream, response: &MockResponse) {
    let mut head = format!("HTTP/1.1 {} Mock\r\nConnection: close\r\n", response.status);
    for (name, value) in &response.headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    if let Some(len) = response.content_length {
        head.push_str(&format!("Content-Length: {len}\r\n"));
    }
    head.push_str("\r\n");

    if socket.write_all(head.as_bytes()).await.is_err() {
        return;
    }
    let (first, rest) = match response.stall {
        Some((n, _)) => response.body.split_at(n.min(response.body.len())),
        None => (&response.body[..], &[][..]),
    };
    if write_body(socket, first).await.is_err() {
        return;
    }
    if let Some((_, pause)) = response.stall {
        let _ = socket.flush().await;
        tokio::time::sleep(pause).await;
    }
    if write_body(socket, rest).await.is_err() {
        return;
    }
    let _ = socket.shutdown().await;
}

async fn write_body(socket: &mut TcpStream, body: &[u8]) -> std::io::Result<()> {
    for piece in body.chunks(16 * 1024) {
        socket.write_all(piece).await?;
    }
    Ok(())
}

/// Resolver that sends the test upstream name to loopback.
pub fn loopback_resolver() -> StaticResolver {
    StaticResolver::new().with_host(UPSTREAM_HOST, &[IpAddr::V4(Ipv4Addr::LOCALHOST)])
}

/// Config with the test upstream allow-listed and the given records.
pub fn config_with_records(records: &[(&str, String, &str)]) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.allow_list.hosts = vec![UPSTREAM_HOST.to_string()];
    config.records = records
        .iter()
        .map(|(id, url, filename)| RecordConfig {
            id: id.to_string(),
            url: url.clone(),
            filename: filename.to_string(),
        })
        .collect();
    config
}

/// A running proxy bound to an ephemeral port.
pub struct TestProxy {
    pub addr: SocketAddr,
    shutdown: Shutdown,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_proxy(config: ProxyConfig, resolver: StaticResolver) -> TestProxy {
    let server = HttpServer::with_resolver(config, Arc::new(resolver)).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    TestProxy { addr, shutdown }
}

/// Client for talking to the proxy itself.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
