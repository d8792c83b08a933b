//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use traffic_balancer::config::BalancerConfig;
use traffic_balancer::health::HttpProbe;
use traffic_balancer::{Balancer, HttpServer, ServerPool, Shutdown};

/// Health check interval used by proxy tests.
pub const HEALTH_INTERVAL: Duration = Duration::from_millis(100);

/// A mock backend on an ephemeral port.
///
/// `GET /health` answers 200 while healthy and 500 otherwise. Any other
/// request is answered 200 with an `x-backend` header; the body echoes the
/// request body, or is the backend name when the request had none.
pub struct MockBackend {
    pub addr: SocketAddr,
    healthy: Arc<AtomicBool>,
    hits: Arc<AtomicUsize>,
}

impl MockBackend {
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Non-health requests served so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

pub async fn start_mock_backend(name: &'static str) -> MockBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let healthy = Arc::new(AtomicBool::new(true));
    let hits = Arc::new(AtomicUsize::new(0));

    let (h, c) = (healthy.clone(), hits.clone());
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let (h, c) = (h.clone(), c.clone());
            tokio::spawn(async move {
                let _ = serve_one(socket, name, &h, &c).await;
            });
        }
    });

    MockBackend { addr, healthy, hits }
}

/// A backend that accepts connections and never answers.
pub async fn start_stalled_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    addr
}

/// An address nothing listens on.
pub async fn closed_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

struct ParsedRequest {
    path: String,
    body: Vec<u8>,
}

async fn read_request(socket: &mut TcpStream) -> std::io::Result<ParsedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let path = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(ParsedRequest { path, body })
}

async fn serve_one(
    mut socket: TcpStream,
    name: &'static str,
    healthy: &AtomicBool,
    hits: &AtomicUsize,
) -> std::io::Result<()> {
    let request = read_request(&mut socket).await?;

    let response = if request.path == "/health" {
        let status = if healthy.load(Ordering::SeqCst) {
            "200 OK"
        } else {
            "500 Internal Server Error"
        };
        format!("HTTP/1.1 {status}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").into_bytes()
    } else {
        hits.fetch_add(1, Ordering::SeqCst);
        let body = if request.body.is_empty() {
            name.as_bytes().to_vec()
        } else {
            request.body
        };
        let mut response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nx-backend: {}\r\nConnection: close\r\n\r\n",
            body.len(),
            name
        )
        .into_bytes();
        response.extend_from_slice(&body);
        response
    };

    socket.write_all(&response).await?;
    socket.shutdown().await
}

/// A running balancer front end.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub balancer: Balancer,
    pub shutdown: Shutdown,
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

/// Start a balancer over `servers` with the real HTTP probe and transport.
pub async fn start_proxy(servers: &[String], trace: bool, timeout: Duration) -> TestProxy {
    let balancer = Balancer::builder(ServerPool::new(servers))
        .probe(Arc::new(HttpProbe::with_defaults(false, "/health", timeout)))
        .timeout(timeout)
        .trace(trace)
        .health_interval(HEALTH_INTERVAL)
        .build();

    serve(balancer).await
}

/// Start the health monitor and the HTTP front end for `balancer`.
pub async fn serve(balancer: Balancer) -> TestProxy {
    let shutdown = Shutdown::new();
    tokio::spawn(balancer.start_health_monitor(shutdown.subscribe()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(balancer.clone(), &BalancerConfig::default());
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestProxy {
        addr,
        balancer,
        shutdown,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
