//! Minimal scripted HTTP/1.1 server for rate-limit tests
//!
//! Responses are queued up front; each incoming request pops the next one.
//! Every response carries `Connection: close` so the client opens a fresh
//! connection per request and the server loop stays trivial.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

#[derive(Clone)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl MockResponse {
    pub fn ok() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: "{}".to_string(),
        }
    }

    pub fn too_many_requests(reset_after_secs: f64) -> Self {
        Self {
            status: 429,
            headers: vec![(
                "x-ratelimit-reset-after".to_string(),
                reset_after_secs.to_string(),
            )],
            body: format!("{{\"retry_after\": {reset_after_secs}}}"),
        }
    }

    pub fn global_429(retry_after_secs: f64) -> Self {
        Self {
            status: 429,
            headers: vec![
                ("x-ratelimit-global".to_string(), "true".to_string()),
                ("retry-after".to_string(), retry_after_secs.to_string()),
            ],
            body: format!("{{\"retry_after\": {retry_after_secs}, \"global\": true}}"),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    fn render(&self) -> String {
        let reason = match self.status {
            200 => "OK",
            429 => "Too Many Requests",
            _ => "Unknown",
        };
        let mut out = format!("HTTP/1.1 {} {}\r\n", self.status, reason);
        out.push_str("Content-Type: application/json\r\n");
        out.push_str("Connection: close\r\n");
        out.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        for (name, value) in &self.headers {
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        out.push_str("\r\n");
        out.push_str(&self.body);
        out
    }
}

pub struct MockHttpServer {
    pub base_url: String,
    /// Request paths in the order the server received them
    pub seen: Arc<Mutex<Vec<String>>>,
}

impl MockHttpServer {
    /// Bind on an ephemeral port and serve the scripted responses in order
    pub async fn start(responses: Vec<MockResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let script = Arc::new(Mutex::new(VecDeque::from(responses)));

        let seen_clone = Arc::clone(&seen);
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let path = read_request_path(&mut socket).await;
                verbose_println!("[mock-http] {path}");
                seen_clone.lock().push(path);

                let response = script
                    .lock()
                    .pop_front()
                    .unwrap_or_else(MockResponse::ok);
                let _ = socket.write_all(response.render().as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            seen,
        }
    }
}

async fn read_request_path(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    // Read until the end of the header block.
    while !buf.ends_with(b"\r\n\r\n") {
        match socket.read(&mut byte).await {
            Ok(1) => buf.push(byte[0]),
            _ => break,
        }
    }
    let head = String::from_utf8_lossy(&buf);
    head.lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("?")
        .to_string()
}
