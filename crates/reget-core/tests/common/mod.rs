//! Shared fixtures for the integration tests

#![allow(dead_code)]

use reget_core::{DownloadOptions, Downloader};
use reget_types::{Settings, TaskEvent, TaskStatus};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use wiremock::{Request, Respond, ResponseTemplate};

pub const BUFFER: usize = 64 * 1024;

/// Deterministic, non-repeating-at-buffer-boundaries content
pub fn body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

pub fn downloader(max_concurrent: usize) -> Downloader {
    let settings = Settings {
        max_concurrent_downloads: max_concurrent,
        buffer_size: BUFFER,
        ..Settings::default()
    };
    Downloader::new(settings).unwrap()
}

pub fn options(buffer_size: usize) -> DownloadOptions {
    DownloadOptions {
        buffer_size: Some(buffer_size),
        ..DownloadOptions::default()
    }
}

/// Parse `bytes=N-` into `N`
pub fn range_start(value: &str) -> Option<usize> {
    value
        .strip_prefix("bytes=")?
        .split('-')
        .next()?
        .parse()
        .ok()
}

/// Serves a fixed body and honours `Range` / `If-Range` the way a static
/// file server would
#[derive(Clone)]
pub struct RangeResponder {
    pub body: Arc<Vec<u8>>,
    pub etag: Option<String>,
    pub ranges: bool,
    pub delay: Option<Duration>,
}

impl RangeResponder {
    pub fn new(body: Vec<u8>, etag: &str) -> Self {
        Self {
            body: Arc::new(body),
            etag: Some(etag.to_string()),
            ranges: true,
            delay: None,
        }
    }

    /// No validator and no `Accept-Ranges`
    pub fn plain(body: Vec<u8>) -> Self {
        Self {
            body: Arc::new(body),
            etag: None,
            ranges: false,
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let header = |name: &str| {
            request
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(String::from)
        };

        let validator_holds = match header("if-range") {
            Some(tag) => self.etag.as_deref() == Some(tag.as_str()),
            None => true,
        };
        let start = header("range")
            .and_then(|v| range_start(&v))
            .filter(|_| self.ranges && validator_holds);

        let mut template = match start {
            Some(start) if start < self.body.len() => ResponseTemplate::new(206)
                .insert_header(
                    "content-range",
                    format!("bytes {}-{}/{}", start, self.body.len() - 1, self.body.len()),
                )
                .set_body_bytes(self.body[start..].to_vec()),
            Some(_) => ResponseTemplate::new(416),
            None => ResponseTemplate::new(200).set_body_bytes(self.body.as_slice().to_vec()),
        };

        if self.ranges {
            template = template.insert_header("accept-ranges", "bytes");
        }
        if let Some(etag) = &self.etag {
            template = template.insert_header("etag", etag.as_str());
        }
        if let Some(delay) = self.delay {
            template = template.set_delay(delay);
        }
        template
    }
}

/// Minimal HTTP/1.1 server whose first un-ranged response sends only the
/// first `stall_after` bytes of the body and then goes silent, keeping the
/// connection open. Ranged requests are answered in full.
pub struct StallingServer {
    pub url: String,
    heads: Arc<Mutex<Vec<String>>>,
}

impl StallingServer {
    pub async fn start(body: Vec<u8>, stall_after: usize, etag: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/file.bin", listener.local_addr().unwrap());
        let heads = Arc::new(Mutex::new(Vec::new()));
        let body = Arc::new(body);
        let etag = etag.to_string();

        let log = Arc::clone(&heads);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(serve(
                    stream,
                    Arc::clone(&body),
                    stall_after,
                    etag.clone(),
                    Arc::clone(&log),
                ));
            }
        });

        Self { url, heads }
    }

    /// Raw request heads, lowercased, in arrival order
    pub fn requests(&self) -> Vec<String> {
        self.heads.lock().unwrap().clone()
    }
}

async fn serve(
    mut stream: TcpStream,
    body: Arc<Vec<u8>>,
    stall_after: usize,
    etag: String,
    log: Arc<Mutex<Vec<String>>>,
) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    let head = String::from_utf8_lossy(&head).to_lowercase();
    log.lock().unwrap().push(head.clone());

    let range = head
        .lines()
        .find_map(|line| line.strip_prefix("range:"))
        .and_then(|v| range_start(v.trim()));

    let total = body.len();
    match range {
        Some(start) => {
            let response = format!(
                "HTTP/1.1 206 Partial Content\r\nContent-Length: {}\r\nContent-Range: bytes {}-{}/{}\r\nAccept-Ranges: bytes\r\nETag: {}\r\nConnection: close\r\n\r\n",
                total - start,
                start,
                total - 1,
                total,
                etag
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.write_all(&body[start..]).await;
            let _ = stream.flush().await;
        }
        None => {
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nAccept-Ranges: bytes\r\nETag: {}\r\nConnection: close\r\n\r\n",
                total, etag
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.write_all(&body[..stall_after]).await;
            let _ = stream.flush().await;
            // Hold the connection until the client gives up on it
            let _ = stream.read(&mut buf).await;
        }
    }
}

/// Everything currently buffered on an event receiver
pub fn drain(events: &mut broadcast::Receiver<TaskEvent>) -> Vec<TaskEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

pub fn status_changes(events: &[TaskEvent]) -> Vec<TaskStatus> {
    events
        .iter()
        .filter_map(|e| match e {
            TaskEvent::StatusChanged { status, .. } => Some(*status),
            _ => None,
        })
        .collect()
}

/// Poll `check` until it holds or the deadline passes
pub async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
