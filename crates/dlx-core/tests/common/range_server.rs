//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves static bodies by path. HEAD answers with Content-Length (and
//! `Accept-Ranges: bytes` when advertised); GET and POST honour
//! `Range: bytes=X-Y` with 206 Partial Content. Every request is logged,
//! including its query, cookies and body, so tests can assert on what the
//! engine actually sent. Each connection carries one request.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// What HEAD reports as `Content-Length`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadLength {
    Exact,
    Omitted,
    Zero,
}

#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    /// If false, HEAD returns 405 (simulates servers that block HEAD).
    pub head_allowed: bool,
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    /// If false, omit `Accept-Ranges: bytes` even if ranges work.
    pub advertise_ranges: bool,
    /// Ranged GETs starting at or after this offset get 404.
    pub fail_ranges_from: Option<u64>,
    pub head_length: HeadLength,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            head_allowed: true,
            support_ranges: true,
            advertise_ranges: true,
            fail_ranges_from: None,
            head_length: HeadLength::Exact,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub range: Option<(u64, u64)>,
    pub query: Option<String>,
    pub cookie: Option<String>,
    pub body: Vec<u8>,
}

pub struct TestServer {
    base: String,
    log: Arc<Mutex<Vec<Request>>>,
}

impl TestServer {
    /// Absolute URL for `path` (leading slash optional).
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path.trim_start_matches('/'))
    }

    pub fn requests(&self) -> Vec<Request> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    /// GETs of `path` other than the two-byte `bytes=0-1` request.
    pub fn transfer_gets(&self, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == "GET" && r.path == path && r.range != Some((0, 1)))
            .count()
    }

    /// Whether a `bytes=0-1` request was sent for `path`.
    pub fn asked_first_two_bytes(&self, path: &str) -> bool {
        self.requests()
            .iter()
            .any(|r| r.path == path && r.range == Some((0, 1)))
    }
}

/// Serves `routes` (path → body) with default options.
pub fn start(routes: Vec<(&str, Vec<u8>)>) -> TestServer {
    start_with_options(routes, ServerOptions::default())
}

pub fn start_with_options(routes: Vec<(&str, Vec<u8>)>, opts: ServerOptions) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let routes: Arc<HashMap<String, Vec<u8>>> = Arc::new(
        routes
            .into_iter()
            .map(|(p, b)| (format!("/{}", p.trim_start_matches('/')), b))
            .collect(),
    );
    let log = Arc::new(Mutex::new(Vec::new()));
    let server_log = Arc::clone(&log);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let routes = Arc::clone(&routes);
            let log = Arc::clone(&server_log);
            thread::spawn(move || handle(stream, &routes, &log, opts));
        }
    });
    TestServer {
        base: format!("http://127.0.0.1:{}/", port),
        log,
    }
}

/// Reads the request head and, when `Content-Length` is set, its body.
fn read_request(stream: &mut TcpStream) -> Option<(String, Vec<u8>)> {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    let head_end = loop {
        if let Some(i) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break i + 4;
        }
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buf[..n]);
    };
    let head = String::from_utf8(data[..head_end].to_vec()).ok()?;
    let body_len = header_value(&head, "content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = data[head_end..].to_vec();
    while body.len() < body_len {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(body_len);
    Some((head, body))
}

fn header_value<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.lines().skip(1).find_map(|line| {
        let (k, v) = line.split_once(':')?;
        k.trim().eq_ignore_ascii_case(name).then(|| v.trim())
    })
}

fn respond(stream: &mut TcpStream, status: &str, headers: &[String], body: &[u8]) {
    let mut head = format!("HTTP/1.1 {}\r\nConnection: close\r\n", status);
    for h in headers {
        head.push_str(h);
        head.push_str("\r\n");
    }
    head.push_str("\r\n");
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body);
    let _ = stream.flush();
}

fn handle(
    mut stream: TcpStream,
    routes: &HashMap<String, Vec<u8>>,
    log: &Mutex<Vec<Request>>,
    opts: ServerOptions,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let Some((head, body)) = read_request(&mut stream) else {
        return;
    };
    let mut req = parse_request(&head);
    req.body = body;
    log.lock().unwrap().push(req.clone());

    let Some(body) = routes.get(&req.path) else {
        respond(&mut stream, "404 Not Found", &["Content-Length: 0".into()], b"");
        return;
    };
    let total = body.len() as u64;
    let accept_ranges = opts.advertise_ranges && opts.support_ranges;

    match req.method.as_str() {
        "HEAD" => {
            if !opts.head_allowed {
                respond(&mut stream, "405 Method Not Allowed", &["Content-Length: 0".into()], b"");
                return;
            }
            let mut headers = match opts.head_length {
                HeadLength::Exact => vec![format!("Content-Length: {}", total)],
                HeadLength::Omitted => Vec::new(),
                HeadLength::Zero => vec!["Content-Length: 0".to_string()],
            };
            if accept_ranges {
                headers.push("Accept-Ranges: bytes".into());
            }
            respond(&mut stream, "200 OK", &headers, b"");
        }
        "GET" | "POST" => {
            let mut headers = Vec::new();
            if accept_ranges {
                headers.push("Accept-Ranges: bytes".to_string());
            }
            match req.range.filter(|_| opts.support_ranges) {
                Some((start, _)) if opts.fail_ranges_from.map_or(false, |f| start >= f) => {
                    respond(&mut stream, "404 Not Found", &["Content-Length: 0".into()], b"");
                }
                Some((start, end)) => {
                    let end = end.min(total.saturating_sub(1));
                    if start > end {
                        headers.push(format!("Content-Range: bytes */{}", total));
                        headers.push("Content-Length: 0".into());
                        respond(&mut stream, "416 Range Not Satisfiable", &headers, b"");
                        return;
                    }
                    let slice = &body[start as usize..=end as usize];
                    headers.push(format!("Content-Range: bytes {}-{}/{}", start, end, total));
                    headers.push(format!("Content-Length: {}", slice.len()));
                    respond(&mut stream, "206 Partial Content", &headers, slice);
                }
                None => {
                    headers.push(format!("Content-Length: {}", total));
                    respond(&mut stream, "200 OK", &headers, body);
                }
            }
        }
        _ => respond(&mut stream, "405 Method Not Allowed", &["Content-Length: 0".into()], b""),
    }
}

fn parse_request(head: &str) -> Request {
    let first = head.lines().next().unwrap_or("");
    let mut parts = first.split_whitespace();
    let method = parts.next().unwrap_or("").to_ascii_uppercase();
    let target = parts.next().unwrap_or("/");
    let (path, query) = match target.split_once('?') {
        Some((p, q)) => (p.to_string(), Some(q.to_string())),
        None => (target.to_string(), None),
    };
    let range = header_value(head, "range")
        .and_then(|v| v.strip_prefix("bytes="))
        .and_then(|v| v.split_once('-'))
        .map(|(a, b)| {
            let start = a.trim().parse::<u64>().unwrap_or(0);
            let end = b.trim().parse::<u64>().unwrap_or(u64::MAX);
            (start, end)
        });
    Request {
        method,
        path,
        range,
        query,
        cookie: header_value(head, "cookie").map(str::to_string),
        body: Vec::new(),
    }
}
