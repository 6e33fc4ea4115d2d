//! A minimal loopback HTTP/1.1 server, stdlib-only (no new dependency),
//! standing in for the package repository and catalog-database host so
//! `pkgd-loader`/`pkgd-runtime`'s `reqwest`-backed code paths can be driven
//! by real requests instead of stubbed at the trait boundary. Single
//! request per connection, `Range: bytes=start-end` honored on GET,
//! anything else answered from a fixed route table.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

#[derive(Clone)]
pub struct Route {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Route {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self { status: 200, body: body.into() }
    }

    pub fn not_found() -> Self {
        Self { status: 404, body: Vec::new() }
    }
}

/// A running mock server bound to an ephemeral loopback port. Dropped
/// connections and a closed listener are fine to leak for the lifetime of
/// a test process; nothing here outlives the test binary.
pub struct MockServer {
    addr: SocketAddr,
}

impl MockServer {
    pub fn start(routes: HashMap<String, Route>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback listener");
        let addr = listener.local_addr().expect("read bound address");
        let routes = Arc::new(routes);

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let routes = routes.clone();
                thread::spawn(move || serve_one(stream, &routes));
            }
        });

        Self { addr }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/", self.addr)
    }
}

fn serve_one(mut stream: TcpStream, routes: &HashMap<String, Route>) {
    let mut buf = [0u8; 16 * 1024];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let request = String::from_utf8_lossy(&buf[..n]);
    let mut lines = request.lines();
    let Some(request_line) = lines.next() else { return };
    let Some(path) = request_line.split_whitespace().nth(1) else { return };

    let range = lines.find_map(|l| l.strip_prefix("Range: bytes="));

    let Some(route) = routes.get(path) else {
        write_status_only(&mut stream, 404);
        return;
    };

    if route.status != 200 {
        write_status_only(&mut stream, route.status);
        return;
    }

    match range {
        Some(spec) => {
            let (start, end) = parse_range(spec, route.body.len());
            write_partial(&mut stream, &route.body[start..=end], start, end, route.body.len());
        }
        None => write_ok(&mut stream, &route.body),
    }
}

fn parse_range(spec: &str, len: usize) -> (usize, usize) {
    if len == 0 {
        return (0, 0);
    }
    let mut parts = spec.trim().splitn(2, '-');
    let start: usize = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let end: usize = parts
        .next()
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
        .unwrap_or(len - 1);
    (start.min(len - 1), end.min(len - 1))
}

fn write_ok(stream: &mut TcpStream, body: &[u8]) {
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(body);
}

fn write_partial(stream: &mut TcpStream, slice: &[u8], start: usize, end: usize, total: usize) {
    let header = format!(
        "HTTP/1.1 206 Partial Content\r\nContent-Range: bytes {start}-{end}/{total}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        slice.len()
    );
    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(slice);
}

fn write_status_only(stream: &mut TcpStream, status: u16) {
    let reason = match status {
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Error",
    };
    let header = format!("HTTP/1.1 {status} {reason}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
    let _ = stream.write_all(header.as_bytes());
}
