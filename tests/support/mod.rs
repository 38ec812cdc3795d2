//! A deliberately tiny raw-socket HTTP/1.1 server for exercising the pool
//! and the HTTP/1.1 engine against a real `TcpListener`, the same pattern
//! `hyperium-hyper`'s own `tests/client.rs` uses for its client tests.
//!
//! This is not a protocol-complete server: it reads exactly enough framing
//! (headers, `Content-Length`, or chunked bodies) to drive the scenarios in
//! these integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

pub struct RawRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// Reads one HTTP/1.1 request off `stream`: the request line, headers, and
/// (if framed by `Content-Length` or `Transfer-Encoding: chunked`) the
/// body. Returns `None` if the peer closed the connection before sending
/// another request (the normal end of a keep-alive loop).
pub fn read_request_opt(reader: &mut BufReader<&TcpStream>) -> Option<RawRequest> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1];
    loop {
        let n = reader.read(&mut buf).expect("read head byte");
        if n == 0 {
            if head.is_empty() {
                return None;
            }
            panic!("connection closed mid-request-head");
        }
        head.push(buf[0]);
        if head.len() >= 4 && &head[head.len() - 4..] == b"\r\n\r\n" {
            break;
        }
    }
    Some(parse_request(head, reader))
}

/// Like [`read_request_opt`] but panics if the connection is closed before
/// a request arrives at all — use when a test expects exactly one request.
pub fn read_request(reader: &mut BufReader<&TcpStream>) -> RawRequest {
    read_request_opt(reader).expect("expected a request, got immediate EOF")
}

fn parse_request(head: Vec<u8>, reader: &mut BufReader<&TcpStream>) -> RawRequest {
    let head = String::from_utf8_lossy(&head).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_owned();
    let path = parts.next().unwrap_or_default().to_owned();

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_owned());
        }
    }

    let body = if let Some(len) = headers.get("content-length") {
        let len: usize = len.parse().unwrap_or(0);
        let mut body = vec![0u8; len];
        reader.read_exact(&mut body).expect("read fixed-length body");
        body
    } else if headers
        .get("transfer-encoding")
        .map_or(false, |v| v.eq_ignore_ascii_case("chunked"))
    {
        read_chunked_body(reader)
    } else {
        Vec::new()
    };

    RawRequest {
        method,
        path,
        headers,
        body,
    }
}

fn read_chunked_body(reader: &mut BufReader<&TcpStream>) -> Vec<u8> {
    let mut body = Vec::new();
    loop {
        let size_line = read_line(reader);
        let size = usize::from_str_radix(size_line.trim(), 16).expect("valid chunk size");
        if size == 0 {
            // trailing CRLF after the terminating 0-size chunk; no trailers
            // in these tests.
            read_line(reader);
            break;
        }
        let mut chunk = vec![0u8; size];
        reader.read_exact(&mut chunk).expect("read chunk data");
        body.extend_from_slice(&chunk);
        read_line(reader); // CRLF after chunk data
    }
    body
}

fn read_line(reader: &mut BufReader<&TcpStream>) -> String {
    let mut line = Vec::new();
    let mut buf = [0u8; 1];
    loop {
        reader.read_exact(&mut buf).expect("read line byte");
        if buf[0] == b'\n' {
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            break;
        }
        line.push(buf[0]);
    }
    String::from_utf8_lossy(&line).into_owned()
}

pub fn write_response(stream: &mut TcpStream, status: u16, reason: &str, body: &[u8]) {
    let head = format!(
        "HTTP/1.1 {} {}\r\ncontent-length: {}\r\n\r\n",
        status,
        reason,
        body.len()
    );
    stream.write_all(head.as_bytes()).expect("write head");
    stream.write_all(body).expect("write body");
    stream.flush().expect("flush");
}

/// Binds a listener on an ephemeral port and returns it plus its address,
/// ready for a test to drive with its own accept loop on a background
/// thread.
pub fn bind() -> (TcpListener, std::net::SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    (listener, addr)
}

/// Spawns a background thread accepting connections and, for each one, a
/// further thread running `handler` against it — so two concurrently open
/// client connections are served concurrently rather than queued behind
/// whichever connection accepted first.
pub fn spawn_server<F>(listener: TcpListener, handler: F) -> thread::JoinHandle<()>
where
    F: Fn(TcpStream) + Send + Clone + 'static,
{
    thread::spawn(move || {
        for stream in listener.incoming() {
            let stream = match stream {
                Ok(s) => s,
                Err(_) => break,
            };
            let handler = handler.clone();
            thread::spawn(move || handler(stream));
        }
    })
}
