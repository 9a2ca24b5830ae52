#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Local HTTP/1.1 server answering every request with
/// `"<METHOD> <target> <body-len>"` and echoing `x-*` request headers back
/// in `x-echo`.
pub struct TestServer {
    pub addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    requests: Arc<AtomicUsize>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> url::Url {
        url::Url::parse(&format!("http://{}{}", self.addr, path)).unwrap()
    }

    /// Number of TCP connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Number of complete requests read so far, across all connections.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    KeepAlive,
    Close,
    Silent,
    /// Answers with keep-alive, then closes the socket while idle.
    CloseWhenIdle,
    /// Answers the first request on a connection, then sends an unparseable
    /// response to the next one and closes.
    GarbageOnReuse,
}

pub async fn spawn_server(mode: Mode) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = connections.clone();
    let seen = requests.clone();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(serve(socket, mode, seen.clone()));
        }
    });

    TestServer { addr, connections, requests }
}

async fn serve(mut socket: TcpStream, mode: Mode, requests: Arc<AtomicUsize>) {
    let mut buf = Vec::new();
    let mut served = 0usize;
    loop {
        let Some(head_end) = read_head(&mut socket, &mut buf).await else {
            return;
        };
        let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
        let mut lines = head.split("\r\n");
        let request_line = lines.next().unwrap_or_default().to_string();
        let mut content_length = 0usize;
        let mut echoed = Vec::new();
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                let name = name.trim().to_ascii_lowercase();
                if name == "content-length" {
                    content_length = value.trim().parse().unwrap_or(0);
                } else if name.starts_with("x-") {
                    echoed.push(format!("{}={}", name, value.trim()));
                }
            }
        }

        let body_start = head_end + 4;
        while buf.len() < body_start + content_length {
            let mut chunk = [0u8; 4096];
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        }
        buf.drain(..body_start + content_length);
        requests.fetch_add(1, Ordering::SeqCst);
        served += 1;

        if mode == Mode::GarbageOnReuse && served > 1 {
            let _ = socket.write_all(b"GARBAGE RESPONSE\r\n\r\n").await;
            return;
        }
        if mode == Mode::Silent {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            return;
        }

        let mut parts = request_line.split(' ');
        let method = parts.next().unwrap_or_default();
        let target = parts.next().unwrap_or_default();
        let body = format!("{} {} {}", method, target, content_length);
        let connection = if mode == Mode::Close { "close" } else { "keep-alive" };
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: {}\r\nX-Echo: {}\r\n\r\n{}",
            body.len(),
            connection,
            echoed.join(","),
            body
        );
        if socket.write_all(response.as_bytes()).await.is_err()
            || matches!(mode, Mode::Close | Mode::CloseWhenIdle)
        {
            return;
        }
    }
}

async fn read_head(socket: &mut TcpStream, buf: &mut Vec<u8>) -> Option<usize> {
    loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            return Some(pos);
        }
        let mut chunk = [0u8; 4096];
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return None,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}
