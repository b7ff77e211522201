use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cdn_proxy_common::config::ScanSettings;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Clone, Copy)]
pub enum Behavior {
    Status(u16),
    /// Answers every request with a redirect to itself.
    RedirectLoop,
    /// Accepts, then resets the connection.
    Reset,
}

/// Minimal HTTP/1.1 responder that records every request head it receives.
pub struct MockServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockServer {
    pub async fn start(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests: Arc<Mutex<Vec<String>>> = Arc::default();

        let log = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(respond(stream, behavior, log.clone()));
            }
        });

        Self { addr, requests }
    }

    pub fn origin(&self) -> String {
        self.addr.to_string()
    }

    /// Request heads, lowercased.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

async fn respond(mut stream: TcpStream, behavior: Behavior, log: Arc<Mutex<Vec<String>>>) {
    if let Behavior::Reset = behavior {
        let _ = stream.set_linger(Some(Duration::ZERO));
        drop(stream);
        return;
    }

    let mut head: Vec<u8> = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    log.lock()
        .unwrap()
        .push(String::from_utf8_lossy(&head).to_lowercase());

    let response: String = match behavior {
        Behavior::Status(code) => format!(
            "HTTP/1.1 {code} Mock\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
        ),
        Behavior::RedirectLoop => {
            "HTTP/1.1 302 Found\r\nlocation: /\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                .to_string()
        }
        Behavior::Reset => unreachable!(),
    };
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// An address nothing listens on.
pub async fn closed_port() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

pub fn plain_http() -> ScanSettings {
    ScanSettings {
        workers: 4,
        timeout: Duration::from_secs(5),
        max_redirects: 5,
        scheme: "http".to_string(),
    }
}
