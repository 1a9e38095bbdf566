//! Минимальный HTTP-сервер для тестов: отвечает по сценарию, считает запросы.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) struct StubResponse {
    status: u16,
    body: Vec<u8>,
    delay: Duration,
}

impl StubResponse {
    pub(crate) fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub(crate) fn status(code: u16) -> Self {
        Self {
            status: code,
            body: Vec::new(),
            delay: Duration::ZERO,
        }
    }

    pub(crate) fn delayed(mut self, d: Duration) -> Self {
        self.delay = d;
        self
    }
}

pub(crate) struct StubServer {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    heads: Arc<Mutex<Vec<String>>>,
    shutdown: Arc<AtomicBool>,
}

impl StubServer {
    /// n-й запрос получает `script[n]`, последний ответ повторяется
    pub(crate) fn start(script: Vec<StubResponse>) -> Self {
        assert!(!script.is_empty(), "stub script must not be empty");

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let heads = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        {
            let hits = hits.clone();
            let heads = heads.clone();
            let shutdown = shutdown.clone();
            thread::spawn(move || {
                while !shutdown.load(Ordering::Relaxed) {
                    match listener.accept() {
                        Ok((stream, _)) => {
                            let n = hits.fetch_add(1, Ordering::SeqCst);
                            let resp = script[n.min(script.len() - 1)].clone();
                            let heads = heads.clone();
                            thread::spawn(move || serve(stream, resp, heads));
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                            thread::sleep(Duration::from_millis(5));
                        }
                        Err(_) => break,
                    }
                }
            });
        }

        Self {
            addr,
            hits,
            heads,
            shutdown,
        }
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub(crate) fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Значения заголовка `name` по всем принятым запросам
    pub(crate) fn header_values(&self, name: &str) -> Vec<String> {
        let prefix = format!("{}:", name.to_ascii_lowercase());
        self.heads
            .lock()
            .unwrap()
            .iter()
            .flat_map(|head| head.lines().map(str::to_string).collect::<Vec<_>>())
            .filter(|line| line.to_ascii_lowercase().starts_with(&prefix))
            .map(|line| line[prefix.len()..].trim().to_string())
            .collect()
    }

    /// Строки запроса (`GET /path HTTP/1.1`)
    pub(crate) fn request_lines(&self) -> Vec<String> {
        self.heads
            .lock()
            .unwrap()
            .iter()
            .filter_map(|head| head.lines().next().map(str::to_string))
            .collect()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

fn serve(mut stream: TcpStream, resp: StubResponse, heads: Arc<Mutex<Vec<String>>>) {
    stream.set_nonblocking(false).ok();
    stream.set_read_timeout(Some(Duration::from_secs(2))).ok();

    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    heads
        .lock()
        .unwrap()
        .push(String::from_utf8_lossy(&buf).to_string());

    if !resp.delay.is_zero() {
        thread::sleep(resp.delay);
    }

    let head = format!(
        "HTTP/1.1 {} STUB\r\nContent-Length: {}\r\nContent-Type: text/plain\r\nConnection: close\r\n\r\n",
        resp.status,
        resp.body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(&resp.body);
    let _ = stream.flush();
}
