use std::io::ErrorKind;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use http::header::AUTHORIZATION;
use http::HeaderValue;
use tungstenite::client::IntoClientRequest;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use super::{Endpoint, EventHandler, Transport, TransportEvent};
use crate::error::RecognitionError;

/// How long a socket read waits before the worker checks for outbound frames
const READ_POLL_INTERVAL: Duration = Duration::from_millis(20);

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

enum Outbound {
    Frame(Vec<u8>),
    Shutdown,
}

struct Connection {
    requests: Sender<Outbound>,
    open: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

/// Blocking WebSocket transport.
///
/// A single worker thread owns the socket: it writes queued frames and reads
/// inbound messages with a short read timeout, so sends never wait for a
/// read to finish.
#[derive(Default)]
pub struct WebSocketTransport {
    connection: Mutex<Option<Connection>>,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn connect(endpoint: &Endpoint) -> Result<(Socket, TcpStream), RecognitionError> {
        let url = &endpoint.url;
        let failure = |reason: String| {
            RecognitionError::ConnectionFailure(format!("{}: {}", url, reason))
        };

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| failure(format!("invalid request: {}", e)))?;
        if let Some(authorization) = &endpoint.authorization {
            let value = HeaderValue::from_str(authorization)
                .map_err(|e| failure(format!("invalid credentials: {}", e)))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let addrs = url
            .socket_addrs(|| match url.scheme() {
                "wss" => Some(443),
                _ => Some(80),
            })
            .map_err(|e| failure(format!("cannot resolve host: {}", e)))?;

        let mut last_error = String::from("no address");
        let stream = addrs
            .iter()
            .find_map(|addr| match TcpStream::connect_timeout(addr, endpoint.connect_timeout) {
                Ok(stream) => Some(stream),
                Err(e) => {
                    log::debug!("🔌 Connect to {} failed: {}", addr, e);
                    last_error = e.to_string();
                    None
                }
            })
            .ok_or_else(|| failure(last_error.clone()))?;

        // Socket options are shared with the clone, so it doubles as a
        // control handle once the stream moves into the WebSocket.
        let control = stream.try_clone().map_err(|e| failure(e.to_string()))?;
        control
            .set_read_timeout(Some(endpoint.connect_timeout))
            .map_err(|e| failure(e.to_string()))?;
        stream.set_nodelay(true).ok();

        let (socket, response) = tungstenite::client_tls(request, stream)
            .map_err(|e| failure(format!("handshake failed: {}", e)))?;
        log::info!("✅ WebSocket connected, status: {}", response.status());

        control
            .set_read_timeout(Some(READ_POLL_INTERVAL))
            .map_err(|e| failure(e.to_string()))?;

        Ok((socket, control))
    }

    fn run_worker(
        mut socket: Socket,
        control: TcpStream,
        requests: Receiver<Outbound>,
        open: Arc<AtomicBool>,
        on_event: EventHandler,
    ) {
        let closed_by_peer = 'io: loop {
            loop {
                match requests.try_recv() {
                    Ok(Outbound::Frame(bytes)) => {
                        if let Err(e) = socket.send(Message::Binary(bytes)) {
                            log::warn!("❌ WebSocket send failed: {}", e);
                            break 'io Some(format!("send failed: {}", e));
                        }
                    }
                    Ok(Outbound::Shutdown) | Err(TryRecvError::Disconnected) => {
                        let _ = socket.close(None);
                        let _ = socket.flush();
                        break 'io None;
                    }
                    Err(TryRecvError::Empty) => break,
                }
            }

            match socket.read() {
                Ok(Message::Binary(bytes)) => on_event(TransportEvent::Message(bytes)),
                Ok(Message::Text(text)) => on_event(TransportEvent::Message(text.into_bytes())),
                Ok(Message::Close(frame)) => {
                    log::info!("🔚 Server closed WebSocket connection");
                    let reason = frame
                        .map(|f| format!("closed by server: {} {}", f.code, f.reason))
                        .unwrap_or_else(|| "closed by server".to_string());
                    break Some(reason);
                }
                Ok(_) => {}
                Err(tungstenite::Error::Io(ref e))
                    if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    break Some("connection closed".to_string());
                }
                Err(e) => {
                    log::warn!("❌ WebSocket read error: {}", e);
                    break Some(format!("read failed: {}", e));
                }
            }
        };

        // Report the loss while still marked open, so a waiter that checks
        // `is_open` cannot miss the failure.
        match closed_by_peer {
            Some(reason) => on_event(TransportEvent::Closed(reason)),
            None => log::info!("🔚 WebSocket closed cleanly"),
        }

        open.store(false, Ordering::Release);
        let _ = control.shutdown(Shutdown::Both);
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, endpoint: &Endpoint, on_event: EventHandler) -> Result<(), RecognitionError> {
        let mut connection = self
            .connection
            .lock()
            .map_err(|_| RecognitionError::ConnectionFailure("transport lock poisoned".into()))?;
        if connection.as_ref().is_some_and(|c| c.open.load(Ordering::Acquire)) {
            return Ok(());
        }

        log::info!("📡 Connecting to {}", endpoint.url);
        let (socket, control) = Self::connect(endpoint)?;

        let (requests, receiver) = unbounded();
        let open = Arc::new(AtomicBool::new(true));
        let worker_open = Arc::clone(&open);
        let worker = thread::Builder::new()
            .name("asr-websocket".into())
            .spawn(move || Self::run_worker(socket, control, receiver, worker_open, on_event))
            .map_err(|e| RecognitionError::ConnectionFailure(e.to_string()))?;

        *connection = Some(Connection {
            requests,
            open,
            worker: Some(worker),
        });
        Ok(())
    }

    fn send(&self, payload: Vec<u8>) -> Result<(), RecognitionError> {
        let connection = self
            .connection
            .lock()
            .map_err(|_| RecognitionError::ConnectionFailure("transport lock poisoned".into()))?;
        match connection.as_ref() {
            Some(c) if c.open.load(Ordering::Acquire) => c
                .requests
                .send(Outbound::Frame(payload))
                .map_err(|_| RecognitionError::ConnectionFailure("connection closed".into())),
            _ => Err(RecognitionError::ConnectionFailure(
                "connection is not open".into(),
            )),
        }
    }

    fn close(&self) {
        let taken = match self.connection.lock() {
            Ok(mut connection) => connection.take(),
            Err(_) => None,
        };
        let Some(mut connection) = taken else {
            return;
        };

        let _ = connection.requests.send(Outbound::Shutdown);
        if let Some(worker) = connection.worker.take() {
            // A listener may close the recognizer from inside a callback,
            // which runs on the worker itself.
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }

    fn is_open(&self) -> bool {
        self.connection
            .lock()
            .map(|c| c.as_ref().is_some_and(|c| c.open.load(Ordering::Acquire)))
            .unwrap_or(false)
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn test_send_without_connection_fails() {
        let transport = WebSocketTransport::new();
        assert!(!transport.is_open());
        assert!(matches!(
            transport.send(b"ASR 2.4 CREATE_SESSION\r\n".to_vec()),
            Err(RecognitionError::ConnectionFailure(_))
        ));
        transport.close();
    }

    #[test]
    fn test_connection_refused() {
        // Bind then drop a listener to get a port nobody listens on.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let endpoint = Endpoint {
            url: Url::parse(&format!("ws://127.0.0.1:{}/asr", port)).unwrap(),
            authorization: None,
            connect_timeout: Duration::from_millis(500),
        };

        let transport = WebSocketTransport::new();
        let result = transport.open(&endpoint, Box::new(|_| {}));
        assert!(matches!(result, Err(RecognitionError::ConnectionFailure(_))));
        assert!(!transport.is_open());
    }
}
