//! Broadcast server: one provider, many readers.
//!
//! Delivers every frame pulled from the provider to every currently
//! connected client, in production order, best effort. Accepting runs on a
//! dedicated task with a bounded wait so shutdown is never stuck behind a
//! blocked accept; broadcasting iterates a point-in-time snapshot of the
//! client set so one slow or dead connection cannot perturb the others.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use pulse_core::error::PulseError;
use pulse_core::framing::frame;
use pulse_core::provider::{DataProvider, Fetch};

/// How long an accept may block before the shutdown flag is re-checked.
const ACCEPT_POLL: Duration = Duration::from_secs(1);
/// Wait between provider pulls when no data is available yet.
const PROVIDER_BACKOFF: Duration = Duration::from_millis(100);
/// Budget for joining the accept task during shutdown.
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
struct ClientSlot {
    id: u64,
    /// Write half only — this server never reads from clients; failures
    /// surface on send.
    writer: Arc<Mutex<OwnedWriteHalf>>,
}

/// TCP fan-out server for one feed channel.
pub struct BroadcastServer {
    label: String,
    delimiter: u8,
    local_addr: SocketAddr,
    /// Present until `serve()` hands the listener to the accept task.
    listener: Mutex<Option<TcpListener>>,
    clients: Mutex<Vec<ClientSlot>>,
    next_id: AtomicU64,
    shutting_down: AtomicBool,
    accept_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl BroadcastServer {
    /// Bind `0.0.0.0:port` with address reuse. A failed bind or listen is
    /// fatal to this server instance.
    pub async fn bind(port: u16, delimiter: u8, label: impl Into<String>) -> Result<Self, PulseError> {
        let label = label.into();
        let socket = TcpSocket::new_v4()
            .map_err(|e| PulseError::Transport(format!("[{label}] socket: {e}")))?;
        socket
            .set_reuseaddr(true)
            .map_err(|e| PulseError::Transport(format!("[{label}] reuseaddr: {e}")))?;
        socket
            .bind(SocketAddr::from(([0, 0, 0, 0], port)))
            .map_err(|e| PulseError::Transport(format!("[{label}] bind port {port}: {e}")))?;
        let listener = socket
            .listen(128)
            .map_err(|e| PulseError::Transport(format!("[{label}] listen: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| PulseError::Transport(format!("[{label}] local_addr: {e}")))?;

        info!("[{label}] listening on {local_addr}");
        Ok(Self {
            label,
            delimiter,
            local_addr,
            listener: Mutex::new(Some(listener)),
            clients: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            shutting_down: AtomicBool::new(false),
            accept_task: Mutex::new(None),
        })
    }

    /// Actual bound address (useful when bound to port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn client_count(&self) -> usize {
        self.clients.lock().await.len()
    }

    /// Run the server: accept clients in the background and broadcast every
    /// provider frame until the provider exhausts or `shutdown` is called.
    /// Ends with a full shutdown either way.
    pub async fn serve(self: Arc<Self>, mut provider: Box<dyn DataProvider>) {
        let Some(listener) = self.listener.lock().await.take() else {
            warn!("[{}] serve called twice", self.label);
            return;
        };
        let server = Arc::clone(&self);
        *self.accept_task.lock().await =
            Some(tokio::spawn(async move { server.accept_loop(listener).await }));

        loop {
            if self.shutting_down.load(Ordering::Acquire) {
                break;
            }
            match provider.next_data() {
                Fetch::Data(payload) => self.broadcast(&payload).await,
                Fetch::Pending => tokio::time::sleep(PROVIDER_BACKOFF).await,
                Fetch::Exhausted => {
                    info!("[{}] provider exhausted", self.label);
                    break;
                }
            }
        }
        self.shutdown().await;
    }

    async fn accept_loop(&self, listener: TcpListener) {
        loop {
            if self.shutting_down.load(Ordering::Acquire) {
                break;
            }
            match tokio::time::timeout(ACCEPT_POLL, listener.accept()).await {
                // Timed out: loop around and re-check the shutdown flag.
                Err(_) => continue,
                Ok(Ok((stream, addr))) => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let (_, writer) = stream.into_split();
                    self.clients
                        .lock()
                        .await
                        .push(ClientSlot { id, writer: Arc::new(Mutex::new(writer)) });
                    info!("[{}] client {id} connected from {addr}", self.label);
                }
                Ok(Err(e)) => {
                    if self.shutting_down.load(Ordering::Acquire) {
                        break;
                    }
                    error!("[{}] accept error: {e}", self.label);
                    break;
                }
            }
        }
        debug!("[{}] accept loop exited", self.label);
        // The listening socket closes here, with the loop.
    }

    /// Send one frame to every connected client.
    ///
    /// Operates on a snapshot of the client set; clients whose send fails
    /// are marked dead and removed from the live set after the sweep.
    pub async fn broadcast(&self, payload: &[u8]) {
        if payload.is_empty() {
            return;
        }
        let data = frame(payload, self.delimiter);

        let snapshot: Vec<ClientSlot> = self.clients.lock().await.clone();
        let mut dead: Vec<u64> = Vec::new();
        for client in &snapshot {
            let mut writer = client.writer.lock().await;
            if let Err(e) = writer.write_all(&data).await {
                warn!("[{}] send to client {} failed: {e}", self.label, client.id);
                dead.push(client.id);
            }
        }

        if !dead.is_empty() {
            let mut clients = self.clients.lock().await;
            clients.retain(|c| !dead.contains(&c.id));
            info!("[{}] dropped {} client(s), {} remain", self.label, dead.len(), clients.len());
        }
    }

    /// Idempotent shutdown: stop accepting, close every client socket,
    /// clear the client set.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("[{}] shutting down", self.label);

        // If serve() never ran, the listener is still here — closing it now.
        drop(self.listener.lock().await.take());

        // The accept loop re-checks the flag at least once per ACCEPT_POLL.
        if let Some(task) = self.accept_task.lock().await.take()
            && tokio::time::timeout(JOIN_TIMEOUT, task).await.is_err()
        {
            warn!("[{}] accept loop did not stop in time", self.label);
        }

        let mut clients = self.clients.lock().await;
        for client in clients.iter() {
            let mut writer = client.writer.lock().await;
            let _ = writer.shutdown().await;
        }
        clients.clear();
        drop(clients);

        // Let the OS release the port before the process might rebind it.
        tokio::time::sleep(Duration::from_millis(100)).await;
        info!("[{}] shutdown complete", self.label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::{self, TryRecvError};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    /// Provider driven by a test-side channel: empty => Pending,
    /// disconnected => Exhausted.
    struct ChannelProvider(mpsc::Receiver<Vec<u8>>);

    impl DataProvider for ChannelProvider {
        fn next_data(&mut self) -> Fetch {
            match self.0.try_recv() {
                Ok(d) => Fetch::Data(d),
                Err(TryRecvError::Empty) => Fetch::Pending,
                Err(TryRecvError::Disconnected) => Fetch::Exhausted,
            }
        }
    }

    async fn read_some(stream: &mut TcpStream) -> Vec<u8> {
        let mut buf = [0u8; 1024];
        let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
            .await
            .expect("read timed out")
            .expect("read failed");
        buf[..n].to_vec()
    }

    #[tokio::test]
    async fn fans_out_to_every_client() {
        let (tx, rx) = mpsc::channel();
        let server = Arc::new(BroadcastServer::bind(0, b'*', "test-fanout").await.unwrap());
        let addr = server.local_addr();
        let serve = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.serve(Box::new(ChannelProvider(rx))).await })
        };

        let mut a = TcpStream::connect(addr).await.unwrap();
        let mut b = TcpStream::connect(addr).await.unwrap();
        while server.client_count().await < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // Delimiter is appended exactly once.
        tx.send(b"AAPL,100,1.0".to_vec()).unwrap();
        assert_eq!(read_some(&mut a).await, b"AAPL,100,1.0*");
        assert_eq!(read_some(&mut b).await, b"AAPL,100,1.0*");

        tx.send(b"MSFT,200,2.0*".to_vec()).unwrap();
        assert_eq!(read_some(&mut a).await, b"MSFT,200,2.0*");
        assert_eq!(read_some(&mut b).await, b"MSFT,200,2.0*");

        // Dropping the sender exhausts the provider and stops the server.
        drop(tx);
        serve.await.unwrap();
        assert_eq!(server.client_count().await, 0);
    }

    #[tokio::test]
    async fn dead_client_swept_others_unaffected() {
        let (tx, rx) = mpsc::channel();
        let server = Arc::new(BroadcastServer::bind(0, b'*', "test-sweep").await.unwrap());
        let addr = server.local_addr();
        let serve = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.serve(Box::new(ChannelProvider(rx))).await })
        };

        let mut alive = TcpStream::connect(addr).await.unwrap();
        let doomed = TcpStream::connect(addr).await.unwrap();
        while server.client_count().await < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        drop(doomed);

        // The failed send is only observable once the OS reports the reset,
        // so keep broadcasting until the sweep happens.
        let mut received = Vec::new();
        for i in 0..100 {
            tx.send(format!("tick,{i}").into_bytes()).unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            received.extend(drain_nonblocking(&mut alive).await);
            if server.client_count().await == 1 {
                break;
            }
        }
        assert_eq!(server.client_count().await, 1);

        // The surviving client kept receiving throughout.
        tx.send(b"final,0".to_vec()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        received.extend(drain_nonblocking(&mut alive).await);
        let text = String::from_utf8(received).unwrap();
        assert!(text.contains("tick,0*"));
        assert!(text.contains("final,0*"));

        drop(tx);
        serve.await.unwrap();
    }

    async fn drain_nonblocking(stream: &mut TcpStream) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 1024];
        while let Ok(Ok(n)) =
            tokio::time::timeout(Duration::from_millis(10), stream.read(&mut buf)).await
        {
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let server = Arc::new(BroadcastServer::bind(0, b'*', "test-shutdown").await.unwrap());
        let addr = server.local_addr();
        let (tx, rx) = mpsc::channel::<Vec<u8>>();
        let serve = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.serve(Box::new(ChannelProvider(rx))).await })
        };
        let _client = TcpStream::connect(addr).await.unwrap();
        while server.client_count().await < 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        server.shutdown().await;
        assert_eq!(server.client_count().await, 0);
        // Second shutdown is a no-op, not an error.
        server.shutdown().await;
        assert_eq!(server.client_count().await, 0);

        drop(tx);
        serve.await.unwrap();
    }

    #[tokio::test]
    async fn empty_payload_not_broadcast() {
        let server = Arc::new(BroadcastServer::bind(0, b'*', "test-empty").await.unwrap());
        server.broadcast(b"").await; // no clients, no panic, no frame
        server.shutdown().await;
    }
}
