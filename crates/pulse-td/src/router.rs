//! Order-routing server.
//!
//! Accepts order submissions over TCP, deframes each connection's byte
//! stream, parses every complete frame as an [`Order`] and forwards it to
//! the execution sink. A malformed frame is logged and the connection
//! continues — one bad message does not kill the session. Accept and
//! shutdown follow the same bounded-wait discipline as the broadcast
//! server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use pulse_core::error::PulseError;
use pulse_core::framing::Deframer;
use pulse_core::types::Order;

const ACCEPT_POLL: Duration = Duration::from_secs(1);
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Execution sink
// ---------------------------------------------------------------------------

/// Receives every successfully parsed order. Real execution logic lives
/// behind this seam; the in-tree implementation only logs.
pub trait ExecutionSink: Send + Sync {
    fn execute(&self, order: &Order);
}

/// Pass-through stub: logs receipt and does nothing else.
pub struct LogExecution;

impl ExecutionSink for LogExecution {
    fn execute(&self, order: &Order) {
        info!("executing order: {order}");
    }
}

// ---------------------------------------------------------------------------
// OrderRouter
// ---------------------------------------------------------------------------

struct ConnHandle {
    id: u64,
    shutdown_tx: watch::Sender<bool>,
    task: Option<tokio::task::JoinHandle<()>>,
}

/// TCP server for order submissions.
pub struct OrderRouter {
    delimiter: u8,
    local_addr: SocketAddr,
    listener: Mutex<Option<TcpListener>>,
    sink: Arc<dyn ExecutionSink>,
    conns: Arc<Mutex<Vec<ConnHandle>>>,
    next_id: AtomicU64,
    shutting_down: AtomicBool,
    accept_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl OrderRouter {
    /// Bind `0.0.0.0:port` with address reuse; bind/listen failure is fatal
    /// to this instance.
    pub async fn bind(
        port: u16,
        delimiter: u8,
        sink: Arc<dyn ExecutionSink>,
    ) -> Result<Self, PulseError> {
        let socket = TcpSocket::new_v4()
            .map_err(|e| PulseError::Transport(format!("[order-router] socket: {e}")))?;
        socket
            .set_reuseaddr(true)
            .map_err(|e| PulseError::Transport(format!("[order-router] reuseaddr: {e}")))?;
        socket
            .bind(SocketAddr::from(([0, 0, 0, 0], port)))
            .map_err(|e| PulseError::Transport(format!("[order-router] bind port {port}: {e}")))?;
        let listener = socket
            .listen(128)
            .map_err(|e| PulseError::Transport(format!("[order-router] listen: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| PulseError::Transport(format!("[order-router] local_addr: {e}")))?;

        info!("[order-router] listening on {local_addr}");
        Ok(Self {
            delimiter,
            local_addr,
            listener: Mutex::new(Some(listener)),
            sink,
            conns: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
            shutting_down: AtomicBool::new(false),
            accept_task: Mutex::new(None),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Start the accept loop on its own task and return.
    pub async fn serve(self: Arc<Self>) {
        let Some(listener) = self.listener.lock().await.take() else {
            warn!("[order-router] serve called twice");
            return;
        };
        let server = Arc::clone(&self);
        *self.accept_task.lock().await =
            Some(tokio::spawn(async move { server.accept_loop(listener).await }));
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            if self.shutting_down.load(Ordering::Acquire) {
                break;
            }
            match tokio::time::timeout(ACCEPT_POLL, listener.accept()).await {
                // Timed out: re-check the shutdown flag.
                Err(_) => continue,
                Ok(Ok((stream, addr))) => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    info!("[order-router] client {id} connected from {addr}");

                    let (shutdown_tx, shutdown_rx) = watch::channel(false);
                    let server = Arc::clone(&self);
                    let task = tokio::spawn(async move {
                        server.handle_conn(stream, id, shutdown_rx).await;
                        // Forget the session once it ends on its own.
                        server.conns.lock().await.retain(|c| c.id != id);
                    });
                    self.conns.lock().await.push(ConnHandle { id, shutdown_tx, task: Some(task) });
                }
                Ok(Err(e)) => {
                    if self.shutting_down.load(Ordering::Acquire) {
                        break;
                    }
                    error!("[order-router] accept error: {e}");
                    break;
                }
            }
        }
        debug!("[order-router] accept loop exited");
    }

    async fn handle_conn(&self, mut stream: TcpStream, id: u64, mut shutdown_rx: watch::Receiver<bool>) {
        let mut deframer = Deframer::new(self.delimiter);
        let mut buf = [0u8; 4096];

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                res = stream.read(&mut buf) => {
                    match res {
                        Ok(0) => {
                            info!("[order-router] client {id} disconnected");
                            break;
                        }
                        Ok(n) => {
                            deframer.push(&buf[..n]);
                            while let Some(msg) = deframer.next_frame() {
                                match Order::from_frame(&msg, self.delimiter) {
                                    Ok(order) => {
                                        info!("[order-router] received order: {order}");
                                        self.sink.execute(&order);
                                    }
                                    // One bad message must not tear the session down.
                                    Err(e) => warn!("[order-router] client {id}: {e}"),
                                }
                            }
                        }
                        Err(e) => {
                            warn!("[order-router] client {id} read error: {e}");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Idempotent shutdown: stop accepting, close every session, clear the
    /// connection set.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("[order-router] shutting down");

        drop(self.listener.lock().await.take());
        if let Some(task) = self.accept_task.lock().await.take()
            && tokio::time::timeout(JOIN_TIMEOUT, task).await.is_err()
        {
            warn!("[order-router] accept loop did not stop in time");
        }

        let handles: Vec<ConnHandle> = self.conns.lock().await.drain(..).collect();
        for mut conn in handles {
            let _ = conn.shutdown_tx.send(true);
            if let Some(task) = conn.task.take()
                && tokio::time::timeout(JOIN_TIMEOUT, task).await.is_err()
            {
                warn!("[order-router] session {} did not stop in time", conn.id);
            }
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        info!("[order-router] shutdown complete");
    }
}

// ---------------------------------------------------------------------------
// Process module
// ---------------------------------------------------------------------------

/// Runner-facing wrapper: binds the router on the configured port with the
/// pass-through execution stub.
pub struct RouterModule {
    config: pulse_core::config::AppConfig,
    router: Option<Arc<OrderRouter>>,
}

impl RouterModule {
    pub fn new(config: &pulse_core::config::AppConfig) -> Self {
        Self { config: config.clone(), router: None }
    }
}

#[async_trait::async_trait]
impl pulse_core::module::Module for RouterModule {
    fn name(&self) -> &str {
        "order-router"
    }

    async fn start(&mut self) -> anyhow::Result<()> {
        let router = Arc::new(
            OrderRouter::bind(
                self.config.router.port,
                self.config.delimiter(),
                Arc::new(LogExecution),
            )
            .await?,
        );
        Arc::clone(&router).serve().await;
        self.router = Some(router);
        Ok(())
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        if let Some(router) = self.router.take() {
            router.shutdown().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use tokio::io::AsyncWriteExt;

    struct CollectingSink {
        orders: StdMutex<Vec<Order>>,
    }

    impl ExecutionSink for CollectingSink {
        fn execute(&self, order: &Order) {
            self.orders.lock().unwrap().push(order.clone());
        }
    }

    async fn wait_for<F: Fn() -> bool>(cond: F) {
        for _ in 0..100 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn routes_orders_and_survives_malformed_frames() {
        let sink = Arc::new(CollectingSink { orders: StdMutex::new(Vec::new()) });
        let router = Arc::new(OrderRouter::bind(0, b'*', Arc::clone(&sink) as Arc<dyn ExecutionSink>).await.unwrap());
        Arc::clone(&router).serve().await;

        let mut sock = TcpStream::connect(router.local_addr()).await.unwrap();
        // Valid, malformed, then valid again — all on one connection, with
        // the second valid frame split across two writes.
        sock.write_all(b"1696180200.0,BUY,100,AAPL,172.53*garbage*2.0,SELL,").await.unwrap();
        sock.write_all(b"50,MSFT,325.2*").await.unwrap();
        sock.flush().await.unwrap();

        wait_for(|| sink.orders.lock().unwrap().len() == 2).await;
        let orders = sink.orders.lock().unwrap().clone();
        assert_eq!(orders[0].symbol, "AAPL");
        assert_eq!(orders[0].quantity, 100);
        assert_eq!(orders[1].symbol, "MSFT");
        assert_eq!(orders[1].side, pulse_core::types::Side::Sell);

        router.shutdown().await;
        router.shutdown().await; // idempotent
    }

    #[tokio::test]
    async fn shutdown_closes_sessions() {
        let sink = Arc::new(CollectingSink { orders: StdMutex::new(Vec::new()) });
        let router = Arc::new(OrderRouter::bind(0, b'*', Arc::clone(&sink) as Arc<dyn ExecutionSink>).await.unwrap());
        Arc::clone(&router).serve().await;

        let mut sock = TcpStream::connect(router.local_addr()).await.unwrap();
        // Give the accept loop a moment to register the session.
        tokio::time::sleep(Duration::from_millis(50)).await;

        router.shutdown().await;

        // Peer observes EOF once the session task drops the socket.
        let mut buf = [0u8; 16];
        let n = tokio::time::timeout(Duration::from_secs(2), sock.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);
    }
}
