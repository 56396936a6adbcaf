//! Client connection to the order router.
//!
//! Orders are submitted through a bounded channel and written by a
//! background task that owns the TCP connection, so the combiner worker
//! never blocks on network I/O. The task reconnects with exponential
//! backoff; an order whose send fails is dropped with a warning (best
//! effort, like every other hop in the system).

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use pulse_core::error::PulseError;
use pulse_core::time_util;
use pulse_core::types::{Action, Order, Side};

const ORDER_QUEUE: usize = 1024;
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Cheap cloneable submission handle, safe to move into callbacks.
#[derive(Clone)]
pub struct OrderSubmitter {
    tx: mpsc::Sender<Order>,
}

impl OrderSubmitter {
    /// Build and enqueue an order for the current instant.
    ///
    /// `Action::Hold` is rejected before anything is queued; a full queue or
    /// stopped client is a submission failure, not a panic.
    pub fn try_place(
        &self,
        symbol: &str,
        quantity: u32,
        price: f64,
        action: Action,
    ) -> Result<(), PulseError> {
        let side = Side::try_from(action)?;
        let order = Order::new(time_util::now_secs_f64(), side, quantity, symbol, price)?;
        self.tx
            .try_send(order)
            .map_err(|_| PulseError::Trading("order queue full or client stopped".into()))
    }
}

/// Owns the background writer task for one order-router connection.
pub struct OrderClient {
    submitter: OrderSubmitter,
    shutdown_tx: watch::Sender<bool>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl OrderClient {
    /// Start the writer task targeting `addr` (`host:port`). Connection
    /// establishment happens in the background, so the router may come up
    /// after us.
    pub fn new(addr: String, delimiter: u8) -> Self {
        let (tx, rx) = mpsc::channel(ORDER_QUEUE);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(writer_loop(addr, delimiter, rx, shutdown_rx));
        Self { submitter: OrderSubmitter { tx }, shutdown_tx, task: Some(task) }
    }

    pub fn submitter(&self) -> OrderSubmitter {
        self.submitter.clone()
    }

    /// Stop the writer task and close the connection. Idempotent.
    pub async fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take()
            && tokio::time::timeout(Duration::from_secs(2), task).await.is_err()
        {
            warn!("order client task did not stop in time");
        }
    }
}

async fn writer_loop(
    addr: String,
    delimiter: u8,
    mut rx: mpsc::Receiver<Order>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut backoff = Duration::from_millis(100);
    let mut stream: Option<TcpStream> = None;

    loop {
        if stream.is_none() {
            tokio::select! {
                _ = shutdown_rx.changed() => return,
                res = TcpStream::connect(&addr) => match res {
                    Ok(s) => {
                        info!("connected to order router at {addr}");
                        backoff = Duration::from_millis(100);
                        stream = Some(s);
                    }
                    Err(e) => {
                        warn!("order router connect failed: {e}, retrying in {backoff:?}");
                        tokio::select! {
                            _ = tokio::time::sleep(backoff) => {},
                            _ = shutdown_rx.changed() => return,
                        }
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                        continue;
                    }
                }
            }
        }

        tokio::select! {
            _ = shutdown_rx.changed() => return,
            maybe = rx.recv() => {
                let Some(order) = maybe else { return };
                let data = order.to_frame(delimiter);
                // stream is Some here; None only on the connect branch above.
                if let Some(s) = stream.as_mut() {
                    match s.write_all(&data).await {
                        Ok(()) => info!("sent order: {order}"),
                        Err(e) => {
                            warn!("order send failed: {e}, dropping order and reconnecting");
                            stream = None;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn hold_rejected_before_queueing() {
        let mut client = OrderClient::new("127.0.0.1:1".to_string(), b'*');
        let err = client.submitter().try_place("AAPL", 100, 172.53, Action::Hold).unwrap_err();
        assert!(matches!(err, PulseError::Trading(_)));
        client.stop().await;
    }

    #[tokio::test]
    async fn invalid_order_rejected() {
        let mut client = OrderClient::new("127.0.0.1:1".to_string(), b'*');
        assert!(client.submitter().try_place("AAPL", 0, 172.53, Action::Buy).is_err());
        assert!(client.submitter().try_place("", 100, 172.53, Action::Buy).is_err());
        client.stop().await;
    }

    #[tokio::test]
    async fn placed_order_arrives_framed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut client = OrderClient::new(addr.to_string(), b'*');
        let (mut sock, _) = listener.accept().await.unwrap();

        client.submitter().try_place("AAPL", 100, 172.53, Action::Buy).unwrap();

        let mut buf = [0u8; 256];
        let n = tokio::time::timeout(Duration::from_secs(2), sock.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let order = Order::from_frame(&buf[..n], b'*').unwrap();
        assert_eq!(order.symbol, "AAPL");
        assert_eq!(order.quantity, 100);
        assert_eq!(order.price, 172.53);
        assert_eq!(order.side, Side::Buy);
        assert!(buf[..n].ends_with(b"*"));

        client.stop().await;
        client.stop().await; // idempotent
    }
}
