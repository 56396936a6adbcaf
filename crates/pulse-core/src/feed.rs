//! Feed client: long-lived connections to the broadcast servers.
//!
//! One TCP connection per feed channel, with a fixed socket-to-channel
//! mapping established at construction. Each connection runs its own receive
//! task that reassembles the byte stream into frames and synchronously
//! invokes every subscriber registered for that channel, in registration
//! order, once per complete frame. Subscribers receive the full
//! delimiter-terminated message.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::PulseError;
use crate::framing::Deframer;

/// Channel name for the price tick feed.
pub const MARKET_DATA: &str = "market_data";
/// Channel name for the sentiment feed.
pub const NEWS: &str = "news";

const KNOWN_CHANNELS: [&str; 2] = [MARKET_DATA, NEWS];

/// Subscriber callback, invoked with the complete delimited message.
pub type FeedCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

type SubscriberMap = Arc<Mutex<HashMap<String, Vec<FeedCallback>>>>;

struct ChannelConn {
    /// Present until `run()` hands the socket to the receive task.
    stream: Option<TcpStream>,
    shutdown_tx: Option<watch::Sender<bool>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

/// Client side of the broadcast protocol: connect, reassemble, fan out.
pub struct FeedClient {
    delimiter: u8,
    subscribers: SubscriberMap,
    conns: HashMap<String, ChannelConn>,
}

impl std::fmt::Debug for FeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedClient")
            .field("delimiter", &self.delimiter)
            .field("channels", &self.conns.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl FeedClient {
    /// Open one connection per `(channel, "host:port")` pair.
    ///
    /// Channel names must come from the known set (`market_data`, `news`);
    /// anything else is a [`PulseError::Channel`]. A failed connect aborts
    /// construction.
    pub async fn connect(channels: &[(&str, String)], delimiter: u8) -> Result<Self, PulseError> {
        let mut conns = HashMap::new();
        let mut subscribers = HashMap::new();

        for (name, addr) in channels {
            if !KNOWN_CHANNELS.contains(name) {
                return Err(PulseError::Channel(name.to_string()));
            }
            let stream = TcpStream::connect(addr.as_str()).await.map_err(|e| {
                PulseError::Transport(format!("connect {addr} for channel '{name}': {e}"))
            })?;
            info!("feed channel '{name}' connected to {addr}");
            conns.insert(
                name.to_string(),
                ChannelConn { stream: Some(stream), shutdown_tx: None, task: None },
            );
            subscribers.insert(name.to_string(), Vec::new());
        }

        Ok(Self { delimiter, subscribers: Arc::new(Mutex::new(subscribers)), conns })
    }

    /// Register a subscriber for a channel carried by this client.
    ///
    /// Multiple subscribers per channel are allowed; all are invoked in
    /// registration order.
    pub fn subscribe(&self, channel: &str, callback: FeedCallback) -> Result<(), PulseError> {
        let mut subs = self.subscribers.lock().unwrap_or_else(|p| p.into_inner());
        match subs.get_mut(channel) {
            Some(list) => {
                list.push(callback);
                Ok(())
            }
            None => Err(PulseError::Channel(channel.to_string())),
        }
    }

    /// Spawn the receive loop for every connected channel.
    pub fn run(&mut self) {
        for (name, conn) in self.conns.iter_mut() {
            let Some(stream) = conn.stream.take() else { continue };
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            conn.shutdown_tx = Some(shutdown_tx);

            let channel = name.clone();
            let subscribers = Arc::clone(&self.subscribers);
            let delimiter = self.delimiter;
            conn.task = Some(tokio::spawn(async move {
                receive_loop(stream, channel, delimiter, subscribers, shutdown_rx).await;
            }));
        }
    }

    /// Tear down one channel: stop its task, close the socket, forget the
    /// mapping, clear that channel's subscriber list.
    pub async fn disconnect(&mut self, channel: &str) {
        let Some(mut conn) = self.conns.remove(channel) else { return };

        if let Some(tx) = conn.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = conn.task.take()
            && tokio::time::timeout(Duration::from_secs(2), task).await.is_err()
        {
            warn!("feed channel '{channel}' receive task did not stop in time");
        }
        // The socket closes when the task (or this scope) drops the stream.
        drop(conn.stream.take());

        let mut subs = self.subscribers.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(list) = subs.get_mut(channel) {
            list.clear();
        }
        info!("feed channel '{channel}' disconnected");
    }

    /// Disconnect every channel. Idempotent.
    pub async fn shutdown(&mut self) {
        let names: Vec<String> = self.conns.keys().cloned().collect();
        for name in names {
            self.disconnect(&name).await;
        }
    }
}

async fn receive_loop(
    mut stream: TcpStream,
    channel: String,
    delimiter: u8,
    subscribers: SubscriberMap,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut deframer = Deframer::new(delimiter);
    let mut buf = [0u8; 4096];

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                debug!("feed channel '{channel}' shutdown requested");
                break;
            }
            res = stream.read(&mut buf) => {
                match res {
                    Ok(0) => {
                        info!("feed channel '{channel}' peer disconnected");
                        break;
                    }
                    Ok(n) => {
                        deframer.push(&buf[..n]);
                        while let Some(mut msg) = deframer.next_frame() {
                            msg.push(delimiter);
                            let subs: Vec<FeedCallback> = {
                                let guard =
                                    subscribers.lock().unwrap_or_else(|p| p.into_inner());
                                guard.get(&channel).cloned().unwrap_or_default()
                            };
                            for cb in subs {
                                cb(&msg);
                            }
                        }
                    }
                    Err(e) => {
                        warn!("feed channel '{channel}' read error: {e}");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn unknown_channel_rejected_at_connect() {
        let err = FeedClient::connect(&[("weather", "127.0.0.1:1".to_string())], b'*')
            .await
            .unwrap_err();
        assert!(matches!(err, PulseError::Channel(_)));
    }

    #[tokio::test]
    async fn subscribe_validates_channel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let client = FeedClient::connect(&[(MARKET_DATA, addr.to_string())], b'*')
            .await
            .unwrap();
        accept.await.unwrap();

        assert!(client.subscribe(MARKET_DATA, Arc::new(|_| {})).is_ok());
        // `news` is a known channel but not carried by this client.
        assert!(client.subscribe(NEWS, Arc::new(|_| {})).is_err());
        assert!(client.subscribe("bogus", Arc::new(|_| {})).is_err());
    }

    #[tokio::test]
    async fn reassembles_fragmented_stream_and_fans_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            // Two frames split across three writes, plus an empty frame.
            sock.write_all(b"AAPL,100,1.0*MS").await.unwrap();
            sock.write_all(b"FT,2").await.unwrap();
            sock.write_all(b"00,2.0**").await.unwrap();
            sock.flush().await.unwrap();
            // Hold the socket open long enough for the client to drain it.
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let mut client = FeedClient::connect(&[(MARKET_DATA, addr.to_string())], b'*')
            .await
            .unwrap();

        let got: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::clone(&got);
        client
            .subscribe(MARKET_DATA, Arc::new(move |msg| first.lock().unwrap().push(msg.to_vec())))
            .unwrap();
        let second = Arc::clone(&got);
        client
            .subscribe(MARKET_DATA, Arc::new(move |msg| second.lock().unwrap().push(msg.to_vec())))
            .unwrap();
        client.run();

        // Wait until both subscribers saw both frames.
        for _ in 0..50 {
            if got.lock().unwrap().len() >= 4 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let msgs = got.lock().unwrap().clone();
        assert_eq!(
            msgs,
            vec![
                b"AAPL,100,1.0*".to_vec(),
                b"AAPL,100,1.0*".to_vec(),
                b"MSFT,200,2.0*".to_vec(),
                b"MSFT,200,2.0*".to_vec(),
            ]
        );

        client.shutdown().await;
        client.shutdown().await; // idempotent
        server.await.unwrap();
    }
}
