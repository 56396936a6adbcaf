//! Strategy process module.
//!
//! Wires the two signal channels into the combiner:
//!
//! ```text
//! shared store ──poll──► StrategyEvent::Price ─┐
//!                                              ├─► combiner worker ──► order client
//! news feed ──parse──► StrategyEvent::News ────┘
//! ```
//!
//! Both channels feed one crossbeam queue drained by a single blocking
//! worker, so per-instrument fusion sees a total order of updates. The
//! shared store is attached (never created) with a bounded retry, because
//! the mirror process may still be starting.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use crossbeam_channel::{Receiver, Sender};
use tokio::sync::watch;
use tracing::{info, warn};

use pulse_core::config::AppConfig;
use pulse_core::feed::{self, FeedClient};
use pulse_core::module::Module;
use pulse_core::shm::SharedPriceStore;
use pulse_core::time_util;
use pulse_core::types::SentimentUpdate;

use crate::client::OrderClient;
use crate::strategy::{MovingAverageCrossover, SentimentStrategy, SignalCombiner};

const EVENT_QUEUE: usize = 8192;

/// One update on either strategy channel.
pub enum StrategyEvent {
    Price { symbol: String, price: f64 },
    News(SentimentUpdate),
}

pub struct StrategyEngine {
    config: AppConfig,
    feed: Option<FeedClient>,
    store: Option<Arc<SharedPriceStore>>,
    client: Option<OrderClient>,
    events_tx: Option<Sender<StrategyEvent>>,
    poller_shutdown: Option<watch::Sender<bool>>,
    poller: Option<tokio::task::JoinHandle<()>>,
    worker: Option<tokio::task::JoinHandle<()>>,
}

impl StrategyEngine {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            config: config.clone(),
            feed: None,
            store: None,
            client: None,
            events_tx: None,
            poller_shutdown: None,
            poller: None,
            worker: None,
        }
    }
}

#[async_trait]
impl Module for StrategyEngine {
    fn name(&self) -> &str {
        "strategy"
    }

    async fn start(&mut self) -> Result<()> {
        let delimiter = self.config.delimiter();
        let strategy_cfg = self.config.strategy.clone();

        // Attach to the mirror's region; the retry sleeps, so keep it off
        // the async runtime.
        let shm_name = self.config.shm_name().to_string();
        let symbols = self.config.symbols.clone();
        let (retries, delay) = (strategy_cfg.attach_retries(), strategy_cfg.attach_delay());
        let store = tokio::task::spawn_blocking(move || {
            SharedPriceStore::attach_with_retry(&shm_name, &symbols, retries, delay)
        })
        .await??;
        let store = Arc::new(store);

        let client = OrderClient::new(self.config.order_router_addr(), delimiter);

        let mut combiner = SignalCombiner::new(
            MovingAverageCrossover::new(
                strategy_cfg.short_window(),
                strategy_cfg.long_window(),
                strategy_cfg.quantity(),
            ),
            SentimentStrategy::new(
                strategy_cfg.bearish_threshold(),
                strategy_cfg.bullish_threshold(),
            ),
        );
        let submitter = client.submitter();
        combiner.set_trade_signal_listener(Box::new(move |symbol, quantity, price, action| {
            match submitter.try_place(symbol, quantity, price, action) {
                Ok(()) => info!("trade signal dispatched: {action} {quantity} {symbol} @ {price}"),
                Err(e) => warn!("trade signal for {symbol} not routed: {e}"),
            }
        }));

        let (events_tx, events_rx) = crossbeam_channel::bounded::<StrategyEvent>(EVENT_QUEUE);
        self.worker =
            Some(tokio::task::spawn_blocking(move || run_combiner_loop(events_rx, combiner)));

        // News channel: parse, validate, enqueue.
        let mut feed = FeedClient::connect(
            &[(feed::NEWS, self.config.strategy_news_addr())],
            delimiter,
        )
        .await?;
        let news_tx = events_tx.clone();
        feed.subscribe(
            feed::NEWS,
            Arc::new(move |msg| match SentimentUpdate::from_frame(msg, delimiter) {
                Ok(update) => {
                    if news_tx.try_send(StrategyEvent::News(update)).is_err() {
                        warn!("strategy event queue full, dropping news");
                    }
                }
                Err(e) => warn!("rejecting news frame: {e}"),
            }),
        )?;
        feed.run();

        // Price channel: poll the shared store.
        let (poll_shutdown_tx, poll_shutdown_rx) = watch::channel(false);
        let poll_store = Arc::clone(&store);
        let poll_symbols = self.config.symbols.clone();
        let poll_tx = events_tx.clone();
        self.poller = Some(tokio::spawn(poll_loop(
            poll_store,
            poll_symbols,
            strategy_cfg.poll_interval(),
            poll_tx,
            poll_shutdown_rx,
        )));

        self.feed = Some(feed);
        self.store = Some(store);
        self.client = Some(client);
        self.events_tx = Some(events_tx);
        self.poller_shutdown = Some(poll_shutdown_tx);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(mut feed) = self.feed.take() {
            feed.shutdown().await;
        }
        if let Some(tx) = self.poller_shutdown.take() {
            let _ = tx.send(true);
        }
        if let Some(poller) = self.poller.take()
            && tokio::time::timeout(Duration::from_secs(2), poller).await.is_err()
        {
            warn!("price poller did not stop in time");
        }
        // Last event sender gone — the combiner worker drains and exits.
        drop(self.events_tx.take());
        if let Some(worker) = self.worker.take()
            && tokio::time::timeout(Duration::from_secs(2), worker).await.is_err()
        {
            warn!("combiner worker did not stop in time");
        }
        if let Some(mut client) = self.client.take() {
            client.stop().await;
        }
        if let Some(store) = self.store.take() {
            // Attacher: detach only, never unlink.
            store.close();
        }
        Ok(())
    }
}

/// Drain strategy events on a blocking thread until every sender is gone.
fn run_combiner_loop(rx: Receiver<StrategyEvent>, mut combiner: SignalCombiner) {
    info!("combiner loop started");
    while let Ok(event) = rx.recv() {
        match event {
            StrategyEvent::Price { symbol, price } => combiner.on_price_tick(&symbol, price),
            StrategyEvent::News(update) => combiner.on_news(&update.symbol, update.sentiment),
        }
    }
    info!("combiner loop exited");
}

/// Poll every configured symbol; forward a tick only when its slot was
/// written since the previous poll (each written tick is seen at most once,
/// idle symbols produce nothing).
async fn poll_loop(
    store: Arc<SharedPriceStore>,
    symbols: Vec<String>,
    interval: Duration,
    tx: Sender<StrategyEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut last_poll = 0.0_f64;
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = ticker.tick() => {
                let now = time_util::now_secs_f64();
                for symbol in &symbols {
                    if let Some((price, timestamp)) = store.read(symbol)
                        && last_poll < timestamp
                        && timestamp <= now
                        && tx.try_send(StrategyEvent::Price { symbol: symbol.clone(), price }).is_err()
                    {
                        warn!("strategy event queue full, dropping tick for {symbol}");
                    }
                }
                last_poll = now;
            }
        }
    }
}
