//! Price mirror process module.
//!
//! Creates the shared price store and keeps it current: a feed client
//! subscribes to the market-data channel and every well-formed tick
//! overwrites its instrument's slot. This is the only process that creates
//! (and on stop, unlinks) the region; the strategy side attaches.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use pulse_core::config::AppConfig;
use pulse_core::feed::{self, FeedClient};
use pulse_core::module::Module;
use pulse_core::shm::SharedPriceStore;
use pulse_core::types::PriceUpdate;

pub struct PriceMirror {
    config: AppConfig,
    feed: Option<FeedClient>,
    store: Option<Arc<SharedPriceStore>>,
}

impl PriceMirror {
    pub fn new(config: &AppConfig) -> Self {
        Self { config: config.clone(), feed: None, store: None }
    }
}

#[async_trait]
impl Module for PriceMirror {
    fn name(&self) -> &str {
        "price-mirror"
    }

    async fn start(&mut self) -> Result<()> {
        let delimiter = self.config.delimiter();

        let store =
            Arc::new(SharedPriceStore::create(self.config.shm_name(), &self.config.symbols)?);

        let mut feed = FeedClient::connect(
            &[(feed::MARKET_DATA, self.config.mirror_md_addr())],
            delimiter,
        )
        .await?;

        let slot_store = Arc::clone(&store);
        feed.subscribe(
            feed::MARKET_DATA,
            Arc::new(move |msg| match PriceUpdate::from_frame(msg, delimiter) {
                Ok(tick) => {
                    slot_store.update(&tick.symbol, tick.price, tick.timestamp);
                    debug!("price book updated: {} {} {}", tick.symbol, tick.price, tick.timestamp);
                }
                Err(e) => warn!("dropping malformed market data frame: {e}"),
            }),
        )?;
        feed.run();

        self.feed = Some(feed);
        self.store = Some(store);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(mut feed) = self.feed.take() {
            feed.shutdown().await;
        }
        if let Some(store) = self.store.take() {
            // Creator: detach and destroy the region.
            store.close();
            store.unlink();
        }
        Ok(())
    }
}
