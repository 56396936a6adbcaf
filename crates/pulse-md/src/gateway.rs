//! Gateway process module: one broadcast server per feed channel.
//!
//! The market-data channel replays the configured CSV file; the news channel
//! runs the synthetic sentiment generator. Each server gets its own serve
//! task so an exhausted CSV does not stop the news stream.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use pulse_core::config::AppConfig;
use pulse_core::module::Module;

use crate::providers::{CsvPriceProvider, RandomNewsProvider};
use crate::stream::BroadcastServer;

pub struct Gateway {
    config: AppConfig,
    md: Option<Arc<BroadcastServer>>,
    news: Option<Arc<BroadcastServer>>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl Gateway {
    pub fn new(config: &AppConfig) -> Self {
        Self { config: config.clone(), md: None, news: None, tasks: Vec::new() }
    }
}

#[async_trait]
impl Module for Gateway {
    fn name(&self) -> &str {
        "gateway"
    }

    async fn start(&mut self) -> Result<()> {
        let delimiter = self.config.delimiter();

        let md_provider = CsvPriceProvider::open(&self.config.gateway.data_path, delimiter)?;
        let md =
            Arc::new(BroadcastServer::bind(self.config.gateway.md_port, delimiter, "md-stream").await?);

        let news_provider = RandomNewsProvider::new(
            self.config.symbols.clone(),
            self.config.news_interval(),
            self.config.gateway.news_limit,
            delimiter,
        );
        let news = Arc::new(
            BroadcastServer::bind(self.config.gateway.news_port, delimiter, "news-stream").await?,
        );

        let md_server = Arc::clone(&md);
        self.tasks.push(tokio::spawn(async move {
            md_server.serve(Box::new(md_provider)).await;
        }));
        let news_server = Arc::clone(&news);
        self.tasks.push(tokio::spawn(async move {
            news_server.serve(Box::new(news_provider)).await;
        }));

        self.md = Some(md);
        self.news = Some(news);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        for server in [self.md.take(), self.news.take()].into_iter().flatten() {
            server.shutdown().await;
        }
        for task in self.tasks.drain(..) {
            if tokio::time::timeout(Duration::from_secs(2), task).await.is_err() {
                warn!("gateway serve task did not stop in time");
            }
        }
        Ok(())
    }
}
