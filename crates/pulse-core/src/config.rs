//! Configuration parsing for the pulse trading system.
//!
//! All four processes read the same JSON config file. The top-level
//! structure carries the shared instrument list and delimiter plus one
//! section per process. Optional fields fall back to defaults through the
//! accessor methods, and cross-section defaults (e.g. the strategy's news
//! port defaulting to the gateway's) are resolved on [`AppConfig`] so no
//! component reaches outside its own section at runtime.
//!
//! # Example config
//!
//! ```json
//! {
//!   "symbols": ["AAPL", "MSFT", "SPY"],
//!   "delimiter": "*",
//!   "gateway": { "data_path": "data/market_data.csv", "md_port": 8000, "news_port": 8001 },
//!   "mirror": { "shm_name": "price_book" },
//!   "strategy": { "short_window": 5, "long_window": 20 },
//!   "router": { "port": 9000 }
//! }
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::PulseError;
use crate::framing::DEFAULT_DELIMITER;

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Instrument universe, shared by every process. Slot order in the
    /// shared price store follows this list.
    pub symbols: Vec<String>,

    /// Message delimiter as a one-character string (default `"*"`).
    pub delimiter: Option<String>,

    pub gateway: GatewayConfig,

    #[serde(default)]
    pub mirror: MirrorConfig,

    #[serde(default)]
    pub strategy: StrategyConfig,

    pub router: RouterConfig,
}

/// Gateway process: broadcast servers for market data and news.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// CSV file replayed on the market-data channel.
    pub data_path: String,
    pub md_port: u16,
    pub news_port: u16,
    /// Pacing of the synthetic news provider (default 250 ms).
    pub news_interval_ms: Option<u64>,
    /// Optional cap on emitted news events (unbounded when absent).
    pub news_limit: Option<u64>,
}

/// Price mirror process: feed client + shared store creator.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MirrorConfig {
    pub host: Option<String>,
    /// Gateway market-data port override (defaults to `gateway.md_port`).
    pub md_port: Option<u16>,
    pub shm_name: Option<String>,
}

/// Strategy process: store attacher, news subscriber, combiner, order client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StrategyConfig {
    pub host: Option<String>,
    /// Gateway news port override (defaults to `gateway.news_port`).
    pub news_port: Option<u16>,
    pub shm_name: Option<String>,
    pub order_router_host: Option<String>,
    /// Defaults to `router.port`.
    pub order_router_port: Option<u16>,
    pub short_window: Option<usize>,
    pub long_window: Option<usize>,
    pub bullish_threshold: Option<u8>,
    pub bearish_threshold: Option<u8>,
    pub quantity: Option<u32>,
    pub poll_interval_ms: Option<u64>,
    pub attach_retries: Option<u32>,
    pub attach_delay_ms: Option<u64>,
}

/// Order router process.
#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    pub port: u16,
}

impl AppConfig {
    /// The single delimiter byte used by every transport.
    pub fn delimiter(&self) -> u8 {
        self.delimiter
            .as_ref()
            .and_then(|s| s.as_bytes().first().copied())
            .unwrap_or(DEFAULT_DELIMITER)
    }

    /// `host:port` of the gateway market-data channel, as the mirror sees it.
    pub fn mirror_md_addr(&self) -> String {
        let host = self.mirror.host.as_deref().unwrap_or("127.0.0.1");
        let port = self.mirror.md_port.unwrap_or(self.gateway.md_port);
        format!("{host}:{port}")
    }

    /// `host:port` of the gateway news channel, as the strategy sees it.
    pub fn strategy_news_addr(&self) -> String {
        let host = self.strategy.host.as_deref().unwrap_or("127.0.0.1");
        let port = self.strategy.news_port.unwrap_or(self.gateway.news_port);
        format!("{host}:{port}")
    }

    /// `host:port` of the order router, as the strategy sees it.
    pub fn order_router_addr(&self) -> String {
        let host = self.strategy.order_router_host.as_deref().unwrap_or("127.0.0.1");
        let port = self.strategy.order_router_port.unwrap_or(self.router.port);
        format!("{host}:{port}")
    }

    /// Shared-store name — the mirror creates it, the strategy attaches.
    pub fn shm_name(&self) -> &str {
        self.mirror
            .shm_name
            .as_deref()
            .or(self.strategy.shm_name.as_deref())
            .unwrap_or("price_book")
    }

    pub fn news_interval(&self) -> Duration {
        Duration::from_millis(self.gateway.news_interval_ms.unwrap_or(250))
    }
}

impl StrategyConfig {
    pub fn short_window(&self) -> usize {
        self.short_window.unwrap_or(5)
    }

    pub fn long_window(&self) -> usize {
        self.long_window.unwrap_or(20)
    }

    pub fn bullish_threshold(&self) -> u8 {
        self.bullish_threshold.unwrap_or(60)
    }

    pub fn bearish_threshold(&self) -> u8 {
        self.bearish_threshold.unwrap_or(40)
    }

    pub fn quantity(&self) -> u32 {
        self.quantity.unwrap_or(100)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.unwrap_or(1000))
    }

    pub fn attach_retries(&self) -> u32 {
        self.attach_retries.unwrap_or(10)
    }

    pub fn attach_delay(&self) -> Duration {
        Duration::from_millis(self.attach_delay_ms.unwrap_or(500))
    }
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> Result<AppConfig, PulseError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| PulseError::Config(format!("read {}: {e}", path.display())))?;
    let config: AppConfig = serde_json::from_str(&content)
        .map_err(|e| PulseError::Config(format!("parse {}: {e}", path.display())))?;
    if config.symbols.is_empty() {
        return Err(PulseError::Config("symbols list is empty".into()));
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> AppConfig {
        serde_json::from_str(
            r#"{
                "symbols": ["AAPL", "MSFT"],
                "gateway": { "data_path": "data/md.csv", "md_port": 8000, "news_port": 8001 },
                "router": { "port": 9000 }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn defaults_applied() {
        let cfg = minimal();
        assert_eq!(cfg.delimiter(), b'*');
        assert_eq!(cfg.shm_name(), "price_book");
        assert_eq!(cfg.mirror_md_addr(), "127.0.0.1:8000");
        assert_eq!(cfg.strategy_news_addr(), "127.0.0.1:8001");
        assert_eq!(cfg.order_router_addr(), "127.0.0.1:9000");
        assert_eq!(cfg.strategy.short_window(), 5);
        assert_eq!(cfg.strategy.long_window(), 20);
        assert_eq!(cfg.strategy.bullish_threshold(), 60);
        assert_eq!(cfg.strategy.bearish_threshold(), 40);
        assert_eq!(cfg.strategy.quantity(), 100);
        assert_eq!(cfg.strategy.poll_interval(), Duration::from_millis(1000));
    }

    #[test]
    fn overrides_win() {
        let cfg: AppConfig = serde_json::from_str(
            r#"{
                "symbols": ["SPY"],
                "delimiter": "|",
                "gateway": { "data_path": "x.csv", "md_port": 1, "news_port": 2 },
                "mirror": { "host": "10.0.0.5", "shm_name": "book2" },
                "strategy": { "order_router_port": 9999, "short_window": 3 },
                "router": { "port": 9000 }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.delimiter(), b'|');
        assert_eq!(cfg.shm_name(), "book2");
        assert_eq!(cfg.mirror_md_addr(), "10.0.0.5:1");
        assert_eq!(cfg.order_router_addr(), "127.0.0.1:9999");
        assert_eq!(cfg.strategy.short_window(), 3);
    }
}
