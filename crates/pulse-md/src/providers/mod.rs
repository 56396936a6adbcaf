//! Frame providers for the gateway's broadcast channels.
//!
//! - [`market_data`] — CSV replay of `symbol,price,timestamp` rows
//! - [`news`] — synthetic sentiment generator

pub mod market_data;
pub mod news;

pub use market_data::CsvPriceProvider;
pub use news::RandomNewsProvider;
