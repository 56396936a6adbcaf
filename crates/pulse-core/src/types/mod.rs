//! Core data types shared by every process.
//!
//! - [`market`] — price and sentiment payloads on the broadcast channels
//! - [`order`] — the routable order model and trading enums
//! - [`symbol`] — fixed-size symbol buffers for shm-resident slots

pub mod market;
pub mod order;
pub mod symbol;

pub use market::{PriceUpdate, SentimentUpdate};
pub use order::{Action, Order, Side};
pub use symbol::{SYMBOL_LEN, symbol_from_bytes, symbol_to_bytes};
