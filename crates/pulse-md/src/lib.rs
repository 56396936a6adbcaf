//! # pulse-md
//!
//! Market-data distribution side of the pulse trading system.
//!
//! - [`stream`] — the broadcast server (one provider, many readers)
//! - [`providers`] — CSV replay and synthetic news frame sources
//! - [`gateway`] — the gateway process module (both feed channels)
//! - [`mirror`] — the price-mirror process module (shared store writer)

pub mod gateway;
pub mod mirror;
pub mod providers;
pub mod stream;

pub use gateway::Gateway;
pub use mirror::PriceMirror;
pub use stream::BroadcastServer;
