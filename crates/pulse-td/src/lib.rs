//! # pulse-td
//!
//! Trading side of the pulse system.
//!
//! - [`strategy`] — crossover detector, sentiment thresholds, signal combiner
//! - [`engine`] — the strategy process module (poller + worker + wiring)
//! - [`client`] — order submission over TCP with background reconnect
//! - [`router`] — the order-routing server and its execution sink

pub mod client;
pub mod engine;
pub mod router;
pub mod strategy;

pub use client::{OrderClient, OrderSubmitter};
pub use engine::StrategyEngine;
pub use router::{ExecutionSink, LogExecution, OrderRouter, RouterModule};
