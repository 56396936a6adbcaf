//! Strategy layer: per-channel signal sources and their fusion.
//!
//! - [`crossover`] — moving-average crossover detector (price channel)
//! - [`sentiment`] — threshold classifier (news channel)
//! - [`combiner`] — latest-value fusion into dispatched trades

pub mod combiner;
pub mod crossover;
pub mod sentiment;

pub use combiner::{SignalCombiner, TradeSignalFn};
pub use crossover::{MovingAverageCrossover, Signal};
pub use sentiment::SentimentStrategy;
