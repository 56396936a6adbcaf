//! # pulse-core
//!
//! Shared kernel for the pulse trading system, providing:
//!
//! - **Framing** (`framing`) — delimiter-based wire protocol
//! - **Types** (`types`) — price/sentiment payloads, orders, symbol utils
//! - **Feed client** (`feed`) — per-channel TCP reassembly and fan-out
//! - **Shared memory** (`shm`) — cross-process price store over mmap
//! - **Providers** (`provider`) — tri-state pull abstraction for sources
//! - **Configuration** (`config`) — JSON config deserialization
//! - **Error types** (`error`) — domain-specific `PulseError` via thiserror
//! - **Module trait** (`module`) — process lifecycle driven by the runner
//! - **Time utilities** (`time_util`) — f64 epoch-second timestamps
//! - **Logging** (`logging`) — tracing-based structured logging

pub mod config;
pub mod error;
pub mod feed;
pub mod framing;
pub mod logging;
pub mod module;
pub mod provider;
pub mod shm;
pub mod time_util;
pub mod types;

// Re-export types at crate root for convenience.
pub use types::*;
