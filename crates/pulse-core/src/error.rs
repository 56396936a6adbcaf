//! Typed error definitions for the pulse trading system.
//!
//! Provides [`PulseError`] for domain-specific errors that are more
//! informative than plain `anyhow::Error` strings. All variants implement
//! `std::error::Error` via `thiserror`, so they integrate seamlessly with
//! `anyhow::Result`.

use thiserror::Error;

/// Domain-specific errors for the pulse trading system.
#[derive(Debug, Error)]
pub enum PulseError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// Socket bind, connect, accept, or send/recv error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed frame payload: wrong field count, non-numeric field,
    /// out-of-range value.
    #[error("parse error: {0}")]
    Parse(String),

    /// Shared memory creation, mapping, or access error.
    #[error("shm error: {0}")]
    Shm(String),

    /// Attach attempted before the region was created. Distinguished from
    /// [`PulseError::Shm`] so callers can retry the startup race.
    #[error("shm region '{0}' not found")]
    ShmNotFound(String),

    /// Subscription to a feed channel this client does not carry.
    #[error("invalid feed channel: {0}")]
    Channel(String),

    /// Order construction or submission error.
    #[error("trading error: {0}")]
    Trading(String),
}
