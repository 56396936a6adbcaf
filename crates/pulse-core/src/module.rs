//! Process-module trait driven by the runner.
//!
//! Each process role (gateway, mirror, strategy, router) is one [`Module`]:
//! `start` spawns its long-running tasks, `stop` tears them down. Only
//! `Send` is required (not `Sync`) because modules are accessed
//! sequentially by the runner, never concurrently.

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait Module: Send {
    /// Human-readable module name.
    fn name(&self) -> &str;
    /// Bring up sockets, shared memory, and worker tasks.
    async fn start(&mut self) -> Result<()>;
    /// Gracefully stop all connections and tasks. Idempotent.
    async fn stop(&mut self) -> Result<()>;
}
