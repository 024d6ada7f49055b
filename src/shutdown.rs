//! Wires external signals (Ctrl-C) and consumer-driven stop conditions
//! (`--stop-after`) into `Crawler::shutdown`, which is the single,
//! idempotent point where both converge.

use std::sync::Arc;

use tracing::warn;

use crate::crawler::Crawler;

/// A cheap, cloneable handle that just forwards to `Crawler::shutdown`.
/// Exists so callers outside `main` (the output writer, tests) don't need
/// to hold a full `Crawler` reference to trigger it.
#[derive(Clone)]
pub struct ShutdownHandle {
    crawler: Arc<Crawler>,
}

impl ShutdownHandle {
    pub fn new(crawler: Arc<Crawler>) -> Self {
        Self { crawler }
    }

    pub async fn trigger(&self) {
        self.crawler.shutdown().await;
    }
}

/// Spawns a task that waits for SIGINT/Ctrl-C and triggers shutdown. Fires
/// at most once; a second Ctrl-C while draining has no further effect here
/// (the spec leaves "close immediately" as an optional second-signal
/// behavior, which this crawler does not implement).
pub fn spawn_interrupt_listener(handle: ShutdownHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, shutting down");
            handle.trigger().await;
        }
    });
}
