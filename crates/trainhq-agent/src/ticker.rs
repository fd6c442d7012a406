use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;

use crate::status_sync::StatusSyncEngine;

/// Runs a status refresh on a fixed period.
#[derive(Clone)]
pub struct RefreshTicker {
    engine: Arc<StatusSyncEngine>,
    period: Duration,
}

impl RefreshTicker {
    pub fn new(engine: Arc<StatusSyncEngine>, period: Duration) -> Self {
        Self { engine, period }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tracing::info!(period_ms = self.period.as_millis() as u64, "status refresh ticker started");
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(self.period).await;
                self.tick().await;
            }
        })
    }

    async fn tick(&self) {
        match self.engine.refresh_all().await {
            Ok(0) => {}
            Ok(changed) => tracing::debug!(changed, "periodic refresh applied updates"),
            Err(err) => tracing::warn!(%err, "periodic status refresh failed"),
        }
    }
}
