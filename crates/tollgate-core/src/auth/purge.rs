use super::refresh_token::RefreshTokenStore;
use std::{sync::Arc, time::Duration};
use tokio::{sync::broadcast, time::interval};
use tracing::{error, info};

/// Periodically deletes refresh tokens past their retention window.
pub struct RefreshTokenPurger {
    store: Arc<RefreshTokenStore>,
    purge_interval: Duration,
}

impl RefreshTokenPurger {
    #[must_use]
    pub fn new(store: Arc<RefreshTokenStore>, purge_interval: Duration) -> Self {
        Self { store, purge_interval }
    }

    /// Spawns the purge loop. The first pass runs immediately.
    #[must_use]
    pub fn start_with_shutdown(
        &self,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        let store = self.store.clone();
        let purge_interval = self.purge_interval;

        tokio::spawn(async move {
            let mut interval = interval(purge_interval);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        Self::purge(&store).await;
                    }
                    _ = shutdown_rx.recv() => {
                        info!("refresh token purger shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// One purge pass. Returns the number of deleted rows; failures are logged.
    async fn purge(store: &RefreshTokenStore) -> u64 {
        match store.purge_expired().await {
            Ok(0) => 0,
            Ok(deleted) => {
                info!(deleted, "purged expired refresh tokens");
                deleted
            }
            Err(e) => {
                error!(error = %e, "refresh token purge failed");
                0
            }
        }
    }
}
