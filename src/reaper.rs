//! Expired file reclamation.
//!
//! The reaper alternates between two steps: SCAN removes every expired record
//! from the store and deletes the file behind it, SLEEP waits for the
//! configured interval. Per-file failures are logged and never retried.

use std::path::Path;
use std::sync::Arc;

use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use crate::datetime::Clock;
use crate::db::{Database, FileRecordRepository};
use crate::storage::remove_if_exists;
use crate::Result;

/// Outcome of one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapSummary {
    /// Records whose file was deleted.
    pub removed: usize,
    /// Records whose file was already gone.
    pub missing: usize,
    /// Records whose file could not be deleted.
    pub failed: usize,
}

impl ReapSummary {
    /// Total records taken out of the store.
    pub fn total(&self) -> usize {
        self.removed + self.missing + self.failed
    }
}

/// Background cleanup loop.
pub struct CleanupReaper {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl CleanupReaper {
    /// Create a reaper scanning every `interval`.
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            db,
            clock,
            interval,
        }
    }

    /// Run the SCAN/SLEEP loop. Never returns.
    pub async fn run(&self) {
        info!(
            "Cleanup reaper started (interval: {} seconds)",
            self.interval.as_secs()
        );

        loop {
            if let Err(e) = self.scan_once().await {
                error!("Failed to reap expired files: {}", e);
            }

            debug!("Sleeping {} seconds", self.interval.as_secs());
            sleep(self.interval).await;
        }
    }

    /// Reap every record expired at the current time and delete its file.
    pub async fn scan_once(&self) -> Result<ReapSummary> {
        let now = self.clock.now();
        let expired = FileRecordRepository::new(self.db.pool())
            .reap_expired(now)
            .await?;

        if expired.is_empty() {
            debug!("No expired files");
            return Ok(ReapSummary::default());
        }

        let mut summary = ReapSummary::default();
        for file in &expired {
            match remove_if_exists(Path::new(&file.stored_path)).await {
                Ok(true) => {
                    debug!(token = %file.token, path = %file.stored_path, "removed expired file");
                    summary.removed += 1;
                }
                Ok(false) => {
                    warn!(
                        token = %file.token,
                        path = %file.stored_path,
                        "expired file already missing"
                    );
                    summary.missing += 1;
                }
                Err(e) => {
                    error!(
                        token = %file.token,
                        path = %file.stored_path,
                        error = %e,
                        "failed to remove expired file"
                    );
                    summary.failed += 1;
                }
            }
        }

        info!(
            removed = summary.removed,
            missing = summary.missing,
            failed = summary.failed,
            "Reaped {} expired file(s)",
            summary.total()
        );
        Ok(summary)
    }
}
