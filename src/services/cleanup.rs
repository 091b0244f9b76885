use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::services::checkout::CheckoutState;
use crate::AppState;

/// What one eviction pass dropped from memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    pub checkouts: usize,
    pub selections: usize,
    pub suspended: usize,
    pub sessions: usize,
}

impl EvictionReport {
    pub fn total(&self) -> usize {
        self.checkouts + self.selections + self.suspended + self.sessions
    }
}

/// Periodic release of lapsed seat holds and eviction of idle state.
pub struct CleanupService {
    state: Arc<AppState>,
}

impl CleanupService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// One sweep: expired holds back to available, then lapsed seats dropped
    /// from idle selections. Returns the number of holds released.
    pub fn run_hold_sweep(&self) -> usize {
        let released = self.state.inventories.sweep_expired();

        let mut pruned = 0;
        for selection in self.state.selections.lock().values_mut() {
            pruned += selection.refresh().len();
        }

        if released > 0 || pruned > 0 {
            info!("🧹 Hold sweep released {} seats, pruned {} from selections", released, pruned);
        } else {
            debug!("Hold sweep found nothing to release");
        }
        released
    }

    /// Drops state nobody will come back for: checkouts idle longer than the
    /// retention window (unconfirmed ones are cancelled first), empty
    /// selections, stale parked logins and expired sessions.
    pub async fn run_eviction(&self) -> EvictionReport {
        let now = self.state.clock.now();
        let cutoff = now - ChronoDuration::seconds(self.state.config.holds.retention_secs);
        let mut report = EvictionReport::default();

        self.state.checkouts.lock().retain(|checkout_id, handle| {
            // A locked workflow is mid-request; look again next pass.
            let Ok(mut workflow) = handle.workflow.try_lock() else {
                return true;
            };
            if workflow.booking().updated_at() >= cutoff {
                return true;
            }
            let holds_seats = workflow.state() != CheckoutState::Confirmed && !workflow.selection().is_empty();
            if holds_seats && workflow.cancel().is_err() {
                return true;
            }
            debug!(checkout_id = %checkout_id, state = %workflow.state(), "evicting idle checkout");
            report.checkouts += 1;
            false
        });

        self.state.selections.lock().retain(|_, selection| {
            selection.refresh();
            let keep = !selection.is_empty();
            if !keep {
                report.selections += 1;
            }
            keep
        });

        report.suspended = self.state.auth.purge_suspended(cutoff);

        match self.state.sessions().purge_expired().await {
            Ok(purged) => report.sessions = purged,
            Err(e) => warn!("session purge failed: {}", e),
        }

        if report.total() > 0 {
            info!(
                checkouts = report.checkouts,
                selections = report.selections,
                suspended = report.suspended,
                sessions = report.sessions,
                "🧹 Evicted idle state"
            );
        }
        report
    }

    /// Runs the sweep and the eviction forever on the given interval.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.run_hold_sweep();
                self.run_eviction().await;
            }
        })
    }
}
