//! Fire ticks on a cron schedule.

use crate::orchestrator::{Error, Trigger};
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{error, info, warn};

/// Source of wall-clock time.
pub type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Runs a tick immediately and then at every fire time of a cron schedule (with seconds) until
/// shutdown or a failed tick.
///
/// Fire times that pass while a tick is running are skipped.
pub struct Scheduler<T: Trigger + ?Sized> {
    trigger: Arc<T>,
    schedule: Schedule,
    clock: Clock,
}

impl<T: Trigger + ?Sized> Scheduler<T> {
    pub fn new(trigger: Arc<T>, schedule: Schedule) -> Self {
        Self::with_clock(trigger, schedule, Box::new(Utc::now))
    }

    pub fn with_clock(trigger: Arc<T>, schedule: Schedule, clock: Clock) -> Self {
        Self {
            trigger,
            schedule,
            clock,
        }
    }

    /// Returns the number of completed ticks once `shutdown` resolves.
    ///
    /// A failed tick stops the scheduler and is returned. A tick skipped because another one is
    /// running is logged and ignored. A tick in flight at shutdown is dropped, which abandons its
    /// pending retries.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<u64, Error> {
        tokio::pin!(shutdown);

        let mut completed = 0;
        let mut wait = Duration::ZERO;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(completed, "scheduler stopped");
                    return Ok(completed);
                }
                _ = tokio::time::sleep(wait) => {}
            }
            tokio::select! {
                _ = &mut shutdown => {
                    warn!(completed, "scheduler stopped during tick");
                    return Ok(completed);
                }
                result = self.trigger.trigger() => match result {
                    Ok(_) => completed += 1,
                    Err(Error::TickInProgress) => warn!("tick skipped: another tick is running"),
                    Err(err) => {
                        error!(error = ?err, "tick failed");
                        return Err(err);
                    }
                },
            }

            let now = (self.clock)();
            let Some(next) = self.schedule.after(&now).next() else {
                warn!(completed, "schedule has no upcoming fire times");
                (&mut shutdown).await;
                return Ok(completed);
            };
            info!(%next, "next tick scheduled");
            wait = (next - now).to_std().unwrap_or_default();
        }
    }
}
