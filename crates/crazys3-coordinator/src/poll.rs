//! Completion polling across workers.

use std::time::Duration;

use crazys3_worker::TaskStatus;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{CoordinatorError, Result};
use crate::handle::WorkerHandle;

/// Default time between polling rounds.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// How polling ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Every worker reported Finished.
    Done,
    /// The deadline passed first.
    TimedOut {
        /// Addresses of workers still running.
        unfinished: Vec<String>,
    },
    /// The cancellation token fired.
    Cancelled,
}

/// Outcome plus the last status each worker reported.
#[derive(Debug, Clone)]
pub struct PollReport {
    /// How polling ended.
    pub outcome: PollOutcome,
    /// Last status per worker, in worker order. `None` if never polled.
    pub statuses: Vec<Option<TaskStatus>>,
}

/// Polls every worker's `TaskStatus` until all are finished.
#[derive(Debug, Clone)]
pub struct CompletionPoller {
    interval: Duration,
    deadline: Option<Duration>,
}

impl Default for CompletionPoller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl CompletionPoller {
    /// Polls every `interval`, without deadline.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    /// Gives up after `deadline`.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Runs polling rounds until every worker is finished, the deadline
    /// passes or `cancel` fires. The first round starts immediately.
    pub async fn poll(
        &self,
        workers: &[WorkerHandle],
        cancel: &CancellationToken,
    ) -> Result<PollReport> {
        let started = Instant::now();
        let mut statuses: Vec<Option<TaskStatus>> = vec![None; workers.len()];
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Ok(PollReport { outcome: PollOutcome::Cancelled, statuses });
                }
                _ = ticker.tick() => {}
            }

            let mut finished = 0;
            for (worker, slot) in workers.iter().zip(statuses.iter_mut()) {
                let status = worker
                    .task_status()
                    .await
                    .map_err(|e| CoordinatorError::transport(worker.address(), e))?;
                if status.finished {
                    finished += 1;
                }
                *slot = Some(status);
            }
            info!("Running {}/{}", finished, workers.len());

            if finished == workers.len() {
                return Ok(PollReport {
                    outcome: PollOutcome::Done,
                    statuses,
                });
            }
            if let Some(deadline) = self.deadline {
                if started.elapsed() >= deadline {
                    let unfinished = workers
                        .iter()
                        .zip(statuses.iter())
                        .filter(|(_, s)| !s.map(|s| s.finished).unwrap_or(false))
                        .map(|(w, _)| w.address().to_string())
                        .collect();
                    return Ok(PollReport {
                        outcome: PollOutcome::TimedOut { unfinished },
                        statuses,
                    });
                }
            }
        }
    }
}
