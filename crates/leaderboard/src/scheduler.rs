use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// A periodic trigger. Each tick sends `()` to the worker listening on `tick`.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub name: String,
    pub interval: Duration,
    /// Fire once at start instead of waiting a full interval.
    pub run_immediately: bool,
    pub tick: mpsc::Sender<()>,
}

impl JobSpec {
    fn first_tick(&self) -> Instant {
        if self.run_immediately {
            Instant::now()
        } else {
            Instant::now() + self.interval
        }
    }
}

/// Spawn one ticker task per job. A ticker exits once its worker hangs up.
/// Ticks that fall behind a slow worker are skipped, not queued.
pub fn start(jobs: Vec<JobSpec>) -> Vec<JoinHandle<()>> {
    jobs.into_iter()
        .map(|job| {
            tokio::spawn(async move {
                let mut interval = tokio::time::interval_at(job.first_tick(), job.interval);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    interval.tick().await;
                    tracing::debug!(job = %job.name, "job tick");
                    if job.tick.send(()).await.is_err() {
                        tracing::debug!(job = %job.name, "job worker gone, stopping ticker");
                        break;
                    }
                }
            })
        })
        .collect()
}
