//! Daily trigger
//!
//! Fires the pipeline on a cron cadence evaluated in UTC. Triggers are
//! fire-and-forget: outcomes are logged, never returned to the scheduler. A
//! trigger that arrives while a run is still going is skipped.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::pipeline::{AcquisitionPipeline, RunOutcome};

/// Accept 5-field cron by prepending a seconds field; pass 6 and 7 through.
pub fn normalize_cadence(expression: &str) -> Result<String> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    match fields.len() {
        5 => Ok(format!("0 {}", fields.join(" "))),
        6 | 7 => Ok(fields.join(" ")),
        n => anyhow::bail!(
            "Cron expression '{}' has {} fields, expected 5, 6 or 7",
            expression,
            n
        ),
    }
}

/// What a single trigger did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerResult {
    Completed(RunOutcome),
    Failed(String),
    /// A previous run still held the lock
    Skipped,
}

/// Runs the pipeline at most once at a time
pub struct ScheduledRunner {
    pipeline: Arc<AcquisitionPipeline>,
    lock: Mutex<()>,
}

impl ScheduledRunner {
    pub fn new(pipeline: Arc<AcquisitionPipeline>) -> Self {
        Self {
            pipeline,
            lock: Mutex::new(()),
        }
    }

    pub async fn trigger(&self) -> TriggerResult {
        let Ok(_running) = self.lock.try_lock() else {
            warn!("Previous run still in progress, skipping this trigger");
            return TriggerResult::Skipped;
        };

        info!("Scheduled task started");
        match self.pipeline.run().await {
            Ok(outcome) => TriggerResult::Completed(outcome),
            Err(e) => {
                error!(error = %e, "Scheduled run failed");
                TriggerResult::Failed(e.to_string())
            },
        }
    }
}

/// Cron-driven wrapper around [`ScheduledRunner`]
pub struct Scheduler {
    runner: Arc<ScheduledRunner>,
    cadence: String,
    run_on_start: bool,
}

impl Scheduler {
    pub fn new(pipeline: Arc<AcquisitionPipeline>, cadence: &str) -> Result<Self> {
        Ok(Self {
            runner: Arc::new(ScheduledRunner::new(pipeline)),
            cadence: normalize_cadence(cadence)?,
            run_on_start: false,
        })
    }

    /// Also run once as soon as the scheduler starts.
    pub fn run_on_start(mut self, enabled: bool) -> Self {
        self.run_on_start = enabled;
        self
    }

    pub fn cadence(&self) -> &str {
        &self.cadence
    }

    pub fn runner(&self) -> Arc<ScheduledRunner> {
        Arc::clone(&self.runner)
    }

    /// Register the job and start ticking. The returned scheduler must be
    /// kept alive and shut down by the caller.
    pub async fn start(self) -> Result<JobScheduler> {
        let sched = JobScheduler::new().await.context("creating scheduler")?;

        let runner = Arc::clone(&self.runner);
        let job = Job::new_async(self.cadence.as_str(), move |_uuid, _lock| {
            let runner = Arc::clone(&runner);
            Box::pin(async move {
                runner.trigger().await;
            })
        })
        .with_context(|| format!("creating scheduler job for cron {}", self.cadence))?;

        sched.add(job).await.context("adding scheduler job")?;
        sched.start().await.context("starting scheduler")?;
        info!(cadence = %self.cadence, "Scheduler started");

        if self.run_on_start {
            let runner = Arc::clone(&self.runner);
            tokio::spawn(async move {
                runner.trigger().await;
            });
        }

        Ok(sched)
    }
}
