//! Periodic monitoring jobs.
//!
//! Each job runs on its own tokio interval, so ticks of the same job never
//! overlap and a late tick is delayed rather than replayed in a burst. Every
//! run is bounded by the job's period and shielded from panics; a failed run
//! is logged, recorded as an ERROR event and the next tick proceeds.

use super::health::panic_message;
use super::{JobTimer, MonitoringService};
use crate::config::SchedulerConfig;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringJob {
    HealthCheck,
    PerformanceCheck,
    AlertingCheck,
    Cleanup,
}

impl MonitoringJob {
    pub const ALL: [MonitoringJob; 4] = [
        MonitoringJob::HealthCheck,
        MonitoringJob::PerformanceCheck,
        MonitoringJob::AlertingCheck,
        MonitoringJob::Cleanup,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MonitoringJob::HealthCheck => "health_check",
            MonitoringJob::PerformanceCheck => "performance_check",
            MonitoringJob::AlertingCheck => "alerting_check",
            MonitoringJob::Cleanup => "cleanup",
        }
    }

    /// Cleanup waits one full period; the checks run as soon as the
    /// scheduler starts.
    fn runs_on_start(&self) -> bool {
        !matches!(self, MonitoringJob::Cleanup)
    }
}

impl fmt::Display for MonitoringJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct JobStatistics {
    pub runs: u64,
    pub failures: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

type SharedStatistics = Arc<RwLock<HashMap<MonitoringJob, JobStatistics>>>;

pub struct MonitoringScheduler {
    service: Arc<MonitoringService>,
    intervals: HashMap<MonitoringJob, Duration>,
    statistics: SharedStatistics,
    shutdown_tx: Option<broadcast::Sender<()>>,
    handles: Vec<JoinHandle<()>>,
}

impl MonitoringScheduler {
    pub fn new(service: Arc<MonitoringService>, config: &SchedulerConfig) -> Self {
        let intervals = HashMap::from([
            (MonitoringJob::HealthCheck, config.health_interval()),
            (MonitoringJob::PerformanceCheck, config.performance_interval()),
            (MonitoringJob::AlertingCheck, config.alerting_interval()),
            (MonitoringJob::Cleanup, config.cleanup_interval()),
        ]);

        Self {
            service,
            intervals,
            statistics: Arc::new(RwLock::new(HashMap::new())),
            shutdown_tx: None,
            handles: Vec::new(),
        }
    }

    pub fn with_interval(mut self, job: MonitoringJob, period: Duration) -> Self {
        self.intervals.insert(job, period);
        self
    }

    pub fn interval(&self, job: MonitoringJob) -> Duration {
        self.intervals
            .get(&job)
            .copied()
            .unwrap_or(Duration::from_secs(60))
    }

    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }

    pub fn statistics(&self) -> HashMap<MonitoringJob, JobStatistics> {
        self.statistics.read().clone()
    }

    #[instrument(skip(self))]
    pub fn start(&mut self) -> anyhow::Result<()> {
        if self.is_running() {
            return Err(anyhow::anyhow!("Monitoring scheduler is already running"));
        }

        let (shutdown_tx, _) = broadcast::channel(1);
        for job in MonitoringJob::ALL {
            let period = self.interval(job);
            info!(job = %job, period_secs = period.as_secs_f64(), "Scheduling monitoring job");

            self.handles.push(tokio::spawn(job_loop(
                self.service.clone(),
                job,
                period,
                self.statistics.clone(),
                shutdown_tx.subscribe(),
            )));
        }
        self.shutdown_tx = Some(shutdown_tx);

        info!("Monitoring scheduler started");
        Ok(())
    }

    /// Run one job right now, outside the schedule
    #[instrument(skip(self))]
    pub async fn trigger(&self, job: MonitoringJob) -> Result<(), String> {
        execute(&self.service, job, self.interval(job), &self.statistics).await
    }

    /// Stop all loops and wait for in-flight runs to finish
    #[instrument(skip(self))]
    pub async fn shutdown(&mut self) {
        let Some(shutdown_tx) = self.shutdown_tx.take() else {
            return;
        };
        info!("Shutting down monitoring scheduler");
        let _ = shutdown_tx.send(());

        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!("Monitoring job task ended abnormally: {}", e);
            }
        }
        info!("Monitoring scheduler stopped");
    }
}

async fn job_loop(
    service: Arc<MonitoringService>,
    job: MonitoringJob,
    period: Duration,
    statistics: SharedStatistics,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let first_tick = if job.runs_on_start() {
        Instant::now()
    } else {
        Instant::now() + period
    };
    let mut ticker = tokio::time::interval_at(first_tick, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!(job = %job, "Shutdown signal received");
                break;
            }
            _ = ticker.tick() => {
                let _ = execute(&service, job, period, &statistics).await;
            }
        }
    }
}

async fn execute(
    service: &MonitoringService,
    job: MonitoringJob,
    period: Duration,
    statistics: &SharedStatistics,
) -> Result<(), String> {
    let _timer = JobTimer::new(service.metrics(), job.name());
    debug!(job = %job, "Running monitoring job");

    let result = run_guarded(period, run_job(service, job)).await;

    {
        let mut stats = statistics.write();
        let entry = stats.entry(job).or_default();
        entry.runs += 1;
        entry.last_run = Some(Utc::now());
        if let Err(message) = &result {
            entry.failures += 1;
            entry.last_error = Some(message.clone());
        }
    }

    if let Err(message) = &result {
        error!(job = %job, "Monitoring job failed: {}", message);
        service.record_job_failure(job.name(), message);
    }
    result
}

async fn run_job(service: &MonitoringService, job: MonitoringJob) -> anyhow::Result<()> {
    match job {
        MonitoringJob::HealthCheck => {
            service.perform_health_check().await;
        }
        MonitoringJob::PerformanceCheck => {
            service.perform_performance_check();
        }
        MonitoringJob::AlertingCheck => {
            service.perform_alerting_check();
        }
        MonitoringJob::Cleanup => {
            service.cleanup();
        }
    }
    Ok(())
}

/// Bound a job run by `limit`, converting errors and panics into a message
pub async fn run_guarded<F>(limit: Duration, run: F) -> Result<(), String>
where
    F: Future<Output = anyhow::Result<()>>,
{
    match tokio::time::timeout(limit, AssertUnwindSafe(run).catch_unwind()).await {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(e))) => Err(e.to_string()),
        Ok(Err(panic)) => Err(format!("panicked: {}", panic_message(panic.as_ref()))),
        Err(_) => Err(format!("timed out after {limit:?}")),
    }
}
