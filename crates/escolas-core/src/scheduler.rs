//! Daily refresh scheduling.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::refresh::{RefreshOutcome, RefreshService};

/// 6-field cron expression (sec min hour day month weekday): midnight,
/// every day.
pub const DAILY_SCHEDULE: &str = "0 0 0 * * *";
pub const SCHEDULE_DESCRIPTION: &str = "00:00 (diário)";
const TIMEZONE: Tz = chrono_tz::America::Sao_Paulo;

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub enabled: bool,
    pub running: bool,
    #[serde(rename = "lastRun")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(rename = "nextRun")]
    pub next_run: Option<DateTime<Utc>>,
    pub schedule: String,
}

pub struct DailyScheduler {
    scheduler: Option<JobScheduler>,
    refresh: Arc<RefreshService>,
    enabled: bool,
}

impl DailyScheduler {
    pub fn new(refresh: Arc<RefreshService>, enabled: bool) -> Self {
        Self {
            scheduler: None,
            refresh,
            enabled,
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        if !self.enabled {
            info!("daily refresh disabled");
            return Ok(());
        }

        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| anyhow!("Failed to create JobScheduler: {}", e))?;

        let refresh = self.refresh.clone();
        let job = Job::new_async_tz(DAILY_SCHEDULE, TIMEZONE, move |_uuid, _l| {
            let refresh = refresh.clone();
            Box::pin(async move {
                info!("daily refresh triggered");
                match refresh.run().await {
                    Ok(RefreshOutcome::Completed { total_schools, .. }) => {
                        info!(total_schools, "daily refresh complete");
                    }
                    Ok(RefreshOutcome::Skipped) => {
                        info!("daily refresh skipped, a run was already active");
                    }
                    Err(error) => {
                        // The previous dataset stays in service; the next
                        // scheduled run is the retry.
                        error!(%error, "daily refresh failed");
                    }
                }
            })
        })
        .map_err(|e| anyhow!("Failed to create daily job: {}", e))?;

        scheduler
            .add(job)
            .await
            .map_err(|e| anyhow!("Failed to add job to scheduler: {}", e))?;
        scheduler
            .start()
            .await
            .map_err(|e| anyhow!("Failed to start scheduler: {}", e))?;

        self.scheduler = Some(scheduler);
        info!(schedule = DAILY_SCHEDULE, timezone = %TIMEZONE, "daily scheduler started");
        Ok(())
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            enabled: self.enabled,
            running: self.refresh.is_running(),
            last_run: self.refresh.last_run(),
            next_run: if self.enabled {
                next_run_after(Utc::now())
            } else {
                None
            },
            schedule: SCHEDULE_DESCRIPTION.to_string(),
        }
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler
                .shutdown()
                .await
                .map_err(|e| anyhow!("Failed to shutdown scheduler: {}", e))?;
            info!("daily scheduler stopped");
        }
        Ok(())
    }
}

/// The next São Paulo midnight strictly after `now`.
pub fn next_run_after(now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let local = now.with_timezone(&TIMEZONE);
    let next_day = local.date_naive().succ_opt()?;
    TIMEZONE
        .from_local_datetime(&next_day.and_time(NaiveTime::MIN))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
