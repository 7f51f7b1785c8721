use anyhow::Result;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::SchedulerConfig;
use crate::cycle::CycleRunner;

/// Drives scrape cycles on a cron cadence. Each tick runs one full cycle;
/// cycles are independent and no failure carries over to the next tick.
pub struct CycleScheduler {
    scheduler: JobScheduler,
    runner: Arc<CycleRunner>,
    config: SchedulerConfig,
}

impl CycleScheduler {
    pub async fn new(runner: Arc<CycleRunner>, config: SchedulerConfig) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            scheduler,
            runner,
            config,
        })
    }

    pub async fn start(&mut self) -> Result<()> {
        let runner = Arc::clone(&self.runner);
        let schedule = self.config.cron_expression();
        let job = Job::new_async(schedule.as_str(), move |_uuid, _l| {
            let runner = Arc::clone(&runner);
            Box::pin(async move {
                match runner.run_cycle().await {
                    Ok(report) => info!(
                        recorded = report.recorded,
                        failed = report.failed,
                        notified = report.notifications_sent,
                        "scheduled cycle finished"
                    ),
                    Err(e) => error!("scheduled cycle aborted: {}", e),
                }
            })
        })?;

        self.scheduler.add(job).await?;
        self.scheduler.start().await?;
        info!(interval = %schedule, "cycle scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.scheduler.shutdown().await?;
        info!("cycle scheduler shutdown");
        Ok(())
    }
}
