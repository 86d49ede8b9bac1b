//! Periodic stale-job sweeper.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::service::ImportService;

/// Runs [`ImportService::sweep_stale_jobs`] on a fixed interval in a
/// background thread.
pub struct SweepScheduler {
    service: ImportService,
    interval: Duration,
    stale_threshold: Duration,
    batch_limit: u32,
    shutdown: Arc<AtomicBool>,
}

impl SweepScheduler {
    pub fn new(service: ImportService) -> Self {
        let config = Arc::clone(service.config());
        Self {
            service,
            interval: config.sweep_interval,
            stale_threshold: config.stale_threshold,
            batch_limit: config.sweep_batch_limit,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Starts the sweep loop. A message on `trigger_rx` runs a sweep
    /// immediately.
    pub fn start(
        &self,
        mut trigger_rx: broadcast::Receiver<()>,
    ) -> std::io::Result<JoinHandle<()>> {
        let service = self.service.clone();
        let shutdown = Arc::clone(&self.shutdown);
        let interval = self.interval;
        let stale_threshold = self.stale_threshold;
        let batch_limit = self.batch_limit;

        std::thread::Builder::new()
            .name("playscan-sweeper".into())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        log::error!("Failed to start sweeper runtime: {}", e);
                        return;
                    }
                };

                rt.block_on(async {
                    let mut interval_timer = tokio::time::interval(interval);
                    interval_timer.tick().await; // skip immediate first tick

                    loop {
                        if shutdown.load(Ordering::Acquire) {
                            break;
                        }

                        tokio::select! {
                            _ = interval_timer.tick() => {},
                            Ok(()) = trigger_rx.recv() => {
                                log::info!("Manual stale-job sweep triggered");
                            },
                        }

                        if shutdown.load(Ordering::Acquire) {
                            break;
                        }

                        match service.sweep_stale_jobs(stale_threshold, batch_limit).await {
                            Ok(report) if report.selected > 0 => {
                                log::info!(
                                    "Sweep: {} stale, {} succeeded, {} failed, {} skipped",
                                    report.selected,
                                    report.succeeded,
                                    report.failed,
                                    report.skipped
                                );
                            }
                            Err(e) => log::error!("Stale-job sweep failed: {}", e),
                            _ => {}
                        }
                    }
                });
            })
    }

    /// Signals the scheduler to stop after the current sweep.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}
