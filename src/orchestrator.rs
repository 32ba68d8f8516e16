use crate::output::{distinct_locations, ScheduleSink};
use crate::parsers::Dispatcher;
use crate::registry::SiteRegistry;
use crate::types::SiteConfig;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

pub const MAX_WORKERS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub success: usize,
    pub failed: usize,
}

/// Drives a batch of per-site scrape jobs through a fixed-size worker pool.
/// One site's failure never aborts or delays the others.
pub struct Orchestrator {
    dispatcher: Arc<Dispatcher>,
    registry: Arc<dyn SiteRegistry>,
    sink: Arc<dyn ScheduleSink>,
    import_locations: bool,
}

impl Orchestrator {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        registry: Arc<dyn SiteRegistry>,
        sink: Arc<dyn ScheduleSink>,
    ) -> Self {
        Self {
            dispatcher,
            registry,
            sink,
            import_locations: false,
        }
    }

    pub fn with_location_import(mut self, enabled: bool) -> Self {
        self.import_locations = enabled;
        self
    }

    /// Run one job per site with `worker_count` workers (clamped to
    /// [1, 20]) draining a static queue. Returns the aggregate tally once
    /// every job has completed.
    pub async fn run(
        &self,
        sites: Vec<SiteConfig>,
        worker_count: usize,
        month: u32,
        year: i32,
    ) -> RunSummary {
        let total = sites.len();
        if total == 0 {
            return RunSummary {
                success: 0,
                failed: 0,
            };
        }
        let worker_count = worker_count.clamp(1, MAX_WORKERS).min(total);
        info!(sites = total, workers = worker_count, month, year, "starting scrape run");

        let (job_tx, job_rx) = mpsc::channel::<SiteConfig>(total);
        for site in sites {
            // Queue capacity equals the job count, so this never blocks.
            let _ = job_tx.send(site).await;
        }
        drop(job_tx);
        let job_rx = Arc::new(Mutex::new(job_rx));

        let (result_tx, mut result_rx) = mpsc::channel::<bool>(total);
        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let dispatcher = Arc::clone(&self.dispatcher);
            let registry = Arc::clone(&self.registry);
            let sink = Arc::clone(&self.sink);
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            let import_locations = self.import_locations;
            workers.push(tokio::spawn(async move {
                loop {
                    let site = { job_rx.lock().await.recv().await };
                    let Some(site) = site else {
                        debug!(worker_id, "job queue drained");
                        break;
                    };
                    let ok = process_site(
                        &dispatcher,
                        &registry,
                        &sink,
                        import_locations,
                        &site,
                        month,
                        year,
                    )
                    .await;
                    let _ = result_tx.send(ok).await;
                }
            }));
        }
        drop(result_tx);

        let mut summary = RunSummary {
            success: 0,
            failed: 0,
        };
        while let Some(ok) = result_rx.recv().await {
            if ok {
                summary.success += 1;
            } else {
                summary.failed += 1;
            }
        }
        for worker in workers {
            let _ = worker.await;
        }

        info!(
            success = summary.success,
            failed = summary.failed,
            "scrape run finished"
        );
        summary
    }
}

async fn process_site(
    dispatcher: &Dispatcher,
    registry: &Arc<dyn SiteRegistry>,
    sink: &Arc<dyn ScheduleSink>,
    import_locations: bool,
    site: &SiteConfig,
    month: u32,
    year: i32,
) -> bool {
    info!(site = %site.site_name, "scraping site");
    let rows = match dispatcher.execute(site, month, year).await {
        Ok(rows) => rows,
        Err(e) => {
            error!(site = %site.site_name, "scrape failed: {}", e);
            return false;
        }
    };

    if let Err(e) = sink.write(&rows).await {
        error!(site = %site.site_name, "failed to write output: {}", e);
        return false;
    }

    if import_locations {
        let locations = distinct_locations(&rows);
        if !locations.is_empty() {
            if let Err(e) = registry.record_locations(&site.site_name, &locations).await {
                warn!(site = %site.site_name, "location import failed: {}", e);
            }
        }
    }

    // A failed timestamp update is a warning, not a job failure.
    if let Err(e) = registry.update_last_scraped(site.id, Utc::now()).await {
        warn!(site = %site.site_name, "failed to record scrape completion: {}", e);
    }

    info!(site = %site.site_name, rows = rows.len(), "site scraped");
    true
}
