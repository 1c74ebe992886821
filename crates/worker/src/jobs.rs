//! Scheduler loop driving the import and deletion-sweep jobs.
//!
//! Both jobs share one loop so engine invocations never overlap. A failed
//! invocation is logged and retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use locsync_core::SyncEngine;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Run the import job every `import_every` and the sweep every
/// `sweep_every` until `cancel` is triggered. Both fire once immediately.
pub async fn run(
    engine: Arc<SyncEngine>,
    import_every: Duration,
    sweep_every: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        import_interval_secs = import_every.as_secs(),
        sweep_interval_secs = sweep_every.as_secs(),
        "Sync jobs started"
    );

    let mut import_tick = tokio::time::interval(import_every);
    import_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sweep_tick = tokio::time::interval(sweep_every);
    sweep_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Sync jobs stopping");
                break;
            }
            _ = import_tick.tick() => run_import(&engine).await,
            _ = sweep_tick.tick() => run_sweep(&engine).await,
        }
    }
}

async fn run_import(engine: &SyncEngine) {
    match engine.import_some().await {
        Ok(report) => tracing::info!(
            start = %report.start,
            end = %report.end,
            resumed = report.resumed,
            pages = report.pages,
            imported = report.imported,
            skipped = report.skipped,
            failed = report.failed,
            "Import run finished"
        ),
        Err(e) => tracing::error!(error = %e, "Import run failed, checkpoint kept for resume"),
    }
}

async fn run_sweep(engine: &SyncEngine) {
    match engine.sweep_deleted().await {
        Ok(report) if report.checked.is_empty() => tracing::debug!("Sweep found nothing to check"),
        Ok(report) => tracing::info!(
            checked = report.checked.len(),
            deleted = report.deleted.len(),
            errors = report.errors,
            next_first = ?report.next_first,
            "Sweep run finished"
        ),
        Err(e) => tracing::error!(error = %e, "Sweep run failed"),
    }
}
