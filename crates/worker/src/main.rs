use std::sync::Arc;

use anyhow::Context;
use locsync_core::SyncEngine;
use locsync_db::{PgStateStore, PgTargetRepository};
use locsync_source::LocationApi;
use locsync_worker::{jobs, WorkerConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "locsync_worker=debug,locsync_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env().context("loading worker configuration")?;

    let pool = locsync_db::create_pool(&config.database_url)
        .await
        .context("connecting to the database")?;
    locsync_db::health_check(&pool).await?;
    locsync_db::run_migrations(&pool)
        .await
        .context("running database migrations")?;
    tracing::info!("Database ready");

    let source = LocationApi::new(config.source.clone());
    let probe = source.test_connection().await;
    if probe.success {
        tracing::info!(detail = %probe.more, "{}", probe.message);
    } else {
        tracing::warn!(detail = %probe.more, "{}", probe.message);
    }

    if let Some(known) = &config.known_fields {
        let known: Vec<&str> = known.iter().map(String::as_str).collect();
        for problem in config.sync.field_map.validate(&known) {
            tracing::warn!("{problem}");
        }
    }

    let engine = Arc::new(SyncEngine::new(
        Arc::new(source),
        Arc::new(PgTargetRepository::new(pool.clone(), config.asset_dir.clone())),
        Arc::new(PgStateStore::new(pool)),
        config.sync.clone(),
    ));
    if let Some(size) = config.sweep_batch_size {
        engine.state().set_sweep_batch_size(size).await?;
    }
    let status = engine.status().await?;
    tracing::info!(
        imported = status.imported,
        failed = status.failed,
        remaining = status.remaining,
        next_import = %status.next_import,
        "Worker starting"
    );

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
        }
        shutdown.cancel();
    });

    jobs::run(engine, config.import_interval, config.sweep_interval, cancel).await;
    tracing::info!("Worker stopped");
    Ok(())
}
