use std::{path::Path, sync::Arc};

use sea_orm_migration::MigratorTrait;
use trainhq_agent::{
    agent::TrainingAgent,
    api::{self, AppState},
    archive::TarArchiver,
    artifacts::HttpArtifactDownloader,
    config::AgentConfig,
    device::SystemIdentity,
    hq_client::HqClient,
    logging,
    status_sync::StatusSyncEngine,
    store::SeaOrmJobStore,
    submission::SubmissionService,
    ticker::RefreshTicker,
};

/// SQLite will not create missing parent directories of its database file.
fn ensure_sqlite_dir(database_url: &str) -> std::io::Result<()> {
    let Some(rest) = database_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let file = rest.split('?').next().unwrap_or_default();
    match Path::new(file).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir),
        _ => Ok(()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AgentConfig::from_env()?;
    let _log_guard = logging::init_logging(config.log_dir.as_deref())?;

    ensure_sqlite_dir(&config.database_url)?;
    let db = trainhq_db::connect(&config.database_url).await?;

    // Apply migrations on boot (idempotent).
    trainhq_migration::Migrator::up(&db, None).await?;
    let db = Arc::new(db);

    std::fs::create_dir_all(&config.model_dir)?;
    std::fs::create_dir_all(&config.movie_dir)?;

    let store = Arc::new(SeaOrmJobStore::new(db));
    let hq = Arc::new(HqClient::new(&config)?);
    let downloader = Arc::new(HttpArtifactDownloader::new(
        &config.model_dir,
        &config.movie_dir,
        config.download_timeout,
    )?);
    let device = Arc::new(SystemIdentity::new(
        config.wlan.clone(),
        config.device_id_override.clone(),
    ));

    let submission = SubmissionService::new(
        store.clone(),
        Arc::new(TarArchiver::new(&config.carapp_path)),
        device,
        hq.clone(),
    );
    let sync = StatusSyncEngine::new(store.clone(), hq, downloader.clone());

    if let Some(period) = config.refresh_interval {
        RefreshTicker::new(sync.clone(), period).spawn();
    }

    let agent = TrainingAgent::new(store, submission, sync, downloader);
    let app = api::router(AppState { agent });

    tracing::info!(addr = %config.listen_addr, hq = %config.hq_base_url, "trainhq-agent HTTP listening");
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}
