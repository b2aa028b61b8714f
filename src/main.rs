use anyhow::Result;
use axum::Router;
use paper_pipeline::{config, db, routes, state::AppState};
use std::{fs, io::ErrorKind, path::Path, time::Duration};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

const MAX_DB_CONNECTIONS: u32 = 8;
const REAPER_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!(
        "Starting paper-pipeline on {} (storage {}, db {})",
        cfg.addr(),
        cfg.storage_dir,
        cfg.database_url
    );

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let db = db::connect(&cfg.database_url, MAX_DB_CONNECTIONS).await?;

    // --- Schema (statements are idempotent) ---
    db::migrate(&db).await?;
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Wire services ---
    let state = AppState::new(&cfg, db)?;

    // --- Expired lock / task-status reaper ---
    let coordination = state.coordination.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(REAPER_INTERVAL);
        loop {
            ticker.tick().await;
            match coordination.purge_expired().await {
                Ok(0) => {}
                Ok(n) => tracing::debug!("Purged {} expired coordination entries", n),
                Err(err) => tracing::warn!("Purging expired coordination entries: {}", err),
            }
        }
    });

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
