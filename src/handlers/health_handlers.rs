//! Health & readiness handlers.
//!
//! - GET /healthz  -> liveness, no I/O
//! - GET /readyz   -> shared database, coordination tables and blob disk

use crate::{coordination::CoordinationStore, state::AppState};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::{collections::BTreeMap, path::Path};
use tokio::fs;
use uuid::Uuid;

const PROBE_PAYLOAD: &[u8] = b"readyz";

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    checks: BTreeMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl CheckStatus {
    fn from_result(result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self { ok: true, error: None },
            Err(error) => Self {
                ok: false,
                error: Some(error),
            },
        }
    }
}

/// `GET /healthz`
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// `GET /readyz`
///
/// 200 when every check passes, 503 otherwise. The body lists each check.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let mut checks = BTreeMap::new();
    checks.insert(
        "sqlite",
        CheckStatus::from_result(check_database(&state).await),
    );
    checks.insert(
        "coordination",
        CheckStatus::from_result(check_coordination(state.coordination.as_ref()).await),
    );
    checks.insert(
        "disk",
        CheckStatus::from_result(check_disk(&state.blobs.base_path).await),
    );

    let ready = checks.values().all(|check| check.ok);
    let status = if ready {
        StatusCode::OK
    } else {
        tracing::warn!("readiness check failed");
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ReadyResponse {
            status: if ready { "ok" } else { "error" },
            checks,
        }),
    )
}

async fn check_database(state: &AppState) -> Result<(), String> {
    match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&state.db)
        .await
    {
        Ok(1) => Ok(()),
        Ok(v) => Err(format!("unexpected result: {}", v)),
        Err(e) => Err(format!("error: {}", e)),
    }
}

/// Locks, permits and task statuses all live in these tables.
async fn check_coordination(store: &dyn CoordinationStore) -> Result<(), String> {
    store
        .counter("readyz")
        .await
        .map(|_| ())
        .map_err(|e| format!("error: {}", e))
}

/// Write, read back and delete a probe file under the blob directory.
async fn check_disk(base_path: &Path) -> Result<(), String> {
    fs::create_dir_all(base_path)
        .await
        .map_err(|e| format!("could not create {}: {}", base_path.display(), e))?;

    let probe = base_path.join(format!(".readyz-{}", Uuid::new_v4()));
    fs::write(&probe, PROBE_PAYLOAD)
        .await
        .map_err(|e| format!("could not write probe: {}", e))?;

    let read_back = fs::read(&probe).await;
    let _ = fs::remove_file(&probe).await; // best-effort cleanup
    match read_back {
        Ok(bytes) if bytes == PROBE_PAYLOAD => Ok(()),
        Ok(_) => Err("probe content mismatch".to_string()),
        Err(e) => Err(format!("could not read probe: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disk_probe_creates_missing_directory_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("blobs");

        check_disk(&base).await.unwrap();

        let mut entries = fs::read_dir(&base).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }
}
