use crate::db;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::repo::TestResultRepository;
use rusqlite::Connection;
use serde_json::json;

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn required_i64(req: &Request, key: &str) -> Result<i64, serde_json::Value> {
    match req.params.get(key) {
        None => Err(err(&req.id, "bad_params", format!("missing {}", key), None)),
        Some(v) => v.as_i64().ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be an integer", key),
                Some(json!({ key: v })),
            )
        }),
    }
}

pub fn optional_i64(req: &Request, key: &str) -> Result<Option<i64>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(_) => required_i64(req, key).map(Some),
    }
}

pub fn required_f64(req: &Request, key: &str) -> Result<f64, serde_json::Value> {
    match req.params.get(key) {
        None => Err(err(&req.id, "bad_params", format!("missing {}", key), None)),
        Some(v) => v.as_f64().filter(|f| f.is_finite()).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be a number", key),
                Some(json!({ key: v })),
            )
        }),
    }
}

pub fn db_conn<'a>(
    state: &'a AppState,
    req: &Request,
) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

/// Returns the cached repository for `params.datasetId`, loading it from the
/// workspace on first use.
pub fn repository<'a>(
    state: &'a mut AppState,
    req: &Request,
) -> Result<&'a TestResultRepository, serde_json::Value> {
    let dataset_id = required_str(req, "datasetId")?;
    if !state.repos.contains_key(&dataset_id) {
        let conn = db_conn(state, req)?;
        let loaded = match db::load_repository(conn, &dataset_id) {
            Ok(Some(repo)) => repo,
            Ok(None) => {
                return Err(err(
                    &req.id,
                    "not_found",
                    "dataset not found",
                    Some(json!({ "datasetId": dataset_id })),
                ))
            }
            Err(e) => return Err(err(&req.id, "db_query_failed", e.to_string(), None)),
        };
        tracing::info!(dataset_id = %dataset_id, results = loaded.len(), "loaded dataset");
        state.repos.insert(dataset_id.clone(), loaded);
    }
    state
        .repos
        .get(&dataset_id)
        .ok_or_else(|| err(&req.id, "not_found", "dataset not found", None))
}
