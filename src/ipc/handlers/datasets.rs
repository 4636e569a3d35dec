use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, optional_i64, repository, required_str};
use crate::ipc::types::{AppState, Request};
use crate::loader;
use crate::model::Boro;
use serde_json::json;
use std::path::PathBuf;

fn handle_datasets_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let path = match required_str(req, "path") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e,
    };
    if !path.is_file() {
        return err(
            &req.id,
            "not_found",
            "data file not found",
            Some(json!({ "path": path.to_string_lossy() })),
        );
    }

    let loaded = match loader::load_results_file(&path) {
        Ok(v) => v,
        Err(e) => {
            let code = if loader::is_read_error(&e) {
                "io_failed"
            } else {
                "bad_data"
            };
            return err(
                &req.id,
                code,
                format!("{e:#}"),
                Some(json!({ "path": path.to_string_lossy() })),
            )
        }
    };

    match db::find_dataset_by_sha256(conn, &loaded.sha256) {
        Ok(Some(existing)) => {
            return ok(
                &req.id,
                json!({
                    "datasetId": existing.id,
                    "rowCount": existing.row_count,
                    "skippedRows": existing.skipped_rows,
                    "invalidCount": existing.invalid_count,
                    "sha256": existing.sha256,
                    "alreadyImported": true
                }),
            )
        }
        Ok(None) => {}
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let name = req
        .params
        .get("name")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| "dataset".to_string());

    let row = match db::insert_dataset(conn, &name, &path, &loaded) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };
    tracing::info!(
        dataset_id = %row.id,
        rows = row.row_count,
        skipped = row.skipped_rows,
        invalid = row.invalid_count,
        "imported dataset"
    );

    ok(
        &req.id,
        json!({
            "datasetId": row.id,
            "rowCount": row.row_count,
            "skippedRows": row.skipped_rows,
            "invalidCount": row.invalid_count,
            "sha256": row.sha256,
            "alreadyImported": false
        }),
    )
}

fn handle_datasets_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "datasets": [] }));
    };
    match db::list_datasets(conn) {
        Ok(datasets) => ok(&req.id, json!({ "datasets": datasets })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_results_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let grade = match optional_i64(req, "grade") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let year = match optional_i64(req, "year") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let district = match optional_i64(req, "district") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let boro = match req.params.get("boro") {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => match v.as_str().and_then(Boro::parse) {
            Some(b) => Some(b),
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "boro must be a borough name or code",
                    Some(json!({ "boro": v })),
                )
            }
        },
    };
    let repo = match repository(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let results: Vec<_> = repo
        .results()
        .iter()
        .filter(|r| grade.map(|g| r.grade() == g).unwrap_or(true))
        .filter(|r| year.map(|y| r.year() == y).unwrap_or(true))
        .filter(|r| district.map(|d| i64::from(r.district()) == d).unwrap_or(true))
        .filter(|r| boro.map(|b| r.boro() == b).unwrap_or(true))
        .collect();
    ok(
        &req.id,
        json!({ "count": results.len(), "results": results }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "datasets.import" => Some(handle_datasets_import(state, req)),
        "datasets.list" => Some(handle_datasets_list(state, req)),
        "results.list" => Some(handle_results_list(state, req)),
        _ => None,
    }
}
