use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::db_conn;
use crate::ipc::types::{AppState, Request};
use crate::report::{ReportSettings, REPORT_SETTINGS_KEY};
use rusqlite::Connection;
use serde_json::json;

/// Saved settings merged over defaults. A malformed saved value falls back to
/// the defaults rather than blocking reports.
pub fn load_report_settings(conn: &Connection) -> anyhow::Result<ReportSettings> {
    let mut current = ReportSettings::default();
    if let Some(saved) = db::settings_get_json(conn, REPORT_SETTINGS_KEY)? {
        if let Some(saved_obj) = saved.as_object() {
            if let Err(e) = current.merge_patch(saved_obj) {
                tracing::warn!(error = %e, "ignoring saved report settings");
                current = ReportSettings::default();
            }
        }
    }
    Ok(current)
}

fn handle_settings_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match load_report_settings(conn) {
        Ok(settings) => ok(&req.id, json!({ "report": settings })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_settings_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_report_settings(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = current.merge_patch(patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, REPORT_SETTINGS_KEY, &json!(current)) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "report": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "settings.get" => Some(handle_settings_get(state, req)),
        "settings.update" => Some(handle_settings_update(state, req)),
        _ => None,
    }
}
