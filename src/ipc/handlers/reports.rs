use crate::ipc::error::{calc_err, err, ok};
use crate::ipc::handlers::settings::load_report_settings;
use crate::ipc::helpers::{db_conn, repository};
use crate::ipc::types::{AppState, Request};
use crate::report::{self, ReportSettings};
use serde_json::json;

/// Stored report settings with an optional per-request `settings` patch on top.
fn effective_settings(
    state: &AppState,
    req: &Request,
) -> Result<ReportSettings, serde_json::Value> {
    let conn = db_conn(state, req)?;
    let mut settings = load_report_settings(conn)
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    match req.params.get("settings") {
        None => {}
        Some(v) if v.is_null() => {}
        Some(v) => {
            let Some(patch) = v.as_object() else {
                return Err(err(&req.id, "bad_params", "settings must be an object", None));
            };
            settings
                .merge_patch(patch)
                .map_err(|msg| err(&req.id, "bad_params", msg, None))?;
        }
    }
    Ok(settings)
}

fn handle_reports_school_report(state: &mut AppState, req: &Request) -> serde_json::Value {
    let settings = match effective_settings(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let repo = match repository(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match report::build_school_report(repo, &settings) {
        Ok(model) => ok(&req.id, json!(model)),
        Err(e) => calc_err(&req.id, e),
    }
}

fn handle_reports_cohort_trend(state: &mut AppState, req: &Request) -> serde_json::Value {
    let settings = match effective_settings(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let repo = match repository(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let trend = report::cohort_trend(
        repo.results(),
        settings.cohort_start_grade,
        settings.cohort_start_year,
    );
    ok(
        &req.id,
        json!({
            "startGrade": settings.cohort_start_grade,
            "startYear": settings.cohort_start_year,
            "points": trend
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.schoolReport" => Some(handle_reports_school_report(state, req)),
        "reports.cohortTrend" => Some(handle_reports_cohort_trend(state, req)),
        _ => None,
    }
}
