use crate::calc;
use crate::ipc::error::{calc_err, ok};
use crate::ipc::helpers::{repository, required_f64, required_i64};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_total_tested(state: &mut AppState, req: &Request) -> serde_json::Value {
    let repo = match repository(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    ok(
        &req.id,
        json!({ "totalTested": calc::total_tested(repo.results()) }),
    )
}

fn handle_total_tested_by_grade(state: &mut AppState, req: &Request) -> serde_json::Value {
    let grade = match required_i64(req, "grade") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let repo = match repository(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    ok(
        &req.id,
        json!({
            "grade": grade,
            "totalTested": calc::total_tested_by_grade(repo.results(), grade)
        }),
    )
}

fn handle_average_score(state: &mut AppState, req: &Request) -> serde_json::Value {
    let grade = match required_i64(req, "grade") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let year = match required_i64(req, "year") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let repo = match repository(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let detail = calc::average_score_detail(repo.results(), grade, year);
    match detail.mean_or_no_data(grade, year) {
        Ok(average) => ok(
            &req.id,
            json!({
                "grade": grade,
                "year": year,
                "average": average,
                "validCount": detail.valid_count,
                "invalidCount": detail.invalid_count
            }),
        ),
        Err(e) => calc_err(&req.id, e),
    }
}

fn handle_highest_average(state: &mut AppState, req: &Request) -> serde_json::Value {
    let repo = match repository(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match calc::find_highest_average(repo.results()) {
        Ok(best) => ok(&req.id, json!({ "result": best })),
        Err(e) => calc_err(&req.id, e),
    }
}

fn handle_above_threshold(state: &mut AppState, req: &Request) -> serde_json::Value {
    let limit = match required_f64(req, "limit") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let repo = match repository(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let results = calc::filter_above_threshold(repo.results(), limit);
    ok(
        &req.id,
        json!({
            "limit": limit,
            "count": results.len(),
            "results": results
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "calc.totalTested" => Some(handle_total_tested(state, req)),
        "calc.totalTestedByGrade" => Some(handle_total_tested_by_grade(state, req)),
        "calc.averageScore" => Some(handle_average_score(state, req)),
        "calc.highestAverage" => Some(handle_highest_average(state, req)),
        "calc.aboveThreshold" => Some(handle_above_threshold(state, req)),
        _ => None,
    }
}
