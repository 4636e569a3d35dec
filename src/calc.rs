use crate::model::TestResult;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Rounds half away from zero to 2 decimals, the report's display precision.
pub fn round_to_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub fn total_tested(data: &[TestResult]) -> i64 {
    data.iter().map(|r| r.num_tested()).sum()
}

pub fn total_tested_by_grade(data: &[TestResult], grade: i64) -> i64 {
    data.iter()
        .filter(|r| r.grade() == grade)
        .map(|r| r.num_tested())
        .sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AverageDetail {
    pub mean: Option<f64>,
    pub valid_count: usize,
    pub invalid_count: usize,
}

pub fn average_score_detail(data: &[TestResult], grade: i64, year: i64) -> AverageDetail {
    let mut sum = 0.0_f64;
    let mut valid_count = 0_usize;
    let mut invalid_count = 0_usize;

    for r in data {
        if r.grade() != grade || r.year() != year {
            continue;
        }
        match r.avg().value() {
            Some(v) => {
                sum += v;
                valid_count += 1;
            }
            None => invalid_count += 1,
        }
    }

    if invalid_count > 0 {
        tracing::debug!(grade, year, invalid_count, "skipped records with invalid averages");
    }

    AverageDetail {
        mean: if valid_count > 0 {
            Some(sum / valid_count as f64)
        } else {
            None
        },
        valid_count,
        invalid_count,
    }
}

impl AverageDetail {
    /// The mean, or `no_data` when no record for `grade`/`year` had a valid
    /// average.
    pub fn mean_or_no_data(&self, grade: i64, year: i64) -> Result<f64, CalcError> {
        self.mean.ok_or_else(|| {
            CalcError::new(
                "no_data",
                format!("no valid results for grade {} in {}", grade, year),
            )
            .with_details(serde_json::json!({
                "grade": grade,
                "year": year,
                "invalidCount": self.invalid_count,
            }))
        })
    }
}

/// Mean `avg` over records for one grade and year. Invalid averages are
/// skipped; no valid match is a `no_data` error.
#[allow(dead_code)]
pub fn average_score(data: &[TestResult], grade: i64, year: i64) -> Result<f64, CalcError> {
    average_score_detail(data, grade, year).mean_or_no_data(grade, year)
}

/// First record holding the maximum valid average.
pub fn find_highest_average(data: &[TestResult]) -> Result<&TestResult, CalcError> {
    let mut best: Option<(&TestResult, f64)> = None;
    for r in data {
        let Some(v) = r.avg().value() else {
            continue;
        };
        // Strict comparison keeps the earliest on ties.
        if best.map(|(_, b)| v > b).unwrap_or(true) {
            best = Some((r, v));
        }
    }
    best.map(|(r, _)| r).ok_or_else(|| {
        CalcError::new("no_data", "no results with a valid average").with_details(
            serde_json::json!({ "resultCount": data.len() }),
        )
    })
}

pub fn filter_above_threshold(data: &[TestResult], limit: f64) -> Vec<&TestResult> {
    data.iter()
        .filter(|r| r.avg().value().map(|v| v > limit).unwrap_or(false))
        .collect()
}
