use crate::calc::{self, CalcError};
use crate::model::{TestResult, MAX_GRADE, MIN_GRADE};
use crate::repo::TestResultRepository;
use serde::Serialize;
use serde_json::{Map, Value};

pub const REPORT_SETTINGS_KEY: &str = "settings.report";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSettings {
    pub focus_grade: i64,
    pub cohort_start_grade: i64,
    pub cohort_start_year: i64,
    pub top_threshold: f64,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            focus_grade: 4,
            cohort_start_grade: 4,
            cohort_start_year: 2013,
            top_threshold: 3.9,
        }
    }
}

fn parse_grade(v: &Value, key: &str) -> Result<i64, String> {
    let Some(n) = v.as_i64() else {
        return Err(format!("{} must be an integer", key));
    };
    if !(MIN_GRADE..=MAX_GRADE).contains(&n) {
        return Err(format!("{} must be in {}..{}", key, MIN_GRADE, MAX_GRADE));
    }
    Ok(n)
}

impl ReportSettings {
    /// Applies a camelCase patch; unknown keys and bad values are rejected
    /// without touching `self`.
    pub fn merge_patch(&mut self, patch: &Map<String, Value>) -> Result<(), String> {
        let mut next = *self;
        for (k, v) in patch {
            match k.as_str() {
                "focusGrade" => next.focus_grade = parse_grade(v, k)?,
                "cohortStartGrade" => next.cohort_start_grade = parse_grade(v, k)?,
                "cohortStartYear" => {
                    let Some(n) = v.as_i64() else {
                        return Err("cohortStartYear must be an integer".to_string());
                    };
                    if !(1900..=2999).contains(&n) {
                        return Err("cohortStartYear is out of range".to_string());
                    }
                    next.cohort_start_year = n;
                }
                "topThreshold" => {
                    let Some(f) = v.as_f64() else {
                        return Err("topThreshold must be a number".to_string());
                    };
                    if !(0.0..=4.0).contains(&f) {
                        return Err("topThreshold must be in 0..4".to_string());
                    }
                    next.top_threshold = f;
                }
                _ => return Err(format!("unknown report setting: {}", k)),
            }
        }
        *self = next;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeTotal {
    pub grade: i64,
    pub total_tested: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortPoint {
    pub grade: i64,
    pub year: i64,
    pub average: Option<f64>,
    pub valid_count: usize,
    pub invalid_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopPerformer {
    pub rank: usize,
    pub id: String,
    pub name: String,
    pub average: f64,
    pub num_tested: i64,
    pub grade: i64,
    pub year: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolReport {
    pub dataset_id: String,
    pub settings: ReportSettings,
    pub result_count: usize,
    pub invalid_count: usize,
    pub total_tested: i64,
    pub focus_grade: GradeTotal,
    pub best_result: TestResult,
    pub cohort_trend: Vec<CohortPoint>,
    pub top_threshold: f64,
    pub top_performers: Vec<TopPerformer>,
}

/// Follows one cohort from its start grade up to grade 8, a year at a time.
pub fn cohort_trend(data: &[TestResult], start_grade: i64, start_year: i64) -> Vec<CohortPoint> {
    (start_grade..=MAX_GRADE)
        .map(|grade| {
            let year = start_year + (grade - start_grade);
            let detail = calc::average_score_detail(data, grade, year);
            CohortPoint {
                grade,
                year,
                average: detail.mean.map(calc::round_to_2_decimals),
                valid_count: detail.valid_count,
                invalid_count: detail.invalid_count,
            }
        })
        .collect()
}

pub fn build_school_report(
    repo: &TestResultRepository,
    settings: &ReportSettings,
) -> Result<SchoolReport, CalcError> {
    if repo.is_empty() {
        return Err(CalcError::new("no_data", "dataset has no test results"));
    }
    let data = repo.results();

    let best_result = calc::find_highest_average(data)?.clone();

    let top_performers = calc::filter_above_threshold(data, settings.top_threshold)
        .into_iter()
        .enumerate()
        .map(|(i, r)| TopPerformer {
            rank: i + 1,
            id: r.id().to_string(),
            name: r.name().to_string(),
            average: calc::round_to_2_decimals(r.avg().value().unwrap_or_default()),
            num_tested: r.num_tested(),
            grade: r.grade(),
            year: r.year(),
        })
        .collect();

    Ok(SchoolReport {
        dataset_id: repo.dataset_id().to_string(),
        settings: *settings,
        result_count: repo.len(),
        invalid_count: repo.invalid_count(),
        total_tested: calc::total_tested(data),
        focus_grade: GradeTotal {
            grade: settings.focus_grade,
            total_tested: calc::total_tested_by_grade(data, settings.focus_grade),
        },
        best_result,
        cohort_trend: cohort_trend(data, settings.cohort_start_grade, settings.cohort_start_year),
        top_threshold: settings.top_threshold,
        top_performers,
    })
}
