use crate::model::{LevelCounts, SchoolId, TestResult};
use anyhow::{anyhow, bail, Context};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;

pub struct LoadedDataset {
    pub results: Vec<TestResult>,
    pub skipped_rows: usize,
    pub sha256: String,
}

enum RowOutcome {
    Keep(TestResult),
    Skip(&'static str),
}

pub fn load_results_file(path: &Path) -> anyhow::Result<LoadedDataset> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
    let sha256 = format!("{:x}", Sha256::digest(&bytes));
    let mut loaded = parse_results_json(&bytes)?;
    loaded.sha256 = sha256;
    Ok(loaded)
}

/// True when loading failed because the file could not be read, as opposed to
/// its contents being malformed.
pub fn is_read_error(e: &anyhow::Error) -> bool {
    e.downcast_ref::<std::io::Error>().is_some()
}

pub fn parse_results_json(bytes: &[u8]) -> anyhow::Result<LoadedDataset> {
    let root: Value = serde_json::from_slice(bytes).context("data file is not valid JSON")?;
    let Some(rows) = root.as_array() else {
        bail!("data file must contain a JSON array of test results");
    };

    let mut results: Vec<TestResult> = Vec::with_capacity(rows.len());
    let mut skipped_rows = 0_usize;
    let mut seen: HashSet<(String, i64, i64)> = HashSet::new();

    for (idx, row) in rows.iter().enumerate() {
        let Some(obj) = row.as_object() else {
            bail!("row {}: expected an object", idx);
        };
        match parse_row(obj).map_err(|e| anyhow!("row {}: {}", idx, e))? {
            RowOutcome::Skip(reason) => {
                tracing::debug!(row = idx, reason, "skipped data row");
                skipped_rows += 1;
            }
            RowOutcome::Keep(r) => {
                let key = (r.id().as_str().to_string(), r.grade(), r.year());
                if !seen.insert(key) {
                    bail!(
                        "row {}: duplicate result for {} grade {} year {}",
                        idx,
                        r.id(),
                        r.grade(),
                        r.year()
                    );
                }
                results.push(r);
            }
        }
    }

    Ok(LoadedDataset {
        results,
        skipped_rows,
        sha256: String::new(),
    })
}

fn parse_row(obj: &Map<String, Value>) -> Result<RowOutcome, String> {
    // "All Grades" rollups duplicate the per-grade rows.
    if let Some(g) = obj.get("grade").and_then(|v| v.as_str()) {
        if g.trim().starts_with("All") {
            return Ok(RowOutcome::Skip("all_grades"));
        }
    }
    // Counts under 5 are published as "s".
    let count_keys = ["numTested", "level1", "level2", "level3", "level4"];
    if count_keys.iter().any(|k| is_suppressed(obj.get(*k))) {
        return Ok(RowOutcome::Skip("suppressed"));
    }

    let id_raw = obj
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| "missing id".to_string())?;
    let id = SchoolId::parse(id_raw)?;
    let name = obj
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| "missing name".to_string())?;

    let grade = int_field(obj, "grade")?;
    let year = int_field(obj, "year")?;
    let num_tested = int_field(obj, "numTested")?;
    let levels = LevelCounts {
        level1: int_field(obj, "level1")?,
        level2: int_field(obj, "level2")?,
        level3: int_field(obj, "level3")?,
        level4: int_field(obj, "level4")?,
    };

    TestResult::new(id, name.trim(), grade, year, num_tested, levels).map(RowOutcome::Keep)
}

fn is_suppressed(v: Option<&Value>) -> bool {
    v.and_then(|v| v.as_str())
        .map(|s| s.trim().eq_ignore_ascii_case("s"))
        .unwrap_or(false)
}

/// Integer field given as a JSON number or a numeric string.
fn int_field(obj: &Map<String, Value>, key: &str) -> Result<i64, String> {
    let Some(v) = obj.get(key) else {
        return Err(format!("missing {}", key));
    };
    let parsed = match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => {
            let t = s.trim();
            t.parse::<i64>().ok().or_else(|| {
                t.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && f.fract() == 0.0)
                    .map(|f| f as i64)
            })
        }
        _ => None,
    };
    parsed.ok_or_else(|| format!("{} must be an integer, got {}", key, v))
}
