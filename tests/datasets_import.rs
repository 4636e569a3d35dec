use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn fixture_path(rel: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(rel)
}

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_schoolreportd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schoolreportd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn request_err_code(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn open_workspace(prefix: &str) -> (PathBuf, Child, ChildStdin, BufReader<ChildStdout>) {
    let workspace = temp_dir(prefix);
    let (child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    (workspace, child, stdin, reader)
}

fn import_fixture(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    rel: &str,
) -> String {
    let res = request_ok(
        stdin,
        reader,
        "import",
        "datasets.import",
        json!({ "path": fixture_path(rel).to_string_lossy() }),
    );
    res.get("datasetId")
        .and_then(|v| v.as_str())
        .expect("datasetId")
        .to_string()
}

#[test]
fn import_reports_counts_and_is_idempotent() {
    let (_workspace, mut child, mut stdin, mut reader) = open_workspace("schoolreport-import");
    let path = fixture_path("fixtures/school-data/ela-sample.json");

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "datasets.import",
        json!({ "path": path.to_string_lossy() }),
    );
    assert_eq!(first["rowCount"], 8);
    assert_eq!(first["skippedRows"], 2);
    assert_eq!(first["invalidCount"], 1);
    assert_eq!(first["alreadyImported"], false);
    assert_eq!(first["sha256"].as_str().map(|s| s.len()), Some(64));

    let second = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "datasets.import",
        json!({ "path": path.to_string_lossy(), "name": "again" }),
    );
    assert_eq!(second["datasetId"], first["datasetId"]);
    assert_eq!(second["alreadyImported"], true);

    let list = request_ok(&mut stdin, &mut reader, "3", "datasets.list", json!({}));
    let datasets = list["datasets"].as_array().expect("datasets");
    assert_eq!(datasets.len(), 1);
    assert_eq!(datasets[0]["name"], "ela-sample");
    assert_eq!(datasets[0]["rowCount"], 8);
    assert!(datasets[0]["importedAt"].as_str().is_some());

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn import_rejects_missing_and_malformed_files() {
    let (_child_unused, mut bare_stdin, mut bare_reader) = spawn_sidecar();
    let code = request_err_code(
        &mut bare_stdin,
        &mut bare_reader,
        "0",
        "datasets.import",
        json!({ "path": fixture_path("fixtures/school-data/ela-sample.json").to_string_lossy() }),
    );
    assert_eq!(code, "no_workspace");
    drop(bare_stdin);

    let (workspace, mut child, mut stdin, mut reader) = open_workspace("schoolreport-import-bad");

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "1",
        "datasets.import",
        json!({ "path": workspace.join("missing.json").to_string_lossy() }),
    );
    assert_eq!(code, "not_found");

    let bad_row = workspace.join("bad-row.json");
    std::fs::write(
        &bad_row,
        json!([
            { "id": "13K009", "name": "A", "grade": 4, "year": 2016,
              "numTested": 4, "level1": 1, "level2": 1, "level3": 1, "level4": 1 },
            { "id": "13Z009", "name": "B", "grade": 4, "year": 2016,
              "numTested": 4, "level1": 1, "level2": 1, "level3": 1, "level4": 1 }
        ])
        .to_string(),
    )
    .expect("write bad-row.json");
    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "datasets.import",
        json!({ "path": bad_row.to_string_lossy() }),
    );
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "bad_data");
    assert!(resp["error"]["message"]
        .as_str()
        .unwrap_or("")
        .contains("row 1"));

    let not_json = workspace.join("not-json.json");
    std::fs::write(&not_json, "id,name\n13K009,A\n").expect("write not-json.json");
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "3",
        "datasets.import",
        json!({ "path": not_json.to_string_lossy() }),
    );
    assert_eq!(code, "bad_data");

    let code = request_err_code(&mut stdin, &mut reader, "4", "datasets.import", json!({}));
    assert_eq!(code, "bad_params");

    let list = request_ok(&mut stdin, &mut reader, "5", "datasets.list", json!({}));
    assert_eq!(list["datasets"].as_array().map(|a| a.len()), Some(0));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn datasets_survive_sidecar_restart_in_input_order() {
    let (workspace, mut child, mut stdin, mut reader) = open_workspace("schoolreport-restart");
    let dataset_id =
        import_fixture(&mut stdin, &mut reader, "fixtures/school-data/ela-sample.json");
    drop(stdin);
    let _ = child.wait();

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let total = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "calc.totalTested",
        json!({ "datasetId": dataset_id }),
    );
    assert_eq!(total["totalTested"], 317);

    let all = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "results.list",
        json!({ "datasetId": dataset_id }),
    );
    let keys: Vec<(String, i64, i64)> = all["results"]
        .as_array()
        .expect("results")
        .iter()
        .map(|r| {
            (
                r["id"].as_str().unwrap_or("").to_string(),
                r["grade"].as_i64().unwrap_or(0),
                r["year"].as_i64().unwrap_or(0),
            )
        })
        .collect();
    assert_eq!(
        keys,
        vec![
            ("13K009".to_string(), 4, 2016),
            ("01M015".to_string(), 4, 2013),
            ("13K009".to_string(), 4, 2013),
            ("01M015".to_string(), 5, 2014),
            ("02M111".to_string(), 6, 2015),
            ("75X721".to_string(), 7, 2016),
            ("31R080".to_string(), 8, 2017),
            ("27Q042".to_string(), 4, 2017),
        ]
    );
    let first = &all["results"][0];
    assert_eq!(first["district"], 13);
    assert_eq!(first["boro"], "Brooklyn");
    assert!((first["avg"].as_f64().expect("avg") - 2.7103).abs() < 1e-4);
    assert!(all["results"][4]["avg"].is_null());

    let brooklyn_grade4 = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "results.list",
        json!({ "datasetId": dataset_id, "boro": "K", "grade": 4 }),
    );
    assert_eq!(brooklyn_grade4["count"], 2);

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "5",
        "results.list",
        json!({ "datasetId": dataset_id, "boro": "Hoboken" }),
    );
    assert_eq!(code, "bad_params");

    drop(stdin);
    let _ = child.wait();
}
