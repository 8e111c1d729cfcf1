use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

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
    let exe = env!("CARGO_BIN_EXE_mentorbookd");
    let mut child = Command::new(exe)
        .env_remove("MENTORBOOKD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn mentorbookd");
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

fn assert_close(actual: &serde_json::Value, expected: f64) {
    let a = actual.as_f64().expect("number");
    assert!((a - expected).abs() < 1e-9, "expected {}, got {}", expected, a);
}

fn u(id: &str, name: &str, role: &str, reports_to: Option<&str>, sme_id: Option<&str>) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "role": role,
        "reportsTo": reports_to,
        "smeId": sme_id,
    })
}

/// CEO -> PM -> (Campus Manager -> Campus In-charge -> 3 mentors, SME assigned to all 3).
fn seed(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) {
    let users = json!([
        u("admin", "Asha Admin", "Admin", None, None),
        u("ceo", "Chitra", "CEO", None, None),
        u("pm1", "Pranav", "PM", Some("ceo"), None),
        u("sme1", "Sunil", "SME", Some("pm1"), None),
        u("cm1", "Kavya", "Campus Manager", Some("pm1"), None),
        u("ci1", "Imran", "Campus In-charge", Some("cm1"), None),
        u("m1", "Meera", "Mentor", Some("ci1"), Some("sme1")),
        u("m2", "Manoj", "Mentor", Some("ci1"), Some("sme1")),
        u("m3", "Mohan", "Mentor", Some("ci1"), Some("sme1")),
    ]);
    let subjects = json!([
        { "id": "math", "name": "Mathematics" },
        { "id": "sci", "name": "Science" },
    ]);
    let imported = request_ok(
        stdin,
        reader,
        "seed-dir",
        "directory.import",
        json!({ "users": users, "subjects": subjects }),
    );
    assert_eq!(imported["users"], json!(9));

    let scores = [("m1", "math", 90.0), ("m1", "sci", 70.0), ("m2", "math", 60.0)];
    for (i, (mentor, subject, score)) in scores.iter().enumerate() {
        request_ok(
            stdin,
            reader,
            &format!("seed-score-{}", i),
            "scores.create",
            json!({
                "mentorId": mentor,
                "subjectId": subject,
                "module": 1,
                "type": "Test",
                "assessmentNumber": i + 1,
                "score": score,
            }),
        );
    }

    let marks = [
        ("m1", "2024-03-01", "Present"),
        ("m1", "2024-03-02", "Absent"),
        ("m1", "2024-03-03", "Leave"),
        ("m2", "2024-03-01", "Present"),
        ("m3", "2024-03-01", "Not Applicable"),
    ];
    for (i, (mentor, date, status)) in marks.iter().enumerate() {
        request_ok(
            stdin,
            reader,
            &format!("seed-att-{}", i),
            "attendance.mark",
            json!({ "mentorId": mentor, "date": date, "status": status, "recordedBy": "ci1" }),
        );
    }
}

#[test]
fn rollups_follow_reports_tree_and_sme_assignment() {
    let workspace = temp_dir("mentorbook-rollup-scenario");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed(&mut stdin, &mut reader);

    let m1 = request_ok(&mut stdin, &mut reader, "2", "rollup.performance", json!({ "userId": "m1" }));
    assert_close(&m1["value"], 80.0);
    assert_eq!(m1["weight"], json!(1));

    let m3 = request_ok(&mut stdin, &mut reader, "3", "rollup.performance", json!({ "userId": "m3" }));
    assert_close(&m3["value"], 0.0);
    assert_eq!(m3["weight"], json!(0));

    // SME: plain mean over all assigned mentors, the score-less one included.
    let sme = request_ok(&mut stdin, &mut reader, "4", "rollup.performance", json!({ "userId": "sme1" }));
    assert_close(&sme["value"], 140.0 / 3.0);
    assert_eq!(sme["weight"], json!(3));

    let ci = request_ok(&mut stdin, &mut reader, "5", "rollup.performance", json!({ "userId": "ci1" }));
    assert_close(&ci["value"], 70.0);
    assert_eq!(ci["weight"], json!(2));

    // PM: (70 * 2 + 46.67 * 3) / 5
    let pm = request_ok(&mut stdin, &mut reader, "6", "rollup.performance", json!({ "userId": "pm1" }));
    assert_close(&pm["value"], 56.0);
    assert_eq!(pm["weight"], json!(5));

    let ceo = request_ok(&mut stdin, &mut reader, "7", "rollup.performance", json!({ "userId": "ceo" }));
    assert_close(&ceo["value"], 56.0);

    let ceo_math = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "rollup.performance",
        json!({ "userId": "ceo", "subjectId": "math" }),
    );
    assert_close(&ceo_math["value"], 60.0);
    assert_eq!(ceo_math["subjectId"], json!("math"));

    let all_spelled = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "rollup.performance",
        json!({ "userId": "ceo", "subjectId": "ALL" }),
    );
    assert_close(&all_spelled["value"], 56.0);

    // Leave and Not Applicable never enter the ratio.
    let m1_att = request_ok(&mut stdin, &mut reader, "10", "rollup.attendance", json!({ "userId": "m1" }));
    assert_close(&m1_att["value"], 50.0);
    let m3_att = request_ok(&mut stdin, &mut reader, "11", "rollup.attendance", json!({ "userId": "m3" }));
    assert_eq!(m3_att["weight"], json!(0));

    let sme_att = request_ok(&mut stdin, &mut reader, "12", "rollup.attendance", json!({ "userId": "sme1" }));
    assert_close(&sme_att["value"], 75.0);
    assert_eq!(sme_att["weight"], json!(2));

    let ceo_att = request_ok(&mut stdin, &mut reader, "13", "rollup.attendance", json!({ "userId": "ceo" }));
    assert_close(&ceo_att["value"], 75.0);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn dashboard_and_profile_views_use_rounded_rollups() {
    let workspace = temp_dir("mentorbook-dashboard-views");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed(&mut stdin, &mut reader);

    let ceo = request_ok(&mut stdin, &mut reader, "2", "dashboard.open", json!({ "viewerId": "ceo" }));
    assert_eq!(ceo["subjectId"], json!("All"));
    assert_close(&ceo["overallPerformance"], 56.0);
    assert_eq!(ceo["totalSubordinates"], json!(7));
    assert_eq!(ceo["mentorsInScope"], json!(3));
    let rows = ceo["rows"].as_array().expect("rows");
    assert!(rows.iter().all(|r| r["id"] != json!("ceo")));
    let levels: Vec<&str> = rows.iter().map(|r| r["role"].as_str().unwrap_or("")).collect();
    assert_eq!(levels.first().copied(), Some("PM"));
    assert_eq!(levels.last().copied(), Some("Mentor"));
    let sme_row = rows.iter().find(|r| r["id"] == json!("sme1")).expect("sme row");
    assert_close(&sme_row["score"], 46.67);
    assert_eq!(ceo["chart"].as_array().map(|c| c.len()), Some(1));

    let sme = request_ok(&mut stdin, &mut reader, "3", "dashboard.open", json!({ "viewerId": "sme1" }));
    assert_eq!(sme["totalSubordinates"], json!(0));
    let chart_ids: Vec<&str> = sme["chart"]
        .as_array()
        .expect("chart")
        .iter()
        .filter_map(|r| r["id"].as_str())
        .collect();
    assert_eq!(chart_ids, vec!["m1", "m2", "m3"]);

    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "setup.update",
        json!({ "section": "dashboard", "patch": { "defaultSubject": "math", "decimals": 0 } }),
    );
    let math = request_ok(&mut stdin, &mut reader, "5", "dashboard.open", json!({ "viewerId": "sme1" }));
    assert_eq!(math["subjectId"], json!("math"));
    assert_close(&math["overallPerformance"], 50.0);

    let profile = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "profile.open",
        json!({ "userId": "m1", "subjectId": "All" }),
    );
    assert_close(&profile["performance"], 80.0);
    assert_eq!(profile["scores"].as_array().map(|s| s.len()), Some(2));
    assert_eq!(profile["attendanceLog"].as_array().map(|s| s.len()), Some(3));
    let crumbs: Vec<&str> = profile["breadcrumbs"]
        .as_array()
        .expect("breadcrumbs")
        .iter()
        .filter_map(|b| b["id"].as_str())
        .collect();
    assert_eq!(crumbs, vec!["ceo", "pm1", "cm1", "ci1", "m1"]);

    let missing = request(&mut stdin, &mut reader, "7", "profile.open", json!({ "userId": "ghost" }));
    assert_eq!(missing["error"]["code"], json!("not_found"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn reports_cycle_is_reported_as_malformed_hierarchy() {
    let workspace = temp_dir("mentorbook-rollup-cycle");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "directory.import",
        json!({ "users": [
            u("pm1", "Pranav", "PM", Some("cm1"), None),
            u("cm1", "Kavya", "Campus Manager", Some("pm1"), None),
        ]}),
    );

    let resp = request(&mut stdin, &mut reader, "3", "rollup.performance", json!({ "userId": "pm1" }));
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(resp["error"]["code"], json!("malformed_hierarchy"));

    // Traversal helpers stop at the repeat instead of looping.
    let subs = request_ok(&mut stdin, &mut reader, "4", "hierarchy.subordinates", json!({ "userId": "pm1" }));
    assert_eq!(subs["users"].as_array().map(|u| u.len()), Some(1));

    drop(stdin);
    let _ = child.wait();
}
