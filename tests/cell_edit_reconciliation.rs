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
    let exe = env!("CARGO_BIN_EXE_timetabled");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn timetabled");
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

fn assign(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    classroom: &str,
    day: i64,
    period: i64,
    teacher: &str,
    subject: &str,
) {
    let _ = request_ok(
        stdin,
        reader,
        id,
        "slots.assign",
        json!({
            "organisationId": "ORG1",
            "classroomId": classroom,
            "day": day,
            "period": period,
            "teacherId": teacher,
            "subject": subject
        }),
    );
}

#[test]
fn editing_one_classroom_cell_preserves_foreign_commitments() {
    let workspace = temp_dir("timetabled-cell-edit");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    // T-1 teaches classroom A and classroom B at the same (2, 3) cell.
    assign(&mut stdin, &mut reader, "2", "CSE-A", 2, 3, "T-1", "Maths");
    assign(&mut stdin, &mut reader, "3", "CSE-B", 2, 3, "T-1", "Maths");

    // Replace classroom B's occupant; classroom A must stay untouched.
    let edited = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "schedule.applyCellEdit",
        json!({
            "organisationId": "ORG1",
            "classroomId": "CSE-B",
            "day": 2,
            "period": 3,
            "occupants": [{ "teacherId": "T-2", "subject": "Art" }]
        }),
    );
    assert_eq!(edited["unassigned"], json!(1));
    assert_eq!(edited["assigned"], json!(1));
    let occupants = edited["occupants"].as_array().expect("occupants");
    assert_eq!(occupants.len(), 1);
    assert_eq!(occupants[0]["teacherId"], json!("T-2"));

    let teacher_view = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "schedule.teacherGrid",
        json!({ "organisationId": "ORG1", "teacherId": "T-1" }),
    );
    let cell = teacher_view["grid"][2][3].as_array().expect("cell");
    assert_eq!(cell.len(), 1);
    assert_eq!(cell[0]["classroomId"], json!("CSE-A"));
    assert_eq!(cell[0]["subject"], json!("Maths"));
}

#[test]
fn cell_edit_with_unchanged_occupant_changes_nothing() {
    let workspace = temp_dir("timetabled-cell-edit-noop");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    assign(&mut stdin, &mut reader, "2", "CSE-A", 1, 1, "T-1", "Maths");

    let edited = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "schedule.applyCellEdit",
        json!({
            "organisationId": "ORG1",
            "classroomId": "CSE-A",
            "day": 1,
            "period": 1,
            "occupants": [{ "teacherId": "T-1", "subject": "Maths" }]
        }),
    );
    assert_eq!(edited["assigned"], json!(0));
    assert_eq!(edited["unassigned"], json!(0));
}

#[test]
fn cell_edit_can_clear_and_multi_populate_a_cell() {
    let workspace = temp_dir("timetabled-cell-edit-multi");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    assign(&mut stdin, &mut reader, "2", "CSE-A", 0, 0, "T-1", "Maths");

    // An empty desired list clears the cell.
    let cleared = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "schedule.applyCellEdit",
        json!({
            "organisationId": "ORG1",
            "classroomId": "CSE-A",
            "day": 0,
            "period": 0,
            "occupants": []
        }),
    );
    assert_eq!(cleared["unassigned"], json!(1));
    assert!(cleared["occupants"].as_array().expect("occupants").is_empty());

    // Two desired occupants make the edit a parallel assignment.
    let doubled = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "schedule.applyCellEdit",
        json!({
            "organisationId": "ORG1",
            "classroomId": "CSE-A",
            "day": 0,
            "period": 0,
            "occupants": [
                { "teacherId": "T-2", "subject": "Art" },
                { "teacherId": "T-3", "subject": "Music" }
            ]
        }),
    );
    assert_eq!(doubled["assigned"], json!(2));
    assert_eq!(doubled["occupants"].as_array().expect("occupants").len(), 2);

    let malformed = request(
        &mut stdin,
        &mut reader,
        "5",
        "schedule.applyCellEdit",
        json!({
            "organisationId": "ORG1",
            "classroomId": "CSE-A",
            "day": 0,
            "period": 0,
            "occupants": [{ "teacherId": "T-4" }]
        }),
    );
    assert_eq!(
        malformed["error"]["code"].as_str().expect("code"),
        "bad_params"
    );
}
