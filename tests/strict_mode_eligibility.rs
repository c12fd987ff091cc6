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

fn error_of(value: &serde_json::Value) -> (String, String) {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    let error = value.get("error").expect("error object");
    (
        error["code"].as_str().expect("code").to_string(),
        error["message"].as_str().expect("message").to_string(),
    )
}

#[test]
fn strict_mode_enforces_curriculum_and_teacher_subjects() {
    let workspace = temp_dir("timetabled-strict-mode");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    // Default mode is permissive.
    let config = request_ok(&mut stdin, &mut reader, "2", "config.get", json!({}));
    assert_eq!(config["validationMode"], json!("permissive"));

    let classroom = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "classrooms.create",
        json!({
            "organisationId": "ORG1",
            "name": "CSE-A",
            "curriculum": ["Maths", "Chemistry"]
        }),
    );
    let classroom_id = classroom["classroomId"].as_str().expect("classroomId").to_string();

    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "teachers.create",
        json!({
            "organisationId": "ORG1",
            "name": "T-2",
            "subjects": ["Chemistry"]
        }),
    );
    let teacher_id = teacher["teacherId"].as_str().expect("teacherId").to_string();

    let set = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "config.setValidationMode",
        json!({ "mode": "strict" }),
    );
    assert_eq!(set["validationMode"], json!("strict"));

    // The teacher does not teach Maths.
    let refused = request(
        &mut stdin,
        &mut reader,
        "6",
        "slots.assign",
        json!({
            "organisationId": "ORG1",
            "classroomId": classroom_id,
            "day": 0,
            "period": 0,
            "teacherId": teacher_id,
            "subject": "Maths"
        }),
    );
    let (code, message) = error_of(&refused);
    assert_eq!(code, "not_eligible");
    assert!(message.contains("T-2"), "message should name the teacher: {}", message);

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "slots.list",
        json!({ "organisationId": "ORG1" }),
    );
    assert!(listed["slots"].as_array().expect("slots").is_empty());

    // A subject outside the classroom curriculum is refused too.
    let off_curriculum = request(
        &mut stdin,
        &mut reader,
        "8",
        "slots.assign",
        json!({
            "organisationId": "ORG1",
            "classroomId": classroom_id,
            "day": 0,
            "period": 0,
            "teacherId": teacher_id,
            "subject": "History"
        }),
    );
    assert_eq!(error_of(&off_curriculum).0, "not_eligible");

    // Unknown ids become not_found under strict mode.
    let unknown_teacher = request(
        &mut stdin,
        &mut reader,
        "9",
        "slots.assign",
        json!({
            "organisationId": "ORG1",
            "classroomId": classroom_id,
            "day": 0,
            "period": 0,
            "teacherId": "nobody",
            "subject": "Chemistry"
        }),
    );
    assert_eq!(error_of(&unknown_teacher).0, "not_found");

    let unknown_classroom = request(
        &mut stdin,
        &mut reader,
        "10",
        "slots.assign",
        json!({
            "organisationId": "ORG1",
            "classroomId": "nowhere",
            "day": 0,
            "period": 0,
            "teacherId": teacher_id,
            "subject": "Chemistry"
        }),
    );
    assert_eq!(error_of(&unknown_classroom).0, "not_found");

    // An eligible combination goes through.
    let accepted = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "slots.assign",
        json!({
            "organisationId": "ORG1",
            "classroomId": classroom_id,
            "day": 0,
            "period": 0,
            "teacherId": teacher_id,
            "subject": "Chemistry"
        }),
    );
    assert_eq!(accepted["created"], json!(true));
}

#[test]
fn permissive_mode_accepts_client_chosen_values_as_is() {
    let workspace = temp_dir("timetabled-permissive-mode");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    // No classroom or teacher records exist; permissive mode trusts the
    // caller's ids entirely.
    let accepted = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "slots.assign",
        json!({
            "organisationId": "ORG1",
            "classroomId": "made-up-room",
            "day": 2,
            "period": 3,
            "teacherId": "made-up-teacher",
            "subject": "Interpretive Dance"
        }),
    );
    assert_eq!(accepted["created"], json!(true));
}

#[test]
fn unrecognized_validation_mode_is_rejected() {
    let workspace = temp_dir("timetabled-bad-mode");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "config.setValidationMode",
        json!({ "mode": "lenient" }),
    );
    assert_eq!(error_of(&resp).0, "bad_params");
}
