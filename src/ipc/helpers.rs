use serde_json::json;

use crate::ipc::error::HandlerErr;
use crate::store::{SlotRow, TeacherRow};

pub fn require_str(params: &serde_json::Value, field: &str) -> Result<String, HandlerErr> {
    match params.get(field).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.to_string()),
        _ => Err(HandlerErr {
            code: "bad_params",
            message: format!("missing {}", field),
            details: None,
        }),
    }
}

pub fn optional_str(params: &serde_json::Value, field: &str) -> Option<String> {
    params
        .get(field)
        .and_then(|v| v.as_str())
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.to_string())
}

/// Day/period arrive as JSON numbers; anything non-integer is a bad
/// request here, range checks belong to the engine.
pub fn require_i64(params: &serde_json::Value, field: &str) -> Result<i64, HandlerErr> {
    match params.get(field).and_then(|v| v.as_i64()) {
        Some(v) => Ok(v),
        None => Err(HandlerErr {
            code: "bad_params",
            message: format!("missing/invalid {}", field),
            details: None,
        }),
    }
}

pub fn string_array(params: &serde_json::Value, field: &str) -> Result<Vec<String>, HandlerErr> {
    match params.get(field) {
        None => Ok(Vec::new()),
        Some(serde_json::Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item.as_str() {
                    Some(s) if !s.trim().is_empty() => out.push(s.to_string()),
                    _ => {
                        return Err(HandlerErr {
                            code: "bad_params",
                            message: format!("{} must be an array of non-empty strings", field),
                            details: None,
                        })
                    }
                }
            }
            Ok(out)
        }
        Some(_) => Err(HandlerErr {
            code: "bad_params",
            message: format!("{} must be an array", field),
            details: None,
        }),
    }
}

pub fn slot_json(slot: &SlotRow) -> serde_json::Value {
    json!({
        "organisationId": slot.organisation_id,
        "classroomId": slot.classroom_id,
        "day": slot.day,
        "period": slot.period,
        "teacherId": slot.teacher_id,
        "subject": slot.subject,
        "workload": slot.workload,
    })
}

pub fn slots_json(slots: &[SlotRow]) -> serde_json::Value {
    json!(slots.iter().map(slot_json).collect::<Vec<_>>())
}

pub fn teacher_ref_json(teacher: &TeacherRow) -> serde_json::Value {
    json!({
        "id": teacher.id,
        "name": teacher.name,
    })
}
