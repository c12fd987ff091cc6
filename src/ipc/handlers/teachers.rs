use serde_json::json;
use uuid::Uuid;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{require_str, string_array};
use crate::ipc::types::{AppState, Request};

fn handle_teachers_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let organisation_id = match require_str(&req.params, "organisationId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let name = match require_str(&req.params, "name") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e.response(&req.id),
    };
    let subjects = match string_array(&req.params, "subjects") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let teacher_id = Uuid::new_v4().to_string();
    let subjects_json = json!(subjects).to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO teachers(id, organisation_id, name, subjects) VALUES(?, ?, ?, ?)",
        (&teacher_id, &organisation_id, &name, &subjects_json),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "teachers" })),
        );
    }

    ok(
        &req.id,
        json!({
            "teacherId": teacher_id,
            "name": name,
            "subjects": subjects
        }),
    )
}

fn handle_teachers_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "teachers": [] }));
    };
    let organisation_id = match require_str(&req.params, "organisationId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let mut stmt = match conn.prepare(
        "SELECT
           t.id,
           t.name,
           t.subjects,
           (SELECT COUNT(*) FROM slots s
            WHERE s.organisation_id = t.organisation_id AND s.teacher_id = t.id) AS slot_count
         FROM teachers t
         WHERE t.organisation_id = ?
         ORDER BY t.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&organisation_id], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let subjects: String = row.get(2)?;
            let slot_count: i64 = row.get(3)?;
            Ok(json!({
                "id": id,
                "name": name,
                "subjects": serde_json::from_str::<serde_json::Value>(&subjects)
                    .unwrap_or_else(|_| json!([])),
                "slotCount": slot_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(teachers) => ok(&req.id, json!({ "teachers": teachers })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.create" => Some(handle_teachers_create(state, req)),
        "teachers.list" => Some(handle_teachers_list(state, req)),
        _ => None,
    }
}
