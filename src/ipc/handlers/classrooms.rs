use serde_json::json;
use uuid::Uuid;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{require_str, string_array};
use crate::ipc::types::{AppState, Request};
use crate::store;

fn handle_classrooms_create(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let curriculum = match string_array(&req.params, "curriculum") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let classroom_id = Uuid::new_v4().to_string();
    let curriculum_json = json!(curriculum).to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO classrooms(id, organisation_id, name, curriculum) VALUES(?, ?, ?, ?)",
        (&classroom_id, &organisation_id, &name, &curriculum_json),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "classrooms" })),
        );
    }

    ok(
        &req.id,
        json!({
            "classroomId": classroom_id,
            "name": name,
            "curriculum": curriculum
        }),
    )
}

fn handle_classrooms_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "classrooms": [] }));
    };
    let organisation_id = match require_str(&req.params, "organisationId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    // Include the assigned-slot count so the UI can show a dashboard
    // without a per-classroom round trip.
    let mut stmt = match conn.prepare(
        "SELECT
           c.id,
           c.name,
           c.curriculum,
           (SELECT COUNT(*) FROM slots s
            WHERE s.organisation_id = c.organisation_id AND s.classroom_id = c.id) AS slot_count
         FROM classrooms c
         WHERE c.organisation_id = ?
         ORDER BY c.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&organisation_id], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let curriculum: String = row.get(2)?;
            let slot_count: i64 = row.get(3)?;
            Ok(json!({
                "id": id,
                "name": name,
                "curriculum": serde_json::from_str::<serde_json::Value>(&curriculum)
                    .unwrap_or_else(|_| json!([])),
                "slotCount": slot_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(classrooms) => ok(&req.id, json!({ "classrooms": classrooms })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_classrooms_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let classroom_id = match require_str(&req.params, "classroomId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    match store::get_classroom(conn, &classroom_id) {
        Ok(Some(c)) => ok(
            &req.id,
            json!({
                "id": c.id,
                "organisationId": c.organisation_id,
                "name": c.name,
                "curriculum": serde_json::from_str::<serde_json::Value>(&c.curriculum)
                    .unwrap_or_else(|_| json!([])),
            }),
        ),
        Ok(None) => err(
            &req.id,
            "not_found",
            "classroom not found",
            Some(json!({ "classroomId": classroom_id })),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classrooms.create" => Some(handle_classrooms_create(state, req)),
        "classrooms.list" => Some(handle_classrooms_list(state, req)),
        "classrooms.get" => Some(handle_classrooms_get(state, req)),
        _ => None,
    }
}
