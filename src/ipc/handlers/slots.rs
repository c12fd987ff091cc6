use serde_json::json;

use crate::engine::{self, AssignRequest};
use crate::ipc::error::{engine_error_code, err, ok, HandlerErr};
use crate::ipc::helpers::{
    optional_str, require_i64, require_str, slot_json, slots_json, teacher_ref_json,
};
use crate::ipc::types::{AppState, Request};
use crate::store;

const BULK_ASSIGN_MAX_ITEMS: usize = 1000;

fn parse_assign_request(
    organisation_id: &str,
    params: &serde_json::Value,
) -> Result<AssignRequest, HandlerErr> {
    Ok(AssignRequest {
        organisation_id: organisation_id.to_string(),
        classroom_id: require_str(params, "classroomId")?,
        day: require_i64(params, "day")?,
        period: require_i64(params, "period")?,
        teacher_id: require_str(params, "teacherId")?,
        subject: require_str(params, "subject")?,
        multi_assign: params
            .get("multiAssign")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
    })
}

fn handle_slots_assign(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let organisation_id = match require_str(&req.params, "organisationId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let assign_req = match parse_assign_request(&organisation_id, &req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    match engine::assign(conn, &assign_req) {
        Ok(out) => ok(
            &req.id,
            json!({
                "slot": slot_json(&out.slot),
                "created": out.created,
                "neighbors": slots_json(&out.neighbors),
                "freeTeachers": out.free_teachers.iter().map(teacher_ref_json).collect::<Vec<_>>(),
            }),
        ),
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

fn handle_slots_unassign(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let organisation_id = match require_str(&req.params, "organisationId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let classroom_id = match require_str(&req.params, "classroomId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let day = match require_i64(&req.params, "day") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let period = match require_i64(&req.params, "period") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let teacher_id = optional_str(&req.params, "teacherId");

    match engine::unassign(
        conn,
        &organisation_id,
        &classroom_id,
        day,
        period,
        teacher_id.as_deref(),
    ) {
        Ok(out) => ok(
            &req.id,
            json!({
                "changed": out.changed,
                "removed": slots_json(&out.removed),
                "neighbors": slots_json(&out.neighbors),
            }),
        ),
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

fn handle_slots_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let organisation_id = match require_str(&req.params, "organisationId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let classroom_id = optional_str(&req.params, "classroomId");
    let teacher_id = optional_str(&req.params, "teacherId");

    let rows = match (classroom_id.as_deref(), teacher_id.as_deref()) {
        (Some(c), _) => store::slots_by_classroom(conn, &organisation_id, c),
        (None, Some(t)) => store::slots_by_teacher(conn, &organisation_id, t),
        (None, None) => store::slots_by_organisation(conn, &organisation_id),
    };

    match rows {
        Ok(slots) => ok(&req.id, json!({ "slots": slots_json(&slots) })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_slots_bulk_assign(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let organisation_id = match require_str(&req.params, "organisationId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let Some(items) = req.params.get("items").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing items[]", None);
    };
    if items.len() > BULK_ASSIGN_MAX_ITEMS {
        return err(
            &req.id,
            "bad_params",
            format!(
                "bulk payload exceeds max items: {} > {}",
                items.len(),
                BULK_ASSIGN_MAX_ITEMS
            ),
            None,
        );
    }

    // Each item is an independent unit of work: failures are reported in
    // place and never roll back earlier successes.
    let mut assigned: usize = 0;
    let mut results: Vec<serde_json::Value> = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let parsed = if item.is_object() {
            parse_assign_request(&organisation_id, item)
        } else {
            Err(HandlerErr {
                code: "bad_params",
                message: format!("item at index {} must be an object", i),
                details: None,
            })
        };

        let assign_req = match parsed {
            Ok(v) => v,
            Err(e) => {
                results.push(json!({
                    "index": i,
                    "ok": false,
                    "code": e.code,
                    "message": e.message,
                }));
                continue;
            }
        };

        match engine::assign(conn, &assign_req) {
            Ok(out) => {
                assigned += 1;
                results.push(json!({
                    "index": i,
                    "ok": true,
                    "slot": slot_json(&out.slot),
                    "created": out.created,
                }));
            }
            Err(e) => results.push(json!({
                "index": i,
                "ok": false,
                "code": engine_error_code(&e),
                "message": e.to_string(),
            })),
        }
    }

    let rejected = results.len() - assigned;
    ok(
        &req.id,
        json!({
            "assigned": assigned,
            "rejected": rejected,
            "results": results,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "slots.assign" => Some(handle_slots_assign(state, req)),
        "slots.unassign" => Some(handle_slots_unassign(state, req)),
        "slots.list" => Some(handle_slots_list(state, req)),
        "slots.bulkAssign" => Some(handle_slots_bulk_assign(state, req)),
        _ => None,
    }
}
