use serde_json::json;

use crate::engine;
use crate::grid::{self, Occupant, SlotView};
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{optional_str, require_i64, require_str, slots_json, teacher_ref_json};
use crate::ipc::types::{AppState, Request};
use crate::store;

fn check_cell_params(day: i64, period: i64) -> Result<(), HandlerErr> {
    if !grid::day_in_range(day) {
        return Err(HandlerErr {
            code: "bad_params",
            message: format!("day must be in 0..=4, got {}", day),
            details: None,
        });
    }
    if !grid::period_in_range(period) {
        return Err(HandlerErr {
            code: "bad_params",
            message: format!("period must be in 0..=5, got {}", period),
            details: None,
        });
    }
    Ok(())
}

fn handle_classroom_grid(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
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

    let classroom_name = match store::get_classroom(conn, &classroom_id) {
        Ok(Some(c)) => c.name,
        Ok(None) => classroom_id.clone(),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = match store::slots_by_classroom(conn, &organisation_id, &classroom_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let views: Vec<SlotView> = rows
        .into_iter()
        .map(|s| SlotView {
            classroom_id: s.classroom_id,
            classroom_name: classroom_name.clone(),
            day: s.day,
            period: s.period,
            teacher_id: s.teacher_id,
            subject: s.subject,
        })
        .collect();

    // Free cells are empty lists here; the teacher view uses null instead.
    let matrix = grid::classroom_grid(&views);
    ok(
        &req.id,
        json!({
            "classroomId": classroom_id,
            "classroomName": classroom_name,
            "days": grid::DAYS,
            "periods": grid::PERIODS,
            "grid": matrix,
        }),
    )
}

fn handle_teacher_grid(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let organisation_id = match require_str(&req.params, "organisationId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let teacher_id = match require_str(&req.params, "teacherId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let profile = match store::get_teacher(conn, &teacher_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let views = match store::teacher_occupancy(conn, &organisation_id, &teacher_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let matrix = grid::teacher_grid(&views);

    let (name, subjects) = match profile {
        Some(t) => {
            let subjects = t
                .subjects()
                .map(serde_json::Value::from)
                .unwrap_or_else(|_| json!([]));
            (json!(t.name), subjects)
        }
        None => (serde_json::Value::Null, json!([])),
    };

    ok(
        &req.id,
        json!({
            "teacherId": teacher_id,
            "name": name,
            "subjects": subjects,
            "days": grid::DAYS,
            "periods": grid::PERIODS,
            "grid": matrix,
        }),
    )
}

fn handle_apply_cell_edit(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let Some(raw_occupants) = req.params.get("occupants") else {
        return err(&req.id, "bad_params", "missing occupants[]", None);
    };
    let desired: Vec<Occupant> = match serde_json::from_value(raw_occupants.clone()) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "bad_params",
                format!("occupants must be a list of {{teacherId, subject}}: {}", e),
                None,
            )
        }
    };

    match engine::apply_cell_edit(conn, &organisation_id, &classroom_id, day, period, &desired) {
        Ok(out) => ok(
            &req.id,
            json!({
                "assigned": out.assigned,
                "unassigned": out.unassigned,
                "occupants": slots_json(&out.occupants),
                "neighbors": slots_json(&out.neighbors),
            }),
        ),
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

fn handle_free_teachers(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let organisation_id = match require_str(&req.params, "organisationId") {
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
    if let Err(e) = check_cell_params(day, period) {
        return e.response(&req.id);
    }

    match store::free_teachers(conn, &organisation_id, day, period) {
        Ok(teachers) => ok(
            &req.id,
            json!({
                "day": day,
                "period": period,
                "teachers": teachers.iter().map(teacher_ref_json).collect::<Vec<_>>(),
            }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_is_teacher_free(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let organisation_id = match require_str(&req.params, "organisationId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let teacher_id = match require_str(&req.params, "teacherId") {
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
    if let Err(e) = check_cell_params(day, period) {
        return e.response(&req.id);
    }

    match store::is_teacher_free(conn, &organisation_id, &teacher_id, day, period) {
        Ok(free) => ok(&req.id, json!({ "free": free })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_recompute_workload(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let organisation_id = match require_str(&req.params, "organisationId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let classroom_id = optional_str(&req.params, "classroomId");

    match engine::recompute_workload(conn, &organisation_id, classroom_id.as_deref()) {
        Ok(updated) => ok(&req.id, json!({ "updated": updated })),
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schedule.classroomGrid" => Some(handle_classroom_grid(state, req)),
        "schedule.teacherGrid" => Some(handle_teacher_grid(state, req)),
        "schedule.applyCellEdit" => Some(handle_apply_cell_edit(state, req)),
        "schedule.freeTeachers" => Some(handle_free_teachers(state, req)),
        "schedule.isTeacherFree" => Some(handle_is_teacher_free(state, req)),
        "schedule.recomputeWorkload" => Some(handle_recompute_workload(state, req)),
        _ => None,
    }
}
