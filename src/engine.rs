use chrono::Utc;
use rusqlite::Connection;
use thiserror::Error;
use tracing::debug;

use crate::db;
use crate::grid::{self, Occupant, WORKLOAD_ACTIVE};
use crate::store::{self, SlotRow, TeacherRow};

/// Engine failures map one-to-one onto wire error codes; handlers never
/// need to inspect the message to pick a code.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Eligibility(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("storage failure: {0}")]
    Dependency(String),
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::Dependency(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    Strict,
    Permissive,
}

impl ValidationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationMode::Strict => "strict",
            ValidationMode::Permissive => "permissive",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "strict" => Some(ValidationMode::Strict),
            "permissive" => Some(ValidationMode::Permissive),
            _ => None,
        }
    }
}

const VALIDATION_MODE_KEY: &str = "schedule.validation_mode";

/// Permissive is the default: eligibility filtering started life as a
/// UI-side concern and strict server-side checks are opt-in.
pub fn validation_mode(conn: &Connection) -> Result<ValidationMode, EngineError> {
    let raw = db::settings_get_json(conn, VALIDATION_MODE_KEY)
        .map_err(|e| EngineError::Dependency(e.to_string()))?;
    match raw.as_ref().and_then(|v| v.as_str()) {
        Some(s) => ValidationMode::parse(s).ok_or_else(|| {
            EngineError::Dependency(format!("unrecognized validation mode in settings: {}", s))
        }),
        None => Ok(ValidationMode::Permissive),
    }
}

pub fn set_validation_mode(conn: &Connection, mode: ValidationMode) -> Result<(), EngineError> {
    db::settings_set_json(conn, VALIDATION_MODE_KEY, &serde_json::json!(mode.as_str()))
        .map_err(|e| EngineError::Dependency(e.to_string()))
}

#[derive(Debug, Clone)]
pub struct AssignRequest {
    pub organisation_id: String,
    pub classroom_id: String,
    pub day: i64,
    pub period: i64,
    pub teacher_id: String,
    pub subject: String,
    pub multi_assign: bool,
}

#[derive(Debug)]
pub struct AssignOutcome {
    pub slot: SlotRow,
    pub created: bool,
    pub neighbors: Vec<SlotRow>,
    pub free_teachers: Vec<TeacherRow>,
}

#[derive(Debug)]
pub struct UnassignOutcome {
    pub changed: bool,
    pub removed: Vec<SlotRow>,
    pub neighbors: Vec<SlotRow>,
}

#[derive(Debug)]
pub struct CellEditOutcome {
    pub assigned: usize,
    pub unassigned: usize,
    pub occupants: Vec<SlotRow>,
    pub neighbors: Vec<SlotRow>,
}

fn check_cell(day: i64, period: i64) -> Result<(), EngineError> {
    if !grid::day_in_range(day) {
        return Err(EngineError::Validation(format!(
            "day must be in 0..=4, got {}",
            day
        )));
    }
    if !grid::period_in_range(period) {
        return Err(EngineError::Validation(format!(
            "period must be in 0..=5, got {}",
            period
        )));
    }
    Ok(())
}

fn check_not_blank(value: &str, field: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::Validation(format!("{} must not be blank", field)));
    }
    Ok(())
}

fn check_eligibility(conn: &Connection, req: &AssignRequest) -> Result<(), EngineError> {
    let classroom = store::get_classroom(conn, &req.classroom_id)?.ok_or_else(|| {
        EngineError::NotFound(format!("classroom not found: {}", req.classroom_id))
    })?;
    if classroom.organisation_id != req.organisation_id {
        return Err(EngineError::NotFound(format!(
            "classroom not found: {}",
            req.classroom_id
        )));
    }
    let curriculum = classroom.curriculum().map_err(|e| {
        EngineError::Dependency(format!(
            "malformed curriculum for classroom {}: {}",
            classroom.id, e
        ))
    })?;
    if !curriculum.iter().any(|s| s == &req.subject) {
        return Err(EngineError::Eligibility(format!(
            "subject {} is not in the curriculum of classroom {}",
            req.subject, classroom.name
        )));
    }

    let teacher = store::get_teacher(conn, &req.teacher_id)?
        .ok_or_else(|| EngineError::NotFound(format!("teacher not found: {}", req.teacher_id)))?;
    if teacher.organisation_id != req.organisation_id {
        return Err(EngineError::NotFound(format!(
            "teacher not found: {}",
            req.teacher_id
        )));
    }
    let subjects = teacher.subjects().map_err(|e| {
        EngineError::Dependency(format!(
            "malformed subject list for teacher {}: {}",
            teacher.id, e
        ))
    })?;
    if !subjects.iter().any(|s| s == &req.subject) {
        return Err(EngineError::Eligibility(format!(
            "teacher {} does not teach {}",
            teacher.name, req.subject
        )));
    }
    Ok(())
}

fn bump_neighbors(
    conn: &Connection,
    org: &str,
    classroom_id: &str,
    day: i64,
    period: i64,
    delta: i64,
) -> Result<(), EngineError> {
    for np in grid::neighbor_periods(period) {
        conn.execute(
            "UPDATE slots SET workload = workload + ?
             WHERE organisation_id = ? AND classroom_id = ? AND day = ? AND period = ?",
            (delta, org, classroom_id, day, np),
        )?;
    }
    Ok(())
}

fn neighbor_rows(
    conn: &Connection,
    org: &str,
    classroom_id: &str,
    day: i64,
    period: i64,
) -> Result<Vec<SlotRow>, EngineError> {
    let mut rows = Vec::new();
    for np in grid::neighbor_periods(period) {
        rows.extend(store::cell_occupants(conn, org, classroom_id, day, np)?);
    }
    Ok(rows)
}

/// Validate and write one assignment inside an open transaction. The caller
/// owns commit/rollback, so a multi-step cell edit can share one unit of
/// work with other operations.
fn assign_in_tx(
    conn: &Connection,
    req: &AssignRequest,
    mode: ValidationMode,
) -> Result<(SlotRow, bool), EngineError> {
    check_cell(req.day, req.period)?;
    check_not_blank(&req.organisation_id, "organisationId")?;
    check_not_blank(&req.classroom_id, "classroomId")?;
    check_not_blank(&req.teacher_id, "teacherId")?;
    check_not_blank(&req.subject, "subject")?;

    if mode == ValidationMode::Strict {
        check_eligibility(conn, req)?;
    }

    let occupants = store::cell_occupants(
        conn,
        &req.organisation_id,
        &req.classroom_id,
        req.day,
        req.period,
    )?;
    let already_present = occupants.iter().any(|o| o.teacher_id == req.teacher_id);
    let other_teacher = occupants.iter().find(|o| o.teacher_id != req.teacher_id);
    if let Some(other) = other_teacher {
        if !req.multi_assign {
            return Err(EngineError::Conflict(format!(
                "classroom {} already has teacher {} at day {} period {}",
                req.classroom_id, other.teacher_id, req.day, req.period
            )));
        }
    }

    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO slots(organisation_id, classroom_id, day, period,
                           teacher_id, subject, workload, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(organisation_id, classroom_id, day, period, teacher_id)
         DO UPDATE SET subject = excluded.subject, updated_at = excluded.updated_at",
        (
            &req.organisation_id,
            &req.classroom_id,
            req.day,
            req.period,
            &req.teacher_id,
            &req.subject,
            WORKLOAD_ACTIVE,
            &now,
        ),
    )?;

    // One +1 per occupant row written; a subject change on an existing
    // occupant touches no neighbor counters.
    let created = !already_present;
    if created {
        bump_neighbors(
            conn,
            &req.organisation_id,
            &req.classroom_id,
            req.day,
            req.period,
            1,
        )?;
    }

    let slot = store::cell_occupants(
        conn,
        &req.organisation_id,
        &req.classroom_id,
        req.day,
        req.period,
    )?
    .into_iter()
    .find(|o| o.teacher_id == req.teacher_id)
    .ok_or_else(|| EngineError::Dependency("slot vanished after upsert".to_string()))?;

    Ok((slot, created))
}

fn unassign_in_tx(
    conn: &Connection,
    org: &str,
    classroom_id: &str,
    day: i64,
    period: i64,
    teacher_id: Option<&str>,
) -> Result<Vec<SlotRow>, EngineError> {
    check_cell(day, period)?;
    check_not_blank(org, "organisationId")?;
    check_not_blank(classroom_id, "classroomId")?;

    let occupants = store::cell_occupants(conn, org, classroom_id, day, period)?;
    let removed: Vec<SlotRow> = occupants
        .into_iter()
        .filter(|o| teacher_id.map(|t| o.teacher_id == t).unwrap_or(true))
        .collect();

    for row in &removed {
        conn.execute(
            "DELETE FROM slots
             WHERE organisation_id = ? AND classroom_id = ?
               AND day = ? AND period = ? AND teacher_id = ?",
            (org, classroom_id, day, period, &row.teacher_id),
        )?;
        bump_neighbors(conn, org, classroom_id, day, period, -1)?;
    }

    Ok(removed)
}

/// Apply one assignment as an atomic unit: slot upsert, neighbor workload
/// deltas, and the returned availability snapshot all come from the same
/// transaction.
pub fn assign(conn: &mut Connection, req: &AssignRequest) -> Result<AssignOutcome, EngineError> {
    let mode = validation_mode(conn)?;
    let tx = conn.transaction()?;
    let (slot, created) = assign_in_tx(&tx, req, mode)?;
    let neighbors = neighbor_rows(&tx, &req.organisation_id, &req.classroom_id, req.day, req.period)?;
    let free_teachers = store::free_teachers(&tx, &req.organisation_id, req.day, req.period)?;
    tx.commit()?;

    debug!(
        organisation = %req.organisation_id,
        classroom = %req.classroom_id,
        day = req.day,
        period = req.period,
        teacher = %req.teacher_id,
        created,
        "slot assigned"
    );
    Ok(AssignOutcome {
        slot,
        created,
        neighbors,
        free_teachers,
    })
}

/// Remove one named occupant, or clear the whole cell when no teacher is
/// given. Unassigning an empty cell is a no-op, never an error.
pub fn unassign(
    conn: &mut Connection,
    org: &str,
    classroom_id: &str,
    day: i64,
    period: i64,
    teacher_id: Option<&str>,
) -> Result<UnassignOutcome, EngineError> {
    let tx = conn.transaction()?;
    let removed = unassign_in_tx(&tx, org, classroom_id, day, period, teacher_id)?;
    let neighbors = neighbor_rows(&tx, org, classroom_id, day, period)?;
    tx.commit()?;

    if !removed.is_empty() {
        debug!(
            organisation = %org,
            classroom = %classroom_id,
            day,
            period,
            removed = removed.len(),
            "slot unassigned"
        );
    }
    Ok(UnassignOutcome {
        changed: !removed.is_empty(),
        removed,
        neighbors,
    })
}

/// Reconcile one cell with its desired occupant list in a single
/// transaction. The diff is scoped to this classroom's cell, so the same
/// teacher's commitments in other classrooms are never touched.
pub fn apply_cell_edit(
    conn: &mut Connection,
    org: &str,
    classroom_id: &str,
    day: i64,
    period: i64,
    desired: &[Occupant],
) -> Result<CellEditOutcome, EngineError> {
    check_cell(day, period)?;
    check_not_blank(org, "organisationId")?;
    check_not_blank(classroom_id, "classroomId")?;

    let mode = validation_mode(conn)?;
    let multi_assign = desired.len() > 1;
    let tx = conn.transaction()?;

    let current: Vec<Occupant> = store::cell_occupants(&tx, org, classroom_id, day, period)?
        .into_iter()
        .map(|o| Occupant {
            teacher_id: o.teacher_id,
            subject: o.subject,
        })
        .collect();

    let mut assigned = 0usize;
    let mut unassigned = 0usize;
    for edit in grid::diff_cell(&current, desired) {
        match edit {
            grid::CellEdit::Unassign { teacher_id } => {
                unassigned += unassign_in_tx(&tx, org, classroom_id, day, period, Some(&teacher_id))?
                    .len();
            }
            grid::CellEdit::Assign { teacher_id, subject } => {
                let req = AssignRequest {
                    organisation_id: org.to_string(),
                    classroom_id: classroom_id.to_string(),
                    day,
                    period,
                    teacher_id,
                    subject,
                    multi_assign,
                };
                assign_in_tx(&tx, &req, mode)?;
                assigned += 1;
            }
        }
    }

    let occupants = store::cell_occupants(&tx, org, classroom_id, day, period)?;
    let neighbors = neighbor_rows(&tx, org, classroom_id, day, period)?;
    tx.commit()?;

    Ok(CellEditOutcome {
        assigned,
        unassigned,
        occupants,
        neighbors,
    })
}

/// Explicit repair for workload drift: sets every slot in scope to the
/// sentinel -1 plus one per occupant row in its two neighbor cells. Normal
/// assign/unassign never recomputes; this is the only corrective path.
pub fn recompute_workload(
    conn: &mut Connection,
    org: &str,
    classroom_id: Option<&str>,
) -> Result<usize, EngineError> {
    check_not_blank(org, "organisationId")?;

    let base = "UPDATE slots SET workload = -1 + (
            SELECT COUNT(*) FROM slots n
            WHERE n.organisation_id = slots.organisation_id
              AND n.classroom_id = slots.classroom_id
              AND n.day = slots.day
              AND n.period IN (slots.period - 1, slots.period + 1)
        ) WHERE organisation_id = ?";

    let updated = match classroom_id {
        Some(c) => {
            let sql = format!("{} AND classroom_id = ?", base);
            conn.execute(&sql, (org, c))?
        }
        None => conn.execute(base, [org])?,
    };
    Ok(updated)
}
