use rusqlite::{Connection, OptionalExtension};

use crate::grid::SlotView;

/// One persisted slot row, exactly as stored.
#[derive(Debug, Clone)]
pub struct SlotRow {
    pub organisation_id: String,
    pub classroom_id: String,
    pub day: i64,
    pub period: i64,
    pub teacher_id: String,
    pub subject: String,
    pub workload: i64,
}

#[derive(Debug, Clone)]
pub struct ClassroomRow {
    pub id: String,
    pub organisation_id: String,
    pub name: String,
    pub curriculum: String,
}

#[derive(Debug, Clone)]
pub struct TeacherRow {
    pub id: String,
    pub organisation_id: String,
    pub name: String,
    pub subjects: String,
}

impl ClassroomRow {
    pub fn curriculum(&self) -> Result<Vec<String>, serde_json::Error> {
        serde_json::from_str(&self.curriculum)
    }
}

impl TeacherRow {
    pub fn subjects(&self) -> Result<Vec<String>, serde_json::Error> {
        serde_json::from_str(&self.subjects)
    }
}

fn slot_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SlotRow> {
    Ok(SlotRow {
        organisation_id: row.get(0)?,
        classroom_id: row.get(1)?,
        day: row.get(2)?,
        period: row.get(3)?,
        teacher_id: row.get(4)?,
        subject: row.get(5)?,
        workload: row.get(6)?,
    })
}

const SLOT_COLUMNS: &str =
    "organisation_id, classroom_id, day, period, teacher_id, subject, workload";

/// The (day, period) ascending order on every list query is load-bearing:
/// grid projection walks the rows in cell order.
pub fn slots_by_organisation(conn: &Connection, org: &str) -> rusqlite::Result<Vec<SlotRow>> {
    let sql = format!(
        "SELECT {SLOT_COLUMNS} FROM slots WHERE organisation_id = ?
         ORDER BY day, period, classroom_id, teacher_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([org], |r| slot_from_row(r))?;
    rows.collect()
}

pub fn slots_by_classroom(
    conn: &Connection,
    org: &str,
    classroom_id: &str,
) -> rusqlite::Result<Vec<SlotRow>> {
    let sql = format!(
        "SELECT {SLOT_COLUMNS} FROM slots
         WHERE organisation_id = ? AND classroom_id = ?
         ORDER BY day, period, teacher_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([org, classroom_id], |r| slot_from_row(r))?;
    rows.collect()
}

pub fn slots_by_teacher(
    conn: &Connection,
    org: &str,
    teacher_id: &str,
) -> rusqlite::Result<Vec<SlotRow>> {
    let sql = format!(
        "SELECT {SLOT_COLUMNS} FROM slots
         WHERE organisation_id = ? AND teacher_id = ?
         ORDER BY day, period, classroom_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([org, teacher_id], |r| slot_from_row(r))?;
    rows.collect()
}

/// Teacher occupancy with classroom names resolved, feeding the teacher
/// grid and the classroom-side hover preview. Classrooms created outside
/// the collaborator tables (permissive mode) fall back to the raw id.
pub fn teacher_occupancy(
    conn: &Connection,
    org: &str,
    teacher_id: &str,
) -> rusqlite::Result<Vec<SlotView>> {
    let mut stmt = conn.prepare(
        "SELECT s.classroom_id, COALESCE(c.name, s.classroom_id),
                s.day, s.period, s.teacher_id, s.subject
         FROM slots s
         LEFT JOIN classrooms c ON c.id = s.classroom_id
         WHERE s.organisation_id = ? AND s.teacher_id = ?
         ORDER BY s.day, s.period, s.classroom_id",
    )?;
    let rows = stmt.query_map([org, teacher_id], |r| {
        Ok(SlotView {
            classroom_id: r.get(0)?,
            classroom_name: r.get(1)?,
            day: r.get(2)?,
            period: r.get(3)?,
            teacher_id: r.get(4)?,
            subject: r.get(5)?,
        })
    })?;
    rows.collect()
}

pub fn cell_occupants(
    conn: &Connection,
    org: &str,
    classroom_id: &str,
    day: i64,
    period: i64,
) -> rusqlite::Result<Vec<SlotRow>> {
    let sql = format!(
        "SELECT {SLOT_COLUMNS} FROM slots
         WHERE organisation_id = ? AND classroom_id = ? AND day = ? AND period = ?
         ORDER BY teacher_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map((org, classroom_id, day, period), |r| slot_from_row(r))?;
    rows.collect()
}

pub fn is_teacher_free(
    conn: &Connection,
    org: &str,
    teacher_id: &str,
    day: i64,
    period: i64,
) -> rusqlite::Result<bool> {
    let busy: i64 = conn.query_row(
        "SELECT EXISTS(
             SELECT 1 FROM slots
             WHERE organisation_id = ? AND teacher_id = ? AND day = ? AND period = ?
         )",
        (org, teacher_id, day, period),
        |r| r.get(0),
    )?;
    Ok(busy == 0)
}

/// Teachers of the organisation with no slot at (day, period), in name
/// order. Drives the classroom-side teacher dropdown, which must exclude
/// busy teachers.
pub fn free_teachers(
    conn: &Connection,
    org: &str,
    day: i64,
    period: i64,
) -> rusqlite::Result<Vec<TeacherRow>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.organisation_id, t.name, t.subjects
         FROM teachers t
         WHERE t.organisation_id = ?1
           AND NOT EXISTS(
               SELECT 1 FROM slots s
               WHERE s.organisation_id = ?1 AND s.teacher_id = t.id
                 AND s.day = ?2 AND s.period = ?3
           )
         ORDER BY t.name, t.id",
    )?;
    let rows = stmt.query_map((org, day, period), |r| {
        Ok(TeacherRow {
            id: r.get(0)?,
            organisation_id: r.get(1)?,
            name: r.get(2)?,
            subjects: r.get(3)?,
        })
    })?;
    rows.collect()
}

pub fn get_classroom(conn: &Connection, id: &str) -> rusqlite::Result<Option<ClassroomRow>> {
    conn.query_row(
        "SELECT id, organisation_id, name, curriculum FROM classrooms WHERE id = ?",
        [id],
        |r| {
            Ok(ClassroomRow {
                id: r.get(0)?,
                organisation_id: r.get(1)?,
                name: r.get(2)?,
                curriculum: r.get(3)?,
            })
        },
    )
    .optional()
}

pub fn get_teacher(conn: &Connection, id: &str) -> rusqlite::Result<Option<TeacherRow>> {
    conn.query_row(
        "SELECT id, organisation_id, name, subjects FROM teachers WHERE id = ?",
        [id],
        |r| {
            Ok(TeacherRow {
                id: r.get(0)?,
                organisation_id: r.get(1)?,
                name: r.get(2)?,
                subjects: r.get(3)?,
            })
        },
    )
    .optional()
}
