use serde::{Deserialize, Serialize};

/// Fixed weekly grid: 5 working days of 6 periods each.
pub const DAYS: usize = 5;
pub const PERIODS: usize = 6;

/// Workload sentinel written to a slot's own row on assignment,
/// meaning "active assignment, not a load count".
pub const WORKLOAD_ACTIVE: i64 = -1;

pub fn day_in_range(day: i64) -> bool {
    (0..DAYS as i64).contains(&day)
}

pub fn period_in_range(period: i64) -> bool {
    (0..PERIODS as i64).contains(&period)
}

/// Adjacent periods (same day) for workload accounting, clipped to the grid.
pub fn neighbor_periods(period: i64) -> impl Iterator<Item = i64> {
    [period - 1, period + 1].into_iter().filter(|p| period_in_range(*p))
}

/// One teacher+subject occupant of a classroom cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occupant {
    pub teacher_id: String,
    pub subject: String,
}

/// One classroom commitment in a teacher's weekly grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherCell {
    pub classroom_id: String,
    pub classroom_name: String,
    pub subject: String,
}

/// Flat slot view consumed by the projections. Ordering by (day, period)
/// is the caller's responsibility (the store queries guarantee it).
#[derive(Debug, Clone)]
pub struct SlotView {
    pub classroom_id: String,
    pub classroom_name: String,
    pub day: i64,
    pub period: i64,
    pub teacher_id: String,
    pub subject: String,
}

/// Classroom view: 5x6 matrix of occupant lists. A free cell is an empty
/// list, never null; the consumer can always iterate.
pub fn classroom_grid(slots: &[SlotView]) -> Vec<Vec<Vec<Occupant>>> {
    let mut grid: Vec<Vec<Vec<Occupant>>> = vec![vec![Vec::new(); PERIODS]; DAYS];
    for s in slots {
        if !day_in_range(s.day) || !period_in_range(s.period) {
            continue;
        }
        grid[s.day as usize][s.period as usize].push(Occupant {
            teacher_id: s.teacher_id.clone(),
            subject: s.subject.clone(),
        });
    }
    grid
}

/// Teacher view: 5x6 matrix where a free cell is null and an occupied cell
/// lists the classrooms the teacher is committed to at that time. The null
/// sentinel differs from the classroom view's empty list on purpose; both
/// conventions exist in the consumers and each is converted exactly here.
pub fn teacher_grid(slots: &[SlotView]) -> Vec<Vec<Option<Vec<TeacherCell>>>> {
    let mut grid: Vec<Vec<Option<Vec<TeacherCell>>>> = vec![vec![None; PERIODS]; DAYS];
    for s in slots {
        if !day_in_range(s.day) || !period_in_range(s.period) {
            continue;
        }
        let cell = TeacherCell {
            classroom_id: s.classroom_id.clone(),
            classroom_name: s.classroom_name.clone(),
            subject: s.subject.clone(),
        };
        grid[s.day as usize][s.period as usize]
            .get_or_insert_with(Vec::new)
            .push(cell);
    }
    grid
}

/// One engine operation derived from a cell edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellEdit {
    Assign { teacher_id: String, subject: String },
    Unassign { teacher_id: String },
}

/// Translate an edited cell into engine operations: one unassign per
/// occupant that disappeared, one assign per occupant added or whose
/// subject changed. The diff is scoped to a single (classroom, day, period)
/// cell, so a teacher's commitments to other classrooms can never be
/// touched by an edit made from this classroom's grid.
pub fn diff_cell(current: &[Occupant], desired: &[Occupant]) -> Vec<CellEdit> {
    let mut edits = Vec::new();

    for cur in current {
        if !desired.iter().any(|d| d.teacher_id == cur.teacher_id) {
            edits.push(CellEdit::Unassign {
                teacher_id: cur.teacher_id.clone(),
            });
        }
    }

    for want in desired {
        let unchanged = current
            .iter()
            .any(|c| c.teacher_id == want.teacher_id && c.subject == want.subject);
        if !unchanged {
            edits.push(CellEdit::Assign {
                teacher_id: want.teacher_id.clone(),
                subject: want.subject.clone(),
            });
        }
    }

    edits
}
