use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("timetable.sqlite3");
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classrooms(
            id TEXT PRIMARY KEY,
            organisation_id TEXT NOT NULL,
            name TEXT NOT NULL,
            curriculum TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classrooms_organisation
         ON classrooms(organisation_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            organisation_id TEXT NOT NULL,
            name TEXT NOT NULL,
            subjects TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teachers_organisation
         ON teachers(organisation_id)",
        [],
    )?;

    // The slot store. The primary key admits several teachers per cell so
    // that explicit multi-assign can append; single-occupancy per cell is
    // an engine policy, not a storage constraint.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS slots(
            organisation_id TEXT NOT NULL,
            classroom_id TEXT NOT NULL,
            day INTEGER NOT NULL,
            period INTEGER NOT NULL,
            teacher_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            workload INTEGER NOT NULL DEFAULT -1,
            updated_at TEXT,
            PRIMARY KEY(organisation_id, classroom_id, day, period, teacher_id)
        )",
        [],
    )?;
    ensure_slots_updated_at(&conn)?;
    // Backs the availability index: teacher free/busy at (day, period).
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_slots_teacher
         ON slots(organisation_id, teacher_id, day, period)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_slots_classroom
         ON slots(organisation_id, classroom_id, day, period)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

fn ensure_slots_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "slots", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE slots ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, value.to_string()),
    )?;
    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
