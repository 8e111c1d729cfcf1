use crate::model::{
    AssessmentType, AttendanceRecord, AttendanceStatus, ChangeStatus, PendingChange,
    ProfileField, Role, ScoreRecord, Snapshot, Subject, User,
};
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::info;

pub const DB_FILE_NAME: &str = "mentorbook.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)?;
    init_schema(&conn)?;
    info!(path = %db_path.display(), "workspace database opened");
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            employee_id TEXT NOT NULL DEFAULT '',
            name TEXT NOT NULL,
            role TEXT NOT NULL,
            reports_to TEXT,
            sme_id TEXT,
            department TEXT,
            campus TEXT,
            state TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_users_reports_to ON users(reports_to)",
        [],
    )?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_users_sme ON users(sme_id)", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS mentor_scores(
            id TEXT PRIMARY KEY,
            mentor_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            module INTEGER NOT NULL,
            type TEXT NOT NULL,
            assessment_number INTEGER NOT NULL,
            score REAL NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_mentor_scores_mentor ON mentor_scores(mentor_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS daily_attendance(
            id TEXT PRIMARY KEY,
            mentor_id TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            recorded_by TEXT NOT NULL,
            UNIQUE(mentor_id, date)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS pending_changes(
            id TEXT PRIMARY KEY,
            proposed_by TEXT NOT NULL,
            mentor_id TEXT NOT NULL,
            field TEXT NOT NULL,
            old_value TEXT NOT NULL,
            new_value TEXT NOT NULL,
            status TEXT NOT NULL,
            sme_id TEXT NOT NULL,
            created_at TEXT,
            resolved_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_pending_changes_sme ON pending_changes(sme_id, status)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

fn bad_column(idx: usize, what: &str, raw: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("unknown {} {:?}", what, raw).into(),
    )
}

pub const USER_COLUMNS: &str =
    "id, employee_id, name, role, reports_to, sme_id, department, campus, state";

pub fn user_from_row(r: &Row<'_>) -> rusqlite::Result<User> {
    let role_raw: String = r.get(3)?;
    let role = Role::parse(&role_raw).ok_or_else(|| bad_column(3, "role", &role_raw))?;
    Ok(User {
        id: r.get(0)?,
        employee_id: r.get(1)?,
        name: r.get(2)?,
        role,
        reports_to: r.get(4)?,
        sme_id: r.get(5)?,
        department: r.get(6)?,
        campus: r.get(7)?,
        state: r.get(8)?,
    })
}

pub fn score_from_row(r: &Row<'_>) -> rusqlite::Result<ScoreRecord> {
    let type_raw: String = r.get(4)?;
    let assessment_type =
        AssessmentType::parse(&type_raw).ok_or_else(|| bad_column(4, "assessment type", &type_raw))?;
    Ok(ScoreRecord {
        id: r.get(0)?,
        mentor_id: r.get(1)?,
        subject_id: r.get(2)?,
        module: r.get(3)?,
        assessment_type,
        assessment_number: r.get(5)?,
        score: r.get(6)?,
    })
}

pub fn attendance_from_row(r: &Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    let status_raw: String = r.get(3)?;
    let status = AttendanceStatus::parse(&status_raw)
        .ok_or_else(|| bad_column(3, "attendance status", &status_raw))?;
    Ok(AttendanceRecord {
        id: r.get(0)?,
        mentor_id: r.get(1)?,
        date: r.get(2)?,
        status,
        recorded_by: r.get(4)?,
    })
}

pub const CHANGE_COLUMNS: &str =
    "id, proposed_by, mentor_id, field, old_value, new_value, status, sme_id";

pub fn change_from_row(r: &Row<'_>) -> rusqlite::Result<PendingChange> {
    let field_raw: String = r.get(3)?;
    let field = ProfileField::parse(&field_raw).ok_or_else(|| bad_column(3, "field", &field_raw))?;
    let status_raw: String = r.get(6)?;
    let status =
        ChangeStatus::parse(&status_raw).ok_or_else(|| bad_column(6, "change status", &status_raw))?;
    Ok(PendingChange {
        id: r.get(0)?,
        proposed_by: r.get(1)?,
        mentor_id: r.get(2)?,
        field,
        old_value: r.get(4)?,
        new_value: r.get(5)?,
        status,
        sme_id: r.get(7)?,
    })
}

/// Reads every collection in insertion order into an immutable snapshot.
pub fn load_snapshot(conn: &Connection) -> rusqlite::Result<Snapshot> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users ORDER BY rowid",
        USER_COLUMNS
    ))?;
    let users = stmt
        .query_map([], user_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare("SELECT id, name FROM subjects ORDER BY rowid")?;
    let subjects = stmt
        .query_map([], |r| {
            Ok(Subject {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT id, mentor_id, subject_id, module, type, assessment_number, score
         FROM mentor_scores ORDER BY rowid",
    )?;
    let scores = stmt
        .query_map([], score_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT id, mentor_id, date, status, recorded_by
         FROM daily_attendance ORDER BY rowid",
    )?;
    let attendance = stmt
        .query_map([], attendance_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM pending_changes ORDER BY rowid",
        CHANGE_COLUMNS
    ))?;
    let changes = stmt
        .query_map([], change_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Snapshot::new(users, subjects, scores, attendance, changes))
}

pub fn upsert_user(conn: &Connection, u: &User) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO users(id, employee_id, name, role, reports_to, sme_id, department, campus, state)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           employee_id = excluded.employee_id,
           name = excluded.name,
           role = excluded.role,
           reports_to = excluded.reports_to,
           sme_id = excluded.sme_id,
           department = excluded.department,
           campus = excluded.campus,
           state = excluded.state",
        (
            &u.id,
            &u.employee_id,
            &u.name,
            u.role.as_str(),
            &u.reports_to,
            &u.sme_id,
            &u.department,
            &u.campus,
            &u.state,
        ),
    )?;
    Ok(())
}

pub fn upsert_subject(conn: &Connection, s: &Subject) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO subjects(id, name) VALUES(?, ?)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        (&s.id, &s.name),
    )?;
    Ok(())
}

pub fn insert_change(conn: &Connection, c: &PendingChange, created_at: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO pending_changes(id, proposed_by, mentor_id, field, old_value, new_value, status, sme_id, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &c.id,
            &c.proposed_by,
            &c.mentor_id,
            c.field.as_str(),
            &c.old_value,
            &c.new_value,
            c.status.as_str(),
            &c.sme_id,
            created_at,
        ),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::user;

    #[test]
    fn snapshot_preserves_insertion_order_and_indexes() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("schema");
        upsert_user(&conn, &user("ceo", Role::Ceo, None, None)).expect("ceo");
        upsert_user(&conn, &user("pm2", Role::Pm, Some("ceo"), None)).expect("pm2");
        upsert_user(&conn, &user("pm1", Role::Pm, Some("ceo"), None)).expect("pm1");
        upsert_user(&conn, &user("m", Role::Mentor, Some("pm1"), Some("sme"))).expect("m");

        let snap = load_snapshot(&conn).expect("snapshot");
        let ids: Vec<&str> = snap.users().iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["ceo", "pm2", "pm1", "m"]);
        let reports: Vec<&str> = crate::hierarchy::direct_reports(&snap, "ceo")
            .iter()
            .map(|u| u.id.as_str())
            .collect();
        assert_eq!(reports, vec!["pm2", "pm1"]);
        assert_eq!(snap.user("m").and_then(|u| u.sme_id.as_deref()), Some("sme"));
    }

    #[test]
    fn unknown_role_text_fails_the_snapshot() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("schema");
        conn.execute(
            "INSERT INTO users(id, name, role) VALUES('x', 'X', 'Janitor')",
            [],
        )
        .expect("insert");
        assert!(load_snapshot(&conn).is_err());
    }

    #[test]
    fn settings_round_trip_json() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("schema");
        assert!(settings_get_json(&conn, "setup.approvals").expect("get").is_none());
        settings_set_json(&conn, "setup.approvals", &serde_json::json!({ "commitAttempts": 5 }))
            .expect("set");
        let v = settings_get_json(&conn, "setup.approvals")
            .expect("get")
            .expect("present");
        assert_eq!(v["commitAttempts"], 5);
    }
}
