use crate::db;
use crate::ipc::helpers::{get_required_i64, get_required_str, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{AssessmentType, AttendanceStatus, Role};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn user_role(conn: &Connection, user_id: &str) -> Result<Option<Role>, HandlerErr> {
    let raw: Option<String> = conn
        .query_row("SELECT role FROM users WHERE id = ?", [user_id], |r| r.get(0))
        .optional()
        .map_err(HandlerErr::query)?;
    Ok(raw.as_deref().and_then(Role::parse))
}

fn require_mentor(conn: &Connection, mentor_id: &str) -> Result<(), HandlerErr> {
    match user_role(conn, mentor_id)? {
        Some(Role::Mentor) => Ok(()),
        Some(_) => Err(HandlerErr::bad_params(format!(
            "user {} is not a mentor",
            mentor_id
        ))),
        None => Err(HandlerErr::new(
            "not_found",
            format!("mentor {} not found", mentor_id),
        )),
    }
}

fn scores_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mentor_id = get_required_str(params, "mentorId")?;
    let subject_id = get_required_str(params, "subjectId")?;
    let module = get_required_i64(params, "module")?;
    let assessment_number = get_required_i64(params, "assessmentNumber")?;
    let type_raw = get_required_str(params, "type")?;
    let Some(assessment_type) = AssessmentType::parse(&type_raw) else {
        return Err(HandlerErr::bad_params(
            "type must be Test, Viva or Presentation",
        ));
    };
    let Some(score) = params.get("score").and_then(|v| v.as_f64()) else {
        return Err(HandlerErr::bad_params("missing score"));
    };
    if !(0.0..=100.0).contains(&score) {
        return Err(HandlerErr::bad_params("score must be between 0 and 100"));
    }
    if module < 1 {
        return Err(HandlerErr::bad_params("module must be at least 1"));
    }
    if assessment_number < 1 {
        return Err(HandlerErr::bad_params("assessmentNumber must be at least 1"));
    }

    require_mentor(conn, &mentor_id)?;
    let subject_exists = conn
        .query_row("SELECT 1 FROM subjects WHERE id = ?", [&subject_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
        .map_err(HandlerErr::query)?
        .is_some();
    if !subject_exists {
        return Err(HandlerErr::new(
            "not_found",
            format!("subject {} not found", subject_id),
        ));
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO mentor_scores(id, mentor_id, subject_id, module, type, assessment_number, score)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &mentor_id,
            &subject_id,
            module,
            assessment_type.as_str(),
            assessment_number,
            score,
        ),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "mentor_scores" })),
    })?;
    Ok(json!({ "scoreId": id }))
}

fn scores_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mentor_id = get_required_str(params, "mentorId")?;
    let mut stmt = conn
        .prepare(
            "SELECT id, mentor_id, subject_id, module, type, assessment_number, score
             FROM mentor_scores
             WHERE mentor_id = ?
             ORDER BY rowid",
        )
        .map_err(HandlerErr::query)?;
    let scores = stmt
        .query_map([&mentor_id], db::score_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "scores": scores }))
}

/// One record per (mentor, date); marking again only replaces the status.
fn attendance_mark(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mentor_id = get_required_str(params, "mentorId")?;
    let date_raw = get_required_str(params, "date")?;
    let status_raw = get_required_str(params, "status")?;
    let recorded_by = get_required_str(params, "recordedBy")?;
    // Stored in canonical form so "2024-7-7" and "2024-07-07" share one (mentor, date) key.
    let date = match NaiveDate::parse_from_str(&date_raw, "%Y-%m-%d") {
        Ok(d) => d.format("%Y-%m-%d").to_string(),
        Err(_) => return Err(HandlerErr::bad_params("date must be YYYY-MM-DD")),
    };
    let Some(status) = AttendanceStatus::parse(&status_raw) else {
        return Err(HandlerErr::bad_params(
            "status must be Present, Absent, Leave or Not Applicable",
        ));
    };
    require_mentor(conn, &mentor_id)?;
    if user_role(conn, &recorded_by)?.is_none() {
        return Err(HandlerErr::new(
            "not_found",
            format!("recorder {} not found", recorded_by),
        ));
    }

    conn.execute(
        "INSERT INTO daily_attendance(id, mentor_id, date, status, recorded_by)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(mentor_id, date) DO UPDATE SET
           status = excluded.status",
        (
            Uuid::new_v4().to_string(),
            &mentor_id,
            &date,
            status.as_str(),
            &recorded_by,
        ),
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "daily_attendance" })),
    })?;
    let id: String = conn
        .query_row(
            "SELECT id FROM daily_attendance WHERE mentor_id = ? AND date = ?",
            (&mentor_id, &date),
            |r| r.get(0),
        )
        .map_err(HandlerErr::query)?;
    Ok(json!({ "attendanceId": id, "status": status.as_str() }))
}

fn attendance_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mentor_id = get_required_str(params, "mentorId")?;
    let mut stmt = conn
        .prepare(
            "SELECT id, mentor_id, date, status, recorded_by
             FROM daily_attendance
             WHERE mentor_id = ?
             ORDER BY date",
        )
        .map_err(HandlerErr::query)?;
    let records = stmt
        .query_map([&mentor_id], db::attendance_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "records": records }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "scores.create" => Some(with_db(state, req, scores_create)),
        "scores.list" => Some(with_db(state, req, scores_list)),
        "attendance.mark" => Some(with_db(state, req, attendance_mark)),
        "attendance.list" => Some(with_db(state, req, attendance_list)),
        _ => None,
    }
}
