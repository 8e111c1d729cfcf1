use crate::approval::{self, Decision, SqliteStore};
use crate::db;
use crate::ipc::helpers::{get_optional_str, get_required_str, snapshot, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{ChangeStatus, ProfileField};
use crate::settings;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde_json::json;

fn changes_propose(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let target_id = get_required_str(params, "mentorId")?;
    let proposer_id = get_required_str(params, "proposedBy")?;
    let field_raw = get_required_str(params, "field")?;
    let Some(field) = ProfileField::parse(&field_raw) else {
        return Err(HandlerErr {
            code: "bad_params",
            message: format!("field {} cannot be edited", field_raw),
            details: Some(json!({ "editable": ["department", "campus", "state"] })),
        });
    };
    let Some(new_value) = params.get("newValue").and_then(|v| v.as_str()) else {
        return Err(HandlerErr::bad_params("missing newValue"));
    };

    let snap = snapshot(conn)?;
    let change = approval::propose(
        &snap,
        &SqliteStore::new(conn),
        &target_id,
        field,
        new_value,
        &proposer_id,
    )?;
    Ok(json!({ "change": change }))
}

fn changes_resolve(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let change_id = get_required_str(params, "changeId")?;
    let approver_id = get_required_str(params, "approverId")?;
    let decision_raw = get_required_str(params, "decision")?;
    let Some(decision) = Decision::parse(&decision_raw) else {
        return Err(HandlerErr::bad_params("decision must be approve or reject"));
    };
    let policy = settings::approval_policy(conn).map_err(HandlerErr::query)?;

    let snap = snapshot(conn)?;
    let change = approval::resolve(
        &snap,
        &SqliteStore::new(conn),
        &change_id,
        decision,
        &approver_id,
        &policy,
    )?;
    Ok(json!({ "change": change }))
}

fn changes_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let sme_id = get_optional_str(params, "smeId")?;
    let status = match get_optional_str(params, "status")? {
        None => None,
        Some(raw) => Some(ChangeStatus::parse(&raw).ok_or_else(|| {
            HandlerErr::bad_params("status must be pending, approved or rejected")
        })?),
    };

    let mut sql = format!("SELECT {} FROM pending_changes WHERE 1 = 1", db::CHANGE_COLUMNS);
    let mut bind_values: Vec<Value> = Vec::new();
    if let Some(sme) = sme_id {
        sql.push_str(" AND sme_id = ?");
        bind_values.push(Value::Text(sme));
    }
    if let Some(s) = status {
        sql.push_str(" AND status = ?");
        bind_values.push(Value::Text(s.as_str().to_string()));
    }
    sql.push_str(" ORDER BY rowid");

    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
    let changes = stmt
        .query_map(params_from_iter(bind_values), db::change_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "changes": changes }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "changes.propose" => Some(with_db(state, req, changes_propose)),
        "changes.resolve" => Some(with_db(state, req, changes_resolve)),
        "changes.list" => Some(with_db(state, req, changes_list)),
        _ => None,
    }
}
