use crate::db;
use crate::hierarchy;
use crate::ipc::helpers::{get_required_str, snapshot, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{Role, Subject, User};
use rusqlite::Connection;
use serde_json::json;

fn parse_list<T: serde::de::DeserializeOwned>(
    params: &serde_json::Value,
    key: &str,
) -> Result<Vec<T>, HandlerErr> {
    match params.get(key) {
        None => Ok(Vec::new()),
        Some(v) if v.is_null() => Ok(Vec::new()),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| HandlerErr::bad_params(format!("{}: {}", key, e))),
    }
}

/// Bulk upsert of contributors and subjects, all or nothing.
fn directory_import(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let users: Vec<User> = parse_list(params, "users")?;
    let subjects: Vec<Subject> = parse_list(params, "subjects")?;
    if let Some(bad) = users.iter().find(|u| u.id.trim().is_empty()) {
        return Err(HandlerErr::bad_params(format!(
            "user {:?} has an empty id",
            bad.name
        )));
    }

    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;
    for u in &users {
        db::upsert_user(&tx, u).map_err(|e| HandlerErr {
            code: "db_insert_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "users", "id": u.id })),
        })?;
    }
    for s in &subjects {
        db::upsert_subject(&tx, s).map_err(|e| HandlerErr {
            code: "db_insert_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "subjects", "id": s.id })),
        })?;
    }
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;

    tracing::info!(
        users = users.len(),
        subjects = subjects.len(),
        "directory imported"
    );
    Ok(json!({ "users": users.len(), "subjects": subjects.len() }))
}

fn users_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let include_admin = params
        .get("includeAdmin")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let snap = snapshot(conn)?;
    let mut users: Vec<&User> = snap
        .users()
        .iter()
        .filter(|u| include_admin || u.role != Role::Admin)
        .collect();
    users.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(json!({ "users": users }))
}

fn subjects_list(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let snap = snapshot(conn)?;
    Ok(json!({ "subjects": snap.subjects() }))
}

#[derive(Clone, Copy)]
enum Relation {
    DirectReports,
    AssignedMentors,
    Subordinates,
    Breadcrumbs,
}

fn hierarchy_query(
    conn: &Connection,
    params: &serde_json::Value,
    relation: Relation,
) -> Result<serde_json::Value, HandlerErr> {
    let user_id = get_required_str(params, "userId")?;
    let snap = snapshot(conn)?;
    let users = match relation {
        Relation::DirectReports => hierarchy::direct_reports(&snap, &user_id),
        Relation::AssignedMentors => hierarchy::assigned_mentors(&snap, &user_id),
        Relation::Subordinates => hierarchy::subordinates(&snap, &user_id),
        Relation::Breadcrumbs => hierarchy::breadcrumbs(&snap, &user_id),
    };
    Ok(json!({ "users": users }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let relation = match req.method.as_str() {
        "directory.import" => return Some(with_db(state, req, directory_import)),
        "users.list" => return Some(with_db(state, req, users_list)),
        "subjects.list" => return Some(with_db(state, req, subjects_list)),
        "hierarchy.directReports" => Relation::DirectReports,
        "hierarchy.assignedMentors" => Relation::AssignedMentors,
        "hierarchy.subordinates" => Relation::Subordinates,
        "hierarchy.breadcrumbs" => Relation::Breadcrumbs,
        _ => return None,
    };
    Some(with_db(state, req, |conn, params| {
        hierarchy_query(conn, params, relation)
    }))
}
