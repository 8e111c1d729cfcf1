use crate::calc::{self, Scope};
use crate::dashboard;
use crate::ipc::helpers::{get_optional_str, get_required_str, snapshot, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::settings;
use rusqlite::Connection;
use serde_json::json;

fn rollup_performance(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let user_id = get_required_str(params, "userId")?;
    let scope = Scope::parse(get_optional_str(params, "subjectId")?.as_deref());
    let snap = snapshot(conn)?;
    let r = calc::rollup_performance(&snap, &user_id, &scope)?;
    Ok(json!({ "value": r.value, "weight": r.weight, "subjectId": scope.as_str() }))
}

fn rollup_attendance(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let user_id = get_required_str(params, "userId")?;
    let snap = snapshot(conn)?;
    let r = calc::rollup_attendance(&snap, &user_id)?;
    Ok(json!({ "value": r.value, "weight": r.weight }))
}

/// Subject from params, falling back to the workspace's dashboard default.
fn view_scope(
    params: &serde_json::Value,
    defaults: &settings::DashboardSettings,
) -> Result<Scope, HandlerErr> {
    let raw = get_optional_str(params, "subjectId")?;
    Ok(Scope::parse(Some(
        raw.as_deref().unwrap_or(defaults.default_subject.as_str()),
    )))
}

fn dashboard_open(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let viewer_id = get_required_str(params, "viewerId")?;
    let defaults = settings::dashboard_settings(conn).map_err(HandlerErr::query)?;
    let scope = view_scope(params, &defaults)?;
    let snap = snapshot(conn)?;
    let model = dashboard::open_dashboard(&snap, &viewer_id, &scope, defaults.decimals)?;
    serde_json::to_value(model).map_err(|e| HandlerErr::new("internal", e.to_string()))
}

fn profile_open(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let user_id = get_required_str(params, "userId")?;
    let defaults = settings::dashboard_settings(conn).map_err(HandlerErr::query)?;
    let scope = view_scope(params, &defaults)?;
    let snap = snapshot(conn)?;
    let model = dashboard::open_profile(&snap, &user_id, &scope, defaults.decimals)?;
    serde_json::to_value(model).map_err(|e| HandlerErr::new("internal", e.to_string()))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "rollup.performance" => Some(with_db(state, req, rollup_performance)),
        "rollup.attendance" => Some(with_db(state, req, rollup_attendance)),
        "dashboard.open" => Some(with_db(state, req, dashboard_open)),
        "profile.open" => Some(with_db(state, req, profile_open)),
        _ => None,
    }
}
