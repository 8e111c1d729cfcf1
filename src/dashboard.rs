use crate::calc::{RollupError, RollupPass, Scope};
use crate::hierarchy;
use crate::model::{AttendanceRecord, ChangeStatus, Role, ScoreRecord, Snapshot, User};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("user {0} not found")]
    UnknownUser(String),
    #[error(transparent)]
    Rollup(#[from] RollupError),
}

impl ViewError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownUser(_) => "not_found",
            Self::Rollup(e) => e.code(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub name: String,
    pub role: Role,
    pub role_title: &'static str,
    pub reports_to_name: Option<String>,
}

impl UserSummary {
    fn of(snap: &Snapshot, u: &User) -> Self {
        Self {
            id: u.id.clone(),
            name: u.name.clone(),
            role: u.role,
            role_title: u.role.title(),
            reports_to_name: u
                .reports_to
                .as_deref()
                .and_then(|id| snap.user(id))
                .map(|p| p.name.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRow {
    #[serde(flatten)]
    pub user: UserSummary,
    pub score: f64,
    pub attendance: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardModel {
    pub viewer: UserSummary,
    pub subject_id: String,
    pub overall_performance: f64,
    pub overall_attendance: f64,
    pub rows: Vec<MetricRow>,
    pub chart: Vec<MetricRow>,
    /// Reports-to subtree size; an SME's assigned mentors are counted in `mentors_in_scope`.
    pub total_subordinates: usize,
    pub mentors_in_scope: usize,
    pub pending_approvals: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileModel {
    pub user: UserSummary,
    pub subject_id: String,
    pub performance: f64,
    pub attendance: f64,
    pub breadcrumbs: Vec<UserSummary>,
    pub team: Vec<MetricRow>,
    pub scores: Vec<ScoreRecord>,
    pub attendance_log: Vec<AttendanceRecord>,
}

/// Presentation rounding. The engine itself never rounds.
pub fn round_to(x: f64, decimals: u32) -> f64 {
    let f = 10_f64.powi(decimals as i32);
    (x * f).round() / f
}

fn metric_row(
    pass: &mut RollupPass<'_>,
    snap: &Snapshot,
    u: &User,
    scope: &Scope,
    decimals: u32,
) -> Result<MetricRow, RollupError> {
    Ok(MetricRow {
        user: UserSummary::of(snap, u),
        score: round_to(pass.performance(&u.id, scope)?.value, decimals),
        attendance: round_to(pass.attendance(&u.id)?.value, decimals),
    })
}

pub fn open_dashboard(
    snap: &Snapshot,
    viewer_id: &str,
    scope: &Scope,
    decimals: u32,
) -> Result<DashboardModel, ViewError> {
    let viewer = snap
        .user(viewer_id)
        .ok_or_else(|| ViewError::UnknownUser(viewer_id.to_string()))?;
    let mut pass = RollupPass::new(snap);

    let in_scope = hierarchy::users_in_scope(snap, viewer);
    let mut rows = Vec::with_capacity(in_scope.len());
    for u in in_scope.iter().filter(|u| u.id != viewer.id) {
        rows.push(metric_row(&mut pass, snap, u, scope, decimals)?);
    }
    rows.sort_by_key(|r| r.user.role.level());

    let chart_users = if viewer.role == Role::Sme {
        hierarchy::assigned_mentors(snap, &viewer.id)
    } else {
        hierarchy::direct_reports(snap, &viewer.id)
    };
    let mut chart = Vec::with_capacity(chart_users.len());
    for u in chart_users {
        chart.push(metric_row(&mut pass, snap, u, scope, decimals)?);
    }

    let overall_performance = round_to(pass.performance(&viewer.id, scope)?.value, decimals);
    let overall_attendance = round_to(pass.attendance(&viewer.id)?.value, decimals);

    let total_subordinates = hierarchy::subordinates(snap, &viewer.id).len();
    let mentors_in_scope = in_scope.iter().filter(|u| u.role == Role::Mentor).count();
    let pending_approvals = snap
        .changes()
        .iter()
        .filter(|c| c.sme_id == viewer.id && c.status == ChangeStatus::Pending)
        .count();

    Ok(DashboardModel {
        viewer: UserSummary::of(snap, viewer),
        subject_id: scope.as_str().to_string(),
        overall_performance,
        overall_attendance,
        rows,
        chart,
        total_subordinates,
        mentors_in_scope,
        pending_approvals,
    })
}

pub fn open_profile(
    snap: &Snapshot,
    user_id: &str,
    scope: &Scope,
    decimals: u32,
) -> Result<ProfileModel, ViewError> {
    let user = snap
        .user(user_id)
        .ok_or_else(|| ViewError::UnknownUser(user_id.to_string()))?;
    let mut pass = RollupPass::new(snap);

    let mut team = Vec::new();
    for r in hierarchy::direct_reports(snap, &user.id) {
        team.push(metric_row(&mut pass, snap, r, scope, decimals)?);
    }

    let (scores, attendance_log) = if user.role == Role::Mentor {
        (
            snap.scores_for(&user.id).cloned().collect(),
            snap.attendance_for(&user.id).cloned().collect(),
        )
    } else {
        (Vec::new(), Vec::new())
    };

    Ok(ProfileModel {
        user: UserSummary::of(snap, user),
        subject_id: scope.as_str().to_string(),
        performance: round_to(pass.performance(&user.id, scope)?.value, decimals),
        attendance: round_to(pass.attendance(&user.id)?.value, decimals),
        breadcrumbs: hierarchy::breadcrumbs(snap, &user.id)
            .into_iter()
            .map(|u| UserSummary::of(snap, u))
            .collect(),
        team,
        scores,
        attendance_log,
    })
}
