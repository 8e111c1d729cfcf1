use crate::hierarchy;
use crate::model::{AttendanceStatus, RoleKind, Snapshot, User};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, warn};

/// Aggregated metric for one node. `weight` counts the mentors backing `value` and is only
/// used to combine siblings; a weight of 0 means "no signal".
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Rollup {
    pub value: f64,
    pub weight: usize,
}

impl Rollup {
    pub const EMPTY: Rollup = Rollup {
        value: 0.0,
        weight: 0,
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    All,
    Subject(String),
}

impl Scope {
    /// `None`, blank and any casing of "All" mean every subject.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None => Self::All,
            Some(t) if t.is_empty() || t.eq_ignore_ascii_case("all") => Self::All,
            Some(t) => Self::Subject(t.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::All => "All",
            Self::Subject(id) => id,
        }
    }

    fn matches(&self, subject_id: &str) -> bool {
        match self {
            Self::All => true,
            Self::Subject(id) => id == subject_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Performance,
    Attendance,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RollupError {
    #[error("reports-to relation loops back to user {user_id}")]
    MalformedHierarchy { user_id: String },
}

impl RollupError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedHierarchy { .. } => "malformed_hierarchy",
        }
    }
}

type PassKey = (Metric, Scope, String);

/// One memoised traversal over a single snapshot. Create a fresh pass per top-level request;
/// the cache never outlives the snapshot it was filled from.
pub struct RollupPass<'a> {
    snap: &'a Snapshot,
    memo: HashMap<PassKey, Rollup>,
    in_progress: HashSet<PassKey>,
}

impl<'a> RollupPass<'a> {
    pub fn new(snap: &'a Snapshot) -> Self {
        Self {
            snap,
            memo: HashMap::new(),
            in_progress: HashSet::new(),
        }
    }

    pub fn performance(&mut self, user_id: &str, scope: &Scope) -> Result<Rollup, RollupError> {
        self.compute(Metric::Performance, scope, user_id)
    }

    pub fn attendance(&mut self, user_id: &str) -> Result<Rollup, RollupError> {
        // Attendance has no subject dimension.
        self.compute(Metric::Attendance, &Scope::All, user_id)
    }

    pub fn cached_nodes(&self) -> usize {
        self.memo.len()
    }

    fn compute(
        &mut self,
        metric: Metric,
        scope: &Scope,
        user_id: &str,
    ) -> Result<Rollup, RollupError> {
        let key = (metric, scope.clone(), user_id.to_string());
        if let Some(hit) = self.memo.get(&key) {
            return Ok(*hit);
        }
        let snap = self.snap;
        let Some(user) = snap.user(user_id) else {
            return Ok(Rollup::EMPTY);
        };
        if !self.in_progress.insert(key.clone()) {
            warn!(user_id, "cycle detected during rollup");
            return Err(RollupError::MalformedHierarchy {
                user_id: user_id.to_string(),
            });
        }

        let result = match (user.role.kind(), metric) {
            (RoleKind::Leaf, Metric::Performance) => Ok(leaf_performance(snap, user, scope)),
            (RoleKind::Leaf, Metric::Attendance) => Ok(leaf_attendance(snap, user)),
            (RoleKind::Assignment, Metric::Performance) => self.sme_performance(user, scope),
            (RoleKind::Assignment, Metric::Attendance) => self.sme_attendance(user),
            (RoleKind::Tree, _) => self.tree(metric, scope, user),
        };

        self.in_progress.remove(&key);
        let rollup = result?;
        self.memo.insert(key, rollup);
        Ok(rollup)
    }

    fn sme_performance(&mut self, sme: &User, scope: &Scope) -> Result<Rollup, RollupError> {
        let mentors = hierarchy::assigned_mentors(self.snap, &sme.id);
        if mentors.is_empty() {
            return Ok(Rollup::EMPTY);
        }
        // Every assigned mentor counts once, including those without scores.
        let mut sum = 0.0_f64;
        for m in &mentors {
            sum += self.compute(Metric::Performance, scope, &m.id)?.value;
        }
        Ok(Rollup {
            value: sum / (mentors.len() as f64),
            weight: mentors.len(),
        })
    }

    fn sme_attendance(&mut self, sme: &User) -> Result<Rollup, RollupError> {
        let mut mentor_ids = tree_mentor_ids(self.snap, &sme.id)?;
        for m in hierarchy::assigned_mentors(self.snap, &sme.id) {
            if !mentor_ids.contains(&m.id) {
                mentor_ids.push(m.id.clone());
            }
        }
        let mut parts = Vec::with_capacity(mentor_ids.len());
        for id in &mentor_ids {
            parts.push(self.compute(Metric::Attendance, &Scope::All, id)?);
        }
        Ok(weighted_mean(parts))
    }

    fn tree(&mut self, metric: Metric, scope: &Scope, user: &User) -> Result<Rollup, RollupError> {
        let reports = hierarchy::direct_reports(self.snap, &user.id);
        let mut parts = Vec::with_capacity(reports.len());
        for r in reports {
            parts.push(self.compute(metric, scope, &r.id)?);
        }
        Ok(weighted_mean(parts))
    }
}

/// Sum of value x weight over weight, skipping parts that carry no signal.
pub fn weighted_mean<I>(parts: I) -> Rollup
where
    I: IntoIterator<Item = Rollup>,
{
    let mut sum = 0.0_f64;
    let mut weight: usize = 0;
    for p in parts {
        if p.weight == 0 {
            continue;
        }
        sum += p.value * (p.weight as f64);
        weight += p.weight;
    }
    if weight == 0 {
        return Rollup::EMPTY;
    }
    Rollup {
        value: sum / (weight as f64),
        weight,
    }
}

fn leaf_performance(snap: &Snapshot, mentor: &User, scope: &Scope) -> Rollup {
    let mut sum = 0.0_f64;
    let mut n: usize = 0;
    for s in snap.scores_for(&mentor.id) {
        if scope.matches(&s.subject_id) {
            sum += s.score;
            n += 1;
        }
    }
    if n == 0 {
        return Rollup::EMPTY;
    }
    Rollup {
        value: sum / (n as f64),
        weight: 1,
    }
}

fn leaf_attendance(snap: &Snapshot, mentor: &User) -> Rollup {
    let mut present: usize = 0;
    let mut counted: usize = 0;
    for a in snap.attendance_for(&mentor.id) {
        if !a.status.is_countable() {
            continue;
        }
        counted += 1;
        if a.status == AttendanceStatus::Present {
            present += 1;
        }
    }
    if counted == 0 {
        return Rollup::EMPTY;
    }
    Rollup {
        value: 100.0 * (present as f64) / (counted as f64),
        weight: 1,
    }
}

/// Mentors anywhere in the reports-to subtree under `root_id`. In a forest no node is reached
/// twice from one root, so a repeat means the input contains a cycle.
fn tree_mentor_ids(snap: &Snapshot, root_id: &str) -> Result<Vec<String>, RollupError> {
    let mut out = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&User> = hierarchy::direct_reports(snap, root_id);
    stack.reverse();
    while let Some(u) = stack.pop() {
        if u.id == root_id || !seen.insert(u.id.as_str()) {
            warn!(user_id = %u.id, "cycle detected below {}", root_id);
            return Err(RollupError::MalformedHierarchy {
                user_id: u.id.clone(),
            });
        }
        if u.role.kind() == RoleKind::Leaf {
            out.push(u.id.clone());
            continue;
        }
        let mut children = hierarchy::direct_reports(snap, &u.id);
        children.reverse();
        stack.extend(children);
    }
    Ok(out)
}

pub fn rollup_performance(
    snap: &Snapshot,
    user_id: &str,
    scope: &Scope,
) -> Result<Rollup, RollupError> {
    let mut pass = RollupPass::new(snap);
    let result = pass.performance(user_id, scope);
    debug!(
        user_id,
        scope = scope.as_str(),
        nodes = pass.cached_nodes(),
        "performance rollup"
    );
    result
}

pub fn rollup_attendance(snap: &Snapshot, user_id: &str) -> Result<Rollup, RollupError> {
    let mut pass = RollupPass::new(snap);
    let result = pass.attendance(user_id);
    debug!(user_id, nodes = pass.cached_nodes(), "attendance rollup");
    result
}
