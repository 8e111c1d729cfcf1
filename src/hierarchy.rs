use crate::model::{Role, Snapshot, User};
use std::collections::HashSet;

/// Users whose `reports_to` is `user_id`, in snapshot order. Unknown ids have no reports.
pub fn direct_reports<'a>(snap: &'a Snapshot, user_id: &str) -> Vec<&'a User> {
    snap.children_of(user_id).collect()
}

/// Mentors whose `sme_id` names this SME, independent of the reports-to tree.
pub fn assigned_mentors<'a>(snap: &'a Snapshot, sme_id: &str) -> Vec<&'a User> {
    snap.mentors_of_sme(sme_id).collect()
}

/// Everyone transitively below `user_id`, each report followed by its own subtree.
/// A user already emitted is never descended into again, so a cycle terminates.
pub fn subordinates<'a>(snap: &'a Snapshot, user_id: &str) -> Vec<&'a User> {
    let mut out = Vec::new();
    let mut seen: HashSet<&'a str> = HashSet::new();
    collect_subordinates(snap, user_id, user_id, &mut seen, &mut out);
    out
}

fn collect_subordinates<'a>(
    snap: &'a Snapshot,
    root: &str,
    user_id: &str,
    seen: &mut HashSet<&'a str>,
    out: &mut Vec<&'a User>,
) {
    for report in snap.children_of(user_id) {
        if report.id == root || !seen.insert(report.id.as_str()) {
            continue;
        }
        out.push(report);
        collect_subordinates(snap, root, &report.id, seen, out);
    }
}

/// Path from the topmost reachable ancestor down to `user_id` (inclusive).
pub fn breadcrumbs<'a>(snap: &'a Snapshot, user_id: &str) -> Vec<&'a User> {
    let mut path = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut current = snap.user(user_id);
    while let Some(u) = current {
        if !seen.insert(u.id.as_str()) {
            break;
        }
        path.push(u);
        current = u.reports_to.as_deref().and_then(|p| snap.user(p));
    }
    path.reverse();
    path
}

/// Users a viewer may see on their dashboard, the viewer first when included.
pub fn users_in_scope<'a>(snap: &'a Snapshot, viewer: &'a User) -> Vec<&'a User> {
    match viewer.role {
        Role::Admin | Role::Ceo => snap
            .users()
            .iter()
            .filter(|u| u.role != Role::Admin)
            .collect(),
        Role::Sme => {
            let mut out = vec![viewer];
            out.extend(assigned_mentors(snap, &viewer.id));
            out
        }
        _ => {
            let mut out = vec![viewer];
            out.extend(subordinates(snap, &viewer.id));
            out
        }
    }
}
