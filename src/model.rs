use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "CEO")]
    Ceo,
    #[serde(rename = "PM")]
    Pm,
    #[serde(rename = "SME")]
    Sme,
    #[serde(rename = "L&D Manager")]
    LdManager,
    #[serde(rename = "Campus Manager")]
    CampusManager,
    #[serde(rename = "Campus In-charge")]
    CampusInCharge,
    Mentor,
    Admin,
}

/// How a role participates in a rollup. Decided once per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleKind {
    Leaf,
    Assignment,
    Tree,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "CEO" => Some(Self::Ceo),
            "PM" => Some(Self::Pm),
            "SME" => Some(Self::Sme),
            "L&D Manager" => Some(Self::LdManager),
            "Campus Manager" => Some(Self::CampusManager),
            "Campus In-charge" => Some(Self::CampusInCharge),
            "Mentor" => Some(Self::Mentor),
            "Admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ceo => "CEO",
            Self::Pm => "PM",
            Self::Sme => "SME",
            Self::LdManager => "L&D Manager",
            Self::CampusManager => "Campus Manager",
            Self::CampusInCharge => "Campus In-charge",
            Self::Mentor => "Mentor",
            Self::Admin => "Admin",
        }
    }

    /// 0 is the highest authority; Admin sits above the organisation as a sentinel.
    pub fn level(self) -> i32 {
        match self {
            Self::Admin => -1,
            Self::Ceo => 0,
            Self::Pm | Self::Sme | Self::LdManager => 1,
            Self::CampusManager => 2,
            Self::CampusInCharge => 3,
            Self::Mentor => 4,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Admin => "System Admin",
            Self::Ceo => "CEO",
            Self::Pm => "Program Manager",
            Self::Sme => "Subject Matter Expert",
            Self::LdManager => "L&D Manager",
            Self::CampusManager => "Campus Manager",
            Self::CampusInCharge => "Campus In-charge",
            Self::Mentor => "Mentor",
        }
    }

    pub fn kind(self) -> RoleKind {
        match self {
            Self::Mentor => RoleKind::Leaf,
            Self::Sme => RoleKind::Assignment,
            _ => RoleKind::Tree,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub employee_id: String,
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub reports_to: Option<String>,
    #[serde(default)]
    pub sme_id: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub campus: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

/// The free-form profile attributes that may be changed through the approval workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProfileField {
    Department,
    Campus,
    State,
}

impl ProfileField {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "department" => Some(Self::Department),
            "campus" => Some(Self::Campus),
            "state" => Some(Self::State),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Department => "department",
            Self::Campus => "campus",
            Self::State => "state",
        }
    }

    /// Column in the `users` table. Identical to the wire name today.
    pub fn column(self) -> &'static str {
        self.as_str()
    }

    pub fn get(self, user: &User) -> Option<&str> {
        match self {
            Self::Department => user.department.as_deref(),
            Self::Campus => user.campus.as_deref(),
            Self::State => user.state.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssessmentType {
    Test,
    Viva,
    Presentation,
}

impl AssessmentType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "Test" => Some(Self::Test),
            "Viva" => Some(Self::Viva),
            "Presentation" => Some(Self::Presentation),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Test => "Test",
            Self::Viva => "Viva",
            Self::Presentation => "Presentation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    pub id: String,
    pub mentor_id: String,
    pub subject_id: String,
    pub module: i64,
    #[serde(rename = "type")]
    pub assessment_type: AssessmentType,
    pub assessment_number: i64,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Leave,
    #[serde(rename = "Not Applicable")]
    NotApplicable,
}

impl AttendanceStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "Present" => Some(Self::Present),
            "Absent" => Some(Self::Absent),
            "Leave" => Some(Self::Leave),
            "Not Applicable" => Some(Self::NotApplicable),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "Present",
            Self::Absent => "Absent",
            Self::Leave => "Leave",
            Self::NotApplicable => "Not Applicable",
        }
    }

    /// Only Present/Absent enter the attendance ratio.
    pub fn is_countable(self) -> bool {
        matches!(self, Self::Present | Self::Absent)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub mentor_id: String,
    pub date: String,
    pub status: AttendanceStatus,
    pub recorded_by: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Pending,
    Approved,
    Rejected,
}

impl ChangeStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChange {
    pub id: String,
    pub proposed_by: String,
    pub mentor_id: String,
    #[serde(rename = "fieldToChange")]
    pub field: ProfileField,
    pub old_value: String,
    pub new_value: String,
    pub status: ChangeStatus,
    pub sme_id: String,
}

/// Read-only view of every collection, indexed by id. One snapshot backs one computation;
/// nothing in it is mutated after construction.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    users: Vec<User>,
    subjects: Vec<Subject>,
    scores: Vec<ScoreRecord>,
    attendance: Vec<AttendanceRecord>,
    changes: Vec<PendingChange>,
    user_idx: HashMap<String, usize>,
    children: HashMap<String, Vec<usize>>,
    sme_mentors: HashMap<String, Vec<usize>>,
    scores_by_mentor: HashMap<String, Vec<usize>>,
    attendance_by_mentor: HashMap<String, Vec<usize>>,
}

impl Snapshot {
    pub fn new(
        users: Vec<User>,
        subjects: Vec<Subject>,
        scores: Vec<ScoreRecord>,
        attendance: Vec<AttendanceRecord>,
        changes: Vec<PendingChange>,
    ) -> Self {
        let mut user_idx = HashMap::new();
        let mut children: HashMap<String, Vec<usize>> = HashMap::new();
        let mut sme_mentors: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, u) in users.iter().enumerate() {
            user_idx.insert(u.id.clone(), i);
            if let Some(parent) = u.reports_to.as_ref() {
                children.entry(parent.clone()).or_default().push(i);
            }
            if u.role == Role::Mentor {
                if let Some(sme) = u.sme_id.as_ref() {
                    sme_mentors.entry(sme.clone()).or_default().push(i);
                }
            }
        }

        let mut scores_by_mentor: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, s) in scores.iter().enumerate() {
            scores_by_mentor
                .entry(s.mentor_id.clone())
                .or_default()
                .push(i);
        }
        let mut attendance_by_mentor: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, a) in attendance.iter().enumerate() {
            attendance_by_mentor
                .entry(a.mentor_id.clone())
                .or_default()
                .push(i);
        }

        Self {
            users,
            subjects,
            scores,
            attendance,
            changes,
            user_idx,
            children,
            sme_mentors,
            scores_by_mentor,
            attendance_by_mentor,
        }
    }

    pub fn user(&self, id: &str) -> Option<&User> {
        self.user_idx.get(id).map(|&i| &self.users[i])
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }

    pub fn changes(&self) -> &[PendingChange] {
        &self.changes
    }

    pub(crate) fn children_of(&self, id: &str) -> impl Iterator<Item = &User> + '_ {
        self.children
            .get(id)
            .into_iter()
            .flatten()
            .map(|&i| &self.users[i])
    }

    pub(crate) fn mentors_of_sme(&self, id: &str) -> impl Iterator<Item = &User> + '_ {
        self.sme_mentors
            .get(id)
            .into_iter()
            .flatten()
            .map(|&i| &self.users[i])
    }

    pub fn scores_for(&self, mentor_id: &str) -> impl Iterator<Item = &ScoreRecord> + '_ {
        self.scores_by_mentor
            .get(mentor_id)
            .into_iter()
            .flatten()
            .map(|&i| &self.scores[i])
    }

    pub fn attendance_for(&self, mentor_id: &str) -> impl Iterator<Item = &AttendanceRecord> + '_ {
        self.attendance_by_mentor
            .get(mentor_id)
            .into_iter()
            .flatten()
            .map(|&i| &self.attendance[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_names_round_trip_through_serde() {
        let v = serde_json::to_value(Role::LdManager).expect("serialize");
        assert_eq!(v, serde_json::json!("L&D Manager"));
        let back: Role = serde_json::from_value(serde_json::json!("Campus In-charge")).expect("parse");
        assert_eq!(back, Role::CampusInCharge);
        assert_eq!(Role::parse("L&D Manager"), Some(Role::LdManager));
    }

    #[test]
    fn only_present_and_absent_are_countable() {
        assert!(AttendanceStatus::Present.is_countable());
        assert!(AttendanceStatus::Absent.is_countable());
        assert!(!AttendanceStatus::Leave.is_countable());
        assert!(!AttendanceStatus::NotApplicable.is_countable());
    }

    #[test]
    fn assignment_index_ignores_non_mentor_roles() {
        let users = vec![
            User {
                id: "sme".into(),
                employee_id: String::new(),
                name: "Sme".into(),
                role: Role::Sme,
                reports_to: None,
                sme_id: None,
                department: None,
                campus: None,
                state: None,
            },
            User {
                id: "cm".into(),
                employee_id: String::new(),
                name: "Campus".into(),
                role: Role::CampusManager,
                reports_to: None,
                sme_id: Some("sme".into()),
                department: None,
                campus: None,
                state: None,
            },
        ];
        let snap = Snapshot::new(users, vec![], vec![], vec![], vec![]);
        assert_eq!(snap.mentors_of_sme("sme").count(), 0);
    }
}
