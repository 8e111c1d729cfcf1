use crate::model::{
    AssessmentType, AttendanceRecord, AttendanceStatus, Role, ScoreRecord, Snapshot, User,
};

pub fn user(id: &str, role: Role, reports_to: Option<&str>, sme_id: Option<&str>) -> User {
    User {
        id: id.to_string(),
        employee_id: format!("EMP-{}", id),
        name: id.to_string(),
        role,
        reports_to: reports_to.map(str::to_string),
        sme_id: sme_id.map(str::to_string),
        department: None,
        campus: None,
        state: None,
    }
}

pub fn score(mentor_id: &str, subject_id: &str, value: f64) -> ScoreRecord {
    ScoreRecord {
        id: format!("s-{}-{}-{}", mentor_id, subject_id, value),
        mentor_id: mentor_id.to_string(),
        subject_id: subject_id.to_string(),
        module: 1,
        assessment_type: AssessmentType::Test,
        assessment_number: 1,
        score: value,
    }
}

pub fn attendance(mentor_id: &str, date: &str, status: AttendanceStatus) -> AttendanceRecord {
    AttendanceRecord {
        id: format!("a-{}-{}", mentor_id, date),
        mentor_id: mentor_id.to_string(),
        date: date.to_string(),
        status,
        recorded_by: "sme".to_string(),
    }
}

pub fn snapshot(users: Vec<User>) -> Snapshot {
    Snapshot::new(users, vec![], vec![], vec![], vec![])
}

pub fn snapshot_with(
    users: Vec<User>,
    scores: Vec<ScoreRecord>,
    attendance: Vec<AttendanceRecord>,
) -> Snapshot {
    Snapshot::new(users, vec![], scores, attendance, vec![])
}
