use crate::db;
use crate::model::{ChangeStatus, PendingChange, ProfileField, Role, Snapshot};
use rusqlite::{Connection, ErrorCode};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }

    fn outcome(self) -> ChangeStatus {
        match self {
            Self::Approve => ChangeStatus::Approved,
            Self::Reject => ChangeStatus::Rejected,
        }
    }
}

/// One record-level write handed to the store as part of an all-or-nothing batch.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreWrite {
    UserField {
        user_id: String,
        field: ProfileField,
        value: String,
    },
    /// Only applies while the change is still pending in the store.
    ChangeStatus {
        change_id: String,
        status: ChangeStatus,
        resolved_at: String,
    },
}

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("store busy: {0}")]
    Busy(String),
    #[error("{entity} {id} no longer exists")]
    Missing { entity: &'static str, id: String },
    #[error("change {0} was resolved concurrently")]
    Stale(String),
    #[error("database error: {0}")]
    Database(rusqlite::Error),
}

impl CommitError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}

impl From<rusqlite::Error> for CommitError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(f, _)
                if f.code == ErrorCode::DatabaseBusy || f.code == ErrorCode::DatabaseLocked =>
            {
                Self::Busy(e.to_string())
            }
            _ => Self::Database(e),
        }
    }
}

/// Write side of the entity store as seen by the workflow.
pub trait CommitStore {
    /// Applies every write or none of them.
    fn commit(&self, writes: &[StoreWrite]) -> Result<(), CommitError>;

    fn create_change(&self, change: &PendingChange, created_at: &str) -> Result<(), CommitError>;
}

pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl CommitStore for SqliteStore<'_> {
    fn commit(&self, writes: &[StoreWrite]) -> Result<(), CommitError> {
        let tx = self.conn.unchecked_transaction()?;
        for w in writes {
            match w {
                StoreWrite::UserField {
                    user_id,
                    field,
                    value,
                } => {
                    let sql = format!("UPDATE users SET {} = ? WHERE id = ?", field.column());
                    let n = tx.execute(&sql, (value, user_id))?;
                    if n == 0 {
                        return Err(CommitError::Missing {
                            entity: "user",
                            id: user_id.clone(),
                        });
                    }
                }
                StoreWrite::ChangeStatus {
                    change_id,
                    status,
                    resolved_at,
                } => {
                    let n = tx.execute(
                        "UPDATE pending_changes SET status = ?, resolved_at = ?
                         WHERE id = ? AND status = 'pending'",
                        (status.as_str(), resolved_at, change_id),
                    )?;
                    if n == 0 {
                        return Err(CommitError::Stale(change_id.clone()));
                    }
                }
            }
        }
        // Dropping `tx` on any early return above rolls the whole batch back.
        tx.commit()?;
        Ok(())
    }

    fn create_change(&self, change: &PendingChange, created_at: &str) -> Result<(), CommitError> {
        db::insert_change(self.conn, change, created_at)?;
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("user {user_id} has no valid SME assignment")]
    InvalidAssignment { user_id: String },
    #[error("change {change_id} is already {status}")]
    AlreadyResolved { change_id: String, status: &'static str },
    #[error("change {change_id} not found")]
    NotFound { change_id: String },
    #[error("user {user_id} not found")]
    UnknownUser { user_id: String },
    #[error("user {user_id} may not {action}")]
    Unauthorized { user_id: String, action: &'static str },
    #[error("new value matches the current {field}")]
    Unchanged { field: &'static str },
    #[error("new value must not be blank")]
    EmptyValue,
    #[error("commit failed: {0}")]
    CommitFailed(#[source] CommitError),
}

impl ApprovalError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAssignment { .. } => "invalid_assignment",
            Self::AlreadyResolved { .. } => "already_resolved",
            Self::NotFound { .. } | Self::UnknownUser { .. } => "not_found",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Unchanged { .. } | Self::EmptyValue => "bad_params",
            Self::CommitFailed(_) => "commit_failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalPolicy {
    pub commit_attempts: u32,
    pub admin_may_resolve: bool,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            commit_attempts: 3,
            admin_may_resolve: true,
        }
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Records a pending edit of `field` on `target_id`, routed to the target's SME.
pub fn propose(
    snap: &Snapshot,
    store: &dyn CommitStore,
    target_id: &str,
    field: ProfileField,
    new_value: &str,
    proposer_id: &str,
) -> Result<PendingChange, ApprovalError> {
    let proposer = snap
        .user(proposer_id)
        .ok_or_else(|| ApprovalError::UnknownUser {
            user_id: proposer_id.to_string(),
        })?;
    if !matches!(proposer.role, Role::LdManager | Role::Admin) {
        return Err(ApprovalError::Unauthorized {
            user_id: proposer_id.to_string(),
            action: "propose profile changes",
        });
    }
    let target = snap
        .user(target_id)
        .ok_or_else(|| ApprovalError::UnknownUser {
            user_id: target_id.to_string(),
        })?;
    let sme_id = target
        .sme_id
        .as_deref()
        .filter(|id| snap.user(id).is_some())
        .ok_or_else(|| ApprovalError::InvalidAssignment {
            user_id: target_id.to_string(),
        })?;

    let new_value = new_value.trim();
    if new_value.is_empty() {
        return Err(ApprovalError::EmptyValue);
    }
    let current = field.get(target);
    if current == Some(new_value) {
        return Err(ApprovalError::Unchanged {
            field: field.as_str(),
        });
    }

    let change = PendingChange {
        id: Uuid::new_v4().to_string(),
        proposed_by: proposer_id.to_string(),
        mentor_id: target_id.to_string(),
        field,
        old_value: current.unwrap_or("N/A").to_string(),
        new_value: new_value.to_string(),
        status: ChangeStatus::Pending,
        sme_id: sme_id.to_string(),
    };
    store
        .create_change(&change, &now_rfc3339())
        .map_err(ApprovalError::CommitFailed)?;
    info!(
        change_id = %change.id,
        target = target_id,
        field = field.as_str(),
        sme = sme_id,
        "profile change proposed"
    );
    Ok(change)
}

/// Approves or rejects a pending change. Approval writes the field and the status in one
/// commit; a busy store is retried from the start, never resumed.
pub fn resolve(
    snap: &Snapshot,
    store: &dyn CommitStore,
    change_id: &str,
    decision: Decision,
    approver_id: &str,
    policy: &ApprovalPolicy,
) -> Result<PendingChange, ApprovalError> {
    let change = snap
        .changes()
        .iter()
        .find(|c| c.id == change_id)
        .ok_or_else(|| ApprovalError::NotFound {
            change_id: change_id.to_string(),
        })?;
    if change.status != ChangeStatus::Pending {
        return Err(ApprovalError::AlreadyResolved {
            change_id: change_id.to_string(),
            status: change.status.as_str(),
        });
    }

    let authorized = match snap.user(approver_id) {
        Some(u) if u.id == change.sme_id => true,
        Some(u) => policy.admin_may_resolve && u.role == Role::Admin,
        None => false,
    };
    if !authorized {
        return Err(ApprovalError::Unauthorized {
            user_id: approver_id.to_string(),
            action: "resolve this change",
        });
    }

    let status = decision.outcome();
    let mut writes = Vec::with_capacity(2);
    if decision == Decision::Approve {
        writes.push(StoreWrite::UserField {
            user_id: change.mentor_id.clone(),
            field: change.field,
            value: change.new_value.clone(),
        });
    }
    writes.push(StoreWrite::ChangeStatus {
        change_id: change.id.clone(),
        status,
        resolved_at: now_rfc3339(),
    });

    let attempts = policy.commit_attempts.max(1);
    let mut attempt = 1;
    loop {
        match store.commit(&writes) {
            Ok(()) => break,
            Err(e) if e.is_retryable() && attempt < attempts => {
                warn!(change_id, attempt, error = %e, "approval commit retry");
                attempt += 1;
            }
            Err(CommitError::Stale(_)) => {
                return Err(ApprovalError::AlreadyResolved {
                    change_id: change_id.to_string(),
                    status: "resolved",
                });
            }
            Err(e) => {
                warn!(change_id, error = %e, "approval commit failed");
                return Err(ApprovalError::CommitFailed(e));
            }
        }
    }

    info!(change_id, status = status.as_str(), approver = approver_id, "change resolved");
    Ok(PendingChange {
        status,
        ..change.clone()
    })
}
