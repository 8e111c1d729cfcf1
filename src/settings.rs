use crate::approval::ApprovalPolicy;
use crate::db;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupSection {
    Approvals,
    Dashboard,
}

impl SetupSection {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approvals" => Some(Self::Approvals),
            "dashboard" => Some(Self::Dashboard),
            _ => None,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::Approvals => "setup.approvals",
            Self::Dashboard => "setup.dashboard",
        }
    }

    pub fn all() -> [Self; 2] {
        [Self::Approvals, Self::Dashboard]
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Approvals => "approvals",
            Self::Dashboard => "dashboard",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Approvals => json!({
            "commitAttempts": 3,
            "adminMayResolve": true
        }),
        SetupSection::Dashboard => json!({
            "defaultSubject": "All",
            "decimals": 2
        }),
    }
}

fn parse_int_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let Some(n) = v.as_i64() else {
        return Err(format!("{} must be an integer", key));
    };
    if n < min || n > max {
        return Err(format!("{} must be between {} and {}", key, min, max));
    }
    Ok(n)
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be a boolean", key))
}

/// Validates every key of `patch` before touching `current`, so a bad patch changes nothing.
pub fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let mut accepted: Vec<(String, Value)> = Vec::with_capacity(patch.len());
    for (k, v) in patch {
        let value = match (section, k.as_str()) {
            (SetupSection::Approvals, "commitAttempts") => json!(parse_int_range(v, k, 1, 10)?),
            (SetupSection::Approvals, "adminMayResolve") => json!(parse_bool(v, k)?),
            (SetupSection::Dashboard, "defaultSubject") => {
                let Some(s) = v.as_str() else {
                    return Err(format!("{} must be a string", k));
                };
                let t = s.trim();
                if t.is_empty() {
                    json!("All")
                } else {
                    json!(t)
                }
            }
            (SetupSection::Dashboard, "decimals") => json!(parse_int_range(v, k, 0, 4)?),
            _ => return Err(format!("unknown {} field: {}", section.name(), k)),
        };
        accepted.push((k.clone(), value));
    }
    let Some(obj) = current.as_object_mut() else {
        return Err("section is not an object".to_string());
    };
    for (k, v) in accepted {
        obj.insert(k, v);
    }
    Ok(())
}

pub fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults.
            let _ = merge_section_patch(section, &mut current, saved_obj);
        }
    }
    Ok(current)
}

pub fn approval_policy(conn: &Connection) -> anyhow::Result<ApprovalPolicy> {
    let v = load_section(conn, SetupSection::Approvals)?;
    let defaults = ApprovalPolicy::default();
    Ok(ApprovalPolicy {
        commit_attempts: v
            .get("commitAttempts")
            .and_then(|n| n.as_u64())
            .map(|n| n as u32)
            .unwrap_or(defaults.commit_attempts),
        admin_may_resolve: v
            .get("adminMayResolve")
            .and_then(|b| b.as_bool())
            .unwrap_or(defaults.admin_may_resolve),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSettings {
    pub default_subject: String,
    pub decimals: u32,
}

pub fn dashboard_settings(conn: &Connection) -> anyhow::Result<DashboardSettings> {
    let v = load_section(conn, SetupSection::Dashboard)?;
    Ok(DashboardSettings {
        default_subject: v
            .get("defaultSubject")
            .and_then(|s| s.as_str())
            .unwrap_or("All")
            .to_string(),
        decimals: v
            .get("decimals")
            .and_then(|n| n.as_u64())
            .map(|n| n as u32)
            .unwrap_or(2),
    })
}
