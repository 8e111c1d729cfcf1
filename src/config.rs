use std::path::PathBuf;

pub const LOG_ENV: &str = "MENTORBOOKD_LOG";
pub const WORKSPACE_ENV: &str = "MENTORBOOKD_WORKSPACE";
pub const DEFAULT_LOG_FILTER: &str = "mentorbookd=info";

/// Process-level settings. Workspace-level settings live in the database (see `settings`).
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub log_filter: String,
    pub workspace: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let log_filter = lookup(LOG_ENV)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
        let workspace = lookup(WORKSPACE_ENV)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self {
            log_filter,
            workspace,
        }
    }
}
