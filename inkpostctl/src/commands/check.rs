use std::env;
use std::fmt;
use std::fs;
use std::path::Path;

use rusqlite::{Connection, OpenFlags};
use serde::Serialize;

use inkpost_core::SessionStore;

use crate::{AppContext, AppError, DisplayFallback, Result};

#[derive(Debug, Serialize)]
pub struct CheckEntry {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheckStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "error")]
    Error,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warn => "WARN",
            CheckStatus::Error => "ERROR",
        };
        write!(f, "{}", label)
    }
}

impl CheckEntry {
    fn ok(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::with(name, CheckStatus::Ok, detail)
    }

    fn warn(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::with(name, CheckStatus::Warn, detail)
    }

    fn error(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::with(name, CheckStatus::Error, detail)
    }

    fn with(name: impl Into<String>, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            detail: detail.into(),
        }
    }
}

impl DisplayFallback for CheckEntry {
    fn display(&self) -> String {
        format!("[{}] {}: {}", self.status, self.name, self.detail)
    }
}

pub fn run_checks(context: &AppContext) -> Vec<CheckEntry> {
    let config = context.config();
    let mut results = vec![check_path("inkpost.toml", context.config_path())];

    results.push(check_path(
        "chromium",
        &config.resolve_path(&config.chromium.executable_path),
    ));
    results.push(check_directory(
        "profiles",
        &config.resolve_path(&config.chromium.profile_dir),
    ));

    let store = SessionStore::from_config(config);
    results.push(if store.exists() {
        CheckEntry::ok("session", format!("{}", store.cookie_path().display()))
    } else {
        CheckEntry::warn("session", "no stored session; first run will need to sign in")
    });

    results.push(check_database(
        "audit.sqlite",
        &config.resolve_path(&config.observability.audit_db),
    ));

    results.push(match &config.credentials {
        Some(section) => {
            let missing: Vec<&str> = [section.username_env.as_str(), section.password_env.as_str()]
                .into_iter()
                .filter(|name| env::var(name).map(|value| value.is_empty()).unwrap_or(true))
                .collect();
            if missing.is_empty() {
                CheckEntry::ok("credentials", "environment variables set")
            } else {
                CheckEntry::warn("credentials", format!("unset: {}", missing.join(", ")))
            }
        }
        None => CheckEntry::warn("credentials", "not configured; tier skipped"),
    });

    results.push(match &config.generation {
        Some(section) => CheckEntry::ok("generation", section.endpoint.clone()),
        None => CheckEntry::warn("generation", "not configured; --topic unavailable"),
    });
    results.push(match &config.images {
        Some(section) => CheckEntry::ok("images", section.endpoint.clone()),
        None => CheckEntry::warn("images", "not configured"),
    });

    results
}

pub fn any_failed(entries: &[CheckEntry]) -> bool {
    entries
        .iter()
        .any(|entry| entry.status == CheckStatus::Error)
}

fn check_path(name: &str, path: &Path) -> CheckEntry {
    if path.exists() {
        CheckEntry::ok(name, format!("{}", path.display()))
    } else {
        CheckEntry::error(name, format!("{} missing", path.display()))
    }
}

fn check_directory(name: &str, path: &Path) -> CheckEntry {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => CheckEntry::ok(name, format!("{}", path.display())),
        Ok(_) => CheckEntry::warn(name, format!("{} is not a directory", path.display())),
        Err(_) => CheckEntry::warn(name, format!("{} not created yet", path.display())),
    }
}

fn check_database(name: &str, path: &Path) -> CheckEntry {
    if !path.exists() {
        return CheckEntry::warn(name, format!("{} not created yet", path.display()));
    }
    match open_read_only(path) {
        Ok(conn) => {
            let pragma: rusqlite::Result<String> =
                conn.query_row("PRAGMA integrity_check;", [], |row| row.get(0));
            match pragma {
                Ok(result) if result.eq_ignore_ascii_case("ok") => CheckEntry::ok(name, "integrity ok"),
                Ok(result) => CheckEntry::warn(name, format!("integrity_check: {result}")),
                Err(err) => CheckEntry::warn(name, format!("query failed: {err}")),
            }
        }
        Err(err) => CheckEntry::error(name, format!("open failed: {err}")),
    }
}

fn open_read_only(path: &Path) -> Result<Connection> {
    Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY).map_err(AppError::from)
}
