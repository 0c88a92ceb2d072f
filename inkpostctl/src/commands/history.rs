use clap::Args;
use serde::Serialize;

use inkpost_core::{AuditLog, RunSummary};

use crate::{AppContext, DisplayFallback, Result};

#[derive(Args, Debug, Clone)]
pub struct HistoryArgs {
    /// Number of runs to show, newest first
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct RunHistory {
    pub rows: Vec<RunSummary>,
}

pub fn history(context: &AppContext, args: &HistoryArgs) -> Result<RunHistory> {
    let audit = AuditLog::from_config(context.config())?;
    Ok(RunHistory {
        rows: audit.recent_runs(args.limit)?,
    })
}

impl DisplayFallback for RunHistory {
    fn display(&self) -> String {
        if self.rows.is_empty() {
            return "No runs recorded".to_string();
        }
        self.rows
            .iter()
            .map(|row| {
                let state = if row.published {
                    "published"
                } else if row.saved {
                    "saved"
                } else {
                    "failed"
                };
                let mut line = format!(
                    "{} {} [{}] \"{}\" via {} ({} attempts)",
                    row.ts,
                    row.run_id,
                    state,
                    row.title,
                    row.auth_tier.as_deref().unwrap_or("-"),
                    row.attempts
                );
                if let Some(failure) = &row.failure {
                    line.push_str(&format!(": {failure}"));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
