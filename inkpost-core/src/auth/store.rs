use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::browser::{storage_snapshot, BrowserSession};
use crate::config::InkpostConfig;

use super::artifact::{DomainScope, OriginKind, SessionArtifact, StoredArtifact};

#[derive(Debug, Error)]
enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to persist {path}: {source}")]
    Persist {
        source: tempfile::PersistError,
        path: PathBuf,
    },
}

/// Durable per-target session artifacts. Every operation reports failure
/// through its return value; none of them propagate errors.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
    target_id: String,
    scope: DomainScope,
    capture_storage: bool,
}

impl SessionStore {
    pub fn new<P: AsRef<Path>>(
        dir: P,
        target_id: impl Into<String>,
        scope: DomainScope,
        capture_storage: bool,
    ) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            target_id: target_id.into(),
            scope,
            capture_storage,
        }
    }

    pub fn from_config(config: &InkpostConfig) -> Self {
        Self::new(
            config.resolve_path(&config.session.store_dir),
            config.target.id.clone(),
            DomainScope::from_config(config),
            config.session.capture_storage,
        )
    }

    pub fn scope(&self) -> &DomainScope {
        &self.scope
    }

    pub fn cookie_path(&self) -> PathBuf {
        self.dir.join(format!("{}.cookies.json", self.target_id))
    }

    pub fn storage_path(&self) -> PathBuf {
        self.dir.join(format!("{}.storage.json", self.target_id))
    }

    /// Captures target-scoped artifacts from the live session. Returns
    /// `false` when nothing usable was captured or the write failed.
    pub async fn save(&self, session: &mut dyn BrowserSession) -> bool {
        let cookies = match session.cookies().await {
            Ok(cookies) => cookies,
            Err(err) => {
                warn!(target_id = %self.target_id, error = %err, "failed to read cookies for session capture");
                return false;
            }
        };
        let total = cookies.len();
        let cookie_artifacts: Vec<SessionArtifact> = cookies
            .iter()
            .filter_map(|cookie| self.scope.artifact_from_cookie(cookie))
            .collect();
        debug!(total, kept = cookie_artifacts.len(), "filtered cookies to target scope");

        let storage_artifacts = if self.capture_storage {
            self.capture_storage_entries(session).await
        } else {
            Vec::new()
        };

        if cookie_artifacts.is_empty() && storage_artifacts.is_empty() {
            info!(target_id = %self.target_id, "no target-scoped artifacts to save");
            return false;
        }

        let written = self
            .write_atomic(&self.cookie_path(), &cookie_artifacts)
            .and_then(|_| self.write_atomic(&self.storage_path(), &storage_artifacts));
        match written {
            Ok(()) => {
                info!(
                    target_id = %self.target_id,
                    cookies = cookie_artifacts.len(),
                    storage = storage_artifacts.len(),
                    "session artifacts saved"
                );
                true
            }
            Err(err) => {
                warn!(target_id = %self.target_id, error = %err, "failed to write session artifacts");
                false
            }
        }
    }

    async fn capture_storage_entries(&self, session: &mut dyn BrowserSession) -> Vec<SessionArtifact> {
        // Local storage is origin-bound; only capture it on a target page.
        let on_target = session
            .current_url()
            .await
            .map(|url| self.scope.matches_url(&url))
            .unwrap_or(false);
        if !on_target {
            return Vec::new();
        }
        match storage_snapshot(session).await {
            Ok(entries) => entries
                .into_iter()
                .filter(|(key, _)| !key.is_empty())
                .map(|(key, value)| SessionArtifact::storage(key, value, self.scope.canonical()))
                .collect(),
            Err(err) => {
                warn!(error = %err, "local storage snapshot failed; saving cookies only");
                Vec::new()
            }
        }
    }

    /// Artifacts previously saved for this target, cookies first. Missing or
    /// unreadable files yield an empty list.
    pub fn load(&self) -> Vec<SessionArtifact> {
        let mut artifacts = self.read_file(&self.cookie_path(), OriginKind::Cookie);
        artifacts.extend(self.read_file(&self.storage_path(), OriginKind::Storage));
        artifacts
    }

    pub fn exists(&self) -> bool {
        self.cookie_path().is_file() || self.storage_path().is_file()
    }

    /// Removes both files. Returns `true` when at least one stored file was
    /// removed; an absent store or a failed removal returns `false`.
    pub fn clear(&self) -> bool {
        let mut removed_any = false;
        for path in [self.cookie_path(), self.storage_path()] {
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), "removed session file");
                    removed_any = true;
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to remove session file");
                }
            }
        }
        removed_any
    }

    fn read_file(&self, path: &Path, origin: OriginKind) -> Vec<SessionArtifact> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read session file");
                return Vec::new();
            }
        };
        let records: Vec<Value> = match serde_json::from_str(&content) {
            Ok(records) => records,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "session file is not a json array");
                return Vec::new();
            }
        };
        records
            .into_iter()
            .filter_map(|record| {
                let artifact = serde_json::from_value::<StoredArtifact>(record)
                    .ok()
                    .and_then(|stored| stored.into_artifact(&self.scope, origin));
                if artifact.is_none() {
                    warn!(path = %path.display(), "dropping malformed session artifact");
                }
                artifact
            })
            .collect()
    }

    fn write_atomic(&self, path: &Path, artifacts: &[SessionArtifact]) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            source,
            path: self.dir.clone(),
        })?;
        let body = serde_json::to_vec_pretty(artifacts)?;
        let mut file = NamedTempFile::new_in(&self.dir).map_err(|source| StoreError::Io {
            source,
            path: self.dir.clone(),
        })?;
        file.write_all(&body)
            .and_then(|_| file.as_file().sync_all())
            .map_err(|source| StoreError::Io {
                source,
                path: file.path().to_path_buf(),
            })?;
        file.persist(path).map_err(|source| StoreError::Persist {
            source,
            path: path.to_path_buf(),
        })?;
        Ok(())
    }
}
