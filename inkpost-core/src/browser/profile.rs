use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::config::InkpostConfig;

use super::error::{BrowserError, BrowserResult};

/// Throwaway Chromium user-data directory for one run. Authentication state
/// survives restarts through the session store, not through the profile.
#[derive(Debug, Clone)]
pub struct BrowserProfile {
    id: String,
    path: PathBuf,
}

impl BrowserProfile {
    fn create(base_dir: &Path) -> BrowserResult<Self> {
        let id = Uuid::new_v4().to_string();
        let path = base_dir.join(&id);
        std::fs::create_dir_all(&path)
            .map_err(|err| BrowserError::Profile(format!("failed to create profile dir: {err}")))?;
        Ok(Self { id, path })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn touch(&self) -> BrowserResult<()> {
        let marker = self.path.join(".last_used");
        let mut file = fs::File::create(&marker).await.map_err(|err| {
            BrowserError::Profile(format!("failed to write profile marker: {err}"))
        })?;
        file.write_all(Utc::now().to_rfc3339().as_bytes())
            .await
            .map_err(|err| BrowserError::Profile(format!("failed to update profile marker: {err}")))?;
        Ok(())
    }

    pub(crate) fn remove(&self) {
        if let Err(err) = std::fs::remove_dir_all(&self.path) {
            tracing::debug!(path = %self.path.display(), error = %err, "profile directory not removed");
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProfileManager {
    base_dir: PathBuf,
    ttl: Duration,
}

impl ProfileManager {
    pub fn new<P: AsRef<Path>>(base_dir: P, ttl: Duration) -> BrowserResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir).map_err(|err| {
            BrowserError::Profile(format!("failed to create profile base dir: {err}"))
        })?;
        Ok(Self { base_dir, ttl })
    }

    pub fn from_config(config: &InkpostConfig) -> BrowserResult<Self> {
        let base_dir = config.resolve_path(&config.chromium.profile_dir);
        let ttl = Duration::from_secs(config.chromium.profile_ttl_hours * 60 * 60);
        Self::new(base_dir, ttl)
    }

    pub fn allocate(&self) -> BrowserResult<BrowserProfile> {
        BrowserProfile::create(&self.base_dir)
    }

    /// Removes profile directories left behind by runs that never reached
    /// shutdown. Returns how many were removed.
    pub fn cleanup_expired(&self) -> BrowserResult<usize> {
        let now = SystemTime::now();
        let entries = std::fs::read_dir(&self.base_dir).map_err(|err| {
            BrowserError::Profile(format!("failed to list profile directory: {err}"))
        })?;
        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let modified = match entry.metadata().and_then(|metadata| metadata.modified()) {
                Ok(modified) => modified,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "failed to read profile metadata");
                    continue;
                }
            };
            if now.duration_since(modified).unwrap_or(Duration::ZERO) > self.ttl {
                match std::fs::remove_dir_all(&path) {
                    Ok(()) => removed += 1,
                    Err(err) => {
                        tracing::warn!(path = %path.display(), error = %err, "failed to remove expired profile")
                    }
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn allocate_creates_unique_directories() {
        let dir = tempdir().unwrap();
        let manager = ProfileManager::new(dir.path(), Duration::from_secs(3600)).unwrap();
        let first = manager.allocate().unwrap();
        let second = manager.allocate().unwrap();
        assert_ne!(first.id(), second.id());
        assert!(first.path().is_dir());
        first.remove();
        assert!(!first.path().exists());
        assert!(second.path().is_dir());
    }

    #[test]
    fn cleanup_keeps_fresh_profiles() {
        let dir = tempdir().unwrap();
        let manager = ProfileManager::new(dir.path(), Duration::from_secs(3600)).unwrap();
        let profile = manager.allocate().unwrap();
        assert_eq!(manager.cleanup_expired().unwrap(), 0);
        assert!(profile.path().exists());
    }
}
