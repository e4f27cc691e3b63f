//! On-disk mirror of the permission cache for warm starts.
//!
//! A mirrored set is only ever used for optimistic rendering before the fresh
//! fetch completes. Entries written for another user, or older than the
//! configured maximum age, are ignored. Several sessions may share one
//! mirror; each write goes through its own temp file, so the last complete
//! write wins.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use super::PermissionSet;
use crate::error::Result;
use crate::rbac::models::UserId;

/// Persisted layout: `{ permissions, timestamp, user_id }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorEntry {
    /// Permission keys.
    pub permissions: Vec<String>,
    /// Write time, milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub user_id: UserId,
}

impl MirrorEntry {
    pub fn new(user_id: UserId, permissions: &PermissionSet) -> Self {
        Self {
            permissions: permissions.keys(),
            timestamp: Utc::now().timestamp_millis(),
            user_id,
        }
    }

    /// Whether the entry is older than `max_age` at `now_millis`.
    pub fn is_stale(&self, max_age: Duration, now_millis: i64) -> bool {
        let age = now_millis.saturating_sub(self.timestamp);
        age < 0 || age as u128 > max_age.as_millis()
    }
}

/// File-backed permission mirror.
#[derive(Debug, Clone)]
pub struct PermissionMirror {
    path: PathBuf,
    max_age: Duration,
}

impl PermissionMirror {
    pub fn new(path: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            path: path.into(),
            max_age,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the mirrored set for `user_id`.
    ///
    /// Returns `Ok(None)` when the file is missing, unreadable as JSON,
    /// belongs to another user, or is stale.
    pub async fn load(&self, user_id: &UserId) -> Result<Option<PermissionSet>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: MirrorEntry = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring corrupt permission mirror");
                return Ok(None);
            }
        };

        if &entry.user_id != user_id {
            debug!(
                mirrored = %entry.user_id,
                requested = %user_id,
                "Permission mirror belongs to another user"
            );
            return Ok(None);
        }
        if entry.is_stale(self.max_age, Utc::now().timestamp_millis()) {
            debug!(timestamp = entry.timestamp, "Permission mirror is stale");
            return Ok(None);
        }

        Ok(Some(PermissionSet::from_keys(&entry.permissions)))
    }

    /// Replace the mirror with `permissions` for `user_id`.
    pub async fn store(&self, user_id: &UserId, permissions: &PermissionSet) -> Result<()> {
        let entry = MirrorEntry::new(user_id.clone(), permissions);
        let body = serde_json::to_vec_pretty(&entry)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self
            .path
            .with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, body).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(path = %self.path.display(), count = entry.permissions.len(), "Permission mirror written");
        Ok(())
    }

    /// Remove the mirror file if present.
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::models::Permission;

    fn sample() -> PermissionSet {
        PermissionSet::from_keys(["user:read", "dashboard:access"])
    }

    #[tokio::test]
    async fn test_store_then_load_same_user() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = PermissionMirror::new(dir.path().join("perms.json"), Duration::from_secs(60));
        let user = UserId::new("7");

        mirror.store(&user, &sample()).await.unwrap();
        let loaded = mirror.load(&user).await.unwrap().unwrap();
        assert!(loaded.contains(&Permission::new("dashboard", "access")));
        assert_eq!(loaded.len(), 2);
    }

    #[tokio::test]
    async fn test_other_user_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = PermissionMirror::new(dir.path().join("perms.json"), Duration::from_secs(60));

        mirror.store(&UserId::new("7"), &sample()).await.unwrap();
        assert!(mirror.load(&UserId::new("8")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_and_corrupt_entries_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("perms.json");
        let mirror = PermissionMirror::new(&path, Duration::from_secs(60));
        let user = UserId::new("7");

        let old = MirrorEntry {
            permissions: vec!["user:read".into()],
            timestamp: Utc::now().timestamp_millis() - 120_000,
            user_id: user.clone(),
        };
        tokio::fs::write(&path, serde_json::to_vec(&old).unwrap()).await.unwrap();
        assert!(mirror.load(&user).await.unwrap().is_none());

        tokio::fs::write(&path, b"{not json").await.unwrap();
        assert!(mirror.load(&user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_file_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = PermissionMirror::new(dir.path().join("nested/perms.json"), Duration::from_secs(60));
        let user = UserId::new("1");

        assert!(mirror.load(&user).await.unwrap().is_none());
        mirror.store(&user, &sample()).await.unwrap();
        mirror.clear().await.unwrap();
        mirror.clear().await.unwrap();
        assert!(mirror.load(&user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_stores_leave_one_complete_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = PermissionMirror::new(dir.path().join("perms.json"), Duration::from_secs(60));
        let users: Vec<UserId> = (0..16).map(|i| UserId::new(i.to_string())).collect();

        let permissions = sample();
        let writes = users.iter().map(|user| mirror.store(user, &permissions));
        for result in futures::future::join_all(writes).await {
            result.unwrap();
        }

        let raw = tokio::fs::read(mirror.path()).await.unwrap();
        let entry: MirrorEntry = serde_json::from_slice(&raw).unwrap();
        assert!(users.contains(&entry.user_id));
        assert_eq!(entry.permissions.len(), 2);

        let mut leftovers = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(item) = leftovers.next_entry().await.unwrap() {
            names.push(item.file_name());
        }
        assert_eq!(names, vec![std::ffi::OsString::from("perms.json")]);
    }

    #[test]
    fn test_integer_user_id_decodes() {
        let entry: MirrorEntry =
            serde_json::from_str(r#"{"permissions":["user:read"],"timestamp":0,"user_id":42}"#)
                .unwrap();
        assert_eq!(entry.user_id, UserId::new("42"));
    }
}
