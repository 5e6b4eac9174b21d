use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ribbon_shared::constants::SNAPSHOT_ID_PREFIX_LEN;
use ribbon_shared::types::BadgePair;

use crate::error::{Result, StoreError};

const FILE_PREFIX: &str = "profile_badges_";
const FILE_SUFFIX: &str = ".json";
const TEMP_PREFIX: &str = ".tmp-";
/// Attempts at claiming a fresh sequence number when another writer races us.
const MAX_NAME_ATTEMPTS: usize = 64;

/// One immutable badge set snapshot as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSnapshot {
    pub sequence: u64,
    /// RFC 3339 write time.
    pub timestamp: String,
    pub associated_record_id: String,
    pub owner_key: String,
    pub badge_pairs: Vec<BadgePair>,
    pub total_badges: usize,
}

/// A snapshot file found in the store directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub sequence: u64,
    pub path: PathBuf,
}

/// Append-only snapshot journal rooted at one directory.
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    /// Use `dir` as the snapshot directory. It is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Open the store in the platform data directory.
    pub fn open_default() -> Result<Self> {
        let dir = Self::default_dir()?;
        tracing::info!(path = %dir.display(), "opening backup store");
        Ok(Self::new(dir))
    }

    /// `<platform data dir>/badge_backups`.
    pub fn default_dir() -> Result<PathBuf> {
        let project_dirs =
            ProjectDirs::from("com", "ribbon", "ribbon").ok_or(StoreError::NoDataDir)?;
        Ok(project_dirs.data_dir().join("badge_backups"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a new snapshot and return its path.
    ///
    /// The body is written and synced to a private temporary file, then
    /// hard-linked under its final name. Linking fails instead of replacing
    /// an existing file, so a published snapshot is never overwritten and a
    /// crash mid-write leaves at most a stray temporary file.
    pub fn snapshot(
        &self,
        pairs: &[BadgePair],
        owner_key: &str,
        associated_id: &str,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let now = chrono::Utc::now();
        let temp_path = self
            .dir
            .join(format!("{TEMP_PREFIX}{}{FILE_SUFFIX}", Uuid::new_v4().simple()));

        let result = self.link_snapshot(&temp_path, pairs, owner_key, associated_id, now);

        if let Err(e) = fs::remove_file(&temp_path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %temp_path.display(), error = %e, "failed to remove temp snapshot");
            }
        }

        let path = result?;
        tracing::info!(
            path = %path.display(),
            badges = pairs.len(),
            "snapshot written"
        );
        Ok(path)
    }

    /// All snapshot files, oldest first.
    pub fn list(&self) -> Result<Vec<SnapshotEntry>> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            let name = entry.file_name();
            let Some(sequence) = name.to_str().and_then(parse_sequence) else {
                continue;
            };
            entries.push(SnapshotEntry {
                sequence,
                path: entry.path(),
            });
        }
        entries.sort_by_key(|e| e.sequence);
        Ok(entries)
    }

    /// The most recently written snapshot that can still be read.
    pub fn latest_snapshot(&self) -> Result<Option<BackupSnapshot>> {
        self.newest_where(|_| true)
    }

    /// Pairs of the most recently written snapshot, if any.
    pub fn latest(&self) -> Result<Option<Vec<BadgePair>>> {
        Ok(self.latest_snapshot()?.map(|s| s.badge_pairs))
    }

    /// Pairs of the most recently written snapshot taken for `owner_key`.
    pub fn latest_for_owner(&self, owner_key: &str) -> Result<Option<Vec<BadgePair>>> {
        Ok(self
            .newest_where(|s| s.owner_key == owner_key)?
            .map(|s| s.badge_pairs))
    }

    fn newest_where(
        &self,
        wanted: impl Fn(&BackupSnapshot) -> bool,
    ) -> Result<Option<BackupSnapshot>> {
        for entry in self.list()?.into_iter().rev() {
            match read_snapshot(&entry.path) {
                Ok(snapshot) if wanted(&snapshot) => return Ok(Some(snapshot)),
                Ok(snapshot) => {
                    tracing::debug!(sequence = snapshot.sequence, "skipping snapshot of another owner");
                }
                Err(e) => {
                    tracing::warn!(path = %entry.path.display(), error = %e, "skipping unreadable snapshot");
                }
            }
        }
        Ok(None)
    }

    /// Delete all but the `keep` newest snapshots. Returns how many were removed.
    ///
    /// A file that vanished between listing and deletion counts as pruned.
    pub fn prune(&self, keep: usize) -> Result<usize> {
        let entries = self.list()?;
        self.prune_entries(entries, keep)
    }

    fn prune_entries(&self, entries: Vec<SnapshotEntry>, keep: usize) -> Result<usize> {
        let excess = entries.len().saturating_sub(keep);

        let mut removed = 0;
        for entry in entries.into_iter().take(excess) {
            match fs::remove_file(&entry.path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if removed > 0 {
            tracing::info!(removed, keep, "pruned old snapshots");
        }
        Ok(removed)
    }

    fn link_snapshot(
        &self,
        temp_path: &Path,
        pairs: &[BadgePair],
        owner_key: &str,
        associated_id: &str,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<PathBuf> {
        let id_prefix = id_prefix(associated_id);
        let mut sequence = self.next_sequence()?;

        for _ in 0..MAX_NAME_ATTEMPTS {
            let snapshot = BackupSnapshot {
                sequence,
                timestamp: now.to_rfc3339(),
                associated_record_id: associated_id.to_string(),
                owner_key: owner_key.to_string(),
                badge_pairs: pairs.to_vec(),
                total_badges: pairs.len(),
            };
            write_synced(temp_path, &serde_json::to_vec_pretty(&snapshot)?)?;

            let name = format!(
                "{FILE_PREFIX}{sequence:010}_{}_{id_prefix}{FILE_SUFFIX}",
                now.timestamp()
            );
            let final_path = self.dir.join(name);
            match fs::hard_link(temp_path, &final_path) {
                Ok(()) => return Ok(final_path),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    tracing::debug!(sequence, "snapshot name taken, retrying");
                    sequence = self.next_sequence()?.max(sequence + 1);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::NameExhausted(MAX_NAME_ATTEMPTS))
    }

    fn next_sequence(&self) -> Result<u64> {
        Ok(self.list()?.last().map_or(1, |e| e.sequence + 1))
    }
}

fn read_snapshot(path: &Path) -> Result<BackupSnapshot> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Filesystem-safe prefix of a record id for the snapshot name.
fn id_prefix(id: &str) -> String {
    let prefix: String = id
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(SNAPSHOT_ID_PREFIX_LEN)
        .collect();
    if prefix.is_empty() {
        "none".to_string()
    } else {
        prefix
    }
}

/// `profile_badges_<seq>_<ts>_<id>.json` -> `seq`.
fn parse_sequence(name: &str) -> Option<u64> {
    let stem = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    let mut parts = stem.split('_');
    let sequence = parts.next()?.parse().ok()?;
    parts.next()?.parse::<i64>().ok()?;
    parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some(sequence)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(n: u8) -> BadgePair {
        BadgePair::new(
            format!("30009:{}:badge{n}", "a".repeat(64)),
            format!("{:02x}", n).repeat(32),
        )
    }

    #[test]
    fn test_empty_store_has_no_latest() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path().join("missing"));
        assert!(store.list().unwrap().is_empty());
        assert_eq!(store.latest().unwrap(), None);
        assert_eq!(store.prune(5).unwrap(), 0);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path());

        let pairs = vec![pair(1), pair(2)];
        let path = store.snapshot(&pairs, &"c".repeat(64), "deadbeefcafe").unwrap();

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("profile_badges_0000000001_"));
        assert!(name.ends_with("_deadbeef.json"));

        let snapshot = store.latest_snapshot().unwrap().unwrap();
        assert_eq!(snapshot.sequence, 1);
        assert_eq!(snapshot.badge_pairs, pairs);
        assert_eq!(snapshot.total_badges, 2);
        assert_eq!(snapshot.associated_record_id, "deadbeefcafe");
    }

    #[test]
    fn test_snapshot_file_uses_camel_case_and_pair_arrays() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path());
        let path = store.snapshot(&[pair(1)], "owner", "id").unwrap();

        let value: serde_json::Value =
            serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        assert_eq!(value["associatedRecordId"], "id");
        assert_eq!(value["ownerKey"], "owner");
        assert_eq!(value["totalBadges"], 1);
        assert!(value["badgePairs"][0].is_array());
    }

    #[test]
    fn test_rapid_writes_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path());

        // Same second, same id prefix: only the sequence tells them apart.
        for n in 0..10 {
            store.snapshot(&[pair(n)], "owner", "sameid00").unwrap();
        }
        let entries = store.list().unwrap();
        assert_eq!(entries.len(), 10);
        let sequences: Vec<u64> = entries.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, (1..=10).collect::<Vec<_>>());
        assert_eq!(store.latest().unwrap(), Some(vec![pair(9)]));
    }

    #[test]
    fn test_retention_keeps_min_of_writes_and_five() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path());

        for n in 0..12u8 {
            store.snapshot(&[pair(n)], "owner", "id").unwrap();
            if n % 3 == 0 {
                store.prune(5).unwrap();
            }
            store.prune(5).unwrap();
            let writes = usize::from(n) + 1;
            assert_eq!(store.list().unwrap().len(), writes.min(5));
            assert_eq!(store.latest().unwrap(), Some(vec![pair(n)]));
        }
    }

    #[test]
    fn test_sequence_continues_after_prune() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path());

        for n in 0..3 {
            store.snapshot(&[pair(n)], "owner", "id").unwrap();
        }
        store.prune(1).unwrap();
        store.snapshot(&[pair(7)], "owner", "id").unwrap();

        let sequences: Vec<u64> = store.list().unwrap().iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![3, 4]);
        assert_eq!(store.latest().unwrap(), Some(vec![pair(7)]));
    }

    #[test]
    fn test_foreign_and_temp_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path());
        fs::write(dir.path().join(".tmp-abc.json"), b"{}").unwrap();
        fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        fs::write(dir.path().join("profile_badges_x_1_id.json"), b"{}").unwrap();

        assert!(store.list().unwrap().is_empty());
        store.snapshot(&[pair(1)], "owner", "id").unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_newest_snapshot_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path());
        store.snapshot(&[pair(1)], "owner", "id").unwrap();
        fs::write(
            dir.path().join("profile_badges_0000000009_0_broken.json"),
            b"not json",
        )
        .unwrap();

        assert_eq!(store.latest().unwrap(), Some(vec![pair(1)]));
    }

    #[test]
    fn test_prune_tolerates_vanished_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path());
        for n in 0..4 {
            store.snapshot(&[pair(n)], "owner", "id").unwrap();
        }

        let listed = store.list().unwrap();
        fs::remove_file(&listed[0].path).unwrap();

        assert_eq!(store.prune_entries(listed, 2).unwrap(), 1);
        let sequences: Vec<u64> = store.list().unwrap().iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![3, 4]);
    }

    #[test]
    fn test_latest_for_owner_skips_other_owners() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path());
        store.snapshot(&[pair(1)], "alice", "id").unwrap();
        store.snapshot(&[pair(2)], "bob", "id").unwrap();

        assert_eq!(store.latest().unwrap(), Some(vec![pair(2)]));
        assert_eq!(store.latest_for_owner("alice").unwrap(), Some(vec![pair(1)]));
        assert_eq!(store.latest_for_owner("carol").unwrap(), None);
    }

    #[test]
    fn test_id_prefix_is_filesystem_safe() {
        assert_eq!(id_prefix("abcdef0123456789"), "abcdef01");
        assert_eq!(id_prefix("../x"), "x");
        assert_eq!(id_prefix(""), "none");
    }
}
