//! Append-and-reconcile merge of one accepted badge into a displayed set.
//!
//! Every step is a checkpoint: on any abort the caller still holds the
//! pre-merge pairs, and a snapshot of them is on disk before the merged
//! list is even built.

use tracing::{info, warn};

use ribbon_shared::badges::dedup_pairs;
use ribbon_shared::types::{validate_pair, validate_set, BadgePair};
use ribbon_store::BackupStore;

use crate::error::MergeError;

/// Associated id of snapshots taken before a merge.
pub const PRE_MERGE_SNAPSHOT_ID: &str = "pre_merge";

/// Result of a successful merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Merged, ordered, duplicate-free pairs.
    pub pairs: Vec<BadgePair>,
    /// The existing pairs the merge actually started from, after reconciling
    /// an invalid remote set.
    pub baseline: Vec<BadgePair>,
    /// Whether the baseline was taken from a local snapshot instead of the
    /// remote record.
    pub recovered: bool,
}

impl MergeOutcome {
    /// Whether the new pair was already present.
    pub fn was_duplicate(&self) -> bool {
        self.pairs.len() == self.baseline.len()
    }
}

/// Merges accepted badges for one owner, snapshotting through `store`.
pub struct MergeEngine<'a> {
    store: &'a BackupStore,
    owner_key: &'a str,
}

impl<'a> MergeEngine<'a> {
    pub fn new(store: &'a BackupStore, owner_key: &'a str) -> Self {
        Self { store, owner_key }
    }

    pub fn merge(
        &self,
        existing: &[BadgePair],
        new_pair: &BadgePair,
    ) -> Result<MergeOutcome, MergeError> {
        let (baseline, recovered) = self.reconcile_existing(existing)?;

        validate_pair(new_pair).map_err(MergeError::InvalidNewPair)?;

        self.store
            .snapshot(&baseline, self.owner_key, PRE_MERGE_SNAPSHOT_ID)?;

        let merged = dedup_pairs(baseline.iter().cloned().chain(std::iter::once(new_pair.clone())));

        let check = validate_set(&merged);
        if let Some(reason) = check.reason() {
            warn!(reason = %reason, "merged set failed validation, keeping existing pairs");
            return Err(MergeError::PostMergeValidation(reason));
        }

        if merged.len() < baseline.len() {
            return Err(MergeError::BadgeLoss {
                before: baseline.len(),
                after: merged.len(),
            });
        }

        info!(
            before = baseline.len(),
            after = merged.len(),
            recovered,
            "merge successful"
        );
        Ok(MergeOutcome {
            pairs: merged,
            baseline,
            recovered,
        })
    }

    /// Existing pairs to merge into, deduplicated. An invalid remote set is
    /// replaced by the owner's newest local snapshot, or by nothing when no
    /// such snapshot exists.
    fn reconcile_existing(
        &self,
        existing: &[BadgePair],
    ) -> Result<(Vec<BadgePair>, bool), MergeError> {
        let check = validate_set(existing);
        let Some(reason) = check.reason() else {
            return Ok((dedup_pairs(existing.iter().cloned()), false));
        };

        warn!(
            reason = %reason,
            invalid = check.errors.len(),
            "invalid existing pairs, attempting recovery from backup"
        );
        match self.store.latest_for_owner(self.owner_key)? {
            Some(pairs) => {
                info!(badges = pairs.len(), "recovered existing pairs from backup");
                Ok((dedup_pairs(pairs), true))
            }
            None => {
                warn!(
                    dropped = existing.len(),
                    "no backup available, merging into an empty set"
                );
                Ok((Vec::new(), false))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn def(n: usize) -> String {
        format!("30009:{}:badge{n}", "a".repeat(64))
    }

    fn award(n: usize) -> String {
        format!("{:064x}", n + 1)
    }

    fn pair(n: usize) -> BadgePair {
        BadgePair::new(def(n), award(n))
    }

    fn store() -> (tempfile::TempDir, BackupStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_appends_new_pair_in_order() {
        let (_dir, store) = store();
        let engine = MergeEngine::new(&store, "owner");
        let existing = vec![pair(0), pair(1), pair(2)];

        let outcome = engine.merge(&existing, &pair(3)).unwrap();
        assert_eq!(outcome.pairs, vec![pair(0), pair(1), pair(2), pair(3)]);
        assert!(!outcome.recovered);
        assert!(!outcome.was_duplicate());
    }

    #[test]
    fn test_duplicate_keeps_original_position() {
        let (_dir, store) = store();
        let engine = MergeEngine::new(&store, "owner");
        let existing = vec![pair(0), pair(1), pair(2)];

        let outcome = engine.merge(&existing, &pair(1)).unwrap();
        assert_eq!(outcome.pairs, existing);
        assert!(outcome.was_duplicate());
    }

    #[test]
    fn test_invalid_new_pair_aborts_before_snapshot() {
        let (_dir, store) = store();
        let engine = MergeEngine::new(&store, "owner");

        let bad = BadgePair::new(def(9), "XYZ");
        let err = engine.merge(&[pair(0)], &bad).unwrap_err();
        assert!(matches!(err, MergeError::InvalidNewPair(_)));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_pre_merge_snapshot_holds_existing_pairs() {
        let (_dir, store) = store();
        let engine = MergeEngine::new(&store, "owner");
        let existing = vec![pair(0), pair(1)];

        engine.merge(&existing, &pair(2)).unwrap();
        let snapshot = store.latest_snapshot().unwrap().unwrap();
        assert_eq!(snapshot.badge_pairs, existing);
        assert_eq!(snapshot.associated_record_id, PRE_MERGE_SNAPSHOT_ID);
    }

    #[test]
    fn test_pre_merge_snapshot_written_for_empty_set() {
        let (_dir, store) = store();
        let engine = MergeEngine::new(&store, "owner");

        engine.merge(&[], &pair(0)).unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
        assert_eq!(store.latest().unwrap(), Some(vec![]));
    }

    #[test]
    fn test_duplicated_remote_pairs_are_not_counted_as_loss() {
        let (_dir, store) = store();
        let engine = MergeEngine::new(&store, "owner");
        let existing = vec![pair(0), pair(0), pair(1), pair(0)];

        let outcome = engine.merge(&existing, &pair(0)).unwrap();
        assert_eq!(outcome.baseline, vec![pair(0), pair(1)]);
        assert_eq!(outcome.pairs, vec![pair(0), pair(1)]);
    }

    #[test]
    fn test_invalid_existing_recovers_from_backup() {
        let (_dir, store) = store();
        store.snapshot(&[pair(0), pair(1)], "owner", "earlier").unwrap();
        let engine = MergeEngine::new(&store, "owner");

        let corrupt = vec![pair(0), BadgePair::new(def(5), "")];
        let outcome = engine.merge(&corrupt, &pair(2)).unwrap();
        assert!(outcome.recovered);
        assert_eq!(outcome.baseline, vec![pair(0), pair(1)]);
        assert_eq!(outcome.pairs, vec![pair(0), pair(1), pair(2)]);
    }

    #[test]
    fn test_invalid_existing_without_backup_starts_empty() {
        let (_dir, store) = store();
        let engine = MergeEngine::new(&store, "owner");

        let corrupt = vec![BadgePair::new("30008:nope", award(0))];
        let outcome = engine.merge(&corrupt, &pair(1)).unwrap();
        assert!(!outcome.recovered);
        assert!(outcome.baseline.is_empty());
        assert_eq!(outcome.pairs, vec![pair(1)]);
    }

    #[test]
    fn test_recovery_ignores_other_owners_snapshots() {
        let (_dir, store) = store();
        store.snapshot(&[pair(0)], "owner", "earlier").unwrap();
        store.snapshot(&[pair(7), pair(8)], "someone-else", "later").unwrap();
        let engine = MergeEngine::new(&store, "owner");

        let corrupt = vec![BadgePair::new(def(5), "")];
        let outcome = engine.merge(&corrupt, &pair(1)).unwrap();
        assert!(outcome.recovered);
        assert_eq!(outcome.pairs, vec![pair(0), pair(1)]);
    }

    #[test]
    fn test_corrupt_backup_fails_post_merge_validation() {
        let (_dir, store) = store();
        store
            .snapshot(&[BadgePair::new(def(0), "short")], "owner", "earlier")
            .unwrap();
        let engine = MergeEngine::new(&store, "owner");

        let corrupt = vec![BadgePair::new(def(1), "")];
        let err = engine.merge(&corrupt, &pair(2)).unwrap_err();
        assert!(matches!(err, MergeError::PostMergeValidation(_)));
    }

    fn random_pair(rng: &mut StdRng) -> BadgePair {
        let n = rng.gen_range(0..12);
        match rng.gen_range(0..10) {
            0 => BadgePair::new(def(n), ""),
            1 => BadgePair::new(format!("30009:{}:x", "z".repeat(64)), award(n)),
            2 => BadgePair::new(format!("30009:{}:", "a".repeat(64)), award(n)),
            3 => BadgePair::new(def(n), award(n).to_uppercase()),
            _ => pair(n),
        }
    }

    #[test]
    fn test_fuzz_merge_never_loses_badges() {
        let mut rng = StdRng::seed_from_u64(0x5eed_ba09);

        for round in 0..200 {
            let (_dir, store) = store();
            if rng.gen_bool(0.5) {
                let backup: Vec<BadgePair> = (0..rng.gen_range(0..5)).map(|n| pair(n + 20)).collect();
                store.snapshot(&backup, "owner", "seed").unwrap();
            }
            let engine = MergeEngine::new(&store, "owner");

            let existing: Vec<BadgePair> = (0..rng.gen_range(0..8))
                .map(|_| random_pair(&mut rng))
                .collect();
            let new_pair = random_pair(&mut rng);

            match engine.merge(&existing, &new_pair) {
                Ok(outcome) => {
                    assert!(
                        outcome.pairs.len() >= outcome.baseline.len(),
                        "round {round}: lost badges"
                    );
                    if validate_set(&existing).all_valid() {
                        assert!(outcome.pairs.len() >= dedup_pairs(existing.clone()).len());
                        assert!(outcome.pairs.starts_with(&dedup_pairs(existing.clone())));
                    }
                    assert!(outcome.pairs.contains(&new_pair));
                    assert!(validate_set(&outcome.pairs).all_valid());
                    let unique = dedup_pairs(outcome.pairs.clone());
                    assert_eq!(unique, outcome.pairs, "round {round}: duplicates");
                }
                Err(MergeError::InvalidNewPair(_)) => {
                    assert!(validate_pair(&new_pair).is_err());
                }
                Err(MergeError::PostMergeValidation(_)) => {
                    panic!("round {round}: backups and new pair were valid");
                }
                Err(e) => panic!("round {round}: unexpected error {e}"),
            }
        }
    }
}
