//! Retention policy and prune planning

use crate::chain::build_chains;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use strongbox_core::config::RetentionConfig;
use strongbox_core::{BackupError, Result, Snapshot, SnapshotId};

/// Retention policy configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Maximum age of a retained snapshot (default: 31 days)
    pub max_age: Duration,
    /// Full snapshots whose incremental history is kept (default: 1)
    pub keep_full_count: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(31 * 24 * 60 * 60),
            keep_full_count: 1,
        }
    }
}

/// Instruction handed to the snapshot engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneInstruction {
    /// Remove snapshots older than the cutoff
    OlderThan(Duration),
    /// Remove increments superseded by later fulls beyond the count
    CollapseIncrements(usize),
}

impl fmt::Display for PruneInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PruneInstruction::OlderThan(age) => {
                write!(f, "remove-older-than {}d", age.as_secs() / 86400)
            }
            PruneInstruction::CollapseIncrements(count) => {
                write!(f, "collapse-increments keep {} full", count)
            }
        }
    }
}

/// Ordered prune instructions plus the snapshots they are expected to remove
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrunePlan {
    /// Always `OlderThan` followed by `CollapseIncrements`
    pub instructions: Vec<PruneInstruction>,
    /// Snapshots removed by the age step
    pub expired: Vec<SnapshotId>,
    /// Increments removed by the collapse step
    pub collapsed: Vec<SnapshotId>,
}

impl PrunePlan {
    /// Every snapshot the plan removes
    pub fn removals(&self) -> BTreeSet<SnapshotId> {
        self.expired.iter().chain(self.collapsed.iter()).copied().collect()
    }

    /// Whether executing the plan is expected to change the store
    pub fn removes_anything(&self) -> bool {
        !self.expired.is_empty() || !self.collapsed.is_empty()
    }
}

impl RetentionPolicy {
    pub fn new(max_age: Duration, keep_full_count: usize) -> Self {
        Self {
            max_age,
            keep_full_count,
        }
    }

    pub fn from_config(config: &RetentionConfig) -> Self {
        Self::new(config.max_age(), config.keep_full_count)
    }

    /// Decide how to prune the given snapshots at time `now`.
    ///
    /// Fails with `RetentionMisconfigured` when the result would leave the
    /// store without a restorable full snapshot.
    pub fn plan(&self, snapshots: &[Snapshot], now: DateTime<Utc>) -> Result<PrunePlan> {
        if self.keep_full_count == 0 {
            return Err(BackupError::RetentionMisconfigured(
                "keep_full_count of 0 would collapse the only full snapshot".to_string(),
            ));
        }

        let expired = expire_by_age(snapshots, self.max_age, now);
        let survivors: Vec<Snapshot> = snapshots
            .iter()
            .filter(|s| !expired.contains(&s.id))
            .cloned()
            .collect();
        let collapsed = collapse_increments(&survivors, self.keep_full_count)?;

        let plan = PrunePlan {
            instructions: vec![
                PruneInstruction::OlderThan(self.max_age),
                PruneInstruction::CollapseIncrements(self.keep_full_count),
            ],
            expired,
            collapsed,
        };

        tracing::debug!(
            expired = plan.expired.len(),
            collapsed = plan.collapsed.len(),
            "Planned retention"
        );

        Ok(plan)
    }
}

/// Age step: every snapshot older than `max_age` expires, except the newest
/// full snapshot, which is never removed by age.
pub fn expire_by_age(
    snapshots: &[Snapshot],
    max_age: Duration,
    now: DateTime<Utc>,
) -> Vec<SnapshotId> {
    let newest_full = snapshots.iter().filter(|s| s.is_full()).map(|s| s.id).max();

    let mut expired: Vec<SnapshotId> = snapshots
        .iter()
        .filter(|s| Some(s.id) != newest_full)
        .filter(|s| s.age(now) > max_age)
        .map(|s| s.id)
        .collect();
    expired.sort();
    expired
}

/// Collapse step over the snapshots that survived the age step.
///
/// - chains headed by one of the `keep_full_count` newest fulls keep every
///   increment
/// - chains headed by an older full lose all their increments
/// - headless chains fold their oldest increment; later ones remain
pub fn collapse_increments(
    snapshots: &[Snapshot],
    keep_full_count: usize,
) -> Result<Vec<SnapshotId>> {
    if keep_full_count == 0 {
        return Err(BackupError::RetentionMisconfigured(
            "keep_full_count must be at least 1".to_string(),
        ));
    }

    let mut fulls: Vec<SnapshotId> =
        snapshots.iter().filter(|s| s.is_full()).map(|s| s.id).collect();
    if fulls.is_empty() && !snapshots.is_empty() {
        return Err(BackupError::RetentionMisconfigured(
            "snapshot store holds no full snapshot to retain".to_string(),
        ));
    }
    fulls.sort_by(|a, b| b.cmp(a));
    let kept: BTreeSet<SnapshotId> = fulls.into_iter().take(keep_full_count).collect();

    let mut collapsed = Vec::new();
    for chain in build_chains(snapshots) {
        match chain.base {
            Some(base) if kept.contains(&base) => {}
            Some(_) => collapsed.extend(chain.increments.iter().copied()),
            None => collapsed.extend(chain.increments.first().copied()),
        }
    }

    collapsed.sort();
    Ok(collapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use strongbox_core::SegmentKind;

    const DAY: i64 = 24 * 60 * 60;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 4, 0, 0).unwrap()
    }

    fn days_ago(days: i64) -> DateTime<Utc> {
        now() - chrono::Duration::seconds(days * DAY)
    }

    fn full(days: i64) -> Snapshot {
        Snapshot::new(SegmentKind::Full, None, days_ago(days))
    }

    fn inc(from_days: i64, days: i64) -> Snapshot {
        Snapshot::new(SegmentKind::Incremental, Some(days_ago(from_days)), days_ago(days))
    }

    fn ends(ids: &[SnapshotId]) -> Vec<DateTime<Utc>> {
        ids.iter().map(|id| id.end).collect()
    }

    #[test]
    fn test_age_then_collapse() {
        // full@40d <- inc@20d <- inc@5d, full@2d
        let snapshots = vec![full(40), inc(40, 20), inc(20, 5), full(2)];
        let policy = RetentionPolicy::new(Duration::from_secs(31 * DAY as u64), 1);

        let plan = policy.plan(&snapshots, now()).unwrap();

        assert_eq!(ends(&plan.expired), vec![days_ago(40)]);
        assert_eq!(ends(&plan.collapsed), vec![days_ago(20)]);

        let removed = plan.removals();
        let retained: Vec<_> = snapshots.iter().filter(|s| !removed.contains(&s.id)).collect();
        assert_eq!(retained.len(), 2);
        assert!(retained.iter().any(|s| s.id == inc(20, 5).id));
        assert!(retained.iter().any(|s| s.id == full(2).id));
    }

    #[test]
    fn test_instructions_are_ordered() {
        let plan = RetentionPolicy::default().plan(&[full(1)], now()).unwrap();
        assert_eq!(
            plan.instructions,
            vec![
                PruneInstruction::OlderThan(Duration::from_secs(31 * DAY as u64)),
                PruneInstruction::CollapseIncrements(1),
            ]
        );
        assert!(!plan.removes_anything());
    }

    #[test]
    fn test_newest_full_never_expires() {
        let snapshots = vec![full(90), inc(90, 80), full(60)];
        let plan = RetentionPolicy::default().plan(&snapshots, now()).unwrap();

        assert_eq!(ends(&plan.expired), vec![days_ago(90), days_ago(80)]);
        assert!(plan.collapsed.is_empty());
    }

    #[test]
    fn test_superseded_chain_loses_increments() {
        let snapshots = vec![full(20), inc(20, 15), inc(15, 10), full(8), inc(8, 3)];
        let plan = RetentionPolicy::default().plan(&snapshots, now()).unwrap();

        assert!(plan.expired.is_empty());
        assert_eq!(ends(&plan.collapsed), vec![days_ago(15), days_ago(10)]);
    }

    #[test]
    fn test_keep_two_fulls_retains_history() {
        let snapshots = vec![full(20), inc(20, 15), full(8), inc(8, 3)];
        let policy = RetentionPolicy::new(Duration::from_secs(31 * DAY as u64), 2);

        let plan = policy.plan(&snapshots, now()).unwrap();
        assert!(!plan.removes_anything());
    }

    #[test]
    fn test_zero_keep_count_fails_loudly() {
        let policy = RetentionPolicy::new(Duration::from_secs(31 * DAY as u64), 0);
        assert!(matches!(
            policy.plan(&[full(1)], now()),
            Err(BackupError::RetentionMisconfigured(_))
        ));
    }

    #[test]
    fn test_store_without_full_fails() {
        let snapshots = vec![inc(10, 5), inc(5, 1)];
        assert!(matches!(
            RetentionPolicy::default().plan(&snapshots, now()),
            Err(BackupError::RetentionMisconfigured(_))
        ));
    }

    #[test]
    fn test_empty_store_plans_nothing() {
        let plan = RetentionPolicy::default().plan(&[], now()).unwrap();
        assert!(!plan.removes_anything());
        assert_eq!(plan.instructions.len(), 2);
    }

    #[test]
    fn test_from_config() {
        let policy = RetentionPolicy::from_config(&RetentionConfig {
            max_age_days: 7,
            keep_full_count: 3,
        });
        assert_eq!(policy.max_age, Duration::from_secs(7 * DAY as u64));
        assert_eq!(policy.keep_full_count, 3);
    }

    #[test]
    fn test_from_config_saturates_huge_age() {
        let policy = RetentionPolicy::from_config(&RetentionConfig {
            max_age_days: u64::MAX / 2,
            keep_full_count: 1,
        });
        assert_eq!(policy.max_age, Duration::from_secs(u64::MAX));
    }
}
