//! Snapshot chain reconstruction
//!
//! A full snapshot starts a chain. An increment joins the chain of the
//! snapshot whose end time equals its start time. An increment whose base is
//! no longer in the store starts a headless chain.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use strongbox_core::{SegmentKind, Snapshot, SnapshotId};

/// One full snapshot and the increments depending on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    /// Full snapshot at the head of the chain (`None` if it is gone)
    pub base: Option<SnapshotId>,
    /// Increments, oldest first
    pub increments: Vec<SnapshotId>,
}

impl Chain {
    pub fn is_headless(&self) -> bool {
        self.base.is_none()
    }

    /// Every snapshot in the chain, oldest first
    pub fn members(&self) -> impl Iterator<Item = SnapshotId> + '_ {
        self.base.into_iter().chain(self.increments.iter().copied())
    }

    /// Most recent snapshot time in the chain
    pub fn newest(&self) -> Option<DateTime<Utc>> {
        self.members().map(|id| id.end).max()
    }
}

/// Group snapshots into chains, ordered by their oldest member
pub fn build_chains(snapshots: &[Snapshot]) -> Vec<Chain> {
    let mut ordered: Vec<&Snapshot> = snapshots.iter().collect();
    ordered.sort_by_key(|s| s.id);

    let mut chains: Vec<Chain> = Vec::new();
    // end time -> index of the chain containing that snapshot
    let mut by_end: HashMap<DateTime<Utc>, usize> = HashMap::new();

    for snapshot in ordered {
        let index = match snapshot.kind() {
            SegmentKind::Full => {
                chains.push(Chain {
                    base: Some(snapshot.id),
                    increments: Vec::new(),
                });
                chains.len() - 1
            }
            SegmentKind::Incremental => {
                let parent = snapshot.start.and_then(|start| by_end.get(&start).copied());
                match parent {
                    Some(index) => {
                        chains[index].increments.push(snapshot.id);
                        index
                    }
                    None => {
                        chains.push(Chain {
                            base: None,
                            increments: vec![snapshot.id],
                        });
                        chains.len() - 1
                    }
                }
            }
        };
        by_end.insert(snapshot.end(), index);
    }

    chains
}
