//! Conflict resolution between locally and remotely modified records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Policy deciding which side wins when both copies changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// The remote copy always wins.
    RemoteWins,
    /// The local copy always wins.
    LocalWins,
    /// The side modified most recently wins; ties favor remote.
    NewestWins,
    /// Never auto-resolve; flag for manual review.
    Manual,
}

impl Default for ConflictStrategy {
    fn default() -> Self {
        ConflictStrategy::NewestWins
    }
}

/// Which side a resolved conflict keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Keep the local copy; the remote update is skipped.
    UseLocal,
    /// Apply the remote copy over local.
    UseRemote,
    /// Store both sides and wait for a human.
    FlagManual,
}

/// A resolution plus the rule that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionDecision {
    pub resolution: Resolution,
    pub reason: String,
}

impl ResolutionDecision {
    fn new(resolution: Resolution, reason: impl Into<String>) -> Self {
        Self {
            resolution,
            reason: reason.into(),
        }
    }
}

/// Decide which side of a both-sides-modified record wins.
///
/// Pure and deterministic. Under `newest_wins`, a missing local timestamp
/// means the local side never changed (remote wins) and a missing remote
/// timestamp means the remote side never changed (local wins); with both
/// present the chronologically later one wins, and ties go to remote since
/// remote is the side sending the current data.
pub fn resolve(
    strategy: ConflictStrategy,
    local_modified: Option<DateTime<Utc>>,
    remote_modified: Option<DateTime<Utc>>,
) -> ResolutionDecision {
    match strategy {
        ConflictStrategy::RemoteWins => {
            ResolutionDecision::new(Resolution::UseRemote, "remote_wins strategy")
        }
        ConflictStrategy::LocalWins => {
            ResolutionDecision::new(Resolution::UseLocal, "local_wins strategy")
        }
        ConflictStrategy::Manual => {
            ResolutionDecision::new(Resolution::FlagManual, "manual review required")
        }
        ConflictStrategy::NewestWins => match (local_modified, remote_modified) {
            (None, _) => {
                ResolutionDecision::new(Resolution::UseRemote, "no local modification timestamp")
            }
            (_, None) => {
                ResolutionDecision::new(Resolution::UseLocal, "no remote modification timestamp")
            }
            (Some(local), Some(remote)) => {
                if local > remote {
                    ResolutionDecision::new(
                        Resolution::UseLocal,
                        format!("local modified {} after remote {}", local, remote),
                    )
                } else {
                    ResolutionDecision::new(
                        Resolution::UseRemote,
                        format!("remote modified {} at or after local {}", remote, local),
                    )
                }
            }
        },
    }
}
