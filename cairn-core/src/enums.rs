//! Enum types for CAIRN entities

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of one task within a user challenge.
/// `Done` can be set by the user as an override; the engine only promotes,
/// never demotes (except under a forced re-evaluation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Todo
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Todo => write!(f, "todo"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Done => write!(f, "done"),
        }
    }
}

/// Status of a user challenge. `status` is user-declared; `computed_status`
/// is engine-derived and monotone once `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserChallengeStatus {
    Pending,
    Accepted,
    Completed,
}

impl fmt::Display for UserChallengeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserChallengeStatus::Pending => write!(f, "pending"),
            UserChallengeStatus::Accepted => write!(f, "accepted"),
            UserChallengeStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Entity type discriminator for polymorphic references (storage errors).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Geocache,
    Find,
    Task,
    UserChallenge,
    Snapshot,
    Target,
    User,
    Referential,
}

/// Kind of referential a selector resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialKind {
    GeocacheType,
    GeocacheSize,
    Country,
    State,
    Attribute,
}

impl fmt::Display for ReferentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferentialKind::GeocacheType => write!(f, "geocache_type"),
            ReferentialKind::GeocacheSize => write!(f, "geocache_size"),
            ReferentialKind::Country => write!(f, "country"),
            ReferentialKind::State => write!(f, "state"),
            ReferentialKind::Attribute => write!(f, "attribute"),
        }
    }
}

/// The four fixed aggregate kinds: sums computed over the set of matched
/// finds rather than per-geocache predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKind {
    Difficulty,
    Terrain,
    DifficultyPlusTerrain,
    Altitude,
}

impl AggregateKind {
    /// Display unit for snapshot aggregate blocks.
    pub fn unit(&self) -> &'static str {
        match self {
            AggregateKind::Altitude => "meters",
            _ => "points",
        }
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateKind::Difficulty => write!(f, "difficulty"),
            AggregateKind::Terrain => write!(f, "terrain"),
            AggregateKind::DifficultyPlusTerrain => write!(f, "diff_plus_terr"),
            AggregateKind::Altitude => write!(f, "altitude"),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        let back: TaskStatus = serde_json::from_str("\"done\"").unwrap();
        assert_eq!(back, TaskStatus::Done);
    }

    #[test]
    fn test_aggregate_kind_units() {
        assert_eq!(AggregateKind::Altitude.unit(), "meters");
        assert_eq!(AggregateKind::Difficulty.unit(), "points");
        assert_eq!(AggregateKind::DifficultyPlusTerrain.unit(), "points");
    }
}
