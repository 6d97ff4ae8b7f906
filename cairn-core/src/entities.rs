//! Core entity structures

use crate::enums::{AggregateKind, TaskStatus, UserChallengeStatus};
use crate::expr::Expr;
use crate::geo::GeoPoint;
use crate::identity::{
    ChallengeId, GeocacheId, SnapshotId, TaskId, Timestamp, UserChallengeId, UserId,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// One tagged attribute on a geocache, with polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeTag {
    pub attribute_id: crate::identity::AttributeId,
    pub is_positive: bool,
}

/// A geocache record from the dataset. Referential fields are opaque stable
/// ids; the core never re-resolves them after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geocache {
    pub geocache_id: GeocacheId,
    /// Public waypoint code, e.g. "GC8Q2B1".
    pub code: String,
    pub title: String,
    pub type_id: crate::identity::TypeId,
    pub size_id: crate::identity::SizeId,
    pub country_id: crate::identity::CountryId,
    pub state_id: Option<crate::identity::StateId>,
    pub placed_at: Timestamp,
    pub difficulty: f64,
    pub terrain: f64,
    pub attributes: Vec<AttributeTag>,
    pub location: Option<GeoPoint>,
    /// Owner account name; candidates owned by the acting user are excluded
    /// from target search.
    pub owner: String,
    /// Elevation in meters, when known.
    pub elevation: Option<i64>,
}

/// A claim: one user found one geocache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Find {
    pub user_id: UserId,
    pub geocache_id: GeocacheId,
    pub found_at: Timestamp,
}

/// Count threshold constraints on a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TaskConstraints {
    /// Minimum number of matching finds required. 0 means no count
    /// threshold (aggregate-only or informational tasks).
    pub min_count: i64,
}

/// One declarative completion rule within a user challenge.
/// Tasks are created/replaced in bulk by the owning CRUD layer; the
/// progress evaluator only touches status, metrics and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeTask {
    pub task_id: TaskId,
    pub user_challenge_id: UserChallengeId,
    /// Display and evaluation order, unique within the challenge.
    pub order: i32,
    pub title: String,
    /// Canonical expression (shorthand forms are rewritten before storage).
    pub expression: Expr,
    pub constraints: TaskConstraints,
    pub status: TaskStatus,
    /// Free-form last-computed counters.
    pub metrics: Option<serde_json::Value>,
    pub last_evaluated_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ChallengeTask {
    /// Create a task with fresh id and timestamps.
    pub fn new(
        user_challenge_id: UserChallengeId,
        order: i32,
        title: &str,
        expression: Expr,
        constraints: TaskConstraints,
    ) -> Self {
        let now = Utc::now();
        Self {
            task_id: TaskId::generate(),
            user_challenge_id,
            order,
            title: title.to_string(),
            expression,
            constraints,
            status: TaskStatus::Todo,
            metrics: None,
            last_evaluated_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the initial status (user override on import).
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }
}

/// The pairing of one user with one challenge definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserChallenge {
    pub user_challenge_id: UserChallengeId,
    pub user_id: UserId,
    pub challenge_id: ChallengeId,
    /// User-declared status.
    pub status: UserChallengeStatus,
    /// Engine-derived status; monotone once `Completed`.
    pub computed_status: Option<UserChallengeStatus>,
    pub manual_override: bool,
    pub override_reason: Option<String>,
    pub overridden_at: Option<Timestamp>,
    /// Mirror of the latest snapshot aggregate for fast reads.
    pub latest_aggregate: Option<ProgressAggregate>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl UserChallenge {
    /// Create an accepted pairing with fresh id and timestamps.
    pub fn new(user_id: UserId, challenge_id: ChallengeId) -> Self {
        let now = Utc::now();
        Self {
            user_challenge_id: UserChallengeId::generate(),
            user_id,
            challenge_id,
            status: UserChallengeStatus::Accepted,
            computed_status: None,
            manual_override: false,
            override_reason: None,
            overridden_at: None,
            latest_aggregate: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: UserChallengeStatus) -> Self {
        self.status = status;
        self
    }

    /// Whether the engine already derived completion.
    pub fn is_computed_complete(&self) -> bool {
        self.computed_status == Some(UserChallengeStatus::Completed)
    }
}

/// Challenge-level aggregate computed over supported tasks only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressAggregate {
    pub percent: f64,
    pub tasks_done: i32,
    pub tasks_total: i32,
    pub checked_at: Timestamp,
}

/// Per-task aggregate sub-block of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateProgress {
    pub kind: AggregateKind,
    pub total: i64,
    pub target: i64,
    pub unit: String,
}

/// One task's evaluation result inside a progress snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: TaskId,
    pub order: i32,
    pub title: String,
    pub status: TaskStatus,
    /// False when the expression did not compile under the AND-only
    /// compiler; such tasks are excluded from the challenge aggregate.
    pub supported: bool,
    pub signature: String,
    pub min_count: i64,
    pub current_count: i64,
    pub percent: f64,
    pub aggregate: Option<AggregateProgress>,
    /// Diagnostic notes (e.g. the unsupported-construct reason).
    pub notes: Vec<String>,
    pub evaluated_in_ms: i64,
    pub last_evaluated_at: Timestamp,
}

/// Immutable, append-only evaluation snapshot for a user challenge.
/// Never mutated after insert; history is queried by time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub snapshot_id: SnapshotId,
    pub user_challenge_id: UserChallengeId,
    pub checked_at: Timestamp,
    pub aggregate: ProgressAggregate,
    pub tasks: Vec<TaskSnapshot>,
    pub created_at: Timestamp,
}

/// Urgency diagnostics for one task matched by a target candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskUrgency {
    pub task_id: TaskId,
    pub min_count: i64,
    pub current_count: i64,
    pub remaining: i64,
    /// `remaining / min_count`; 1.0 when unthresholded but unmet.
    pub ratio: f64,
}

/// Sub-scores and per-task ratios used to compute a target's score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetDiagnostics {
    pub coverage: f64,
    pub urgency: f64,
    pub geo: f64,
    pub task_ratios: Vec<TaskUrgency>,
    pub evaluated_at: Timestamp,
}

/// A ranked, persisted recommendation of an unclaimed geocache for a user
/// challenge. Keyed by (user, user challenge, geocache); upserted, mutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub user_id: UserId,
    pub user_challenge_id: UserChallengeId,
    pub geocache_id: GeocacheId,
    pub primary_task_id: Option<TaskId>,
    pub satisfies_task_ids: Vec<TaskId>,
    pub score: f64,
    pub reasons: Vec<String>,
    /// User flag; the engine must never clear it.
    pub pinned: bool,
    // Denormalized geocache payload for display.
    pub code: String,
    pub title: String,
    pub owner: String,
    pub difficulty: f64,
    pub terrain: f64,
    pub location: Option<GeoPoint>,
    pub distance_km: Option<f64>,
    pub diagnostics: TargetDiagnostics,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Minimal user profile the engines need: identity and optional home
/// location used as the default geographic reference point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub username: String,
    pub location: Option<GeoPoint>,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;

    #[test]
    fn test_new_task_defaults() {
        let uc = UserChallengeId::generate();
        let task = ChallengeTask::new(
            uc,
            0,
            "Ten placed in 2005",
            Expr::And {
                nodes: vec![Expr::PlacedYear { year: 2005 }],
            },
            TaskConstraints { min_count: 10 },
        );
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.user_challenge_id, uc);
        assert!(task.last_evaluated_at.is_none());
    }

    #[test]
    fn test_user_challenge_completion_mirror() {
        let mut uc = UserChallenge::new(UserId::generate(), ChallengeId::generate());
        assert!(!uc.is_computed_complete());
        uc.computed_status = Some(UserChallengeStatus::Completed);
        assert!(uc.is_computed_complete());
    }
}
