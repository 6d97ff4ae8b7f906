//! Error types for CAIRN operations

use crate::enums::EntityType;
use crate::identity::UserChallengeId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Machine-readable code for one task validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    /// A code/name failed resolution against the referentials.
    ReferenceNotFound,
    /// Aggregate misplacement/cardinality, missing sibling constraint.
    StructuralViolation,
    /// `min > max` on a between leaf.
    InvalidRange,
    /// Bad `constraints` block (negative min_count).
    InvalidConstraint,
    /// Duplicate `order` within one payload.
    DuplicateOrder,
    /// The expression did not parse into the AST at all.
    InvalidExpression,
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IssueCode::ReferenceNotFound => "reference_not_found",
            IssueCode::StructuralViolation => "structural_violation",
            IssueCode::InvalidRange => "invalid_range",
            IssueCode::InvalidConstraint => "invalid_constraint",
            IssueCode::DuplicateOrder => "duplicate_order",
            IssueCode::InvalidExpression => "invalid_expression",
        };
        write!(f, "{s}")
    }
}

/// One validation issue, addressed to the caller by task index and field so
/// inline errors can be rendered. Issues are collected per batch, never
/// thrown one at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskIssue {
    pub index: usize,
    pub field: String,
    pub code: IssueCode,
    pub message: String,
}

impl TaskIssue {
    pub fn new(index: usize, field: &str, code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            index,
            field: field.to_string(),
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for TaskIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "task[{}].{}: {} ({})",
            self.index, self.field, self.message, self.code
        )
    }
}

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {entity_type:?} with id {id}")]
    NotFound { entity_type: EntityType, id: Uuid },

    #[error("Insert failed for {entity_type:?}: {reason}")]
    InsertFailed {
        entity_type: EntityType,
        reason: String,
    },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Evaluation and scoring errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvaluationError {
    #[error("User challenge {user_challenge_id} not found or not owned by user")]
    NotOwned {
        user_challenge_id: UserChallengeId,
    },

    #[error("No reference point: geo-filtered scoring requested without a resolvable location")]
    NoReferencePoint,

    #[error("Task payload rejected with {} issue(s)", issues.len())]
    TasksRejected { issues: Vec<TaskIssue> },
}

/// Master error type for all CAIRN operations.
#[derive(Debug, Clone, Error)]
pub enum CairnError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),
}

/// Result type alias for CAIRN operations.
pub type CairnResult<T> = Result<T, CairnError>;

// =============================================================================
// TESTS
// =============================================================================
