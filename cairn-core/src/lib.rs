//! CAIRN Core - Entity Types
//!
//! Pure data structures with no engine behavior. All other crates depend on
//! this. Expression compilation, evaluation and scoring live in the sibling
//! crates; this crate only defines the shapes they operate on.

pub mod entities;
pub mod enums;
pub mod error;
pub mod expr;
pub mod geo;
pub mod identity;
pub mod referential;

pub use entities::{
    AggregateProgress, AttributeTag, ChallengeTask, Find, Geocache, ProgressAggregate,
    ProgressSnapshot, Target, TargetDiagnostics, TaskConstraints, TaskSnapshot, TaskUrgency,
    UserProfile,
};
pub use entities::UserChallenge;
pub use enums::{AggregateKind, EntityType, ReferentialKind, TaskStatus, UserChallengeStatus};
pub use error::{
    CairnError, CairnResult, EvaluationError, IssueCode, StorageError, TaskIssue,
};
pub use expr::{
    AttributeSelector, CountrySelector, Expr, SizeSelector, StateSelector, TypeSelector,
};
pub use geo::GeoPoint;
pub use identity::{
    new_entity_id, AttributeId, ChallengeId, CountryId, EntityId, GeocacheId, SizeId, SnapshotId,
    StateId, TaskId, Timestamp, TypeId, UserChallengeId, UserId,
};
pub use referential::{ReferentialSnapshot, ReferentialSnapshotBuilder};
