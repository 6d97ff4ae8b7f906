//! CAIRN Engine - Progress Evaluation and Target Scoring
//!
//! The consumers of compiled task expressions:
//!
//! - [`TaskManager`] runs the expression pipeline over submitted payloads
//!   and replaces a challenge's stored task list.
//! - [`ProgressEvaluator`] counts a user's finds against each task through
//!   the AND-only compiler and appends immutable progress snapshots.
//! - [`TargetScorer`] searches the geocache dataset through the full
//!   compiler and persists ranked candidate recommendations.
//!
//! All operations are request-scoped: no background threads, no engine
//! state beyond the referential catalog handle.

pub mod progress;
pub mod targets;
pub mod tasks;

pub use progress::{EvaluateMissingOutcome, ProgressEvaluator, OVERRIDE_DONE_SIGNATURE};
pub use targets::{GeoContext, ScoreOptions, ScoreOutcome, TargetScorer};
pub use tasks::TaskManager;

use cairn_core::{CairnResult, EvaluationError, UserChallenge, UserChallengeId, UserId};
use cairn_storage::ChallengeStore;

/// Fetch a user challenge and verify it belongs to the acting user.
pub(crate) fn owned_challenge<S: ChallengeStore + ?Sized>(
    store: &S,
    user_id: UserId,
    user_challenge_id: UserChallengeId,
) -> CairnResult<UserChallenge> {
    match store.user_challenge_get(user_challenge_id)? {
        Some(uc) if uc.user_id == user_id => Ok(uc),
        _ => Err(EvaluationError::NotOwned { user_challenge_id }.into()),
    }
}
