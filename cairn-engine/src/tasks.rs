//! Task payload management: validate, store, list.

use crate::owned_challenge;
use cairn_core::{
    CairnResult, ChallengeTask, EvaluationError, UserChallengeId, UserId,
};
use cairn_expr::{prepare_tasks, validate_tasks, TaskDraft, ValidationReport};
use cairn_storage::{ChallengeStore, ReferentialCatalog};
use std::sync::Arc;

/// Front door for the owning CRUD layer: runs the expression pipeline over
/// submitted payloads and replaces stored task lists wholesale.
pub struct TaskManager<S> {
    store: Arc<S>,
    catalog: Arc<ReferentialCatalog>,
}

impl<S: ChallengeStore> TaskManager<S> {
    pub fn new(store: Arc<S>, catalog: Arc<ReferentialCatalog>) -> Self {
        Self { store, catalog }
    }

    /// Dry-run validation of a task payload. Never writes.
    pub fn validate_only(&self, drafts: &[TaskDraft]) -> ValidationReport {
        let refs = self.catalog.snapshot();
        validate_tasks(drafts, &refs)
    }

    /// Validate and store a task payload, replacing the challenge's entire
    /// task list. All-or-nothing: any issue in the batch rejects the whole
    /// payload and nothing is written.
    pub fn store_tasks(
        &self,
        user_id: UserId,
        user_challenge_id: UserChallengeId,
        drafts: &[TaskDraft],
    ) -> CairnResult<Vec<ChallengeTask>> {
        owned_challenge(self.store.as_ref(), user_id, user_challenge_id)?;

        let refs = self.catalog.snapshot();
        let prepared = prepare_tasks(drafts, &refs)
            .map_err(|issues| EvaluationError::TasksRejected { issues })?;

        let tasks: Vec<ChallengeTask> = prepared
            .into_iter()
            .map(|p| {
                ChallengeTask::new(
                    user_challenge_id,
                    p.order,
                    &p.title,
                    p.expression,
                    p.constraints,
                )
            })
            .collect();

        self.store.tasks_replace(user_challenge_id, tasks)
    }

    /// List the stored canonical tasks of a user challenge.
    pub fn list_tasks(
        &self,
        user_id: UserId,
        user_challenge_id: UserChallengeId,
    ) -> CairnResult<Vec<ChallengeTask>> {
        owned_challenge(self.store.as_ref(), user_id, user_challenge_id)?;
        self.store.tasks_list(user_challenge_id)
    }
}

// =============================================================================
// TESTS
// =============================================================================
