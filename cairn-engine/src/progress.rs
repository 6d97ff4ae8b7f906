//! Per-challenge progress evaluation.
//!
//! For each task in stored order: compile under the AND-only rules, count
//! the user's matching finds, compute percentages, promote status, and
//! append one immutable snapshot. Manual `done` overrides always win over
//! recomputation unless the caller forces.

use crate::owned_challenge;
use cairn_core::{
    AggregateKind, AggregateProgress, CairnResult, ChallengeTask, Geocache, ProgressAggregate,
    ProgressSnapshot, SnapshotId, TaskSnapshot, TaskStatus, UserChallenge, UserChallengeId,
    UserChallengeStatus, UserId,
};
use cairn_expr::{compile_conjunction, AggregateSpec, ConjunctionOutcome};
use cairn_storage::{ChallengeStore, GeocacheStore, TaskUpdate, UserChallengeUpdate};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

/// Sentinel signature for tasks short-circuited by a user `done` override.
pub const OVERRIDE_DONE_SIGNATURE: &str = "override:done";

/// Outcome of a batch evaluate-missing call.
#[derive(Debug, Clone, Default)]
pub struct EvaluateMissingOutcome {
    pub evaluated: Vec<UserChallengeId>,
    pub skipped: usize,
}

pub struct ProgressEvaluator<S> {
    store: Arc<S>,
}

impl<S: ChallengeStore + GeocacheStore> ProgressEvaluator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Evaluate one user challenge and append a snapshot. A completed
    /// challenge short-circuits to its latest snapshot unless forced.
    pub fn evaluate(
        &self,
        user_id: UserId,
        user_challenge_id: UserChallengeId,
        force: bool,
    ) -> CairnResult<ProgressSnapshot> {
        let uc = owned_challenge(self.store.as_ref(), user_id, user_challenge_id)?;

        if !force && is_complete(&uc) {
            if let Some(last) = self.store.snapshot_latest(user_challenge_id)? {
                return Ok(last);
            }
            // No snapshot recorded yet: fall through to a normal evaluation.
        }

        let tasks = self.store.tasks_list(user_challenge_id)?;
        let found = self.store.found_geocaches(user_id)?;

        let mut task_snaps: Vec<TaskSnapshot> = Vec::with_capacity(tasks.len());
        let mut sum_current: i64 = 0;
        let mut sum_min: i64 = 0;
        let mut tasks_supported: i32 = 0;
        let mut tasks_done: i32 = 0;

        for task in &tasks {
            let snap = if task.status == TaskStatus::Done && !force {
                override_done_snapshot(task)
            } else {
                self.evaluate_task(task, &found, force)?
            };

            if snap.supported {
                tasks_supported += 1;
                sum_min += snap.min_count.max(0);
                sum_current += snap.current_count.min(snap.min_count).max(0);
                if snap.status == TaskStatus::Done {
                    tasks_done += 1;
                }
            }
            task_snaps.push(snap);
        }

        let percent = if sum_min > 0 {
            round1(100.0 * sum_current as f64 / sum_min as f64)
        } else {
            0.0
        };

        let now = Utc::now();
        let aggregate = ProgressAggregate {
            percent,
            tasks_done,
            tasks_total: tasks_supported,
            checked_at: now,
        };
        let snapshot = ProgressSnapshot {
            snapshot_id: SnapshotId::generate(),
            user_challenge_id,
            checked_at: now,
            aggregate: aggregate.clone(),
            tasks: task_snaps,
            created_at: now,
        };

        let mut update = UserChallengeUpdate {
            latest_aggregate: Some(aggregate),
            ..Default::default()
        };
        // Computed completion is monotone: set once, never reverted here.
        if !uc.is_computed_complete() && tasks_supported > 0 && tasks_done == tasks_supported {
            update.computed_status = Some(UserChallengeStatus::Completed);
            update.status = Some(UserChallengeStatus::Completed);
        }
        self.store.user_challenge_update(user_challenge_id, update)?;
        self.store.snapshot_insert(&snapshot)?;

        Ok(snapshot)
    }

    /// Evaluate every challenge of the user that has no snapshot yet.
    /// Idempotent: a second call finds nothing left to evaluate.
    pub fn evaluate_missing(
        &self,
        user_id: UserId,
        limit: usize,
        include_pending: bool,
    ) -> CairnResult<EvaluateMissingOutcome> {
        let mut outcome = EvaluateMissingOutcome::default();
        for uc in self.store.user_challenge_list(user_id, include_pending)? {
            if outcome.evaluated.len() >= limit {
                break;
            }
            if self.store.snapshot_count(uc.user_challenge_id)? > 0 {
                outcome.skipped += 1;
                continue;
            }
            self.evaluate(user_id, uc.user_challenge_id, false)?;
            outcome.evaluated.push(uc.user_challenge_id);
        }
        Ok(outcome)
    }

    /// Snapshot history for a challenge, newest first, optionally bounded
    /// from above by `before`.
    pub fn history(
        &self,
        user_id: UserId,
        user_challenge_id: UserChallengeId,
        limit: usize,
        before: Option<chrono::DateTime<Utc>>,
    ) -> CairnResult<Vec<ProgressSnapshot>> {
        owned_challenge(self.store.as_ref(), user_id, user_challenge_id)?;
        self.store.snapshot_history(user_challenge_id, limit, before)
    }

    fn evaluate_task(
        &self,
        task: &ChallengeTask,
        found: &[Geocache],
        force: bool,
    ) -> CairnResult<TaskSnapshot> {
        let min_count = task.constraints.min_count;

        let conjunction = match compile_conjunction(&task.expression) {
            ConjunctionOutcome::Supported(c) => c,
            ConjunctionOutcome::Unsupported { reason } => {
                return Ok(unsupported_snapshot(task, reason));
            }
        };

        let tic = Instant::now();
        let matched: Vec<&Geocache> = found
            .iter()
            .filter(|c| conjunction.matches(c))
            .collect();
        let current = matched.len() as i64;
        let elapsed_ms = tic.elapsed().as_millis() as i64;

        let count_percent = if min_count > 0 {
            100.0 * current.min(min_count) as f64 / min_count as f64
        } else {
            100.0
        };

        let aggregate = conjunction
            .aggregate
            .map(|spec| aggregate_progress(&spec, &matched));
        let aggregate_percent = aggregate.as_ref().map(|a| {
            if a.target > 0 {
                (100.0 * a.total as f64 / a.target as f64).clamp(0.0, 100.0)
            } else {
                0.0
            }
        });

        let percent = round1(match aggregate_percent {
            Some(ap) if min_count > 0 => count_percent.min(ap),
            Some(ap) => ap,
            None => count_percent,
        });

        // Status follows the count threshold alone; an unmet aggregate
        // still shows through the percent, which takes the min of both.
        let status = if current >= min_count {
            TaskStatus::Done
        } else if force && task.status == TaskStatus::Done {
            // Forced recomputation is the one path that demotes.
            if current > 0 { TaskStatus::InProgress } else { TaskStatus::Todo }
        } else if task.status == TaskStatus::Todo && current > 0 {
            TaskStatus::InProgress
        } else {
            task.status
        };

        let now = Utc::now();
        self.store.task_update(
            task.task_id,
            TaskUpdate {
                status: Some(status),
                metrics: Some(json!({
                    "current_count": current,
                    "percent": percent,
                    "signature": conjunction.signature,
                })),
                last_evaluated_at: Some(now),
            },
        )?;

        Ok(TaskSnapshot {
            task_id: task.task_id,
            order: task.order,
            title: task.title.clone(),
            status,
            supported: true,
            signature: conjunction.signature,
            min_count,
            current_count: current,
            percent,
            aggregate,
            notes: Vec::new(),
            evaluated_in_ms: elapsed_ms,
            last_evaluated_at: now,
        })
    }
}

fn is_complete(uc: &UserChallenge) -> bool {
    uc.is_computed_complete() || uc.status == UserChallengeStatus::Completed
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn override_done_snapshot(task: &ChallengeTask) -> TaskSnapshot {
    let min_count = task.constraints.min_count;
    TaskSnapshot {
        task_id: task.task_id,
        order: task.order,
        title: task.title.clone(),
        status: TaskStatus::Done,
        supported: true,
        signature: OVERRIDE_DONE_SIGNATURE.to_string(),
        min_count,
        current_count: min_count,
        percent: 100.0,
        aggregate: None,
        notes: vec!["user override: done".to_string()],
        evaluated_in_ms: 0,
        last_evaluated_at: Utc::now(),
    }
}

fn unsupported_snapshot(task: &ChallengeTask, reason: String) -> TaskSnapshot {
    TaskSnapshot {
        task_id: task.task_id,
        order: task.order,
        title: task.title.clone(),
        status: task.status,
        supported: false,
        signature: cairn_expr::UNSUPPORTED_SIGNATURE.to_string(),
        min_count: task.constraints.min_count,
        current_count: 0,
        percent: 0.0,
        aggregate: None,
        notes: vec![reason],
        evaluated_in_ms: 0,
        last_evaluated_at: Utc::now(),
    }
}

/// Sum the chosen numeric field over the matched finds. Half-point
/// difficulty/terrain values accumulate as floats; the total truncates.
fn aggregate_progress(spec: &AggregateSpec, matched: &[&Geocache]) -> AggregateProgress {
    let total: f64 = matched
        .iter()
        .map(|c| match spec.kind {
            AggregateKind::Difficulty => c.difficulty,
            AggregateKind::Terrain => c.terrain,
            AggregateKind::DifficultyPlusTerrain => c.difficulty + c.terrain,
            AggregateKind::Altitude => c.elevation.unwrap_or(0) as f64,
        })
        .sum();
    AggregateProgress {
        kind: spec.kind,
        total: total as i64,
        target: spec.min_total,
        unit: spec.kind.unit().to_string(),
    }
}

// =============================================================================
// TESTS
// =============================================================================
