//! CAIRN Storage - Storage Traits and In-Memory Implementation
//!
//! Defines the storage abstraction consumed by the progress evaluator and
//! target scorer, plus an in-memory implementation backed by
//! `Arc<RwLock<HashMap>>` collections. Snapshot storage is append-only;
//! target storage upserts by (user, user challenge, geocache) and never
//! touches the user's `pinned` flag.

pub mod referential;
pub mod search;

pub use referential::ReferentialCatalog;
pub use search::{GeocacheHit, SearchOptions, TargetPage, TargetQuery, TargetSort};

use cairn_core::{
    CairnResult, ChallengeTask, EntityType, Find, Geocache, GeocacheId, ProgressAggregate,
    ProgressSnapshot, StorageError, Target, TaskId, TaskStatus, Timestamp, UserChallenge,
    UserChallengeId, UserChallengeStatus, UserId, UserProfile,
};
use cairn_expr::Matcher;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

// ============================================================================
// UPDATE TYPES
// ============================================================================

/// Update payload for user challenges.
#[derive(Debug, Clone, Default)]
pub struct UserChallengeUpdate {
    /// New user-declared status
    pub status: Option<UserChallengeStatus>,
    /// New engine-derived status
    pub computed_status: Option<UserChallengeStatus>,
    /// Refreshed snapshot-aggregate mirror
    pub latest_aggregate: Option<ProgressAggregate>,
    /// Declarative override flag
    pub manual_override: Option<bool>,
    /// Override reason, set together with the flag
    pub override_reason: Option<String>,
    /// Override timestamp
    pub overridden_at: Option<Timestamp>,
}

/// Update payload for tasks. Only the fields the progress evaluator owns.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    /// Promoted status
    pub status: Option<TaskStatus>,
    /// Last-computed counters
    pub metrics: Option<serde_json::Value>,
    /// Evaluation timestamp
    pub last_evaluated_at: Option<Timestamp>,
}

/// Outcome of a target upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

// ============================================================================
// STORAGE TRAITS
// ============================================================================

/// User challenges, their tasks, and their progress snapshots.
pub trait ChallengeStore: Send + Sync {
    /// Insert a new user challenge.
    fn user_challenge_insert(&self, uc: &UserChallenge) -> CairnResult<()>;

    /// Get a user challenge by id.
    fn user_challenge_get(&self, id: UserChallengeId) -> CairnResult<Option<UserChallenge>>;

    /// Update a user challenge.
    fn user_challenge_update(
        &self,
        id: UserChallengeId,
        update: UserChallengeUpdate,
    ) -> CairnResult<()>;

    /// List a user's challenges, optionally including pending ones.
    fn user_challenge_list(
        &self,
        user_id: UserId,
        include_pending: bool,
    ) -> CairnResult<Vec<UserChallenge>>;

    /// Replace the whole task list of a user challenge. Tasks are never
    /// partially patched; omission deletes.
    fn tasks_replace(
        &self,
        user_challenge_id: UserChallengeId,
        tasks: Vec<ChallengeTask>,
    ) -> CairnResult<Vec<ChallengeTask>>;

    /// List tasks of a user challenge in stored order.
    fn tasks_list(&self, user_challenge_id: UserChallengeId) -> CairnResult<Vec<ChallengeTask>>;

    /// Update one task (status promotion, metrics, timestamps).
    fn task_update(&self, id: TaskId, update: TaskUpdate) -> CairnResult<()>;

    /// Append one progress snapshot. Snapshots are immutable; inserting an
    /// existing id fails.
    fn snapshot_insert(&self, snapshot: &ProgressSnapshot) -> CairnResult<()>;

    /// The most recent snapshot of a user challenge.
    fn snapshot_latest(
        &self,
        user_challenge_id: UserChallengeId,
    ) -> CairnResult<Option<ProgressSnapshot>>;

    /// Number of snapshots recorded for a user challenge.
    fn snapshot_count(&self, user_challenge_id: UserChallengeId) -> CairnResult<usize>;

    /// Snapshot history, newest first, optionally only snapshots checked
    /// strictly before `before`.
    fn snapshot_history(
        &self,
        user_challenge_id: UserChallengeId,
        limit: usize,
        before: Option<Timestamp>,
    ) -> CairnResult<Vec<ProgressSnapshot>>;
}

/// The geocache dataset and the per-user find join.
pub trait GeocacheStore: Send + Sync {
    /// Insert a geocache.
    fn geocache_insert(&self, cache: &Geocache) -> CairnResult<()>;

    /// Get a geocache by id.
    fn geocache_get(&self, id: GeocacheId) -> CairnResult<Option<Geocache>>;

    /// Record a find.
    fn find_insert(&self, find: &Find) -> CairnResult<()>;

    /// All geocaches the user has found.
    fn found_geocaches(&self, user_id: UserId) -> CairnResult<Vec<Geocache>>;

    /// Ids of all geocaches the user has found.
    fn found_geocache_ids(&self, user_id: UserId) -> CairnResult<Vec<GeocacheId>>;

    /// Search the dataset with a compiled matcher plus exclusion/geo options.
    /// Results come back distance-ascending when a center is given,
    /// otherwise in stable id order.
    fn geocache_search(
        &self,
        matcher: &Matcher,
        options: &SearchOptions,
    ) -> CairnResult<Vec<GeocacheHit>>;
}

/// User profiles; the scorer reads home locations from here.
pub trait UserStore: Send + Sync {
    /// Insert a user profile.
    fn user_insert(&self, user: &UserProfile) -> CairnResult<()>;

    /// Get a user profile by id.
    fn user_get(&self, id: UserId) -> CairnResult<Option<UserProfile>>;
}

/// Persisted target recommendations.
pub trait TargetStore: Send + Sync {
    /// Upsert by (user, user challenge, geocache). An update overwrites
    /// score and diagnostics but preserves `pinned` and `created_at`.
    fn target_upsert(&self, target: &Target) -> CairnResult<UpsertOutcome>;

    /// Number of targets stored for a user challenge.
    fn target_count(&self, user_challenge_id: UserChallengeId) -> CairnResult<usize>;

    /// Set the user's pinned flag on one target.
    fn target_set_pinned(
        &self,
        user_id: UserId,
        user_challenge_id: UserChallengeId,
        geocache_id: GeocacheId,
        pinned: bool,
    ) -> CairnResult<()>;

    /// Paged listing, scoped per the query.
    fn targets_list(&self, query: &TargetQuery) -> CairnResult<TargetPage>;

    /// Bulk-clear all targets of a user challenge; returns how many were
    /// removed. The only way targets ever disappear.
    fn targets_clear(&self, user_challenge_id: UserChallengeId) -> CairnResult<usize>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

type TargetKey = (UserId, UserChallengeId, GeocacheId);

/// In-memory store for tests and single-process deployments.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    users: Arc<RwLock<HashMap<UserId, UserProfile>>>,
    geocaches: Arc<RwLock<HashMap<GeocacheId, Geocache>>>,
    finds: Arc<RwLock<HashMap<(UserId, GeocacheId), Find>>>,
    user_challenges: Arc<RwLock<HashMap<UserChallengeId, UserChallenge>>>,
    tasks: Arc<RwLock<HashMap<TaskId, ChallengeTask>>>,
    snapshots: Arc<RwLock<HashMap<cairn_core::SnapshotId, ProgressSnapshot>>>,
    targets: Arc<RwLock<HashMap<TargetKey, Target>>>,
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StorageError> {
    lock.read().map_err(|_| StorageError::LockPoisoned)
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StorageError> {
    lock.write().map_err(|_| StorageError::LockPoisoned)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count of stored geocaches.
    pub fn geocache_count(&self) -> usize {
        self.geocaches.read().map(|g| g.len()).unwrap_or(0)
    }

    /// Count of stored finds.
    pub fn find_count(&self) -> usize {
        self.finds.read().map(|f| f.len()).unwrap_or(0)
    }
}

impl ChallengeStore for MemoryStore {
    fn user_challenge_insert(&self, uc: &UserChallenge) -> CairnResult<()> {
        let mut challenges = write(&self.user_challenges)?;
        if challenges.contains_key(&uc.user_challenge_id) {
            return Err(StorageError::InsertFailed {
                entity_type: EntityType::UserChallenge,
                reason: "already exists".to_string(),
            }
            .into());
        }
        challenges.insert(uc.user_challenge_id, uc.clone());
        Ok(())
    }

    fn user_challenge_get(&self, id: UserChallengeId) -> CairnResult<Option<UserChallenge>> {
        let challenges = read(&self.user_challenges)?;
        Ok(challenges.get(&id).cloned())
    }

    fn user_challenge_update(
        &self,
        id: UserChallengeId,
        update: UserChallengeUpdate,
    ) -> CairnResult<()> {
        let mut challenges = write(&self.user_challenges)?;
        let uc = challenges.get_mut(&id).ok_or(StorageError::NotFound {
            entity_type: EntityType::UserChallenge,
            id: id.as_uuid(),
        })?;

        if let Some(status) = update.status {
            uc.status = status;
        }
        if let Some(computed) = update.computed_status {
            uc.computed_status = Some(computed);
        }
        if let Some(aggregate) = update.latest_aggregate {
            uc.latest_aggregate = Some(aggregate);
        }
        if let Some(manual_override) = update.manual_override {
            uc.manual_override = manual_override;
        }
        if let Some(reason) = update.override_reason {
            uc.override_reason = Some(reason);
        }
        if let Some(at) = update.overridden_at {
            uc.overridden_at = Some(at);
        }
        uc.updated_at = chrono::Utc::now();

        Ok(())
    }

    fn user_challenge_list(
        &self,
        user_id: UserId,
        include_pending: bool,
    ) -> CairnResult<Vec<UserChallenge>> {
        let challenges = read(&self.user_challenges)?;
        let mut out: Vec<UserChallenge> = challenges
            .values()
            .filter(|uc| uc.user_id == user_id)
            .filter(|uc| include_pending || uc.status != UserChallengeStatus::Pending)
            .cloned()
            .collect();
        out.sort_by_key(|uc| uc.user_challenge_id);
        Ok(out)
    }

    fn tasks_replace(
        &self,
        user_challenge_id: UserChallengeId,
        new_tasks: Vec<ChallengeTask>,
    ) -> CairnResult<Vec<ChallengeTask>> {
        let mut tasks = write(&self.tasks)?;
        tasks.retain(|_, t| t.user_challenge_id != user_challenge_id);
        for task in &new_tasks {
            tasks.insert(task.task_id, task.clone());
        }
        Ok(new_tasks)
    }

    fn tasks_list(&self, user_challenge_id: UserChallengeId) -> CairnResult<Vec<ChallengeTask>> {
        let tasks = read(&self.tasks)?;
        let mut out: Vec<ChallengeTask> = tasks
            .values()
            .filter(|t| t.user_challenge_id == user_challenge_id)
            .cloned()
            .collect();
        out.sort_by_key(|t| t.order);
        Ok(out)
    }

    fn task_update(&self, id: TaskId, update: TaskUpdate) -> CairnResult<()> {
        let mut tasks = write(&self.tasks)?;
        let task = tasks.get_mut(&id).ok_or(StorageError::NotFound {
            entity_type: EntityType::Task,
            id: id.as_uuid(),
        })?;

        if let Some(status) = update.status {
            task.status = status;
        }
        if let Some(metrics) = update.metrics {
            task.metrics = Some(metrics);
        }
        if let Some(at) = update.last_evaluated_at {
            task.last_evaluated_at = Some(at);
        }
        task.updated_at = chrono::Utc::now();

        Ok(())
    }

    fn snapshot_insert(&self, snapshot: &ProgressSnapshot) -> CairnResult<()> {
        let mut snapshots = write(&self.snapshots)?;
        if snapshots.contains_key(&snapshot.snapshot_id) {
            return Err(StorageError::InsertFailed {
                entity_type: EntityType::Snapshot,
                reason: "snapshots are append-only".to_string(),
            }
            .into());
        }
        snapshots.insert(snapshot.snapshot_id, snapshot.clone());
        Ok(())
    }

    fn snapshot_latest(
        &self,
        user_challenge_id: UserChallengeId,
    ) -> CairnResult<Option<ProgressSnapshot>> {
        let snapshots = read(&self.snapshots)?;
        Ok(snapshots
            .values()
            .filter(|s| s.user_challenge_id == user_challenge_id)
            .max_by_key(|s| (s.checked_at, s.snapshot_id))
            .cloned())
    }

    fn snapshot_count(&self, user_challenge_id: UserChallengeId) -> CairnResult<usize> {
        let snapshots = read(&self.snapshots)?;
        Ok(snapshots
            .values()
            .filter(|s| s.user_challenge_id == user_challenge_id)
            .count())
    }

    fn snapshot_history(
        &self,
        user_challenge_id: UserChallengeId,
        limit: usize,
        before: Option<Timestamp>,
    ) -> CairnResult<Vec<ProgressSnapshot>> {
        let snapshots = read(&self.snapshots)?;
        let mut out: Vec<ProgressSnapshot> = snapshots
            .values()
            .filter(|s| s.user_challenge_id == user_challenge_id)
            .filter(|s| before.map_or(true, |b| s.checked_at < b))
            .cloned()
            .collect();
        out.sort_by_key(|s| std::cmp::Reverse((s.checked_at, s.snapshot_id)));
        out.truncate(limit);
        Ok(out)
    }
}

impl GeocacheStore for MemoryStore {
    fn geocache_insert(&self, cache: &Geocache) -> CairnResult<()> {
        let mut geocaches = write(&self.geocaches)?;
        if geocaches.contains_key(&cache.geocache_id) {
            return Err(StorageError::InsertFailed {
                entity_type: EntityType::Geocache,
                reason: "already exists".to_string(),
            }
            .into());
        }
        geocaches.insert(cache.geocache_id, cache.clone());
        Ok(())
    }

    fn geocache_get(&self, id: GeocacheId) -> CairnResult<Option<Geocache>> {
        let geocaches = read(&self.geocaches)?;
        Ok(geocaches.get(&id).cloned())
    }

    fn find_insert(&self, find: &Find) -> CairnResult<()> {
        let mut finds = write(&self.finds)?;
        finds.insert((find.user_id, find.geocache_id), find.clone());
        Ok(())
    }

    fn found_geocaches(&self, user_id: UserId) -> CairnResult<Vec<Geocache>> {
        let finds = read(&self.finds)?;
        let geocaches = read(&self.geocaches)?;
        let mut out: Vec<Geocache> = finds
            .keys()
            .filter(|(uid, _)| *uid == user_id)
            .filter_map(|(_, gid)| geocaches.get(gid).cloned())
            .collect();
        out.sort_by_key(|g| g.geocache_id);
        Ok(out)
    }

    fn found_geocache_ids(&self, user_id: UserId) -> CairnResult<Vec<GeocacheId>> {
        let finds = read(&self.finds)?;
        Ok(finds
            .keys()
            .filter(|(uid, _)| *uid == user_id)
            .map(|(_, gid)| *gid)
            .collect())
    }

    fn geocache_search(
        &self,
        matcher: &Matcher,
        options: &SearchOptions,
    ) -> CairnResult<Vec<GeocacheHit>> {
        let geocaches = read(&self.geocaches)?;
        let mut hits: Vec<GeocacheHit> = geocaches
            .values()
            .filter(|c| matcher.matches(c))
            .filter_map(|c| {
                options.admit(c).map(|distance_km| GeocacheHit {
                    geocache: c.clone(),
                    distance_km,
                })
            })
            .collect();

        if options.center.is_some() {
            hits.sort_by(|a, b| {
                let da = a.distance_km.unwrap_or(f64::INFINITY);
                let db = b.distance_km.unwrap_or(f64::INFINITY);
                da.total_cmp(&db)
                    .then_with(|| a.geocache.geocache_id.cmp(&b.geocache.geocache_id))
            });
        } else {
            hits.sort_by_key(|h| h.geocache.geocache_id);
        }

        if let Some(limit) = options.limit {
            hits.truncate(limit);
        }
        Ok(hits)
    }
}

impl UserStore for MemoryStore {
    fn user_insert(&self, user: &UserProfile) -> CairnResult<()> {
        let mut users = write(&self.users)?;
        if users.contains_key(&user.user_id) {
            return Err(StorageError::InsertFailed {
                entity_type: EntityType::User,
                reason: "already exists".to_string(),
            }
            .into());
        }
        users.insert(user.user_id, user.clone());
        Ok(())
    }

    fn user_get(&self, id: UserId) -> CairnResult<Option<UserProfile>> {
        let users = read(&self.users)?;
        Ok(users.get(&id).cloned())
    }
}

impl TargetStore for MemoryStore {
    fn target_upsert(&self, target: &Target) -> CairnResult<UpsertOutcome> {
        let mut targets = write(&self.targets)?;
        let key = (target.user_id, target.user_challenge_id, target.geocache_id);
        match targets.get_mut(&key) {
            Some(existing) => {
                let pinned = existing.pinned;
                let created_at = existing.created_at;
                *existing = target.clone();
                existing.pinned = pinned;
                existing.created_at = created_at;
                existing.updated_at = chrono::Utc::now();
                Ok(UpsertOutcome::Updated)
            }
            None => {
                targets.insert(key, target.clone());
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    fn target_count(&self, user_challenge_id: UserChallengeId) -> CairnResult<usize> {
        let targets = read(&self.targets)?;
        Ok(targets
            .values()
            .filter(|t| t.user_challenge_id == user_challenge_id)
            .count())
    }

    fn target_set_pinned(
        &self,
        user_id: UserId,
        user_challenge_id: UserChallengeId,
        geocache_id: GeocacheId,
        pinned: bool,
    ) -> CairnResult<()> {
        let mut targets = write(&self.targets)?;
        let target = targets
            .get_mut(&(user_id, user_challenge_id, geocache_id))
            .ok_or(StorageError::NotFound {
                entity_type: EntityType::Target,
                id: geocache_id.as_uuid(),
            })?;
        target.pinned = pinned;
        target.updated_at = chrono::Utc::now();
        Ok(())
    }

    fn targets_list(&self, query: &TargetQuery) -> CairnResult<TargetPage> {
        let targets = read(&self.targets)?;
        let mut items: Vec<Target> = targets
            .values()
            .filter(|t| t.user_id == query.user_id)
            .filter(|t| {
                query
                    .user_challenge_id
                    .map_or(true, |uc| t.user_challenge_id == uc)
            })
            .cloned()
            .collect();

        match query.sort {
            TargetSort::ScoreDesc => items.sort_by(|a, b| {
                b.score
                    .total_cmp(&a.score)
                    .then_with(|| a.geocache_id.cmp(&b.geocache_id))
            }),
            TargetSort::DistanceAsc => items.sort_by(|a, b| {
                let da = a.distance_km.unwrap_or(f64::INFINITY);
                let db = b.distance_km.unwrap_or(f64::INFINITY);
                da.total_cmp(&db)
                    .then_with(|| a.geocache_id.cmp(&b.geocache_id))
            }),
        }

        let total = items.len();
        let page = query.page.max(1);
        let per_page = query.per_page.max(1);
        let start = (page - 1).saturating_mul(per_page).min(total);
        let end = start.saturating_add(per_page).min(total);
        let items = items[start..end].to_vec();

        Ok(TargetPage {
            items,
            total,
            page,
            per_page,
        })
    }

    fn targets_clear(&self, user_challenge_id: UserChallengeId) -> CairnResult<usize> {
        let mut targets = write(&self.targets)?;
        let before = targets.len();
        targets.retain(|_, t| t.user_challenge_id != user_challenge_id);
        Ok(before - targets.len())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::{
        ChallengeId, CountryId, GeoPoint, SizeId, TargetDiagnostics, TaskConstraints, TypeId,
    };
    use cairn_expr::{compile_matcher, Condition};
    use cairn_core::Expr;
    use chrono::Utc;
    use proptest::prelude::*;

    fn sample_cache(type_id: TypeId) -> Geocache {
        Geocache {
            geocache_id: GeocacheId::generate(),
            code: "GC42".to_string(),
            title: "Sample".to_string(),
            type_id,
            size_id: SizeId::generate(),
            country_id: CountryId::generate(),
            state_id: None,
            placed_at: Utc::now(),
            difficulty: 2.0,
            terrain: 2.0,
            attributes: vec![],
            location: Some(GeoPoint { lat: 46.5, lon: 6.6 }),
            owner: "owner".to_string(),
            elevation: Some(400),
        }
    }

    fn sample_target(
        user_id: UserId,
        user_challenge_id: UserChallengeId,
        geocache_id: GeocacheId,
        score: f64,
    ) -> Target {
        let now = Utc::now();
        Target {
            user_id,
            user_challenge_id,
            geocache_id,
            primary_task_id: None,
            satisfies_task_ids: vec![],
            score,
            reasons: vec![],
            pinned: false,
            code: "GC42".to_string(),
            title: "Sample".to_string(),
            owner: "owner".to_string(),
            difficulty: 2.0,
            terrain: 2.0,
            location: None,
            distance_km: None,
            diagnostics: TargetDiagnostics {
                coverage: 1.0,
                urgency: 1.0,
                geo: 1.0,
                task_ratios: vec![],
                evaluated_at: now,
            },
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_tasks_replace_deletes_by_omission() {
        let store = MemoryStore::new();
        let uc_id = UserChallengeId::generate();
        let t1 = ChallengeTask::new(
            uc_id,
            0,
            "one",
            Expr::And { nodes: vec![] },
            TaskConstraints { min_count: 1 },
        );
        let t2 = ChallengeTask::new(
            uc_id,
            1,
            "two",
            Expr::And { nodes: vec![] },
            TaskConstraints { min_count: 1 },
        );
        store.tasks_replace(uc_id, vec![t1.clone(), t2]).unwrap();
        assert_eq!(store.tasks_list(uc_id).unwrap().len(), 2);

        store.tasks_replace(uc_id, vec![t1]).unwrap();
        let remaining = store.tasks_list(uc_id).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].title, "one");
    }

    #[test]
    fn test_tasks_list_sorted_by_order() {
        let store = MemoryStore::new();
        let uc_id = UserChallengeId::generate();
        let mk = |order| {
            ChallengeTask::new(
                uc_id,
                order,
                &format!("t{order}"),
                Expr::And { nodes: vec![] },
                TaskConstraints::default(),
            )
        };
        store.tasks_replace(uc_id, vec![mk(2), mk(0), mk(1)]).unwrap();
        let orders: Vec<i32> = store
            .tasks_list(uc_id)
            .unwrap()
            .iter()
            .map(|t| t.order)
            .collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[test]
    fn test_snapshot_append_only() {
        let store = MemoryStore::new();
        let uc_id = UserChallengeId::generate();
        let snapshot = ProgressSnapshot {
            snapshot_id: cairn_core::SnapshotId::generate(),
            user_challenge_id: uc_id,
            checked_at: Utc::now(),
            aggregate: ProgressAggregate {
                percent: 0.0,
                tasks_done: 0,
                tasks_total: 1,
                checked_at: Utc::now(),
            },
            tasks: vec![],
            created_at: Utc::now(),
        };
        store.snapshot_insert(&snapshot).unwrap();
        assert!(store.snapshot_insert(&snapshot).is_err());
        assert_eq!(store.snapshot_count(uc_id).unwrap(), 1);
    }

    #[test]
    fn test_snapshot_latest_and_history_order() {
        let store = MemoryStore::new();
        let uc_id = UserChallengeId::generate();
        let base = Utc::now();
        for i in 0..3i64 {
            let at = base + chrono::Duration::minutes(i);
            store
                .snapshot_insert(&ProgressSnapshot {
                    snapshot_id: cairn_core::SnapshotId::generate(),
                    user_challenge_id: uc_id,
                    checked_at: at,
                    aggregate: ProgressAggregate {
                        percent: i as f64,
                        tasks_done: 0,
                        tasks_total: 1,
                        checked_at: at,
                    },
                    tasks: vec![],
                    created_at: at,
                })
                .unwrap();
        }
        let latest = store.snapshot_latest(uc_id).unwrap().unwrap();
        assert_eq!(latest.aggregate.percent, 2.0);

        let history = store.snapshot_history(uc_id, 2, None).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].aggregate.percent, 2.0);
        assert_eq!(history[1].aggregate.percent, 1.0);

        // `before` bounds the window from above.
        let older = store
            .snapshot_history(uc_id, 10, Some(base + chrono::Duration::minutes(1)))
            .unwrap();
        assert_eq!(older.len(), 1);
        assert_eq!(older[0].aggregate.percent, 0.0);
    }

    #[test]
    fn test_search_applies_matcher_and_exclusions() {
        let store = MemoryStore::new();
        let wanted_type = TypeId::generate();
        let hit = sample_cache(wanted_type);
        let miss = sample_cache(TypeId::generate());
        let mut owned = sample_cache(wanted_type);
        owned.owner = "me".to_string();
        store.geocache_insert(&hit).unwrap();
        store.geocache_insert(&miss).unwrap();
        store.geocache_insert(&owned).unwrap();

        let matcher = compile_matcher(&Expr::TypeIn {
            types: vec![cairn_core::TypeSelector {
                type_id: Some(wanted_type),
                code: None,
            }],
        });
        assert!(matches!(matcher, Matcher::Cond(Condition::TypeIn(_))));

        let options = SearchOptions {
            exclude_owner: Some("me".to_string()),
            ..Default::default()
        };
        let hits = store.geocache_search(&matcher, &options).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].geocache.geocache_id, hit.geocache_id);
    }

    #[test]
    fn test_target_upsert_preserves_pinned() {
        let store = MemoryStore::new();
        let user = UserId::generate();
        let uc = UserChallengeId::generate();
        let gc = GeocacheId::generate();

        let first = sample_target(user, uc, gc, 0.4);
        assert_eq!(store.target_upsert(&first).unwrap(), UpsertOutcome::Inserted);
        store.target_set_pinned(user, uc, gc, true).unwrap();

        let second = sample_target(user, uc, gc, 0.9);
        assert_eq!(store.target_upsert(&second).unwrap(), UpsertOutcome::Updated);

        let page = store.targets_list(&TargetQuery::for_challenge(user, uc)).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].score, 0.9);
        assert!(page.items[0].pinned);
    }

    #[test]
    fn test_targets_list_paging_and_sort() {
        let store = MemoryStore::new();
        let user = UserId::generate();
        let uc = UserChallengeId::generate();
        for score in [0.2, 0.9, 0.5] {
            store
                .target_upsert(&sample_target(user, uc, GeocacheId::generate(), score))
                .unwrap();
        }
        let mut query = TargetQuery::for_challenge(user, uc);
        query.per_page = 2;
        let page = store.targets_list(&query).unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].score, 0.9);
        assert_eq!(page.items[1].score, 0.5);

        query.page = 2;
        let page2 = store.targets_list(&query).unwrap();
        assert_eq!(page2.items.len(), 1);
        assert_eq!(page2.items[0].score, 0.2);
    }

    #[test]
    fn test_targets_clear_scoped_to_challenge() {
        let store = MemoryStore::new();
        let user = UserId::generate();
        let uc1 = UserChallengeId::generate();
        let uc2 = UserChallengeId::generate();
        store
            .target_upsert(&sample_target(user, uc1, GeocacheId::generate(), 0.5))
            .unwrap();
        store
            .target_upsert(&sample_target(user, uc2, GeocacheId::generate(), 0.5))
            .unwrap();

        assert_eq!(store.targets_clear(uc1).unwrap(), 1);
        assert_eq!(store.target_count(uc1).unwrap(), 0);
        assert_eq!(store.target_count(uc2).unwrap(), 1);
    }

    #[test]
    fn test_user_challenge_list_filters_pending() {
        let store = MemoryStore::new();
        let user = UserId::generate();
        let accepted = UserChallenge::new(user, ChallengeId::generate());
        let pending = UserChallenge::new(user, ChallengeId::generate())
            .with_status(UserChallengeStatus::Pending);
        store.user_challenge_insert(&accepted).unwrap();
        store.user_challenge_insert(&pending).unwrap();

        assert_eq!(store.user_challenge_list(user, false).unwrap().len(), 1);
        assert_eq!(store.user_challenge_list(user, true).unwrap().len(), 2);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_repeated_upserts_keep_pinned_and_created_at(
            scores in proptest::collection::vec(0.0f64..1.0, 1..8),
            pin in proptest::bool::ANY,
        ) {
            let store = MemoryStore::new();
            let user = UserId::generate();
            let uc = UserChallengeId::generate();
            let gc = GeocacheId::generate();

            let first = sample_target(user, uc, gc, scores[0]);
            prop_assert_eq!(store.target_upsert(&first).unwrap(), UpsertOutcome::Inserted);
            let created_at = store
                .targets_list(&TargetQuery::for_challenge(user, uc))
                .unwrap()
                .items[0]
                .created_at;
            store.target_set_pinned(user, uc, gc, pin).unwrap();

            for &score in &scores[1..] {
                let next = sample_target(user, uc, gc, score);
                prop_assert_eq!(store.target_upsert(&next).unwrap(), UpsertOutcome::Updated);
            }

            let page = store.targets_list(&TargetQuery::for_challenge(user, uc)).unwrap();
            prop_assert_eq!(page.items.len(), 1);
            let stored = &page.items[0];
            prop_assert_eq!(stored.pinned, pin);
            prop_assert_eq!(stored.created_at, created_at);
            prop_assert_eq!(stored.score, *scores.last().unwrap());
        }
    }
}
