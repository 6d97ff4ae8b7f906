//! Candidate discovery, scoring, and target persistence.
//!
//! For each not-yet-satisfied task the full compiler's predicate runs
//! against the geocache dataset; candidates are merged by geocache, scored
//! by coverage × urgency × proximity, and upserted. Re-scoring overwrites
//! score and diagnostics but never the user's `pinned` flag.

use crate::owned_challenge;
use cairn_core::{
    CairnResult, ChallengeTask, EvaluationError, GeoPoint, GeocacheId, Target, TargetDiagnostics,
    TaskId, TaskSnapshot, TaskStatus, TaskUrgency, UserChallengeId, UserId,
};
use cairn_expr::compile_matcher;
use cairn_storage::{
    ChallengeStore, GeocacheHit, GeocacheStore, SearchOptions, TargetPage, TargetQuery,
    TargetStore, UpsertOutcome, UserStore,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

/// Geographic reference for scoring and radius filtering.
#[derive(Debug, Clone, Copy)]
pub struct GeoContext {
    pub center: GeoPoint,
    pub radius_km: f64,
}

/// Caps and flags for one scoring run. Caps are soft: they bound work, not
/// correctness.
#[derive(Debug, Clone)]
pub struct ScoreOptions {
    pub limit_per_task: usize,
    pub hard_limit_total: usize,
    pub geo: Option<GeoContext>,
    pub force: bool,
}

impl Default for ScoreOptions {
    fn default() -> Self {
        Self {
            limit_per_task: 200,
            hard_limit_total: 2000,
            geo: None,
            force: false,
        }
    }
}

/// Outcome of one scoring run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub total: usize,
    pub skipped: bool,
}

/// When the stored target count already exceeds this multiple of the
/// per-task cap, a non-forced run is skipped.
const SKIP_MULTIPLIER: usize = 5;

/// Geo sub-score half-distance: 10 km away halves nothing, it scores
/// 1/(1+1) = 0.5.
const GEO_SCALE_KM: f64 = 10.0;

struct MatchedTask {
    task_id: TaskId,
    min_count: i64,
    current_count: i64,
    remaining: i64,
    ratio: f64,
    title: String,
}

pub struct TargetScorer<S> {
    store: Arc<S>,
}

impl<S> TargetScorer<S>
where
    S: ChallengeStore + GeocacheStore + UserStore + TargetStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Score and persist targets for one user challenge.
    pub fn score_targets(
        &self,
        user_id: UserId,
        user_challenge_id: UserChallengeId,
        options: &ScoreOptions,
    ) -> CairnResult<ScoreOutcome> {
        owned_challenge(self.store.as_ref(), user_id, user_challenge_id)?;

        if !options.force {
            let existing = self.store.target_count(user_challenge_id)?;
            let threshold = options
                .hard_limit_total
                .min(options.limit_per_task.saturating_mul(SKIP_MULTIPLIER));
            if existing >= threshold {
                return Ok(ScoreOutcome {
                    total: existing,
                    skipped: true,
                    ..Default::default()
                });
            }
        }

        let username = self
            .store
            .user_get(user_id)?
            .map(|u| u.username);
        let tasks = self.store.tasks_list(user_challenge_id)?;
        let progress = self.progress_task_map(user_challenge_id)?;
        let found_ids = self.store.found_geocache_ids(user_id)?;

        // Scope: every task still short of its threshold.
        let incomplete: Vec<&ChallengeTask> = tasks
            .iter()
            .filter(|t| !task_is_satisfied(t, &progress))
            .collect();
        let total_incomplete = incomplete.len();

        let mut merged: HashMap<GeocacheId, (GeocacheHit, Vec<MatchedTask>)> = HashMap::new();
        let mut order: Vec<GeocacheId> = Vec::new();

        for task in &incomplete {
            let matcher = compile_matcher(&task.expression);
            let search = SearchOptions {
                exclude_geocache_ids: found_ids.iter().copied().collect(),
                exclude_owner: username.clone(),
                center: options.geo.map(|g| g.center),
                radius_km: options.geo.map(|g| g.radius_km),
                limit: Some(options.limit_per_task),
            };

            for hit in self.store.geocache_search(&matcher, &search)? {
                let id = hit.geocache.geocache_id;
                if !merged.contains_key(&id) {
                    // The global cap bounds new candidates only; a cache
                    // already admitted still collects further tasks.
                    if merged.len() >= options.hard_limit_total {
                        continue;
                    }
                    order.push(id);
                    merged.insert(id, (hit, Vec::new()));
                }
                if let Some(entry) = merged.get_mut(&id) {
                    entry.1.push(matched_task(task, &progress));
                }
            }
        }

        let now = Utc::now();
        let mut outcome = ScoreOutcome::default();
        for id in order {
            let Some((hit, matched)) = merged.remove(&id) else {
                continue;
            };
            let target = build_target(
                user_id,
                user_challenge_id,
                &hit,
                matched,
                total_incomplete,
                options.geo.is_some(),
                now,
            );
            match self.store.target_upsert(&target)? {
                UpsertOutcome::Inserted => outcome.inserted += 1,
                UpsertOutcome::Updated => outcome.updated += 1,
            }
        }
        outcome.total = self.store.target_count(user_challenge_id)?;
        Ok(outcome)
    }

    /// Paged targets, challenge-scoped or across all of the user's
    /// challenges.
    pub fn list_targets(&self, query: &TargetQuery) -> CairnResult<TargetPage> {
        if let Some(uc) = query.user_challenge_id {
            owned_challenge(self.store.as_ref(), query.user_id, uc)?;
        }
        self.store.targets_list(query)
    }

    /// Distance-sorted targets around a reference point. Falls back to the
    /// user's home location; with neither, the call fails.
    pub fn list_targets_nearby(
        &self,
        query: &TargetQuery,
        center: Option<GeoPoint>,
        radius_km: Option<f64>,
    ) -> CairnResult<TargetPage> {
        if let Some(uc) = query.user_challenge_id {
            owned_challenge(self.store.as_ref(), query.user_id, uc)?;
        }
        let center = match center {
            Some(center) => center,
            None => self
                .store
                .user_get(query.user_id)?
                .and_then(|u| u.location)
                .ok_or(EvaluationError::NoReferencePoint)?,
        };

        // Pull the whole scope, re-derive distances from the resolved
        // center, then page in memory.
        let all = self.store.targets_list(&TargetQuery {
            page: 1,
            per_page: usize::MAX,
            ..query.clone()
        })?;

        let mut items: Vec<Target> = all
            .items
            .into_iter()
            .filter_map(|mut t| {
                let distance = t.location.map(|loc| center.distance_km(&loc))?;
                if radius_km.map_or(false, |r| distance > r) {
                    return None;
                }
                t.distance_km = Some(distance);
                Some(t)
            })
            .collect();
        items.sort_by(|a, b| {
            let da = a.distance_km.unwrap_or(f64::INFINITY);
            let db = b.distance_km.unwrap_or(f64::INFINITY);
            da.total_cmp(&db)
                .then_with(|| a.geocache_id.cmp(&b.geocache_id))
        });

        let total = items.len();
        let page = query.page.max(1);
        let per_page = query.per_page.max(1);
        let start = (page - 1).saturating_mul(per_page).min(total);
        let end = start.saturating_add(per_page).min(total);
        Ok(TargetPage {
            items: items[start..end].to_vec(),
            total,
            page,
            per_page,
        })
    }

    /// Flip the user's pinned flag on one target.
    pub fn set_pinned(
        &self,
        user_id: UserId,
        user_challenge_id: UserChallengeId,
        geocache_id: GeocacheId,
        pinned: bool,
    ) -> CairnResult<()> {
        owned_challenge(self.store.as_ref(), user_id, user_challenge_id)?;
        self.store
            .target_set_pinned(user_id, user_challenge_id, geocache_id, pinned)
    }

    /// Bulk-clear every target of a user challenge.
    pub fn clear_targets(
        &self,
        user_id: UserId,
        user_challenge_id: UserChallengeId,
    ) -> CairnResult<usize> {
        owned_challenge(self.store.as_ref(), user_id, user_challenge_id)?;
        self.store.targets_clear(user_challenge_id)
    }

    /// Per-task counters from the latest snapshot.
    fn progress_task_map(
        &self,
        user_challenge_id: UserChallengeId,
    ) -> CairnResult<HashMap<TaskId, TaskSnapshot>> {
        let map = self
            .store
            .snapshot_latest(user_challenge_id)?
            .map(|s| s.tasks.into_iter().map(|t| (t.task_id, t)).collect())
            .unwrap_or_default();
        Ok(map)
    }
}

/// Whether a task no longer needs candidates.
fn task_is_satisfied(task: &ChallengeTask, progress: &HashMap<TaskId, TaskSnapshot>) -> bool {
    if task.status == TaskStatus::Done {
        return true;
    }
    match progress.get(&task.task_id) {
        Some(snap) => snap.percent >= 100.0,
        None => false,
    }
}

fn matched_task(task: &ChallengeTask, progress: &HashMap<TaskId, TaskSnapshot>) -> MatchedTask {
    let min_count = task.constraints.min_count;
    let current = progress
        .get(&task.task_id)
        .map(|s| s.current_count)
        .unwrap_or(0);
    let remaining = (min_count - current).max(0);
    let ratio = if min_count > 0 {
        remaining as f64 / min_count as f64
    } else {
        // Unthresholded but unmet still deserves attention.
        1.0
    };
    MatchedTask {
        task_id: task.task_id,
        min_count,
        current_count: current,
        remaining,
        ratio,
        title: task.title.clone(),
    }
}

#[allow(clippy::too_many_arguments)]
fn build_target(
    user_id: UserId,
    user_challenge_id: UserChallengeId,
    hit: &GeocacheHit,
    matched: Vec<MatchedTask>,
    total_incomplete: usize,
    geo_requested: bool,
    now: chrono::DateTime<Utc>,
) -> Target {
    let coverage = if total_incomplete > 0 {
        (matched.len() as f64 / total_incomplete as f64).min(1.0)
    } else {
        0.0
    };
    let urgency = matched
        .iter()
        .map(|m| m.ratio)
        .fold(0.0_f64, f64::max)
        .min(1.0);
    let geo = match (geo_requested, hit.distance_km) {
        (true, Some(d)) => 1.0 / (1.0 + d / GEO_SCALE_KM),
        _ => 1.0,
    };
    let score = coverage * urgency * geo;

    // Primary task: highest urgency ratio, then larger threshold, then
    // stable id order.
    let primary = matched.iter().max_by(|a, b| {
        a.ratio
            .total_cmp(&b.ratio)
            .then_with(|| a.min_count.cmp(&b.min_count))
            .then_with(|| b.task_id.cmp(&a.task_id))
    });

    let mut reasons: Vec<String> = matched
        .iter()
        .map(|m| {
            if m.min_count > 0 {
                format!(
                    "counts toward '{}' ({}/{})",
                    m.title, m.current_count, m.min_count
                )
            } else {
                format!("counts toward '{}'", m.title)
            }
        })
        .collect();
    if let Some(d) = hit.distance_km {
        reasons.push(format!("{d:.1} km away"));
    }

    let cache = &hit.geocache;
    Target {
        user_id,
        user_challenge_id,
        geocache_id: cache.geocache_id,
        primary_task_id: primary.map(|m| m.task_id),
        satisfies_task_ids: matched.iter().map(|m| m.task_id).collect(),
        score,
        reasons,
        pinned: false,
        code: cache.code.clone(),
        title: cache.title.clone(),
        owner: cache.owner.clone(),
        difficulty: cache.difficulty,
        terrain: cache.terrain,
        location: cache.location,
        distance_km: hit.distance_km,
        diagnostics: TargetDiagnostics {
            coverage,
            urgency,
            geo,
            task_ratios: matched
                .iter()
                .map(|m| TaskUrgency {
                    task_id: m.task_id,
                    min_count: m.min_count,
                    current_count: m.current_count,
                    remaining: m.remaining,
                    ratio: m.ratio,
                })
                .collect(),
            evaluated_at: now,
        },
        created_at: now,
        updated_at: now,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::{
        CairnError, ChallengeId, ChallengeTask, Expr, TaskConstraints, TypeSelector, UserChallenge,
        UserProfile,
    };
    use cairn_storage::{ChallengeStore, UserStore};
    use cairn_test_utils::{seeded_store, TestWorld, HOME};

    fn type_task(world: &TestWorld, order: i32, type_id: cairn_core::TypeId) -> ChallengeTask {
        ChallengeTask::new(
            world.user_challenge,
            order,
            &format!("Type hunt #{order}"),
            Expr::And {
                nodes: vec![Expr::TypeIn {
                    types: vec![TypeSelector {
                        type_id: Some(type_id),
                        code: None,
                    }],
                }],
            },
            TaskConstraints { min_count: 3 },
        )
    }

    fn year_task(world: &TestWorld, order: i32, year: i32) -> ChallengeTask {
        ChallengeTask::new(
            world.user_challenge,
            order,
            &format!("Placed in {year}"),
            Expr::And {
                nodes: vec![Expr::PlacedYear { year }],
            },
            TaskConstraints { min_count: 3 },
        )
    }

    fn install(world: &TestWorld, tasks: Vec<ChallengeTask>) {
        world
            .store
            .tasks_replace(world.user_challenge, tasks)
            .unwrap();
    }

    fn challenge_targets(world: &TestWorld) -> Vec<Target> {
        world
            .store
            .targets_list(&TargetQuery::for_challenge(world.user, world.user_challenge))
            .unwrap()
            .items
    }

    #[test]
    fn test_dual_task_candidate_outscores_single_task() {
        let world = seeded_store();
        install(
            &world,
            vec![
                type_task(&world, 0, world.refs.traditional),
                year_task(&world, 1, 2005),
            ],
        );
        // Matches both tasks (traditional, placed 2005).
        let dual = world.cache();
        world.place(&dual);
        // Matches only the year task.
        let single = world.mystery_cache();
        world.place(&single);

        let scorer = TargetScorer::new(world.store.clone());
        let outcome = scorer
            .score_targets(world.user, world.user_challenge, &ScoreOptions::default())
            .unwrap();
        assert_eq!(outcome.inserted, 2);
        assert!(!outcome.skipped);

        let targets = challenge_targets(&world);
        assert_eq!(targets[0].geocache_id, dual.geocache_id);
        assert_eq!(targets[0].satisfies_task_ids.len(), 2);
        assert!(targets[0].score > targets[1].score);
        assert_eq!(targets[0].diagnostics.coverage, 1.0);
        assert_eq!(targets[1].diagnostics.coverage, 0.5);
    }

    #[test]
    fn test_nearby_candidate_outscores_remote() {
        let world = seeded_store();
        install(&world, vec![type_task(&world, 0, world.refs.traditional)]);
        let near = world.cache();
        world.place(&near);
        let mut far = world.cache();
        far.location = Some(GeoPoint {
            lat: HOME.lat + 0.3,
            lon: HOME.lon,
        });
        world.place(&far);

        let scorer = TargetScorer::new(world.store.clone());
        let options = ScoreOptions {
            geo: Some(GeoContext {
                center: HOME,
                radius_km: 100.0,
            }),
            ..Default::default()
        };
        scorer
            .score_targets(world.user, world.user_challenge, &options)
            .unwrap();

        let targets = challenge_targets(&world);
        assert_eq!(targets[0].geocache_id, near.geocache_id);
        assert!(targets[0].diagnostics.geo > targets[1].diagnostics.geo);
        assert!(targets[0].distance_km.unwrap() < targets[1].distance_km.unwrap());
    }

    #[test]
    fn test_found_and_own_caches_are_excluded() {
        let world = seeded_store();
        install(&world, vec![type_task(&world, 0, world.refs.traditional)]);
        // Already found.
        world.log_find(&world.cache());
        // Owned by the acting user.
        let mut own = world.cache();
        own.owner = "tester".to_string();
        world.place(&own);
        let clean = world.cache();
        world.place(&clean);

        let scorer = TargetScorer::new(world.store.clone());
        scorer
            .score_targets(world.user, world.user_challenge, &ScoreOptions::default())
            .unwrap();

        let targets = challenge_targets(&world);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].geocache_id, clean.geocache_id);
    }

    #[test]
    fn test_rescore_preserves_pinned_flag() {
        let world = seeded_store();
        install(&world, vec![type_task(&world, 0, world.refs.traditional)]);
        let cache = world.cache();
        world.place(&cache);

        let scorer = TargetScorer::new(world.store.clone());
        scorer
            .score_targets(world.user, world.user_challenge, &ScoreOptions::default())
            .unwrap();
        scorer
            .set_pinned(world.user, world.user_challenge, cache.geocache_id, true)
            .unwrap();

        let forced = ScoreOptions {
            force: true,
            ..Default::default()
        };
        let outcome = scorer
            .score_targets(world.user, world.user_challenge, &forced)
            .unwrap();
        assert_eq!(outcome.updated, 1);
        assert!(challenge_targets(&world)[0].pinned);
    }

    #[test]
    fn test_saturated_challenge_skips_unless_forced() {
        let world = seeded_store();
        install(&world, vec![type_task(&world, 0, world.refs.traditional)]);
        for _ in 0..5 {
            world.place(&world.cache());
        }

        let scorer = TargetScorer::new(world.store.clone());
        scorer
            .score_targets(world.user, world.user_challenge, &ScoreOptions::default())
            .unwrap();

        // 5 stored targets >= min(2000, 1 * 5).
        let tight = ScoreOptions {
            limit_per_task: 1,
            ..Default::default()
        };
        let outcome = scorer
            .score_targets(world.user, world.user_challenge, &tight)
            .unwrap();
        assert!(outcome.skipped);
        assert_eq!(outcome.total, 5);

        let forced = ScoreOptions {
            limit_per_task: 1,
            force: true,
            ..Default::default()
        };
        assert!(!scorer
            .score_targets(world.user, world.user_challenge, &forced)
            .unwrap()
            .skipped);
    }

    #[test]
    fn test_nearby_listing_falls_back_to_home_location() {
        let world = seeded_store();
        install(&world, vec![type_task(&world, 0, world.refs.traditional)]);
        let near = world.cache();
        world.place(&near);
        let mut far = world.cache();
        far.location = Some(GeoPoint {
            lat: HOME.lat + 0.5,
            lon: HOME.lon,
        });
        world.place(&far);

        let scorer = TargetScorer::new(world.store.clone());
        scorer
            .score_targets(world.user, world.user_challenge, &ScoreOptions::default())
            .unwrap();

        let page = scorer
            .list_targets_nearby(
                &TargetQuery::for_challenge(world.user, world.user_challenge),
                None,
                Some(20.0),
            )
            .unwrap();
        // The far cache (~55 km) is outside the radius.
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].geocache_id, near.geocache_id);
        assert!(page.items[0].distance_km.unwrap() < 20.0);
    }

    #[test]
    fn test_nearby_listing_without_any_reference_point() {
        let world = seeded_store();
        let wanderer = UserId::generate();
        world
            .store
            .user_insert(&UserProfile {
                user_id: wanderer,
                username: "wanderer".to_string(),
                location: None,
            })
            .unwrap();
        let uc = UserChallenge::new(wanderer, ChallengeId::generate());
        world.store.user_challenge_insert(&uc).unwrap();

        let scorer = TargetScorer::new(world.store.clone());
        let err = scorer
            .list_targets_nearby(
                &TargetQuery::for_challenge(wanderer, uc.user_challenge_id),
                None,
                None,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CairnError::Evaluation(EvaluationError::NoReferencePoint)
        ));
    }

    #[test]
    fn test_clear_targets_scopes_to_challenge() {
        let world = seeded_store();
        install(&world, vec![type_task(&world, 0, world.refs.traditional)]);
        world.place(&world.cache());
        world.place(&world.cache());

        let scorer = TargetScorer::new(world.store.clone());
        scorer
            .score_targets(world.user, world.user_challenge, &ScoreOptions::default())
            .unwrap();
        let cleared = scorer.clear_targets(world.user, world.user_challenge).unwrap();
        assert_eq!(cleared, 2);
        assert!(challenge_targets(&world).is_empty());
    }

    #[test]
    fn test_done_tasks_produce_no_candidates() {
        let world = seeded_store();
        let done = ChallengeTask::new(
            world.user_challenge,
            0,
            "Finished already",
            Expr::And {
                nodes: vec![Expr::PlacedYear { year: 2005 }],
            },
            TaskConstraints { min_count: 1 },
        )
        .with_status(TaskStatus::Done);
        install(&world, vec![done]);
        world.place(&world.cache());

        let scorer = TargetScorer::new(world.store.clone());
        let outcome = scorer
            .score_targets(world.user, world.user_challenge, &ScoreOptions::default())
            .unwrap();
        assert_eq!(outcome.inserted, 0);
        assert!(challenge_targets(&world).is_empty());
    }
}
