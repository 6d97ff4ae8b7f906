//! Query option types for geocache search and target listing.

use cairn_core::{GeoPoint, Geocache, GeocacheId, Target, UserChallengeId, UserId};
use std::collections::HashSet;

/// Options for candidate geocache search.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Geocaches to skip (already found by the acting user).
    pub exclude_geocache_ids: HashSet<GeocacheId>,
    /// Skip geocaches whose declared owner matches this identity.
    pub exclude_owner: Option<String>,
    /// Reference point for distance computation and radius filtering.
    pub center: Option<GeoPoint>,
    /// Radius filter in kilometers; only applied when `center` is set.
    pub radius_km: Option<f64>,
    /// Soft result cap; `None` means unbounded.
    pub limit: Option<usize>,
}

impl SearchOptions {
    /// Whether a geocache passes the exclusion and radius filters. Distance
    /// is returned so callers don't compute it twice.
    pub fn admit(&self, cache: &Geocache) -> Option<Option<f64>> {
        if self.exclude_geocache_ids.contains(&cache.geocache_id) {
            return None;
        }
        if let Some(owner) = &self.exclude_owner {
            if cache.owner.eq_ignore_ascii_case(owner) {
                return None;
            }
        }
        let distance = match (self.center, cache.location) {
            (Some(center), Some(loc)) => Some(center.distance_km(&loc)),
            _ => None,
        };
        if let Some(radius) = self.radius_km {
            if self.center.is_some() {
                match distance {
                    Some(d) if d <= radius => {}
                    // No location or out of range: excluded from geo search.
                    _ => return None,
                }
            }
        }
        Some(distance)
    }
}

/// One search result with its distance from the reference point, when known.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocacheHit {
    pub geocache: Geocache,
    pub distance_km: Option<f64>,
}

/// Sort order for target listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetSort {
    #[default]
    ScoreDesc,
    DistanceAsc,
}

/// Paged target listing query. Scoped to one user challenge when
/// `user_challenge_id` is set, otherwise to everything the user has.
#[derive(Debug, Clone)]
pub struct TargetQuery {
    pub user_id: UserId,
    pub user_challenge_id: Option<UserChallengeId>,
    pub page: usize,
    pub per_page: usize,
    pub sort: TargetSort,
}

impl TargetQuery {
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id,
            user_challenge_id: None,
            page: 1,
            per_page: 50,
            sort: TargetSort::default(),
        }
    }

    pub fn for_challenge(user_id: UserId, user_challenge_id: UserChallengeId) -> Self {
        Self {
            user_challenge_id: Some(user_challenge_id),
            ..Self::for_user(user_id)
        }
    }
}

/// One page of targets plus the total match count.
#[derive(Debug, Clone)]
pub struct TargetPage {
    pub items: Vec<Target>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
}

// =============================================================================
// TESTS
// =============================================================================
