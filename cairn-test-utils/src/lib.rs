//! Test infrastructure for the CAIRN workspace:
//! - A seeded in-memory world (store + referential catalog + one accepted
//!   user challenge) that engine tests build on
//! - Geocache and find fixtures wired to the seeded referential ids
//! - Proptest generators for domain values

pub use cairn_storage::{MemoryStore, ReferentialCatalog};

use cairn_core::{
    AttributeId, AttributeTag, ChallengeId, CountryId, Find, GeoPoint, Geocache, GeocacheId,
    ReferentialSnapshot, SizeId, StateId, TypeId, UserChallenge, UserChallengeId, UserId,
    UserProfile,
};
use cairn_storage::{ChallengeStore, GeocacheStore, UserStore};
use chrono::{TimeZone, Utc};
use std::sync::Arc;

/// Default home location for the seeded user (Lausanne).
pub const HOME: GeoPoint = GeoPoint {
    lat: 46.52,
    lon: 6.63,
};

// ============================================================================
// SEEDED REFERENTIALS
// ============================================================================

/// Referential ids the snapshot in [`seeded_store`] resolves. Codes and
/// names are fixed; ids are fresh per world.
#[derive(Debug, Clone, Copy)]
pub struct SeededRefs {
    pub traditional: TypeId,
    pub mystery: TypeId,
    pub micro: SizeId,
    pub regular: SizeId,
    pub switzerland: CountryId,
    pub france: CountryId,
    pub vaud: StateId,
    pub winter: AttributeId,
}

impl SeededRefs {
    fn generate() -> Self {
        Self {
            traditional: TypeId::generate(),
            mystery: TypeId::generate(),
            micro: SizeId::generate(),
            regular: SizeId::generate(),
            switzerland: CountryId::generate(),
            france: CountryId::generate(),
            vaud: StateId::generate(),
            winter: AttributeId::generate(),
        }
    }

    fn snapshot(&self) -> ReferentialSnapshot {
        ReferentialSnapshot::builder()
            .geocache_type(self.traditional, "traditional")
            .geocache_type(self.mystery, "mystery")
            .geocache_size(self.micro, "micro", "Micro")
            .geocache_size(self.regular, "regular", "Regular")
            .country(self.switzerland, "Switzerland")
            .country(self.france, "France")
            .state(self.vaud, self.switzerland, "Vaud")
            .attribute(self.winter, "winter")
            .build()
    }
}

// ============================================================================
// TEST WORLD
// ============================================================================

/// Everything an engine test starts from: a store holding one user with a
/// home location and one accepted user challenge, and a catalog resolving
/// the [`SeededRefs`] codes.
pub struct TestWorld {
    pub store: Arc<MemoryStore>,
    pub catalog: Arc<ReferentialCatalog>,
    pub user: UserId,
    pub challenge: ChallengeId,
    pub user_challenge: UserChallengeId,
    pub refs: SeededRefs,
}

pub fn seeded_store() -> TestWorld {
    let refs = SeededRefs::generate();
    let catalog = Arc::new(ReferentialCatalog::new(refs.snapshot()));
    let store = Arc::new(MemoryStore::default());

    let user = UserId::generate();
    store
        .user_insert(&UserProfile {
            user_id: user,
            username: "tester".to_string(),
            location: Some(HOME),
        })
        .expect("seed user");

    let challenge = ChallengeId::generate();
    let uc = UserChallenge::new(user, challenge);
    let user_challenge = uc.user_challenge_id;
    store.user_challenge_insert(&uc).expect("seed challenge");

    TestWorld {
        store,
        catalog,
        user,
        challenge,
        user_challenge,
        refs,
    }
}

impl TestWorld {
    /// A fresh traditional, regular-size cache in Vaud near [`HOME`],
    /// placed mid-2005. Mutate fields for specific scenarios.
    pub fn cache(&self) -> Geocache {
        let id = GeocacheId::generate();
        Geocache {
            geocache_id: id,
            code: format!("GC{}", &id.as_uuid().simple().to_string()[..6].to_uppercase()),
            title: "Lakeside stroll".to_string(),
            type_id: self.refs.traditional,
            size_id: self.refs.regular,
            country_id: self.refs.switzerland,
            state_id: Some(self.refs.vaud),
            placed_at: Utc.with_ymd_and_hms(2005, 6, 1, 12, 0, 0).unwrap(),
            difficulty: 1.5,
            terrain: 2.0,
            attributes: vec![],
            location: Some(GeoPoint {
                lat: HOME.lat + 0.01,
                lon: HOME.lon,
            }),
            owner: "hider".to_string(),
            elevation: Some(500),
        }
    }

    /// Same as [`TestWorld::cache`] but with the mystery type.
    pub fn mystery_cache(&self) -> Geocache {
        Geocache {
            type_id: self.refs.mystery,
            ..self.cache()
        }
    }

    /// An attribute tag for the seeded "winter" attribute.
    pub fn winter_attribute(&self, is_positive: bool) -> AttributeTag {
        AttributeTag {
            attribute_id: self.refs.winter,
            is_positive,
        }
    }

    /// Insert a cache into the dataset without logging a find.
    pub fn place(&self, cache: &Geocache) {
        self.store.geocache_insert(cache).expect("place cache");
    }

    /// Insert a cache and log a find for the world's user.
    pub fn log_find(&self, cache: &Geocache) {
        self.place(cache);
        self.store
            .find_insert(&Find {
                user_id: self.user,
                geocache_id: cache.geocache_id,
                found_at: Utc::now(),
            })
            .expect("log find");
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use cairn_core::GeoPoint;
    use proptest::prelude::*;

    /// A difficulty or terrain rating on the half-star scale.
    pub fn arb_rating() -> impl Strategy<Value = f64> {
        (2u32..=10).prop_map(|half| half as f64 / 2.0)
    }

    pub fn arb_geo_point() -> impl Strategy<Value = GeoPoint> {
        (-85.0..85.0f64, -180.0..180.0f64).prop_map(|(lat, lon)| GeoPoint { lat, lon })
    }

    /// A count threshold in the range real tasks use.
    pub fn arb_min_count() -> impl Strategy<Value = i64> {
        0i64..=25
    }
}
