//! Referential lookup snapshot
//!
//! Immutable code/name → stable-id tables for types, sizes, countries,
//! states and attributes. A snapshot is built wholesale and shared behind an
//! `Arc`; refresh is swap-on-rebuild, never incremental, so readers always
//! see a consistent whole-snapshot view. State names are only unique within
//! a country, hence the per-country table.

use crate::enums::ReferentialKind;
use crate::identity::{AttributeId, CountryId, SizeId, StateId, TypeId};
use std::collections::{HashMap, HashSet};

/// Immutable referential lookup tables. Keys are lower-cased.
#[derive(Debug, Clone, Default)]
pub struct ReferentialSnapshot {
    type_ids: HashSet<TypeId>,
    type_by_code: HashMap<String, TypeId>,
    size_ids: HashSet<SizeId>,
    size_by_code: HashMap<String, SizeId>,
    size_by_name: HashMap<String, SizeId>,
    country_ids: HashSet<CountryId>,
    country_by_name: HashMap<String, CountryId>,
    state_ids: HashSet<StateId>,
    state_by_country: HashMap<CountryId, HashMap<String, StateId>>,
    attribute_ids: HashSet<AttributeId>,
    attribute_by_code: HashMap<String, AttributeId>,
}

impl ReferentialSnapshot {
    pub fn builder() -> ReferentialSnapshotBuilder {
        ReferentialSnapshotBuilder::default()
    }

    pub fn resolve_type_code(&self, code: &str) -> Option<TypeId> {
        self.type_by_code.get(&code.to_lowercase()).copied()
    }

    pub fn resolve_size_code(&self, code: &str) -> Option<SizeId> {
        self.size_by_code.get(&code.to_lowercase()).copied()
    }

    pub fn resolve_size_name(&self, name: &str) -> Option<SizeId> {
        self.size_by_name.get(&name.to_lowercase()).copied()
    }

    pub fn resolve_country_name(&self, name: &str) -> Option<CountryId> {
        self.country_by_name.get(&name.to_lowercase()).copied()
    }

    pub fn resolve_attribute_code(&self, code: &str) -> Option<AttributeId> {
        self.attribute_by_code.get(&code.to_lowercase()).copied()
    }

    /// Resolve a state name. With a country the lookup is scoped to it;
    /// without, the name must be unique across all countries.
    pub fn resolve_state_name(&self, name: &str, country: Option<CountryId>) -> Option<StateId> {
        let key = name.to_lowercase();
        match country {
            Some(cid) => self.state_by_country.get(&cid)?.get(&key).copied(),
            None => {
                let mut found = None;
                for table in self.state_by_country.values() {
                    if let Some(sid) = table.get(&key) {
                        if found.is_some() {
                            return None; // ambiguous across countries
                        }
                        found = Some(*sid);
                    }
                }
                found
            }
        }
    }

    pub fn type_exists(&self, id: TypeId) -> bool {
        self.type_ids.contains(&id)
    }

    pub fn size_exists(&self, id: SizeId) -> bool {
        self.size_ids.contains(&id)
    }

    pub fn country_exists(&self, id: CountryId) -> bool {
        self.country_ids.contains(&id)
    }

    pub fn state_exists(&self, id: StateId) -> bool {
        self.state_ids.contains(&id)
    }

    pub fn attribute_exists(&self, id: AttributeId) -> bool {
        self.attribute_ids.contains(&id)
    }

    /// Generic existence check by referential kind and raw id. State names
    /// resolve per country, so typed lookups are preferred where the kind
    /// is statically known.
    pub fn exists(&self, kind: ReferentialKind, id: uuid::Uuid) -> bool {
        match kind {
            ReferentialKind::GeocacheType => self.type_exists(TypeId::from(id)),
            ReferentialKind::GeocacheSize => self.size_exists(SizeId::from(id)),
            ReferentialKind::Country => self.country_exists(CountryId::from(id)),
            ReferentialKind::State => self.state_exists(StateId::from(id)),
            ReferentialKind::Attribute => self.attribute_exists(AttributeId::from(id)),
        }
    }
}

/// Builder for wholesale snapshot construction.
#[derive(Debug, Clone, Default)]
pub struct ReferentialSnapshotBuilder {
    snapshot: ReferentialSnapshot,
}

impl ReferentialSnapshotBuilder {
    pub fn geocache_type(mut self, id: TypeId, code: &str) -> Self {
        self.snapshot.type_ids.insert(id);
        self.snapshot.type_by_code.insert(code.to_lowercase(), id);
        self
    }

    pub fn geocache_size(mut self, id: SizeId, code: &str, name: &str) -> Self {
        self.snapshot.size_ids.insert(id);
        self.snapshot.size_by_code.insert(code.to_lowercase(), id);
        self.snapshot.size_by_name.insert(name.to_lowercase(), id);
        self
    }

    pub fn country(mut self, id: CountryId, name: &str) -> Self {
        self.snapshot.country_ids.insert(id);
        self.snapshot.country_by_name.insert(name.to_lowercase(), id);
        self
    }

    pub fn state(mut self, id: StateId, country: CountryId, name: &str) -> Self {
        self.snapshot.state_ids.insert(id);
        self.snapshot
            .state_by_country
            .entry(country)
            .or_default()
            .insert(name.to_lowercase(), id);
        self
    }

    pub fn attribute(mut self, id: AttributeId, code: &str) -> Self {
        self.snapshot.attribute_ids.insert(id);
        self.snapshot
            .attribute_by_code
            .insert(code.to_lowercase(), id);
        self
    }

    pub fn build(self) -> ReferentialSnapshot {
        self.snapshot
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ReferentialSnapshot {
        let fr = CountryId::generate();
        let de = CountryId::generate();
        ReferentialSnapshot::builder()
            .geocache_type(TypeId::generate(), "Wherigo")
            .country(fr, "France")
            .country(de, "Germany")
            .state(StateId::generate(), fr, "Bretagne")
            .state(StateId::generate(), fr, "Bayern") // same name also in DE
            .state(StateId::generate(), de, "Bayern")
            .attribute(AttributeId::generate(), "picnic")
            .build()
    }

    #[test]
    fn test_code_resolution_is_case_insensitive() {
        let snap = sample();
        let id = snap.resolve_type_code("WHERIGO").unwrap();
        assert_eq!(snap.resolve_type_code("wherigo"), Some(id));
        assert!(snap.type_exists(id));
    }

    #[test]
    fn test_state_resolution_requires_country_when_ambiguous() {
        let snap = sample();
        let fr = snap.resolve_country_name("france").unwrap();
        // "Bayern" exists in two countries: unscoped lookup must refuse.
        assert!(snap.resolve_state_name("Bayern", None).is_none());
        assert!(snap.resolve_state_name("Bayern", Some(fr)).is_some());
        // "Bretagne" is globally unique.
        assert!(snap.resolve_state_name("bretagne", None).is_some());
    }

    #[test]
    fn test_unknown_lookups_return_none() {
        let snap = sample();
        assert!(snap.resolve_size_code("micro").is_none());
        assert!(snap.resolve_attribute_code("nope").is_none());
        assert!(!snap.state_exists(StateId::generate()));
    }

    #[test]
    fn test_generic_exists_dispatch() {
        let snap = sample();
        let id = snap.resolve_type_code("wherigo").unwrap();
        assert!(snap.exists(ReferentialKind::GeocacheType, id.as_uuid()));
        // Same raw id against the wrong kind is unknown.
        assert!(!snap.exists(ReferentialKind::Country, id.as_uuid()));
    }
}
