//! Full AND/OR/NOT compilation into an in-memory predicate tree.
//!
//! Used by the target scorer for candidate search. Aggregate leaves are not
//! per-geocache filters, so they compile to [`Matcher::Always`] here; the
//! progress evaluator handles them through the AND-only compiler instead.
//! A leaf whose selector never got resolved compiles to [`Matcher::Never`]:
//! an explicit no-match rather than accidentally matching everything.

use cairn_core::{AttributeId, CountryId, Expr, Geocache, SizeId, StateId, TypeId};
use chrono::{Datelike, NaiveDate};

/// One atomic condition against geocache fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    TypeIn(Vec<TypeId>),
    SizeIn(Vec<SizeId>),
    StateIn(Vec<StateId>),
    CountryIs(CountryId),
    PlacedYear(i32),
    PlacedBefore(NaiveDate),
    PlacedAfter(NaiveDate),
    DifficultyBetween(f64, f64),
    TerrainBetween(f64, f64),
    HasAttribute {
        attribute_id: AttributeId,
        is_positive: bool,
    },
    /// Matches nothing. Emitted for unresolved selectors in stored legacy
    /// expressions.
    Unsatisfiable,
}

impl Condition {
    pub fn matches(&self, cache: &Geocache) -> bool {
        match self {
            Condition::TypeIn(ids) => ids.contains(&cache.type_id),
            Condition::SizeIn(ids) => ids.contains(&cache.size_id),
            Condition::StateIn(ids) => cache.state_id.map_or(false, |s| ids.contains(&s)),
            Condition::CountryIs(id) => cache.country_id == *id,
            Condition::PlacedYear(year) => cache.placed_at.year() == *year,
            Condition::PlacedBefore(date) => cache.placed_at.date_naive() < *date,
            Condition::PlacedAfter(date) => cache.placed_at.date_naive() > *date,
            Condition::DifficultyBetween(min, max) => {
                cache.difficulty >= *min && cache.difficulty <= *max
            }
            Condition::TerrainBetween(min, max) => {
                cache.terrain >= *min && cache.terrain <= *max
            }
            Condition::HasAttribute {
                attribute_id,
                is_positive,
            } => cache
                .attributes
                .iter()
                .any(|a| a.attribute_id == *attribute_id && a.is_positive == *is_positive),
            Condition::Unsatisfiable => false,
        }
    }
}

/// A compiled predicate tree over geocaches.
#[derive(Debug, Clone, PartialEq)]
pub enum Matcher {
    All(Vec<Matcher>),
    Any(Vec<Matcher>),
    Not(Box<Matcher>),
    Cond(Condition),
    Always,
    Never,
}

impl Matcher {
    pub fn matches(&self, cache: &Geocache) -> bool {
        match self {
            Matcher::All(parts) => parts.iter().all(|m| m.matches(cache)),
            Matcher::Any(parts) => parts.iter().any(|m| m.matches(cache)),
            Matcher::Not(inner) => !inner.matches(cache),
            Matcher::Cond(cond) => cond.matches(cache),
            Matcher::Always => true,
            Matcher::Never => false,
        }
    }
}

/// What one leaf compiles down to.
pub(crate) enum LeafOutcome {
    Conditions(Vec<Condition>),
    /// The leaf constrains nothing here (aggregates, empty selector lists).
    Always,
    /// The leaf can never match (unresolved selector).
    Never,
}

/// Shared leaf lowering for both compilation targets. Id lists are sorted
/// and deduplicated so logically-equal leaves compile identically.
pub(crate) fn compile_leaf(leaf: &Expr) -> LeafOutcome {
    fn ids<T: Ord + Copy>(resolved: Vec<Option<T>>) -> LeafOutcome
    where
        Condition: From<Vec<T>>,
    {
        if resolved.iter().any(Option::is_none) {
            return LeafOutcome::Never;
        }
        let mut ids: Vec<T> = resolved.into_iter().flatten().collect();
        if ids.is_empty() {
            return LeafOutcome::Always;
        }
        ids.sort();
        ids.dedup();
        LeafOutcome::Conditions(vec![Condition::from(ids)])
    }

    match leaf {
        Expr::TypeIn { types } => ids(types.iter().map(|t| t.type_id).collect()),
        Expr::SizeIn { sizes } => ids(sizes.iter().map(|s| s.size_id).collect()),
        Expr::StateIn { states } => ids(states.iter().map(|s| s.state_id).collect()),
        Expr::CountryIs { country } => match country.country_id {
            Some(id) => LeafOutcome::Conditions(vec![Condition::CountryIs(id)]),
            None => LeafOutcome::Never,
        },
        Expr::PlacedYear { year } => {
            LeafOutcome::Conditions(vec![Condition::PlacedYear(*year)])
        }
        Expr::PlacedBefore { date } => {
            LeafOutcome::Conditions(vec![Condition::PlacedBefore(*date)])
        }
        Expr::PlacedAfter { date } => {
            LeafOutcome::Conditions(vec![Condition::PlacedAfter(*date)])
        }
        Expr::DifficultyBetween { min, max } => {
            LeafOutcome::Conditions(vec![Condition::DifficultyBetween(*min, *max)])
        }
        Expr::TerrainBetween { min, max } => {
            LeafOutcome::Conditions(vec![Condition::TerrainBetween(*min, *max)])
        }
        Expr::Attributes { attributes } => {
            if attributes.is_empty() {
                return LeafOutcome::Always;
            }
            let mut conds = Vec::with_capacity(attributes.len());
            for sel in attributes {
                match sel.attribute_id {
                    Some(attribute_id) => conds.push(Condition::HasAttribute {
                        attribute_id,
                        is_positive: sel.is_positive,
                    }),
                    None => return LeafOutcome::Never,
                }
            }
            conds.sort_by(|a, b| format!("{a:?}").cmp(&format!("{b:?}")));
            LeafOutcome::Conditions(conds)
        }
        // Aggregates are cross-find reducers, not per-geocache filters.
        _ if leaf.is_aggregate() => LeafOutcome::Always,
        // Logical nodes are handled by the tree walk, never passed here.
        _ => LeafOutcome::Always,
    }
}

impl From<Vec<TypeId>> for Condition {
    fn from(ids: Vec<TypeId>) -> Self {
        Condition::TypeIn(ids)
    }
}

impl From<Vec<SizeId>> for Condition {
    fn from(ids: Vec<SizeId>) -> Self {
        Condition::SizeIn(ids)
    }
}

impl From<Vec<StateId>> for Condition {
    fn from(ids: Vec<StateId>) -> Self {
        Condition::StateIn(ids)
    }
}

/// Compile a full expression into a [`Matcher`] tree, folding constants as
/// it goes.
pub fn compile_matcher(expr: &Expr) -> Matcher {
    match expr {
        Expr::And { nodes } => {
            let mut parts = Vec::with_capacity(nodes.len());
            for n in nodes {
                match compile_matcher(n) {
                    Matcher::Always => {}
                    Matcher::Never => return Matcher::Never,
                    m => parts.push(m),
                }
            }
            match parts.len() {
                0 => Matcher::Always,
                1 => parts.remove(0),
                _ => Matcher::All(parts),
            }
        }
        Expr::Or { nodes } => {
            let mut parts = Vec::with_capacity(nodes.len());
            for n in nodes {
                match compile_matcher(n) {
                    Matcher::Always => return Matcher::Always,
                    Matcher::Never => {}
                    m => parts.push(m),
                }
            }
            match parts.len() {
                0 => Matcher::Never,
                1 => parts.remove(0),
                _ => Matcher::Any(parts),
            }
        }
        Expr::Not { node } => match compile_matcher(node) {
            Matcher::Always => Matcher::Never,
            Matcher::Never => Matcher::Always,
            m => Matcher::Not(Box::new(m)),
        },
        leaf => match compile_leaf(leaf) {
            LeafOutcome::Always => Matcher::Always,
            LeafOutcome::Never => Matcher::Never,
            LeafOutcome::Conditions(mut conds) => {
                if conds.len() == 1 {
                    Matcher::Cond(conds.remove(0))
                } else {
                    Matcher::All(conds.into_iter().map(Matcher::Cond).collect())
                }
            }
        },
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::{
        AttributeSelector, AttributeTag, CountrySelector, GeocacheId, TypeSelector,
    };
    use chrono::{TimeZone, Utc};

    fn cache(type_id: TypeId, country_id: CountryId) -> Geocache {
        Geocache {
            geocache_id: GeocacheId::generate(),
            code: "GC1234".to_string(),
            title: "Test".to_string(),
            type_id,
            size_id: SizeId::generate(),
            country_id,
            state_id: None,
            placed_at: Utc.with_ymd_and_hms(2005, 6, 1, 12, 0, 0).unwrap(),
            difficulty: 2.5,
            terrain: 3.0,
            attributes: vec![],
            location: None,
            owner: "alice".to_string(),
            elevation: None,
        }
    }

    #[test]
    fn test_and_of_type_and_year() {
        let type_id = TypeId::generate();
        let country = CountryId::generate();
        let expr = Expr::And {
            nodes: vec![
                Expr::TypeIn {
                    types: vec![TypeSelector {
                        type_id: Some(type_id),
                        code: None,
                    }],
                },
                Expr::PlacedYear { year: 2005 },
            ],
        };
        let m = compile_matcher(&expr);
        assert!(m.matches(&cache(type_id, country)));

        let other = cache(TypeId::generate(), country);
        assert!(!m.matches(&other));
    }

    #[test]
    fn test_not_inverts() {
        let country = CountryId::generate();
        let expr = Expr::Not {
            node: Box::new(Expr::CountryIs {
                country: CountrySelector {
                    country_id: Some(country),
                    name: None,
                },
            }),
        };
        let m = compile_matcher(&expr);
        assert!(!m.matches(&cache(TypeId::generate(), country)));
        assert!(m.matches(&cache(TypeId::generate(), CountryId::generate())));
    }

    #[test]
    fn test_aggregate_compiles_to_always() {
        let expr = Expr::AggregateSumAltitudeAtLeast { min_total: 5000 };
        assert_eq!(compile_matcher(&expr), Matcher::Always);
    }

    #[test]
    fn test_unresolved_selector_compiles_to_never() {
        let expr = Expr::TypeIn {
            types: vec![TypeSelector {
                type_id: None,
                code: Some("orphan".to_string()),
            }],
        };
        assert_eq!(compile_matcher(&expr), Matcher::Never);
    }

    #[test]
    fn test_never_folds_through_and_or() {
        let never = Expr::TypeIn {
            types: vec![TypeSelector {
                type_id: None,
                code: Some("orphan".to_string()),
            }],
        };
        let and = Expr::And {
            nodes: vec![never.clone(), Expr::PlacedYear { year: 2005 }],
        };
        assert_eq!(compile_matcher(&and), Matcher::Never);

        let or = Expr::Or {
            nodes: vec![never, Expr::PlacedYear { year: 2005 }],
        };
        assert_eq!(
            compile_matcher(&or),
            Matcher::Cond(Condition::PlacedYear(2005))
        );
    }

    #[test]
    fn test_attribute_polarity() {
        let attr = AttributeId::generate();
        let expr = Expr::Attributes {
            attributes: vec![AttributeSelector {
                attribute_id: Some(attr),
                code: None,
                is_positive: false,
            }],
        };
        let m = compile_matcher(&expr);

        let mut c = cache(TypeId::generate(), CountryId::generate());
        c.attributes.push(AttributeTag {
            attribute_id: attr,
            is_positive: true,
        });
        assert!(!m.matches(&c));

        c.attributes[0].is_positive = false;
        assert!(m.matches(&c));
    }

    #[test]
    fn test_date_window() {
        let expr = Expr::And {
            nodes: vec![
                Expr::PlacedAfter {
                    date: NaiveDate::from_ymd_opt(2005, 1, 1).unwrap(),
                },
                Expr::PlacedBefore {
                    date: NaiveDate::from_ymd_opt(2006, 1, 1).unwrap(),
                },
            ],
        };
        let m = compile_matcher(&expr);
        assert!(m.matches(&cache(TypeId::generate(), CountryId::generate())));
    }
}
