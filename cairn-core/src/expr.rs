//! Task expression AST
//!
//! A task expression is a boolean tree over geocache attributes: logical
//! nodes (`and`/`or`/`not`), filter leaves, and four aggregate leaves whose
//! condition is a sum over the matched finds rather than a per-geocache
//! predicate. Selector-bearing leaves accept either a resolved referential
//! id or a human code/name; normalization resolves the latter and keeps both
//! for audit/display.

use crate::enums::AggregateKind;
use crate::identity::{AttributeId, CountryId, SizeId, StateId, TypeId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Selector for a geocache type: resolved id and/or human code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TypeSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_id: Option<TypeId>,
    /// Human code, e.g. "wherigo".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Selector for a geocache size: resolved id, code or display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SizeSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_id: Option<SizeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Selector for a state/region: resolved id or name (country-scoped).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StateSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_id: Option<StateId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Selector for a country: resolved id or name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CountrySelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_id: Option<CountryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Selector for a tagged attribute with polarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_id: Option<AttributeId>,
    /// Human code, e.g. "picnic".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default = "default_true")]
    pub is_positive: bool,
}

fn default_true() -> bool {
    true
}

/// A task expression node. Tagged by `kind` in the wire form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    And {
        nodes: Vec<Expr>,
    },
    Or {
        nodes: Vec<Expr>,
    },
    Not {
        node: Box<Expr>,
    },
    TypeIn {
        types: Vec<TypeSelector>,
    },
    SizeIn {
        sizes: Vec<SizeSelector>,
    },
    StateIn {
        states: Vec<StateSelector>,
    },
    CountryIs {
        country: CountrySelector,
    },
    PlacedYear {
        year: i32,
    },
    PlacedBefore {
        date: NaiveDate,
    },
    PlacedAfter {
        date: NaiveDate,
    },
    DifficultyBetween {
        min: f64,
        max: f64,
    },
    TerrainBetween {
        min: f64,
        max: f64,
    },
    Attributes {
        attributes: Vec<AttributeSelector>,
    },
    AggregateSumDifficultyAtLeast {
        min_total: i64,
    },
    AggregateSumTerrainAtLeast {
        min_total: i64,
    },
    AggregateSumDiffPlusTerrAtLeast {
        min_total: i64,
    },
    AggregateSumAltitudeAtLeast {
        min_total: i64,
    },
}

impl Expr {
    /// The wire-form `kind` tag of this node.
    pub fn kind(&self) -> &'static str {
        match self {
            Expr::And { .. } => "and",
            Expr::Or { .. } => "or",
            Expr::Not { .. } => "not",
            Expr::TypeIn { .. } => "type_in",
            Expr::SizeIn { .. } => "size_in",
            Expr::StateIn { .. } => "state_in",
            Expr::CountryIs { .. } => "country_is",
            Expr::PlacedYear { .. } => "placed_year",
            Expr::PlacedBefore { .. } => "placed_before",
            Expr::PlacedAfter { .. } => "placed_after",
            Expr::DifficultyBetween { .. } => "difficulty_between",
            Expr::TerrainBetween { .. } => "terrain_between",
            Expr::Attributes { .. } => "attributes",
            Expr::AggregateSumDifficultyAtLeast { .. } => "aggregate_sum_difficulty_at_least",
            Expr::AggregateSumTerrainAtLeast { .. } => "aggregate_sum_terrain_at_least",
            Expr::AggregateSumDiffPlusTerrAtLeast { .. } => {
                "aggregate_sum_diff_plus_terr_at_least"
            }
            Expr::AggregateSumAltitudeAtLeast { .. } => "aggregate_sum_altitude_at_least",
        }
    }

    /// Whether this node is one of `and`/`or`/`not`.
    pub fn is_logical(&self) -> bool {
        matches!(self, Expr::And { .. } | Expr::Or { .. } | Expr::Not { .. })
    }

    /// Whether this node is an aggregate leaf.
    pub fn is_aggregate(&self) -> bool {
        self.aggregate().is_some()
    }

    /// The aggregate kind and threshold, for aggregate leaves.
    pub fn aggregate(&self) -> Option<(AggregateKind, i64)> {
        match self {
            Expr::AggregateSumDifficultyAtLeast { min_total } => {
                Some((AggregateKind::Difficulty, *min_total))
            }
            Expr::AggregateSumTerrainAtLeast { min_total } => {
                Some((AggregateKind::Terrain, *min_total))
            }
            Expr::AggregateSumDiffPlusTerrAtLeast { min_total } => {
                Some((AggregateKind::DifficultyPlusTerrain, *min_total))
            }
            Expr::AggregateSumAltitudeAtLeast { min_total } => {
                Some((AggregateKind::Altitude, *min_total))
            }
            _ => None,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
