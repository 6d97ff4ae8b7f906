//! Restricted AND-only compilation for progress counting.
//!
//! Flattens nested `and` groups into one leaf list, refuses any `or`/`not`
//! (a typed `Unsupported` result, not an error), extracts the single
//! aggregate spec, and emits a stable signature over the compiled condition
//! set. The signature is order-insensitive: two expressions that differ only
//! in sibling ordering hash identically.

use crate::compile::{compile_leaf, Condition, LeafOutcome};
use cairn_core::{AggregateKind, Expr, Geocache};
use sha2::{Digest, Sha256};

/// Sentinel signature for expressions the AND-only compiler refuses.
pub const UNSUPPORTED_SIGNATURE: &str = "unsupported:or-not";

/// One aggregate constraint: sum `kind` over matched finds, require at
/// least `min_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateSpec {
    pub kind: AggregateKind,
    pub min_total: i64,
}

/// A compiled AND-only expression: a flat conjunction of per-geocache
/// conditions, at most one aggregate spec, and a stable signature.
#[derive(Debug, Clone, PartialEq)]
pub struct Conjunction {
    pub signature: String,
    pub conditions: Vec<Condition>,
    pub aggregate: Option<AggregateSpec>,
}

impl Conjunction {
    /// Whether a geocache satisfies every per-item condition.
    pub fn matches(&self, cache: &Geocache) -> bool {
        self.conditions.iter().all(|c| c.matches(cache))
    }
}

/// Result of AND-only compilation. `Unsupported` degrades the task, it
/// never fails an evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConjunctionOutcome {
    Supported(Conjunction),
    Unsupported { reason: String },
}

impl ConjunctionOutcome {
    pub fn signature(&self) -> &str {
        match self {
            ConjunctionOutcome::Supported(c) => &c.signature,
            ConjunctionOutcome::Unsupported { .. } => UNSUPPORTED_SIGNATURE,
        }
    }
}

/// Compile an expression under AND-only rules.
pub fn compile_conjunction(expr: &Expr) -> ConjunctionOutcome {
    let leaves = match flatten_and(expr) {
        Some(leaves) => leaves,
        None => {
            return ConjunctionOutcome::Unsupported {
                reason: "or/not constructs are not supported for progress counting".to_string(),
            }
        }
    };

    let mut aggregate: Option<AggregateSpec> = None;
    let mut conditions: Vec<Condition> = Vec::new();

    for leaf in leaves {
        if let Some((kind, min_total)) = leaf.aggregate() {
            // Validation guarantees at most one; first wins regardless.
            if aggregate.is_none() {
                aggregate = Some(AggregateSpec { kind, min_total });
            }
            continue;
        }
        match compile_leaf(leaf) {
            LeafOutcome::Conditions(conds) => conditions.extend(conds),
            LeafOutcome::Always => {}
            LeafOutcome::Never => conditions.push(Condition::Unsatisfiable),
        }
    }

    let signature = signature_for(&conditions, aggregate);
    ConjunctionOutcome::Supported(Conjunction {
        signature,
        conditions,
        aggregate,
    })
}

/// Flatten nested `and` nodes into a leaf list; `None` if any `or`/`not`
/// occurs anywhere.
fn flatten_and(expr: &Expr) -> Option<Vec<&Expr>> {
    match expr {
        Expr::And { nodes } => {
            let mut out = Vec::new();
            for n in nodes {
                out.extend(flatten_and(n)?);
            }
            Some(out)
        }
        Expr::Or { .. } | Expr::Not { .. } => None,
        leaf => Some(vec![leaf]),
    }
}

/// Deterministic fingerprint over the compiled condition set. Fragments are
/// sorted before hashing so sibling order never matters.
fn signature_for(conditions: &[Condition], aggregate: Option<AggregateSpec>) -> String {
    let mut fragments: Vec<String> = conditions.iter().map(fragment).collect();
    if let Some(agg) = aggregate {
        fragments.push(format!("aggregate:{}>={}", agg.kind, agg.min_total));
    }
    fragments.sort();
    fragments.dedup();

    let mut hasher = Sha256::new();
    for f in &fragments {
        hasher.update(f.as_bytes());
        hasher.update(b"\n");
    }
    format!("and:{}", hex::encode(hasher.finalize()))
}

fn fragment(cond: &Condition) -> String {
    fn join<T: std::fmt::Display>(ids: &[T]) -> String {
        ids.iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    match cond {
        Condition::TypeIn(ids) => format!("type_in:{}", join(ids)),
        Condition::SizeIn(ids) => format!("size_in:{}", join(ids)),
        Condition::StateIn(ids) => format!("state_in:{}", join(ids)),
        Condition::CountryIs(id) => format!("country_is:{id}"),
        Condition::PlacedYear(year) => format!("placed_year:{year}"),
        Condition::PlacedBefore(date) => format!("placed_before:{date}"),
        Condition::PlacedAfter(date) => format!("placed_after:{date}"),
        Condition::DifficultyBetween(min, max) => format!("difficulty_between:{min}..{max}"),
        Condition::TerrainBetween(min, max) => format!("terrain_between:{min}..{max}"),
        Condition::HasAttribute {
            attribute_id,
            is_positive,
        } => format!("attribute:{attribute_id}:{}", if *is_positive { "+" } else { "-" }),
        Condition::Unsatisfiable => "never".to_string(),
    }
}

// =============================================================================
// TESTS
// =============================================================================
