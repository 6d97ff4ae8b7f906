//! Structural validation beyond what the typed parse enforces.
//!
//! Issues are collected, not thrown: one task reports every violation it
//! contains so the caller can render inline errors in a single round trip.

use cairn_core::error::{IssueCode, TaskIssue};
use cairn_core::{Expr, ReferentialSnapshot};

/// Validate one normalized expression. Returns every issue found; an empty
/// vector means the expression is storable.
pub fn validate(expr: &Expr, refs: &ReferentialSnapshot, index: usize) -> Vec<TaskIssue> {
    let mut issues = Vec::new();
    let mut aggregate_count = 0usize;

    visit(expr, None, None, refs, index, &mut issues, &mut aggregate_count);

    if aggregate_count > 1 {
        issues.push(TaskIssue::new(
            index,
            "expression",
            IssueCode::StructuralViolation,
            "only a single aggregate rule is supported per task",
        ));
    }
    issues
}

fn structural(index: usize, message: String) -> TaskIssue {
    TaskIssue::new(index, "expression", IssueCode::StructuralViolation, message)
}

fn unresolved(index: usize, message: String) -> TaskIssue {
    TaskIssue::new(index, "expression", IssueCode::ReferenceNotFound, message)
}

/// `parent` is the nearest logical ancestor's kind; `siblings` the node list
/// of the directly enclosing `and` group, when there is one.
fn visit(
    node: &Expr,
    parent: Option<&'static str>,
    siblings: Option<&[Expr]>,
    refs: &ReferentialSnapshot,
    index: usize,
    issues: &mut Vec<TaskIssue>,
    aggregate_count: &mut usize,
) {
    match node {
        Expr::And { nodes } => {
            for child in nodes {
                visit(child, Some("and"), Some(nodes.as_slice()), refs, index, issues, aggregate_count);
            }
        }
        Expr::Or { nodes } => {
            for child in nodes {
                visit(child, Some("or"), None, refs, index, issues, aggregate_count);
            }
        }
        Expr::Not { node } => {
            visit(node, Some("not"), None, refs, index, issues, aggregate_count);
        }
        Expr::TypeIn { types } => {
            for sel in types {
                match sel.type_id {
                    Some(id) if refs.type_exists(id) => {}
                    Some(id) => issues.push(unresolved(
                        index,
                        format!("type_in: unknown type id '{id}'"),
                    )),
                    None => issues.push(unresolved(
                        index,
                        "type_in: unresolved selector".to_string(),
                    )),
                }
            }
        }
        Expr::SizeIn { sizes } => {
            for sel in sizes {
                match sel.size_id {
                    Some(id) if refs.size_exists(id) => {}
                    Some(id) => issues.push(unresolved(
                        index,
                        format!("size_in: unknown size id '{id}'"),
                    )),
                    None => issues.push(unresolved(
                        index,
                        "size_in: unresolved selector".to_string(),
                    )),
                }
            }
        }
        Expr::StateIn { states } => {
            for sel in states {
                match sel.state_id {
                    Some(id) if refs.state_exists(id) => {}
                    Some(id) => issues.push(unresolved(
                        index,
                        format!("state_in: unknown state id '{id}'"),
                    )),
                    None => issues.push(unresolved(
                        index,
                        "state_in: unresolved selector".to_string(),
                    )),
                }
            }
            // States are not globally unique, so a state filter only makes
            // sense pinned to a country in the same AND group.
            let has_country = siblings.map(has_country_is).unwrap_or(false);
            if !has_country {
                issues.push(structural(
                    index,
                    "state_in requires a sibling country_is in the same and group".to_string(),
                ));
            }
        }
        Expr::CountryIs { country } => match country.country_id {
            Some(id) if refs.country_exists(id) => {}
            Some(id) => issues.push(unresolved(
                index,
                format!("country_is: unknown country id '{id}'"),
            )),
            None => issues.push(unresolved(
                index,
                "country_is: unresolved selector".to_string(),
            )),
        },
        Expr::Attributes { attributes } => {
            for (i, sel) in attributes.iter().enumerate() {
                match sel.attribute_id {
                    Some(id) if refs.attribute_exists(id) => {}
                    Some(id) => issues.push(unresolved(
                        index,
                        format!("attributes[{i}]: unknown attribute id '{id}'"),
                    )),
                    None => issues.push(unresolved(
                        index,
                        format!("attributes[{i}]: unresolved selector"),
                    )),
                }
            }
        }
        Expr::DifficultyBetween { min, max } | Expr::TerrainBetween { min, max } => {
            if min > max {
                issues.push(TaskIssue::new(
                    index,
                    "expression",
                    IssueCode::InvalidRange,
                    format!("{}: min must be <= max", node.kind()),
                ));
            }
        }
        Expr::PlacedYear { .. } | Expr::PlacedBefore { .. } | Expr::PlacedAfter { .. } => {}
        aggregate => {
            if let Some((_, min_total)) = aggregate.aggregate() {
                *aggregate_count += 1;
                if matches!(parent, Some("or") | Some("not")) {
                    issues.push(structural(
                        index,
                        format!(
                            "{}: aggregate rules are only supported under and",
                            aggregate.kind()
                        ),
                    ));
                }
                if min_total <= 0 {
                    issues.push(TaskIssue::new(
                        index,
                        "expression",
                        IssueCode::InvalidRange,
                        format!("{}: min_total must be positive", aggregate.kind()),
                    ));
                }
            }
        }
    }
}

/// Whether an AND group contains a `country_is`, looking through nested
/// AND sub-groups.
fn has_country_is(nodes: &[Expr]) -> bool {
    nodes.iter().any(|n| match n {
        Expr::CountryIs { .. } => true,
        Expr::And { nodes } => has_country_is(nodes),
        _ => false,
    })
}

// =============================================================================
// TESTS
// =============================================================================
