//! Code/name resolution inside a canonical AST.
//!
//! Walks the tree and, for every selector given as a human code or name
//! rather than a stable id, resolves it against the referential snapshot and
//! injects the id alongside the original label (both are kept for display).
//! Resolution failure aborts the whole task with the offending index and
//! field, so nothing partially-normalized is ever stored.

use cairn_core::error::{IssueCode, TaskIssue};
use cairn_core::{
    AttributeSelector, CountryId, CountrySelector, Expr, ReferentialSnapshot, SizeSelector,
    StateSelector, TypeSelector,
};

/// Resolve every code/name selector in `expr` to its stable id. `index` is
/// the task's position in the submitted batch, used for error reporting.
pub fn normalize(
    expr: Expr,
    refs: &ReferentialSnapshot,
    index: usize,
) -> Result<Expr, TaskIssue> {
    norm_node(expr, refs, index, None)
}

fn issue(index: usize, field: &str, message: String) -> TaskIssue {
    TaskIssue::new(index, field, IssueCode::ReferenceNotFound, message)
}

fn norm_node(
    expr: Expr,
    refs: &ReferentialSnapshot,
    index: usize,
    country_scope: Option<CountryId>,
) -> Result<Expr, TaskIssue> {
    match expr {
        Expr::And { nodes } => Ok(Expr::And {
            nodes: norm_group(nodes, refs, index, country_scope)?,
        }),
        Expr::Or { nodes } => Ok(Expr::Or {
            nodes: norm_group(nodes, refs, index, country_scope)?,
        }),
        Expr::Not { node } => Ok(Expr::Not {
            node: Box::new(norm_node(*node, refs, index, country_scope)?),
        }),
        Expr::TypeIn { types } => Ok(Expr::TypeIn {
            types: types
                .into_iter()
                .map(|t| norm_type(t, refs, index))
                .collect::<Result<_, _>>()?,
        }),
        Expr::SizeIn { sizes } => Ok(Expr::SizeIn {
            sizes: sizes
                .into_iter()
                .map(|s| norm_size(s, refs, index))
                .collect::<Result<_, _>>()?,
        }),
        Expr::CountryIs { country } => Ok(Expr::CountryIs {
            country: norm_country(country, refs, index)?,
        }),
        Expr::StateIn { states } => Ok(Expr::StateIn {
            states: states
                .into_iter()
                .map(|s| norm_state(s, refs, index, country_scope))
                .collect::<Result<_, _>>()?,
        }),
        Expr::Attributes { attributes } => Ok(Expr::Attributes {
            attributes: attributes
                .into_iter()
                .map(|a| norm_attribute(a, refs, index))
                .collect::<Result<_, _>>()?,
        }),
        // Value-only leaves carry nothing to resolve.
        leaf => Ok(leaf),
    }
}

/// Normalize the children of a logical group. Countries are resolved first
/// so that `state_in` siblings in the same group resolve within the right
/// country (state names are not globally unique).
fn norm_group(
    nodes: Vec<Expr>,
    refs: &ReferentialSnapshot,
    index: usize,
    inherited: Option<CountryId>,
) -> Result<Vec<Expr>, TaskIssue> {
    let mut scope = inherited;
    let mut resolved: Vec<Option<Expr>> = Vec::with_capacity(nodes.len());
    let mut pending: Vec<(usize, Expr)> = Vec::new();

    for (slot, node) in nodes.into_iter().enumerate() {
        if let Expr::CountryIs { country } = node {
            let country = norm_country(country, refs, index)?;
            scope = scope.or(country.country_id);
            resolved.push(Some(Expr::CountryIs { country }));
        } else {
            resolved.push(None);
            pending.push((slot, node));
        }
    }

    for (slot, node) in pending {
        resolved[slot] = Some(norm_node(node, refs, index, scope)?);
    }

    // Every slot was filled by one of the two passes.
    Ok(resolved.into_iter().flatten().collect())
}

fn norm_type(
    mut sel: TypeSelector,
    refs: &ReferentialSnapshot,
    index: usize,
) -> Result<TypeSelector, TaskIssue> {
    if sel.type_id.is_none() {
        let code = sel.code.as_deref().ok_or_else(|| {
            issue(index, "expression", "type_in: selector has neither id nor code".to_string())
        })?;
        let id = refs.resolve_type_code(code).ok_or_else(|| {
            issue(index, "expression", format!("type_in: type code not found '{code}'"))
        })?;
        sel.type_id = Some(id);
    }
    Ok(sel)
}

fn norm_size(
    mut sel: SizeSelector,
    refs: &ReferentialSnapshot,
    index: usize,
) -> Result<SizeSelector, TaskIssue> {
    if sel.size_id.is_none() {
        let id = match (sel.code.as_deref(), sel.name.as_deref()) {
            (Some(code), _) => refs.resolve_size_code(code),
            (None, Some(name)) => refs.resolve_size_name(name),
            (None, None) => None,
        };
        let label = sel.code.as_deref().or(sel.name.as_deref()).unwrap_or("<?>");
        sel.size_id = Some(id.ok_or_else(|| {
            issue(index, "expression", format!("size_in: size not found '{label}'"))
        })?);
    }
    Ok(sel)
}

fn norm_country(
    mut sel: CountrySelector,
    refs: &ReferentialSnapshot,
    index: usize,
) -> Result<CountrySelector, TaskIssue> {
    if sel.country_id.is_none() {
        let name = sel.name.as_deref().ok_or_else(|| {
            issue(index, "expression", "country_is: selector has neither id nor name".to_string())
        })?;
        let id = refs.resolve_country_name(name).ok_or_else(|| {
            issue(index, "expression", format!("country_is: country not found '{name}'"))
        })?;
        sel.country_id = Some(id);
    }
    Ok(sel)
}

fn norm_state(
    mut sel: StateSelector,
    refs: &ReferentialSnapshot,
    index: usize,
    country_scope: Option<CountryId>,
) -> Result<StateSelector, TaskIssue> {
    if sel.state_id.is_none() {
        let name = sel.name.as_deref().ok_or_else(|| {
            issue(index, "expression", "state_in: selector has neither id nor name".to_string())
        })?;
        let id = refs.resolve_state_name(name, country_scope).ok_or_else(|| {
            issue(
                index,
                "expression",
                format!("state_in: state not found or ambiguous '{name}'"),
            )
        })?;
        sel.state_id = Some(id);
    }
    Ok(sel)
}

fn norm_attribute(
    mut sel: AttributeSelector,
    refs: &ReferentialSnapshot,
    index: usize,
) -> Result<AttributeSelector, TaskIssue> {
    if sel.attribute_id.is_none() {
        let code = sel.code.as_deref().ok_or_else(|| {
            issue(index, "expression", "attributes: selector has neither id nor code".to_string())
        })?;
        let id = refs.resolve_attribute_code(code).ok_or_else(|| {
            issue(index, "expression", format!("attributes: attribute not found '{code}'"))
        })?;
        sel.attribute_id = Some(id);
    }
    Ok(sel)
}

// =============================================================================
// TESTS
// =============================================================================
