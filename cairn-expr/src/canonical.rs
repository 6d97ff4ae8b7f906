//! Shorthand-to-canonical rewriting of raw expression JSON.
//!
//! Callers may submit a bare rule object with no `kind`, a rule's fields at
//! the top level, or legacy short list forms (`codes` instead of selector
//! objects). This pass rewrites all of them into one canonical shape with an
//! explicit `and` wrapper before any typed parsing happens, so nothing
//! downstream ever branches on input shape. Canonicalization is idempotent.

use cairn_core::Expr;
use serde_json::{json, Map, Value};

const LOGICAL_KINDS: [&str; 3] = ["and", "or", "not"];

const RULE_KINDS: [&str; 14] = [
    "attributes",
    "type_in",
    "size_in",
    "state_in",
    "country_is",
    "placed_year",
    "placed_before",
    "placed_after",
    "difficulty_between",
    "terrain_between",
    "aggregate_sum_difficulty_at_least",
    "aggregate_sum_terrain_at_least",
    "aggregate_sum_diff_plus_terr_at_least",
    "aggregate_sum_altitude_at_least",
];

// Field names that identify a kind-less object as a single rule rather
// than an (invalid) logical node.
const RULE_FIELD_HINTS: [&str; 12] = [
    "attributes",
    "types",
    "codes",
    "sizes",
    "states",
    "state_names",
    "country",
    "year",
    "date",
    "min",
    "max",
    "min_total",
];

fn is_rule_kind(kind: &str) -> bool {
    RULE_KINDS.contains(&kind)
}

fn looks_like_rule(obj: &Map<String, Value>) -> bool {
    RULE_FIELD_HINTS.iter().any(|f| obj.contains_key(*f))
}

/// Rewrite legacy short list forms into selector objects, recursively:
/// `type_in.codes` → `type_in.types[{code}]`, `size_in.codes` →
/// `size_in.sizes[{code}]`, `state_in.state_names` → `state_in.states[{name}]`.
fn expand_legacy_lists(value: Value) -> Value {
    match value {
        Value::Object(mut obj) => {
            let kind = obj.get("kind").and_then(Value::as_str).map(String::from);

            match kind.as_deref() {
                Some("type_in") if !obj.contains_key("types") => {
                    if let Some(Value::Array(codes)) = obj.remove("codes") {
                        let types: Vec<Value> =
                            codes.into_iter().map(|c| json!({ "code": c })).collect();
                        obj.insert("types".to_string(), Value::Array(types));
                    }
                }
                Some("size_in") if !obj.contains_key("sizes") => {
                    if let Some(Value::Array(codes)) = obj.remove("codes") {
                        let sizes: Vec<Value> =
                            codes.into_iter().map(|c| json!({ "code": c })).collect();
                        obj.insert("sizes".to_string(), Value::Array(sizes));
                    }
                }
                Some("state_in") if !obj.contains_key("states") => {
                    if let Some(Value::Array(names)) = obj.remove("state_names") {
                        let states: Vec<Value> =
                            names.into_iter().map(|n| json!({ "name": n })).collect();
                        obj.insert("states".to_string(), Value::Array(states));
                    }
                }
                _ => {}
            }

            let rebuilt: Map<String, Value> = obj
                .into_iter()
                .map(|(k, v)| (k, expand_legacy_lists(v)))
                .collect();
            Value::Object(rebuilt)
        }
        Value::Array(items) => {
            Value::Array(items.into_iter().map(expand_legacy_lists).collect())
        }
        other => other,
    }
}

/// Wrap the top level in an explicit `and` where the input used a shorthand
/// form. Runs after [`expand_legacy_lists`]; only the root is rewritten,
/// nested nodes must already be explicit.
fn default_and(value: Value) -> Value {
    let obj = match value {
        Value::Object(obj) => obj,
        other => return other,
    };

    let kind = obj.get("kind").and_then(Value::as_str).map(String::from);

    match kind {
        None => {
            // Kind-less object: an implicit `and`.
            if let Some(Value::Array(nodes)) = obj.get("nodes") {
                return json!({ "kind": "and", "nodes": nodes });
            }
            if looks_like_rule(&obj) {
                return json!({ "kind": "and", "nodes": [Value::Object(obj)] });
            }
            // Nothing recognizable: an empty `and`, the typed parse decides.
            json!({ "kind": "and", "nodes": [] })
        }
        Some(k) if is_rule_kind(&k) => {
            // A single rule at the top level gets the `and` wrapper.
            json!({ "kind": "and", "nodes": [Value::Object(obj)] })
        }
        Some(k) if LOGICAL_KINDS.contains(&k.as_str()) => {
            // Logical node with rule fields but no children: hoist the rule
            // fields into a single child.
            if k != "not" && obj.get("nodes").map_or(true, |n| !n.is_array()) && looks_like_rule(&obj)
            {
                let rule: Map<String, Value> =
                    obj.into_iter().filter(|(key, _)| key != "kind").collect();
                return json!({ "kind": k, "nodes": [Value::Object(rule)] });
            }
            Value::Object(obj)
        }
        Some(_) => Value::Object(obj),
    }
}

/// Rewrite raw expression JSON into the one canonical shape. Idempotent:
/// canonical input comes back unchanged.
pub fn canonicalize(value: Value) -> Value {
    default_and(expand_legacy_lists(value))
}

/// Canonicalize and parse raw JSON into the typed AST.
pub fn parse_expression(value: Value) -> Result<Expr, serde_json::Error> {
    serde_json::from_value(canonicalize(value))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_bare_rule_gets_and_wrapper() {
        let raw = json!({ "kind": "placed_year", "year": 2005 });
        let canon = canonicalize(raw);
        assert_eq!(
            canon,
            json!({ "kind": "and", "nodes": [{ "kind": "placed_year", "year": 2005 }] })
        );
    }

    #[test]
    fn test_kindless_rule_fields_get_wrapped() {
        let raw = json!({ "min": 1.0, "max": 3.0 });
        let canon = canonicalize(raw);
        let nodes = canon["nodes"].as_array().unwrap();
        assert_eq!(canon["kind"], "and");
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0]["min"], 1.0);
    }

    #[test]
    fn test_kindless_nodes_list_becomes_and() {
        let raw = json!({ "nodes": [{ "kind": "placed_year", "year": 2010 }] });
        let canon = canonicalize(raw);
        assert_eq!(canon["kind"], "and");
        assert_eq!(canon["nodes"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_legacy_type_codes_expand_to_selectors() {
        let raw = json!({ "kind": "type_in", "codes": ["traditional", "mystery"] });
        let canon = canonicalize(raw);
        let leaf = &canon["nodes"][0];
        assert_eq!(leaf["types"][0]["code"], "traditional");
        assert_eq!(leaf["types"][1]["code"], "mystery");
        assert!(leaf.get("codes").is_none());
    }

    #[test]
    fn test_legacy_state_names_expand() {
        let raw = json!({ "kind": "state_in", "state_names": ["Vaud"] });
        let canon = canonicalize(raw);
        assert_eq!(canon["nodes"][0]["states"][0]["name"], "Vaud");
    }

    #[test]
    fn test_canonical_input_is_untouched() {
        let canon = json!({
            "kind": "and",
            "nodes": [
                { "kind": "country_is", "country": { "name": "Switzerland" } },
                { "kind": "difficulty_between", "min": 2.0, "max": 5.0 }
            ]
        });
        assert_eq!(canonicalize(canon.clone()), canon);
    }

    #[test]
    fn test_parse_expression_shorthand() {
        let raw = json!({ "kind": "placed_year", "year": 2005 });
        let expr = parse_expression(raw).unwrap();
        match expr {
            Expr::And { nodes } => {
                assert_eq!(nodes, vec![Expr::PlacedYear { year: 2005 }]);
            }
            other => panic!("expected and wrapper, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_expression_rejects_unknown_kind() {
        let raw = json!({ "kind": "and", "nodes": [{ "kind": "frobnicate" }] });
        assert!(parse_expression(raw).is_err());
    }

    // Strategy over raw inputs covering shorthand and canonical shapes.
    fn raw_expr_strategy() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            (1990i32..2030).prop_map(|y| json!({ "kind": "placed_year", "year": y })),
            (1u8..=5, 1u8..=5).prop_map(|(a, b)| {
                json!({ "kind": "difficulty_between", "min": a.min(b), "max": a.max(b) })
            }),
            proptest::collection::vec("[a-z]{3,8}", 1..3)
                .prop_map(|codes| json!({ "kind": "type_in", "codes": codes })),
            (100i64..5000).prop_map(|t| {
                json!({ "kind": "aggregate_sum_altitude_at_least", "min_total": t })
            }),
        ];
        leaf.prop_recursive(3, 12, 4, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 1..4)
                    .prop_map(|nodes| json!({ "kind": "and", "nodes": nodes })),
                proptest::collection::vec(inner.clone(), 1..4)
                    .prop_map(|nodes| json!({ "nodes": nodes })),
                inner.prop_map(|node| json!({ "kind": "not", "node": node })),
            ]
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_canonicalize_is_idempotent(raw in raw_expr_strategy()) {
            let once = canonicalize(raw);
            let twice = canonicalize(once.clone());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_canonical_root_is_logical(raw in raw_expr_strategy()) {
            let canon = canonicalize(raw);
            let kind = canon["kind"].as_str().unwrap_or_default().to_string();
            prop_assert!(["and", "or", "not"].contains(&kind.as_str()));
        }
    }
}
