//! CAIRN Expr - Task Expression Pipeline
//!
//! This crate turns raw task-expression input into stored canonical tasks and
//! runtime predicates. Every expression passes through the same pipeline:
//!
//! ```text
//! Raw JSON (possibly shorthand)
//!     ↓
//! Canonicalizer (explicit `and` wrapper, legacy list forms)
//!     ↓
//! Typed AST (`cairn_core::Expr`)
//!     ↓
//! Normalizer (codes/names → stable referential ids)
//!     ↓
//! Validator (existence, ranges, aggregate placement, sibling rules)
//!     ↓
//! Compiler ──→ Matcher tree     (full AND/OR/NOT, candidate search)
//!          └─→ Conjunction      (AND-only, progress counting + signature)
//! ```

pub mod canonical;
pub mod compile;
pub mod conjunction;
pub mod normalize;
pub mod pipeline;
pub mod validate;

// Re-export key types for convenience
pub use canonical::{canonicalize, parse_expression};
pub use compile::{compile_matcher, Condition, Matcher};
pub use conjunction::{
    compile_conjunction, AggregateSpec, Conjunction, ConjunctionOutcome, UNSUPPORTED_SIGNATURE,
};
pub use normalize::normalize;
pub use pipeline::{prepare_tasks, validate_tasks, PreparedTask, TaskDraft, ValidationReport};
pub use validate::validate;
