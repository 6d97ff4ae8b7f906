//! Batch preparation of submitted task payloads.
//!
//! Runs canonicalize → parse → normalize → validate over a whole task list.
//! Failures are isolated per task and collected into one issue list, so a
//! payload with three broken tasks reports all three at once.

use crate::canonical::parse_expression;
use crate::normalize::normalize;
use crate::validate::validate;
use cairn_core::error::{IssueCode, TaskIssue};
use cairn_core::{Expr, ReferentialSnapshot, TaskConstraints};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// One submitted task, expression still in raw JSON form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDraft {
    pub order: i32,
    pub title: String,
    pub expression: Value,
    #[serde(default)]
    pub constraints: TaskConstraints,
}

/// A fully prepared task, ready for storage.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedTask {
    pub order: i32,
    pub title: String,
    pub expression: Expr,
    pub constraints: TaskConstraints,
}

/// Outcome of a validate-only call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub issues: Vec<TaskIssue>,
}

/// Prepare a task payload for storage. Returns every prepared task, or the
/// full issue list if anything in the batch is invalid — no partial writes.
pub fn prepare_tasks(
    drafts: &[TaskDraft],
    refs: &ReferentialSnapshot,
) -> Result<Vec<PreparedTask>, Vec<TaskIssue>> {
    let mut issues: Vec<TaskIssue> = Vec::new();
    let mut prepared: Vec<PreparedTask> = Vec::with_capacity(drafts.len());

    if drafts.is_empty() {
        issues.push(TaskIssue::new(
            0,
            "tasks",
            IssueCode::InvalidConstraint,
            "tasks payload must be a non-empty list",
        ));
        return Err(issues);
    }

    let mut seen_orders: HashSet<i32> = HashSet::new();

    for (index, draft) in drafts.iter().enumerate() {
        let before = issues.len();

        if !seen_orders.insert(draft.order) {
            issues.push(TaskIssue::new(
                index,
                "order",
                IssueCode::DuplicateOrder,
                format!("duplicate order '{}' in tasks payload", draft.order),
            ));
        }

        if draft.constraints.min_count < 0 {
            issues.push(TaskIssue::new(
                index,
                "constraints",
                IssueCode::InvalidConstraint,
                "min_count must be >= 0",
            ));
        }

        let expr = match parse_expression(draft.expression.clone()) {
            Ok(expr) => expr,
            Err(err) => {
                issues.push(TaskIssue::new(
                    index,
                    "expression",
                    IssueCode::InvalidExpression,
                    err.to_string(),
                ));
                continue;
            }
        };

        let expr = match normalize(expr, refs, index) {
            Ok(expr) => expr,
            Err(issue) => {
                issues.push(issue);
                continue;
            }
        };

        issues.extend(validate(&expr, refs, index));

        if issues.len() == before {
            prepared.push(PreparedTask {
                order: draft.order,
                title: draft.title.clone(),
                expression: expr,
                constraints: draft.constraints,
            });
        }
    }

    if issues.is_empty() {
        Ok(prepared)
    } else {
        Err(issues)
    }
}

/// Dry-run variant: same pipeline, issue report instead of a hard error.
pub fn validate_tasks(drafts: &[TaskDraft], refs: &ReferentialSnapshot) -> ValidationReport {
    match prepare_tasks(drafts, refs) {
        Ok(_) => ValidationReport {
            ok: true,
            issues: Vec::new(),
        },
        Err(issues) => ValidationReport { ok: false, issues },
    }
}

// =============================================================================
// TESTS
// =============================================================================
