//! Deterministic view selection
//!
//! Chooses between a tabular and a summary presentation from the intent and
//! the rows it returned. Rules are evaluated top to bottom and the first match
//! wins. Selection and explanation read from the same rule table.

use crate::intent::Intent;
use serde::{Deserialize, Serialize};

pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewType {
    Table,
    Summary,
}

impl ViewType {
    pub fn as_str(self) -> &'static str {
        match self {
            ViewType::Table => "table",
            ViewType::Summary => "summary",
        }
    }
}

impl std::fmt::Display for ViewType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct ViewRule {
    view: ViewType,
    applies: fn(&Intent, &[Row]) -> bool,
    explain: fn(&Intent, &[Row]) -> String,
}

/// Small results with many columns read like summary statistics.
const SMALL_RESULT_MAX_ROWS: usize = 3;
const SMALL_RESULT_MIN_COLUMNS: usize = 3;

fn is_small_wide_result(rows: &[Row]) -> bool {
    (1..=SMALL_RESULT_MAX_ROWS).contains(&rows.len())
        && rows[0].len() >= SMALL_RESULT_MIN_COLUMNS
}

const RULES: &[ViewRule] = &[
    ViewRule {
        view: ViewType::Summary,
        applies: |intent, _| !intent.aggregations.is_empty(),
        explain: |intent, _| {
            format!(
                "Summary view selected: Query contains {} aggregation(s)",
                intent.aggregations.len()
            )
        },
    },
    ViewRule {
        view: ViewType::Summary,
        applies: |intent, _| !intent.group_by.is_empty(),
        explain: |intent, _| {
            format!("Summary view selected: Query groups by {}", intent.group_by.join(", "))
        },
    },
    ViewRule {
        view: ViewType::Summary,
        applies: |_, rows| is_small_wide_result(rows),
        explain: |_, rows| {
            format!(
                "Summary view selected: Small result set ({} rows) with {} columns suggests summary statistics",
                rows.len(),
                rows[0].len()
            )
        },
    },
    ViewRule {
        view: ViewType::Summary,
        applies: |intent, _| intent.has_alias(),
        explain: |_, _| "Summary view selected: Query renames columns with aliases".to_string(),
    },
    ViewRule {
        view: ViewType::Summary,
        applies: |intent, _| intent.distinct,
        explain: |_, _| "Summary view selected: Query uses DISTINCT for unique value analysis".to_string(),
    },
];

fn first_match(intent: &Intent, rows: &[Row]) -> Option<&'static ViewRule> {
    RULES.iter().find(|rule| (rule.applies)(intent, rows))
}

pub fn select_view(intent: &Intent, rows: &[Row]) -> ViewType {
    first_match(intent, rows).map_or(ViewType::Table, |rule| rule.view)
}

/// Human-readable reason for [`select_view`]'s decision.
pub fn explain_view(intent: &Intent, rows: &[Row]) -> String {
    match first_match(intent, rows) {
        Some(rule) => (rule.explain)(intent, rows),
        None => format!("Table view selected: Query returns {} individual records", rows.len()),
    }
}
