//! Consistency report contract (v1)
//!
//! Serialized as JSON by the outer API layer: one object per check with
//! `isValid`, `errors[]`, `warnings[]`, `suggestions[]`, plus aggregate counts.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Closed set of issue classes a check can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationIssueKind {
    OrphanedAccountType,
    EmptyChartOfAccounts,
    InactiveAccountWithPostings,
    OrphanedProductCategory,
    StockMismatch,
    NegativeStockBalance,
    UnbalancedEntry,
    UnbalancedDraftEntry,
    EmptyJournalEntry,
    MissingExpenseJournalLink,
    ExpenseJournalNotFound,
    ExpenseAmountMismatch,
    DraftExpenseLinked,
    OrphanedAccountParent,
    OrphanedLineEntry,
    OrphanedLineAccount,
    DataAccessFailure,
    InternalCheckFailure,
}

impl ValidationIssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrphanedAccountType => "ORPHANED_ACCOUNT_TYPE",
            Self::EmptyChartOfAccounts => "EMPTY_CHART_OF_ACCOUNTS",
            Self::InactiveAccountWithPostings => "INACTIVE_ACCOUNT_WITH_POSTINGS",
            Self::OrphanedProductCategory => "ORPHANED_PRODUCT_CATEGORY",
            Self::StockMismatch => "STOCK_MISMATCH",
            Self::NegativeStockBalance => "NEGATIVE_STOCK_BALANCE",
            Self::UnbalancedEntry => "UNBALANCED_ENTRY",
            Self::UnbalancedDraftEntry => "UNBALANCED_DRAFT_ENTRY",
            Self::EmptyJournalEntry => "EMPTY_JOURNAL_ENTRY",
            Self::MissingExpenseJournalLink => "MISSING_EXPENSE_JOURNAL_LINK",
            Self::ExpenseJournalNotFound => "EXPENSE_JOURNAL_NOT_FOUND",
            Self::ExpenseAmountMismatch => "EXPENSE_AMOUNT_MISMATCH",
            Self::DraftExpenseLinked => "DRAFT_EXPENSE_LINKED",
            Self::OrphanedAccountParent => "ORPHANED_ACCOUNT_PARENT",
            Self::OrphanedLineEntry => "ORPHANED_LINE_ENTRY",
            Self::OrphanedLineAccount => "ORPHANED_LINE_ACCOUNT",
            Self::DataAccessFailure => "DATA_ACCESS_FAILURE",
            Self::InternalCheckFailure => "INTERNAL_CHECK_FAILURE",
        }
    }
}

impl fmt::Display for ValidationIssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single finding. Built by checks (and by the runner for synthetic
/// failure outcomes); never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub kind: ValidationIssueKind,
    pub message: String,
    pub entity_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
}

impl ValidationIssue {
    pub fn new(kind: ValidationIssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            entity_ids: Vec::new(),
            expected: None,
            actual: None,
        }
    }

    pub fn entity(mut self, id: impl Into<String>) -> Self {
        self.entity_ids.push(id.into());
        self
    }

    pub fn expected_actual(mut self, expected: impl fmt::Display, actual: impl fmt::Display) -> Self {
        self.expected = Some(expected.to_string());
        self.actual = Some(actual.to_string());
        self
    }
}

/// Outcome of one check. `is_valid` is derived: true iff `errors` is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub suggestions: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            ..Default::default()
        }
    }

    pub fn error(&mut self, issue: ValidationIssue) {
        self.errors.push(issue);
        self.is_valid = false;
    }

    pub fn warning(&mut self, issue: ValidationIssue) {
        self.warnings.push(issue);
    }

    pub fn suggestion(&mut self, issue: ValidationIssue) {
        self.suggestions.push(issue);
    }

    /// Result holding a single error, used for failed check executions.
    pub fn failed(issue: ValidationIssue) -> Self {
        let mut result = Self::new();
        result.error(issue);
        result
    }
}

/// One executed check, in registry position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutcome {
    pub name: String,
    pub result: ValidationResult,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub checks_run: usize,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub total_errors: usize,
    pub total_warnings: usize,
    pub total_suggestions: usize,
}

/// Aggregate of every check executed in one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallResult {
    pub is_valid: bool,
    pub checks: Vec<CheckOutcome>,
    pub summary: RunSummary,
}

impl OverallResult {
    /// Deterministic SHA-256 fingerprint of the report.
    ///
    /// Format: SHA-256 over `name|kind|entity_ids|expected|actual` for every
    /// issue of every check, in report order, with a severity tag per issue.
    /// Same findings always produce the same digest, so two runs can be
    /// compared without diffing the full JSON.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();

        for check in &self.checks {
            hasher.update(check.name.as_bytes());
            hasher.update(if check.result.is_valid { b"|1" } else { b"|0" });

            let severities = [
                ("E", &check.result.errors),
                ("W", &check.result.warnings),
                ("S", &check.result.suggestions),
            ];
            for (tag, issues) in severities {
                for issue in issues {
                    hasher.update(b"|");
                    hasher.update(tag.as_bytes());
                    hasher.update(b":");
                    hasher.update(issue.kind.as_str().as_bytes());
                    hasher.update(b":");
                    hasher.update(issue.entity_ids.join(",").as_bytes());
                    hasher.update(b":");
                    hasher.update(issue.expected.as_deref().unwrap_or("").as_bytes());
                    hasher.update(b":");
                    hasher.update(issue.actual.as_deref().unwrap_or("").as_bytes());
                }
            }
            hasher.update(b"\n");
        }

        format!("{:x}", hasher.finalize())
    }
}
