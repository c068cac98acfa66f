//! Aggregation of check outcomes into an overall result

use crate::contracts::{CheckOutcome, OverallResult, RunSummary};

/// Fold outcomes into an [`OverallResult`].
///
/// `is_valid` is the AND over all outcomes, so an empty run is valid. Order
/// of `outcomes` is kept as given.
pub fn aggregate(outcomes: Vec<CheckOutcome>) -> OverallResult {
    let mut summary = RunSummary {
        checks_run: outcomes.len(),
        ..RunSummary::default()
    };

    for outcome in &outcomes {
        if outcome.result.is_valid {
            summary.checks_passed += 1;
        } else {
            summary.checks_failed += 1;
        }
        summary.total_errors += outcome.result.errors.len();
        summary.total_warnings += outcome.result.warnings.len();
        summary.total_suggestions += outcome.result.suggestions.len();
    }

    OverallResult {
        is_valid: summary.checks_failed == 0,
        checks: outcomes,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{ValidationIssue, ValidationIssueKind, ValidationResult};

    fn outcome(name: &str, errors: usize, warnings: usize) -> CheckOutcome {
        let mut result = ValidationResult::new();
        for _ in 0..errors {
            result.error(ValidationIssue::new(ValidationIssueKind::UnbalancedEntry, "e"));
        }
        for _ in 0..warnings {
            result.warning(ValidationIssue::new(ValidationIssueKind::EmptyJournalEntry, "w"));
        }
        CheckOutcome {
            name: name.to_string(),
            result,
        }
    }

    #[test]
    fn test_empty_run_is_valid() {
        let overall = aggregate(Vec::new());
        assert!(overall.is_valid);
        assert_eq!(overall.summary, RunSummary::default());
    }

    #[test]
    fn test_counts_and_validity() {
        let overall = aggregate(vec![
            outcome("Account Types", 0, 2),
            outcome("Journal Entry Balance", 3, 1),
            outcome("Orphaned Records", 0, 0),
        ]);

        assert!(!overall.is_valid);
        assert_eq!(overall.summary.checks_run, 3);
        assert_eq!(overall.summary.checks_passed, 2);
        assert_eq!(overall.summary.checks_failed, 1);
        assert_eq!(overall.summary.total_errors, 3);
        assert_eq!(overall.summary.total_warnings, 3);
        assert_eq!(overall.checks[1].name, "Journal Entry Balance");
    }

    #[test]
    fn test_warnings_alone_keep_run_valid() {
        let overall = aggregate(vec![outcome("Stock Consistency", 0, 5)]);
        assert!(overall.is_valid);
    }
}
