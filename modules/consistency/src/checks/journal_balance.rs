//! Double-entry balance per journal entry
//!
//! Uses the grouped line sums from the adapter, so the cost is one row per
//! entry no matter how many lines the ledger holds. Comparison is exact
//! decimal arithmetic.
//!
//! | status | imbalance | lines | severity |
//! |--------|-----------|-------|----------|
//! | posted | non-zero  |       | error `UNBALANCED_ENTRY` |
//! | draft  | non-zero  |       | warning `UNBALANCED_DRAFT_ENTRY` |
//! | posted / draft | | none  | warning `EMPTY_JOURNAL_ENTRY` |
//! | void   |           |       | skipped |

use futures::TryStreamExt;
use rust_decimal::Decimal;

use super::{CheckContext, CheckError};
use crate::adapter::paged;
use crate::contracts::{ValidationIssue, ValidationIssueKind, ValidationResult};
use crate::models::EntryStatus;

pub async fn validate_journal_entry_balance(
    ctx: &CheckContext,
) -> Result<ValidationResult, CheckError> {
    let adapter = ctx.adapter();
    let scope = &ctx.scope;
    let mut result = ValidationResult::new();

    let mut pages = paged(ctx.page_size, move |page| adapter.list_entry_totals(scope, page));

    while let Some(entries) = pages.try_next().await? {
        for totals in entries {
            if totals.status == EntryStatus::Void {
                continue;
            }

            if totals.line_count == 0 {
                result.warning(
                    ValidationIssue::new(
                        ValidationIssueKind::EmptyJournalEntry,
                        format!("Journal entry {} has no lines", totals.entry_id),
                    )
                    .entity(&totals.entry_id),
                );
                continue;
            }

            let imbalance = totals.imbalance();
            if imbalance.is_zero() {
                continue;
            }

            let message = format!(
                "Journal entry {} is unbalanced by {} (debits {}, credits {})",
                totals.entry_id,
                imbalance.abs(),
                totals.total_debit,
                totals.total_credit
            );
            let issue = |kind| {
                ValidationIssue::new(kind, message.clone())
                    .entity(&totals.entry_id)
                    .expected_actual(Decimal::ZERO, imbalance)
            };

            match totals.status {
                EntryStatus::Posted => result.error(issue(ValidationIssueKind::UnbalancedEntry)),
                _ => result.warning(issue(ValidationIssueKind::UnbalancedDraftEntry)),
            }
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::InMemoryStore;
    use crate::checks::test_support::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_balanced_entry_is_valid() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_journal_entry(entry("je-1", EntryStatus::Posted));
        store.insert_journal_line(line("l1", "je-1", "1000", 100, 0));
        store.insert_journal_line(line("l2", "je-1", "4000", 0, 100));

        let result = validate_journal_entry_balance(&ctx(&store)).await.unwrap();

        assert!(result.is_valid);
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_unbalanced_posted_entry_is_error() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_journal_entry(entry("je-1", EntryStatus::Posted));
        store.insert_journal_line(line("l1", "je-1", "1000", 100, 0));
        store.insert_journal_line(line("l2", "je-1", "4000", 0, 90));

        let result = validate_journal_entry_balance(&ctx(&store)).await.unwrap();

        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 1);
        let issue = &result.errors[0];
        assert_eq!(issue.kind, ValidationIssueKind::UnbalancedEntry);
        assert_eq!(issue.entity_ids, vec!["je-1"]);
        assert!(issue.message.contains("unbalanced by 10"));
        assert_eq!(issue.expected.as_deref(), Some("0"));
        assert_eq!(issue.actual.as_deref(), Some("10"));
    }

    #[tokio::test]
    async fn test_unbalanced_draft_is_warning() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_journal_entry(entry("je-1", EntryStatus::Draft));
        store.insert_journal_line(line("l1", "je-1", "1000", 50, 0));

        let result = validate_journal_entry_balance(&ctx(&store)).await.unwrap();

        assert!(result.is_valid);
        assert_eq!(
            result.warnings[0].kind,
            ValidationIssueKind::UnbalancedDraftEntry
        );
    }

    #[tokio::test]
    async fn test_void_and_empty_entries() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_journal_entry(entry("je-void", EntryStatus::Void));
        store.insert_journal_line(line("l1", "je-void", "1000", 50, 0));
        store.insert_journal_entry(entry("je-empty", EntryStatus::Posted));

        let result = validate_journal_entry_balance(&ctx(&store)).await.unwrap();

        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].kind, ValidationIssueKind::EmptyJournalEntry);
        assert_eq!(result.warnings[0].entity_ids, vec!["je-empty"]);
    }
}
