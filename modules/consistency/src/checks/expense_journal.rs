//! Expense to journal entry integration
//!
//! # Rules
//!
//! - A posted expense must link a journal entry (`MISSING_EXPENSE_JOURNAL_LINK`)
//! - A linked entry must exist in the expense's company and not be void
//!   (`EXPENSE_JOURNAL_NOT_FOUND`)
//! - A posted expense's entry must carry the expense amount on its debit side
//!   (`EXPENSE_AMOUNT_MISMATCH`)
//! - A draft expense that already links an entry gets a suggestion
//!   (`DRAFT_EXPENSE_LINKED`)
//!
//! Void expenses are skipped.

use futures::TryStreamExt;
use std::collections::HashMap;

use super::{CheckContext, CheckError};
use crate::adapter::{group_by_company, paged};
use crate::contracts::{ValidationIssue, ValidationIssueKind, ValidationResult};
use crate::models::{EntryStatus, EntryTotals, ExpenseStatus};

pub async fn validate_expense_journal_integration(
    ctx: &CheckContext,
) -> Result<ValidationResult, CheckError> {
    let adapter = ctx.adapter();
    let scope = &ctx.scope;
    let mut result = ValidationResult::new();

    let mut pages = paged(ctx.page_size, move |page| adapter.list_expenses(scope, page));

    while let Some(expenses) = pages.try_next().await? {
        let expenses: Vec<_> = expenses
            .into_iter()
            .filter(|e| e.status != ExpenseStatus::Void)
            .collect();

        // Linked entries, keyed by (company, entry id) of the referencing expense
        let mut entries: HashMap<(String, String), EntryTotals> = HashMap::new();
        let links = group_by_company(expenses.iter().filter_map(|e| {
            e.linked_journal_entry_id
                .as_deref()
                .map(|entry_id| (e.company_id.as_str(), entry_id))
        }));
        for (company_id, ids) in links {
            let totals = adapter
                .entry_totals_for(&scope.for_company(&company_id), &ids)
                .await?;
            entries.extend(
                totals
                    .into_iter()
                    .map(|t| ((company_id.clone(), t.entry_id.clone()), t)),
            );
        }

        for expense in &expenses {
            let Some(entry_id) = &expense.linked_journal_entry_id else {
                if expense.status == ExpenseStatus::Posted {
                    result.error(
                        ValidationIssue::new(
                            ValidationIssueKind::MissingExpenseJournalLink,
                            format!("Posted expense {} has no linked journal entry", expense.id),
                        )
                        .entity(&expense.id),
                    );
                }
                continue;
            };

            let linked = entries
                .get(&(expense.company_id.clone(), entry_id.clone()))
                .filter(|t| t.status != EntryStatus::Void);
            let Some(totals) = linked else {
                result.error(
                    ValidationIssue::new(
                        ValidationIssueKind::ExpenseJournalNotFound,
                        format!(
                            "Expense {} links journal entry {} which does not exist in company {}",
                            expense.id, entry_id, expense.company_id
                        ),
                    )
                    .entity(&expense.id)
                    .entity(entry_id),
                );
                continue;
            };

            match expense.status {
                ExpenseStatus::Posted if totals.total_debit != expense.amount => {
                    result.error(
                        ValidationIssue::new(
                            ValidationIssueKind::ExpenseAmountMismatch,
                            format!(
                                "Expense {} amount {} does not match journal entry {} debits {}",
                                expense.id, expense.amount, entry_id, totals.total_debit
                            ),
                        )
                        .entity(&expense.id)
                        .entity(entry_id)
                        .expected_actual(expense.amount, totals.total_debit),
                    );
                }
                ExpenseStatus::Draft => {
                    result.suggestion(
                        ValidationIssue::new(
                            ValidationIssueKind::DraftExpenseLinked,
                            format!(
                                "Draft expense {} is already linked to journal entry {}; post or unlink it",
                                expense.id, entry_id
                            ),
                        )
                        .entity(&expense.id)
                        .entity(entry_id),
                    );
                }
                _ => {}
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

    fn posted_entry(store: &InMemoryStore, id: &str, amount: i64) {
        store.insert_journal_entry(entry(id, EntryStatus::Posted));
        store.insert_journal_line(line(&format!("{id}-dr"), id, "6000", amount, 0));
        store.insert_journal_line(line(&format!("{id}-cr"), id, "2000", 0, amount));
    }

    #[tokio::test]
    async fn test_linked_expense_with_matching_amount_is_valid() {
        let store = Arc::new(InMemoryStore::new());
        posted_entry(&store, "je-1", 250);
        store.insert_expense(expense("x1", ExpenseStatus::Posted, 250, Some("je-1")));

        let result = validate_expense_journal_integration(&ctx(&store)).await.unwrap();

        assert!(result.is_valid, "{:?}", result.errors);
    }

    #[tokio::test]
    async fn test_posted_expense_without_link() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_expense(expense("x1", ExpenseStatus::Posted, 250, None));
        store.insert_expense(expense("x2", ExpenseStatus::Draft, 250, None));
        store.insert_expense(expense("x3", ExpenseStatus::Void, 250, None));

        let result = validate_expense_journal_integration(&ctx(&store)).await.unwrap();

        assert_eq!(result.errors.len(), 1);
        assert_eq!(
            result.errors[0].kind,
            ValidationIssueKind::MissingExpenseJournalLink
        );
        assert_eq!(result.errors[0].entity_ids, vec!["x1"]);
    }

    #[tokio::test]
    async fn test_dangling_and_void_links() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_journal_entry(entry("je-void", EntryStatus::Void));
        store.insert_expense(expense("x1", ExpenseStatus::Posted, 10, Some("je-missing")));
        store.insert_expense(expense("x2", ExpenseStatus::Posted, 10, Some("je-void")));

        let result = validate_expense_journal_integration(&ctx(&store)).await.unwrap();

        assert_eq!(result.errors.len(), 2);
        assert!(result
            .errors
            .iter()
            .all(|e| e.kind == ValidationIssueKind::ExpenseJournalNotFound));
    }

    #[tokio::test]
    async fn test_amount_mismatch_and_draft_suggestion() {
        let store = Arc::new(InMemoryStore::new());
        posted_entry(&store, "je-1", 200);
        posted_entry(&store, "je-2", 75);
        store.insert_expense(expense("x1", ExpenseStatus::Posted, 250, Some("je-1")));
        store.insert_expense(expense("x2", ExpenseStatus::Draft, 75, Some("je-2")));

        let result = validate_expense_journal_integration(&ctx(&store)).await.unwrap();

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, ValidationIssueKind::ExpenseAmountMismatch);
        assert_eq!(result.errors[0].expected.as_deref(), Some("250"));
        assert_eq!(result.errors[0].actual.as_deref(), Some("200"));
        assert_eq!(result.suggestions.len(), 1);
        assert_eq!(result.suggestions[0].kind, ValidationIssueKind::DraftExpenseLinked);
    }
}
