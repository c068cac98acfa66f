//! Chart of accounts: account type references and posting activity
//!
//! # Rules
//!
//! - Every `Account.type_id` resolves to an account type in the account's own
//!   company (error `ORPHANED_ACCOUNT_TYPE`)
//! - An inactive account with lines in posted entries is reported as a
//!   warning (`INACTIVE_ACCOUNT_WITH_POSTINGS`)
//! - A scope without any account gets a suggestion (`EMPTY_CHART_OF_ACCOUNTS`)

use futures::TryStreamExt;

use super::{CheckContext, CheckError};
use crate::adapter::{group_by_company, paged, resolve_references};
use crate::contracts::{ValidationIssue, ValidationIssueKind, ValidationResult};
use crate::models::EntityKind;

pub async fn validate_account_types(ctx: &CheckContext) -> Result<ValidationResult, CheckError> {
    let adapter = ctx.adapter();
    let scope = &ctx.scope;
    let mut result = ValidationResult::new();
    let mut seen = 0usize;

    let mut pages = paged(ctx.page_size, move |page| adapter.list_accounts(scope, page));

    while let Some(accounts) = pages.try_next().await? {
        seen += accounts.len();

        let types = resolve_references(
            adapter,
            scope,
            EntityKind::AccountType,
            accounts
                .iter()
                .map(|a| (a.company_id.as_str(), a.type_id.as_str())),
        )
        .await?;

        for account in &accounts {
            let key = (account.company_id.clone(), account.type_id.clone());
            if !types.contains(&key) {
                result.error(
                    ValidationIssue::new(
                        ValidationIssueKind::OrphanedAccountType,
                        format!(
                            "Account {} references account type '{}' which does not exist in company {}",
                            account.code, account.type_id, account.company_id
                        ),
                    )
                    .entity(&account.id),
                );
            }
        }

        let inactive = group_by_company(
            accounts
                .iter()
                .filter(|a| !a.is_active)
                .map(|a| (a.company_id.as_str(), a.id.as_str())),
        );
        for (company_id, ids) in inactive {
            let counts = adapter
                .posted_line_counts(&scope.for_company(&company_id), &ids)
                .await?;
            for account in accounts.iter().filter(|a| a.company_id == company_id) {
                let Some(&count) = counts.get(&account.id) else {
                    continue;
                };
                if count > 0 {
                    result.warning(
                        ValidationIssue::new(
                            ValidationIssueKind::InactiveAccountWithPostings,
                            format!(
                                "Inactive account {} has {} line(s) in posted journal entries",
                                account.code, count
                            ),
                        )
                        .entity(&account.id),
                    );
                }
            }
        }
    }

    if seen == 0 {
        result.suggestion(ValidationIssue::new(
            ValidationIssueKind::EmptyChartOfAccounts,
            format!("No accounts defined for {}; set up a chart of accounts", scope),
        ));
    }

    tracing::debug!(scope = %scope, accounts = seen, "Account type check scanned accounts");

    Ok(result)
}
