//! Dangling foreign keys
//!
//! Covers account to parent account, journal line to entry and journal line
//! to account. Each reference is resolved in the referencing row's company.

use futures::TryStreamExt;

use super::{CheckContext, CheckError};
use crate::adapter::{paged, resolve_references};
use crate::contracts::{ValidationIssue, ValidationIssueKind, ValidationResult};
use crate::models::EntityKind;

pub async fn validate_orphaned_records(ctx: &CheckContext) -> Result<ValidationResult, CheckError> {
    let adapter = ctx.adapter();
    let scope = &ctx.scope;
    let mut result = ValidationResult::new();

    let mut accounts = paged(ctx.page_size, move |page| adapter.list_accounts(scope, page));
    while let Some(page) = accounts.try_next().await? {
        let parents = resolve_references(
            adapter,
            scope,
            EntityKind::Account,
            page.iter().filter_map(|a| {
                a.parent_id
                    .as_deref()
                    .map(|parent_id| (a.company_id.as_str(), parent_id))
            }),
        )
        .await?;

        for account in &page {
            let Some(parent_id) = &account.parent_id else {
                continue;
            };
            if !parents.contains(&(account.company_id.clone(), parent_id.clone())) {
                result.error(
                    ValidationIssue::new(
                        ValidationIssueKind::OrphanedAccountParent,
                        format!(
                            "Account {} references parent account {} which does not exist",
                            account.code, parent_id
                        ),
                    )
                    .entity(&account.id)
                    .entity(parent_id),
                );
            }
        }
    }

    let mut lines = paged(ctx.page_size, move |page| adapter.list_journal_lines(scope, page));
    while let Some(page) = lines.try_next().await? {
        let entries = resolve_references(
            adapter,
            scope,
            EntityKind::JournalEntry,
            page.iter()
                .map(|l| (l.company_id.as_str(), l.entry_id.as_str())),
        )
        .await?;
        let accounts = resolve_references(
            adapter,
            scope,
            EntityKind::Account,
            page.iter()
                .map(|l| (l.company_id.as_str(), l.account_id.as_str())),
        )
        .await?;

        for line in &page {
            if !entries.contains(&(line.company_id.clone(), line.entry_id.clone())) {
                result.error(
                    ValidationIssue::new(
                        ValidationIssueKind::OrphanedLineEntry,
                        format!(
                            "Journal line {} references journal entry {} which does not exist",
                            line.id, line.entry_id
                        ),
                    )
                    .entity(&line.id)
                    .entity(&line.entry_id),
                );
            }
            if !accounts.contains(&(line.company_id.clone(), line.account_id.clone())) {
                result.error(
                    ValidationIssue::new(
                        ValidationIssueKind::OrphanedLineAccount,
                        format!(
                            "Journal line {} references account {} which does not exist",
                            line.id, line.account_id
                        ),
                    )
                    .entity(&line.id)
                    .entity(&line.account_id),
                );
            }
        }
    }

    Ok(result)
}
