//! Consistency checks
//!
//! A check reads the store through the [`DataAdapter`] and reports anomalies
//! as issues in a [`ValidationResult`](crate::contracts::ValidationResult).
//! Checks never write, and data anomalies never surface as errors: only a
//! failing adapter call does.

pub mod account_types;
pub mod expense_journal;
pub mod journal_balance;
pub mod orphaned_records;
pub mod product_categories;
pub mod stock_consistency;

pub use account_types::validate_account_types;
pub use expense_journal::validate_expense_journal_integration;
pub use journal_balance::validate_journal_entry_balance;
pub use orphaned_records::validate_orphaned_records;
pub use product_categories::validate_product_categories;
pub use stock_consistency::validate_stock_consistency;

use std::sync::Arc;
use thiserror::Error;

use crate::adapter::{AdapterError, DataAdapter};
use crate::models::TenantScope;

/// Errors that stop a check from producing a result
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("data access failed: {0}")]
    DataAccess(#[from] AdapterError),

    #[error("internal check failure: {0}")]
    Internal(String),
}

/// Everything a check needs: the store, the boundary and the page size.
#[derive(Debug, Clone)]
pub struct CheckContext {
    pub adapter: Arc<dyn DataAdapter>,
    pub scope: TenantScope,
    pub page_size: usize,
}

impl CheckContext {
    pub fn new(adapter: Arc<dyn DataAdapter>, scope: TenantScope, page_size: usize) -> Self {
        Self {
            adapter,
            scope,
            page_size: page_size.max(1),
        }
    }

    pub fn adapter(&self) -> &dyn DataAdapter {
        self.adapter.as_ref()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::adapter::InMemoryStore;
    use crate::models::*;
    use rust_decimal::Decimal;

    pub const TENANT: &str = "t1";
    pub const COMPANY: &str = "c1";

    /// Context over `store` scoped to the default test company, with a small
    /// page size so paging is exercised.
    pub fn ctx(store: &Arc<InMemoryStore>) -> CheckContext {
        let adapter: Arc<dyn DataAdapter> = store.clone();
        CheckContext::new(adapter, TenantScope::company(TENANT, COMPANY), 2)
    }

    pub fn dec(value: i64) -> Decimal {
        Decimal::from(value)
    }

    pub fn account_type(id: &str, company: &str) -> AccountType {
        AccountType {
            id: id.into(),
            tenant_id: TENANT.into(),
            company_id: company.into(),
            code: id.to_uppercase(),
            name: id.into(),
        }
    }

    pub fn account(id: &str, company: &str, type_id: &str) -> Account {
        Account {
            id: id.into(),
            tenant_id: TENANT.into(),
            company_id: company.into(),
            code: id.into(),
            type_id: type_id.into(),
            parent_id: None,
            is_active: true,
        }
    }

    pub fn category(id: &str, company: &str) -> ProductCategory {
        ProductCategory {
            id: id.into(),
            tenant_id: TENANT.into(),
            company_id: company.into(),
            code: id.to_uppercase(),
            name: id.into(),
        }
    }

    pub fn product(id: &str, company: &str, category_id: Option<&str>, stock: i64) -> Product {
        Product {
            id: id.into(),
            tenant_id: TENANT.into(),
            company_id: company.into(),
            category_id: category_id.map(Into::into),
            current_stock: dec(stock),
        }
    }

    pub fn movement(id: &str, product_id: &str, quantity: i64, kind: MovementType) -> InventoryMovement {
        InventoryMovement {
            id: id.into(),
            tenant_id: TENANT.into(),
            company_id: COMPANY.into(),
            product_id: product_id.into(),
            quantity: dec(quantity),
            movement_type: kind,
        }
    }

    pub fn entry(id: &str, status: EntryStatus) -> JournalEntry {
        JournalEntry {
            id: id.into(),
            tenant_id: TENANT.into(),
            company_id: COMPANY.into(),
            status,
        }
    }

    pub fn line(id: &str, entry_id: &str, account_id: &str, debit: i64, credit: i64) -> JournalLine {
        JournalLine {
            id: id.into(),
            tenant_id: TENANT.into(),
            company_id: COMPANY.into(),
            entry_id: entry_id.into(),
            account_id: account_id.into(),
            debit: dec(debit),
            credit: dec(credit),
        }
    }

    pub fn expense(id: &str, status: ExpenseStatus, amount: i64, link: Option<&str>) -> Expense {
        Expense {
            id: id.into(),
            tenant_id: TENANT.into(),
            company_id: COMPANY.into(),
            status,
            amount: dec(amount),
            linked_journal_entry_id: link.map(Into::into),
        }
    }
}
