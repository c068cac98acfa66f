//! Common test utilities for consistency integration tests
//!
//! Every test builds its own [`Ledger`] over a fresh in-memory store, so
//! tests share nothing and need no database.
//!
//! ## Usage
//! ```rust,ignore
//! mod common;
//! use common::Ledger;
//!
//! #[tokio::test]
//! async fn my_test() {
//!     let ledger = Ledger::new();
//!     ledger.account("1000", "TYPE_ASSET");
//!     let result = ledger.service().run_all_checks(&ledger.scope()).await;
//! }
//! ```
#![allow(dead_code)]

use consistency_rs::adapter::{DataAdapter, InMemoryStore};
use consistency_rs::config::EngineSettings;
use consistency_rs::models::*;
use consistency_rs::{ConsistencyService, TenantScope};
use rust_decimal::Decimal;
use std::sync::Arc;

pub const TENANT: &str = "tenant-a";
pub const COMPANY: &str = "company-1";

pub fn dec(value: i64) -> Decimal {
    Decimal::from(value)
}

/// Fixture builder over one tenant/company of an in-memory store
pub struct Ledger {
    pub store: Arc<InMemoryStore>,
    pub tenant_id: String,
    pub company_id: String,
}

impl Ledger {
    pub fn new() -> Self {
        Self::in_company(TENANT, COMPANY)
    }

    pub fn in_company(tenant_id: &str, company_id: &str) -> Self {
        Self {
            store: Arc::new(InMemoryStore::new()),
            tenant_id: tenant_id.to_string(),
            company_id: company_id.to_string(),
        }
    }

    /// Another tenant/company writing into the same store.
    pub fn sibling(&self, tenant_id: &str, company_id: &str) -> Self {
        Self {
            store: Arc::clone(&self.store),
            tenant_id: tenant_id.to_string(),
            company_id: company_id.to_string(),
        }
    }

    pub fn scope(&self) -> TenantScope {
        TenantScope::company(self.tenant_id.clone(), self.company_id.clone())
    }

    pub fn settings() -> EngineSettings {
        EngineSettings {
            page_size: 3,
            max_concurrent_checks: 3,
            ..EngineSettings::default()
        }
    }

    pub fn service(&self) -> ConsistencyService {
        let adapter: Arc<dyn DataAdapter> = self.store.clone();
        ConsistencyService::new(adapter, Self::settings())
    }

    pub fn account_type(&self, id: &str, code: &str) {
        self.store.insert_account_type(AccountType {
            id: id.into(),
            tenant_id: self.tenant_id.clone(),
            company_id: self.company_id.clone(),
            code: code.into(),
            name: code.into(),
        });
    }

    pub fn account(&self, id: &str, type_id: &str) {
        self.store.insert_account(Account {
            id: id.into(),
            tenant_id: self.tenant_id.clone(),
            company_id: self.company_id.clone(),
            code: id.into(),
            type_id: type_id.into(),
            parent_id: None,
            is_active: true,
        });
    }

    pub fn category(&self, id: &str) {
        self.store.insert_product_category(ProductCategory {
            id: id.into(),
            tenant_id: self.tenant_id.clone(),
            company_id: self.company_id.clone(),
            code: id.to_uppercase(),
            name: id.into(),
        });
    }

    pub fn product(&self, id: &str, category_id: Option<&str>, stock: i64) {
        self.store.insert_product(Product {
            id: id.into(),
            tenant_id: self.tenant_id.clone(),
            company_id: self.company_id.clone(),
            category_id: category_id.map(Into::into),
            current_stock: dec(stock),
        });
    }

    pub fn movement(&self, id: &str, product_id: &str, quantity: i64, movement_type: MovementType) {
        self.store.insert_inventory_movement(InventoryMovement {
            id: id.into(),
            tenant_id: self.tenant_id.clone(),
            company_id: self.company_id.clone(),
            product_id: product_id.into(),
            quantity: dec(quantity),
            movement_type,
        });
    }

    /// Journal entry with `(account, debit, credit)` lines.
    pub fn entry(&self, id: &str, status: EntryStatus, lines: &[(&str, i64, i64)]) {
        self.store.insert_journal_entry(JournalEntry {
            id: id.into(),
            tenant_id: self.tenant_id.clone(),
            company_id: self.company_id.clone(),
            status,
        });
        for (n, (account_id, debit, credit)) in lines.iter().enumerate() {
            self.store.insert_journal_line(JournalLine {
                id: format!("{id}-l{n}"),
                tenant_id: self.tenant_id.clone(),
                company_id: self.company_id.clone(),
                entry_id: id.into(),
                account_id: (*account_id).into(),
                debit: dec(*debit),
                credit: dec(*credit),
            });
        }
    }

    pub fn expense(&self, id: &str, status: ExpenseStatus, amount: i64, link: Option<&str>) {
        self.store.insert_expense(Expense {
            id: id.into(),
            tenant_id: self.tenant_id.clone(),
            company_id: self.company_id.clone(),
            status,
            amount: dec(amount),
            linked_journal_entry_id: link.map(Into::into),
        });
    }

    /// A small, fully consistent company: chart, one balanced entry, one
    /// categorised product with matching stock, one linked expense.
    pub fn seed_clean(&self) {
        self.account_type("TYPE_ASSET", "ASSET");
        self.account_type("TYPE_REVENUE", "REVENUE");
        self.account("1000", "TYPE_ASSET");
        self.account("4000", "TYPE_REVENUE");
        self.entry(
            "je-1",
            EntryStatus::Posted,
            &[("1000", 100, 0), ("4000", 0, 100)],
        );
        self.category("cat-tools");
        self.product("p1", Some("cat-tools"), 6);
        self.movement("m1", "p1", 10, MovementType::Receipt);
        self.movement("m2", "p1", 4, MovementType::Issue);
        self.expense("x1", ExpenseStatus::Posted, 100, Some("je-1"));
    }
}
