//! Domain rows read from the accounting store.
//!
//! These are owned by the external store. The consistency engine only reads
//! them, except through the explicit fix writes in [`crate::adapter::FixPatch`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Tenant/company boundary every check and fix runs inside.
///
/// `company_id = None` means every company of the tenant. Reference lookups
/// are still made per company, using the referencing row's own company.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantScope {
    pub tenant_id: String,
    pub company_id: Option<String>,
}

impl TenantScope {
    pub fn new(tenant_id: impl Into<String>, company_id: Option<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            company_id,
        }
    }

    pub fn company(tenant_id: impl Into<String>, company_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            company_id: Some(company_id.into()),
        }
    }

    /// Narrow this scope to a single company of the same tenant.
    pub fn for_company(&self, company_id: &str) -> Self {
        Self {
            tenant_id: self.tenant_id.clone(),
            company_id: Some(company_id.to_string()),
        }
    }

    /// Whether a row owned by (tenant_id, company_id) is visible in this scope.
    pub fn contains(&self, tenant_id: &str, company_id: &str) -> bool {
        self.tenant_id == tenant_id
            && self
                .company_id
                .as_deref()
                .is_none_or(|scoped| scoped == company_id)
    }
}

impl fmt::Display for TenantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.company_id {
            Some(company) => write!(f, "{}/{}", self.tenant_id, company),
            None => write!(f, "{}/*", self.tenant_id),
        }
    }
}

/// Kinds of rows the engine can reference, look up or patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    AccountType,
    Account,
    ProductCategory,
    Product,
    JournalEntry,
    JournalLine,
    InventoryMovement,
    Expense,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::AccountType => "account_type",
            EntityKind::Account => "account",
            EntityKind::ProductCategory => "product_category",
            EntityKind::Product => "product",
            EntityKind::JournalEntry => "journal_entry",
            EntityKind::JournalLine => "journal_line",
            EntityKind::InventoryMovement => "inventory_movement",
            EntityKind::Expense => "expense",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Journal entry status enum matching database journal_entry_status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "journal_entry_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Draft,
    Posted,
    Void,
}

/// Expense status enum matching database expense_status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "expense_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ExpenseStatus {
    Draft,
    Posted,
    Void,
}

/// Inventory movement type enum matching database movement_type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "movement_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    Receipt,
    Issue,
    Adjustment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AccountType {
    pub id: String,
    pub tenant_id: String,
    pub company_id: String,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: String,
    pub tenant_id: String,
    pub company_id: String,
    pub code: String,
    pub type_id: String,
    pub parent_id: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ProductCategory {
    pub id: String,
    pub tenant_id: String,
    pub company_id: String,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: String,
    pub tenant_id: String,
    pub company_id: String,
    pub category_id: Option<String>,
    /// Stock level as recorded on the product row
    pub current_stock: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct JournalEntry {
    pub id: String,
    pub tenant_id: String,
    pub company_id: String,
    pub status: EntryStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct JournalLine {
    pub id: String,
    pub tenant_id: String,
    /// Denormalised from the entry so a line stays scoped when its entry is gone
    pub company_id: String,
    pub entry_id: String,
    pub account_id: String,
    pub debit: Decimal,
    pub credit: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct InventoryMovement {
    pub id: String,
    pub tenant_id: String,
    pub company_id: String,
    pub product_id: String,
    pub quantity: Decimal,
    pub movement_type: MovementType,
}

impl InventoryMovement {
    /// Effect of this movement on the running stock balance.
    pub fn signed_quantity(&self) -> Decimal {
        match self.movement_type {
            MovementType::Receipt | MovementType::Adjustment => self.quantity,
            MovementType::Issue => -self.quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Expense {
    pub id: String,
    pub tenant_id: String,
    pub company_id: String,
    pub status: ExpenseStatus,
    pub amount: Decimal,
    pub linked_journal_entry_id: Option<String>,
}

/// Per-entry line aggregate: `SUM(debit)`, `SUM(credit)` grouped by entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct EntryTotals {
    pub entry_id: String,
    pub company_id: String,
    pub status: EntryStatus,
    pub line_count: i64,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
}

impl EntryTotals {
    /// `sum(debit) - sum(credit)`; zero means balanced.
    pub fn imbalance(&self) -> Decimal {
        self.total_debit - self.total_credit
    }
}

/// Recorded stock against the balance recomputed from movement history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct StockPosition {
    pub product_id: String,
    pub company_id: String,
    pub recorded_stock: Decimal,
    pub movement_balance: Decimal,
    pub movement_count: i64,
}
