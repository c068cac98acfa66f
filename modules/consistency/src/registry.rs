//! Check registry
//!
//! Ordered table of `{key, display_name, run}` built once. Registry position
//! is the canonical output order of every run. Lookup by requested name goes
//! through a precomputed normalised-key index.

use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::fmt;

use crate::checks::{self, CheckContext, CheckError};
use crate::contracts::ValidationResult;

/// Future returned by a registered check
pub type CheckFuture = BoxFuture<'static, Result<ValidationResult, CheckError>>;

/// Entry point of a registered check
pub type CheckFn = fn(CheckContext) -> CheckFuture;

/// Normalise a display name or requested name into a lookup key.
///
/// Lowercases and replaces every run of whitespace with a single `_`;
/// leading and trailing whitespace is dropped. Idempotent on keys.
pub fn normalize_check_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

#[derive(Clone)]
pub struct RegisteredCheck {
    pub key: String,
    pub display_name: &'static str,
    pub run: CheckFn,
}

impl fmt::Debug for RegisteredCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredCheck")
            .field("key", &self.key)
            .field("display_name", &self.display_name)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CheckRegistry {
    checks: Vec<RegisteredCheck>,
    index: HashMap<String, usize>,
}

macro_rules! boxed_check {
    ($name:ident => $validate:path) => {
        fn $name(ctx: CheckContext) -> CheckFuture {
            async move { $validate(&ctx).await }.boxed()
        }
    };
}

boxed_check!(run_account_types => checks::validate_account_types);
boxed_check!(run_product_categories => checks::validate_product_categories);
boxed_check!(run_stock_consistency => checks::validate_stock_consistency);
boxed_check!(run_journal_entry_balance => checks::validate_journal_entry_balance);
boxed_check!(run_expense_journal_integration => checks::validate_expense_journal_integration);
boxed_check!(run_orphaned_records => checks::validate_orphaned_records);

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The six built-in checks, in canonical order.
    pub fn standard() -> Self {
        Self::new()
            .with_check("Account Types", run_account_types)
            .with_check("Product Categories", run_product_categories)
            .with_check("Stock Consistency", run_stock_consistency)
            .with_check("Journal Entry Balance", run_journal_entry_balance)
            .with_check("Expense Journal Integration", run_expense_journal_integration)
            .with_check("Orphaned Records", run_orphaned_records)
    }

    /// Append a check. A display name whose key is already registered is
    /// ignored.
    pub fn with_check(mut self, display_name: &'static str, run: CheckFn) -> Self {
        let key = normalize_check_name(display_name);
        if self.index.contains_key(&key) {
            tracing::warn!(check = %display_name, "Duplicate check key ignored");
            return self;
        }
        self.index.insert(key.clone(), self.checks.len());
        self.checks.push(RegisteredCheck {
            key,
            display_name,
            run,
        });
        self
    }

    /// Registry position of a requested name, after normalisation.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(&normalize_check_name(name)).copied()
    }

    pub fn get(&self, position: usize) -> Option<&RegisteredCheck> {
        self.checks.get(position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredCheck> {
        self.checks.iter()
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_display_names() {
        assert_eq!(normalize_check_name("Account Types"), "account_types");
        assert_eq!(normalize_check_name("Journal Entry Balance"), "journal_entry_balance");
        assert_eq!(
            normalize_check_name("Expense Journal Integration"),
            "expense_journal_integration"
        );
    }

    #[test]
    fn test_normalize_collapses_whitespace_runs() {
        assert_eq!(normalize_check_name("Account  \t Types"), "account_types");
        assert_eq!(normalize_check_name("  Stock Consistency \n"), "stock_consistency");
        assert_eq!(normalize_check_name("ORPHANED RECORDS"), "orphaned_records");
    }

    #[test]
    fn test_normalize_is_idempotent_on_keys() {
        for check in CheckRegistry::standard().iter() {
            assert_eq!(normalize_check_name(&check.key), check.key);
        }
    }

    #[test]
    fn test_standard_registry_order_and_keys() {
        let registry = CheckRegistry::standard();
        let keys: Vec<&str> = registry.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "account_types",
                "product_categories",
                "stock_consistency",
                "journal_entry_balance",
                "expense_journal_integration",
                "orphaned_records",
            ]
        );
    }

    #[test]
    fn test_position_accepts_display_name_or_key() {
        let registry = CheckRegistry::standard();
        assert_eq!(registry.position("Stock Consistency"), Some(2));
        assert_eq!(registry.position("stock_consistency"), Some(2));
        assert_eq!(registry.position("unknown_check"), None);
    }

    #[test]
    fn test_duplicate_key_ignored() {
        let registry = CheckRegistry::standard().with_check("account types", run_stock_consistency);
        assert_eq!(registry.len(), 6);
        assert_eq!(registry.get(0).map(|c| c.display_name), Some("Account Types"));
    }
}
