//! Recorded stock against movement history
//!
//! The balance recomputed from inventory movements (receipts and adjustments
//! add, issues subtract) must equal the product's recorded stock exactly.

use futures::TryStreamExt;
use rust_decimal::Decimal;

use super::{CheckContext, CheckError};
use crate::adapter::paged;
use crate::contracts::{ValidationIssue, ValidationIssueKind, ValidationResult};

pub async fn validate_stock_consistency(
    ctx: &CheckContext,
) -> Result<ValidationResult, CheckError> {
    let adapter = ctx.adapter();
    let scope = &ctx.scope;
    let mut result = ValidationResult::new();

    let mut pages = paged(ctx.page_size, move |page| {
        adapter.list_stock_positions(scope, page)
    });

    while let Some(positions) = pages.try_next().await? {
        for position in positions {
            if position.recorded_stock != position.movement_balance {
                result.error(
                    ValidationIssue::new(
                        ValidationIssueKind::StockMismatch,
                        format!(
                            "Product {} records stock {} but its {} movement(s) total {}",
                            position.product_id,
                            position.recorded_stock,
                            position.movement_count,
                            position.movement_balance
                        ),
                    )
                    .entity(&position.product_id)
                    .expected_actual(position.movement_balance, position.recorded_stock),
                );
            }

            if position.movement_balance < Decimal::ZERO {
                result.warning(
                    ValidationIssue::new(
                        ValidationIssueKind::NegativeStockBalance,
                        format!(
                            "Product {} has a negative stock balance of {}",
                            position.product_id, position.movement_balance
                        ),
                    )
                    .entity(&position.product_id),
                );
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
    use crate::models::MovementType;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_matching_stock_is_valid() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_product(product("p1", COMPANY, None, 7));
        store.insert_inventory_movement(movement("m1", "p1", 10, MovementType::Receipt));
        store.insert_inventory_movement(movement("m2", "p1", 4, MovementType::Issue));
        store.insert_inventory_movement(movement("m3", "p1", 1, MovementType::Adjustment));

        let result = validate_stock_consistency(&ctx(&store)).await.unwrap();

        assert!(result.is_valid);
        assert!(result.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_mismatch_reports_expected_and_actual() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_product(product("p1", COMPANY, None, 12));
        store.insert_inventory_movement(movement("m1", "p1", 10, MovementType::Receipt));

        let result = validate_stock_consistency(&ctx(&store)).await.unwrap();

        assert!(!result.is_valid);
        assert_eq!(result.errors[0].kind, ValidationIssueKind::StockMismatch);
        assert_eq!(result.errors[0].expected.as_deref(), Some("10"));
        assert_eq!(result.errors[0].actual.as_deref(), Some("12"));
    }

    #[tokio::test]
    async fn test_negative_balance_is_warning() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_product(product("p1", COMPANY, None, -3));
        store.insert_inventory_movement(movement("m1", "p1", 3, MovementType::Issue));

        let result = validate_stock_consistency(&ctx(&store)).await.unwrap();

        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(
            result.warnings[0].kind,
            ValidationIssueKind::NegativeStockBalance
        );
    }

    #[tokio::test]
    async fn test_product_without_movements_expects_zero() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_product(product("p1", COMPANY, None, 0));
        store.insert_product(product("p2", COMPANY, None, 5));

        let result = validate_stock_consistency(&ctx(&store)).await.unwrap();

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].entity_ids, vec!["p2"]);
    }
}
