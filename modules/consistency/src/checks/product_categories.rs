//! Product category references
//!
//! A product's `category_id`, when set, must resolve to a category in the
//! product's own company. Products without a category are valid.

use futures::TryStreamExt;

use super::{CheckContext, CheckError};
use crate::adapter::{paged, resolve_references};
use crate::contracts::{ValidationIssue, ValidationIssueKind, ValidationResult};
use crate::models::EntityKind;

pub async fn validate_product_categories(
    ctx: &CheckContext,
) -> Result<ValidationResult, CheckError> {
    let adapter = ctx.adapter();
    let scope = &ctx.scope;
    let mut result = ValidationResult::new();

    let mut pages = paged(ctx.page_size, move |page| adapter.list_products(scope, page));

    while let Some(products) = pages.try_next().await? {
        let categories = resolve_references(
            adapter,
            scope,
            EntityKind::ProductCategory,
            products.iter().filter_map(|p| {
                p.category_id
                    .as_deref()
                    .map(|category_id| (p.company_id.as_str(), category_id))
            }),
        )
        .await?;

        for product in &products {
            let Some(category_id) = &product.category_id else {
                continue;
            };
            if !categories.contains(&(product.company_id.clone(), category_id.clone())) {
                result.error(
                    ValidationIssue::new(
                        ValidationIssueKind::OrphanedProductCategory,
                        format!(
                            "Product {} references category '{}' which does not exist in company {}",
                            product.id, category_id, product.company_id
                        ),
                    )
                    .entity(&product.id),
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
    use std::sync::Arc;

    #[tokio::test]
    async fn test_missing_category_is_error() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_product_category(category("cat-tools", COMPANY));
        store.insert_product(product("p1", COMPANY, Some("cat-tools"), 0));
        store.insert_product(product("p2", COMPANY, Some("cat-gone"), 0));
        store.insert_product(product("p3", COMPANY, None, 0));

        let result = validate_product_categories(&ctx(&store)).await.unwrap();

        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].entity_ids, vec!["p2"]);
    }

    #[tokio::test]
    async fn test_category_from_other_company_is_orphaned() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_product_category(category("cat-tools", "c2"));
        store.insert_product(product("p1", COMPANY, Some("cat-tools"), 0));

        let result = validate_product_categories(&ctx(&store)).await.unwrap();

        assert_eq!(result.errors.len(), 1);
        assert_eq!(
            result.errors[0].kind,
            ValidationIssueKind::OrphanedProductCategory
        );
    }
}
