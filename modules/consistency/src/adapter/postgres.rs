//! Postgres implementation of the DataAdapter trait
//!
//! All reads filter on `tenant_id` and, when the scope names one, on
//! `company_id`. Pages are keyset-paged on `id`. Aggregates (entry totals,
//! stock positions, posting counts) are computed with grouped sums in SQL so
//! no check ever loads a ledger into memory.
//!
//! A fix and its `consistency_fix_audit` row share one transaction.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::{HashMap, HashSet};

use super::{ensure_fix_matches, AdapterError, AdapterResult, DataAdapter, FixPatch, PageRequest};
use crate::audit::{insert_audit_entry, AuditEntry};
use crate::models::{
    Account, AccountType, EntityKind, EntryTotals, Expense, JournalLine, Product,
    ProductCategory, StockPosition, TenantScope,
};

/// DataAdapter backed by the accounting database
#[derive(Debug, Clone)]
pub struct PgDataAdapter {
    pool: PgPool,
}

impl PgDataAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn table_for(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::AccountType => "account_types",
        EntityKind::Account => "accounts",
        EntityKind::ProductCategory => "product_categories",
        EntityKind::Product => "products",
        EntityKind::JournalEntry => "journal_entries",
        EntityKind::JournalLine => "journal_lines",
        EntityKind::InventoryMovement => "inventory_movements",
        EntityKind::Expense => "expenses",
    }
}

/// Keyset page over one table: `$1` tenant, `$2` company (nullable),
/// `$3` cursor (nullable), `$4` limit.
fn page_sql(table: &str, columns: &str) -> String {
    format!(
        r#"
        SELECT {columns}
        FROM {table}
        WHERE tenant_id = $1
          AND ($2::TEXT IS NULL OR company_id = $2)
          AND ($3::TEXT IS NULL OR id > $3)
        ORDER BY id
        LIMIT $4
        "#
    )
}

fn limit(page: &PageRequest) -> i64 {
    i64::try_from(page.limit).unwrap_or(i64::MAX)
}

/// Lock a row for the duration of the fix transaction and return its company.
async fn lock_company(
    tx: &mut Transaction<'_, Postgres>,
    scope: &TenantScope,
    kind: EntityKind,
    entity_id: &str,
) -> AdapterResult<String> {
    let sql = format!(
        r#"
        SELECT company_id
        FROM {}
        WHERE tenant_id = $1
          AND ($2::TEXT IS NULL OR company_id = $2)
          AND id = $3
        FOR UPDATE
        "#,
        table_for(kind)
    );

    sqlx::query_scalar::<_, String>(&sql)
        .bind(&scope.tenant_id)
        .bind(&scope.company_id)
        .bind(entity_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AdapterError::NotFound {
            kind,
            id: entity_id.to_string(),
        })
}

async fn require_in_company(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: &str,
    company_id: &str,
    kind: EntityKind,
    id: &str,
) -> AdapterResult<()> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE tenant_id = $1 AND company_id = $2 AND id = $3",
        table_for(kind)
    );

    let count = sqlx::query_scalar::<_, i64>(&sql)
        .bind(tenant_id)
        .bind(company_id)
        .bind(id)
        .fetch_one(&mut **tx)
        .await?;

    if count == 0 {
        return Err(AdapterError::NotFound {
            kind,
            id: id.to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl DataAdapter for PgDataAdapter {
    async fn list_account_types(
        &self,
        scope: &TenantScope,
        page: PageRequest,
    ) -> AdapterResult<Vec<AccountType>> {
        let sql = page_sql("account_types", "id, tenant_id, company_id, code, name");
        let rows = sqlx::query_as::<_, AccountType>(&sql)
            .bind(&scope.tenant_id)
            .bind(&scope.company_id)
            .bind(&page.after)
            .bind(limit(&page))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn list_accounts(
        &self,
        scope: &TenantScope,
        page: PageRequest,
    ) -> AdapterResult<Vec<Account>> {
        let sql = page_sql(
            "accounts",
            "id, tenant_id, company_id, code, type_id, parent_id, is_active",
        );
        let rows = sqlx::query_as::<_, Account>(&sql)
            .bind(&scope.tenant_id)
            .bind(&scope.company_id)
            .bind(&page.after)
            .bind(limit(&page))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn list_product_categories(
        &self,
        scope: &TenantScope,
        page: PageRequest,
    ) -> AdapterResult<Vec<ProductCategory>> {
        let sql = page_sql("product_categories", "id, tenant_id, company_id, code, name");
        let rows = sqlx::query_as::<_, ProductCategory>(&sql)
            .bind(&scope.tenant_id)
            .bind(&scope.company_id)
            .bind(&page.after)
            .bind(limit(&page))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn list_products(
        &self,
        scope: &TenantScope,
        page: PageRequest,
    ) -> AdapterResult<Vec<Product>> {
        let sql = page_sql(
            "products",
            "id, tenant_id, company_id, category_id, current_stock",
        );
        let rows = sqlx::query_as::<_, Product>(&sql)
            .bind(&scope.tenant_id)
            .bind(&scope.company_id)
            .bind(&page.after)
            .bind(limit(&page))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn list_journal_lines(
        &self,
        scope: &TenantScope,
        page: PageRequest,
    ) -> AdapterResult<Vec<JournalLine>> {
        let sql = page_sql(
            "journal_lines",
            "id, tenant_id, company_id, entry_id, account_id, debit, credit",
        );
        let rows = sqlx::query_as::<_, JournalLine>(&sql)
            .bind(&scope.tenant_id)
            .bind(&scope.company_id)
            .bind(&page.after)
            .bind(limit(&page))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn list_expenses(
        &self,
        scope: &TenantScope,
        page: PageRequest,
    ) -> AdapterResult<Vec<Expense>> {
        let sql = page_sql(
            "expenses",
            "id, tenant_id, company_id, status, amount, linked_journal_entry_id",
        );
        let rows = sqlx::query_as::<_, Expense>(&sql)
            .bind(&scope.tenant_id)
            .bind(&scope.company_id)
            .bind(&page.after)
            .bind(limit(&page))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn list_entry_totals(
        &self,
        scope: &TenantScope,
        page: PageRequest,
    ) -> AdapterResult<Vec<EntryTotals>> {
        let rows = sqlx::query_as::<_, EntryTotals>(
            r#"
            SELECT
                je.id AS entry_id,
                je.company_id,
                je.status,
                COUNT(jl.id)::BIGINT AS line_count,
                COALESCE(SUM(jl.debit), 0) AS total_debit,
                COALESCE(SUM(jl.credit), 0) AS total_credit
            FROM journal_entries je
            LEFT JOIN journal_lines jl
                ON jl.tenant_id = je.tenant_id
                AND jl.entry_id = je.id
            WHERE je.tenant_id = $1
              AND ($2::TEXT IS NULL OR je.company_id = $2)
              AND ($3::TEXT IS NULL OR je.id > $3)
            GROUP BY je.id, je.company_id, je.status
            ORDER BY je.id
            LIMIT $4
            "#,
        )
        .bind(&scope.tenant_id)
        .bind(&scope.company_id)
        .bind(&page.after)
        .bind(limit(&page))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn entry_totals_for(
        &self,
        scope: &TenantScope,
        entry_ids: &[String],
    ) -> AdapterResult<Vec<EntryTotals>> {
        if entry_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, EntryTotals>(
            r#"
            SELECT
                je.id AS entry_id,
                je.company_id,
                je.status,
                COUNT(jl.id)::BIGINT AS line_count,
                COALESCE(SUM(jl.debit), 0) AS total_debit,
                COALESCE(SUM(jl.credit), 0) AS total_credit
            FROM journal_entries je
            LEFT JOIN journal_lines jl
                ON jl.tenant_id = je.tenant_id
                AND jl.entry_id = je.id
            WHERE je.tenant_id = $1
              AND ($2::TEXT IS NULL OR je.company_id = $2)
              AND je.id = ANY($3)
            GROUP BY je.id, je.company_id, je.status
            ORDER BY je.id
            "#,
        )
        .bind(&scope.tenant_id)
        .bind(&scope.company_id)
        .bind(entry_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn list_stock_positions(
        &self,
        scope: &TenantScope,
        page: PageRequest,
    ) -> AdapterResult<Vec<StockPosition>> {
        let rows = sqlx::query_as::<_, StockPosition>(
            r#"
            SELECT
                p.id AS product_id,
                p.company_id,
                p.current_stock AS recorded_stock,
                COALESCE(SUM(
                    CASE m.movement_type
                        WHEN 'issue' THEN -m.quantity
                        ELSE m.quantity
                    END
                ), 0) AS movement_balance,
                COUNT(m.id)::BIGINT AS movement_count
            FROM products p
            LEFT JOIN inventory_movements m
                ON m.tenant_id = p.tenant_id
                AND m.company_id = p.company_id
                AND m.product_id = p.id
            WHERE p.tenant_id = $1
              AND ($2::TEXT IS NULL OR p.company_id = $2)
              AND ($3::TEXT IS NULL OR p.id > $3)
            GROUP BY p.id, p.company_id, p.current_stock
            ORDER BY p.id
            LIMIT $4
            "#,
        )
        .bind(&scope.tenant_id)
        .bind(&scope.company_id)
        .bind(&page.after)
        .bind(limit(&page))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn posted_line_counts(
        &self,
        scope: &TenantScope,
        account_ids: &[String],
    ) -> AdapterResult<HashMap<String, i64>> {
        if account_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT jl.account_id, COUNT(*)::BIGINT
            FROM journal_lines jl
            INNER JOIN journal_entries je
                ON je.tenant_id = jl.tenant_id
                AND je.id = jl.entry_id
            WHERE jl.tenant_id = $1
              AND ($2::TEXT IS NULL OR jl.company_id = $2)
              AND je.status = 'posted'
              AND jl.account_id = ANY($3)
            GROUP BY jl.account_id
            "#,
        )
        .bind(&scope.tenant_id)
        .bind(&scope.company_id)
        .bind(account_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn existing_ids(
        &self,
        scope: &TenantScope,
        kind: EntityKind,
        ids: &[String],
    ) -> AdapterResult<HashSet<String>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let sql = format!(
            r#"
            SELECT id
            FROM {}
            WHERE tenant_id = $1
              AND ($2::TEXT IS NULL OR company_id = $2)
              AND id = ANY($3)
            "#,
            table_for(kind)
        );

        let found = sqlx::query_scalar::<_, String>(&sql)
            .bind(&scope.tenant_id)
            .bind(&scope.company_id)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(found.into_iter().collect())
    }

    async fn find_id_by_code(
        &self,
        scope: &TenantScope,
        kind: EntityKind,
        code: &str,
    ) -> AdapterResult<Option<String>> {
        if !matches!(kind, EntityKind::AccountType | EntityKind::ProductCategory) {
            return Err(AdapterError::Unsupported(format!(
                "{} has no code column",
                kind
            )));
        }

        let sql = format!(
            r#"
            SELECT id
            FROM {}
            WHERE tenant_id = $1
              AND ($2::TEXT IS NULL OR company_id = $2)
              AND code = $3
            ORDER BY id
            LIMIT 1
            "#,
            table_for(kind)
        );

        let id = sqlx::query_scalar::<_, String>(&sql)
            .bind(&scope.tenant_id)
            .bind(&scope.company_id)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;

        Ok(id)
    }

    async fn apply_fix(
        &self,
        scope: &TenantScope,
        kind: EntityKind,
        entity_id: &str,
        patch: &FixPatch,
        audit: &AuditEntry,
    ) -> AdapterResult<()> {
        ensure_fix_matches(kind, entity_id, patch, audit)?;

        // One transaction per fix: a later failure never undoes this one
        let mut tx = self.pool.begin().await?;

        match patch {
            FixPatch::CreateAccountType { code, name }
            | FixPatch::CreateProductCategory { code, name } => {
                let company_id = scope.company_id.as_deref().ok_or_else(|| {
                    AdapterError::Unsupported("creating a row requires a company scope".into())
                })?;
                let sql = format!(
                    r#"
                    INSERT INTO {} (id, tenant_id, company_id, code, name)
                    VALUES ($1, $2, $3, $4, $5)
                    ON CONFLICT (id) DO NOTHING
                    "#,
                    table_for(kind)
                );
                let inserted = sqlx::query(&sql)
                    .bind(entity_id)
                    .bind(&scope.tenant_id)
                    .bind(company_id)
                    .bind(code)
                    .bind(name)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
                if inserted == 0 {
                    return Err(AdapterError::Conflict {
                        kind,
                        id: entity_id.to_string(),
                        expected: "no existing row".to_string(),
                    });
                }
            }
            FixPatch::RelinkAccountType { from, to } => {
                let company_id = lock_company(&mut tx, scope, kind, entity_id).await?;
                require_in_company(
                    &mut tx,
                    &scope.tenant_id,
                    &company_id,
                    EntityKind::AccountType,
                    to,
                )
                .await?;

                let updated = sqlx::query(
                    r#"
                    UPDATE accounts
                    SET type_id = $1
                    WHERE tenant_id = $2 AND id = $3 AND type_id = $4
                    "#,
                )
                .bind(to)
                .bind(&scope.tenant_id)
                .bind(entity_id)
                .bind(from)
                .execute(&mut *tx)
                .await?
                .rows_affected();

                if updated == 0 {
                    return Err(AdapterError::Conflict {
                        kind,
                        id: entity_id.to_string(),
                        expected: format!("type_id={}", from),
                    });
                }
            }
            FixPatch::RelinkProductCategory { from, to } => {
                let company_id = lock_company(&mut tx, scope, kind, entity_id).await?;
                require_in_company(
                    &mut tx,
                    &scope.tenant_id,
                    &company_id,
                    EntityKind::ProductCategory,
                    to,
                )
                .await?;

                let updated = sqlx::query(
                    r#"
                    UPDATE products
                    SET category_id = $1
                    WHERE tenant_id = $2 AND id = $3 AND category_id IS NOT DISTINCT FROM $4
                    "#,
                )
                .bind(to)
                .bind(&scope.tenant_id)
                .bind(entity_id)
                .bind(from)
                .execute(&mut *tx)
                .await?
                .rows_affected();

                if updated == 0 {
                    return Err(AdapterError::Conflict {
                        kind,
                        id: entity_id.to_string(),
                        expected: format!("category_id={:?}", from),
                    });
                }
            }
            FixPatch::SetRecordedStock { from, to } => {
                lock_company(&mut tx, scope, kind, entity_id).await?;

                let updated = sqlx::query(
                    r#"
                    UPDATE products
                    SET current_stock = $1
                    WHERE tenant_id = $2 AND id = $3 AND current_stock = $4
                    "#,
                )
                .bind(*to)
                .bind(&scope.tenant_id)
                .bind(entity_id)
                .bind(*from)
                .execute(&mut *tx)
                .await?
                .rows_affected();

                if updated == 0 {
                    return Err(AdapterError::Conflict {
                        kind,
                        id: entity_id.to_string(),
                        expected: format!("current_stock={}", from),
                    });
                }
            }
        }

        insert_audit_entry(&mut tx, audit)
            .await
            .map_err(|e| AdapterError::Audit(e.to_string()))?;

        tx.commit().await?;
        Ok(())
    }
}
