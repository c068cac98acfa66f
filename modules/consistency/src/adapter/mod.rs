//! # Data Access Adapter
//!
//! Tenant/company-scoped access to the accounting store. The engine depends
//! only on [`DataAdapter`], which allows a config-driven swap between the
//! Postgres store (production) and the in-memory store (tests).
//!
//! ## Implementations
//!
//! - **PgDataAdapter**: sqlx/Postgres implementation
//! - **InMemoryStore**: test/dev implementation with failure injection
//!
//! Reads are keyset-paged by id. [`paged`] turns any paged read into a lazy,
//! finite, restartable stream of pages so no check materialises a whole table.

mod memory;
mod postgres;

pub use memory::{InMemoryStore, ReadOp};
pub use postgres::PgDataAdapter;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

use crate::audit::AuditEntry;
use crate::models::{
    Account, AccountType, EntityKind, EntryTotals, Expense, JournalLine, Product,
    ProductCategory, StockPosition, TenantScope,
};

/// Errors raised by the adapter. These are infrastructure failures, never
/// data anomalies.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store timed out: {0}")]
    Timeout(String),

    #[error("{kind} not found in scope: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("concurrent modification of {kind} {id}: expected {expected}")]
    Conflict {
        kind: EntityKind,
        id: String,
        expected: String,
    },

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("audit write failed: {0}")]
    Audit(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for adapter operations
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Keyset page request: rows with `id > after`, ordered by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub after: Option<String>,
    pub limit: usize,
}

impl PageRequest {
    pub fn first(limit: usize) -> Self {
        Self { after: None, limit }
    }
}

/// Rows that can be keyset-paged.
pub trait PageKey {
    fn page_key(&self) -> &str;
}

macro_rules! page_key {
    ($($ty:ty => $field:ident),* $(,)?) => {
        $(impl PageKey for $ty {
            fn page_key(&self) -> &str {
                &self.$field
            }
        })*
    };
}

page_key!(
    AccountType => id,
    Account => id,
    ProductCategory => id,
    Product => id,
    JournalLine => id,
    Expense => id,
    EntryTotals => entry_id,
    StockPosition => product_id,
);

/// A narrow, transactional fix write. Variants carrying `from` are
/// optimistic: the write fails with [`AdapterError::Conflict`] if the stored
/// value no longer matches.
#[derive(Debug, Clone, PartialEq)]
pub enum FixPatch {
    CreateAccountType { code: String, name: String },
    CreateProductCategory { code: String, name: String },
    RelinkAccountType { from: String, to: String },
    RelinkProductCategory { from: Option<String>, to: String },
    SetRecordedStock { from: Decimal, to: Decimal },
}

impl FixPatch {
    /// The entity kind this patch applies to.
    pub fn entity_kind(&self) -> EntityKind {
        match self {
            FixPatch::CreateAccountType { .. } => EntityKind::AccountType,
            FixPatch::CreateProductCategory { .. } => EntityKind::ProductCategory,
            FixPatch::RelinkAccountType { .. } => EntityKind::Account,
            FixPatch::RelinkProductCategory { .. } | FixPatch::SetRecordedStock { .. } => {
                EntityKind::Product
            }
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            FixPatch::CreateAccountType { .. } => "create_fallback_account_type",
            FixPatch::CreateProductCategory { .. } => "create_fallback_product_category",
            FixPatch::RelinkAccountType { .. } => "relink_account_type",
            FixPatch::RelinkProductCategory { .. } => "relink_product_category",
            FixPatch::SetRecordedStock { .. } => "recompute_stock_level",
        }
    }

    /// Old and new value as JSON, for the audit trail.
    pub fn audit_values(&self) -> (serde_json::Value, serde_json::Value) {
        use serde_json::{json, Value};
        match self {
            FixPatch::CreateAccountType { code, name }
            | FixPatch::CreateProductCategory { code, name } => {
                (Value::Null, json!({ "code": code, "name": name }))
            }
            FixPatch::RelinkAccountType { from, to } => {
                (json!({ "type_id": from }), json!({ "type_id": to }))
            }
            FixPatch::RelinkProductCategory { from, to } => {
                (json!({ "category_id": from }), json!({ "category_id": to }))
            }
            FixPatch::SetRecordedStock { from, to } => (
                json!({ "current_stock": from.to_string() }),
                json!({ "current_stock": to.to_string() }),
            ),
        }
    }
}

/// Scoped read/write interface over the accounting store.
///
/// Every method takes the tenant scope explicitly; implementations must never
/// return or touch rows outside it.
#[async_trait]
pub trait DataAdapter: Send + Sync {
    async fn list_account_types(
        &self,
        scope: &TenantScope,
        page: PageRequest,
    ) -> AdapterResult<Vec<AccountType>>;

    async fn list_accounts(
        &self,
        scope: &TenantScope,
        page: PageRequest,
    ) -> AdapterResult<Vec<Account>>;

    async fn list_product_categories(
        &self,
        scope: &TenantScope,
        page: PageRequest,
    ) -> AdapterResult<Vec<ProductCategory>>;

    async fn list_products(
        &self,
        scope: &TenantScope,
        page: PageRequest,
    ) -> AdapterResult<Vec<Product>>;

    async fn list_journal_lines(
        &self,
        scope: &TenantScope,
        page: PageRequest,
    ) -> AdapterResult<Vec<JournalLine>>;

    async fn list_expenses(
        &self,
        scope: &TenantScope,
        page: PageRequest,
    ) -> AdapterResult<Vec<Expense>>;

    /// Grouped line sums per journal entry, entries without lines included.
    async fn list_entry_totals(
        &self,
        scope: &TenantScope,
        page: PageRequest,
    ) -> AdapterResult<Vec<EntryTotals>>;

    /// Grouped line sums for a batch of entry ids; missing ids are omitted.
    async fn entry_totals_for(
        &self,
        scope: &TenantScope,
        entry_ids: &[String],
    ) -> AdapterResult<Vec<EntryTotals>>;

    /// Recorded stock against movement balance, per product.
    async fn list_stock_positions(
        &self,
        scope: &TenantScope,
        page: PageRequest,
    ) -> AdapterResult<Vec<StockPosition>>;

    /// Number of lines in posted entries, per account id. Accounts without
    /// postings may be omitted.
    async fn posted_line_counts(
        &self,
        scope: &TenantScope,
        account_ids: &[String],
    ) -> AdapterResult<HashMap<String, i64>>;

    /// The subset of `ids` that exist as `kind` inside `scope`.
    async fn existing_ids(
        &self,
        scope: &TenantScope,
        kind: EntityKind,
        ids: &[String],
    ) -> AdapterResult<HashSet<String>>;

    /// Id of the row of `kind` with this code, for kinds that have a code.
    async fn find_id_by_code(
        &self,
        scope: &TenantScope,
        kind: EntityKind,
        code: &str,
    ) -> AdapterResult<Option<String>>;

    /// Apply a single fix and record `audit` in the same commit. Either both
    /// are stored or neither is; a failed audit write fails the fix with
    /// [`AdapterError::Audit`] and leaves the entity unchanged.
    async fn apply_fix(
        &self,
        scope: &TenantScope,
        kind: EntityKind,
        entity_id: &str,
        patch: &FixPatch,
        audit: &AuditEntry,
    ) -> AdapterResult<()>;
}

/// Reject a fix whose patch or audit entry describes a different entity.
fn ensure_fix_matches(
    kind: EntityKind,
    entity_id: &str,
    patch: &FixPatch,
    audit: &AuditEntry,
) -> AdapterResult<()> {
    if patch.entity_kind() != kind {
        return Err(AdapterError::Unsupported(format!(
            "{} patch cannot be applied to {}",
            patch.action(),
            kind
        )));
    }
    if audit.entity_kind != kind || audit.entity_id != entity_id {
        return Err(AdapterError::Unsupported(format!(
            "audit entry for {} {} does not describe {} {}",
            audit.entity_kind, audit.entity_id, kind, entity_id
        )));
    }
    Ok(())
}

impl fmt::Debug for dyn DataAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataAdapter")
    }
}

enum Cursor {
    Start,
    After(String),
    Done,
}

/// Stream a keyset-paged read page by page.
///
/// The stream is lazy (one page in flight), finite (ends on a short or empty
/// page) and restartable (calling `paged` again starts from the first page).
///
/// # Example
/// ```ignore
/// let mut pages = paged(500, |page| adapter.list_accounts(&scope, page));
/// while let Some(accounts) = pages.try_next().await? {
///     // ...
/// }
/// ```
pub fn paged<'a, T, F, Fut>(page_size: usize, fetch: F) -> BoxStream<'a, AdapterResult<Vec<T>>>
where
    T: PageKey + Send + 'a,
    F: Fn(PageRequest) -> Fut + Send + Sync + 'a,
    Fut: Future<Output = AdapterResult<Vec<T>>> + Send + 'a,
{
    let page_size = page_size.max(1);
    let fetch = Arc::new(fetch);

    stream::try_unfold(Cursor::Start, move |cursor| {
        let fetch = Arc::clone(&fetch);
        async move {
            let after = match cursor {
                Cursor::Done => return Ok(None),
                Cursor::Start => None,
                Cursor::After(key) => Some(key),
            };

            let page = fetch(PageRequest {
                after,
                limit: page_size,
            })
            .await?;

            let next = match page.last() {
                None => return Ok(None),
                Some(_) if page.len() < page_size => Cursor::Done,
                Some(last) => Cursor::After(last.page_key().to_string()),
            };

            Ok(Some((page, next)))
        }
    })
    .boxed()
}

/// Group referenced ids by the company of the referencing row.
///
/// Reference lookups must resolve inside the referencing row's own company,
/// so checks batch their `existing_ids` calls per company.
pub fn group_by_company<'r, I>(refs: I) -> HashMap<String, Vec<String>>
where
    I: IntoIterator<Item = (&'r str, &'r str)>,
{
    let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
    for (company_id, id) in refs {
        let ids = grouped.entry(company_id.to_string()).or_default();
        if !ids.iter().any(|existing| existing == id) {
            ids.push(id.to_string());
        }
    }
    grouped
}

/// Resolve referenced ids per company and return the (company, id) pairs
/// that exist.
pub async fn resolve_references<'r, I>(
    adapter: &dyn DataAdapter,
    scope: &TenantScope,
    kind: EntityKind,
    refs: I,
) -> AdapterResult<HashSet<(String, String)>>
where
    I: IntoIterator<Item = (&'r str, &'r str)>,
{
    let mut resolved = HashSet::new();
    for (company_id, ids) in group_by_company(refs) {
        let company_scope = scope.for_company(&company_id);
        let found = adapter.existing_ids(&company_scope, kind, &ids).await?;
        resolved.extend(found.into_iter().map(|id| (company_id.clone(), id)));
    }
    Ok(resolved)
}
