//! In-memory implementation of the DataAdapter trait for testing and development

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{ensure_fix_matches, AdapterError, AdapterResult, DataAdapter, FixPatch, PageRequest};
use crate::audit::AuditEntry;
use crate::models::{
    Account, AccountType, EntityKind, EntryStatus, EntryTotals, Expense, InventoryMovement,
    JournalEntry, JournalLine, Product, ProductCategory, StockPosition, TenantScope,
};

/// Rows keyed by (tenant_id, id), so iteration is id-ordered within a tenant.
type Table<T> = BTreeMap<(String, String), T>;

#[derive(Debug, Default)]
struct Dataset {
    account_types: Table<AccountType>,
    accounts: Table<Account>,
    product_categories: Table<ProductCategory>,
    products: Table<Product>,
    journal_entries: Table<JournalEntry>,
    journal_lines: Table<JournalLine>,
    inventory_movements: Table<InventoryMovement>,
    expenses: Table<Expense>,
    audit: Vec<AuditEntry>,
}

/// Read operations that can be made to fail on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadOp {
    AccountTypes,
    Accounts,
    ProductCategories,
    Products,
    JournalLines,
    Expenses,
    EntryTotals,
    StockPositions,
    PostedLineCounts,
    ExistingIds,
    FindByCode,
}

#[derive(Debug, Default)]
struct Faults {
    reads: HashSet<ReadOp>,
    writes: HashSet<String>,
    audit: HashSet<String>,
}

/// DataAdapter implementation holding every table in memory
///
/// This implementation is suitable for:
/// - Unit and integration tests (no database required)
/// - Local development and demos
///
/// Failure injection: [`InMemoryStore::fail_reads`] makes a read operation
/// return [`AdapterError::Unavailable`], and [`InMemoryStore::fail_writes_for`]
/// makes `apply_fix` fail for one entity id. [`InMemoryStore::fail_audit_for`]
/// rejects the audit entry of one entity's fix, which rolls the fix back.
///
/// Audit entries are kept in the dataset and appended under the same write
/// lock as the change they describe.
///
/// # Example
/// ```rust
/// use consistency_rs::adapter::{DataAdapter, InMemoryStore, PageRequest};
/// use consistency_rs::models::{AccountType, TenantScope};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryStore::new();
/// store.insert_account_type(AccountType {
///     id: "t-asset".into(),
///     tenant_id: "t1".into(),
///     company_id: "c1".into(),
///     code: "ASSET".into(),
///     name: "Asset".into(),
/// });
///
/// let scope = TenantScope::company("t1", "c1");
/// let types = store.list_account_types(&scope, PageRequest::first(100)).await?;
/// assert_eq!(types.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<Dataset>,
    faults: RwLock<Faults>,
}

fn key(tenant_id: &str, id: &str) -> (String, String) {
    (tenant_id.to_string(), id.to_string())
}

/// One keyset page of the rows visible in `scope`.
fn page_of<T: Clone>(
    table: &Table<T>,
    scope: &TenantScope,
    page: &PageRequest,
    company_of: impl Fn(&T) -> &str,
) -> Vec<T> {
    table
        .iter()
        .filter(|&((tenant, id), row)| {
            scope.contains(tenant, company_of(row))
                && page.after.as_deref().is_none_or(|after| id.as_str() > after)
        })
        .take(page.limit)
        .map(|(_, row)| row.clone())
        .collect()
}

fn visible<T>(
    table: &Table<T>,
    scope: &TenantScope,
    id: &str,
    company_of: impl Fn(&T) -> &str,
) -> bool {
    table
        .get(&key(&scope.tenant_id, id))
        .is_some_and(|row| scope.contains(&scope.tenant_id, company_of(row)))
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Dataset> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Dataset> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_read(&self, op: ReadOp) -> AdapterResult<()> {
        let faults = self.faults.read().unwrap_or_else(PoisonError::into_inner);
        if faults.reads.contains(&op) {
            return Err(AdapterError::Unavailable(format!(
                "injected read failure: {:?}",
                op
            )));
        }
        Ok(())
    }

    /// Make every call of `op` fail until cleared.
    pub fn fail_reads(&self, op: ReadOp) {
        self.faults
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .reads
            .insert(op);
    }

    /// Make `apply_fix` fail for this entity id.
    pub fn fail_writes_for(&self, entity_id: &str) {
        self.faults
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .writes
            .insert(entity_id.to_string());
    }

    /// Make the audit write of this entity's fixes fail.
    pub fn fail_audit_for(&self, entity_id: &str) {
        self.faults
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .audit
            .insert(entity_id.to_string());
    }

    pub fn clear_faults(&self) {
        let mut faults = self.faults.write().unwrap_or_else(PoisonError::into_inner);
        faults.reads.clear();
        faults.writes.clear();
        faults.audit.clear();
    }

    /// Recorded fix audit entries, in commit order.
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.read().audit.clone()
    }

    pub fn insert_account_type(&self, row: AccountType) {
        self.write()
            .account_types
            .insert(key(&row.tenant_id, &row.id), row);
    }

    pub fn insert_account(&self, row: Account) {
        self.write().accounts.insert(key(&row.tenant_id, &row.id), row);
    }

    pub fn insert_product_category(&self, row: ProductCategory) {
        self.write()
            .product_categories
            .insert(key(&row.tenant_id, &row.id), row);
    }

    pub fn insert_product(&self, row: Product) {
        self.write().products.insert(key(&row.tenant_id, &row.id), row);
    }

    pub fn insert_journal_entry(&self, row: JournalEntry) {
        self.write()
            .journal_entries
            .insert(key(&row.tenant_id, &row.id), row);
    }

    pub fn insert_journal_line(&self, row: JournalLine) {
        self.write()
            .journal_lines
            .insert(key(&row.tenant_id, &row.id), row);
    }

    pub fn insert_inventory_movement(&self, row: InventoryMovement) {
        self.write()
            .inventory_movements
            .insert(key(&row.tenant_id, &row.id), row);
    }

    pub fn insert_expense(&self, row: Expense) {
        self.write().expenses.insert(key(&row.tenant_id, &row.id), row);
    }

    /// Remove a journal entry row only, leaving its lines behind.
    pub fn delete_journal_entry(&self, tenant_id: &str, id: &str) {
        self.write().journal_entries.remove(&key(tenant_id, id));
    }

    pub fn account(&self, tenant_id: &str, id: &str) -> Option<Account> {
        self.read().accounts.get(&key(tenant_id, id)).cloned()
    }

    pub fn product(&self, tenant_id: &str, id: &str) -> Option<Product> {
        self.read().products.get(&key(tenant_id, id)).cloned()
    }

    pub fn account_types_in(&self, tenant_id: &str, company_id: &str) -> Vec<AccountType> {
        self.read()
            .account_types
            .values()
            .filter(|t| t.tenant_id == tenant_id && t.company_id == company_id)
            .cloned()
            .collect()
    }

    fn totals_for_entry(data: &Dataset, entry: &JournalEntry) -> EntryTotals {
        let mut totals = EntryTotals {
            entry_id: entry.id.clone(),
            company_id: entry.company_id.clone(),
            status: entry.status,
            line_count: 0,
            total_debit: Decimal::ZERO,
            total_credit: Decimal::ZERO,
        };
        for line in data
            .journal_lines
            .values()
            .filter(|l| l.tenant_id == entry.tenant_id && l.entry_id == entry.id)
        {
            totals.line_count += 1;
            totals.total_debit += line.debit;
            totals.total_credit += line.credit;
        }
        totals
    }
}

#[async_trait]
impl DataAdapter for InMemoryStore {
    async fn list_account_types(
        &self,
        scope: &TenantScope,
        page: PageRequest,
    ) -> AdapterResult<Vec<AccountType>> {
        self.check_read(ReadOp::AccountTypes)?;
        Ok(page_of(&self.read().account_types, scope, &page, |r| r.company_id.as_str()))
    }

    async fn list_accounts(
        &self,
        scope: &TenantScope,
        page: PageRequest,
    ) -> AdapterResult<Vec<Account>> {
        self.check_read(ReadOp::Accounts)?;
        Ok(page_of(&self.read().accounts, scope, &page, |r| r.company_id.as_str()))
    }

    async fn list_product_categories(
        &self,
        scope: &TenantScope,
        page: PageRequest,
    ) -> AdapterResult<Vec<ProductCategory>> {
        self.check_read(ReadOp::ProductCategories)?;
        Ok(page_of(&self.read().product_categories, scope, &page, |r| r.company_id.as_str()))
    }

    async fn list_products(
        &self,
        scope: &TenantScope,
        page: PageRequest,
    ) -> AdapterResult<Vec<Product>> {
        self.check_read(ReadOp::Products)?;
        Ok(page_of(&self.read().products, scope, &page, |r| r.company_id.as_str()))
    }

    async fn list_journal_lines(
        &self,
        scope: &TenantScope,
        page: PageRequest,
    ) -> AdapterResult<Vec<JournalLine>> {
        self.check_read(ReadOp::JournalLines)?;
        Ok(page_of(&self.read().journal_lines, scope, &page, |r| r.company_id.as_str()))
    }

    async fn list_expenses(
        &self,
        scope: &TenantScope,
        page: PageRequest,
    ) -> AdapterResult<Vec<Expense>> {
        self.check_read(ReadOp::Expenses)?;
        Ok(page_of(&self.read().expenses, scope, &page, |r| r.company_id.as_str()))
    }

    async fn list_entry_totals(
        &self,
        scope: &TenantScope,
        page: PageRequest,
    ) -> AdapterResult<Vec<EntryTotals>> {
        self.check_read(ReadOp::EntryTotals)?;
        let data = self.read();
        let entries = page_of(&data.journal_entries, scope, &page, |r| r.company_id.as_str());
        Ok(entries
            .iter()
            .map(|entry| Self::totals_for_entry(&data, entry))
            .collect())
    }

    async fn entry_totals_for(
        &self,
        scope: &TenantScope,
        entry_ids: &[String],
    ) -> AdapterResult<Vec<EntryTotals>> {
        self.check_read(ReadOp::EntryTotals)?;
        let data = self.read();
        let mut totals: Vec<EntryTotals> = entry_ids
            .iter()
            .filter_map(|id| data.journal_entries.get(&key(&scope.tenant_id, id)))
            .filter(|entry| scope.contains(&entry.tenant_id, &entry.company_id))
            .map(|entry| Self::totals_for_entry(&data, entry))
            .collect();
        totals.sort_by(|a, b| a.entry_id.cmp(&b.entry_id));
        totals.dedup_by(|a, b| a.entry_id == b.entry_id);
        Ok(totals)
    }

    async fn list_stock_positions(
        &self,
        scope: &TenantScope,
        page: PageRequest,
    ) -> AdapterResult<Vec<StockPosition>> {
        self.check_read(ReadOp::StockPositions)?;
        let data = self.read();
        let products = page_of(&data.products, scope, &page, |r| r.company_id.as_str());
        Ok(products
            .into_iter()
            .map(|product| {
                let mut position = StockPosition {
                    product_id: product.id.clone(),
                    company_id: product.company_id.clone(),
                    recorded_stock: product.current_stock,
                    movement_balance: Decimal::ZERO,
                    movement_count: 0,
                };
                for movement in data.inventory_movements.values().filter(|m| {
                    m.tenant_id == product.tenant_id
                        && m.company_id == product.company_id
                        && m.product_id == product.id
                }) {
                    position.movement_balance += movement.signed_quantity();
                    position.movement_count += 1;
                }
                position
            })
            .collect())
    }

    async fn posted_line_counts(
        &self,
        scope: &TenantScope,
        account_ids: &[String],
    ) -> AdapterResult<HashMap<String, i64>> {
        self.check_read(ReadOp::PostedLineCounts)?;
        let data = self.read();
        let wanted: HashSet<&str> = account_ids.iter().map(String::as_str).collect();
        let mut counts = HashMap::new();
        for line in data.journal_lines.values().filter(|l| {
            scope.contains(&l.tenant_id, &l.company_id) && wanted.contains(l.account_id.as_str())
        }) {
            let posted = data
                .journal_entries
                .get(&key(&line.tenant_id, &line.entry_id))
                .is_some_and(|entry| entry.status == EntryStatus::Posted);
            if posted {
                *counts.entry(line.account_id.clone()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn existing_ids(
        &self,
        scope: &TenantScope,
        kind: EntityKind,
        ids: &[String],
    ) -> AdapterResult<HashSet<String>> {
        self.check_read(ReadOp::ExistingIds)?;
        let data = self.read();
        let exists = |id: &str| match kind {
            EntityKind::AccountType => visible(&data.account_types, scope, id, |r| r.company_id.as_str()),
            EntityKind::Account => visible(&data.accounts, scope, id, |r| r.company_id.as_str()),
            EntityKind::ProductCategory => {
                visible(&data.product_categories, scope, id, |r| r.company_id.as_str())
            }
            EntityKind::Product => visible(&data.products, scope, id, |r| r.company_id.as_str()),
            EntityKind::JournalEntry => {
                visible(&data.journal_entries, scope, id, |r| r.company_id.as_str())
            }
            EntityKind::JournalLine => visible(&data.journal_lines, scope, id, |r| r.company_id.as_str()),
            EntityKind::InventoryMovement => {
                visible(&data.inventory_movements, scope, id, |r| r.company_id.as_str())
            }
            EntityKind::Expense => visible(&data.expenses, scope, id, |r| r.company_id.as_str()),
        };
        Ok(ids.iter().filter(|id| exists(id.as_str())).cloned().collect())
    }

    async fn find_id_by_code(
        &self,
        scope: &TenantScope,
        kind: EntityKind,
        code: &str,
    ) -> AdapterResult<Option<String>> {
        self.check_read(ReadOp::FindByCode)?;
        let data = self.read();
        let found = match kind {
            EntityKind::AccountType => data
                .account_types
                .values()
                .find(|t| scope.contains(&t.tenant_id, &t.company_id) && t.code == code)
                .map(|t| t.id.clone()),
            EntityKind::ProductCategory => data
                .product_categories
                .values()
                .find(|c| scope.contains(&c.tenant_id, &c.company_id) && c.code == code)
                .map(|c| c.id.clone()),
            other => {
                return Err(AdapterError::Unsupported(format!(
                    "{} has no code column",
                    other
                )))
            }
        };
        Ok(found)
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

        let audit_rejected = {
            let faults = self.faults.read().unwrap_or_else(PoisonError::into_inner);
            if faults.writes.contains(entity_id) {
                return Err(AdapterError::Unavailable(format!(
                    "injected write failure for {}",
                    entity_id
                )));
            }
            faults.audit.contains(entity_id)
        };

        let tenant_id = scope.tenant_id.clone();
        let mut data = self.write();

        if audit_rejected {
            return Err(AdapterError::Audit(format!(
                "injected audit failure for {}",
                entity_id
            )));
        }

        match patch {
            FixPatch::CreateAccountType { code, name } => {
                let company_id = scope.company_id.clone().ok_or_else(|| {
                    AdapterError::Unsupported("creating a row requires a company scope".into())
                })?;
                let row_key = key(&tenant_id, entity_id);
                if data.account_types.contains_key(&row_key) {
                    return Err(AdapterError::Conflict {
                        kind,
                        id: entity_id.to_string(),
                        expected: "no existing row".to_string(),
                    });
                }
                data.account_types.insert(
                    row_key,
                    AccountType {
                        id: entity_id.to_string(),
                        tenant_id,
                        company_id,
                        code: code.clone(),
                        name: name.clone(),
                    },
                );
            }
            FixPatch::CreateProductCategory { code, name } => {
                let company_id = scope.company_id.clone().ok_or_else(|| {
                    AdapterError::Unsupported("creating a row requires a company scope".into())
                })?;
                let row_key = key(&tenant_id, entity_id);
                if data.product_categories.contains_key(&row_key) {
                    return Err(AdapterError::Conflict {
                        kind,
                        id: entity_id.to_string(),
                        expected: "no existing row".to_string(),
                    });
                }
                data.product_categories.insert(
                    row_key,
                    ProductCategory {
                        id: entity_id.to_string(),
                        tenant_id,
                        company_id,
                        code: code.clone(),
                        name: name.clone(),
                    },
                );
            }
            FixPatch::RelinkAccountType { from, to } => {
                let company_id = match data.accounts.get(&key(&tenant_id, entity_id)) {
                    Some(account) if scope.contains(&account.tenant_id, &account.company_id) => {
                        account.company_id.clone()
                    }
                    _ => {
                        return Err(AdapterError::NotFound {
                            kind,
                            id: entity_id.to_string(),
                        })
                    }
                };
                let target_scope = scope.for_company(&company_id);
                if !visible(&data.account_types, &target_scope, to, |r| r.company_id.as_str()) {
                    return Err(AdapterError::NotFound {
                        kind: EntityKind::AccountType,
                        id: to.clone(),
                    });
                }
                let account = data
                    .accounts
                    .get_mut(&key(&tenant_id, entity_id))
                    .ok_or_else(|| AdapterError::NotFound {
                        kind,
                        id: entity_id.to_string(),
                    })?;
                if &account.type_id != from {
                    return Err(AdapterError::Conflict {
                        kind,
                        id: entity_id.to_string(),
                        expected: format!("type_id={}", from),
                    });
                }
                account.type_id = to.clone();
            }
            FixPatch::RelinkProductCategory { from, to } => {
                let company_id = match data.products.get(&key(&tenant_id, entity_id)) {
                    Some(product) if scope.contains(&product.tenant_id, &product.company_id) => {
                        product.company_id.clone()
                    }
                    _ => {
                        return Err(AdapterError::NotFound {
                            kind,
                            id: entity_id.to_string(),
                        })
                    }
                };
                let target_scope = scope.for_company(&company_id);
                if !visible(&data.product_categories, &target_scope, to, |r| r.company_id.as_str()) {
                    return Err(AdapterError::NotFound {
                        kind: EntityKind::ProductCategory,
                        id: to.clone(),
                    });
                }
                let product = data
                    .products
                    .get_mut(&key(&tenant_id, entity_id))
                    .ok_or_else(|| AdapterError::NotFound {
                        kind,
                        id: entity_id.to_string(),
                    })?;
                if &product.category_id != from {
                    return Err(AdapterError::Conflict {
                        kind,
                        id: entity_id.to_string(),
                        expected: format!("category_id={:?}", from),
                    });
                }
                product.category_id = Some(to.clone());
            }
            FixPatch::SetRecordedStock { from, to } => {
                let product = data
                    .products
                    .get_mut(&key(&tenant_id, entity_id))
                    .filter(|p| scope.contains(&p.tenant_id, &p.company_id))
                    .ok_or_else(|| AdapterError::NotFound {
                        kind,
                        id: entity_id.to_string(),
                    })?;
                if product.current_stock != *from {
                    return Err(AdapterError::Conflict {
                        kind,
                        id: entity_id.to_string(),
                        expected: format!("current_stock={}", from),
                    });
                }
                product.current_stock = *to;
            }
        }

        data.audit.push(audit.clone());
        Ok(())
    }
}
