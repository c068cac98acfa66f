//! Remediation Service
//!
//! Applies the fixed set of safe corrections in [`AutoFix::ALL`]. Every fix
//! is a single adapter write that commits together with its audit entry; a
//! fix whose audit entry cannot be stored is not applied at all. Failures
//! are recorded per item and never stop the remaining items or fixers. Fixes
//! run strictly one after the other so the audit log is causally ordered.
//!
//! A second run with no data change in between finds nothing to fix: every
//! fix removes the condition its scan looks for.

use futures::TryStreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapter::{paged, resolve_references, AdapterError, DataAdapter, FixPatch};
use crate::audit::AuditEntry;
use crate::config::EngineSettings;
use crate::contracts::FixResult;
use crate::metrics::ConsistencyMetrics;
use crate::models::{Account, EntityKind, Product, StockPosition, TenantScope};

/// Remediation failures. `Scan` stops a whole fixer; the others fail one item.
#[derive(Debug, Error)]
pub enum RemediationError {
    #[error("scan failed: {0}")]
    Scan(#[from] AdapterError),

    #[error("{0}")]
    Apply(AdapterError),

    #[error("fallback {kind} '{code}' unavailable: {source}")]
    Fallback {
        kind: EntityKind,
        code: String,
        source: AdapterError,
    },
}

/// Checks with an automated correction, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoFix {
    /// Relink accounts whose type does not resolve to the company's fallback type
    AccountTypes,
    /// Relink products whose category does not resolve to the fallback category
    ProductCategories,
    /// Set recorded stock to the movement balance
    StockConsistency,
}

impl AutoFix {
    pub const ALL: [AutoFix; 3] = [
        AutoFix::AccountTypes,
        AutoFix::ProductCategories,
        AutoFix::StockConsistency,
    ];

    /// Registry key of the check this fix belongs to
    pub fn check_key(&self) -> &'static str {
        match self {
            AutoFix::AccountTypes => "account_types",
            AutoFix::ProductCategories => "product_categories",
            AutoFix::StockConsistency => "stock_consistency",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemediationEngine {
    adapter: Arc<dyn DataAdapter>,
    settings: EngineSettings,
    metrics: Option<Arc<ConsistencyMetrics>>,
}

impl RemediationEngine {
    pub fn new(adapter: Arc<dyn DataAdapter>, settings: EngineSettings) -> Self {
        Self {
            adapter,
            settings,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ConsistencyMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run every auto-fix for `scope`, one `FixResult` per fix, in
    /// [`AutoFix::ALL`] order.
    pub async fn fix_common(&self, scope: &TenantScope) -> Vec<FixResult> {
        let mut results = Vec::with_capacity(AutoFix::ALL.len());

        for fix in AutoFix::ALL {
            let mut result = FixResult::new(fix.check_key());
            let scanned = match fix {
                AutoFix::AccountTypes => self.fix_account_types(scope, &mut result).await,
                AutoFix::ProductCategories => self.fix_product_categories(scope, &mut result).await,
                AutoFix::StockConsistency => self.fix_stock_levels(scope, &mut result).await,
            };

            if let Err(err) = scanned {
                warn!(
                    tenant_id = %scope.tenant_id,
                    check = fix.check_key(),
                    error = %err,
                    "Remediation scan failed"
                );
                result.record_failed(scope.to_string(), "scan", err.to_string());
            }

            info!(
                tenant_id = %scope.tenant_id,
                company_id = ?scope.company_id,
                check = fix.check_key(),
                scanned = result.scanned,
                fixed = result.fixed,
                failed = result.failed,
                "Remediation completed"
            );
            if let Some(metrics) = &self.metrics {
                metrics.observe_fixes(&result);
            }
            results.push(result);
        }

        results
    }

    async fn fix_account_types(
        &self,
        scope: &TenantScope,
        result: &mut FixResult,
    ) -> Result<(), RemediationError> {
        let check = AutoFix::AccountTypes.check_key();
        let orphans = self.orphaned_accounts(scope).await?;
        result.scanned = orphans.len();

        let mut fallbacks = HashMap::new();
        for account in orphans {
            let create = FixPatch::CreateAccountType {
                code: self.settings.fallback_account_type_code.clone(),
                name: "Uncategorized".to_string(),
            };
            let fallback = match self
                .fallback_id(scope, &account.company_id, check, create, &mut fallbacks)
                .await
            {
                Ok(id) => id,
                Err(err) => {
                    result.record_failed(&account.id, "relink_account_type", err.to_string());
                    continue;
                }
            };

            let patch = FixPatch::RelinkAccountType {
                from: account.type_id.clone(),
                to: fallback,
            };
            let applied = self
                .apply_audited(scope, &account.company_id, check, &account.id, &patch)
                .await;
            settle(result, &account.id, &patch, applied);
        }

        Ok(())
    }

    async fn fix_product_categories(
        &self,
        scope: &TenantScope,
        result: &mut FixResult,
    ) -> Result<(), RemediationError> {
        let check = AutoFix::ProductCategories.check_key();
        let orphans = self.orphaned_products(scope).await?;
        result.scanned = orphans.len();

        let mut fallbacks = HashMap::new();
        for product in orphans {
            let create = FixPatch::CreateProductCategory {
                code: self.settings.fallback_category_code.clone(),
                name: "Uncategorized".to_string(),
            };
            let fallback = match self
                .fallback_id(scope, &product.company_id, check, create, &mut fallbacks)
                .await
            {
                Ok(id) => id,
                Err(err) => {
                    result.record_failed(&product.id, "relink_product_category", err.to_string());
                    continue;
                }
            };

            let patch = FixPatch::RelinkProductCategory {
                from: product.category_id.clone(),
                to: fallback,
            };
            let applied = self
                .apply_audited(scope, &product.company_id, check, &product.id, &patch)
                .await;
            settle(result, &product.id, &patch, applied);
        }

        Ok(())
    }

    async fn fix_stock_levels(
        &self,
        scope: &TenantScope,
        result: &mut FixResult,
    ) -> Result<(), RemediationError> {
        let check = AutoFix::StockConsistency.check_key();
        let mismatched = self.mismatched_stock(scope).await?;
        result.scanned = mismatched.len();

        for position in mismatched {
            let patch = FixPatch::SetRecordedStock {
                from: position.recorded_stock,
                to: position.movement_balance,
            };
            let applied = self
                .apply_audited(scope, &position.company_id, check, &position.product_id, &patch)
                .await;
            settle(result, &position.product_id, &patch, applied);
        }

        Ok(())
    }

    async fn orphaned_accounts(&self, scope: &TenantScope) -> Result<Vec<Account>, RemediationError> {
        let adapter = self.adapter.as_ref();
        let mut orphans = Vec::new();
        let mut pages = paged(self.settings.page_size, move |page| {
            adapter.list_accounts(scope, page)
        });

        while let Some(accounts) = pages.try_next().await? {
            let types = resolve_references(
                adapter,
                scope,
                EntityKind::AccountType,
                accounts
                    .iter()
                    .map(|a| (a.company_id.as_str(), a.type_id.as_str())),
            )
            .await?;
            orphans.extend(accounts.into_iter().filter(|a| {
                !types.contains(&(a.company_id.clone(), a.type_id.clone()))
            }));
        }

        Ok(orphans)
    }

    async fn orphaned_products(&self, scope: &TenantScope) -> Result<Vec<Product>, RemediationError> {
        let adapter = self.adapter.as_ref();
        let mut orphans = Vec::new();
        let mut pages = paged(self.settings.page_size, move |page| {
            adapter.list_products(scope, page)
        });

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
            orphans.extend(products.into_iter().filter(|p| {
                p.category_id.as_ref().is_some_and(|category_id| {
                    !categories.contains(&(p.company_id.clone(), category_id.clone()))
                })
            }));
        }

        Ok(orphans)
    }

    async fn mismatched_stock(
        &self,
        scope: &TenantScope,
    ) -> Result<Vec<StockPosition>, RemediationError> {
        let adapter = self.adapter.as_ref();
        let mut mismatched = Vec::new();
        let mut pages = paged(self.settings.page_size, move |page| {
            adapter.list_stock_positions(scope, page)
        });

        while let Some(positions) = pages.try_next().await? {
            mismatched.extend(
                positions
                    .into_iter()
                    .filter(|p| p.recorded_stock != p.movement_balance),
            );
        }

        Ok(mismatched)
    }

    /// Id of the company's fallback row for `create`'s kind, creating it
    /// (audited) when the company has none.
    async fn fallback_id(
        &self,
        scope: &TenantScope,
        company_id: &str,
        check: &str,
        create: FixPatch,
        cache: &mut HashMap<String, String>,
    ) -> Result<String, RemediationError> {
        if let Some(id) = cache.get(company_id) {
            return Ok(id.clone());
        }

        let kind = create.entity_kind();
        let code = match &create {
            FixPatch::CreateAccountType { code, .. } | FixPatch::CreateProductCategory { code, .. } => {
                code.clone()
            }
            _ => {
                return Err(RemediationError::Apply(AdapterError::Unsupported(format!(
                    "{} is not a create patch",
                    create.action()
                ))))
            }
        };

        let company_scope = scope.for_company(company_id);
        let unavailable = |source| RemediationError::Fallback {
            kind,
            code: code.clone(),
            source,
        };
        let existing = self
            .adapter
            .find_id_by_code(&company_scope, kind, &code)
            .await
            .map_err(unavailable)?;

        let id = match existing {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                self.apply_audited(scope, company_id, check, &id, &create)
                    .await
                    .map_err(|err| match err {
                        RemediationError::Apply(source) => unavailable(source),
                        other => other,
                    })?;
                info!(
                    tenant_id = %scope.tenant_id,
                    company_id = %company_id,
                    kind = %kind,
                    id = %id,
                    code = %code,
                    "Created fallback row"
                );
                id
            }
        };

        cache.insert(company_id.to_string(), id.clone());
        Ok(id)
    }

    /// Apply one fix in the entity's company, committed with its audit entry.
    async fn apply_audited(
        &self,
        scope: &TenantScope,
        company_id: &str,
        check: &str,
        entity_id: &str,
        patch: &FixPatch,
    ) -> Result<(), RemediationError> {
        let company_scope = scope.for_company(company_id);
        let entry = AuditEntry::for_fix(
            &company_scope.tenant_id,
            company_id,
            check,
            entity_id,
            patch,
        );

        self.adapter
            .apply_fix(&company_scope, patch.entity_kind(), entity_id, patch, &entry)
            .await
            .map_err(RemediationError::Apply)?;

        info!(
            audit_id = %entry.id,
            tenant_id = %entry.tenant_id,
            company_id = %entry.company_id,
            check = %entry.check_name,
            entity_id = %entry.entity_id,
            action = %entry.action,
            "Fix applied"
        );
        Ok(())
    }
}

fn settle(
    result: &mut FixResult,
    entity_id: &str,
    patch: &FixPatch,
    applied: Result<(), RemediationError>,
) {
    match applied {
        Ok(()) => result.record_fixed(entity_id, patch.action()),
        Err(err) => {
            warn!(
                check = %result.check_name,
                entity_id = %entity_id,
                action = patch.action(),
                error = %err,
                "Fix failed"
            );
            result.record_failed(entity_id, patch.action(), err.to_string());
        }
    }
}
