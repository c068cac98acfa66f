//! Consistency Service
//!
//! Entry points consumed by the outer API layer and the CLI. Every call takes
//! its tenant/company scope explicitly; the service holds no per-tenant state.

use std::sync::Arc;

use crate::adapter::DataAdapter;
use crate::config::EngineSettings;
use crate::contracts::{FixResult, OverallResult, ValidationIssue, ValidationIssueKind, ValidationResult};
use crate::metrics::ConsistencyMetrics;
use crate::models::TenantScope;
use crate::registry::CheckRegistry;
use crate::services::remediation_service::RemediationEngine;
use crate::services::runner::{CheckRunner, RunnerError};

#[derive(Debug, Clone)]
pub struct ConsistencyService {
    runner: CheckRunner,
    remediation: RemediationEngine,
}

impl ConsistencyService {
    /// Service over the standard check registry.
    pub fn new(adapter: Arc<dyn DataAdapter>, settings: EngineSettings) -> Self {
        Self::with_registry(CheckRegistry::standard(), adapter, settings)
    }

    pub fn with_registry(
        registry: CheckRegistry,
        adapter: Arc<dyn DataAdapter>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            runner: CheckRunner::new(Arc::new(registry), Arc::clone(&adapter), settings.clone()),
            remediation: RemediationEngine::new(adapter, settings),
        }
    }

    pub fn with_metrics(self, metrics: Arc<ConsistencyMetrics>) -> Self {
        Self {
            runner: self.runner.with_metrics(Arc::clone(&metrics)),
            remediation: self.remediation.with_metrics(metrics),
        }
    }

    pub async fn run_all_checks(&self, scope: &TenantScope) -> OverallResult {
        self.runner.run_all(scope).await
    }

    /// Run the named checks; unknown names are ignored.
    pub async fn run_checks<S: AsRef<str>>(&self, scope: &TenantScope, names: &[S]) -> OverallResult {
        self.runner.run_named(scope, names).await
    }

    /// Run the named checks, rejecting the request if any name is unknown.
    pub async fn run_checks_strict<S: AsRef<str>>(
        &self,
        scope: &TenantScope,
        names: &[S],
    ) -> Result<OverallResult, RunnerError> {
        self.runner.run_named_strict(scope, names).await
    }

    pub async fn fix_common_issues(&self, scope: &TenantScope) -> Vec<FixResult> {
        self.remediation.fix_common(scope).await
    }

    pub async fn validate_account_types(&self, scope: &TenantScope) -> ValidationResult {
        self.run_single(scope, "account_types").await
    }

    pub async fn validate_product_categories(&self, scope: &TenantScope) -> ValidationResult {
        self.run_single(scope, "product_categories").await
    }

    pub async fn validate_stock_consistency(&self, scope: &TenantScope) -> ValidationResult {
        self.run_single(scope, "stock_consistency").await
    }

    pub async fn validate_journal_entry_balance(&self, scope: &TenantScope) -> ValidationResult {
        self.run_single(scope, "journal_entry_balance").await
    }

    pub async fn validate_expense_journal_integration(&self, scope: &TenantScope) -> ValidationResult {
        self.run_single(scope, "expense_journal_integration").await
    }

    pub async fn validate_orphaned_records(&self, scope: &TenantScope) -> ValidationResult {
        self.run_single(scope, "orphaned_records").await
    }

    /// One check through the runner, so it gets the same fault isolation
    /// and timeout as a full run.
    async fn run_single(&self, scope: &TenantScope, key: &str) -> ValidationResult {
        match self.runner.run_named_strict(scope, &[key]).await {
            Ok(mut overall) if !overall.checks.is_empty() => overall.checks.remove(0).result,
            Ok(_) => ValidationResult::failed(ValidationIssue::new(
                ValidationIssueKind::InternalCheckFailure,
                format!("Check '{}' produced no outcome", key),
            )),
            Err(err) => ValidationResult::failed(ValidationIssue::new(
                ValidationIssueKind::InternalCheckFailure,
                err.to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::InMemoryStore;

    #[tokio::test]
    async fn test_single_check_missing_from_registry_fails_closed() {
        let service = ConsistencyService::with_registry(
            CheckRegistry::new(),
            Arc::new(InMemoryStore::new()),
            EngineSettings::default(),
        );

        let result = service
            .validate_account_types(&TenantScope::company("t1", "c1"))
            .await;

        assert!(!result.is_valid);
        assert_eq!(result.errors[0].kind, ValidationIssueKind::InternalCheckFailure);
    }
}
