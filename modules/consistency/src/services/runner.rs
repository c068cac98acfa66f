//! Check runner
//!
//! Executes registered checks with at most K in flight, isolates every
//! check's failure into a synthetic outcome, and always returns outcomes in
//! registry order: each check writes into its own pre-sized slot instead of
//! being appended on completion.

use futures::future::FutureExt;
use futures::stream::{self, StreamExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::adapter::DataAdapter;
use crate::checks::{CheckContext, CheckError};
use crate::config::EngineSettings;
use crate::contracts::{
    CheckOutcome, OverallResult, ValidationIssue, ValidationIssueKind, ValidationResult,
};
use crate::metrics::ConsistencyMetrics;
use crate::models::TenantScope;
use crate::registry::{CheckRegistry, RegisteredCheck};
use crate::services::aggregator::aggregate;

/// Errors surfaced by the strict run variant
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunnerError {
    #[error("CONFIGURATION_ERROR: unknown check name(s): {}", .0.join(", "))]
    UnknownChecks(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct CheckRunner {
    registry: Arc<CheckRegistry>,
    adapter: Arc<dyn DataAdapter>,
    settings: EngineSettings,
    metrics: Option<Arc<ConsistencyMetrics>>,
}

impl CheckRunner {
    pub fn new(
        registry: Arc<CheckRegistry>,
        adapter: Arc<dyn DataAdapter>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            registry,
            adapter,
            settings,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ConsistencyMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn registry(&self) -> &CheckRegistry {
        &self.registry
    }

    /// Run every registered check.
    pub async fn run_all(&self, scope: &TenantScope) -> OverallResult {
        let positions: Vec<usize> = (0..self.registry.len()).collect();
        aggregate(self.execute(scope, &positions).await)
    }

    /// Run the checks matching `names`. Unknown names are dropped with a
    /// warning, so a request naming only unknown checks yields an empty,
    /// valid result.
    pub async fn run_named<S: AsRef<str>>(&self, scope: &TenantScope, names: &[S]) -> OverallResult {
        let (positions, unknown) = self.select(names);
        for name in &unknown {
            warn!(
                tenant_id = %scope.tenant_id,
                check = %name,
                "Unknown check name requested; ignoring"
            );
        }
        aggregate(self.execute(scope, &positions).await)
    }

    /// Like [`run_named`](Self::run_named) but fails with
    /// [`RunnerError::UnknownChecks`] before running anything if any name
    /// does not match a registered check.
    pub async fn run_named_strict<S: AsRef<str>>(
        &self,
        scope: &TenantScope,
        names: &[S],
    ) -> Result<OverallResult, RunnerError> {
        let (positions, unknown) = self.select(names);
        if !unknown.is_empty() {
            return Err(RunnerError::UnknownChecks(unknown));
        }
        Ok(aggregate(self.execute(scope, &positions).await))
    }

    /// Registry positions for `names` in canonical order, plus the names that
    /// matched nothing.
    fn select<S: AsRef<str>>(&self, names: &[S]) -> (Vec<usize>, Vec<String>) {
        let mut positions = Vec::with_capacity(names.len());
        let mut unknown = Vec::new();
        for name in names {
            match self.registry.position(name.as_ref()) {
                Some(position) => positions.push(position),
                None => unknown.push(name.as_ref().to_string()),
            }
        }
        positions.sort_unstable();
        positions.dedup();
        (positions, unknown)
    }

    async fn execute(&self, scope: &TenantScope, positions: &[usize]) -> Vec<CheckOutcome> {
        let mut slots: Vec<Option<CheckOutcome>> = vec![None; positions.len()];
        let workers = self.settings.max_concurrent_checks.max(1);

        let selected = positions
            .iter()
            .enumerate()
            .filter_map(|(slot, &position)| self.registry.get(position).map(|check| (slot, check)));

        let mut completed = stream::iter(selected)
            .map(|(slot, check)| {
                let ctx = CheckContext::new(
                    Arc::clone(&self.adapter),
                    scope.clone(),
                    self.settings.page_size,
                );
                async move { (slot, self.run_one(check, ctx).await) }
            })
            .buffer_unordered(workers);

        while let Some((slot, outcome)) = completed.next().await {
            slots[slot] = Some(outcome);
        }

        slots.into_iter().flatten().collect()
    }

    async fn run_one(&self, check: &RegisteredCheck, ctx: CheckContext) -> CheckOutcome {
        let scope = ctx.scope.clone();
        let started = Instant::now();
        let run = AssertUnwindSafe((check.run)(ctx)).catch_unwind();

        let finished = match self.settings.check_timeout {
            Some(limit) => tokio::time::timeout(limit, run).await.ok(),
            None => Some(run.await),
        };

        let result = match finished {
            Some(Ok(Ok(result))) => result,
            Some(Ok(Err(CheckError::DataAccess(err)))) => {
                warn!(
                    tenant_id = %scope.tenant_id,
                    check = %check.key,
                    error = %err,
                    "Check failed on data access"
                );
                failure(
                    ValidationIssueKind::DataAccessFailure,
                    format!("Check '{}' could not read its data: {}", check.display_name, err),
                )
            }
            Some(Ok(Err(CheckError::Internal(reason)))) => {
                error!(
                    tenant_id = %scope.tenant_id,
                    check = %check.key,
                    reason = %reason,
                    "Check failed internally"
                );
                failure(
                    ValidationIssueKind::InternalCheckFailure,
                    format!("Check '{}' failed: {}", check.display_name, reason),
                )
            }
            Some(Err(panic)) => {
                let reason = panic_message(panic.as_ref());
                error!(
                    tenant_id = %scope.tenant_id,
                    check = %check.key,
                    reason = %reason,
                    "Check panicked"
                );
                failure(
                    ValidationIssueKind::InternalCheckFailure,
                    format!("Check '{}' failed: {}", check.display_name, reason),
                )
            }
            None => {
                warn!(
                    tenant_id = %scope.tenant_id,
                    check = %check.key,
                    timeout = ?self.settings.check_timeout,
                    "Check timed out"
                );
                failure(
                    ValidationIssueKind::DataAccessFailure,
                    format!(
                        "Check '{}' timed out after {:?}",
                        check.display_name,
                        started.elapsed()
                    ),
                )
            }
        };

        let elapsed = started.elapsed();
        info!(
            tenant_id = %scope.tenant_id,
            company_id = ?scope.company_id,
            check = %check.key,
            is_valid = result.is_valid,
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Consistency check completed"
        );
        if let Some(metrics) = &self.metrics {
            metrics.observe_check(&check.key, &result, elapsed);
        }

        CheckOutcome {
            name: check.display_name.to_string(),
            result,
        }
    }
}

fn failure(kind: ValidationIssueKind, message: String) -> ValidationResult {
    ValidationResult::failed(ValidationIssue::new(kind, message))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::InMemoryStore;
    use crate::registry::CheckFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    static IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);
    static PEAK_IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);

    fn passing(_ctx: CheckContext) -> CheckFuture {
        async { Ok(ValidationResult::new()) }.boxed()
    }

    fn explode() -> Result<ValidationResult, CheckError> {
        panic!("boom")
    }

    fn panicking(_ctx: CheckContext) -> CheckFuture {
        async { explode() }.boxed()
    }

    fn internal(_ctx: CheckContext) -> CheckFuture {
        async { Err(CheckError::Internal("bad state".into())) }.boxed()
    }

    fn slow(_ctx: CheckContext) -> CheckFuture {
        async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ValidationResult::new())
        }
        .boxed()
    }

    fn tracked(_ctx: CheckContext) -> CheckFuture {
        async {
            let now = IN_FLIGHT.fetch_add(1, Ordering::SeqCst) + 1;
            PEAK_IN_FLIGHT.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            IN_FLIGHT.fetch_sub(1, Ordering::SeqCst);
            Ok(ValidationResult::new())
        }
        .boxed()
    }

    fn runner(registry: CheckRegistry, settings: EngineSettings) -> CheckRunner {
        CheckRunner::new(Arc::new(registry), Arc::new(InMemoryStore::new()), settings)
    }

    fn scope() -> TenantScope {
        TenantScope::company("t1", "c1")
    }

    #[tokio::test]
    async fn test_panicking_check_is_isolated() {
        let registry = CheckRegistry::new()
            .with_check("First", passing)
            .with_check("Exploding", panicking)
            .with_check("Last", passing);

        let overall = runner(registry, EngineSettings::default()).run_all(&scope()).await;

        assert!(!overall.is_valid);
        assert_eq!(overall.checks.len(), 3);
        assert!(overall.checks[0].result.is_valid);
        assert!(overall.checks[2].result.is_valid);
        let failed = &overall.checks[1].result;
        assert_eq!(failed.errors.len(), 1);
        assert_eq!(failed.errors[0].kind, ValidationIssueKind::InternalCheckFailure);
        assert!(failed.errors[0].message.contains("Exploding"));
        assert!(failed.errors[0].message.contains("boom"));
    }

    #[tokio::test]
    async fn test_internal_error_maps_to_internal_failure() {
        let registry = CheckRegistry::new().with_check("Broken", internal);

        let overall = runner(registry, EngineSettings::default()).run_all(&scope()).await;

        assert_eq!(
            overall.checks[0].result.errors[0].kind,
            ValidationIssueKind::InternalCheckFailure
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_maps_to_data_access_failure() {
        let registry = CheckRegistry::new()
            .with_check("Slow", slow)
            .with_check("Fast", passing);
        let settings = EngineSettings {
            check_timeout: Some(Duration::from_secs(5)),
            ..EngineSettings::default()
        };

        let overall = runner(registry, settings).run_all(&scope()).await;

        assert_eq!(
            overall.checks[0].result.errors[0].kind,
            ValidationIssueKind::DataAccessFailure
        );
        assert!(overall.checks[1].result.is_valid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_count_caps_checks_in_flight() {
        let registry = CheckRegistry::new()
            .with_check("Tracked A", tracked)
            .with_check("Tracked B", tracked)
            .with_check("Tracked C", tracked)
            .with_check("Tracked D", tracked)
            .with_check("Tracked E", tracked);
        let settings = EngineSettings {
            max_concurrent_checks: 2,
            ..EngineSettings::default()
        };

        let overall = runner(registry, settings).run_all(&scope()).await;

        assert_eq!(PEAK_IN_FLIGHT.load(Ordering::SeqCst), 2);
        assert_eq!(IN_FLIGHT.load(Ordering::SeqCst), 0);
        let names: Vec<&str> = overall.checks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Tracked A", "Tracked B", "Tracked C", "Tracked D", "Tracked E"]
        );
        assert!(overall.is_valid);
    }

    #[tokio::test]
    async fn test_select_orders_and_dedups() {
        let runner = runner(CheckRegistry::standard(), EngineSettings::default());

        let (positions, unknown) =
            runner.select(&["Orphaned Records", "account_types", "nope", "ACCOUNT TYPES"]);

        assert_eq!(positions, vec![0, 5]);
        assert_eq!(unknown, vec!["nope"]);
    }

    #[tokio::test]
    async fn test_strict_rejects_unknown_before_running() {
        let runner = runner(CheckRegistry::standard(), EngineSettings::default());

        let err = runner
            .run_named_strict(&scope(), &["account_types", "unknown_check"])
            .await
            .unwrap_err();

        assert_eq!(err, RunnerError::UnknownChecks(vec!["unknown_check".into()]));
        assert!(err.to_string().starts_with("CONFIGURATION_ERROR"));
    }

    #[test]
    fn test_panic_message_payloads() {
        let text: Box<dyn Any + Send> = Box::new("static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn Any + Send> = Box::new(7u8);

        assert_eq!(panic_message(text.as_ref()), "static");
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(other.as_ref()), "panic with non-string payload");
    }
}
