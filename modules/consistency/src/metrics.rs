use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::fmt;
use std::time::Duration;

use crate::contracts::{FixResult, ValidationResult};

#[derive(Clone)]
pub struct ConsistencyMetrics {
    registry: Registry,

    // Counters
    pub checks_total: IntCounterVec,
    pub fixes_total: IntCounterVec,

    // Gauges
    pub issues: IntGaugeVec,

    // Histograms
    pub check_duration_seconds: HistogramVec,
}

impl ConsistencyMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let checks_total = IntCounterVec::new(
            Opts::new("consistency_checks_total", "Consistency check executions"),
            &["check", "result"], // passed|failed
        )?;

        let fixes_total = IntCounterVec::new(
            Opts::new("consistency_fixes_total", "Remediation fix attempts"),
            &["check", "result"], // fixed|failed
        )?;

        let issues = IntGaugeVec::new(
            Opts::new("consistency_issues", "Issues reported by the last run of a check"),
            &["check", "severity"], // error|warning|suggestion
        )?;

        let check_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "consistency_check_duration_seconds",
                "Consistency check duration seconds",
            ),
            &["check"],
        )?;

        registry.register(Box::new(checks_total.clone()))?;
        registry.register(Box::new(fixes_total.clone()))?;
        registry.register(Box::new(issues.clone()))?;
        registry.register(Box::new(check_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            checks_total,
            fixes_total,
            issues,
            check_duration_seconds,
        })
    }

    pub fn observe_check(&self, check: &str, result: &ValidationResult, elapsed: Duration) {
        let outcome = if result.is_valid { "passed" } else { "failed" };
        self.checks_total.with_label_values(&[check, outcome]).inc();

        for (severity, count) in [
            ("error", result.errors.len()),
            ("warning", result.warnings.len()),
            ("suggestion", result.suggestions.len()),
        ] {
            self.issues
                .with_label_values(&[check, severity])
                .set(i64::try_from(count).unwrap_or(i64::MAX));
        }

        self.check_duration_seconds
            .with_label_values(&[check])
            .observe(elapsed.as_secs_f64());
    }

    pub fn observe_fixes(&self, result: &FixResult) {
        let check = result.check_name.as_str();
        self.fixes_total
            .with_label_values(&[check, "fixed"])
            .inc_by(result.fixed as u64);
        self.fixes_total
            .with_label_values(&[check, "failed"])
            .inc_by(result.failed as u64);
    }

    pub fn render(&self) -> Result<String, String> {
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        let mut buf = Vec::new();
        encoder
            .encode(&mf, &mut buf)
            .map_err(|e| format!("encode metrics: {}", e))?;
        String::from_utf8(buf).map_err(|e| format!("metrics are not utf8: {}", e))
    }
}

impl fmt::Debug for ConsistencyMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConsistencyMetrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{ValidationIssue, ValidationIssueKind};

    #[test]
    fn test_observe_check_renders_counters_and_gauges() {
        let metrics = ConsistencyMetrics::new().unwrap();
        let mut result = ValidationResult::new();
        result.error(ValidationIssue::new(ValidationIssueKind::StockMismatch, "x"));

        metrics.observe_check("stock_consistency", &result, Duration::from_millis(12));

        let text = metrics.render().unwrap();
        assert!(text.contains(r#"consistency_checks_total{check="stock_consistency",result="failed"} 1"#));
        assert!(text.contains(r#"consistency_issues{check="stock_consistency",severity="error"} 1"#));
        assert!(text.contains("consistency_check_duration_seconds_count"));
    }

    #[test]
    fn test_observe_fixes() {
        let metrics = ConsistencyMetrics::new().unwrap();
        let mut fixes = FixResult::new("account_types");
        fixes.record_fixed("a1", "relink_account_type");

        metrics.observe_fixes(&fixes);

        let text = metrics.render().unwrap();
        assert!(text.contains(r#"consistency_fixes_total{check="account_types",result="fixed"} 1"#));
    }
}
