//! Consistency check tool
//!
//! Runs the consistency checks for one tenant (optionally one company) and
//! prints the report as JSON. With `--fix` it then applies the automatic
//! corrections and includes their results.
//!
//! # Usage
//! ```bash
//! consistency-check --tenant TENANT_ID [--company COMPANY_ID] \
//!   [--check "Account Types"]... [--strict] [--fix] [--metrics-out metrics.prom]
//! ```
//!
//! Exit status is 1 when any check reports an error or a `--strict` run
//! names an unknown check.

use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use consistency_rs::{
    config::Config,
    contracts::{FixResult, OverallResult},
    db,
    metrics::ConsistencyMetrics,
    ConsistencyService, PgDataAdapter, TenantScope,
};

#[derive(Debug, Parser)]
#[command(name = "consistency-check", version, about = "Validate and repair accounting data consistency")]
struct Args {
    /// Tenant to check
    #[arg(long)]
    tenant: String,

    /// Restrict to one company of the tenant
    #[arg(long)]
    company: Option<String>,

    /// Check to run, by display name or key; repeatable. Defaults to all checks.
    #[arg(long = "check")]
    checks: Vec<String>,

    /// Fail on unknown check names instead of ignoring them
    #[arg(long)]
    strict: bool,

    /// Apply automatic fixes after checking
    #[arg(long)]
    fix: bool,

    /// Write Prometheus metrics in text format to this file
    #[arg(long)]
    metrics_out: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    #[serde(flatten)]
    result: OverallResult,
    digest: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fixes: Option<Vec<FixResult>>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::from_env().expect("Failed to load configuration from environment");

    tracing::info!(
        tenant_id = %args.tenant,
        company_id = ?args.company,
        workers = config.max_concurrent_checks,
        page_size = config.page_size,
        "Starting consistency check"
    );

    let pool = db::init_pool(&config.database_url, &config.pool)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running migrations...");
    sqlx::migrate!("./db/migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let metrics = Arc::new(ConsistencyMetrics::new().expect("Failed to register metrics"));
    let service = ConsistencyService::new(
        Arc::new(PgDataAdapter::new(pool)),
        config.engine_settings(),
    )
    .with_metrics(Arc::clone(&metrics));

    let scope = TenantScope::new(args.tenant.clone(), args.company.clone());

    let result = if args.checks.is_empty() {
        service.run_all_checks(&scope).await
    } else if args.strict {
        match service.run_checks_strict(&scope, args.checks.as_slice()).await {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(error = %err, "Check selection rejected");
                eprintln!("{}", err);
                return ExitCode::FAILURE;
            }
        }
    } else {
        service.run_checks(&scope, args.checks.as_slice()).await
    };

    let fixes = if args.fix {
        Some(service.fix_common_issues(&scope).await)
    } else {
        None
    };

    let healthy = result.is_valid;
    let report = Report {
        digest: result.digest(),
        result,
        fixes,
    };

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{}", json),
        Err(err) => {
            tracing::error!(error = %err, "Failed to serialize report");
            return ExitCode::FAILURE;
        }
    }

    if let Some(path) = &args.metrics_out {
        let written = metrics
            .render()
            .and_then(|text| std::fs::write(path, text).map_err(|e| e.to_string()));
        if let Err(err) = written {
            tracing::warn!(path = %path.display(), error = %err, "Failed to write metrics");
        }
    }

    if healthy {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
