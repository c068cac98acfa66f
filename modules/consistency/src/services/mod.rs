pub mod aggregator;
pub mod consistency_service;
pub mod remediation_service;
pub mod runner;

pub use consistency_service::ConsistencyService;
pub use remediation_service::{AutoFix, RemediationEngine, RemediationError};
pub use runner::{CheckRunner, RunnerError};
