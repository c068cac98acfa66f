pub mod adapter;
pub mod audit;
pub mod checks;
pub mod config;
pub mod contracts;
pub mod db;
pub mod metrics;
pub mod models;
pub mod registry;
pub mod services;

pub use adapter::{DataAdapter, InMemoryStore, PgDataAdapter};
pub use audit::AuditEntry;
pub use config::{Config, EngineSettings, PoolSettings};
pub use models::TenantScope;
pub use services::ConsistencyService;
