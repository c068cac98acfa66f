//! Audit trail for remediation writes
//!
//! Every fix carries an [`AuditEntry`] with its old and new value. Adapters
//! write the entry in the same commit as the fix, so no change is ever
//! stored without its audit row and a failed audit write leaves the data
//! untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::adapter::FixPatch;
use crate::models::EntityKind;

/// One recorded mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub tenant_id: String,
    pub company_id: String,
    pub check_name: String,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub action: String,
    pub old_value: Value,
    pub new_value: Value,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Entry describing `patch` applied to `entity_id`, stamped now.
    pub fn for_fix(
        tenant_id: &str,
        company_id: &str,
        check_name: &str,
        entity_id: &str,
        patch: &FixPatch,
    ) -> Self {
        let (old_value, new_value) = patch.audit_values();
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            company_id: company_id.to_string(),
            check_name: check_name.to_string(),
            entity_kind: patch.entity_kind(),
            entity_id: entity_id.to_string(),
            action: patch.action().to_string(),
            old_value,
            new_value,
            recorded_at: Utc::now(),
        }
    }
}

/// Insert an audit entry inside the transaction that applies its fix
///
/// The row commits or rolls back together with the change it describes.
pub async fn insert_audit_entry(
    tx: &mut Transaction<'_, Postgres>,
    entry: &AuditEntry,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO consistency_fix_audit (
            id, tenant_id, company_id, check_name, entity_kind, entity_id,
            action, old_value, new_value, recorded_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(entry.id)
    .bind(&entry.tenant_id)
    .bind(&entry.company_id)
    .bind(&entry.check_name)
    .bind(entry.entity_kind.as_str())
    .bind(&entry.entity_id)
    .bind(&entry.action)
    .bind(&entry.old_value)
    .bind(&entry.new_value)
    .bind(entry.recorded_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
