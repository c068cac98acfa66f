//! Remediation result contract (v1)

use serde::{Deserialize, Serialize};

/// Per-entity record of one attempted fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixDetail {
    pub entity_id: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Counts and details for one auto-fixable check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixResult {
    pub check_name: String,
    /// Affected entities found by the scan
    pub scanned: usize,
    pub fixed: usize,
    pub failed: usize,
    pub details: Vec<FixDetail>,
}

impl FixResult {
    pub fn new(check_name: impl Into<String>) -> Self {
        Self {
            check_name: check_name.into(),
            scanned: 0,
            fixed: 0,
            failed: 0,
            details: Vec::new(),
        }
    }

    pub fn record_fixed(&mut self, entity_id: impl Into<String>, action: impl Into<String>) {
        self.fixed += 1;
        self.details.push(FixDetail {
            entity_id: entity_id.into(),
            action: action.into(),
            error: None,
        });
    }

    pub fn record_failed(
        &mut self,
        entity_id: impl Into<String>,
        action: impl Into<String>,
        error: impl Into<String>,
    ) {
        self.failed += 1;
        self.details.push(FixDetail {
            entity_id: entity_id.into(),
            action: action.into(),
            error: Some(error.into()),
        });
    }
}
