//! Result contracts returned by the consistency engine

pub mod fix_result_v1;
pub mod validation_result_v1;

pub use fix_result_v1::{FixDetail, FixResult};
pub use validation_result_v1::{
    CheckOutcome, OverallResult, RunSummary, ValidationIssue, ValidationIssueKind, ValidationResult,
};
