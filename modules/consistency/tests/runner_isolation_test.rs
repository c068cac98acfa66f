//! Fault isolation and deterministic ordering of check runs

mod common;

use common::Ledger;
use consistency_rs::adapter::ReadOp;
use consistency_rs::contracts::ValidationIssueKind;
use consistency_rs::models::EntryStatus;

const DISPLAY_ORDER: [&str; 6] = [
    "Account Types",
    "Product Categories",
    "Stock Consistency",
    "Journal Entry Balance",
    "Expense Journal Integration",
    "Orphaned Records",
];

#[tokio::test]
async fn test_data_access_failure_is_isolated_to_one_check() {
    let ledger = Ledger::new();
    ledger.seed_clean();
    ledger.store.fail_reads(ReadOp::StockPositions);

    let overall = ledger.service().run_all_checks(&ledger.scope()).await;

    assert!(!overall.is_valid);
    assert_eq!(overall.checks.len(), 6);
    for outcome in &overall.checks {
        if outcome.name == "Stock Consistency" {
            assert_eq!(outcome.result.errors.len(), 1);
            assert_eq!(
                outcome.result.errors[0].kind,
                ValidationIssueKind::DataAccessFailure
            );
            assert!(outcome.result.errors[0].message.contains("Stock Consistency"));
        } else {
            assert!(outcome.result.is_valid, "{} should pass", outcome.name);
        }
    }
    assert_eq!(overall.summary.checks_failed, 1);
}

#[tokio::test]
async fn test_shared_read_failure_fails_every_dependent_check() {
    let ledger = Ledger::new();
    ledger.seed_clean();
    ledger.store.fail_reads(ReadOp::Accounts);

    let overall = ledger.service().run_all_checks(&ledger.scope()).await;

    let failed: Vec<&str> = overall
        .checks
        .iter()
        .filter(|c| !c.result.is_valid)
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(failed, vec!["Account Types", "Orphaned Records"]);
}

#[tokio::test]
async fn test_full_run_is_in_registry_order() {
    let ledger = Ledger::new();
    ledger.seed_clean();

    let overall = ledger.service().run_all_checks(&ledger.scope()).await;

    let names: Vec<&str> = overall.checks.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, DISPLAY_ORDER);
}

#[tokio::test]
async fn test_named_run_order_ignores_request_order() {
    let ledger = Ledger::new();
    ledger.seed_clean();
    ledger.entry("je-bad", EntryStatus::Posted, &[("1000", 10, 0)]);
    let service = ledger.service();

    let forward = ["account_types", "stock_consistency", "orphaned_records"];
    let backward = ["orphaned_records", "stock_consistency", "account_types"];

    for _ in 0..5 {
        let a = service.run_checks(&ledger.scope(), &forward).await;
        let b = service.run_checks(&ledger.scope(), &backward).await;

        let names: Vec<&str> = a.checks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Account Types", "Stock Consistency", "Orphaned Records"]);
        assert_eq!(a, b);
        assert_eq!(a.digest(), b.digest());
    }
}

#[tokio::test]
async fn test_names_are_normalised_before_lookup() {
    let ledger = Ledger::new();
    ledger.seed_clean();

    let overall = ledger
        .service()
        .run_checks(
            &ledger.scope(),
            &["Journal  Entry Balance", "EXPENSE JOURNAL INTEGRATION", "journal_entry_balance"],
        )
        .await;

    let names: Vec<&str> = overall.checks.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Journal Entry Balance", "Expense Journal Integration"]);
}

#[tokio::test]
async fn test_unknown_names_mixed_with_known_are_dropped() {
    let ledger = Ledger::new();
    ledger.seed_clean();

    let overall = ledger
        .service()
        .run_checks(&ledger.scope(), &["nope", "Account Types"])
        .await;

    assert_eq!(overall.checks.len(), 1);
    assert_eq!(overall.checks[0].name, "Account Types");
}
