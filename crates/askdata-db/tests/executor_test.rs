//! Integration tests for read-only query execution.
//!
//! This test suite validates:
//! - Typed row conversion (integers, numerics, text, dates, nulls)
//! - Zero-row results still report column metadata
//! - Writes are refused by the read-only transaction
//! - Warehouse errors are classified
//!
//! **IMPORTANT**: These tests require a PostgreSQL database.

use askdata_db::{
    test_fixtures::connect_test_db, ExecutionFailureKind, ExecutorConfig, PgQueryExecutor,
    QueryExecutor,
};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
#[ignore] // Requires database connection
async fn test_typed_row_conversion() {
    let db = connect_test_db().await;

    let result = db
        .executor
        .run(
            "SELECT 1::int4 AS a, 2::int8 AS b, 12.50::numeric AS c, 'x'::text AS d,
                    DATE '2026-01-31' AS e, NULL::text AS f, true AS g",
        )
        .await
        .expect("query should succeed");

    assert_eq!(result.row_count(), 1);
    let row = &result.rows[0];
    assert_eq!(row["a"], json!(1));
    assert_eq!(row["b"], json!(2));
    assert_eq!(row["c"].as_f64(), Some(12.5));
    assert_eq!(row["d"], json!("x"));
    assert_eq!(row["e"], json!("2026-01-31"));
    assert!(row["f"].is_null());
    assert_eq!(row["g"], json!(true));
    assert_eq!(result.column_names(), vec!["a", "b", "c", "d", "e", "f", "g"]);
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_zero_rows_keeps_columns() {
    let db = connect_test_db().await;

    let result = db
        .executor
        .run("SELECT 1 AS n, 'a'::text AS label WHERE false")
        .await
        .expect("query should succeed");

    assert!(result.is_empty());
    assert_eq!(result.column_names(), vec!["n", "label"]);
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_write_is_refused_by_read_only_transaction() {
    let db = connect_test_db().await;

    let failure = db
        .executor
        .run("CREATE TABLE should_not_exist (id int)")
        .await
        .expect_err("write must fail");

    assert_ne!(failure.kind, ExecutionFailureKind::Syntax);
    assert!(failure.message.to_lowercase().contains("read-only"));
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_missing_relation_is_classified() {
    let db = connect_test_db().await;

    let failure = db
        .executor
        .run("SELECT * FROM no_such_table_anywhere")
        .await
        .expect_err("missing table");

    assert_eq!(failure.kind, ExecutionFailureKind::MissingRelation);
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_syntax_error_is_classified() {
    let db = connect_test_db().await;

    let failure = db.executor.run("SELEC 1").await.expect_err("bad syntax");
    assert_eq!(failure.kind, ExecutionFailureKind::Syntax);
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_statement_timeout_is_classified() {
    let db = connect_test_db().await;
    let executor = PgQueryExecutor::with_config(
        db.pool.clone(),
        ExecutorConfig::default().with_statement_timeout(Duration::from_millis(100)),
    );

    let failure = executor
        .run("SELECT pg_sleep(2)")
        .await
        .expect_err("should time out");
    assert_eq!(failure.kind, ExecutionFailureKind::Timeout);
}
