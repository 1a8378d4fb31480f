// tests against a live database
// run with: cargo test --features test-db
// requires DATABASE_URL env var (postgres or mysql) with users/orders tables

#![cfg(feature = "test-db")]

use sqlgate::{Db, sanitize};
use std::num::NonZeroU32;

fn get_db_url() -> String {
    std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for db tests")
}

#[tokio::test]
async fn test_connect_read_only() {
    let db = Db::connect_read_only(&get_db_url()).await;
    assert!(db.is_ok());
}

#[tokio::test]
async fn test_schema() {
    let db = Db::connect_read_only(&get_db_url()).await.unwrap();
    let schema = db.schema().await.unwrap();

    // should contain our test tables
    assert!(schema.contains("### Table users"));
    assert!(schema.contains("### Table orders"));
}

#[tokio::test]
async fn test_sanitized_select_runs() {
    let db = Db::connect_read_only(&get_db_url()).await.unwrap();
    let verdict = sanitize("SELECT id, name FROM users", NonZeroU32::new(1).unwrap());
    let result = db.execute(verdict.sql().unwrap()).await.unwrap();

    assert_eq!(result.columns.len(), 2);
    assert_eq!(result.row_count, 1);
}

#[tokio::test]
async fn test_execute_join() {
    let db = Db::connect_read_only(&get_db_url()).await.unwrap();
    let result = db
        .execute(
            "SELECT u.name, o.amount
             FROM users u
             JOIN orders o ON u.id = o.user_id",
        )
        .await
        .unwrap();

    assert_eq!(result.columns.len(), 2);
    assert!(result.row_count > 0);
}

#[tokio::test]
async fn test_read_only_session_refuses_writes() {
    let db = Db::connect_read_only(&get_db_url()).await.unwrap();
    assert!(db.execute("DELETE FROM orders").await.is_err());
}
