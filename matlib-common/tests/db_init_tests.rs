//! Database bootstrap

use matlib_common::db::{init_database, SCHEMA_VERSION};

#[tokio::test]
async fn test_creates_database_and_parent_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("matlib.db");

    let pool = init_database(&db_path).await.unwrap();
    assert!(db_path.exists());

    let version: i64 = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(version, SCHEMA_VERSION);
}

#[tokio::test]
async fn test_reopening_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("matlib.db");

    let pool = init_database(&db_path).await.unwrap();
    sqlx::query("INSERT INTO properties (parent, value) VALUES (NULL, 'Subject')")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM properties")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_top_level_values_are_unique() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("matlib.db")).await.unwrap();

    sqlx::query("INSERT INTO properties (parent, value) VALUES (NULL, 'Subject')")
        .execute(&pool)
        .await
        .unwrap();
    let duplicate = sqlx::query("INSERT INTO properties (parent, value) VALUES (NULL, 'Subject')")
        .execute(&pool)
        .await;
    assert!(duplicate.is_err());
}

#[tokio::test]
async fn test_foreign_keys_enforced() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("matlib.db")).await.unwrap();

    let orphan = sqlx::query("INSERT INTO properties (parent, value) VALUES (12345, 'Orphan')")
        .execute(&pool)
        .await;
    assert!(orphan.is_err());
}
