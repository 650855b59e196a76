//! Tests for the file-backed query store

use serde_json::json;
use shared::JobSocket;

use crate::error::{FailureKind, NexusError};
use crate::services::query_store::FileQueryStore;
use crate::traits::QueryStore;

#[tokio::test]
async fn test_reads_json_and_jsonl_tables() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("orders.json"),
        r#"{"columns": ["sku", "qty"], "rows": [["A-1", 3]]}"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("prices.jsonl"), "{\"sku\": \"A-1\", \"price\": 9.5}\n\n{\"sku\": \"B-2\"}\n").unwrap();

    let store = FileQueryStore::from_connection_string(&dir.path().display().to_string()).unwrap();

    let orders = store
        .read_table(&JobSocket::new("orders", "orders.json", "json"))
        .await
        .unwrap();
    assert_eq!(orders.rows, vec![vec![json!("A-1"), json!(3)]]);

    let prices = store
        .read_table(&JobSocket::new("prices", "prices.jsonl", "jsonl"))
        .await
        .unwrap();
    assert_eq!(prices.len(), 2);
    assert_eq!(prices.column("price").unwrap(), vec![&json!(9.5), &json!(null)]);
}

#[tokio::test]
async fn test_missing_table_is_transient() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileQueryStore::new(Some(dir.path().to_path_buf()));

    let error = store
        .read_table(&JobSocket::new("orders", "missing.json", "json"))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), FailureKind::Transient);
}

#[tokio::test]
async fn test_unknown_format_and_closed_store_are_fatal() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("orders.parquet"), b"PAR1").unwrap();
    let store = FileQueryStore::new(Some(dir.path().to_path_buf()));

    let error = store
        .read_table(&JobSocket::new("orders", "orders.parquet", "parquet"))
        .await
        .unwrap_err();
    assert!(matches!(error, NexusError::UnknownRegistration { .. }));

    store.close().await.unwrap();
    let error = store
        .read_table(&JobSocket::new("orders", "orders.parquet", "json"))
        .await
        .unwrap_err();
    assert_eq!(error.kind(), FailureKind::Fatal);
}
