use ems_storage::{InMemorySnapshotStore, SnapshotStore};

fn fields(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn write_merges_without_deleting_fields() {
    let store = InMemorySnapshotStore::new();
    store
        .write_fields("comsrv:1:m", &fields(&[("1", "1.000000"), ("2", "2.000000")]))
        .await
        .expect("write");
    store
        .write_fields("comsrv:1:m", &fields(&[("1", "5.000000")]))
        .await
        .expect("write");

    let hash = store.read_fields("comsrv:1:m").await.expect("read");
    assert_eq!(hash.get("1").map(String::as_str), Some("5.000000"));
    assert_eq!(hash.get("2").map(String::as_str), Some("2.000000"));
    assert!(store.read_fields("comsrv:2:m").await.expect("read").is_empty());
}

#[tokio::test]
async fn injected_failures_are_consumed_in_order() {
    let store = InMemorySnapshotStore::new();
    store.fail_next_writes(2);
    let payload = fields(&[("1", "1")]);

    assert!(store.write_fields("k:1:s", &payload).await.is_err());
    assert!(store.write_fields("k:1:s", &payload).await.is_err());
    store.write_fields("k:1:s", &payload).await.expect("third write");
    assert_eq!(store.write_attempts(), 3);
    assert_eq!(store.keys(), vec!["k:1:s".to_string()]);

    store.reject_writes(true);
    let err = store
        .write_fields("k:1:s", &payload)
        .await
        .expect_err("rejected");
    assert!(err.is_rejected());
}
