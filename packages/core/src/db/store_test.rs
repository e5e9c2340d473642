//! Store and transaction behavior tests.

use tempfile::TempDir;

use super::{keys, repo, Store, StoreError, DEFAULT_CONTEXT};

fn open_store() -> (Store, TempDir) {
    let temp = TempDir::new().unwrap();
    let store = Store::open(temp.path().join("db")).unwrap();
    (store, temp)
}

#[test]
fn open_creates_default_context() {
    let (store, _temp) = open_store();
    assert!(store.has_context(DEFAULT_CONTEXT));
    assert!(store.contexts().is_empty());
}

#[test]
fn create_and_delete_context() {
    let (store, _temp) = open_store();
    store.create_context("11111111-1111-1111-1111-111111111111").unwrap();
    assert_eq!(
        store.contexts(),
        vec!["11111111-1111-1111-1111-111111111111".to_string()]
    );

    let err = store
        .create_context("11111111-1111-1111-1111-111111111111")
        .unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(_)));

    store.delete_context("11111111-1111-1111-1111-111111111111").unwrap();
    assert!(store.contexts().is_empty());

    let err = store
        .delete_context("11111111-1111-1111-1111-111111111111")
        .unwrap_err();
    assert!(matches!(err, StoreError::NotExists(_)));
}

#[test]
fn put_get_delete_round_trip() {
    let (store, _temp) = open_store();
    store.put(b"K.1", b"one", DEFAULT_CONTEXT).unwrap();
    assert_eq!(
        store.get(b"K.1", DEFAULT_CONTEXT).unwrap(),
        Some(b"one".to_vec())
    );
    store.delete(b"K.1", DEFAULT_CONTEXT).unwrap();
    assert_eq!(store.get(b"K.1", DEFAULT_CONTEXT).unwrap(), None);
}

#[test]
fn unknown_context_is_an_error() {
    let (store, _temp) = open_store();
    assert!(store.put(b"K.1", b"one", "nope").is_err());
}

#[test]
fn prefix_scan_is_ordered_and_bounded() {
    let (store, _temp) = open_store();
    store.put(b"H.b", b"2", DEFAULT_CONTEXT).unwrap();
    store.put(b"H.a", b"1", DEFAULT_CONTEXT).unwrap();
    store.put(b"H.c", b"3", DEFAULT_CONTEXT).unwrap();
    store.put(b"I.a", b"other", DEFAULT_CONTEXT).unwrap();

    let entries = store.scan_prefix(b"H.", DEFAULT_CONTEXT).unwrap();
    let keys: Vec<&[u8]> = entries.iter().map(|(k, _)| k.as_slice()).collect();
    assert_eq!(keys, vec![b"H.a".as_slice(), b"H.b", b"H.c"]);
}

#[test]
fn numeric_key_segments_scan_in_numeric_order() {
    let (store, _temp) = open_store();
    // Insert out of order; ids 2, 10, 255 must come back sorted numerically.
    for id in [255u32, 2, 10] {
        store
            .put(&keys::header(1, id), &id.to_be_bytes(), DEFAULT_CONTEXT)
            .unwrap();
    }
    let entries = store
        .scan_prefix(&keys::header_prefix(1), DEFAULT_CONTEXT)
        .unwrap();
    let ids: Vec<u32> = entries
        .iter()
        .map(|(_, v)| u32::from_be_bytes(v.as_slice().try_into().unwrap()))
        .collect();
    assert_eq!(ids, vec![2, 10, 255]);
}

#[test]
fn scan_from_resumes_past_a_watermark() {
    let (store, _temp) = open_store();
    for id in 1..=5u32 {
        store
            .put(&keys::header(7, id), &id.to_be_bytes(), DEFAULT_CONTEXT)
            .unwrap();
    }
    let entries = store
        .scan_from(
            &keys::header(7, 4),
            &keys::header_prefix(7),
            DEFAULT_CONTEXT,
        )
        .unwrap();
    assert_eq!(entries.len(), 2);
}

#[test]
fn transaction_commit_is_visible() {
    let (store, _temp) = open_store();
    let txn = store.begin();
    txn.put(b"T.1", b"committed", DEFAULT_CONTEXT).unwrap();
    txn.commit().unwrap();
    assert_eq!(
        store.get(b"T.1", DEFAULT_CONTEXT).unwrap(),
        Some(b"committed".to_vec())
    );
}

#[test]
fn dropped_transaction_rolls_back() {
    let (store, _temp) = open_store();
    {
        let txn = store.begin();
        txn.put(b"T.2", b"lost", DEFAULT_CONTEXT).unwrap();
        // Dropped without commit.
    }
    assert_eq!(store.get(b"T.2", DEFAULT_CONTEXT).unwrap(), None);
}

#[test]
fn counter_allocates_monotone_ids() {
    let (store, _temp) = open_store();
    for expected in 1..=3u32 {
        let txn = store.begin();
        let id = repo::next_id(&txn, keys::NODE_SEQ, DEFAULT_CONTEXT).unwrap();
        txn.commit().unwrap();
        assert_eq!(id, expected);
    }
}
