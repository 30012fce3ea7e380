//! Test blob storage outside the tree.

use crate::FaultKind;
use crate::TreeError;
use crate::e2e_tests::helpers::*;
use crate::storage::PageStore;

#[test]
fn test_blob_round_trip_with_padding() {
    let (store, tree) = memory_tree(128);
    tree.put(b"key", b"value").expect("put");

    let data: Vec<u8> = (0..300u32).map(|i| i.to_le_bytes()[0]).collect();
    let start = tree.put_blob(&data).expect("put blob");
    assert_eq!(start, 1);
    assert_eq!(store.page_count().expect("count"), 4);

    let mut buf = vec![0u8; data.len()];
    tree.get_blob(start, &mut buf).expect("get blob");
    assert_eq!(buf, data);

    let last = store.page(3).expect("last blob page");
    assert_eq!(&last[..44], &data[256..]);
    assert!(last[44..].iter().all(|&b| b == 0));
}

#[test]
fn test_blobs_do_not_overlap_tree_pages() {
    let (store, tree) = memory_tree(128);
    let first = tree.put_blob(&[0xAA; 128]).expect("put blob");
    for i in 0..60 {
        tree.put(&numbered_key(i), b"value").expect("put");
    }
    let second = tree.put_blob(&[0xBB; 10]).expect("put blob");
    assert!(second > first);

    let mut buf = [0u8; 128];
    tree.get_blob(first, &mut buf).expect("get blob");
    assert!(buf.iter().all(|&b| b == 0xAA));
    assert_eq!(store.page(second).expect("page")[..10], [0xBB; 10]);

    assert_eq!(scan(&tree).len(), 60);
}

#[test]
fn test_empty_blob_allocates_nothing() {
    let (store, tree) = memory_tree(128);
    let start = tree.put_blob(&[]).expect("put blob");
    assert_eq!(start, 1);
    assert_eq!(store.page_count().expect("count"), 1);
}

#[test]
fn test_blob_io_rejected_during_transaction() {
    let (_store, tree) = memory_tree(128);
    let start = tree.put_blob(b"blob").expect("put blob");

    tree.start_transaction().expect("start");
    let error = tree.put_blob(b"other").expect_err("transaction open");
    assert!(matches!(error, TreeError::TransactionOpen));
    assert_eq!(error.kind(), FaultKind::State);

    let mut buf = [0u8; 4];
    let error = tree.get_blob(start, &mut buf).expect_err("transaction open");
    assert_eq!(error.kind(), FaultKind::State);
    tree.commit_transaction().expect("commit");

    tree.get_blob(start, &mut buf).expect("get blob");
    assert_eq!(&buf, b"blob");
}
