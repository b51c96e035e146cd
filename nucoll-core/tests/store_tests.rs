// Tests for on-disk collection and adjacency files

use nucoll_client::UserObject;
use nucoll_core::adjacency::AdjacencyStore;
use nucoll_core::collection::{DAT_EXT, collection_path, read_records, write_records};
use nucoll_core::query::read_query_handles;
use tempfile::TempDir;

// ============================================================================
// Adjacency Store Tests
// ============================================================================

#[test]
fn test_adjacency_write_then_read() {
    let temp_dir = TempDir::new().unwrap();
    let store = AdjacencyStore::new(temp_dir.path());
    let targets = vec![783214, 12, u64::MAX, 12, 6253282];

    assert!(!store.exists(99));
    store.write(99, &targets).unwrap();

    assert!(store.exists(99));
    assert_eq!(store.read(99).unwrap(), Some(targets));
}

#[test]
fn test_adjacency_never_fetched_is_none() {
    let temp_dir = TempDir::new().unwrap();
    let store = AdjacencyStore::new(temp_dir.path());
    assert_eq!(store.read(1).unwrap(), None);
}

#[test]
fn test_adjacency_empty_record_exists() {
    let temp_dir = TempDir::new().unwrap();
    let store = AdjacencyStore::new(temp_dir.path());
    store.write(7, &[]).unwrap();

    assert!(store.exists(7));
    assert_eq!(store.read(7).unwrap(), Some(vec![]));
}

// ============================================================================
// Collection File Tests
// ============================================================================

#[test]
fn test_collected_nodes_feed_query_handles() {
    let temp_dir = TempDir::new().unwrap();
    let path = collection_path(temp_dir.path(), "jdevoo", DAT_EXT);

    let users: Vec<UserObject> = (1..=3)
        .map(|id| UserObject {
            id,
            screen_name: format!("user{id}"),
            relation: "followers".to_string(),
            subject: "jdevoo".to_string(),
            ..Default::default()
        })
        .collect();
    write_records(&path, &users[..2], false).unwrap();
    write_records(&path, &users[2..], true).unwrap();

    let back: Vec<UserObject> = read_records(&path).unwrap();
    assert_eq!(back, users);

    // node files carry no @mentions
    assert!(read_query_handles(&path, false).unwrap().is_empty());
}
