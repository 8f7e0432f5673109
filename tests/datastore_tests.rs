use kiwibes::datastore::DataStore;
use kiwibes::error::KiwibesError;

#[tokio::test]
async fn test_write_then_read() {
    let store = DataStore::new(1024);

    store.write("greeting", "hello").await.unwrap();
    assert_eq!(store.read("greeting").await.unwrap(), "hello");
    assert_eq!(store.current_bytes().await, "greeting".len() + "hello".len());
}

#[tokio::test]
async fn test_no_overwrite() {
    let store = DataStore::new(1024);

    store.write("key", "first").await.unwrap();
    assert_eq!(
        store.write("key", "second").await.unwrap_err(),
        KiwibesError::DataKeyTaken
    );
    assert_eq!(store.read("key").await.unwrap(), "first");

    // Clearing the key frees it for a new value.
    store.clear("key").await.unwrap();
    store.write("key", "second").await.unwrap();
    assert_eq!(store.read("key").await.unwrap(), "second");
}

#[tokio::test]
async fn test_unknown_key() {
    let store = DataStore::new(1024);
    assert_eq!(
        store.read("missing").await.unwrap_err(),
        KiwibesError::DataKeyUnknown
    );
    assert_eq!(
        store.clear("missing").await.unwrap_err(),
        KiwibesError::DataKeyUnknown
    );
}

#[tokio::test]
async fn test_budget_boundary_is_inclusive() {
    // Room for exactly two entries of 10 bytes each.
    let store = DataStore::new(20);

    store.write("key_1", "aaaaa").await.unwrap();
    // This write lands exactly on the budget and must be accepted.
    store.write("key_2", "bbbbb").await.unwrap();
    assert_eq!(store.current_bytes().await, 20);

    // The store is full now, even for a single byte.
    assert_eq!(
        store.write("x", "").await.unwrap_err(),
        KiwibesError::DataStoreFull
    );

    // Clearing an earlier key permits an equally-sized write.
    store.clear("key_1").await.unwrap();
    store.write("key_3", "ccccc").await.unwrap();
    assert_eq!(store.current_bytes().await, 20);
}

#[tokio::test]
async fn test_rejected_write_does_not_consume_budget() {
    let store = DataStore::new(10);

    assert_eq!(
        store.write("0123456789", "x").await.unwrap_err(),
        KiwibesError::DataStoreFull
    );
    assert_eq!(store.current_bytes().await, 0);
    assert!(store.keys().await.is_empty());
}

#[tokio::test]
async fn test_clear_all_resets_accounting() {
    let store = DataStore::new(1024);

    store.write("a", "1").await.unwrap();
    store.write("b", "2").await.unwrap();
    store.write("c", "3").await.unwrap();

    assert_eq!(store.clear_all().await, 3);
    assert_eq!(store.current_bytes().await, 0);
    assert!(store.keys().await.is_empty());
    assert_eq!(store.clear_all().await, 0);
}

#[tokio::test]
async fn test_keys_are_listed() {
    let store = DataStore::new(1024);

    store.write("beta", "2").await.unwrap();
    store.write("alpha", "1").await.unwrap();

    assert_eq!(store.keys().await, vec!["alpha", "beta"]);
}
