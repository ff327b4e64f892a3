use crate::error::StateError;
use crate::key::{KeyKind, StateKey};
use crate::store::{CasResult, StateStore};

fn test_key(kind: KeyKind, id: &str) -> StateKey {
    StateKey::new("test-ns", "test-tenant", kind, id)
}

/// Run the full state store conformance test suite.
///
/// Call this from your backend's test module with a fresh store instance.
///
/// # Errors
///
/// Returns an error if any conformance test fails.
pub async fn run_store_conformance_tests(store: &dyn StateStore) -> Result<(), StateError> {
    test_get_missing(store).await?;
    test_set_and_get(store).await?;
    test_check_and_set_new(store).await?;
    test_check_and_set_existing(store).await?;
    test_delete(store).await?;
    test_delete_if_version(store).await?;
    test_compare_and_swap(store).await?;
    test_compare_and_swap_create(store).await?;
    test_versions_advance(store).await?;
    test_scan_keys(store).await?;
    Ok(())
}

async fn test_get_missing(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Job, "missing");
    let val = store.get(&key).await?;
    assert!(val.is_none(), "get on missing key should return None");
    assert!(store.get_versioned(&key).await?.is_none());
    Ok(())
}

async fn test_set_and_get(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Job, "set-get");
    store.set(&key, "hello").await?;
    let val = store.get(&key).await?;
    assert_eq!(val.as_deref(), Some("hello"));
    Ok(())
}

async fn test_check_and_set_new(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::ActiveJob, "claim-new");
    let created = store.check_and_set(&key, "v1").await?;
    assert!(created, "check_and_set on new key should return true");
    let val = store.get(&key).await?;
    assert_eq!(val.as_deref(), Some("v1"));
    Ok(())
}

async fn test_check_and_set_existing(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::ActiveJob, "claim-existing");
    store.set(&key, "v1").await?;
    let created = store.check_and_set(&key, "v2").await?;
    assert!(
        !created,
        "check_and_set on existing key should return false"
    );
    let val = store.get(&key).await?;
    assert_eq!(val.as_deref(), Some("v1"), "original value should remain");
    Ok(())
}

async fn test_delete(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::ActiveJob, "to-delete");
    store.check_and_set(&key, "bye").await?;
    let existed = store.delete(&key).await?;
    assert!(existed, "delete should return true for existing key");
    let val = store.get(&key).await?;
    assert!(val.is_none(), "get after delete should return None");

    let existed = store.delete(&key).await?;
    assert!(!existed, "delete on missing key should return false");

    let reclaimed = store.check_and_set(&key, "again").await?;
    assert!(reclaimed, "a deleted key can be claimed again");
    Ok(())
}

async fn test_delete_if_version(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::ActiveJob, "versioned-delete");
    store.check_and_set(&key, "owner-a").await?;

    // Another writer takes the key over at version 2.
    let swapped = store.compare_and_swap(&key, 1, "owner-b").await?;
    assert_eq!(swapped, CasResult::Ok);

    let removed = store.delete_if_version(&key, 1).await?;
    assert!(!removed, "a stale version must not delete the key");
    assert_eq!(store.get(&key).await?.as_deref(), Some("owner-b"));

    let removed = store.delete_if_version(&key, 2).await?;
    assert!(removed, "the current version deletes the key");
    assert!(store.get(&key).await?.is_none());

    let removed = store.delete_if_version(&key, 2).await?;
    assert!(!removed, "a missing key reports nothing removed");
    Ok(())
}

async fn test_compare_and_swap(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Job, "cas-version");

    store.set(&key, "initial").await?;

    let result = store.compare_and_swap(&key, 999, "updated").await?;
    assert!(
        matches!(result, CasResult::Conflict { current_version: 1, .. }),
        "CAS with wrong version should conflict"
    );

    let result = store.compare_and_swap(&key, 1, "updated").await?;
    assert_eq!(
        result,
        CasResult::Ok,
        "CAS with correct version should succeed"
    );

    let val = store.get(&key).await?;
    assert_eq!(val.as_deref(), Some("updated"));

    let stale = store.compare_and_swap(&key, 1, "stale").await?;
    assert!(
        matches!(stale, CasResult::Conflict { .. }),
        "reusing a consumed version should conflict"
    );
    Ok(())
}

async fn test_compare_and_swap_create(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Job, "cas-create");

    let result = store.compare_and_swap(&key, 0, "first").await?;
    assert_eq!(result, CasResult::Ok, "version 0 creates a missing key");

    let result = store.compare_and_swap(&key, 0, "second").await?;
    assert!(
        matches!(result, CasResult::Conflict { .. }),
        "version 0 must not overwrite an existing key"
    );
    assert_eq!(store.get(&key).await?.as_deref(), Some("first"));
    Ok(())
}

async fn test_versions_advance(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Job, "versions");
    store.check_and_set(&key, "a").await?;
    let first = store.get_versioned(&key).await?.map(|v| v.version);
    assert_eq!(first, Some(1), "claimed keys start at version 1");

    store.set(&key, "b").await?;
    let second = store.get_versioned(&key).await?;
    assert_eq!(
        second.map(|v| (v.value, v.version)),
        Some(("b".to_owned(), 2))
    );
    Ok(())
}

async fn test_scan_keys(store: &dyn StateStore) -> Result<(), StateError> {
    let mine = StateKey::new("scan-ns", "tenant-a", KeyKind::Job, "job-1");
    let other_tenant = StateKey::new("scan-ns", "tenant-b", KeyKind::Job, "job-2");
    let other_kind = StateKey::new("scan-ns", "tenant-a", KeyKind::ActiveJob, "slot-1");
    store.set(&mine, "one").await?;
    store.set(&other_tenant, "two").await?;
    store.check_and_set(&other_kind, "three").await?;

    let found = store
        .scan_keys("scan-ns", "tenant-a", KeyKind::Job, None)
        .await?;
    assert_eq!(
        found,
        vec![(mine.canonical(), "one".to_owned())],
        "scan is scoped to namespace, tenant and kind"
    );

    let prefixed = store
        .scan_keys("scan-ns", "tenant-a", KeyKind::Job, Some("nope"))
        .await?;
    assert!(prefixed.is_empty());
    Ok(())
}
