use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;

use remedy_state::error::StateError;
use remedy_state::key::{KeyKind, StateKey};
use remedy_state::store::{CasResult, StateStore, Versioned};

/// A single entry in the in-memory store.
#[derive(Debug, Clone)]
struct Entry {
    value: String,
    version: u64,
}

impl Entry {
    fn new(value: &str) -> Self {
        Self {
            value: value.to_owned(),
            version: 1,
        }
    }
}

/// In-memory [`StateStore`] backed by a [`DashMap`].
///
/// All mutations go through the map's entry API, so each key is updated
/// under its shard lock and concurrent callers see atomic check-and-set,
/// CAS and versioned delete.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    data: DashMap<String, Entry>,
}

impl MemoryStateStore {
    /// Create a new, empty in-memory state store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn check_and_set(&self, key: &StateKey, value: &str) -> Result<bool, StateError> {
        let was_inserted = match self.data.entry(key.canonical()) {
            MapEntry::Occupied(_) => false,
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry::new(value));
                true
            }
        };

        Ok(was_inserted)
    }

    async fn get_versioned(&self, key: &StateKey) -> Result<Option<Versioned>, StateError> {
        Ok(self.data.get(&key.canonical()).map(|entry| Versioned {
            value: entry.value.clone(),
            version: entry.version,
        }))
    }

    async fn set(&self, key: &StateKey, value: &str) -> Result<(), StateError> {
        self.data
            .entry(key.canonical())
            .and_modify(|entry| {
                value.clone_into(&mut entry.value);
                entry.version += 1;
            })
            .or_insert_with(|| Entry::new(value));

        Ok(())
    }

    async fn delete(&self, key: &StateKey) -> Result<bool, StateError> {
        Ok(self.data.remove(&key.canonical()).is_some())
    }

    async fn delete_if_version(
        &self,
        key: &StateKey,
        expected_version: u64,
    ) -> Result<bool, StateError> {
        Ok(self
            .data
            .remove_if(&key.canonical(), |_, entry| entry.version == expected_version)
            .is_some())
    }

    async fn compare_and_swap(
        &self,
        key: &StateKey,
        expected_version: u64,
        new_value: &str,
    ) -> Result<CasResult, StateError> {
        match self.data.entry(key.canonical()) {
            MapEntry::Vacant(vacant) => {
                if expected_version != 0 {
                    return Ok(CasResult::Conflict {
                        current_value: None,
                        current_version: 0,
                    });
                }
                vacant.insert(Entry::new(new_value));
                Ok(CasResult::Ok)
            }
            MapEntry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.version != expected_version {
                    return Ok(CasResult::Conflict {
                        current_value: Some(entry.value.clone()),
                        current_version: entry.version,
                    });
                }
                new_value.clone_into(&mut entry.value);
                entry.version += 1;
                Ok(CasResult::Ok)
            }
        }
    }

    async fn scan_keys(
        &self,
        namespace: &str,
        tenant: &str,
        kind: KeyKind,
        prefix: Option<&str>,
    ) -> Result<Vec<(String, String)>, StateError> {
        let mut pattern = StateKey::scan_prefix(namespace, tenant, &kind);
        if let Some(p) = prefix {
            pattern.push_str(p);
        }

        let mut results: Vec<(String, String)> = self
            .data
            .iter()
            .filter(|e| e.key().starts_with(&pattern))
            .map(|e| (e.key().clone(), e.value().value.clone()))
            .collect();
        results.sort();
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use remedy_state::key::{KeyKind, StateKey};
    use remedy_state::testing::run_store_conformance_tests;

    use super::*;

    fn test_key(kind: KeyKind, id: &str) -> StateKey {
        StateKey::new("test-ns", "test-tenant", kind, id)
    }

    #[tokio::test]
    async fn conformance() {
        let store = MemoryStateStore::new();
        run_store_conformance_tests(&store)
            .await
            .expect("conformance tests should pass");
    }

    #[tokio::test]
    async fn concurrent_claims_have_one_winner() {
        let store = Arc::new(MemoryStateStore::new());
        let key = test_key(KeyKind::ActiveJob, "race");

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                store
                    .check_and_set(&key, &format!("job-{i}"))
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn concurrent_cas_on_same_version_has_one_winner() {
        let store = Arc::new(MemoryStateStore::new());
        let key = test_key(KeyKind::Job, "cas-race");
        store.set(&key, "v0").await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                store
                    .compare_and_swap(&key, 1, &format!("v{i}"))
                    .await
                    .unwrap()
            }));
        }

        let mut ok = 0;
        for handle in handles {
            if handle.await.unwrap() == CasResult::Ok {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
    }

    #[tokio::test]
    async fn versioned_delete_spares_a_new_owner() {
        let store = MemoryStateStore::new();
        let key = test_key(KeyKind::ActiveJob, "bucket:TYPE");
        store.check_and_set(&key, "job-a").await.unwrap();
        let seen = store.get_versioned(&key).await.unwrap().unwrap();

        store
            .compare_and_swap(&key, seen.version, "job-b")
            .await
            .unwrap();

        assert!(!store.delete_if_version(&key, seen.version).await.unwrap());
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("job-b"));
        assert_eq!(store.len(), 1);
    }
}
