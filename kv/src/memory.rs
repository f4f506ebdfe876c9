//! In-memory key-value store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{KvError, KvResult, KvStore};

/// An in-memory key-value store backed by a HashMap.
///
/// Cloning yields another handle to the same data, which is how tests
/// simulate several processes sharing one backing medium.
#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> KvResult<MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.data.lock().map_err(|_| KvError::Poisoned)
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> KvResult<()> {
        self.lock()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> KvResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn batch_get(&self, keys: &[&str]) -> KvResult<Vec<Option<Vec<u8>>>> {
        let data = self.lock()?;
        Ok(keys.iter().map(|k| data.get(*k).cloned()).collect())
    }

    fn compare_and_swap(
        &self,
        guard: &str,
        expected: Option<&[u8]>,
        entries: &[(&str, &[u8])],
    ) -> KvResult<bool> {
        let mut data = self.lock()?;
        if data.get(guard).map(Vec::as_slice) != expected {
            return Ok(false);
        }
        for (key, value) in entries {
            data.insert(key.to_string(), value.to_vec());
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        let store = MemoryStore::new();

        store.set("key1", b"value1").unwrap();
        assert_eq!(store.get("key1").unwrap(), Some(b"value1".to_vec()));
        assert_eq!(store.get("nonexistent").unwrap(), None);

        store.delete("key1").unwrap();
        assert_eq!(store.get("key1").unwrap(), None);
    }

    #[test]
    fn test_batch_get_keeps_request_order() {
        let store = MemoryStore::new();
        store.set("a", b"1").unwrap();
        store.set("b", b"2").unwrap();

        let got = store.batch_get(&["b", "missing", "a"]).unwrap();
        assert_eq!(got, vec![Some(b"2".to_vec()), None, Some(b"1".to_vec())]);
    }

    #[test]
    fn test_compare_and_swap_on_absent_guard() {
        let store = MemoryStore::new();

        assert!(store
            .compare_and_swap("rev", None, &[("rev", b"1"), ("doc", b"x")])
            .unwrap());
        // The guard now exists, so a second "create" must fail.
        assert!(!store
            .compare_and_swap("rev", None, &[("rev", b"1"), ("doc", b"y")])
            .unwrap());
        assert_eq!(store.get("doc").unwrap(), Some(b"x".to_vec()));
    }

    #[test]
    fn test_compare_and_swap_rejects_stale_value() {
        let store = MemoryStore::new();
        store.set("rev", b"2").unwrap();

        assert!(!store
            .compare_and_swap("rev", Some(b"1"), &[("rev", b"3")])
            .unwrap());
        assert_eq!(store.get("rev").unwrap(), Some(b"2".to_vec()));

        assert!(store
            .compare_and_swap("rev", Some(b"2"), &[("rev", b"3")])
            .unwrap());
        assert_eq!(store.get("rev").unwrap(), Some(b"3".to_vec()));
    }

    #[test]
    fn test_clones_share_data() {
        let a = MemoryStore::new();
        let b = a.clone();
        a.set("k", b"v").unwrap();
        assert_eq!(b.get("k").unwrap(), Some(b"v".to_vec()));
    }
}
