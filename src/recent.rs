//! Recently used server addresses
//!
//! A most-recent-first list of at most five distinct addresses, stored as a
//! JSON array of strings in `recent_ips.json` under the data directory.
//! Missing or malformed data loads as an empty list.

use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{RECENT_ADDRESSES_KEY, RECENT_ADDRESS_CAPACITY};
use crate::error::StoreError;

/// Persistent recent address list
pub struct RecentAddressStore {
    path: PathBuf,
    /// Serializes read-modify-persist
    lock: Mutex<()>,
}

impl RecentAddressStore {
    /// Store backed by `<dir>/recent_ips.json`
    pub fn open(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", RECENT_ADDRESSES_KEY)),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persisted list, or empty when absent or unreadable
    pub fn load(&self) -> Vec<String> {
        let _guard = self.lock.lock();
        self.read()
    }

    /// Move `address` to the front, keep five, persist. Returns the new list.
    pub fn push(&self, address: &str) -> Result<Vec<String>, StoreError> {
        let address = address.trim();
        let _guard = self.lock.lock();

        let current = self.read();
        if address.is_empty() {
            return Ok(current);
        }

        let updated = push_front(current, address);
        self.write(&updated)?;
        tracing::debug!("Recent addresses: {:?}", updated);
        Ok(updated)
    }

    fn read(&self) -> Vec<String> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };

        match decode(&text) {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!("Ignoring {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    fn write(&self, list: &[String]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(list).map_err(|e| StoreError::Encode(e.to_string()))?;

        // Write-then-rename so a crash never leaves half a file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Decode a persisted list, restoring the uniqueness and size invariants
pub fn decode(text: &str) -> Result<Vec<String>, StoreError> {
    let raw: Vec<String> = serde_json::from_str(text)?;

    let mut list: Vec<String> = Vec::with_capacity(RECENT_ADDRESS_CAPACITY);
    for address in raw {
        if list.len() == RECENT_ADDRESS_CAPACITY {
            break;
        }
        if !address.is_empty() && !list.contains(&address) {
            list.push(address);
        }
    }
    Ok(list)
}

/// Remove `address`, insert it first, truncate to capacity
pub fn push_front(mut list: Vec<String>, address: &str) -> Vec<String> {
    list.retain(|a| a != address);
    list.insert(0, address.to_string());
    list.truncate(RECENT_ADDRESS_CAPACITY);
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_push_keeps_five_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecentAddressStore::open(dir.path());

        for ip in ["a", "b", "c", "d", "e", "f"] {
            store.push(ip).unwrap();
        }

        assert_eq!(store.load(), list(&["f", "e", "d", "c", "b"]));
    }

    #[test]
    fn test_repush_moves_to_front() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecentAddressStore::open(dir.path());

        for ip in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
            store.push(ip).unwrap();
        }
        let updated = store.push("10.0.0.1").unwrap();

        assert_eq!(updated, list(&["10.0.0.1", "10.0.0.3", "10.0.0.2"]));
        assert_eq!(store.load(), updated);
    }

    #[test]
    fn test_never_written_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecentAddressStore::open(dir.path());
        assert!(store.load().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_corrupt_data_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecentAddressStore::open(dir.path());

        for bad in ["not json", "{\"a\": 1}", "[1, 2, 3]", "[\"ok\", "] {
            fs::write(store.path(), bad).unwrap();
            assert!(store.load().is_empty(), "{:?} should load empty", bad);
        }

        // A push over corrupt data starts a fresh list
        assert_eq!(store.push("10.0.0.5").unwrap(), list(&["10.0.0.5"]));
    }

    #[test]
    fn test_persisted_format_is_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecentAddressStore::open(dir.path());
        store.push("10.0.0.5").unwrap();
        store.push("cam.local").unwrap();

        let text = fs::read_to_string(dir.path().join("recent_ips.json")).unwrap();
        assert_eq!(text, r#"["cam.local","10.0.0.5"]"#);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        RecentAddressStore::open(dir.path()).push("10.0.0.5").unwrap();
        assert_eq!(RecentAddressStore::open(dir.path()).load(), list(&["10.0.0.5"]));
    }

    #[test]
    fn test_empty_address_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecentAddressStore::open(dir.path());
        assert!(store.push("   ").unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_decode_normalizes_hand_edited_lists() {
        let decoded = decode(r#"["a","a","","b","c","d","e","f"]"#).unwrap();
        assert_eq!(decoded, list(&["a", "b", "c", "d", "e"]));
    }

    #[test]
    fn test_concurrent_pushes_keep_invariants() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(RecentAddressStore::open(dir.path()));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..20 {
                        store.push(&format!("10.0.{}.{}", t, i % 7)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let loaded = store.load();
        let unique: HashSet<_> = loaded.iter().collect();
        assert_eq!(loaded.len(), RECENT_ADDRESS_CAPACITY);
        assert_eq!(unique.len(), loaded.len());
    }

    proptest! {
        #[test]
        fn prop_push_front_invariants(pushes in prop::collection::vec("[a-e]{1,2}", 1..40)) {
            let mut current = Vec::new();
            for address in &pushes {
                let before: HashSet<String> = current.iter().cloned().collect();
                let was_present = before.contains(address);
                let before_len = current.len();

                current = push_front(current, address);

                let unique: HashSet<&String> = current.iter().collect();
                prop_assert_eq!(unique.len(), current.len());
                prop_assert!(current.len() <= RECENT_ADDRESS_CAPACITY);
                prop_assert_eq!(&current[0], address);

                if was_present {
                    let after: HashSet<String> = current.iter().cloned().collect();
                    prop_assert_eq!(after, before);
                    prop_assert_eq!(current.len(), before_len);
                }
            }
        }
    }
}
