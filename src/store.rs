use crate::errors::StoreError;
use crate::types::Subscription;

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

/// Durable keyed map of per-user push subscriptions, persisted as one JSON
/// file and rewritten on every mutation. The store is a dumb map partitioned
/// by username; lifecycle rules (endpoint dedup, events) live in the
/// subscription service.
pub struct SubscriptionStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, BTreeMap<String, Subscription>>>,
}

impl SubscriptionStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// All subscriptions for a user; empty when the user has none.
    pub fn get(&self, username: &str) -> Vec<Subscription> {
        let entries = self.entries.lock().expect("subscription store lock");
        entries
            .get(username)
            .map(|subscriptions| subscriptions.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Upserts by subscription id within the user's partition.
    pub fn create(&self, subscription: Subscription, username: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().expect("subscription store lock");
        entries
            .entry(username.to_string())
            .or_default()
            .insert(subscription.id.clone(), subscription);
        self.persist(&entries)
    }

    /// Removes and returns the removed subscription, so callers can react to
    /// "did this actually exist" without a second read.
    pub fn delete(&self, id: &str, username: &str) -> Result<Option<Subscription>, StoreError> {
        let mut entries = self.entries.lock().expect("subscription store lock");
        let (removed, user_empty) = match entries.get_mut(username) {
            Some(subscriptions) => (subscriptions.remove(id), subscriptions.is_empty()),
            None => (None, false),
        };
        if user_empty {
            entries.remove(username);
        }
        if removed.is_some() {
            self.persist(&entries)?;
        }
        Ok(removed)
    }

    pub fn delete_all(&self, username: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().expect("subscription store lock");
        if entries.remove(username).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn len(&self, username: &str) -> usize {
        let entries = self.entries.lock().expect("subscription store lock");
        entries.get(username).map(BTreeMap::len).unwrap_or(0)
    }

    fn persist(
        &self,
        entries: &HashMap<String, BTreeMap<String, Subscription>>,
    ) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(entries)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
pub(crate) mod tests {
    use super::*;
    use crate::types::DeviceKind;

    pub(crate) fn temp_path(test: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("pushgate-{test}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&path);
        path.push("subscriptions.json");
        path
    }

    pub(crate) fn subscription(id: &str, endpoint: &str) -> Subscription {
        Subscription {
            id: id.to_string(),
            endpoint: endpoint.to_string(),
            p256dh_key: "p256".to_string(),
            auth_secret: "auth".to_string(),
            device_kind: DeviceKind::Desktop,
        }
    }

    #[test]
    fn get__should_return_empty_for_unknown_user() {
        // Given
        let store = SubscriptionStore::open(temp_path("store-empty")).expect("open store");

        // Then
        assert!(store.get("nobody").is_empty());
    }

    #[test]
    fn create__should_partition_by_username() {
        // Given
        let store = SubscriptionStore::open(temp_path("store-partition")).expect("open store");

        // When
        store
            .create(subscription("a", "https://push.example/a"), "alice")
            .expect("create");
        store
            .create(subscription("b", "https://push.example/b"), "bob")
            .expect("create");

        // Then
        assert_eq!(store.get("alice").len(), 1);
        assert_eq!(store.get("bob").len(), 1);
        assert_eq!(store.get("alice")[0].id, "a");
    }

    #[test]
    fn delete__should_return_removed_subscription() {
        // Given
        let store = SubscriptionStore::open(temp_path("store-delete")).expect("open store");
        store
            .create(subscription("a", "https://push.example/a"), "alice")
            .expect("create");

        // When
        let removed = store.delete("a", "alice").expect("delete");

        // Then
        assert_eq!(removed.expect("removed").endpoint, "https://push.example/a");
        assert!(store.get("alice").is_empty());
    }

    #[test]
    fn delete__should_be_idempotent_for_missing_id() {
        // Given
        let store = SubscriptionStore::open(temp_path("store-delete-missing")).expect("open store");

        // Then
        assert!(store.delete("ghost", "alice").expect("delete").is_none());
        assert!(store.delete("ghost", "alice").expect("delete").is_none());
    }

    #[test]
    fn delete_all__should_clear_only_that_user() {
        // Given
        let store = SubscriptionStore::open(temp_path("store-delete-all")).expect("open store");
        store
            .create(subscription("a", "https://push.example/a"), "alice")
            .expect("create");
        store
            .create(subscription("b", "https://push.example/b"), "alice")
            .expect("create");
        store
            .create(subscription("c", "https://push.example/c"), "bob")
            .expect("create");

        // When
        store.delete_all("alice").expect("delete all");

        // Then
        assert!(store.get("alice").is_empty());
        assert_eq!(store.get("bob").len(), 1);
    }

    #[test]
    fn open__should_reload_persisted_state() {
        // Given
        let path = temp_path("store-reload");
        {
            let store = SubscriptionStore::open(path.clone()).expect("open store");
            store
                .create(subscription("a", "https://push.example/a"), "alice")
                .expect("create");
        }

        // When
        let reopened = SubscriptionStore::open(path).expect("reopen store");

        // Then
        let subscriptions = reopened.get("alice");
        assert_eq!(subscriptions.len(), 1);
        assert_eq!(subscriptions[0].device_kind, DeviceKind::Desktop);
    }
}
