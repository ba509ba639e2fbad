use crate::ports::{EventParams, EventSink};
use crate::store::SubscriptionStore;
use crate::types::Subscription;

use std::sync::Arc;

pub const SUBSCRIPTION_INSTALLED: &str = "push.subscription.installed";
pub const SUBSCRIPTION_UNINSTALLED: &str = "push.subscription.uninstalled";

pub const PARAM_SUBSCRIPTION_ID: &str = "subscriptionId";
pub const PARAM_DEVICE_KIND: &str = "deviceKind";

/// Lifecycle rules over the raw store: endpoint dedup on registration,
/// installed/uninstalled events, and the system-initiated cleanup path that
/// stays silent towards the user.
pub struct SubscriptionService {
    store: Arc<SubscriptionStore>,
    events: Arc<dyn EventSink>,
}

impl SubscriptionService {
    pub fn new(store: Arc<SubscriptionStore>, events: Arc<dyn EventSink>) -> Self {
        Self { store, events }
    }

    pub fn subscriptions(&self, username: &str) -> Vec<Subscription> {
        self.store.get(username)
    }

    /// Idempotent per `(owner, endpoint)`: re-registering an endpoint the user
    /// already has is a no-op.
    pub fn create(&self, subscription: Subscription, username: &str) {
        let existing = self.store.get(username);
        if existing.iter().any(|s| s.endpoint == subscription.endpoint) {
            tracing::debug!(
                username,
                endpoint = endpoint_domain(&subscription.endpoint),
                "subscription for endpoint already exists"
            );
            return;
        }
        tracing::info!(
            username,
            subscription_id = %subscription.id,
            endpoint = endpoint_domain(&subscription.endpoint),
            "create new subscription"
        );
        let mut params = EventParams::new();
        params.insert(PARAM_SUBSCRIPTION_ID.to_string(), subscription.id.clone());
        params.insert(
            PARAM_DEVICE_KIND.to_string(),
            format!("{:?}", subscription.device_kind),
        );
        match self.store.create(subscription, username) {
            Ok(()) => self.events.publish(SUBSCRIPTION_INSTALLED, username, params),
            Err(err) => tracing::warn!(username, error = %err, "failed to persist subscription"),
        }
    }

    /// User-initiated removal; broadcasts the uninstalled event when something
    /// was actually removed.
    pub fn delete(&self, id: &str, username: &str) -> Option<Subscription> {
        self.remove(id, username, true)
    }

    /// Engine-initiated cleanup of an endpoint the push service reported gone.
    /// Never broadcasts the user-facing uninstalled event.
    pub fn delete_system(&self, id: &str, username: &str) -> Option<Subscription> {
        self.remove(id, username, false)
    }

    pub fn delete_all(&self, username: &str) {
        for subscription in self.store.get(username) {
            self.remove(&subscription.id, username, true);
        }
    }

    fn remove(&self, id: &str, username: &str, user_action: bool) -> Option<Subscription> {
        match self.store.delete(id, username) {
            Ok(Some(subscription)) => {
                if user_action {
                    let mut params = EventParams::new();
                    params.insert(PARAM_SUBSCRIPTION_ID.to_string(), subscription.id.clone());
                    self.events
                        .publish(SUBSCRIPTION_UNINSTALLED, username, params);
                }
                Some(subscription)
            }
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(username, subscription_id = id, error = %err, "failed to delete subscription");
                None
            }
        }
    }
}

/// Scheme and host of an endpoint, for logs that must not leak the full
/// capability URL.
pub(crate) fn endpoint_domain(endpoint: &str) -> &str {
    let start = endpoint.find("://").map(|idx| idx + 3).unwrap_or(0);
    match endpoint[start..].find('/') {
        Some(idx) => &endpoint[..start + idx],
        None => endpoint,
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
pub(crate) mod tests {
    use super::*;
    use crate::store::tests::{subscription, temp_path};
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct RecordingEvents {
        pub(crate) published: Mutex<Vec<(String, String, EventParams)>>,
    }

    impl RecordingEvents {
        pub(crate) fn events(&self) -> Vec<(String, String, EventParams)> {
            self.published.lock().expect("events lock").clone()
        }

        pub(crate) fn named(&self, event: &str) -> Vec<(String, String, EventParams)> {
            self.events()
                .into_iter()
                .filter(|(name, _, _)| name == event)
                .collect()
        }
    }

    impl EventSink for RecordingEvents {
        fn publish(&self, event: &str, source: &str, params: EventParams) {
            self.published.lock().expect("events lock").push((
                event.to_string(),
                source.to_string(),
                params,
            ));
        }
    }

    fn service(test: &str) -> (SubscriptionService, Arc<RecordingEvents>) {
        let store = Arc::new(SubscriptionStore::open(temp_path(test)).expect("open store"));
        let events = Arc::new(RecordingEvents::default());
        (
            SubscriptionService::new(store, events.clone() as Arc<dyn EventSink>),
            events,
        )
    }

    #[test]
    fn create__should_ignore_duplicate_endpoint_for_same_user() {
        // Given
        let (service, events) = service("service-dup");
        service.create(subscription("a", "https://push.example/e1"), "alice");

        // When: same endpoint, different caller-supplied id
        service.create(subscription("a2", "https://push.example/e1"), "alice");

        // Then
        assert_eq!(service.subscriptions("alice").len(), 1);
        assert_eq!(service.subscriptions("alice")[0].id, "a");
        assert_eq!(events.named(SUBSCRIPTION_INSTALLED).len(), 1);
    }

    #[test]
    fn create__should_allow_same_endpoint_for_other_user() {
        // Given
        let (service, _) = service("service-cross-user");
        service.create(subscription("a", "https://push.example/e1"), "alice");

        // When
        service.create(subscription("b", "https://push.example/e1"), "bob");

        // Then
        assert_eq!(service.subscriptions("alice").len(), 1);
        assert_eq!(service.subscriptions("bob").len(), 1);
    }

    #[test]
    fn delete__should_broadcast_uninstalled_only_when_present() {
        // Given
        let (service, events) = service("service-delete");
        service.create(subscription("a", "https://push.example/e1"), "alice");

        // When
        let removed = service.delete("a", "alice");
        let missing = service.delete("a", "alice");

        // Then
        assert!(removed.is_some());
        assert!(missing.is_none());
        assert_eq!(events.named(SUBSCRIPTION_UNINSTALLED).len(), 1);
    }

    #[test]
    fn delete_system__should_not_broadcast_uninstalled() {
        // Given
        let (service, events) = service("service-delete-system");
        service.create(subscription("a", "https://push.example/e1"), "alice");

        // When
        let removed = service.delete_system("a", "alice");

        // Then
        assert!(removed.is_some());
        assert!(events.named(SUBSCRIPTION_UNINSTALLED).is_empty());
    }

    #[test]
    fn delete_all__should_remove_every_subscription_for_the_user() {
        // Given
        let (service, events) = service("service-delete-all");
        service.create(subscription("a", "https://push.example/e1"), "alice");
        service.create(subscription("b", "https://push.example/e2"), "alice");

        // When
        service.delete_all("alice");

        // Then
        assert!(service.subscriptions("alice").is_empty());
        assert_eq!(events.named(SUBSCRIPTION_UNINSTALLED).len(), 2);
    }

    #[test]
    fn endpoint_domain__should_strip_the_capability_path() {
        assert_eq!(
            endpoint_domain("https://fcm.googleapis.com/fcm/send/abc123"),
            "https://fcm.googleapis.com"
        );
        assert_eq!(
            endpoint_domain("https://push.example"),
            "https://push.example"
        );
    }
}
