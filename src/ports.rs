use crate::errors::{CodecError, TransportError};
use crate::types::{Locale, PushResponse, Subscription, WebNotification};

use std::collections::HashMap;
use std::time::Duration;
use time::OffsetDateTime;

pub type EventParams = HashMap<String, String>;

pub trait TimeProvider: Clone + Send + Sync + 'static {
    type Sleep<'a>: Future<Output = ()> + Send + 'a
    where
        Self: 'a;

    fn now(&self) -> OffsetDateTime;
    fn sleep<'a>(&'a self, duration: Duration) -> Self::Sleep<'a>;
}

/// Web Push wire client. Any HTTP response, success or failure, resolves to
/// `Ok`; `Err` means the message could not be built or the request never got
/// an answer. Callers must treat both channels as failure signals.
pub trait PushTransport: Clone + Send + Sync + 'static {
    type Fut<'a>: Future<Output = Result<PushResponse, TransportError>> + Send + 'a
    where
        Self: 'a;

    fn send<'a>(&'a self, subscription: &'a Subscription, payload: &'a [u8]) -> Self::Fut<'a>;
}

/// Outbound host event bus. Publishing must never block or fail the engine.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &str, source: &str, params: EventParams);
}

/// The host's web notification store.
pub trait NotificationDirectory: Send + Sync {
    fn notification(&self, id: u64) -> Option<WebNotification>;
    fn mark_read(&self, id: u64);
}

/// Host locale and shared-label lookup. Implementations fall back to a system
/// default instead of erroring.
pub trait Localizer: Send + Sync {
    fn locale(&self, username: &str) -> Locale;
    fn shared_label(&self, key: &str, lang: &str) -> String;
}

/// Deployment-wide symmetric codec for secrets persisted at rest.
pub trait SecretCodec: Send + Sync {
    fn seal(&self, value: &str) -> Result<String, CodecError>;
    fn open(&self, sealed: &str) -> Result<String, CodecError>;
}
