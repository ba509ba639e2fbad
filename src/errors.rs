use thiserror::Error;

/// User-facing failures of the notification read/update operations; the HTTP
/// adapter maps these to 404/403.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification with id {0} doesn't exist")]
    NotFound(u64),
    #[error("notification with id {0} access denied")]
    AccessDenied(u64),
}

/// Sealing/opening failures of the at-rest secret codec.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("codec key must be {expected} bytes, got {actual}")]
    InvalidKey { expected: usize, actual: usize },
    #[error("sealed value is not valid base64")]
    Encoding,
    #[error("sealed value is truncated")]
    Truncated,
    #[error("encryption failed")]
    Encrypt,
    #[error("decryption failed")]
    Decrypt,
}

/// VAPID key management failures. `Generation` disables push delivery for the
/// process until the environment is fixed; it must never crash the host.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("VAPID key generation failed: {0}")]
    Generation(String),
    #[error("VAPID key storage error: {0}")]
    Storage(#[from] std::io::Error),
    #[error("VAPID key record is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("VAPID private key codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Subscription store persistence failures; absorbed with logging on the
/// dispatch path since delivery is best-effort.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("subscription store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("subscription store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Failure to deliver to a single subscription. Never propagates past that
/// subscription; the sweep continues.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build push message: {0}")]
    Message(#[from] web_push::WebPushError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("push request failed: {0}")]
    Network(#[from] reqwest::Error),
}
