use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::{URL_SAFE_NO_PAD, decode_config, encode_config};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::broadcast;

use crate::errors::{CodecError, TransportError};
use crate::keys::KeyManager;
use crate::ports::{
    EventParams, EventSink, Localizer, NotificationDirectory, PushTransport, SecretCodec,
    TimeProvider,
};
use crate::types::{Locale, PushResponse, Subscription, WebNotification};

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimeProvider;

impl TimeProvider for TokioTimeProvider {
    type Sleep<'a>
        = tokio::time::Sleep
    where
        Self: 'a;

    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    fn sleep<'a>(&'a self, duration: Duration) -> Self::Sleep<'a> {
        tokio::time::sleep(duration)
    }
}

/// Web Push wire client: message built with the `web-push` crate (aes128gcm
/// payload encryption + VAPID signature), POSTed with a shared reqwest client
/// so the raw status line and response body stay observable. Stateless beyond
/// the client handle; safe for concurrent use.
#[derive(Clone)]
pub struct WebPushTransport {
    keys: Arc<KeyManager>,
    http: reqwest::Client,
    subject: String,
    ttl: u32,
}

impl WebPushTransport {
    pub fn new(keys: Arc<KeyManager>, subject: String, ttl: u32) -> Self {
        Self {
            keys,
            http: reqwest::Client::new(),
            subject,
            ttl,
        }
    }

    fn build_message(
        &self,
        subscription: &Subscription,
        payload: &[u8],
    ) -> Result<web_push::WebPushMessage, TransportError> {
        let subscription_info = web_push::SubscriptionInfo::new(
            subscription.endpoint.clone(),
            subscription.p256dh_key.clone(),
            subscription.auth_secret.clone(),
        );
        let private_key = self.keys.private_key_string()?;
        let mut builder = web_push::WebPushMessageBuilder::new(&subscription_info)?;
        builder.set_payload(web_push::ContentEncoding::Aes128Gcm, payload);
        builder.set_ttl(self.ttl);
        let mut signature_builder = web_push::VapidSignatureBuilder::from_base64(
            &private_key,
            web_push::URL_SAFE_NO_PAD,
            &subscription_info,
        )?;
        signature_builder.add_claim("sub", self.subject.as_str());
        builder.set_vapid_signature(signature_builder.build()?);
        Ok(builder.build()?)
    }
}

impl PushTransport for WebPushTransport {
    type Fut<'a>
        = Pin<Box<dyn Future<Output = Result<PushResponse, TransportError>> + Send + 'a>>
    where
        Self: 'a;

    fn send<'a>(&'a self, subscription: &'a Subscription, payload: &'a [u8]) -> Self::Fut<'a> {
        Box::pin(async move {
            let message = self.build_message(subscription, payload)?;
            let mut request = self
                .http
                .post(message.endpoint.to_string())
                .header("TTL", message.ttl.to_string());
            let body = match message.payload {
                Some(payload) => {
                    for (name, value) in &payload.crypto_headers {
                        request = request.header(*name, value.as_str());
                    }
                    request = request.header("Content-Encoding", "aes128gcm");
                    payload.content
                }
                None => Vec::new(),
            };
            let response = request.body(body).send().await?;
            let status = response.status().as_u16();
            // Best-effort read; an unreadable error body must not mask the
            // status we already have.
            let body = response.text().await.unwrap_or_default();
            Ok(PushResponse { status, body })
        })
    }
}

/// AES-256-GCM codec for secrets persisted at rest. Sealed form is
/// base64url(nonce || ciphertext) with a fresh random 12-byte nonce per seal.
pub struct AesGcmCodec {
    cipher: Aes256Gcm,
}

const NONCE_LEN: usize = 12;

impl AesGcmCodec {
    pub fn from_base64(key: &str) -> Result<Self, CodecError> {
        let bytes = decode_config(key.trim(), URL_SAFE_NO_PAD).map_err(|_| CodecError::Encoding)?;
        if bytes.len() != 32 {
            return Err(CodecError::InvalidKey {
                expected: 32,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&bytes)),
        })
    }

    pub fn generate_key() -> String {
        let mut rng = OsRng;
        generate_codec_key_with_rng(&mut rng)
    }
}

pub(crate) fn generate_codec_key_with_rng<R: RngCore + CryptoRng>(rng: &mut R) -> String {
    let mut bytes = [0u8; 32];
    rng.fill_bytes(&mut bytes);
    encode_config(bytes, URL_SAFE_NO_PAD)
}

impl SecretCodec for AesGcmCodec {
    fn seal(&self, value: &str) -> Result<String, CodecError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), value.as_bytes())
            .map_err(|_| CodecError::Encrypt)?;
        let mut sealed = nonce_bytes.to_vec();
        sealed.extend_from_slice(&ciphertext);
        Ok(encode_config(sealed, URL_SAFE_NO_PAD))
    }

    fn open(&self, sealed: &str) -> Result<String, CodecError> {
        let bytes = decode_config(sealed, URL_SAFE_NO_PAD).map_err(|_| CodecError::Encoding)?;
        if bytes.len() < NONCE_LEN {
            return Err(CodecError::Truncated);
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CodecError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|_| CodecError::Decrypt)
    }
}

/// One record on the outbound host bus.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub event: String,
    pub source: String,
    pub params: EventParams,
}

/// Event-bus adapter: logs every record and forwards it to a tokio broadcast
/// channel the host subscribes to. A lagging or absent receiver never blocks
/// the engine.
pub struct BusEventSink {
    sender: broadcast::Sender<EventRecord>,
}

impl BusEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.sender.subscribe()
    }
}

impl EventSink for BusEventSink {
    fn publish(&self, event: &str, source: &str, params: EventParams) {
        tracing::debug!(event, source, "broadcast engine event");
        let _ = self.sender.send(EventRecord {
            event: event.to_string(),
            source: source.to_string(),
            params,
        });
    }
}

/// In-memory notification directory fed by the HTTP ingress; stands in for
/// the host's notification store.
#[derive(Default)]
pub struct MemoryNotificationDirectory {
    entries: Mutex<HashMap<u64, WebNotification>>,
}

impl MemoryNotificationDirectory {
    pub fn insert(&self, notification: WebNotification) {
        let mut entries = self.entries.lock().expect("notification directory lock");
        entries.insert(notification.id, notification);
    }
}

impl NotificationDirectory for MemoryNotificationDirectory {
    fn notification(&self, id: u64) -> Option<WebNotification> {
        let entries = self.entries.lock().expect("notification directory lock");
        entries.get(&id).cloned()
    }

    fn mark_read(&self, id: u64) {
        let mut entries = self.entries.lock().expect("notification directory lock");
        if let Some(notification) = entries.get_mut(&id) {
            notification.read = true;
        }
    }
}

/// Localizer with a fixed locale and built-in labels; the host swaps in its
/// own resource-bundle lookup.
pub struct StaticLocalizer {
    default_locale: Locale,
}

impl StaticLocalizer {
    pub fn new(default_locale: Locale) -> Self {
        Self { default_locale }
    }
}

impl Localizer for StaticLocalizer {
    fn locale(&self, _username: &str) -> Locale {
        self.default_locale.clone()
    }

    fn shared_label(&self, key: &str, _lang: &str) -> String {
        match key {
            crate::formatter::MARK_READ_LABEL_KEY => "Mark as read".to_string(),
            crate::formatter::LIKE_LABEL_KEY => "Like".to_string(),
            "notification.MentionPlugin.title" => "{0} mentioned you".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use crate::types::DeviceKind;
    use std::path::PathBuf;

    struct IdentityCodec;

    impl SecretCodec for IdentityCodec {
        fn seal(&self, value: &str) -> Result<String, CodecError> {
            Ok(value.to_string())
        }

        fn open(&self, sealed: &str) -> Result<String, CodecError> {
            Ok(sealed.to_string())
        }
    }

    fn temp_key_path(test: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("pushgate-{test}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&path);
        path.push("vapid.json");
        path
    }

    // Known-valid P-256 point so payload encryption succeeds in tests.
    const P256DH_FIXTURE: &str =
        "BCRweRf_U5iQM4pKNucGRzM6OuLp8Hisa8yX0N2ePIf1oxKitvFT6qvuGgYoTxlMatMDaytXbZR3rVClc2w_p6U";
    const AUTH_FIXTURE: &str = "AAAAAAAAAAAAAAAAAAAAAA";

    #[test]
    fn generate_codec_key_with_rng__should_produce_a_32_byte_key() {
        // Given
        use rand::SeedableRng;
        let mut rng = rand::rngs::StdRng::from_seed([7u8; 32]);

        // When
        let key = generate_codec_key_with_rng(&mut rng);

        // Then
        let bytes = decode_config(&key, URL_SAFE_NO_PAD).expect("decode key");
        assert_eq!(bytes.len(), 32);
        assert!(AesGcmCodec::from_base64(&key).is_ok());
    }

    #[test]
    fn codec__should_round_trip() {
        // Given
        let codec = AesGcmCodec::from_base64(&AesGcmCodec::generate_key()).expect("codec");

        // When
        let sealed = codec.seal("secret value").expect("seal");
        let opened = codec.open(&sealed).expect("open");

        // Then
        assert_eq!(opened, "secret value");
        assert_ne!(sealed, "secret value");
    }

    #[test]
    fn codec__should_use_fresh_nonce_per_seal() {
        let codec = AesGcmCodec::from_base64(&AesGcmCodec::generate_key()).expect("codec");

        let first = codec.seal("secret value").expect("seal");
        let second = codec.seal("secret value").expect("seal");

        assert_ne!(first, second);
    }

    #[test]
    fn codec__should_reject_wrong_key() {
        // Given
        let sealing = AesGcmCodec::from_base64(&AesGcmCodec::generate_key()).expect("codec");
        let opening = AesGcmCodec::from_base64(&AesGcmCodec::generate_key()).expect("codec");
        let sealed = sealing.seal("secret value").expect("seal");

        // Then
        assert!(matches!(opening.open(&sealed), Err(CodecError::Decrypt)));
    }

    #[test]
    fn from_base64__should_reject_short_keys() {
        let short = encode_config([1u8; 16], URL_SAFE_NO_PAD);

        assert!(matches!(
            AesGcmCodec::from_base64(&short),
            Err(CodecError::InvalidKey {
                expected: 32,
                actual: 16
            })
        ));
    }

    #[test]
    fn build_message__should_encrypt_and_sign() {
        // Given
        let keys = Arc::new(KeyManager::open(
            temp_key_path("transport-build"),
            Arc::new(IdentityCodec),
        ));
        let transport =
            WebPushTransport::new(keys, "mailto:admin@example.com".to_string(), 3600);
        let subscription = Subscription {
            id: "sub-1".to_string(),
            endpoint: "https://push.example/send/abc".to_string(),
            p256dh_key: P256DH_FIXTURE.to_string(),
            auth_secret: AUTH_FIXTURE.to_string(),
            device_kind: DeviceKind::Desktop,
        };

        // When
        let message = transport
            .build_message(&subscription, b"42:open")
            .expect("build message");

        // Then
        assert_eq!(message.ttl, 3600);
        assert!(message.endpoint.to_string().starts_with("https://push.example/"));
        let payload = message.payload.expect("encrypted payload");
        assert!(!payload.content.is_empty());
        assert_ne!(payload.content.as_slice(), b"42:open");
        assert!(
            payload
                .crypto_headers
                .iter()
                .any(|(name, value)| name.eq_ignore_ascii_case("authorization")
                    && value.contains("vapid"))
        );
    }

    #[test]
    fn bus_event_sink__should_forward_records_to_subscribers() {
        // Given
        let sink = BusEventSink::new(8);
        let mut receiver = sink.subscribe();

        // When
        let mut params = EventParams::new();
        params.insert("subscriptionId".to_string(), "sub-1".to_string());
        sink.publish("push.notification.sent", "alice", params);

        // Then
        let record = receiver.try_recv().expect("record");
        assert_eq!(record.event, "push.notification.sent");
        assert_eq!(record.source, "alice");
        assert_eq!(
            record.params.get("subscriptionId").map(String::as_str),
            Some("sub-1")
        );
    }

    #[test]
    fn bus_event_sink__should_not_fail_without_subscribers() {
        let sink = BusEventSink::new(8);

        sink.publish("push.notification.sent", "alice", EventParams::new());
    }

    #[test]
    fn memory_directory__should_mark_notifications_read() {
        // Given
        let directory = MemoryNotificationDirectory::default();
        directory.insert(WebNotification {
            id: 42,
            to: Some("alice".to_string()),
            ..WebNotification::default()
        });

        // When
        directory.mark_read(42);

        // Then
        assert!(directory.notification(42).expect("notification").read);
        assert!(directory.notification(43).is_none());
    }
}
