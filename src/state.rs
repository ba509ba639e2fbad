use crate::adapters::{
    AesGcmCodec, BusEventSink, MemoryNotificationDirectory, StaticLocalizer, TokioTimeProvider,
    WebPushTransport,
};
use crate::config::AppConfig;
use crate::dispatch::Dispatcher;
use crate::formatter::{DefaultFormatter, FormatterRegistry, MentionFormatter};
use crate::keys::KeyManager;
use crate::ports::{EventSink, Localizer};
use crate::store::SubscriptionStore;
use crate::subscriptions::SubscriptionService;
use crate::types::{Dir, Locale};

use std::sync::Arc;

pub type Engine = Dispatcher<TokioTimeProvider, WebPushTransport>;

const EVENT_BUS_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub engine: Engine,
    pub subscriptions: Arc<SubscriptionService>,
    pub directory: Arc<MemoryNotificationDirectory>,
    pub events: Arc<BusEventSink>,
}

impl AppState {
    /// Wires the engine from configuration. Invalid wiring (bad codec key,
    /// unreadable store) is a deployment error and panics at startup.
    pub fn from_config(config: AppConfig) -> Self {
        let codec = AesGcmCodec::from_base64(&config.codec_key)
            .unwrap_or_else(|err| panic!("invalid codec key: {err}"));
        let keys = Arc::new(KeyManager::open(
            config.data_dir.join("vapid.json"),
            Arc::new(codec),
        ));
        let store = SubscriptionStore::open(config.data_dir.join("subscriptions.json"))
            .unwrap_or_else(|err| panic!("failed to open subscription store: {err}"));
        let events = Arc::new(BusEventSink::new(EVENT_BUS_CAPACITY));
        let subscriptions = Arc::new(SubscriptionService::new(
            Arc::new(store),
            events.clone() as Arc<dyn EventSink>,
        ));
        let directory = Arc::new(MemoryNotificationDirectory::default());
        let localizer: Arc<dyn Localizer> = Arc::new(StaticLocalizer::new(Locale {
            lang: config.default_lang.clone(),
            dir: Dir::Ltr,
        }));

        let mut formatters = FormatterRegistry::new(Arc::new(DefaultFormatter::new(
            Arc::clone(&localizer),
        )));
        formatters.register(Arc::new(MentionFormatter::new(
            Arc::clone(&localizer),
            events.clone() as Arc<dyn EventSink>,
        )));

        let transport =
            WebPushTransport::new(Arc::clone(&keys), config.contact.clone(), config.ttl);
        let engine = Dispatcher::new(
            config.dispatch(),
            TokioTimeProvider,
            transport,
            keys,
            Arc::clone(&subscriptions),
            directory.clone(),
            localizer,
            events.clone() as Arc<dyn EventSink>,
            formatters,
        );

        Self {
            config,
            engine,
            subscriptions,
            directory,
            events,
        }
    }
}
