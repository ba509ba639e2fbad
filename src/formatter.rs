use crate::ports::{EventParams, EventSink, Localizer};
use crate::types::{Locale, NotificationMessage, WebNotification};

use std::collections::HashMap;
use std::sync::Arc;

pub const MARK_READ_ACTION: &str = "markRead";
pub const MARK_READ_LABEL_KEY: &str = "notification.action.markRead";

pub const LIKE_ACTION: &str = "like";
pub const LIKE_LABEL_KEY: &str = "notification.action.like";

/// Broadcast when a formatter handles an in-notification like action; the
/// host applies the actual write.
pub const ACTION_LIKED: &str = "push.action.like";

/// Turns a host web notification into a push payload. `process` is pure over
/// the event parameters apart from read-only localizer lookups;
/// `handle_action` is the one place a formatter performs a write.
pub trait Formatter: Send + Sync {
    fn id(&self) -> &str;

    fn process(&self, notification: &WebNotification, locale: &Locale) -> NotificationMessage;

    fn handle_action(&self, _notification: &WebNotification, _action: &str, _username: &str) {}
}

/// Dispatch table keyed by the plugin id carried on the notification event.
/// Registration is wiring-time configuration: a duplicate id is a programming
/// error and panics at startup.
pub struct FormatterRegistry {
    formatters: HashMap<String, Arc<dyn Formatter>>,
    fallback: Arc<dyn Formatter>,
}

impl FormatterRegistry {
    pub fn new(fallback: Arc<dyn Formatter>) -> Self {
        Self {
            formatters: HashMap::new(),
            fallback,
        }
    }

    pub fn register(&mut self, formatter: Arc<dyn Formatter>) {
        let id = formatter.id().to_string();
        if self.formatters.contains_key(&id) {
            panic!("formatter id '{id}' registered twice");
        }
        self.formatters.insert(id, formatter);
    }

    pub fn resolve(&self, plugin_id: &str) -> &Arc<dyn Formatter> {
        self.formatters.get(plugin_id).unwrap_or(&self.fallback)
    }
}

/// Fallback for notification types without a dedicated formatter: localized
/// title by plugin id, body straight from the event parameters.
pub struct DefaultFormatter {
    localizer: Arc<dyn Localizer>,
}

impl DefaultFormatter {
    pub fn new(localizer: Arc<dyn Localizer>) -> Self {
        Self { localizer }
    }
}

impl Formatter for DefaultFormatter {
    fn id(&self) -> &str {
        "default"
    }

    fn process(&self, notification: &WebNotification, locale: &Locale) -> NotificationMessage {
        let title_key = format!("notification.{}.title", notification.plugin);
        let label = self.localizer.shared_label(&title_key, &locale.lang);
        let title = if label == title_key {
            notification
                .param("title")
                .unwrap_or(&notification.plugin)
                .to_string()
        } else {
            label
        };
        NotificationMessage {
            title,
            body: notification.param("body").map(str::to_string),
            url: notification.param("url").map(str::to_string),
            ..NotificationMessage::default()
        }
    }
}

/// Formatter for mention events: localized "{0} mentioned you" title, post
/// excerpt as body, permanent link as url, and a like button when the mention
/// points at an activity the user can like.
pub struct MentionFormatter {
    localizer: Arc<dyn Localizer>,
    events: Arc<dyn EventSink>,
}

impl MentionFormatter {
    pub const ID: &'static str = "MentionPlugin";
    const TITLE_LABEL_KEY: &'static str = "notification.MentionPlugin.title";

    pub fn new(localizer: Arc<dyn Localizer>, events: Arc<dyn EventSink>) -> Self {
        Self { localizer, events }
    }

    fn sender<'a>(&self, notification: &'a WebNotification) -> &'a str {
        notification
            .from
            .as_deref()
            .or_else(|| notification.param("sender"))
            .unwrap_or("someone")
    }
}

impl Formatter for MentionFormatter {
    fn id(&self) -> &str {
        Self::ID
    }

    fn process(&self, notification: &WebNotification, locale: &Locale) -> NotificationMessage {
        let template = self
            .localizer
            .shared_label(Self::TITLE_LABEL_KEY, &locale.lang);
        let mut message = NotificationMessage {
            title: template.replace("{0}", self.sender(notification)),
            body: notification.param("body").map(str::to_string),
            url: notification.param("url").map(str::to_string),
            ..NotificationMessage::default()
        };
        if notification.param("activityId").is_some() {
            message.add_action_if_absent(
                LIKE_ACTION,
                &self.localizer.shared_label(LIKE_LABEL_KEY, &locale.lang),
            );
        }
        message
    }

    fn handle_action(&self, notification: &WebNotification, action: &str, username: &str) {
        if action != LIKE_ACTION {
            return;
        }
        let Some(activity_id) = notification.param("activityId") else {
            return;
        };
        let mut params = EventParams::new();
        params.insert("activityId".to_string(), activity_id.to_string());
        params.insert("notificationId".to_string(), notification.id.to_string());
        self.events.publish(ACTION_LIKED, username, params);
    }
}
