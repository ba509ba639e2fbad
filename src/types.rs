use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Rough device classification derived from the registering client's
/// user-agent. Informational only; delivery treats all kinds the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    Desktop,
    Mobile,
    Tablet,
    Robot,
}

impl DeviceKind {
    pub fn from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_ascii_lowercase();
        if ua.contains("bot") || ua.contains("crawler") || ua.contains("spider") {
            DeviceKind::Robot
        } else if ua.contains("ipad")
            || ua.contains("tablet")
            || (ua.contains("android") && !ua.contains("mobile"))
        {
            // Android tablets omit the "Mobile" token.
            DeviceKind::Tablet
        } else if ua.contains("mobi") || ua.contains("iphone") || ua.contains("android") {
            DeviceKind::Mobile
        } else {
            DeviceKind::Desktop
        }
    }
}

/// One browser/device push endpoint owned by one user. The `(owner, endpoint)`
/// pair is unique; the owner is the store partition key and is not repeated
/// here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    pub endpoint: String,
    pub p256dh_key: String,
    pub auth_secret: String,
    pub device_kind: DeviceKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dir {
    Ltr,
    Rtl,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locale {
    pub lang: String,
    pub dir: Dir,
}

impl Default for Locale {
    fn default() -> Self {
        Self {
            lang: "en".to_string(),
            dir: Dir::Ltr,
        }
    }
}

/// One action button on a displayed notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// The formatted push payload, serialized camelCase for the service worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMessage {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<Dir>,
    #[serde(default)]
    pub actions: Vec<NotificationAction>,
    #[serde(default)]
    pub require_interaction: bool,
    #[serde(default)]
    pub renotify: bool,
    #[serde(default)]
    pub silent: bool,
}

impl NotificationMessage {
    /// Appends an action button unless one with the same action id is already
    /// present. Returns whether the action was added.
    pub fn add_action_if_absent(&mut self, action: &str, title: &str) -> bool {
        if self.actions.iter().any(|a| a.action == action) {
            return false;
        }
        self.actions.push(NotificationAction {
            action: action.to_string(),
            title: title.to_string(),
        });
        true
    }
}

/// A host web notification event as handed to the engine: the addressee(s)
/// plus the key/value parameters formatters read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebNotification {
    pub id: u64,
    pub plugin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub send_to: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default)]
    pub params: HashMap<String, String>,
    #[serde(default)]
    pub read: bool,
}

impl WebNotification {
    /// The single addressee wins over the recipient list; a notification with
    /// neither yields no recipients.
    pub fn recipients(&self) -> Vec<String> {
        match &self.to {
            Some(to) => vec![to.clone()],
            None => self.send_to.clone(),
        }
    }

    pub fn is_addressee(&self, username: &str) -> bool {
        match &self.to {
            Some(to) => to == username,
            None => self.send_to.iter().any(|u| u == username),
        }
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// Raw HTTP outcome of one push delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushResponse {
    pub status: u16,
    pub body: String,
}

impl PushResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
