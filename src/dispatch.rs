use crate::errors::{KeyError, NotificationError};
use crate::formatter::{FormatterRegistry, MARK_READ_ACTION, MARK_READ_LABEL_KEY};
use crate::keys::KeyManager;
use crate::ports::{
    EventParams, EventSink, Localizer, NotificationDirectory, PushTransport, TimeProvider,
};
use crate::subscriptions::SubscriptionService;
use crate::types::{Locale, NotificationMessage, Subscription, WebNotification};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

pub const NOTIFICATION_CREATED: &str = "push.notification.created";
pub const NOTIFICATION_DELETED: &str = "push.notification.deleted";
pub const NOTIFICATION_ALL_DELETED: &str = "push.notification.allDeleted";

pub const NOTIFICATION_SENT: &str = "push.notification.sent";
pub const NOTIFICATION_RESPONSE_ERROR: &str = "push.notification.responseError";
pub const NOTIFICATION_SENDING_ERROR: &str = "push.notification.sendingError";
pub const OUTDATED_SUBSCRIPTION: &str = "push.notification.outdatedSubscription";

pub const PARAM_NOTIFICATION_ID: &str = "notificationId";
pub const PARAM_SUBSCRIPTION_ID: &str = "subscriptionId";
pub const PARAM_ACTION: &str = "action";
pub const PARAM_HTTP_STATUS: &str = "httpStatus";
pub const PARAM_HTTP_BODY: &str = "httpBody";
pub const PARAM_ERROR: &str = "error";
pub const PARAM_DURATION_MS: &str = "durationMs";
pub const PARAM_SENT_COUNT: &str = "sentCount";

const HTTP_GONE: u16 = 410;

/// Dummy notification id carried by the close-all payload.
const CLOSE_ALL_ID: u64 = 0;

/// UI affordance delivered to the service worker: open (display) a
/// notification, close one, or close all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UiAction {
    Open,
    Close,
    CloseAll,
}

impl UiAction {
    fn code(self) -> &'static str {
        match self {
            UiAction::Open => "open",
            UiAction::Close => "close",
            UiAction::CloseAll => "closeAll",
        }
    }
}

#[derive(Debug, Clone)]
pub enum DispatchRequest {
    Notify(u64),
    Withdraw(u64),
    WithdrawAll(String),
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Host kill switch; when false every `schedule_*` is a no-op.
    pub enabled: bool,
    /// Max concurrently running sweeps.
    pub pool_size: usize,
    /// Debounce between the host event and the sweep, letting the originating
    /// write settle.
    pub delay: Duration,
    pub max_body_length: usize,
    pub require_interaction: bool,
    pub renotify: bool,
    pub silent: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pool_size: 5,
            delay: Duration::from_secs(1),
            max_body_length: 75,
            require_interaction: true,
            renotify: true,
            silent: false,
        }
    }
}

/// Completion handle for one scheduled dispatch request. Callers are not
/// required to wait on it; dropping it detaches the sweep.
pub struct DispatchHandle {
    handle: JoinHandle<u32>,
}

impl DispatchHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Resolves to the number of successful deliveries of the sweep.
    pub async fn join(self) -> Result<u32, tokio::task::JoinError> {
        self.handle.await
    }
}

/// The dispatch engine: schedules delayed, pool-bounded delivery sweeps and
/// serves the user-facing notification read/update operations.
pub struct Dispatcher<T, P> {
    inner: Arc<Inner<T, P>>,
}

impl<T, P> Clone for Dispatcher<T, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<T, P> {
    config: DispatchConfig,
    time: T,
    transport: P,
    keys: Arc<KeyManager>,
    subscriptions: Arc<SubscriptionService>,
    directory: Arc<dyn NotificationDirectory>,
    localizer: Arc<dyn Localizer>,
    events: Arc<dyn EventSink>,
    formatters: FormatterRegistry,
    permits: Arc<Semaphore>,
    closed: AtomicBool,
}

impl<T, P> Dispatcher<T, P>
where
    T: TimeProvider,
    P: PushTransport,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: DispatchConfig,
        time: T,
        transport: P,
        keys: Arc<KeyManager>,
        subscriptions: Arc<SubscriptionService>,
        directory: Arc<dyn NotificationDirectory>,
        localizer: Arc<dyn Localizer>,
        events: Arc<dyn EventSink>,
        formatters: FormatterRegistry,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.pool_size.max(1)));
        Self {
            inner: Arc::new(Inner {
                config,
                time,
                transport,
                keys,
                subscriptions,
                directory,
                localizer,
                events,
                formatters,
                permits,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Schedules delivery of a freshly created notification to all of its
    /// addressee's devices.
    pub fn schedule_notify(&self, notification_id: u64) -> Option<DispatchHandle> {
        self.schedule(DispatchRequest::Notify(notification_id))
    }

    /// Schedules closing of a previously displayed notification on all
    /// devices, if not dismissed yet.
    pub fn schedule_withdraw(&self, notification_id: u64) -> Option<DispatchHandle> {
        self.schedule(DispatchRequest::Withdraw(notification_id))
    }

    /// Schedules closing of every displayed notification on the user's
    /// devices.
    pub fn schedule_withdraw_all(&self, username: &str) -> Option<DispatchHandle> {
        self.schedule(DispatchRequest::WithdrawAll(username.to_string()))
    }

    fn schedule(&self, request: DispatchRequest) -> Option<DispatchHandle> {
        if !self.inner.config.enabled || self.inner.closed.load(Ordering::SeqCst) {
            return None;
        }
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { run_request(inner, request).await });
        Some(DispatchHandle { handle })
    }

    /// Stops accepting new requests and abandons queued sweeps; sweeps already
    /// holding a pool permit finish.
    pub fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.permits.close();
    }

    pub fn vapid_public_key(&self) -> Result<String, KeyError> {
        self.inner.keys.public_key_string()
    }

    /// The formatted message for one notification, for the addressee only.
    pub fn notification(
        &self,
        id: u64,
        username: &str,
    ) -> Result<NotificationMessage, NotificationError> {
        let notification = self.addressed_notification(id, username)?;
        Ok(format_message(&self.inner, &notification, username))
    }

    /// Applies an in-notification user action: `markRead` goes to the host
    /// store, anything else to the notification type's formatter.
    pub fn update_notification(
        &self,
        id: u64,
        action: &str,
        username: &str,
    ) -> Result<(), NotificationError> {
        let notification = self.addressed_notification(id, username)?;
        if action == MARK_READ_ACTION {
            self.inner.directory.mark_read(id);
        } else {
            self.inner
                .formatters
                .resolve(&notification.plugin)
                .handle_action(&notification, action, username);
        }
        Ok(())
    }

    fn addressed_notification(
        &self,
        id: u64,
        username: &str,
    ) -> Result<WebNotification, NotificationError> {
        let Some(notification) = self.inner.directory.notification(id) else {
            tracing::warn!(notification_id = id, "notification not found");
            return Err(NotificationError::NotFound(id));
        };
        if !notification.is_addressee(username) {
            tracing::warn!(notification_id = id, username, "notification access denied");
            return Err(NotificationError::AccessDenied(id));
        }
        Ok(notification)
    }
}

async fn run_request<T, P>(inner: Arc<Inner<T, P>>, request: DispatchRequest) -> u32
where
    T: TimeProvider,
    P: PushTransport,
{
    inner.time.sleep(inner.config.delay).await;
    // A closed pool means shutdown: abandon silently, outcomes unreported.
    let Ok(_permit) = inner.permits.acquire().await else {
        return 0;
    };
    match request {
        DispatchRequest::Notify(id) => run_notification_sweep(&inner, id, UiAction::Open).await,
        DispatchRequest::Withdraw(id) => run_notification_sweep(&inner, id, UiAction::Close).await,
        DispatchRequest::WithdrawAll(username) => {
            let payload = format!("{CLOSE_ALL_ID}:{}", UiAction::CloseAll.code()).into_bytes();
            let sent =
                sweep_user(&inner, CLOSE_ALL_ID, UiAction::CloseAll, &username, &payload).await;
            if sent > 0 {
                let mut params = EventParams::new();
                params.insert(PARAM_SENT_COUNT.to_string(), sent.to_string());
                inner
                    .events
                    .publish(NOTIFICATION_ALL_DELETED, &username, params);
            }
            sent
        }
    }
}

/// One delivery sweep for a notify/withdraw request: resolve the notification
/// and its recipients, deliver per subscription, then broadcast the coarse
/// outcome event once if anything was sent.
async fn run_notification_sweep<T, P>(inner: &Inner<T, P>, id: u64, action: UiAction) -> u32
where
    T: TimeProvider,
    P: PushTransport,
{
    let Some(notification) = inner.directory.notification(id) else {
        tracing::warn!(
            notification_id = id,
            action = action.code(),
            "cannot send notification action, notification not found"
        );
        return 0;
    };
    let recipients = notification.recipients();
    if recipients.is_empty() {
        tracing::warn!(
            notification_id = id,
            action = action.code(),
            "notification has no addressee, nothing to send"
        );
        return 0;
    }

    let mut sent = 0u32;
    for username in &recipients {
        let payload = match action {
            UiAction::Open => {
                let message = format_message(inner, &notification, username);
                match serde_json::to_vec(&message) {
                    Ok(payload) => payload,
                    Err(err) => {
                        tracing::warn!(notification_id = id, error = %err, "failed to serialize push payload");
                        continue;
                    }
                }
            }
            UiAction::Close | UiAction::CloseAll => {
                format!("{id}:{}", action.code()).into_bytes()
            }
        };
        sent += sweep_user(inner, id, action, username, &payload).await;
    }

    if sent > 0 {
        let event = match action {
            UiAction::Open => NOTIFICATION_CREATED,
            UiAction::Close | UiAction::CloseAll => NOTIFICATION_DELETED,
        };
        let source = notification
            .to
            .clone()
            .unwrap_or_else(|| id.to_string());
        let mut params = EventParams::new();
        params.insert(PARAM_NOTIFICATION_ID.to_string(), id.to_string());
        params.insert(PARAM_SENT_COUNT.to_string(), sent.to_string());
        inner.events.publish(event, &source, params);
    }
    sent
}

/// Delivers one payload to every subscription of one user, sequentially.
/// A user with zero subscriptions yields zero silently.
async fn sweep_user<T, P>(
    inner: &Inner<T, P>,
    notification_id: u64,
    action: UiAction,
    username: &str,
    payload: &[u8],
) -> u32
where
    T: TimeProvider,
    P: PushTransport,
{
    let subscriptions = inner.subscriptions.subscriptions(username);
    let mut sent = 0u32;
    for subscription in &subscriptions {
        sent += deliver(inner, notification_id, action, username, subscription, payload).await;
    }
    sent
}

/// One delivery attempt with outcome classification. Failures are isolated to
/// this subscription; the sweep always continues.
async fn deliver<T, P>(
    inner: &Inner<T, P>,
    notification_id: u64,
    action: UiAction,
    username: &str,
    subscription: &Subscription,
    payload: &[u8],
) -> u32
where
    T: TimeProvider,
    P: PushTransport,
{
    let started = inner.time.now();
    let outcome = inner.transport.send(subscription, payload).await;
    let elapsed = (inner.time.now() - started).whole_milliseconds().max(0);

    let mut params = EventParams::new();
    params.insert(PARAM_NOTIFICATION_ID.to_string(), notification_id.to_string());
    params.insert(PARAM_SUBSCRIPTION_ID.to_string(), subscription.id.clone());
    params.insert(PARAM_ACTION.to_string(), action.code().to_string());
    params.insert(PARAM_DURATION_MS.to_string(), elapsed.to_string());

    match outcome {
        Ok(response) if response.status == HTTP_GONE => {
            tracing::info!(
                username,
                subscription_id = %subscription.id,
                endpoint = crate::subscriptions::endpoint_domain(&subscription.endpoint),
                "subscription is outdated, delete it"
            );
            inner
                .subscriptions
                .delete_system(&subscription.id, username);
            params.insert(PARAM_HTTP_STATUS.to_string(), response.status.to_string());
            inner.events.publish(OUTDATED_SUBSCRIPTION, username, params);
            0
        }
        Ok(response) if response.is_success() => {
            tracing::info!(
                notification_id,
                username,
                action = action.code(),
                subscription_id = %subscription.id,
                "notification sent successfully"
            );
            params.insert(PARAM_HTTP_STATUS.to_string(), response.status.to_string());
            inner.events.publish(NOTIFICATION_SENT, username, params);
            1
        }
        Ok(response) => {
            tracing::warn!(
                notification_id,
                username,
                action = action.code(),
                subscription_id = %subscription.id,
                status = response.status,
                body = %response.body,
                "notification not sent, push service returned an error response"
            );
            params.insert(PARAM_HTTP_STATUS.to_string(), response.status.to_string());
            params.insert(PARAM_HTTP_BODY.to_string(), response.body);
            inner
                .events
                .publish(NOTIFICATION_RESPONSE_ERROR, username, params);
            0
        }
        Err(err) => {
            tracing::warn!(
                notification_id,
                username,
                error = %err,
                "error while sending push notification, ignore reattempting and continue the sweep"
            );
            params.insert(PARAM_ERROR.to_string(), err.to_string());
            inner
                .events
                .publish(NOTIFICATION_SENDING_ERROR, username, params);
            0
        }
    }
}

fn format_message<T, P>(
    inner: &Inner<T, P>,
    notification: &WebNotification,
    username: &str,
) -> NotificationMessage {
    let locale = inner.localizer.locale(username);
    let formatter = inner.formatters.resolve(&notification.plugin);
    let mut message = formatter.process(notification, &locale);
    apply_message_defaults(
        &mut message,
        notification,
        &locale,
        &inner.config,
        inner.localizer.as_ref(),
    );
    message
}

/// Defaulting rules the engine applies uniformly after every formatter:
/// the mark-read action is injected idempotently, display flags and locale
/// are always engine-controlled, tag falls back to the notification id, the
/// body is capped, and the url defaults to the application root.
pub(crate) fn apply_message_defaults(
    message: &mut NotificationMessage,
    notification: &WebNotification,
    locale: &Locale,
    config: &DispatchConfig,
    localizer: &dyn Localizer,
) {
    message.add_action_if_absent(
        MARK_READ_ACTION,
        &localizer.shared_label(MARK_READ_LABEL_KEY, &locale.lang),
    );
    message.require_interaction = config.require_interaction;
    message.renotify = config.renotify;
    message.silent = config.silent;
    message.lang = Some(locale.lang.clone());
    message.dir = Some(locale.dir);
    if message.tag.as_deref().is_none_or(str::is_empty) {
        message.tag = Some(notification.id.to_string());
    }
    if let Some(body) = message.body.as_mut()
        && body.chars().count() > config.max_body_length
    {
        let truncated: String = body.chars().take(config.max_body_length).collect();
        *body = format!("{truncated}...");
    }
    if message.url.as_deref().is_none_or(str::is_empty) {
        message.url = Some("/".to_string());
    }
}
