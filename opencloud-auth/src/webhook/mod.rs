//! Webhook signature validation and notification dispatch.

mod hmac;
mod notification;

pub use hmac::{check_timestamp, sign, HmacWebhookValidator, REPLAY_WINDOW_SECONDS};
pub use notification::{EventKind, Notification, NotificationEvent};

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{webhook_error, BoxError, Error, ErrorKind, WebhookErrorKind};
use notification::RawNotification;

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "roblox-signature";

type EventHandler = Box<dyn Fn(&Notification) -> Result<(), BoxError> + Send + Sync>;
type ErrorHandler = Box<dyn Fn(&Notification, &Error) + Send + Sync>;

/// HTTP-shaped result of processing a webhook request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: u16,
    pub body: &'static str,
}

impl WebhookResponse {
    pub fn no_content() -> Self {
        Self {
            status: 204,
            body: "",
        }
    }

    pub fn invalid_signature() -> Self {
        Self {
            status: 401,
            body: "Invalid signature",
        }
    }
}

/// Verifies inbound notifications and hands them to registered handlers.
///
/// Requests that fail signature or replay checks produce a 401 response.
/// Anything that reaches dispatch produces 204. Dispatch failures (unknown
/// event type, no handler, handler error) go to the error handler when one
/// is set and are returned as `Err` otherwise.
#[derive(Default)]
pub struct Webhook {
    validator: Option<HmacWebhookValidator>,
    handlers: HashMap<EventKind, EventHandler>,
    on_error: Option<ErrorHandler>,
}

impl Webhook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require every request to carry a valid signature made with `secret`.
    ///
    /// An empty secret counts as no secret and leaves signatures unchecked.
    pub fn with_secret(mut self, secret: impl Into<Vec<u8>>) -> Self {
        let secret = secret.into();
        self.validator = if secret.is_empty() {
            None
        } else {
            Some(HmacWebhookValidator::new(secret))
        };
        self
    }

    /// Register the handler for `kind`, replacing any previous one.
    pub fn on<F>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: Fn(&Notification) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.handlers.insert(kind, Box::new(handler));
        self
    }

    /// Register a handler by event name, e.g. `on_test`.
    ///
    /// Fails with `InvalidEventName` for names outside the known set. The
    /// error handler has its own slot, see [`Self::on_error`].
    pub fn register<F>(self, name: &str, handler: F) -> Result<Self, Error>
    where
        F: Fn(&Notification) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let kind: EventKind = name.parse()?;
        Ok(self.on(kind, handler))
    }

    /// Set the handler that receives every dispatch-phase error.
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Notification, &Error) + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(handler));
        self
    }

    pub fn has_handler(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Process a raw request body and its signature header.
    pub fn process_notification(
        &self,
        body: &[u8],
        signature_header: Option<&str>,
    ) -> Result<WebhookResponse, Error> {
        self.process_notification_at(body, signature_header, Utc::now())
    }

    /// Like [`Self::process_notification`] with an explicit current time.
    pub fn process_notification_at(
        &self,
        body: &[u8],
        signature_header: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<WebhookResponse, Error> {
        if let Err(e) = self.verify(body, signature_header, now) {
            warn!("Rejected webhook request: {}", e);
            return Ok(WebhookResponse::invalid_signature());
        }

        let raw = RawNotification::parse(body)?;
        let mut notification = Notification::from_raw(&raw)?;
        info!(
            "Received webhook notification {} ({})",
            notification.notification_id,
            raw.event_type.as_deref().unwrap_or("no event type")
        );

        if let Err(error) = self.dispatch(&raw, &mut notification) {
            match &self.on_error {
                Some(on_error) => {
                    debug!("Passing webhook error to error handler: {}", error);
                    on_error(&notification, &error);
                }
                None => return Err(error),
            }
        }

        Ok(WebhookResponse::no_content())
    }

    fn verify(&self, body: &[u8], header: Option<&str>, now: DateTime<Utc>) -> Result<(), Error> {
        if let Some(validator) = &self.validator {
            validator.validate(header, body)?;
        }
        check_timestamp(header, now)
    }

    fn dispatch(&self, raw: &RawNotification, notification: &mut Notification) -> Result<(), Error> {
        let event_type = raw.event_type.as_deref().unwrap_or_default();
        let kind = EventKind::from_event_type(event_type).ok_or_else(|| {
            webhook_error(
                WebhookErrorKind::UnknownEventType,
                &format!("Unknown webhook event type '{}'", event_type),
            )
        })?;

        notification.resolve(kind, raw)?;

        let handler = self.handlers.get(&kind).ok_or_else(|| {
            webhook_error(
                WebhookErrorKind::UndefinedEventType,
                &format!("'{}' is not a defined event.", kind),
            )
        })?;

        handler(notification).map_err(|source| Error {
            source: Some(source),
            error_kind: ErrorKind::Webhook(WebhookErrorKind::Handler),
        })
    }
}

impl fmt::Debug for Webhook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Webhook")
            .field("validates_signature", &self.validator.is_some())
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("has_error_handler", &self.on_error.is_some())
            .finish()
    }
}
