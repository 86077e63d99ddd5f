//! Webhook notification model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{webhook_error, Error, WebhookErrorKind};
use crate::json::parse_id;

/// Event kinds a handler can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `SampleNotification`, sent from the creator dashboard.
    Test,
    /// `RightToErasureRequest`, a user asked for their data to be deleted.
    RightToErasureRequest,
}

impl EventKind {
    pub const ALL: [EventKind; 2] = [EventKind::Test, EventKind::RightToErasureRequest];

    /// Look up the `EventType` value of a payload.
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.event_type() == event_type)
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            EventKind::Test => "SampleNotification",
            EventKind::RightToErasureRequest => "RightToErasureRequest",
        }
    }

    /// Name a handler for this kind is registered under.
    pub fn handler_name(&self) -> &'static str {
        match self {
            EventKind::Test => "on_test",
            EventKind::RightToErasureRequest => "on_right_to_erasure_request",
        }
    }
}

impl FromStr for EventKind {
    type Err = Error;

    /// Parse a handler name such as `on_test`.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.handler_name() == name)
            .ok_or_else(|| {
                webhook_error(
                    WebhookErrorKind::InvalidEventName,
                    &format!("'{}' is not a valid event name.", name),
                )
            })
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.handler_name())
    }
}

/// Event-specific part of a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    /// The event type was not (or not yet) resolved.
    Generic,
    Test {
        user_id: u64,
    },
    RightToErasureRequest {
        user_id: u64,
        experience_ids: Vec<u64>,
    },
}

/// A verified webhook notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub notification_id: String,
    /// `EventTime`, truncated to microseconds.
    pub timestamp: DateTime<Utc>,
    pub event: NotificationEvent,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct RawNotification {
    notification_id: String,
    event_time: String,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    event_payload: Option<Value>,
}

impl RawNotification {
    pub(crate) fn parse(body: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(body).map_err(|e| invalid_payload(&e.to_string()))
    }
}

fn invalid_payload(message: &str) -> Error {
    webhook_error(
        WebhookErrorKind::InvalidPayload,
        &format!("Invalid notification payload: {}", message),
    )
}

/// Parse an ISO 8601 `EventTime`, which may carry nanoseconds and no offset.
fn parse_event_time(raw: &str) -> Option<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw.trim_end_matches('Z'), "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|t| t.and_utc())
        })?;
    parsed.with_nanosecond(parsed.nanosecond() / 1_000 * 1_000)
}

impl Notification {
    /// Build the generic notification common to every event type.
    pub(crate) fn from_raw(raw: &RawNotification) -> Result<Self, Error> {
        let timestamp = parse_event_time(&raw.event_time)
            .ok_or_else(|| invalid_payload(&format!("bad EventTime {:?}", raw.event_time)))?;
        Ok(Self {
            notification_id: raw.notification_id.clone(),
            timestamp,
            event: NotificationEvent::Generic,
        })
    }

    /// Resolve the event-specific payload for `kind`.
    pub(crate) fn resolve(&mut self, kind: EventKind, raw: &RawNotification) -> Result<(), Error> {
        let payload = raw
            .event_payload
            .as_ref()
            .ok_or_else(|| invalid_payload("missing EventPayload"))?;
        let user_id = payload
            .get("UserId")
            .and_then(parse_id)
            .ok_or_else(|| invalid_payload("missing UserId"))?;

        self.event = match kind {
            EventKind::Test => NotificationEvent::Test { user_id },
            EventKind::RightToErasureRequest => NotificationEvent::RightToErasureRequest {
                user_id,
                experience_ids: payload
                    .get("GameIds")
                    .and_then(Value::as_array)
                    .map(|ids| ids.iter().filter_map(parse_id).collect())
                    .unwrap_or_default(),
            },
        };
        Ok(())
    }
}
