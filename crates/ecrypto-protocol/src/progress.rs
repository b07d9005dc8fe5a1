use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "progress-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    pub current: u64,
    pub total: u64,
    pub percentage: u8,
    #[serde(default)]
    pub filename: String,
}

impl ProgressEvent {
    pub fn is_final(&self) -> bool {
        self.total > 0 && self.current >= self.total
    }
}

/// Interprets one decoded stream frame.
///
/// Frames without both `current` and `total` (connection notices, keep-alives) yield `None`.
/// A missing percentage is derived from the counts; any percentage is clamped to 100.
pub fn parse_progress_frame(data: &str) -> Option<ProgressEvent> {
    let value: Value = serde_json::from_str(data.trim()).ok()?;
    let frame: ProgressFrame = serde_json::from_value(value).ok()?;
    let current = frame.current?;
    let total = frame.total?;
    let derived = if total == 0 {
        0
    } else {
        current.saturating_mul(100) / total
    };
    let percentage = frame.percentage.unwrap_or(derived).min(100) as u8;
    Some(ProgressEvent {
        operation_id: frame.operation_id.filter(|id| !id.is_empty()),
        current,
        total,
        percentage,
        filename: frame.filename.unwrap_or_default(),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgressFrame {
    #[serde(default, alias = "operation_id")]
    operation_id: Option<String>,
    #[serde(default)]
    current: Option<u64>,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    percentage: Option<u64>,
    #[serde(default)]
    filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum StreamEnd {
    /// The final event (`current == total`) was delivered.
    Completed,
    /// The engine closed the stream.
    Closed,
    /// Connecting or reading failed; the subscription is not retried.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ProgressUpdate {
    Event(ProgressEvent),
    Ended(StreamEnd),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressNotification {
    pub subscription: SubscriptionId,
    pub update: ProgressUpdate,
}

impl ProgressNotification {
    pub fn event(subscription: SubscriptionId, event: ProgressEvent) -> Self {
        Self {
            subscription,
            update: ProgressUpdate::Event(event),
        }
    }

    pub fn ended(subscription: SubscriptionId, end: StreamEnd) -> Self {
        Self {
            subscription,
            update: ProgressUpdate::Ended(end),
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self.update, ProgressUpdate::Ended(_))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_engine_progress_frame() {
        let event = parse_progress_frame(
            r#"{"operationId":"op-7","current":2,"total":4,"filename":"b.txt","percentage":50}"#,
        )
        .expect("parse frame");
        assert_eq!(event.operation_id.as_deref(), Some("op-7"));
        assert_eq!((event.current, event.total, event.percentage), (2, 4, 50));
        assert_eq!(event.filename, "b.txt");
        assert!(!event.is_final());
    }

    #[test]
    fn derives_missing_percentage_and_clamps() {
        let event = parse_progress_frame(r#"{"current":1,"total":3}"#).expect("parse frame");
        assert_eq!(event.percentage, 33);
        let event = parse_progress_frame(r#"{"current":3,"total":3,"percentage":250}"#)
            .expect("parse frame");
        assert_eq!(event.percentage, 100);
        assert!(event.is_final());
    }

    #[test]
    fn connection_notices_are_not_progress() {
        assert!(parse_progress_frame(r#"{"status": "connected"}"#).is_none());
        assert!(parse_progress_frame("not json").is_none());
        assert!(parse_progress_frame("").is_none());
    }

    #[test]
    fn zero_total_is_never_final() {
        let event = parse_progress_frame(r#"{"current":0,"total":0}"#).expect("parse frame");
        assert!(!event.is_final());
        assert_eq!(event.percentage, 0);
    }

    #[test]
    fn notification_serializes_with_tagged_update() {
        let notification = ProgressNotification::ended(
            SubscriptionId::new(2),
            StreamEnd::Failed("reset".to_owned()),
        );
        let value = serde_json::to_value(&notification).expect("serialize notification");
        assert_eq!(
            value,
            json!({
                "subscription": 2,
                "update": {"type": "ended", "payload": {"reason": "failed", "detail": "reset"}}
            })
        );
    }
}
