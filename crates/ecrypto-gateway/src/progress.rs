use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use ecrypto_protocol::{
    parse_progress_frame, EngineEndpoint, EngineError, EngineOperation, Envelope, ProgressEvent,
    ProgressNotification, StreamEnd, SubscriptionId,
};
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::gateway::{describe_transport_error, sanitize_error_body};
use crate::sse::{SseDecoder, SseFrame};

pub const DEFAULT_PROGRESS_BUFFER: usize = 256;

/// Relays the engine's progress stream to UI listeners.
///
/// Each [`ProgressRelay::subscribe`] opens its own connection and ends with
/// exactly one [`StreamEnd`] notification. Streams are never reconnected.
#[derive(Debug, Clone)]
pub struct ProgressRelay {
    endpoint: EngineEndpoint,
    client: reqwest::Client,
    sender: broadcast::Sender<ProgressNotification>,
    next_subscription: Arc<AtomicU64>,
    subscriptions: Arc<Mutex<HashMap<SubscriptionId, Subscription>>>,
}

#[derive(Debug)]
struct Subscription {
    task: JoinHandle<()>,
    end: Arc<EndNotifier>,
}

/// Guarantees a single `Ended` notification per subscription, whichever of
/// the stream task or an explicit close gets there first.
#[derive(Debug)]
struct EndNotifier {
    subscription: SubscriptionId,
    sent: AtomicBool,
    sender: broadcast::Sender<ProgressNotification>,
}

impl EndNotifier {
    fn emit(&self, end: StreamEnd) -> bool {
        if self.sent.swap(true, Ordering::SeqCst) {
            return false;
        }
        match &end {
            StreamEnd::Failed(reason) => {
                tracing::warn!(
                    subscription = %self.subscription,
                    reason = %reason,
                    "progress stream failed"
                );
            }
            _ => {
                tracing::debug!(
                    subscription = %self.subscription,
                    end = ?end,
                    "progress stream ended"
                );
            }
        }
        let _ = self
            .sender
            .send(ProgressNotification::ended(self.subscription, end));
        true
    }
}

impl ProgressRelay {
    pub fn new(endpoint: EngineEndpoint) -> Self {
        Self::with_buffer(endpoint, DEFAULT_PROGRESS_BUFFER)
    }

    pub fn with_buffer(endpoint: EngineEndpoint, buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self {
            endpoint,
            client: reqwest::Client::new(),
            sender,
            next_subscription: Arc::new(AtomicU64::new(0)),
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Registration point for progress listeners. Only notifications sent
    /// after this call are observed.
    pub fn on_progress(&self) -> broadcast::Receiver<ProgressNotification> {
        self.sender.subscribe()
    }

    /// Opens a new stream and acknowledges immediately with its subscription id.
    pub fn subscribe(&self) -> Envelope {
        let subscription =
            SubscriptionId::new(self.next_subscription.fetch_add(1, Ordering::SeqCst) + 1);
        let end = Arc::new(EndNotifier {
            subscription,
            sent: AtomicBool::new(false),
            sender: self.sender.clone(),
        });
        let task = tokio::spawn(run_subscription(
            self.client.clone(),
            self.endpoint.url(EngineOperation::SubscribeProgress.route()),
            subscription,
            self.sender.clone(),
            Arc::clone(&end),
        ));

        match self.subscriptions.lock() {
            Ok(mut subscriptions) => {
                subscriptions.retain(|_, existing| !existing.task.is_finished());
                subscriptions.insert(subscription, Subscription { task, end });
            }
            Err(_) => {
                tracing::warn!(
                    subscription = %subscription,
                    "progress subscription registry poisoned"
                );
            }
        }
        tracing::info!(subscription = %subscription, "progress subscription opened");

        Envelope::success(json!({ "subscriptionId": subscription.get() }))
    }

    /// Stops one subscription. Returns `false` when it was unknown or already finished.
    pub fn close(&self, subscription: SubscriptionId) -> bool {
        let removed = match self.subscriptions.lock() {
            Ok(mut subscriptions) => subscriptions.remove(&subscription),
            Err(_) => None,
        };
        let Some(removed) = removed else {
            return false;
        };
        removed.task.abort();
        removed.end.emit(StreamEnd::Closed)
    }

    pub fn close_all(&self) -> usize {
        let drained = match self.subscriptions.lock() {
            Ok(mut subscriptions) => subscriptions.drain().collect::<Vec<_>>(),
            Err(_) => Vec::new(),
        };
        let mut closed = 0;
        for (_, removed) in drained {
            removed.task.abort();
            if removed.end.emit(StreamEnd::Closed) {
                closed += 1;
            }
        }
        closed
    }

    pub fn active_subscriptions(&self) -> Vec<SubscriptionId> {
        let Ok(subscriptions) = self.subscriptions.lock() else {
            return Vec::new();
        };
        let mut active = subscriptions
            .iter()
            .filter(|(_, existing)| !existing.task.is_finished())
            .map(|(id, _)| *id)
            .collect::<Vec<_>>();
        active.sort();
        active
    }
}

async fn run_subscription(
    client: reqwest::Client,
    url: String,
    subscription: SubscriptionId,
    sender: broadcast::Sender<ProgressNotification>,
    end: Arc<EndNotifier>,
) {
    let outcome = stream_progress(&client, url.as_str(), subscription, &sender).await;
    end.emit(outcome);
}

async fn stream_progress(
    client: &reqwest::Client,
    url: &str,
    subscription: SubscriptionId,
    sender: &broadcast::Sender<ProgressNotification>,
) -> StreamEnd {
    let response = match client
        .get(url)
        .header(ACCEPT, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache")
        .send()
        .await
    {
        Ok(response) => response,
        Err(error) => {
            return stream_failure(format!(
                "engine unreachable: {}",
                describe_transport_error(&error)
            ));
        }
    };

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let excerpt = sanitize_error_body(body.as_str());
        return stream_failure(if excerpt.is_empty() {
            format!("engine responded with status {status}")
        } else {
            format!("engine responded with status {status}: {excerpt}")
        });
    }

    let mut tracker = ProgressTracker::default();
    let mut decoder = SseDecoder::new();
    let mut bytes_stream = response.bytes_stream();
    while let Some(chunk_result) = bytes_stream.next().await {
        let chunk = match chunk_result {
            Ok(chunk) => chunk,
            Err(error) => {
                return stream_failure(format!(
                    "read failed: {}",
                    describe_transport_error(&error)
                ));
            }
        };
        for frame in decoder.push(&chunk) {
            if let Some(end) = forward_frame(&frame, subscription, &mut tracker, sender) {
                return end;
            }
        }
    }

    if let Some(frame) = decoder.finish() {
        if let Some(end) = forward_frame(&frame, subscription, &mut tracker, sender) {
            return end;
        }
    }
    StreamEnd::Closed
}

fn forward_frame(
    frame: &SseFrame,
    subscription: SubscriptionId,
    tracker: &mut ProgressTracker,
    sender: &broadcast::Sender<ProgressNotification>,
) -> Option<StreamEnd> {
    let Some(event) = parse_progress_frame(frame.data.as_str()) else {
        tracing::debug!(
            subscription = %subscription,
            data = %frame.data,
            "skipping non-progress frame"
        );
        return None;
    };
    if !tracker.accept(&event) {
        tracing::debug!(
            subscription = %subscription,
            percentage = event.percentage,
            "dropping regressed progress event"
        );
        return None;
    }

    let is_final = event.is_final();
    let _ = sender.send(ProgressNotification::event(subscription, event));
    is_final.then_some(StreamEnd::Completed)
}

fn stream_failure(detail: String) -> StreamEnd {
    StreamEnd::Failed(EngineError::Stream(detail).to_string())
}

/// Keeps percentages non-decreasing within one subscription.
#[derive(Debug, Default)]
struct ProgressTracker {
    last_percentage: Option<u8>,
}

impl ProgressTracker {
    fn accept(&mut self, event: &ProgressEvent) -> bool {
        if self
            .last_percentage
            .is_some_and(|last| event.percentage < last)
        {
            return false;
        }
        self.last_percentage = Some(event.percentage);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(percentage: u8) -> ProgressEvent {
        ProgressEvent {
            operation_id: None,
            current: u64::from(percentage),
            total: 100,
            percentage,
            filename: "a.txt".to_owned(),
        }
    }

    #[test]
    fn tracker_drops_regressions_but_allows_repeats() {
        let mut tracker = ProgressTracker::default();
        assert!(tracker.accept(&event(10)));
        assert!(tracker.accept(&event(10)));
        assert!(!tracker.accept(&event(5)));
        assert!(tracker.accept(&event(60)));
        assert!(!tracker.accept(&event(59)));
    }

    #[test]
    fn end_notifier_emits_once() {
        let (sender, mut receiver) = broadcast::channel(8);
        let notifier = EndNotifier {
            subscription: SubscriptionId::new(1),
            sent: AtomicBool::new(false),
            sender,
        };
        assert!(notifier.emit(StreamEnd::Completed));
        assert!(!notifier.emit(StreamEnd::Closed));

        let notification = receiver.try_recv().expect("end notification");
        assert_eq!(
            notification,
            ProgressNotification::ended(SubscriptionId::new(1), StreamEnd::Completed)
        );
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn final_frame_completes_subscription() {
        let (sender, mut receiver) = broadcast::channel(8);
        let mut tracker = ProgressTracker::default();
        let subscription = SubscriptionId::new(4);
        let frame = SseFrame {
            event: None,
            data: r#"{"current":2,"total":2,"filename":"b.txt"}"#.to_owned(),
        };

        let end = forward_frame(&frame, subscription, &mut tracker, &sender);
        assert_eq!(end, Some(StreamEnd::Completed));
        let notification = receiver.try_recv().expect("progress notification");
        assert_eq!(notification.subscription, subscription);
        assert!(!notification.is_end());
    }

    #[test]
    fn connection_notice_is_skipped() {
        let (sender, mut receiver) = broadcast::channel(8);
        let mut tracker = ProgressTracker::default();
        let frame = SseFrame {
            event: None,
            data: r#"{"status":"connected"}"#.to_owned(),
        };
        assert_eq!(
            forward_frame(&frame, SubscriptionId::new(1), &mut tracker, &sender),
            None
        );
        assert!(receiver.try_recv().is_err());
    }
}
