//! Line-delimited JSON host channel.
//!
//! Requests are handled concurrently, so replies may arrive out of order and
//! are matched by `id`. Progress notifications are pushed as they happen.

use std::sync::Arc;

use ecrypto_protocol::{Envelope, ProgressNotification};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;

use crate::bridge::EngineBridge;
use crate::error::ShellResult;

pub const PROGRESS_UPDATE_EVENT: &str = "progress-update";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HostRequest {
    #[serde(default)]
    pub id: Value,
    pub channel: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostReply {
    pub id: Value,
    pub envelope: Envelope,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostPush {
    pub event: &'static str,
    pub notification: ProgressNotification,
}

/// Handles one input line. Blank lines produce no reply.
pub async fn handle_line(bridge: &EngineBridge, line: &str) -> Option<HostReply> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let request = match serde_json::from_str::<HostRequest>(line) {
        Ok(request) => request,
        Err(error) => {
            tracing::warn!(error = %error, "malformed host request");
            let id = serde_json::from_str::<Value>(line)
                .ok()
                .and_then(|value| value.get("id").cloned())
                .unwrap_or(Value::Null);
            return Some(HostReply {
                id,
                envelope: Envelope::failure(format!("malformed request: {error}")),
            });
        }
    };

    let envelope = bridge
        .invoke(request.channel.as_str(), request.payload)
        .await;
    Some(HostReply {
        id: request.id,
        envelope,
    })
}

/// Serves the bridge until `input` reaches end of file.
///
/// In-flight requests are answered before returning.
pub async fn serve<R, W>(bridge: Arc<EngineBridge>, input: R, output: W) -> ShellResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (line_tx, line_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(write_lines(output, line_rx));
    let forwarder = tokio::spawn(forward_progress(bridge.on_progress(), line_tx.clone()));

    let mut in_flight = JoinSet::new();
    let mut lines = BufReader::new(input).lines();
    let read_result = loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let bridge = Arc::clone(&bridge);
                let line_tx = line_tx.clone();
                in_flight.spawn(async move {
                    if let Some(reply) = handle_line(&bridge, line.as_str()).await {
                        send_json(&line_tx, &reply);
                    }
                });
            }
            Ok(None) => break Ok(()),
            Err(error) => break Err(error),
        }
    };
    tracing::info!("host input closed");

    while let Some(joined) = in_flight.join_next().await {
        if let Err(error) = joined {
            tracing::warn!(error = %error, "host request task failed");
        }
    }

    forwarder.abort();
    drop(line_tx);
    match writer.await {
        Ok(result) => result?,
        Err(error) => tracing::warn!(error = %error, "host writer task failed"),
    }

    read_result?;
    Ok(())
}

async fn forward_progress(
    mut notifications: broadcast::Receiver<ProgressNotification>,
    line_tx: mpsc::UnboundedSender<String>,
) {
    loop {
        match notifications.recv().await {
            Ok(notification) => send_json(
                &line_tx,
                &HostPush {
                    event: PROGRESS_UPDATE_EVENT,
                    notification,
                },
            ),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "host fell behind on progress notifications");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn send_json<T: Serialize>(line_tx: &mpsc::UnboundedSender<String>, message: &T) {
    match serde_json::to_string(message) {
        Ok(line) => {
            let _ = line_tx.send(line);
        }
        Err(error) => tracing::error!(error = %error, "failed to encode host message"),
    }
}

async fn write_lines<W>(
    mut output: W,
    mut lines: mpsc::UnboundedReceiver<String>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = lines.recv().await {
        output.write_all(line.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
    output.shutdown().await
}
