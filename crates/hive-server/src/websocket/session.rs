//! One WebSocket subscriber session.
//!
//! The socket is split into a writer task (drains the subscriber queue, sends
//! pings, sends a close frame when the subscription ends) and a reader task
//! (records pongs, notices the peer leaving). A heartbeat task watches the
//! pong flag. Whichever finishes first decides why the subscriber is removed.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::{SinkExt, StreamExt};
use hive_broadcast::{RemovalReason, Subscription, TelemetryHub};
use tokio::task::JoinError;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::heartbeat::{HeartbeatResult, run_heartbeat};

/// How long the writer may take to flush its close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Liveness timing for a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Ping interval.
    pub heartbeat_interval: Duration,
    /// Silence tolerated before the subscriber is dropped.
    pub heartbeat_timeout: Duration,
}

#[derive(Debug, PartialEq, Eq)]
enum WriterExit {
    /// The subscriber was closed (by the hub or by this session).
    Closed,
    /// Server shutdown.
    Shutdown,
    /// Sending to the socket failed.
    SocketError,
}

/// Drive a subscriber's socket until either side goes away.
///
/// The subscription is already registered and holds the replay (if any) at
/// the head of its queue. Returns why the subscriber was removed.
pub async fn run_session(
    socket: WebSocket,
    subscription: Subscription,
    hub: Arc<TelemetryHub>,
    config: SessionConfig,
    shutdown: CancellationToken,
) -> RemovalReason {
    let Subscription {
        subscriber,
        mut receiver,
    } = subscription;
    let id = subscriber.id().clone();
    let closed = subscriber.closed();
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer: queue → socket, plus pings (first ping on connect)
    let writer_id = id.clone();
    let writer_closed = closed.clone();
    let mut writer = tokio::spawn(async move {
        let mut ping = time::interval(config.heartbeat_interval);
        loop {
            tokio::select! {
                biased;
                () = writer_closed.cancelled() => {
                    let _ = ws_tx.send(close_message(close_code::POLICY, "subscription closed")).await;
                    return WriterExit::Closed;
                }
                () = shutdown.cancelled() => {
                    let _ = ws_tx.send(close_message(close_code::AWAY, "server shutting down")).await;
                    return WriterExit::Shutdown;
                }
                next = receiver.recv() => {
                    let Some(latest) = next else {
                        return WriterExit::Closed;
                    };
                    let text = latest.reading.wire().to_string();
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        return WriterExit::SocketError;
                    }
                    trace!(subscriber_id = %writer_id, sequence = latest.sequence, "pushed reading");
                }
                _ = ping.tick() => {
                    if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                        return WriterExit::SocketError;
                    }
                }
            }
        }
    });

    // Reader: pongs and peer close
    let reader_sub = Arc::clone(&subscriber);
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Pong(_) => reader_sub.mark_alive(),
                Message::Close(_) => break,
                Message::Text(_) | Message::Binary(_) => {
                    debug!(subscriber_id = %reader_sub.id(), "ignoring inbound frame");
                }
                // axum answers pings itself
                Message::Ping(_) => {}
            }
        }
    });

    let mut heartbeat = tokio::spawn(run_heartbeat(
        Arc::clone(&subscriber),
        config.heartbeat_interval,
        config.heartbeat_timeout,
        closed,
    ));

    let (reason, writer_done) = tokio::select! {
        exit = &mut writer => (writer_reason(exit), true),
        _ = &mut reader => (RemovalReason::Disconnected, false),
        result = &mut heartbeat => (heartbeat_reason(result), false),
    };
    reader.abort();
    heartbeat.abort();

    let _ = hub.unsubscribe(&id, reason).await;
    if !writer_done && time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }

    info!(subscriber_id = %id, reason = reason.as_str(), "websocket session ended");
    reason
}

fn close_message(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }))
}

fn writer_reason(exit: Result<WriterExit, JoinError>) -> RemovalReason {
    match exit {
        Ok(WriterExit::Shutdown) => RemovalReason::Shutdown,
        Ok(WriterExit::Closed) => RemovalReason::ChannelClosed,
        Ok(WriterExit::SocketError) | Err(_) => RemovalReason::Disconnected,
    }
}

fn heartbeat_reason(result: Result<HeartbeatResult, JoinError>) -> RemovalReason {
    match result {
        Ok(HeartbeatResult::TimedOut) => RemovalReason::HeartbeatTimeout,
        Ok(HeartbeatResult::Cancelled) | Err(_) => RemovalReason::ChannelClosed,
    }
}
