//! A live delivery channel to one observer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use hive_core::SubscriberId;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::store::Latest;

/// Lifecycle of a subscriber. There is no transition out of `Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriberState {
    /// Registered, replay not yet done.
    Connecting,
    /// Receiving broadcasts.
    Active,
    /// Terminal.
    Closed,
}

/// Outcome of a single delivery attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for the writer task.
    Sent,
    /// Not newer than what this subscriber already has; skipped.
    Stale,
    /// Queue full; the reading was dropped for this subscriber.
    Full,
    /// The subscriber is gone.
    Closed,
}

/// Why a subscriber left the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemovalReason {
    /// The observer disconnected.
    Disconnected,
    /// The outbound channel was closed at delivery time.
    ChannelClosed,
    /// Too many readings dropped on a full queue.
    Lagging,
    /// No pong within the heartbeat timeout.
    HeartbeatTimeout,
    /// Server shutdown.
    Shutdown,
}

impl RemovalReason {
    /// Label for the `subscribers_removed_total` counter.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::ChannelClosed => "channel_closed",
            Self::Lagging => "lagging",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::Shutdown => "shutdown",
        }
    }
}

/// One registered observer.
pub struct Subscriber {
    id: SubscriberId,
    tx: mpsc::Sender<Arc<Latest>>,
    state: Mutex<SubscriberState>,
    /// Highest sequence queued so far; guards against replays and duplicates.
    last_sequence: Mutex<u64>,
    dropped: AtomicU64,
    is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    connected_at: Instant,
    closed: CancellationToken,
}

impl Subscriber {
    /// Create a subscriber in the `Connecting` state.
    pub fn new(id: SubscriberId, tx: mpsc::Sender<Arc<Latest>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            state: Mutex::new(SubscriberState::Connecting),
            last_sequence: Mutex::new(0),
            dropped: AtomicU64::new(0),
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            connected_at: now,
            closed: CancellationToken::new(),
        }
    }

    /// Subscriber identity.
    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SubscriberState {
        *self.state.lock()
    }

    /// Whether the subscriber reached its terminal state.
    pub fn is_closed(&self) -> bool {
        self.state() == SubscriberState::Closed
    }

    /// `Connecting → Active`. Returns `false` from any other state.
    pub fn activate(&self) -> bool {
        let mut state = self.state.lock();
        if *state == SubscriberState::Connecting {
            *state = SubscriberState::Active;
            true
        } else {
            false
        }
    }

    /// Move to `Closed` and wake anything waiting on [`closed`](Self::closed).
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn close(&self) -> bool {
        let mut state = self.state.lock();
        if *state == SubscriberState::Closed {
            return false;
        }
        *state = SubscriberState::Closed;
        drop(state);
        self.closed.cancel();
        true
    }

    /// Token cancelled when the subscriber closes.
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Queue a reading without blocking.
    ///
    /// Readings whose sequence is not newer than the last queued one are
    /// skipped, so a replay racing a broadcast never reorders or duplicates.
    pub fn deliver(&self, latest: &Arc<Latest>) -> Delivery {
        if self.is_closed() {
            return Delivery::Closed;
        }
        let mut last = self.last_sequence.lock();
        if latest.sequence <= *last {
            return Delivery::Stale;
        }
        match self.tx.try_send(Arc::clone(latest)) {
            Ok(()) => {
                *last = latest.sequence;
                Delivery::Sent
            }
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                Delivery::Full
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Sequence of the last queued reading (0 if none).
    pub fn last_sequence(&self) -> u64 {
        *self.last_sequence.lock()
    }

    /// Total readings dropped on a full queue.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Mark the subscriber as alive (pong received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the subscriber was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("last_sequence", &self.last_sequence())
            .field("dropped", &self.drop_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use hive_core::Reading;

    use super::*;

    fn make_subscriber(capacity: usize) -> (Subscriber, mpsc::Receiver<Arc<Latest>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Subscriber::new(SubscriberId::from_raw("sub_test"), tx), rx)
    }

    fn latest(sequence: u64) -> Arc<Latest> {
        Arc::new(Latest {
            sequence,
            reading: Reading::parse(format!(r#"{{"n":{sequence}}}"#).as_bytes()).unwrap(),
            accepted_at: Utc::now(),
        })
    }

    #[test]
    fn starts_connecting() {
        let (sub, _rx) = make_subscriber(4);
        assert_eq!(sub.state(), SubscriberState::Connecting);
        assert_eq!(sub.last_sequence(), 0);
        assert_eq!(sub.drop_count(), 0);
    }

    #[test]
    fn state_machine() {
        let (sub, _rx) = make_subscriber(4);
        assert!(sub.activate());
        assert_eq!(sub.state(), SubscriberState::Active);
        assert!(!sub.activate());

        assert!(sub.close());
        assert!(!sub.close());
        assert!(!sub.activate());
        assert_eq!(sub.state(), SubscriberState::Closed);
    }

    #[test]
    fn close_cancels_token() {
        let (sub, _rx) = make_subscriber(4);
        let token = sub.closed();
        assert!(!token.is_cancelled());
        let _ = sub.close();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn deliver_queues_reading() {
        let (sub, mut rx) = make_subscriber(4);
        assert_eq!(sub.deliver(&latest(1)), Delivery::Sent);
        assert_eq!(rx.recv().await.unwrap().sequence, 1);
        assert_eq!(sub.last_sequence(), 1);
    }

    #[test]
    fn stale_and_duplicate_readings_are_skipped() {
        let (sub, mut rx) = make_subscriber(4);
        assert_eq!(sub.deliver(&latest(3)), Delivery::Sent);
        assert_eq!(sub.deliver(&latest(3)), Delivery::Stale);
        assert_eq!(sub.deliver(&latest(2)), Delivery::Stale);
        assert_eq!(sub.deliver(&latest(4)), Delivery::Sent);

        assert_eq!(rx.try_recv().unwrap().sequence, 3);
        assert_eq!(rx.try_recv().unwrap().sequence, 4);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn full_queue_drops_and_counts() {
        let (sub, _rx) = make_subscriber(1);
        assert_eq!(sub.deliver(&latest(1)), Delivery::Sent);
        assert_eq!(sub.deliver(&latest(2)), Delivery::Full);
        assert_eq!(sub.deliver(&latest(3)), Delivery::Full);
        assert_eq!(sub.drop_count(), 2);
        assert_eq!(sub.last_sequence(), 1);
    }

    #[test]
    fn dropped_receiver_reports_closed() {
        let (sub, rx) = make_subscriber(4);
        drop(rx);
        assert_eq!(sub.deliver(&latest(1)), Delivery::Closed);
    }

    #[test]
    fn closed_subscriber_rejects_delivery() {
        let (sub, mut rx) = make_subscriber(4);
        let _ = sub.close();
        assert_eq!(sub.deliver(&latest(1)), Delivery::Closed);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn mark_alive_and_check() {
        let (sub, _rx) = make_subscriber(4);
        assert!(sub.check_alive());
        assert!(!sub.check_alive());
        sub.mark_alive();
        assert!(sub.check_alive());
    }

    #[test]
    fn removal_reason_labels() {
        assert_eq!(RemovalReason::Lagging.as_str(), "lagging");
        assert_eq!(RemovalReason::HeartbeatTimeout.as_str(), "heartbeat_timeout");
    }
}
