//! Heartbeat ping/pong liveness monitoring.

use std::sync::Arc;
use std::time::Duration;

use hive_broadcast::Subscriber;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The client stopped responding within the timeout window.
    TimedOut,
    /// The heartbeat was cancelled externally.
    Cancelled,
}

/// Consecutive missed checks tolerated: `timeout / interval`, at least 1.
pub fn max_missed(interval: Duration, timeout: Duration) -> u32 {
    let interval_ms = interval.as_millis().max(1);
    u32::try_from((timeout.as_millis() / interval_ms).max(1)).unwrap_or(u32::MAX)
}

/// Watch a subscriber's alive flag.
///
/// The first check happens one `interval` after start, so it sees the pong to
/// the ping the session writer sends on connect. Every check consumes the
/// flag; `max_missed` consecutive checks without a pong end the loop with
/// [`HeartbeatResult::TimedOut`].
pub async fn run_heartbeat(
    subscriber: Arc<Subscriber>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut check_interval = time::interval_at(Instant::now() + interval, interval);
    let limit = max_missed(interval, timeout);
    let mut missed: u32 = 0;

    loop {
        tokio::select! {
            _ = check_interval.tick() => {
                if subscriber.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    tracing::debug!(subscriber_id = %subscriber.id(), missed, "missed pong");
                    if missed >= limit {
                        tracing::warn!(
                            subscriber_id = %subscriber.id(),
                            since_pong_secs = subscriber.last_pong_elapsed().as_secs(),
                            age_secs = subscriber.age().as_secs(),
                            "heartbeat timed out"
                        );
                        return HeartbeatResult::TimedOut;
                    }
                }
            }
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_core::SubscriberId;
    use tokio::sync::mpsc;

    fn make_subscriber() -> Arc<Subscriber> {
        let (tx, _rx) = mpsc::channel(4);
        Arc::new(Subscriber::new(SubscriberId::from_raw("sub_hb"), tx))
    }

    #[test]
    fn max_missed_ratio() {
        assert_eq!(max_missed(Duration::from_secs(30), Duration::from_secs(90)), 3);
        assert_eq!(max_missed(Duration::from_secs(30), Duration::from_secs(10)), 1);
        assert_eq!(max_missed(Duration::from_millis(10), Duration::from_millis(35)), 3);
    }

    #[tokio::test]
    async fn heartbeat_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = run_heartbeat(
            make_subscriber(),
            Duration::from_secs(100),
            Duration::from_secs(300),
            cancel,
        )
        .await;
        assert_eq!(result, HeartbeatResult::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_subscriber_times_out() {
        let sub = make_subscriber();
        let started = Instant::now();

        let result = run_heartbeat(
            sub,
            Duration::from_secs(30),
            Duration::from_secs(90),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(result, HeartbeatResult::TimedOut);
        // First check consumes the initial alive flag, then three misses.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(120), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(121), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn responsive_subscriber_stays_alive() {
        let sub = make_subscriber();
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run_heartbeat(
            Arc::clone(&sub),
            Duration::from_secs(10),
            Duration::from_secs(20),
            cancel.clone(),
        ));

        for _ in 0..10 {
            time::sleep(Duration::from_secs(5)).await;
            sub.mark_alive();
        }
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), HeartbeatResult::Cancelled);
    }
}
