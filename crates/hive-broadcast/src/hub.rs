//! Ingestion and broadcast fan-out.
//!
//! Accepted readings are written to the [`ReadingStore`] and pushed to every
//! subscriber in a registry snapshot while holding the publish lock, so all
//! subscribers observe readings in store order. Publication runs on its own
//! task: once a reading is stored, every subscriber registered at that point
//! gets it even if the ingesting request goes away.
//!
//! Joins take no publish lock. A new subscriber is registered, replayed the
//! current value, then marked active. Per-subscriber sequence gating makes the
//! replay and a concurrent broadcast safe to interleave.

use std::sync::Arc;

use hive_core::{Reading, SubscriberId};
use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tracing::{Instrument, debug, info, instrument, warn};

use crate::config::HubConfig;
use crate::errors::{IngestError, SubscribeError};
use crate::metrics::{
    BROADCAST_DELIVERIES_TOTAL, BROADCAST_DROPS_TOTAL, READINGS_ACCEPTED_TOTAL,
    READINGS_REJECTED_TOTAL, SUBSCRIBERS_ACTIVE, SUBSCRIBERS_REMOVED_TOTAL,
};
use crate::registry::SubscriberRegistry;
use crate::store::{Latest, ReadingStore};
use crate::subscriber::{Delivery, RemovalReason, Subscriber};

/// Acknowledgment returned to the producer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct IngestAck {
    /// Store sequence assigned to the reading.
    pub sequence: u64,
    /// Subscribers the reading was queued for.
    pub delivered: usize,
}

/// Per-broadcast tally.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Subscribers the reading was queued for.
    pub delivered: usize,
    /// Subscribers whose queue was full.
    pub dropped: usize,
    /// Subscribers removed during this broadcast.
    pub removed: usize,
}

/// A joined subscriber and the receiving end of its queue.
#[derive(Debug)]
pub struct Subscription {
    /// Registry entry.
    pub subscriber: Arc<Subscriber>,
    /// Readings in delivery order, starting with the replay (if any).
    pub receiver: mpsc::Receiver<Arc<Latest>>,
}

/// Owns the store and registry and serializes publication.
pub struct TelemetryHub {
    core: Arc<HubCore>,
}

/// State shared with publish tasks.
struct HubCore {
    config: HubConfig,
    store: ReadingStore,
    registry: SubscriberRegistry,
    publish: Mutex<()>,
}

impl TelemetryHub {
    /// Create a hub with an empty store and registry.
    pub fn new(config: HubConfig) -> Self {
        let registry = SubscriberRegistry::new(config.max_subscribers);
        Self {
            core: Arc::new(HubCore {
                config,
                store: ReadingStore::new(),
                registry,
                publish: Mutex::new(()),
            }),
        }
    }

    /// The current reading, if any.
    pub fn current(&self) -> Option<Arc<Latest>> {
        self.core.store.get()
    }

    /// Readings accepted since startup.
    pub fn readings_accepted(&self) -> u64 {
        self.core.store.sequence()
    }

    /// Number of registered subscribers.
    pub async fn subscriber_count(&self) -> usize {
        self.core.registry.len().await
    }

    /// Validate a raw request body, store it, and fan it out.
    ///
    /// Rejected bodies leave the store untouched. An accepted reading is
    /// published to completion even if this future is dropped.
    #[instrument(skip_all, fields(bytes = body.len()))]
    pub async fn ingest(&self, body: &[u8]) -> Result<IngestAck, IngestError> {
        let reading = Reading::parse(body)
            .map_err(IngestError::from)
            .and_then(|r| self.core.check_required(r))
            .inspect_err(record_rejection)?;

        let core = Arc::clone(&self.core);
        tokio::spawn(async move { core.publish(reading).await }.in_current_span())
            .await
            .map_err(|e| {
                let err = IngestError::Internal(format!("publish task failed: {e}"));
                record_rejection(&err);
                err
            })
    }

    /// Register a new subscriber and replay the current reading to it.
    pub async fn subscribe(&self) -> Result<Subscription, SubscribeError> {
        let core = &self.core;
        let (tx, receiver) = mpsc::channel(core.config.queue_capacity);
        let subscriber = Arc::new(Subscriber::new(SubscriberId::new(), tx));

        core.registry.register(Arc::clone(&subscriber)).await?;
        metrics::gauge!(SUBSCRIBERS_ACTIVE).increment(1.0);

        let replayed = match core.store.get() {
            Some(latest) => subscriber.deliver(&latest) == Delivery::Sent,
            None => false,
        };
        let _ = subscriber.activate();

        info!(
            subscriber_id = %subscriber.id(),
            replayed,
            "subscriber joined"
        );
        Ok(Subscription {
            subscriber,
            receiver,
        })
    }

    /// Remove a subscriber by id. Idempotent.
    pub async fn unsubscribe(&self, id: &SubscriberId, reason: RemovalReason) -> bool {
        match self.core.registry.get(id).await {
            Some(subscriber) => self.core.remove(&subscriber, reason).await,
            None => false,
        }
    }

    /// Close and unregister every subscriber.
    pub async fn close_all(&self) -> usize {
        let drained = self.core.registry.drain().await;
        for subscriber in &drained {
            let _ = subscriber.close();
            metrics::gauge!(SUBSCRIBERS_ACTIVE).decrement(1.0);
            metrics::counter!(
                SUBSCRIBERS_REMOVED_TOTAL,
                "reason" => RemovalReason::Shutdown.as_str()
            )
            .increment(1);
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "closed all subscribers");
        }
        drained.len()
    }
}

impl HubCore {
    fn check_required(&self, reading: Reading) -> Result<Reading, IngestError> {
        let missing = reading.missing_fields(&self.config.required_fields);
        if missing.is_empty() {
            Ok(reading)
        } else {
            Err(IngestError::MissingFields(
                missing.into_iter().map(str::to_string).collect(),
            ))
        }
    }

    async fn publish(&self, reading: Reading) -> IngestAck {
        let _guard = self.publish.lock().await;
        let latest = self.store.set(reading);
        let report = self.broadcast(&latest).await;

        metrics::counter!(READINGS_ACCEPTED_TOTAL).increment(1);
        info!(
            sequence = latest.sequence,
            fields = latest.reading.len(),
            device_id = latest.reading.device_id(),
            delivered = report.delivered,
            dropped = report.dropped,
            "reading accepted"
        );

        IngestAck {
            sequence: latest.sequence,
            delivered: report.delivered,
        }
    }

    /// Deliver `latest` to every subscriber registered right now.
    ///
    /// Closed subscribers are removed. A full queue drops the reading for that
    /// subscriber; reaching `max_dropped_readings` removes it.
    async fn broadcast(&self, latest: &Arc<Latest>) -> BroadcastReport {
        let targets = self.registry.snapshot().await;
        let mut report = BroadcastReport::default();

        for subscriber in &targets {
            match subscriber.deliver(latest) {
                Delivery::Sent => report.delivered += 1,
                Delivery::Stale => {}
                Delivery::Full => {
                    report.dropped += 1;
                    let drops = subscriber.drop_count();
                    debug!(subscriber_id = %subscriber.id(), drops, "subscriber queue full");
                    if drops >= self.config.max_dropped_readings
                        && self.remove(subscriber, RemovalReason::Lagging).await
                    {
                        report.removed += 1;
                    }
                }
                Delivery::Closed => {
                    if self.remove(subscriber, RemovalReason::ChannelClosed).await {
                        report.removed += 1;
                    }
                }
            }
        }

        metrics::counter!(BROADCAST_DELIVERIES_TOTAL).increment(report.delivered as u64);
        if report.dropped > 0 {
            metrics::counter!(BROADCAST_DROPS_TOTAL).increment(report.dropped as u64);
        }
        debug!(
            sequence = latest.sequence,
            recipients = targets.len(),
            delivered = report.delivered,
            removed = report.removed,
            "broadcast reading"
        );
        report
    }

    async fn remove(&self, subscriber: &Subscriber, reason: RemovalReason) -> bool {
        let _ = subscriber.close();
        if !self.registry.unregister(subscriber.id()).await {
            return false;
        }
        metrics::gauge!(SUBSCRIBERS_ACTIVE).decrement(1.0);
        metrics::counter!(SUBSCRIBERS_REMOVED_TOTAL, "reason" => reason.as_str()).increment(1);
        match reason {
            RemovalReason::Disconnected | RemovalReason::Shutdown => info!(
                subscriber_id = %subscriber.id(),
                reason = reason.as_str(),
                "subscriber left"
            ),
            _ => warn!(
                subscriber_id = %subscriber.id(),
                reason = reason.as_str(),
                dropped = subscriber.drop_count(),
                "subscriber removed"
            ),
        }
        true
    }
}

fn record_rejection(err: &IngestError) {
    metrics::counter!(READINGS_REJECTED_TOTAL, "reason" => err.reason()).increment(1);
    if err.is_client_error() {
        debug!(error = %err, "reading rejected");
    } else {
        warn!(error = %err, "reading ingestion failed");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::subscriber::SubscriberState;
    use serde_json::{Value, json};

    fn hub() -> TelemetryHub {
        TelemetryHub::new(HubConfig::default())
    }

    fn hub_with(f: impl FnOnce(&mut HubConfig)) -> TelemetryHub {
        let mut config = HubConfig::default();
        f(&mut config);
        TelemetryHub::new(config)
    }

    fn body(v: &Value) -> Vec<u8> {
        serde_json::to_vec(v).unwrap()
    }

    #[tokio::test]
    async fn ingest_stores_and_acks() {
        let hub = hub();
        let ack = hub.ingest(br#"{"temperature": 21.5}"#).await.unwrap();
        assert_eq!(ack, IngestAck { sequence: 1, delivered: 0 });
        assert_eq!(hub.current().unwrap().reading.get("temperature"), Some(&json!(21.5)));
        assert_eq!(hub.readings_accepted(), 1);
    }

    #[tokio::test]
    async fn last_ingest_wins() {
        let hub = hub();
        for t in 0..10 {
            let _ = hub.ingest(&body(&json!({"t": t}))).await.unwrap();
        }
        let current = hub.current().unwrap();
        assert_eq!(current.sequence, 10);
        assert_eq!(current.reading.get("t"), Some(&json!(9)));
    }

    #[tokio::test]
    async fn malformed_ingest_leaves_store_untouched() {
        let hub = hub();
        let _ = hub.ingest(br#"{"temperature": 1}"#).await.unwrap();

        let bad_bodies: [&[u8]; 4] = [b"{not json", b"", b"[1,2]", b"\"text\""];
        for bad in bad_bodies {
            let err = hub.ingest(bad).await.unwrap_err();
            assert!(matches!(err, IngestError::Malformed(_)), "{err:?}");
        }
        let current = hub.current().unwrap();
        assert_eq!(current.sequence, 1);
        assert_eq!(current.reading.get("temperature"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn required_fields_are_enforced() {
        let hub = hub_with(|c| {
            c.required_fields = vec!["temperature".into(), "humidity".into()];
        });
        let err = hub.ingest(br#"{"temperature": 20}"#).await.unwrap_err();
        match err {
            IngestError::MissingFields(fields) => assert_eq!(fields, vec!["humidity"]),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(hub.current().is_none());

        let _ = hub
            .ingest(br#"{"temperature": 20, "humidity": 50}"#)
            .await
            .unwrap();
        assert!(hub.current().is_some());
    }

    #[tokio::test]
    async fn subscribe_on_empty_store_gets_no_replay() {
        let hub = hub();
        let mut sub = hub.subscribe().await.unwrap();
        assert_eq!(sub.subscriber.state(), SubscriberState::Active);
        assert!(sub.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn subscribe_replays_current_reading_first() {
        let hub = hub();
        let _ = hub.ingest(br#"{"n": 1}"#).await.unwrap();
        let _ = hub.ingest(br#"{"n": 2}"#).await.unwrap();

        let mut sub = hub.subscribe().await.unwrap();
        let replay = sub.receiver.try_recv().unwrap();
        assert_eq!(replay.sequence, 2);
        assert!(sub.receiver.try_recv().is_err());

        let _ = hub.ingest(br#"{"n": 3}"#).await.unwrap();
        assert_eq!(sub.receiver.try_recv().unwrap().sequence, 3);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let hub = hub();
        let mut a = hub.subscribe().await.unwrap();
        let mut b = hub.subscribe().await.unwrap();

        let ack = hub.ingest(br#"{"temperature": 22}"#).await.unwrap();
        assert_eq!(ack.delivered, 2);
        assert_eq!(a.receiver.try_recv().unwrap().sequence, 1);
        assert_eq!(b.receiver.try_recv().unwrap().sequence, 1);
    }

    #[tokio::test]
    async fn unsubscribed_subscriber_gets_nothing() {
        let hub = hub();
        let mut a = hub.subscribe().await.unwrap();
        let mut b = hub.subscribe().await.unwrap();

        assert!(hub.unsubscribe(a.subscriber.id(), RemovalReason::Disconnected).await);
        assert!(!hub.unsubscribe(a.subscriber.id(), RemovalReason::Disconnected).await);

        let ack = hub.ingest(br#"{"x": 1}"#).await.unwrap();
        assert_eq!(ack.delivered, 1);
        assert!(a.receiver.try_recv().is_err());
        assert_eq!(b.receiver.try_recv().unwrap().sequence, 1);
        assert!(a.subscriber.is_closed());
        assert_eq!(hub.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn closed_channel_is_removed_on_broadcast() {
        let hub = hub();
        let a = hub.subscribe().await.unwrap();
        let mut b = hub.subscribe().await.unwrap();
        drop(a.receiver);

        let _ = hub.ingest(br#"{"x": 1}"#).await.unwrap();
        assert_eq!(hub.subscriber_count().await, 1);
        assert!(a.subscriber.is_closed());
        assert_eq!(b.receiver.try_recv().unwrap().sequence, 1);
    }

    #[tokio::test]
    async fn lagging_subscriber_is_disconnected() {
        let hub = hub_with(|c| {
            c.queue_capacity = 1;
            c.max_dropped_readings = 2;
        });
        let slow = hub.subscribe().await.unwrap();
        let mut fast = hub.subscribe().await.unwrap();

        let _ = hub.ingest(br#"{"n": 1}"#).await.unwrap();
        let _ = fast.receiver.recv().await.unwrap();

        let _ = hub.ingest(br#"{"n": 2}"#).await.unwrap();
        let _ = fast.receiver.recv().await.unwrap();
        assert_eq!(slow.subscriber.drop_count(), 1);
        assert!(!slow.subscriber.is_closed());

        let _ = hub.ingest(br#"{"n": 3}"#).await.unwrap();
        assert_eq!(fast.receiver.recv().await.unwrap().sequence, 3);
        assert!(slow.subscriber.is_closed());
        assert!(slow.subscriber.closed().is_cancelled());
        assert_eq!(hub.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn cancelled_ingest_still_reaches_subscribers() {
        let hub = hub();
        let mut sub = hub.subscribe().await.unwrap();

        // Park the fan-out on the registry, then drop the ingesting future
        let registry = hub.core.registry.lock_exclusive().await;
        let cancelled = tokio::time::timeout(
            Duration::from_millis(50),
            hub.ingest(br#"{"n": 1}"#),
        )
        .await;
        assert!(cancelled.is_err());
        drop(registry);

        let ack = hub.ingest(br#"{"n": 2}"#).await.unwrap();
        assert_eq!(ack.sequence, 2);
        assert_eq!(sub.receiver.recv().await.unwrap().sequence, 1);
        assert_eq!(sub.receiver.recv().await.unwrap().sequence, 2);
        assert_eq!(hub.current().unwrap().sequence, 2);
    }

    #[tokio::test]
    async fn capacity_limit_rejects_new_subscribers() {
        let hub = hub_with(|c| c.max_subscribers = 1);
        let _a = hub.subscribe().await.unwrap();
        let err = hub.subscribe().await.unwrap_err();
        assert_eq!(err, SubscribeError::AtCapacity { limit: 1 });
    }

    #[tokio::test]
    async fn close_all_empties_registry() {
        let hub = hub();
        let a = hub.subscribe().await.unwrap();
        let _b = hub.subscribe().await.unwrap();
        assert_eq!(hub.close_all().await, 2);
        assert_eq!(hub.subscriber_count().await, 0);
        assert!(a.subscriber.is_closed());
    }

    #[tokio::test]
    async fn concurrent_ingest_preserves_order_per_subscriber() {
        let hub = Arc::new(hub_with(|c| c.queue_capacity = 512));
        let mut sub = hub.subscribe().await.unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|w| {
                let hub = Arc::clone(&hub);
                tokio::spawn(async move {
                    for i in 0..25 {
                        let _ = hub.ingest(&body(&json!({"w": w, "i": i}))).await.unwrap();
                    }
                })
            })
            .collect();
        for t in futures::future::join_all(tasks).await {
            t.unwrap();
        }

        let mut seen = Vec::new();
        while let Ok(latest) = sub.receiver.try_recv() {
            seen.push(latest.sequence);
        }
        assert_eq!(seen, (1..=200).collect::<Vec<_>>());
        assert_eq!(hub.current().unwrap().sequence, 200);
    }

    #[tokio::test]
    async fn join_racing_ingest_never_sees_stale_or_duplicate() {
        let hub = Arc::new(hub());
        let producer = {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move {
                for i in 0..50 {
                    let _ = hub.ingest(&body(&json!({"i": i}))).await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut subs = Vec::new();
        for _ in 0..10 {
            subs.push(hub.subscribe().await.unwrap());
            tokio::task::yield_now().await;
        }
        producer.await.unwrap();

        for mut sub in subs {
            let mut last = 0;
            while let Ok(latest) = sub.receiver.try_recv() {
                assert!(latest.sequence > last, "out of order: {} after {last}", latest.sequence);
                last = latest.sequence;
            }
            assert_eq!(last, 50);
        }
    }
}
