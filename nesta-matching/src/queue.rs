use std::sync::{Arc, Mutex};
use std::time::Duration;

use metrics::counter;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use nesta_shared::clients::rabbitmq::RabbitMQClient;
use nesta_shared::clients::store::StoreError;
use nesta_shared::errors::{AppError, ErrorCode};

use crate::events::publisher;
use crate::models::Swipe;
use crate::store::SwipeStore;

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub tick: Duration,
    pub backoff: Duration,
    pub capacity: usize,
    pub max_attempts: u32,
    pub store_timeout: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(334),
            backoff: Duration::from_millis(200),
            capacity: 10_000,
            max_attempts: 25,
            store_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug)]
struct QueuedSwipe {
    swipe: Swipe,
    attempts: u32,
}

/// A swipe that exhausted its retries. Kept in memory for inspection and
/// published as an event; delivery for these items is given up.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub swipe: Swipe,
    pub attempts: u32,
    pub error: String,
}

/// Producer half of the swipe ingestion queue. Enqueue is non-blocking;
/// a full channel is reported as backpressure rather than buffered without
/// bound.
#[derive(Clone)]
pub struct SwipeQueue {
    tx: mpsc::Sender<QueuedSwipe>,
}

impl SwipeQueue {
    pub fn new(
        swipes: SwipeStore,
        rabbitmq: Option<RabbitMQClient>,
        settings: QueueSettings,
    ) -> (Self, QueueConsumer) {
        let (tx, rx) = mpsc::channel(settings.capacity);
        let consumer = QueueConsumer {
            rx,
            tx: tx.clone(),
            swipes,
            rabbitmq,
            dead_letters: Arc::new(Mutex::new(Vec::new())),
            settings,
        };
        (Self { tx }, consumer)
    }

    pub fn enqueue(&self, swipe: Swipe) -> Result<(), AppError> {
        match self.tx.try_send(QueuedSwipe { swipe, attempts: 0 }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(AppError::new(
                ErrorCode::QueueFull,
                "swipe queue is full, try again shortly",
            )),
            Err(TrySendError::Closed(_)) => Err(AppError::new(
                ErrorCode::ServiceUnavailable,
                "swipe queue consumer is not running",
            )),
        }
    }

    /// Number of swipes currently buffered and awaiting the consumer.
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Queue was empty.
    Idle,
    Persisted,
    /// Store rejected the write for capacity; item went back to the tail and
    /// the consumer should pause before the next tick.
    Throttled,
    /// Write failed for another reason; item went back to the tail.
    Requeued,
    DeadLettered,
}

/// Single consumer draining the queue at a fixed rate: one item per tick,
/// which serializes all swipe persistence through one logical writer no
/// matter how many producers there are.
pub struct QueueConsumer {
    rx: mpsc::Receiver<QueuedSwipe>,
    tx: mpsc::Sender<QueuedSwipe>,
    swipes: SwipeStore,
    rabbitmq: Option<RabbitMQClient>,
    dead_letters: Arc<Mutex<Vec<DeadLetter>>>,
    settings: QueueSettings,
}

impl QueueConsumer {
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().unwrap().clone()
    }

    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.settings.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if self.tick().await == TickOutcome::Throttled {
                tokio::time::sleep(self.settings.backoff).await;
            }
        }
    }

    /// Processes at most one queued swipe. Exposed separately from `run` so
    /// tests can drive the consumer deterministically.
    pub async fn tick(&mut self) -> TickOutcome {
        let Ok(mut queued) = self.rx.try_recv() else {
            return TickOutcome::Idle;
        };

        let write = tokio::time::timeout(
            self.settings.store_timeout,
            self.swipes.record(&queued.swipe),
        )
        .await
        .unwrap_or(Err(StoreError::Timeout));

        match write {
            Ok(()) => {
                counter!("swipes_persisted_total").increment(1);
                if let Some(rabbitmq) = &self.rabbitmq {
                    publisher::publish_swipe_recorded(rabbitmq, &queued.swipe).await;
                }
                TickOutcome::Persisted
            }
            Err(StoreError::ThroughputExceeded) => {
                // Transient overload: retried indefinitely, does not count
                // toward the attempt cap
                counter!("swipe_retries_total", "reason" => "throttled").increment(1);
                tracing::warn!(
                    swiper_id = %queued.swipe.swiper_id,
                    "throughput exceeded, requeueing swipe"
                );
                self.requeue(queued);
                TickOutcome::Throttled
            }
            Err(err) => {
                queued.attempts += 1;
                if queued.attempts >= self.settings.max_attempts {
                    self.dead_letter(queued, &err).await;
                    TickOutcome::DeadLettered
                } else {
                    counter!("swipe_retries_total", "reason" => "error").increment(1);
                    tracing::error!(
                        error = %err,
                        attempts = queued.attempts,
                        swiper_id = %queued.swipe.swiper_id,
                        "swipe persistence failed, requeueing"
                    );
                    self.requeue(queued);
                    TickOutcome::Requeued
                }
            }
        }
    }

    fn requeue(&self, queued: QueuedSwipe) {
        // Tail, not head: a retried item moves behind newer arrivals. If the
        // channel filled up in the meantime the item is dropped with a log;
        // capacity is sized so this only happens when the store is down for
        // far longer than the retention of the queue is worth.
        if let Err(TrySendError::Full(item)) = self.tx.try_send(queued) {
            counter!("swipes_dead_lettered_total").increment(1);
            tracing::error!(
                swiper_id = %item.swipe.swiper_id,
                "queue full on requeue, dropping swipe to dead letters"
            );
            self.dead_letters.lock().unwrap().push(DeadLetter {
                swipe: item.swipe,
                attempts: item.attempts,
                error: "queue full on requeue".into(),
            });
        }
    }

    async fn dead_letter(&self, queued: QueuedSwipe, err: &StoreError) {
        counter!("swipes_dead_lettered_total").increment(1);
        tracing::error!(
            error = %err,
            attempts = queued.attempts,
            swiper_id = %queued.swipe.swiper_id,
            target_id = %queued.swipe.target_id,
            "swipe exhausted retries, dead-lettering"
        );
        if let Some(rabbitmq) = &self.rabbitmq {
            publisher::publish_swipe_dead_lettered(rabbitmq, &queued.swipe, queued.attempts).await;
        }
        self.dead_letters.lock().unwrap().push(DeadLetter {
            swipe: queued.swipe,
            attempts: queued.attempts,
            error: err.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;
    use nesta_shared::clients::store::MemoryStore;

    const TABLE: &str = "swipe_logs";

    fn setup(capacity: usize, max_attempts: u32) -> (Arc<MemoryStore>, SwipeQueue, QueueConsumer) {
        let mem = Arc::new(MemoryStore::new());
        let swipes = SwipeStore::new(mem.clone(), TABLE, 2);
        let settings = QueueSettings {
            capacity,
            max_attempts,
            ..QueueSettings::default()
        };
        let (queue, consumer) = SwipeQueue::new(swipes, None, settings);
        (mem, queue, consumer)
    }

    fn swipe(n: usize) -> Swipe {
        Swipe {
            swiper_id: format!("u{n}"),
            target_id: "t".into(),
            direction: Direction::Right,
            timestamp_micros: n as i64,
            expires_at: 0,
        }
    }

    async fn drain(consumer: &mut QueueConsumer) {
        while consumer.tick().await != TickOutcome::Idle {}
    }

    #[tokio::test]
    async fn empty_queue_is_idle() {
        let (mem, _queue, mut consumer) = setup(16, 5);
        assert_eq!(consumer.tick().await, TickOutcome::Idle);
        assert!(mem.is_empty(TABLE));
    }

    #[tokio::test]
    async fn single_swipe_is_persisted_once() {
        let (mem, queue, mut consumer) = setup(16, 5);
        queue.enqueue(swipe(1)).unwrap();

        assert_eq!(consumer.tick().await, TickOutcome::Persisted);
        assert_eq!(consumer.tick().await, TickOutcome::Idle);
        assert_eq!(mem.len(TABLE), 1);
    }

    #[tokio::test]
    async fn hundred_swipes_all_land_exactly_once() {
        let (mem, queue, mut consumer) = setup(256, 5);
        for n in 0..100 {
            queue.enqueue(swipe(n)).unwrap();
        }
        drain(&mut consumer).await;
        assert_eq!(mem.len(TABLE), 100);
    }

    #[tokio::test]
    async fn throttled_item_converges_to_exactly_one_write() {
        let (mem, queue, mut consumer) = setup(16, 5);
        mem.throttle_next_puts(3);
        queue.enqueue(swipe(1)).unwrap();

        for _ in 0..3 {
            assert_eq!(consumer.tick().await, TickOutcome::Throttled);
        }
        assert_eq!(consumer.tick().await, TickOutcome::Persisted);
        assert_eq!(consumer.tick().await, TickOutcome::Idle);
        assert_eq!(mem.len(TABLE), 1);
    }

    #[tokio::test]
    async fn throttling_does_not_consume_attempts() {
        let (mem, queue, mut consumer) = setup(16, 2);
        mem.throttle_next_puts(10);
        queue.enqueue(swipe(1)).unwrap();

        for _ in 0..10 {
            assert_eq!(consumer.tick().await, TickOutcome::Throttled);
        }
        assert_eq!(consumer.tick().await, TickOutcome::Persisted);
        assert_eq!(mem.len(TABLE), 1);
        assert!(consumer.dead_letters().is_empty());
    }

    #[tokio::test]
    async fn persistent_failure_dead_letters_after_cap() {
        let (mem, queue, mut consumer) = setup(16, 3);
        mem.fail_next_puts(10);
        queue.enqueue(swipe(1)).unwrap();

        assert_eq!(consumer.tick().await, TickOutcome::Requeued);
        assert_eq!(consumer.tick().await, TickOutcome::Requeued);
        assert_eq!(consumer.tick().await, TickOutcome::DeadLettered);
        assert_eq!(consumer.tick().await, TickOutcome::Idle);

        assert!(mem.is_empty(TABLE));
        let dead = consumer.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 3);
    }

    #[tokio::test]
    async fn requeued_item_moves_behind_newer_arrivals() {
        let (mem, queue, mut consumer) = setup(16, 5);
        mem.fail_next_puts(1);
        queue.enqueue(swipe(1)).unwrap();
        queue.enqueue(swipe(2)).unwrap();

        assert_eq!(consumer.tick().await, TickOutcome::Requeued);
        assert_eq!(consumer.tick().await, TickOutcome::Persisted); // swipe 2
        assert_eq!(mem.len(TABLE), 1);
        assert_eq!(consumer.tick().await, TickOutcome::Persisted); // retried swipe 1
        assert_eq!(mem.len(TABLE), 2);
    }

    #[tokio::test]
    async fn full_queue_rejects_with_backpressure() {
        let (_mem, queue, _consumer) = setup(1, 5);
        queue.enqueue(swipe(1)).unwrap();

        let err = queue.enqueue(swipe(2)).unwrap_err();
        match err {
            AppError::Known { code, .. } => assert_eq!(code, ErrorCode::QueueFull),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
