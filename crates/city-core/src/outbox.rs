//! Per-session outbound queues with the perception-drops-first policy.
//!
//! The tick worker pushes [`ServerMessage`]s into an outbox; the session's
//! writer task drains it. The queue is bounded: when full, the oldest
//! *perception* message is evicted to make room, and an incoming
//! perception is simply dropped if no stale one can be evicted. Speech,
//! events, pain, and action results are never dropped -- they ride over
//! the bound and mark the outbox as overflowing; a session that stays
//! overflowed past its deadline is closed by the engine.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

use city_types::ServerMessage;
use tokio::sync::Notify;

/// What happened to a pushed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Queued within the bound.
    Queued,
    /// Queued after evicting a stale perception tick.
    EvictedStale,
    /// The pushed perception itself was dropped (no stale tick to evict).
    Dropped,
    /// A critical message was queued over the bound.
    Overflowed,
}

/// A bounded outbound queue for one session.
#[derive(Debug)]
pub struct SessionOutbox {
    inner: Mutex<Inner>,
    notify: Notify,
    capacity: usize,
}

#[derive(Debug)]
struct Inner {
    queue: VecDeque<ServerMessage>,
    overflow_since: Option<Instant>,
    closed: bool,
}

impl SessionOutbox {
    /// Create an outbox with the given bound.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                overflow_since: None,
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Push a message, applying the drop policy.
    pub fn push(&self, message: ServerMessage) -> PushOutcome {
        let outcome = {
            let Ok(mut inner) = self.inner.lock() else {
                return PushOutcome::Dropped;
            };
            if inner.closed {
                return PushOutcome::Dropped;
            }

            let outcome = if inner.queue.len() < self.capacity {
                inner.queue.push_back(message);
                PushOutcome::Queued
            } else if message.is_droppable() {
                // Evict the oldest stale perception to make room.
                let stale = inner.queue.iter().position(ServerMessage::is_droppable);
                match stale {
                    Some(index) => {
                        inner.queue.remove(index);
                        inner.queue.push_back(message);
                        PushOutcome::EvictedStale
                    }
                    None => PushOutcome::Dropped,
                }
            } else {
                // Critical messages ride over the bound.
                let stale = inner.queue.iter().position(ServerMessage::is_droppable);
                if let Some(index) = stale {
                    inner.queue.remove(index);
                    inner.queue.push_back(message);
                    PushOutcome::EvictedStale
                } else {
                    inner.queue.push_back(message);
                    if inner.overflow_since.is_none() {
                        inner.overflow_since = Some(Instant::now());
                    }
                    PushOutcome::Overflowed
                }
            };

            if inner.queue.len() <= self.capacity {
                inner.overflow_since = None;
            }
            outcome
        };
        self.notify.notify_one();
        outcome
    }

    /// Take the next message without waiting.
    pub fn try_pop(&self) -> Option<ServerMessage> {
        let Ok(mut inner) = self.inner.lock() else {
            return None;
        };
        let message = inner.queue.pop_front();
        if inner.queue.len() <= self.capacity {
            inner.overflow_since = None;
        }
        message
    }

    /// Wait for the next message. Returns `None` once the outbox is
    /// closed and drained.
    pub async fn pop(&self) -> Option<ServerMessage> {
        loop {
            if let Some(message) = self.try_pop() {
                return Some(message);
            }
            if self.is_closed() {
                return None;
            }
            self.notify.notified().await;
        }
    }

    /// How long the outbox has been continuously over its bound.
    pub fn overflowed_for(&self) -> Option<std::time::Duration> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.overflow_since.map(|since| since.elapsed()))
    }

    /// Close the outbox; the writer drains what remains and stops.
    pub fn close(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.closed = true;
        }
        self.notify.notify_one();
    }

    /// Whether the outbox has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().map(|inner| inner.closed).unwrap_or(true)
    }

    /// Current queue depth.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.queue.len()).unwrap_or(0)
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use city_types::{PainIntensity, PainSource, PerceptionUpdate};

    use super::*;

    fn perception(tick: u64) -> ServerMessage {
        ServerMessage::Perception(PerceptionUpdate {
            tick,
            world_time: 0.0,
            time_of_day: String::from("morning"),
            self_view: sample_self(),
            residents: Vec::new(),
            objects: Vec::new(),
            buildings: Vec::new(),
            audible: Vec::new(),
            interactions: Vec::new(),
            notifications: Vec::new(),
            forage_delta: Vec::new(),
        })
    }

    fn sample_self() -> city_types::SelfView {
        city_types::SelfView {
            id: city_types::ResidentId::new(),
            passport: String::from("CITY-AB12C"),
            name: String::from("Ada"),
            x: 0.0,
            y: 0.0,
            facing: 0.0,
            building: None,
            sleeping: false,
            needs: city_types::NeedsView {
                hunger: 100.0,
                thirst: 100.0,
                energy: 100.0,
                bladder: 0.0,
                health: 100.0,
                social: 100.0,
            },
            wallet: 0,
            inventory: Vec::new(),
            employment: None,
            law: city_types::LawView {
                wanted: false,
                violations: Vec::new(),
                imprisoned_until: None,
            },
            feedback_token: None,
        }
    }

    fn pain() -> ServerMessage {
        ServerMessage::Pain {
            source: PainSource::Hunger,
            intensity: PainIntensity::Severe,
            text: String::from("gnawing emptiness"),
        }
    }

    #[test]
    fn full_queue_evicts_oldest_perception() {
        let outbox = SessionOutbox::new(2);
        assert_eq!(outbox.push(perception(1)), PushOutcome::Queued);
        assert_eq!(outbox.push(perception(2)), PushOutcome::Queued);
        assert_eq!(outbox.push(perception(3)), PushOutcome::EvictedStale);
        assert_eq!(outbox.len(), 2);

        // Tick 1 was evicted; 2 and 3 remain.
        let first = outbox.try_pop().unwrap();
        match first {
            ServerMessage::Perception(update) => assert_eq!(update.tick, 2),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn critical_messages_survive_overflow() {
        let outbox = SessionOutbox::new(1);
        let _ = outbox.push(pain());
        // Queue full of non-droppable messages: criticals overflow, never drop.
        assert_eq!(outbox.push(pain()), PushOutcome::Overflowed);
        assert_eq!(outbox.len(), 2);
        assert!(outbox.overflowed_for().is_some());
    }

    #[test]
    fn critical_evicts_perception_first() {
        let outbox = SessionOutbox::new(1);
        let _ = outbox.push(perception(1));
        assert_eq!(outbox.push(pain()), PushOutcome::EvictedStale);
        assert_eq!(outbox.len(), 1);
        assert!(outbox.overflowed_for().is_none());
        let message = outbox.try_pop().unwrap();
        assert!(matches!(message, ServerMessage::Pain { .. }));
    }

    #[test]
    fn perception_dropped_when_nothing_stale() {
        let outbox = SessionOutbox::new(1);
        let _ = outbox.push(pain());
        assert_eq!(outbox.push(perception(1)), PushOutcome::Dropped);
        assert_eq!(outbox.len(), 1);
    }

    #[tokio::test]
    async fn pop_waits_for_push() {
        let outbox = std::sync::Arc::new(SessionOutbox::new(4));
        let reader = std::sync::Arc::clone(&outbox);
        let handle = tokio::spawn(async move { reader.pop().await });
        tokio::task::yield_now().await;
        let _ = outbox.push(pain());
        let message = handle.await.unwrap();
        assert!(matches!(message, Some(ServerMessage::Pain { .. })));
    }

    #[tokio::test]
    async fn closed_outbox_drains_then_ends() {
        let outbox = SessionOutbox::new(4);
        let _ = outbox.push(pain());
        outbox.close();
        assert!(outbox.pop().await.is_some());
        assert!(outbox.pop().await.is_none());
    }
}
