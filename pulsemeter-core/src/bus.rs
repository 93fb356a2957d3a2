//! Topic-based Event Bus
//!
//! ## Overview
//!
//! Subscribers register a callback per [`Topic`]. Publishing a [`BusEvent`]
//! calls every subscriber of its topic, synchronously and in subscription
//! order, before `publish` returns.
//!
//! ```text
//! publish(DamageObserved(&record))
//!     │
//!     ├──→ subscriber 1 ──→ Ok
//!     ├──→ subscriber 2 ──→ Err(..)   counted, dispatch continues
//!     └──→ subscriber 3 ──→ panic     caught, counted, dispatch continues
//! ```
//!
//! ## Failure Isolation
//!
//! A subscriber that returns an error or panics never stops delivery to the
//! others and never reaches the publisher. Both are counted per subscriber
//! and per topic, and summarized in the returned [`DispatchReport`].
//!
//! ## Borrowed Payloads
//!
//! Callbacks are `for<'a> FnMut(&BusEvent<'a>)`: they see the payload only
//! for the duration of the call. Keeping a reference past the callback does
//! not compile, which is what lets the pipeline recycle pooled records right
//! after dispatch. Subscribers that need data later copy what they need.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::Serialize;

use crate::errors::SubscriberError;
use crate::events::{BusEvent, Topic};
use crate::pool::{Lease, Poolable};

/// Boxed subscriber callback
pub type SubscriberFn = Box<dyn for<'a> FnMut(&BusEvent<'a>) -> Result<(), SubscriberError>>;

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    label: String,
    callback: SubscriberFn,
    delivered: u64,
    failures: u64,
}

#[derive(Default)]
struct Channel {
    subscribers: Vec<Subscriber>,
    published: u64,
    delivered: u64,
    failures: u64,
}

/// Outcome of one publish call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub topic: Topic,
    /// Subscribers that handled the event
    pub delivered: usize,
    /// Subscribers that returned an error or panicked
    pub failed: usize,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Per-topic counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TopicStats {
    pub subscribers: usize,
    pub published: u64,
    pub delivered: u64,
    pub failures: u64,
}

/// Per-subscriber counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriberStats {
    pub id: SubscriptionId,
    pub label: String,
    pub delivered: u64,
    pub failures: u64,
}

/// Bus-wide counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusStats {
    pub dispatches: u64,
    pub failures: u64,
    pub topics: Vec<(Topic, TopicStats)>,
}

/// Synchronous publish/subscribe hub
pub struct EventBus {
    channels: [Channel; Topic::COUNT],
    next_id: u64,
    dispatches: u64,
    failures: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            channels: Default::default(),
            next_id: 1,
            dispatches: 0,
            failures: 0,
        }
    }

    /// Register `callback` for `topic`
    ///
    /// `label` only shows up in logs and stats.
    pub fn subscribe<F>(&mut self, topic: Topic, label: impl Into<String>, callback: F) -> SubscriptionId
    where
        F: for<'a> FnMut(&BusEvent<'a>) -> Result<(), SubscriberError> + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        let label = label.into();
        log::debug!("subscriber '{label}' ({id:?}) joined {topic}");
        self.channels[topic.index()].subscribers.push(Subscriber {
            id,
            label,
            callback: Box::new(callback),
            delivered: 0,
            failures: 0,
        });
        id
    }

    /// Remove a subscription; false when it was not subscribed to `topic`
    pub fn unsubscribe(&mut self, topic: Topic, id: SubscriptionId) -> bool {
        let subscribers = &mut self.channels[topic.index()].subscribers;
        match subscribers.iter().position(|s| s.id == id) {
            Some(index) => {
                let removed = subscribers.remove(index);
                log::debug!("subscriber '{}' left {topic}", removed.label);
                true
            }
            None => false,
        }
    }

    /// Deliver `event` to every subscriber of its topic
    ///
    /// A topic with no subscribers is a no-op apart from the counters.
    pub fn publish(&mut self, event: &BusEvent<'_>) -> DispatchReport {
        let topic = event.topic();
        let channel = &mut self.channels[topic.index()];
        channel.published += 1;
        self.dispatches += 1;

        let mut report = DispatchReport {
            topic,
            delivered: 0,
            failed: 0,
        };
        for subscriber in &mut channel.subscribers {
            let outcome = catch_unwind(AssertUnwindSafe(|| (subscriber.callback)(event)))
                .unwrap_or_else(|payload| Err(SubscriberError::Panicked(panic_message(payload))));
            match outcome {
                Ok(()) => {
                    subscriber.delivered += 1;
                    report.delivered += 1;
                }
                Err(err) => {
                    subscriber.failures += 1;
                    report.failed += 1;
                    log::warn!("subscriber '{}' on {topic}: {err}", subscriber.label);
                }
            }
        }

        channel.delivered += report.delivered as u64;
        channel.failures += report.failed as u64;
        self.failures += report.failed as u64;
        report
    }

    /// Publish a pooled record, then release it
    ///
    /// `wrap` builds the event around the leased record. The lease is dropped
    /// once dispatch returns, which hands the record back to its pool.
    pub fn publish_pooled<T, F>(&mut self, lease: Lease<'_, T>, wrap: F) -> DispatchReport
    where
        T: Poolable,
        F: for<'a> FnOnce(&'a T) -> BusEvent<'a>,
    {
        let report = self.publish(&wrap(&*lease));
        drop(lease);
        report
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.channels[topic.index()].subscribers.len()
    }

    pub fn topic_stats(&self, topic: Topic) -> TopicStats {
        let channel = &self.channels[topic.index()];
        TopicStats {
            subscribers: channel.subscribers.len(),
            published: channel.published,
            delivered: channel.delivered,
            failures: channel.failures,
        }
    }

    pub fn subscriber_stats(&self, topic: Topic) -> Vec<SubscriberStats> {
        self.channels[topic.index()]
            .subscribers
            .iter()
            .map(|s| SubscriberStats {
                id: s.id,
                label: s.label.clone(),
                delivered: s.delivered,
                failures: s.failures,
            })
            .collect()
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            dispatches: self.dispatches,
            failures: self.failures,
            topics: Topic::ALL
                .into_iter()
                .map(|topic| (topic, self.topic_stats(topic)))
                .collect(),
        }
    }

    /// Drop every subscriber of every topic
    pub fn clear(&mut self) {
        for channel in &mut self.channels {
            channel.subscribers.clear();
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CombatStateRecord, DamageRecord};
    use crate::pool::{ObjectPool, PoolConfig};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn damage(amount: f64) -> DamageRecord {
        DamageRecord {
            amount,
            ..Default::default()
        }
    }

    #[test]
    fn delivers_in_subscription_order() {
        let mut bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for name in ["first", "second"] {
            let seen = Rc::clone(&seen);
            bus.subscribe(Topic::DamageObserved, name, move |event| {
                if let BusEvent::DamageObserved(record) = event {
                    seen.borrow_mut().push((name, record.amount));
                }
                Ok(())
            });
        }

        let report = bus.publish(&BusEvent::DamageObserved(&damage(42.0)));
        assert_eq!(report.delivered, 2);
        assert_eq!(*seen.borrow(), vec![("first", 42.0), ("second", 42.0)]);
    }

    #[test]
    fn failures_do_not_stop_dispatch() {
        let mut bus = EventBus::new();
        let reached = Rc::new(RefCell::new(0));

        bus.subscribe(Topic::DamageObserved, "erroring", |_| {
            Err(SubscriberError::failed("display not ready"))
        });
        bus.subscribe(Topic::DamageObserved, "panicking", |_| panic!("boom"));
        let counter = Rc::clone(&reached);
        bus.subscribe(Topic::DamageObserved, "healthy", move |_| {
            *counter.borrow_mut() += 1;
            Ok(())
        });

        let report = bus.publish(&BusEvent::DamageObserved(&damage(1.0)));
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 2);
        assert!(!report.is_clean());
        assert_eq!(*reached.borrow(), 1);

        let stats = bus.subscriber_stats(Topic::DamageObserved);
        assert_eq!(stats[0].failures, 1);
        assert_eq!(stats[1].failures, 1);
        assert_eq!(stats[2].delivered, 1);
        assert_eq!(bus.stats().failures, 2);
    }

    #[test]
    fn topics_are_isolated() {
        let mut bus = EventBus::new();
        let hits = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&hits);
        bus.subscribe(Topic::CombatStart, "combat", move |_| {
            *counter.borrow_mut() += 1;
            Ok(())
        });

        bus.publish(&BusEvent::DamageObserved(&damage(5.0)));
        assert_eq!(*hits.borrow(), 0);
        bus.publish(&BusEvent::CombatStart(&CombatStateRecord::default()));
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut bus = EventBus::new();
        let id = bus.subscribe(Topic::UiRefreshTick, "ui", |_| Ok(()));
        assert_eq!(bus.subscriber_count(Topic::UiRefreshTick), 1);
        assert!(!bus.unsubscribe(Topic::CombatEnd, id));
        assert!(bus.unsubscribe(Topic::UiRefreshTick, id));
        assert!(!bus.unsubscribe(Topic::UiRefreshTick, id));
        assert_eq!(bus.subscriber_count(Topic::UiRefreshTick), 0);
    }

    #[test]
    fn publishing_without_subscribers_is_a_no_op() {
        let mut bus = EventBus::new();
        let report = bus.publish(&BusEvent::DamageObserved(&damage(1.0)));
        assert_eq!(report.delivered + report.failed, 0);
        assert_eq!(bus.topic_stats(Topic::DamageObserved).published, 1);
    }

    #[test]
    fn pooled_records_return_after_dispatch() {
        let mut bus = EventBus::new();
        let mut pool: ObjectPool<DamageRecord> = ObjectPool::new("damageEvent", PoolConfig::with_capacity(4));
        bus.subscribe(Topic::DamageObserved, "panicking", |_| panic!("still released"));

        let mut lease = pool.lease().unwrap();
        lease.amount = 77.0;
        let report = bus.publish_pooled(lease, |r| BusEvent::DamageObserved(r));

        assert_eq!(report.failed, 1);
        assert_eq!(pool.outstanding(), 0);
        assert!(pool.stats().is_balanced());
    }
}
