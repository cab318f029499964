use crate::event::EngineEvent;
use parking_lot::Mutex;
use smol_str::SmolStr;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::warn;

/// Receiving half of a bus subscription. Events arrive in publish order;
/// when the bounded queue overflows the oldest event is dropped and the
/// loss is counted, never silent.
#[derive(Debug, Clone)]
pub struct BusSubscription {
    name: SmolStr,
    queue: Arc<Mutex<SubscriberQueue>>,
}

#[derive(Debug)]
struct SubscriberQueue {
    events: VecDeque<EngineEvent>,
    capacity: usize,
    dropped: u64,
    closed: bool,
}

impl BusSubscription {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pop the next event, if any.
    pub fn poll(&self) -> Option<EngineEvent> {
        self.queue.lock().events.pop_front()
    }

    /// Drain everything currently queued.
    pub fn drain(&self) -> Vec<EngineEvent> {
        self.queue.lock().events.drain(..).collect()
    }

    /// Events lost to overflow since the last
    /// [`take_dropped`](Self::take_dropped).
    pub fn dropped(&self) -> u64 {
        self.queue.lock().dropped
    }

    pub fn take_dropped(&self) -> u64 {
        let mut queue = self.queue.lock();
        std::mem::take(&mut queue.dropped)
    }

    pub fn len(&self) -> usize {
        self.queue.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().events.is_empty()
    }

    /// Unsubscribe: the bus forgets the queue on its next publish.
    pub fn close(&self) {
        self.queue.lock().closed = true;
    }
}

/// Typed in-process pub/sub spine. At-most-once, per-subscriber bounded
/// queues, publish-order delivery per partition key (a single publisher
/// side serialises everything).
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<BusSubscription>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber with a bounded queue.
    pub fn subscribe(&self, name: impl AsRef<str>, capacity: usize) -> BusSubscription {
        let subscription = BusSubscription {
            name: SmolStr::new(name),
            queue: Arc::new(Mutex::new(SubscriberQueue {
                events: VecDeque::new(),
                capacity: capacity.max(1),
                dropped: 0,
                closed: false,
            })),
        };
        self.subscribers.lock().push(subscription.clone());
        subscription
    }

    /// Deliver one event to every live subscriber.
    pub fn publish(&self, event: &EngineEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|subscription| {
            let mut queue = subscription.queue.lock();
            if queue.closed {
                return false;
            }
            if queue.events.len() >= queue.capacity {
                queue.events.pop_front();
                queue.dropped += 1;
                if queue.dropped == 1 || queue.dropped.is_multiple_of(100) {
                    warn!(
                        subscriber = subscription.name.as_str(),
                        dropped = queue.dropped,
                        "bus queue overflow, oldest event dropped"
                    );
                }
            }
            queue.events.push_back(event.clone());
            true
        });
    }

    /// Overflow counters per subscriber since last collection, for
    /// publication as `eventDropped` warnings.
    pub fn collect_drops(&self) -> Vec<(SmolStr, u64)> {
        self.subscribers
            .lock()
            .iter()
            .filter_map(|subscription| {
                let dropped = subscription.take_dropped();
                (dropped > 0).then(|| (subscription.name.clone(), dropped))
            })
            .collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn event(secs: i64) -> EngineEvent {
        EngineEvent::EngineStarted {
            time: DateTime::from_timestamp(secs, 0).unwrap(),
        }
    }

    #[test]
    fn delivery_preserves_publish_order() {
        let bus = EventBus::new();
        let sub = bus.subscribe("audit", 16);
        for i in 0..5 {
            bus.publish(&event(i));
        }
        let times: Vec<_> = sub
            .drain()
            .into_iter()
            .filter_map(|event| event.time())
            .collect();
        assert!(times.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn overflow_drops_oldest_and_counts() {
        let bus = EventBus::new();
        let sub = bus.subscribe("slow", 3);
        for i in 0..5 {
            bus.publish(&event(i));
        }
        assert_eq!(sub.len(), 3);
        assert_eq!(sub.dropped(), 2);
        // The survivors are the newest three.
        let first = sub.poll().unwrap().time().unwrap();
        assert_eq!(first, DateTime::from_timestamp(2, 0).unwrap());

        let drops = bus.collect_drops();
        assert_eq!(drops.len(), 1);
        assert_eq!(drops[0].1, 2);
        assert_eq!(sub.dropped(), 0);
    }

    #[test]
    fn closed_subscribers_are_forgotten() {
        let bus = EventBus::new();
        let sub = bus.subscribe("gone", 4);
        sub.close();
        bus.publish(&event(0));
        assert_eq!(bus.subscriber_count(), 0);
        assert!(sub.is_empty());
    }

    #[test]
    fn subscribers_receive_independently() {
        let bus = EventBus::new();
        let a = bus.subscribe("a", 16);
        let b = bus.subscribe("b", 16);
        bus.publish(&event(0));
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
        a.drain();
        assert_eq!(b.len(), 1);
    }
}
