//! Topic-based publish/subscribe bus shared by every discovery service.
//!
//! Each subscription owns a pair of unbounded queues, one per priority level.
//! Receivers always drain pending high-priority events before low-priority ones.
//! Publishing only needs `&self`, so any number of services can hold an
//! `Arc<EventBus>` and publish concurrently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace};

use crate::requests::{DiscoveredName, DiscoveryRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    DiscoveryRequest,
    NewName,
    Log,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Request(DiscoveryRequest),
    NewName(DiscoveredName),
    Log(String),
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Event::Request(_) => Topic::DiscoveryRequest,
            Event::NewName(_) => Topic::NewName,
            Event::Log(_) => Topic::Log,
        }
    }
}

/// Output side of the bus as seen by a discovery service
pub trait EventSink: Send + Sync {
    fn publish(&self, priority: Priority, event: Event);
}

struct Subscriber {
    high: UnboundedSender<Event>,
    low: UnboundedSender<Event>,
}

impl Subscriber {
    fn is_closed(&self) -> bool {
        self.high.is_closed()
    }
}

pub struct EventBus {
    subscribers: RwLock<HashMap<Topic, Vec<Subscriber>>>,
    closed: AtomicBool,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            subscribers: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Registers a new subscription for `topic`.
    ///
    /// Events published before this call are not replayed.
    pub fn subscribe(&self, topic: Topic) -> Subscription {
        let (high_tx, high_rx) = mpsc::unbounded_channel();
        let (low_tx, low_rx) = mpsc::unbounded_channel();

        if !self.closed.load(Ordering::Acquire) {
            if let Ok(mut subs) = self.subscribers.write() {
                subs.entry(topic).or_default().push(Subscriber {
                    high: high_tx,
                    low: low_tx,
                });
            }
        }

        debug!(?topic, "New subscription created");
        Subscription {
            high: high_rx,
            low: low_rx,
        }
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.subscribers
            .read()
            .map(|subs| {
                subs.get(&topic)
                    .map(|list| list.iter().filter(|s| !s.is_closed()).count())
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }

    /// Drops every subscriber so that pending receivers see the end of their stream
    /// once their queues are drained. Later publishes are discarded.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Ok(mut subs) = self.subscribers.write() {
            subs.clear();
        }
    }

    fn deliver(&self, priority: Priority, event: Event) -> usize {
        if self.closed.load(Ordering::Acquire) {
            return 0;
        }

        let topic = event.topic();
        let mut delivered = 0;
        let mut saw_closed = false;

        if let Ok(subs) = self.subscribers.read() {
            if let Some(list) = subs.get(&topic) {
                for sub in list {
                    let tx = match priority {
                        Priority::High => &sub.high,
                        Priority::Low => &sub.low,
                    };
                    if tx.send(event.clone()).is_ok() {
                        delivered += 1;
                    } else {
                        saw_closed = true;
                    }
                }
            }
        }

        if saw_closed {
            if let Ok(mut subs) = self.subscribers.write() {
                if let Some(list) = subs.get_mut(&topic) {
                    list.retain(|s| !s.is_closed());
                }
            }
        }

        trace!(?topic, ?priority, receivers = delivered, "Event published");
        delivered
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventBus {
    fn publish(&self, priority: Priority, event: Event) {
        self.deliver(priority, event);
    }
}

pub struct Subscription {
    high: UnboundedReceiver<Event>,
    low: UnboundedReceiver<Event>,
}

impl Subscription {
    /// Waits for the next event. Returns `None` once the bus is closed and
    /// both queues are empty.
    pub async fn recv(&mut self) -> Option<Event> {
        if let Some(event) = self.try_recv() {
            return Some(event);
        }

        tokio::select! {
            biased;
            Some(event) = self.high.recv() => Some(event),
            Some(event) = self.low.recv() => Some(event),
            else => None,
        }
    }

    /// Non-blocking receive, high priority first
    pub fn try_recv(&mut self) -> Option<Event> {
        match self.high.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => self.low.try_recv().ok(),
        }
    }
}
