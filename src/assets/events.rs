use log::trace;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Mutex, PoisonError};

/// A change to the alias table.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AliasEvent {
    Added(String),
    Edited(String),
    Removed(String),
}

impl AliasEvent {
    pub fn alias(&self) -> &str {
        match self {
            Self::Added(a) | Self::Edited(a) | Self::Removed(a) => a,
        }
    }
}

struct Subscriber {
    alias: Option<String>,
    tx: Sender<AliasEvent>,
}

/// Fan-out of alias changes.
///
/// Publishing only queues the event on each subscriber's channel; nothing
/// runs on the publishing thread, so a subscriber may call back into the
/// registry from wherever it drains its [`Subscription`].
#[derive(Default)]
pub struct InvalidationChannel {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl InvalidationChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receives every event published from now on.
    pub fn subscribe(&self) -> Subscription {
        self.add_subscriber(None)
    }

    /// Receives events for `alias` only.
    pub fn subscribe_alias(&self, alias: &str) -> Subscription {
        self.add_subscriber(Some(alias.to_string()))
    }

    fn add_subscriber(&self, alias: Option<String>) -> Subscription {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber { alias, tx });
        Subscription { rx }
    }

    /// Queues `event` for every interested subscriber and returns how many
    /// received it. Subscribers whose [`Subscription`] was dropped are pruned.
    pub fn publish(&self, event: AliasEvent) -> usize {
        let mut subs = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut delivered = 0;
        subs.retain(|sub| {
            if sub.alias.as_deref().is_some_and(|a| a != event.alias()) {
                return true;
            }
            let alive = sub.tx.send(event.clone()).is_ok();
            delivered += usize::from(alive);
            alive
        });
        trace!("Published {event:?} to {delivered} subscriber(s).");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// The receiving end of an [`InvalidationChannel`] subscription. Events for a
/// given alias arrive in publication order.
pub struct Subscription {
    rx: Receiver<AliasEvent>,
}

impl Subscription {
    /// Next queued event, without blocking.
    pub fn try_next(&self) -> Option<AliasEvent> {
        match self.rx.try_recv() {
            Ok(ev) => Some(ev),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Drains everything queued so far.
    pub fn poll(&self) -> Vec<AliasEvent> {
        self.rx.try_iter().collect()
    }
}
