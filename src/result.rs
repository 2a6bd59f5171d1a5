use std::collections::BTreeMap;
use std::fmt;

use futures::future::{BoxFuture, join_all};

use crate::{buffer::Deferred, driver::Reply, error::Outcome};

/// The result of one driver for a dispatched query.
pub enum Slot {
    /// The driver completed inline
    Ready(Outcome),
    /// The driver returned its own future
    Pending(BoxFuture<'static, Outcome>),
    /// The query joined a coalescing window, shared with other callers
    Coalesced(Deferred),
}

impl Slot {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn is_coalesced(&self) -> bool {
        matches!(self, Self::Coalesced(_))
    }

    /// Waits for the outcome of the driver.
    pub async fn resolve(self) -> Outcome {
        match self {
            Self::Ready(outcome) => outcome,
            Self::Pending(fut) => fut.await,
            Self::Coalesced(deferred) => deferred.await,
        }
    }
}

impl From<Reply> for Slot {
    fn from(reply: Reply) -> Self {
        match reply {
            Reply::Ready(outcome) => Self::Ready(outcome),
            Reply::Pending(fut) => Self::Pending(fut),
        }
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(outcome) => f.debug_tuple("Ready").field(outcome).finish(),
            Self::Pending(_) => f.write_str("Pending(..)"),
            Self::Coalesced(deferred) => match deferred.peek() {
                Some(outcome) => f.debug_tuple("Coalesced").field(outcome).finish(),
                None => f.write_str("Coalesced(..)"),
            },
        }
    }
}

/// Per driver results of a dispatched query, keyed by driver name.
///
/// The result is returned as soon as every driver has been dispatched, so
/// some of its slots may still be pending.
#[derive(Debug, Default)]
pub struct AggregateResult {
    slots: BTreeMap<String, Slot>,
}

impl AggregateResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the slot of driver `name`, replacing any previous one.
    pub fn insert(&mut self, name: impl Into<String>, slot: Slot) {
        self.slots.insert(name.into(), slot);
    }

    pub fn get(&self, name: &str) -> Option<&Slot> {
        self.slots.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Slot> {
        self.slots.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Waits for every slot, returning the outcomes keyed by driver name.
    ///
    /// Slots are awaited concurrently, a failing driver does not prevent the
    /// others from completing.
    pub async fn settle(self) -> BTreeMap<String, Outcome> {
        let (names, slots): (Vec<_>, Vec<_>) = self.slots.into_iter().unzip();
        let outcomes = join_all(slots.into_iter().map(Slot::resolve)).await;

        names.into_iter().zip(outcomes).collect()
    }
}

impl IntoIterator for AggregateResult {
    type Item = (String, Slot);
    type IntoIter = std::collections::btree_map::IntoIter<String, Slot>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.into_iter()
    }
}
