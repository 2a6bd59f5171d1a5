//! # Coalescing Buffers
//!
//! Under bursts of identical queries (e.g. the same read issued by many
//! callers within a few milliseconds) it is wasteful to reach the backend once
//! per caller. Labeled queries directed to a coalescing driver are therefore
//! parked in a pending table, keyed by label:
//!
//! * the first query for a label creates an entry and arms a one-shot flush
//!   task firing after [`params::COALESCING_WINDOW`];
//! * every following query with the same label, arriving before the flush,
//!   receives the entry's [`Deferred`] and is otherwise discarded;
//! * when the flush fires the entry is removed, the driver runs the first
//!   query exactly once, and the outcome is broadcast to every caller.
//!
//! Queries sharing a label but differing in predicates or limit all observe
//! the outcome of the first query of the window.

mod timer;
pub use timer::*;

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use log::{trace, warn};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::{
    driver::Registration,
    error::{Error, Outcome},
    params,
    query::QueryRef,
};

/// Handle to the outcome of a coalesced execution.
///
/// Clones resolve to the same outcome.
pub type Deferred = Shared<BoxFuture<'static, Outcome>>;

struct PendingEntry {
    registration: Registration,
    query: QueryRef,
    deferred: Deferred,
    flush: ScheduledFlush,
}

type PendingTable = HashMap<String, PendingEntry>;

/// Table of the coalesced executions waiting for their window to elapse.
#[derive(Clone, Default)]
pub struct Buffers {
    table: Arc<Mutex<PendingTable>>,
}

impl Buffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks `query` under `label`, returning the handle to the outcome of the
    /// execution it joins.
    ///
    /// A new window is opened if no entry is pending for `label`; this requires
    /// a tokio runtime, otherwise [`Error::RuntimeUnavailable`] is returned.
    pub fn enqueue(
        &self,
        label: &str,
        registration: &Registration,
        query: QueryRef,
    ) -> Result<Deferred, Error> {
        let mut table = self.table.lock();

        match table.get(label) {
            Some(entry) if entry.flush.is_finished() => {
                // the flush task died before firing, e.g. with its runtime
                warn!("dropping stale window for label `{}`", label);
                table.remove(label);
            }
            Some(entry) => {
                trace!(
                    "label `{}` pending on driver `{}`, joining window",
                    label,
                    entry.registration.name()
                );
                return Ok(entry.deferred.clone());
            }
            None => {}
        }

        let runtime = Handle::try_current().map_err(|_| Error::RuntimeUnavailable)?;

        let (tx, rx) = oneshot::channel::<Outcome>();
        let deferred = {
            let label = label.to_owned();
            rx.map(move |r| r.unwrap_or_else(|_| Err(Error::Abandoned { label })))
                .boxed()
                .shared()
        };

        let flush = ScheduledFlush::arm(&runtime, params::COALESCING_WINDOW, {
            let table = self.table.clone();
            let label = label.to_owned();

            async move {
                // Once removed, the label is available for a new window
                let entry = table.lock().remove(&label);
                let Some(entry) = entry else {
                    warn!("no pending entry for label `{}` at flush time", label);
                    return;
                };

                trace!(
                    "flushing label `{}` on driver `{}`: {}",
                    label,
                    entry.registration.name(),
                    entry.query
                );
                let outcome = entry.registration.run(entry.query).resolve().await;

                if tx.send(outcome).is_err() {
                    trace!("no caller waiting on label `{}`", label);
                }
            }
        });

        trace!(
            "opened window for label `{}` on driver `{}` ({}ms)",
            label,
            registration.name(),
            params::COALESCING_WINDOW.as_millis()
        );

        table.insert(
            label.to_owned(),
            PendingEntry {
                registration: registration.clone(),
                query,
                deferred: deferred.clone(),
                flush,
            },
        );

        Ok(deferred)
    }

    /// Labels currently waiting for their flush, sorted.
    pub fn pending_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.table.lock().keys().cloned().collect();
        labels.sort();
        labels
    }

    pub fn is_pending(&self, label: &str) -> bool {
        self.table.lock().contains_key(label)
    }

    /// Instant at which the window of `label` elapses, if one is open.
    pub fn deadline(&self, label: &str) -> Option<Instant> {
        self.table.lock().get(label).map(|e| e.flush.deadline())
    }

    /// The query that will be executed for `label`, if one is pending.
    pub fn pending_query(&self, label: &str) -> Option<QueryRef> {
        self.table.lock().get(label).map(|e| e.query.clone())
    }

    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Db;
    use crate::driver::MemoryDriver;
    use serde_json::json;
    use std::time::Duration;

    fn registration() -> (Registration, MemoryDriver) {
        let driver = MemoryDriver::buffered();
        (Registration::new("cache", driver.clone()), driver)
    }

    #[test]
    fn requires_runtime() {
        let db = Db::new();
        let (registration, driver) = registration();
        let buffers = Buffers::new();

        let query = db.collection("users").select(None).label("l").build(-1);
        let res = buffers.enqueue("l", &registration, query);

        assert!(matches!(res, Err(Error::RuntimeUnavailable)));
        assert!(buffers.is_empty());
        assert_eq!(driver.runs(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn first_query_of_window_wins() {
        let db = Db::new();
        let (registration, driver) = registration();
        let buffers = Buffers::new();

        let first = db
            .collection("users")
            .select(None)
            .filter(json!({"a": 1}))
            .label("l")
            .build(1);
        let second = db
            .collection("users")
            .select(None)
            .filter(json!({"b": 2}))
            .label("l")
            .build(5);

        let d1 = buffers.enqueue("l", &registration, first.clone()).unwrap();
        let deadline = buffers.deadline("l").unwrap();
        let d2 = buffers.enqueue("l", &registration, second).unwrap();

        assert_eq!(buffers.pending_labels(), vec!["l".to_owned()]);
        assert!(Arc::ptr_eq(&buffers.pending_query("l").unwrap(), &first));
        assert_eq!(deadline, buffers.deadline("l").unwrap());

        let (r1, r2) = tokio::join!(d1, d2);
        assert_eq!(r1.unwrap(), r2.unwrap());
        assert_eq!(driver.runs(), 1);
        assert!(!buffers.is_pending("l"));
        assert!(Instant::now() >= deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn windows_are_independent() {
        let db = Db::new();
        let (registration, driver) = registration();
        let buffers = Buffers::new();

        let query = db.collection("users").select(None).label("l").build(-1);
        let d1 = buffers.enqueue("l", &registration, query.clone()).unwrap();
        d1.await.unwrap();

        let d2 = buffers.enqueue("l", &registration, query).unwrap();
        assert!(buffers.is_pending("l"));
        tokio::time::sleep(params::COALESCING_WINDOW + Duration::from_millis(1)).await;

        assert!(buffers.is_empty());
        assert_eq!(driver.runs(), 2);
        d2.await.unwrap();
    }

    #[test]
    fn window_outliving_its_runtime_is_replaced() {
        let driver = MemoryDriver::buffered();
        let mut db = Db::new();
        let handle = driver.clone();
        db.add_driver("cache", move || handle);

        let stale = {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            let _guard = rt.enter();
            db.collection("users").select(None).label("l").all()
        };
        // the runtime is gone, its flush task with it
        assert!(db.buffers().is_pending("l"));

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();
        rt.block_on(async {
            let fresh = db.collection("users").select(None).label("l").all();
            let mut outcomes = fresh.settle().await;
            assert_eq!(outcomes.remove("cache").unwrap().unwrap(), json!([]));
            assert_eq!(driver.runs(), 1);
            assert!(db.buffers().is_empty());

            let mut outcomes = stale.settle().await;
            assert!(matches!(
                outcomes.remove("cache").unwrap(),
                Err(Error::Abandoned { label }) if label == "l"
            ));
        });
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_flush_is_abandoned() {
        let db = Db::new();
        let (registration, driver) = registration();
        let buffers = Buffers::new();

        let query = db.collection("users").select(None).label("l").build(-1);
        let deferred = buffers.enqueue("l", &registration, query).unwrap();

        buffers.table.lock().get("l").unwrap().flush.cancel();
        buffers.table.lock().remove("l");

        assert!(matches!(
            deferred.await,
            Err(Error::Abandoned { label }) if label == "l"
        ));
        assert_eq!(driver.runs(), 0);
    }
}
