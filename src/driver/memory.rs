use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::trace;
use parking_lot::RwLock;
use serde_json::Value;

use super::{Capability, Driver, ExprGroup, FilterError, Reply, overlay, project};
use crate::{
    error::{Error, Outcome},
    params,
    query::{Modification, Operation, Query, QueryRef, Transform},
};

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("bad predicate :: {0}")]
    BadPredicate(#[from] FilterError),
    #[error("only objects can be inserted, found `{0}`")]
    NotARecord(Value),
}

type Collections = HashMap<String, Vec<Value>>;

/// Driver keeping collections of JSON records in memory.
///
/// Clones share the same collections, which makes it easy to keep a handle
/// to a driver after handing it over to [`crate::Db::add_driver`].
#[derive(Clone, Default)]
pub struct MemoryDriver {
    collections: Arc<RwLock<Collections>>,
    runs: Arc<AtomicUsize>,
    capability: Capability,
}

impl MemoryDriver {
    /// Driver executing every query as soon as it is dispatched.
    pub fn new() -> Self {
        Self::default()
    }

    /// Driver accepting coalesced (labeled) queries.
    pub fn buffered() -> Self {
        Self::with_capability(Capability::Coalescing)
    }

    pub fn with_capability(capability: Capability) -> Self {
        Self {
            capability,
            ..Default::default()
        }
    }

    /// Number of queries executed so far.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::Relaxed)
    }

    /// Number of records stored in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.collections.read().get(collection).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn execute(&self, query: &Query) -> Result<Value, MemoryError> {
        let cap = query.limit().cap().unwrap_or(usize::MAX);

        match query.operation() {
            Operation::Insert(records) => self.insert(query.collection(), records),
            Operation::Select(shape) => {
                let filter = ExprGroup::compile(query.predicates())?;
                let collections = self.collections.read();
                let records = collections
                    .get(query.collection())
                    .map_or(&[][..], Vec::as_slice);

                let selected = records
                    .iter()
                    .filter(|r| filter.matches(r))
                    .take(cap)
                    .map(|r| match shape {
                        Some(shape) => project(r, shape),
                        None => r.clone(),
                    })
                    .collect();

                Ok(Value::Array(selected))
            }
            Operation::Update(Modification::Overlay(patch)) => {
                let filter = ExprGroup::compile(query.predicates())?;
                let mut collections = self.collections.write();
                let records = collections
                    .entry(query.collection().to_owned())
                    .or_default();

                let mut updated: usize = 0;
                for record in records
                    .iter_mut()
                    .filter(|r| filter.matches(r))
                    .take(cap)
                {
                    overlay(record, patch);
                    updated += 1;
                }

                Ok(Value::from(updated))
            }
            Operation::Update(Modification::Transform(transform)) => {
                self.transform(query, transform, cap)
            }
            Operation::Remove => {
                let filter = ExprGroup::compile(query.predicates())?;
                let mut collections = self.collections.write();
                let records = collections
                    .entry(query.collection().to_owned())
                    .or_default();

                let mut budget = cap;
                let before = records.len();
                records.retain(|r| {
                    if budget > 0 && filter.matches(r) {
                        budget -= 1;
                        return false;
                    }
                    true
                });

                Ok(Value::from(before - records.len()))
            }
        }
    }

    /// Transforms are user code: they run on copies of the matched records,
    /// with no lock held, so they are free to query this driver. Results are
    /// written back by record id.
    fn transform(
        &self,
        query: &Query,
        transform: &Transform,
        cap: usize,
    ) -> Result<Value, MemoryError> {
        let filter = ExprGroup::compile(query.predicates())?;

        let matched: Vec<Value> = self
            .collections
            .read()
            .get(query.collection())
            .map_or(&[][..], Vec::as_slice)
            .iter()
            .filter(|r| filter.matches(r))
            .take(cap)
            .cloned()
            .collect();

        let changes: Vec<(Option<Value>, Value)> = matched
            .into_iter()
            .map(|mut record| {
                let id = record.get(params::RECORD_ID_FIELD).cloned();
                transform.apply(&mut record);
                (id, record)
            })
            .collect();

        let mut collections = self.collections.write();
        let records = collections
            .entry(query.collection().to_owned())
            .or_default();

        let mut updated: usize = 0;
        for (id, changed) in changes {
            let Some(id) = id else {
                continue;
            };
            let target = records
                .iter_mut()
                .find(|r| r.get(params::RECORD_ID_FIELD) == Some(&id));
            if let Some(target) = target {
                *target = changed;
                updated += 1;
            }
        }

        Ok(Value::from(updated))
    }

    fn insert(&self, collection: &str, records: &[Value]) -> Result<Value, MemoryError> {
        let mut stored = Vec::with_capacity(records.len());
        for record in records {
            let Value::Object(fields) = record else {
                return Err(MemoryError::NotARecord(record.clone()));
            };

            let mut fields = fields.clone();
            fields
                .entry(params::RECORD_ID_FIELD)
                .or_insert_with(|| Value::from(uuid::Uuid::new_v4().to_string()));
            stored.push(Value::Object(fields));
        }

        self.collections
            .write()
            .entry(collection.to_owned())
            .or_default()
            .extend(stored.iter().cloned());

        Ok(Value::Array(stored))
    }
}

impl Driver for MemoryDriver {
    fn run(&self, query: QueryRef) -> Reply {
        self.runs.fetch_add(1, Ordering::Relaxed);
        trace!("memory driver executing {}", query);

        let outcome: Outcome = self.execute(&query).map_err(Error::driver);
        Reply::Ready(outcome)
    }

    fn capability(&self) -> Capability {
        self.capability
    }
}
