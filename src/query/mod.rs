//! # Query Descriptors
//!
//! A [`Query`] describes one logical request against one collection. It is
//! assembled by a [`QueryBuilder`] and becomes immutable once finalized: the
//! dispatcher only ever sees it behind an [`Arc`], so nothing done to a builder
//! after the terminal call can reach an execution already in flight.
//!
//! The descriptor is made of:
//!
//! -   _collection_: the name of the target collection.
//! -   _operation_ ([`Operation`]): exactly one of insert, select, update or remove.
//! -   _predicates_: opaque values appended in order. They are handed to the drivers
//!     exactly as received, the façade never evaluates them.
//! -   _limit_ ([`Limit`]): maximum number of records the operation should touch.
//! -   _label_: optional name used to coalesce concurrent queries.

mod builder;
pub use builder::*;

use crate::params;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Opaque predicate value, interpreted by drivers only.
pub type Predicate = Value;

/// Nested mapping describing which fields a select should retrieve.
pub type Shape = Value;

/// Shared reference to a finalized query.
pub type QueryRef = Arc<Query>;

/// Callable applied to each record matched by an update.
///
/// The record can be modified in place, or a replacement can be returned.
#[derive(Clone)]
pub struct Transform(Arc<dyn Fn(&mut Value) -> Option<Value> + Send + Sync>);

impl Transform {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Value) -> Option<Value> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Applies the transform, storing the replacement (if any) into `record`.
    pub fn apply(&self, record: &mut Value) {
        if let Some(replacement) = (self.0)(record) {
            *record = replacement;
        }
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Transform(..)")
    }
}

/// Change applied to every record matched by an update.
#[derive(Debug, Clone)]
pub enum Modification {
    /// Partial object overlaid on top of each record
    Overlay(Value),
    /// Function invoked once per record
    Transform(Transform),
}

impl From<Value> for Modification {
    fn from(v: Value) -> Self {
        Modification::Overlay(v)
    }
}

impl From<Transform> for Modification {
    fn from(t: Transform) -> Self {
        Modification::Transform(t)
    }
}

/// The single operation performed by a query.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Positional records, captured verbatim
    Insert(Vec<Value>),
    /// Optional shape, [`None`] selects the full object
    Select(Option<Shape>),
    Update(Modification),
    Remove,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Insert(_) => "insert",
            Self::Select(_) => "select",
            Self::Update(_) => "update",
            Self::Remove => "remove",
        }
    }
}

/// Maximum number of records a query should touch.
///
/// `-1` (or any negative value) means every match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Limit(i64);

impl Limit {
    pub const ALL: Limit = Limit(params::UNBOUNDED_LIMIT);

    pub fn new(n: i64) -> Self {
        Self(n)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_unbounded(&self) -> bool {
        self.0 < 0
    }

    /// Returns the cap on the number of records, [`None`] when unbounded.
    pub fn cap(&self) -> Option<usize> {
        usize::try_from(self.0).ok()
    }
}

impl Default for Limit {
    fn default() -> Self {
        Self::ALL
    }
}

impl From<i64> for Limit {
    fn from(n: i64) -> Self {
        Self(n)
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unbounded() {
            write!(f, "all")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// A finalized query, see module documentation.
#[derive(Debug, Clone)]
pub struct Query {
    collection: String,
    operation: Operation,
    predicates: Vec<Predicate>,
    limit: Limit,
    label: Option<String>,
}

impl Query {
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn limit(&self) -> Limit {
        self.limit
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on `{}` (predicates: {}, limit: {}",
            self.operation.name(),
            self.collection,
            self.predicates.len(),
            self.limit
        )?;
        if let Some(label) = &self.label {
            write!(f, ", label: `{label}`")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn limit_cap() {
        assert_eq!(Limit::new(10).cap(), Some(10));
        assert_eq!(Limit::new(0).cap(), Some(0));
        assert_eq!(Limit::ALL.cap(), None);
        assert_eq!(Limit::new(-7).cap(), None);
        assert!(Limit::default().is_unbounded());
    }

    #[test]
    fn transform_replaces_when_returning() {
        let mut record = json!({"n": 1});

        Transform::new(|r| {
            r["n"] = json!(2);
            None
        })
        .apply(&mut record);
        assert_eq!(record, json!({"n": 2}));

        Transform::new(|_| Some(json!("replaced"))).apply(&mut record);
        assert_eq!(record, json!("replaced"));
    }
}
