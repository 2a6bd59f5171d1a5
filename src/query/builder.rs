use std::sync::Arc;

use serde_json::Value;

use super::{Limit, Modification, Operation, Predicate, Query, QueryRef, Shape};
use crate::{db::Db, result::AggregateResult};

/// Entry point for the operations on a single collection.
pub struct Collection<'db> {
    db: &'db Db,
    name: String,
}

impl<'db> Collection<'db> {
    pub(crate) fn new(db: &'db Db, name: impl Into<String>) -> Self {
        Self {
            db,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inserts a record, dispatching immediately.
    pub fn insert(&self, record: Value) -> AggregateResult {
        self.insert_many(vec![record])
    }

    /// Inserts several records at once, dispatching immediately.
    /// Records are forwarded to drivers in the given order.
    pub fn insert_many(&self, records: Vec<Value>) -> AggregateResult {
        self.builder(Operation::Insert(records)).all()
    }

    /// Selects records, `shape` restricts the retrieved fields
    /// ([`None`] retrieves the full object).
    ///
    /// ```ignore
    /// let shape = json!({ "name": { "first": true } });
    /// db.collection("users").select(Some(shape)).first();
    /// ```
    pub fn select(&self, shape: Option<Shape>) -> QueryBuilder<'db> {
        self.builder(Operation::Select(shape))
    }

    pub fn update(&self, modification: impl Into<Modification>) -> QueryBuilder<'db> {
        self.builder(Operation::Update(modification.into()))
    }

    pub fn remove(&self) -> QueryBuilder<'db> {
        self.builder(Operation::Remove)
    }

    fn builder(&self, operation: Operation) -> QueryBuilder<'db> {
        QueryBuilder {
            db: self.db,
            collection: self.name.clone(),
            operation,
            predicates: Vec::new(),
            label: None,
        }
    }
}

/// Accumulates predicates and label of a query.
///
/// The builder is consumed by its terminal calls ([`QueryBuilder::limit`],
/// [`QueryBuilder::first`], [`QueryBuilder::all`]) which dispatch the query.
#[must_use = "a query is dispatched only by `limit`, `first` or `all`"]
pub struct QueryBuilder<'db> {
    db: &'db Db,
    collection: String,
    operation: Operation,
    predicates: Vec<Predicate>,
    label: Option<String>,
}

impl QueryBuilder<'_> {
    /// Appends a predicate. Predicates keep their insertion order.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Labels the query, making it eligible for coalescing.
    /// Calling it again overwrites the previous label.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Finalizes the query without dispatching it.
    pub fn build(self, limit: impl Into<Limit>) -> QueryRef {
        Arc::new(Query {
            collection: self.collection,
            operation: self.operation,
            predicates: self.predicates,
            limit: limit.into(),
            label: self.label,
        })
    }

    /// Finalizes the query with limit `n` and dispatches it.
    pub fn limit(self, n: impl Into<Limit>) -> AggregateResult {
        let db = self.db;
        db.run(self.build(n))
    }

    pub fn first(self) -> AggregateResult {
        self.limit(1)
    }

    pub fn all(self) -> AggregateResult {
        self.limit(Limit::ALL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn predicates_keep_order() {
        let db = Db::new();
        let q = db
            .collection("users")
            .select(None)
            .filter(json!({"a": 1}))
            .filter(json!({"b": 2}))
            .filter(json!({"a": 3}))
            .build(Limit::ALL);

        assert_eq!(
            q.predicates(),
            &[json!({"a": 1}), json!({"b": 2}), json!({"a": 3})]
        );
    }

    #[test]
    fn label_is_overwritten() {
        let db = Db::new();
        let q = db
            .collection("users")
            .remove()
            .label("first")
            .label("second")
            .build(5);

        assert_eq!(q.label(), Some("second"));
        assert_eq!(q.limit(), Limit::new(5));
        assert_eq!(q.collection(), "users");
        assert!(matches!(q.operation(), Operation::Remove));
    }

    #[test]
    fn unlabeled_by_default() {
        let db = Db::new();
        let q = db.collection("users").update(json!({"x": 1})).build(-1);

        assert_eq!(q.label(), None);
        assert!(q.limit().is_unbounded());
        assert!(matches!(
            q.operation(),
            Operation::Update(Modification::Overlay(_))
        ));
    }

    #[test]
    fn dispatch_without_drivers_is_empty() {
        let db = Db::new();
        assert!(db.collection("users").select(None).all().is_empty());
        assert!(db.collection("users").insert(json!({"a": 1})).is_empty());
    }
}
