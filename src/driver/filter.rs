//! Predicate language understood by [`super::MemoryDriver`].
//!
//! A predicate is a JSON object binding dotted field paths to a condition:
//!
//! -   a literal value, meaning equality (`{"name": "Ann"}`);
//! -   an operator object (`{"age": {"$gt": 18, "$lte": 65}}`).
//!
//! Supported operators are `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`,
//! `$exists` and `$between`. Fields of a predicate, as well as separate
//! predicates, are combined with a logical AND.

use serde_json::{Map, Number, Value};
use std::cmp::Ordering;

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("predicate must be an object, found `{0}`")]
    NotAnObject(Value),

    #[error("unknown operator `{0}`")]
    UnknownOperator(String),

    /// Occurs when an operator receives an argument of the wrong kind
    /// (e.g. `$in` without an array).
    #[error("wrong argument for operator `{0}`")]
    WrongType(&'static str),

    /// Occurs when a `$between` has `min > max`.
    #[error("empty range")]
    EmptyRange,
}

/// Logical operator applied to a record field.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Equal
    Eq(Value),
    /// Not equal
    Neq(Value),
    /// Less than or equal
    Leq(Value),
    /// Greater than or equal
    Geq(Value),
    /// Lower than
    Lt(Value),
    /// Greater than
    Gt(Value),
    /// Exists (`true`) or not exists (`false`)
    Ex(bool),
    /// In between a two value range [min, max]
    Between(Value, Value),
    /// Found in a set
    In(Vec<Value>),
}

impl Op {
    fn try_new(name: &str, arg: &Value) -> Result<Self, FilterError> {
        let op = match name {
            "$eq" => Self::Eq(arg.clone()),
            "$ne" => Self::Neq(arg.clone()),
            "$lte" => Self::Leq(arg.clone()),
            "$gte" => Self::Geq(arg.clone()),
            "$lt" => Self::Lt(arg.clone()),
            "$gt" => Self::Gt(arg.clone()),
            "$exists" => Self::Ex(arg.as_bool().ok_or(FilterError::WrongType("$exists"))?),
            "$in" => Self::In(
                arg.as_array()
                    .ok_or(FilterError::WrongType("$in"))?
                    .to_owned(),
            ),
            "$between" => match arg.as_array().map(Vec::as_slice) {
                Some([min, max]) => {
                    if compare(min, max).ok_or(FilterError::WrongType("$between"))?
                        == Ordering::Greater
                    {
                        return Err(FilterError::EmptyRange);
                    }
                    Self::Between(min.clone(), max.clone())
                }
                _ => return Err(FilterError::WrongType("$between")),
            },
            other => return Err(FilterError::UnknownOperator(other.to_owned())),
        };

        Ok(op)
    }

    /// Evaluates the operator against a field value ([`None`] if the field is missing).
    pub fn eval(&self, field: Option<&Value>) -> bool {
        match (self, field) {
            (Self::Ex(exists), field) => *exists == field.is_some(),
            (Self::Neq(v), None) => !v.is_null(),
            (_, None) => false,
            (Self::Eq(v), Some(f)) => equals(f, v),
            (Self::Neq(v), Some(f)) => !equals(f, v),
            (Self::Leq(v), Some(f)) => is_ord(f, v, |o| o != Ordering::Greater),
            (Self::Geq(v), Some(f)) => is_ord(f, v, |o| o != Ordering::Less),
            (Self::Lt(v), Some(f)) => is_ord(f, v, |o| o == Ordering::Less),
            (Self::Gt(v), Some(f)) => is_ord(f, v, |o| o == Ordering::Greater),
            (Self::Between(min, max), Some(f)) => {
                is_ord(f, min, |o| o != Ordering::Less)
                    && is_ord(f, max, |o| o != Ordering::Greater)
            }
            (Self::In(items), Some(f)) => items.iter().any(|v| equals(f, v)),
        }
    }
}

/// A single constraint, binding a field path to an [`Op`].
#[derive(Debug, Clone)]
pub struct Expr(String, Op);

impl Expr {
    pub fn matches(&self, record: &Value) -> bool {
        self.1.eval(lookup(record, &self.0))
    }
}

/// Conjunction of expressions compiled from a list of predicates.
#[derive(Debug, Clone, Default)]
pub struct ExprGroup {
    group: Vec<Expr>,
}

impl ExprGroup {
    pub fn compile(predicates: &[Value]) -> Result<Self, FilterError> {
        let mut group = Vec::new();

        for predicate in predicates {
            let fields = predicate
                .as_object()
                .ok_or_else(|| FilterError::NotAnObject(predicate.clone()))?;

            for (field, cond) in fields {
                match operators(cond) {
                    Some(ops) => {
                        for (name, arg) in ops {
                            group.push(Expr(field.clone(), Op::try_new(name, arg)?));
                        }
                    }
                    None => group.push(Expr(field.clone(), Op::Eq(cond.clone()))),
                }
            }
        }

        Ok(Self { group })
    }

    pub fn matches(&self, record: &Value) -> bool {
        self.group.iter().all(|e| e.matches(record))
    }
}

/// Returns the operators of a condition, if the condition is an operator object
fn operators(cond: &Value) -> Option<&Map<String, Value>> {
    cond.as_object()
        .filter(|obj| !obj.is_empty() && obj.keys().all(|k| k.starts_with('$')))
}

/// Resolves a dotted path (e.g. `address.city`) inside a record
pub fn lookup<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(record, |v, key| v.get(key))
}

fn equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => cmp_numbers(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// Integers are compared exactly, floats only when either side is one
fn cmp_numbers(a: &Number, b: &Number) -> Option<Ordering> {
    match (a.as_i64(), b.as_i64(), a.as_u64(), b.as_u64()) {
        (Some(a), Some(b), _, _) => Some(a.cmp(&b)),
        (_, _, Some(a), Some(b)) => Some(a.cmp(&b)),
        // a negative integer against one above i64::MAX
        (Some(_), None, None, Some(_)) => Some(Ordering::Less),
        (None, Some(_), Some(_), None) => Some(Ordering::Greater),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

/// Ordering between two values, defined for numbers and strings only
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => cmp_numbers(a, b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn is_ord(a: &Value, b: &Value, f: impl Fn(Ordering) -> bool) -> bool {
    compare(a, b).is_some_and(f)
}
