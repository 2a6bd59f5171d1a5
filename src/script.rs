//! Scripted execution of queries.
//!
//! A script is a JSON-lines document, one command per line. Blank lines and
//! lines starting with `#` are skipped.
//!
//! ```text
//! {"op": "insert", "collection": "users", "records": [{"name": "Ann", "age": 30}]}
//! {"op": "select", "collection": "users", "shape": {"name": true}, "where": [{"age": {"$gt": 18}}], "as": "adults", "limit": 10}
//! {"op": "update", "collection": "users", "set": {"city": "Rome"}, "where": [{"name": "Ann"}]}
//! {"op": "remove", "collection": "users", "where": [{"name": "Ann"}], "limit": 1}
//! {"op": "sleep", "ms": 150}
//! {"op": "settle"}
//! ```
//!
//! Commands are dispatched in order without waiting for their results, which
//! are collected and reported on `settle` (and at the end of the script). This
//! lets consecutive labeled commands share a coalescing window.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use log::{debug, trace};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    db::Db,
    driver::Capability,
    error::Outcome,
    query::{Limit, QueryBuilder},
    result::AggregateResult,
};

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("io error :: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad command at line {line} :: {source}")]
    BadCommand {
        line: usize,
        source: serde_json::Error,
    },
    #[error("bad driver `{0}`, expected `name` or `name:buffered`")]
    BadDriverSpec(String),
}

fn unbounded() -> i64 {
    Limit::ALL.value()
}

/// Selection part shared by select, update and remove commands.
#[derive(Debug, Clone, Deserialize)]
pub struct Selection {
    pub collection: String,
    #[serde(default, rename = "where")]
    pub predicates: Vec<Value>,
    #[serde(default, rename = "as")]
    pub label: Option<String>,
    #[serde(default = "unbounded")]
    pub limit: i64,
}

impl Selection {
    fn dispatch(&self, builder: QueryBuilder<'_>) -> AggregateResult {
        let mut builder = self
            .predicates
            .iter()
            .cloned()
            .fold(builder, QueryBuilder::filter);

        if let Some(label) = &self.label {
            builder = builder.label(label.as_str());
        }

        builder.limit(self.limit)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    Insert {
        collection: String,
        records: Vec<Value>,
    },
    Select {
        #[serde(flatten)]
        selection: Selection,
        #[serde(default)]
        shape: Option<Value>,
    },
    Update {
        #[serde(flatten)]
        selection: Selection,
        set: Value,
    },
    Remove {
        #[serde(flatten)]
        selection: Selection,
    },
    Sleep {
        ms: u64,
    },
    Settle,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Select { .. } => "select",
            Self::Update { .. } => "update",
            Self::Remove { .. } => "remove",
            Self::Sleep { .. } => "sleep",
            Self::Settle => "settle",
        }
    }
}

/// A command together with its line in the script.
#[derive(Debug, Clone)]
pub struct Step {
    pub line: usize,
    pub command: Command,
}

/// Parses a script, see module documentation.
pub fn parse(src: &str) -> Result<Vec<Step>, ScriptError> {
    let mut steps = Vec::new();

    for (idx, raw) in src.lines().enumerate() {
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with('#') {
            continue;
        }

        let line = idx + 1;
        let bad_command = |source| ScriptError::BadCommand { line, source };
        let command = serde_json::from_str(raw).map_err(bad_command)?;

        steps.push(Step { line, command });
    }

    Ok(steps)
}

/// Settled outcomes of a dispatched command.
#[derive(Debug)]
pub struct Report {
    pub line: usize,
    pub command: &'static str,
    pub outcomes: BTreeMap<String, Outcome>,
}

/// A dispatched command whose outcomes are not settled yet.
struct Dispatched {
    line: usize,
    command: &'static str,
    result: AggregateResult,
}

/// Runs `steps` against `db`, handing each report to `sink` as soon as it settles.
pub async fn run<F>(db: &Db, steps: Vec<Step>, mut sink: F)
where
    F: FnMut(Report),
{
    let mut pending: Vec<Dispatched> = Vec::new();

    for Step { line, command } in steps {
        trace!("line {}: {}", line, command.name());

        let result = match &command {
            Command::Insert {
                collection,
                records,
            } => db.collection(collection.as_str()).insert_many(records.clone()),
            Command::Select { selection, shape } => {
                let builder = db
                    .collection(selection.collection.as_str())
                    .select(shape.clone());
                selection.dispatch(builder)
            }
            Command::Update { selection, set } => {
                let builder = db
                    .collection(selection.collection.as_str())
                    .update(set.clone());
                selection.dispatch(builder)
            }
            Command::Remove { selection } => {
                let builder = db.collection(selection.collection.as_str()).remove();
                selection.dispatch(builder)
            }
            Command::Sleep { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                continue;
            }
            Command::Settle => {
                settle(&mut pending, &mut sink).await;
                continue;
            }
        };

        pending.push(Dispatched {
            line,
            command: command.name(),
            result,
        });
    }

    settle(&mut pending, &mut sink).await;
}

async fn settle<F>(pending: &mut Vec<Dispatched>, sink: &mut F)
where
    F: FnMut(Report),
{
    debug!("settling {} pending command(s)", pending.len());

    for dispatched in pending.drain(..) {
        sink(Report {
            line: dispatched.line,
            command: dispatched.command,
            outcomes: dispatched.result.settle().await,
        });
    }
}

/// Driver requested on the command line, as `name` or `name:buffered`.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverSpec {
    pub name: String,
    pub capability: Capability,
}

impl FromStr for DriverSpec {
    type Err = ScriptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, capability) = match s.split_once(':') {
            None => (s, Capability::Direct),
            Some((name, "buffered")) => (name, Capability::Coalescing),
            Some((name, "direct")) => (name, Capability::Direct),
            Some(_) => return Err(ScriptError::BadDriverSpec(s.to_owned())),
        };

        if name.is_empty() {
            return Err(ScriptError::BadDriverSpec(s.to_owned()));
        }

        Ok(Self {
            name: name.to_owned(),
            capability,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MemoryDriver;
    use serde_json::json;

    const SCRIPT: &str = r#"
# seed
{"op": "insert", "collection": "users", "records": [{"_id": "1", "name": "Ann", "age": 30}, {"_id": "2", "name": "Bob", "age": 12}]}
{"op": "settle"}
{"op": "select", "collection": "users", "shape": {"name": true}, "where": [{"age": {"$gt": 18}}], "as": "adults", "limit": 10}
{"op": "select", "collection": "users", "shape": {"name": true}, "where": [{"age": {"$gt": 0}}], "as": "adults"}
{"op": "sleep", "ms": 150}
{"op": "update", "collection": "users", "set": {"age": 13}, "where": [{"name": "Bob"}]}
{"op": "remove", "collection": "users", "limit": 1}
"#;

    #[test]
    fn parse_commands() {
        let steps = parse(SCRIPT).unwrap();
        let names: Vec<_> = steps.iter().map(|s| s.command.name()).collect();

        assert_eq!(
            names,
            vec!["insert", "settle", "select", "select", "sleep", "update", "remove"]
        );
        assert_eq!(steps[0].line, 3);

        match &steps[2].command {
            Command::Select { selection, shape } => {
                assert_eq!(selection.label.as_deref(), Some("adults"));
                assert_eq!(selection.limit, 10);
                assert_eq!(selection.predicates, vec![json!({"age": {"$gt": 18}})]);
                assert_eq!(shape, &Some(json!({"name": true})));
            }
            other => panic!("unexpected command {other:?}"),
        }

        match &steps[6].command {
            Command::Remove { selection } => {
                assert!(selection.predicates.is_empty());
                assert_eq!(selection.label, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parse_reports_line() {
        let err = parse("\n{\"op\": \"settle\"}\n{\"op\": \"explode\"}").unwrap_err();
        assert!(matches!(err, ScriptError::BadCommand { line: 3, .. }));
    }

    #[test]
    fn driver_specs() {
        assert_eq!(
            "mem".parse::<DriverSpec>().unwrap(),
            DriverSpec {
                name: "mem".into(),
                capability: Capability::Direct
            }
        );
        assert_eq!(
            "cache:buffered".parse::<DriverSpec>().unwrap().capability,
            Capability::Coalescing
        );
        assert!("cache:fast".parse::<DriverSpec>().is_err());
        assert!(":buffered".parse::<DriverSpec>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn labeled_selects_share_window() {
        let driver = MemoryDriver::buffered();
        let mut db = Db::new();
        let handle = driver.clone();
        db.add_driver("cache", move || handle);

        let mut reports = Vec::new();
        run(&db, parse(SCRIPT).unwrap(), |r| reports.push(r)).await;

        assert_eq!(reports.len(), 5);
        assert_eq!(reports[0].command, "insert");

        // both selects observe the first one's predicates
        let first = reports[1].outcomes["cache"].as_ref().unwrap();
        let second = reports[2].outcomes["cache"].as_ref().unwrap();
        assert_eq!(first, &json!([{"name": "Ann"}]));
        assert_eq!(first, second);

        assert_eq!(reports[3].outcomes["cache"].as_ref().unwrap(), &json!(1));
        assert_eq!(reports[4].outcomes["cache"].as_ref().unwrap(), &json!(1));

        // insert, one coalesced select, update, remove
        assert_eq!(driver.runs(), 4);
    }
}
