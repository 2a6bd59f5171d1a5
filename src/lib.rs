#![deny(clippy::semicolon_if_nothing_returned)]
#![deny(clippy::unnecessary_semicolon)]
#![deny(clippy::explicit_iter_loop)]
#![deny(clippy::manual_string_new)]
#![deny(clippy::unwrap_or_default)]

pub mod buffer;
pub mod db;
pub mod driver;
pub mod error;
pub mod params;
pub mod query;
pub mod result;
pub mod script;

pub use db::Db;
pub use error::{Error, Outcome};
pub use result::{AggregateResult, Slot};
