//! # Database Facade
//!
//! [`Db`] is the single entry point of the application code: it stores the
//! registered drivers and the coalescing buffers, and fans every finalized
//! query out to all the drivers.
//!
//! * **Storage abstraction:** callers build queries through [`Db::collection`]
//!   and never learn which backends (memory, SQL, remote, ...) execute them.
//! * **Independent results:** each driver gets its own slot in the returned
//!   [`AggregateResult`]; a failing driver does not affect the others.
//! * **Explicit context:** the `Db` is owned by the caller, no state is kept in
//!   globals.

use log::{debug, trace};

use crate::{
    buffer::Buffers,
    driver::{Driver, DriverKind, Registration},
    query::{Collection, QueryRef},
    result::{AggregateResult, Slot},
};

#[derive(Default)]
pub struct Db {
    drivers: Vec<Registration>,
    buffers: Buffers,
}

impl Db {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the driver built by `ctor` under `name`.
    ///
    /// Drivers are dispatched in registration order. Names are expected to be
    /// unique, a driver registered with an existing name overwrites the slot of
    /// the previous one in every [`AggregateResult`].
    pub fn add_driver<D, F>(&mut self, name: impl Into<String>, ctor: F) -> &mut Self
    where
        D: Driver,
        F: FnOnce() -> D,
    {
        let registration = Registration::new(name, ctor());
        debug!(
            "registered driver `{}` ({:?})",
            registration.name(),
            registration.kind().capability()
        );

        self.drivers.push(registration);
        self
    }

    pub fn drivers(&self) -> &[Registration] {
        &self.drivers
    }

    pub fn buffers(&self) -> &Buffers {
        &self.buffers
    }

    pub fn collection(&self, name: impl Into<String>) -> Collection<'_> {
        Collection::new(self, name)
    }

    /// Dispatches `query` to every registered driver.
    ///
    /// Labeled queries directed to coalescing drivers go through the
    /// [`Buffers`], every other combination is run right away. The result is
    /// returned once every driver has been dispatched, without waiting for
    /// pending slots.
    pub fn run(&self, query: QueryRef) -> AggregateResult {
        let mut result = AggregateResult::new();

        for registration in &self.drivers {
            let slot = match (query.label(), registration.kind()) {
                (Some(label), DriverKind::Coalescing(_)) => {
                    trace!("buffering {} on driver `{}`", query, registration.name());
                    match self.buffers.enqueue(label, registration, query.clone()) {
                        Ok(deferred) => Slot::Coalesced(deferred),
                        Err(err) => Slot::Ready(Err(err)),
                    }
                }
                _ => {
                    trace!("running {} on driver `{}`", query, registration.name());
                    registration.run(query.clone()).into()
                }
            };

            result.insert(registration.name(), slot);
        }

        result
    }
}
