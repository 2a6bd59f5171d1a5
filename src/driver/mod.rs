//! # Drivers
//!
//! A driver is the component actually executing queries against a storage
//! backend. The façade only needs two things from it:
//!
//! * [`Driver::run`], executing one finalized query and returning its outcome,
//!   either right away or as a future;
//! * [`Driver::capability`], telling whether labeled queries may be coalesced
//!   before reaching the driver.
//!
//! Registered drivers are normalized into a [`Registration`], so that the
//! dispatcher can select the execution path by matching on [`DriverKind`].

mod filter;
pub use filter::*;

mod memory;
pub use memory::*;

mod shape;
pub use shape::*;

use std::fmt;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use crate::{error::Outcome, query::QueryRef};

/// Execution paths a driver can advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Capability {
    /// Every query is executed as soon as it is dispatched
    #[default]
    Direct,
    /// Labeled queries can be merged within a coalescing window
    Coalescing,
}

/// Result returned by [`Driver::run`].
pub enum Reply {
    /// Execution completed inline
    Ready(Outcome),
    /// Execution continues asynchronously
    Pending(BoxFuture<'static, Outcome>),
}

impl Reply {
    pub fn pending<F>(fut: F) -> Self
    where
        F: Future<Output = Outcome> + Send + 'static,
    {
        Self::Pending(fut.boxed())
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// Waits for the outcome, regardless of the variant.
    pub async fn resolve(self) -> Outcome {
        match self {
            Self::Ready(outcome) => outcome,
            Self::Pending(fut) => fut.await,
        }
    }
}

impl From<Outcome> for Reply {
    fn from(outcome: Outcome) -> Self {
        Self::Ready(outcome)
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(outcome) => f.debug_tuple("Ready").field(outcome).finish(),
            Self::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// A storage backend able to execute queries.
///
/// `run` must be safe to call repeatedly with distinct queries. It is invoked
/// from the dispatching thread, so long running work should be returned as
/// [`Reply::Pending`].
pub trait Driver: Send + Sync + 'static {
    fn run(&self, query: QueryRef) -> Reply;

    fn capability(&self) -> Capability {
        Capability::Direct
    }
}

/// Shared reference to a registered driver.
pub type DriverRef = Arc<dyn Driver>;

/// Driver tagged with the path the dispatcher has to use.
#[derive(Clone)]
pub enum DriverKind {
    Direct(DriverRef),
    Coalescing(DriverRef),
}

impl DriverKind {
    pub fn driver(&self) -> &DriverRef {
        match self {
            Self::Direct(d) | Self::Coalescing(d) => d,
        }
    }

    pub fn capability(&self) -> Capability {
        match self {
            Self::Direct(_) => Capability::Direct,
            Self::Coalescing(_) => Capability::Coalescing,
        }
    }
}

/// A named driver, as stored by [`crate::Db`].
#[derive(Clone)]
pub struct Registration {
    name: String,
    kind: DriverKind,
}

impl Registration {
    pub fn new<D: Driver>(name: impl Into<String>, driver: D) -> Self {
        let kind = match driver.capability() {
            Capability::Direct => DriverKind::Direct(Arc::new(driver)),
            Capability::Coalescing => DriverKind::Coalescing(Arc::new(driver)),
        };

        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &DriverKind {
        &self.kind
    }

    pub fn run(&self, query: QueryRef) -> Reply {
        self.kind.driver().run(query)
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .field("capability", &self.kind.capability())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo(Capability);

    impl Driver for Echo {
        fn run(&self, query: QueryRef) -> Reply {
            Reply::Ready(Ok(json!(query.collection())))
        }

        fn capability(&self) -> Capability {
            self.0
        }
    }

    #[test]
    fn registration_normalizes_capability() {
        let direct = Registration::new("a", Echo(Capability::Direct));
        let coalescing = Registration::new("b", Echo(Capability::Coalescing));

        assert!(matches!(direct.kind(), DriverKind::Direct(_)));
        assert!(matches!(coalescing.kind(), DriverKind::Coalescing(_)));
        assert_eq!(coalescing.kind().capability(), Capability::Coalescing);
        assert_eq!(direct.name(), "a");
    }

    #[tokio::test]
    async fn reply_resolves_both_variants() {
        let ready = Reply::from(Ok(json!(1)));
        assert!(ready.is_ready());
        assert_eq!(ready.resolve().await.unwrap(), json!(1));

        let pending = Reply::pending(async { Ok(json!(2)) });
        assert!(!pending.is_ready());
        assert_eq!(pending.resolve().await.unwrap(), json!(2));
    }
}
