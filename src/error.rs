use std::sync::Arc;

/// Value produced by a single driver execution.
pub type Outcome = Result<serde_json::Value, Error>;

/// Errors that can end up in a slot of an [`crate::AggregateResult`].
///
/// The type is [`Clone`] since a coalesced execution hands the very same
/// outcome to every caller of its window.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("driver error :: {0}")]
    Driver(Arc<dyn std::error::Error + Send + Sync>),
    #[error("no async runtime available, unable to schedule coalesced execution")]
    RuntimeUnavailable,
    #[error("coalesced execution for label `{label}` ended without a result")]
    Abandoned { label: String },
}

impl Error {
    /// Wraps any driver failure, keeping it untouched for the caller.
    pub fn driver<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Driver(Arc::new(err))
    }

    /// Returns the driver failure, if any, downcasted to its concrete type.
    pub fn driver_error<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        match self {
            Self::Driver(err) => err.downcast_ref::<E>(),
            _ => None,
        }
    }
}
