//! Crate wide constants.
use std::time::Duration;

/// Length of a coalescing window. Every labeled query reaching a coalescing
/// driver within this time after the first one shares its execution.
pub const COALESCING_WINDOW: Duration = Duration::from_millis(100);

/// Limit value meaning "every match".
pub const UNBOUNDED_LIMIT: i64 = -1;

/// Field used by the in-memory driver to identify stored records.
pub const RECORD_ID_FIELD: &str = "_id";

/// Driver registered by the command line runner when none is requested.
pub const DEFAULT_DRIVER_NAME: &str = "memory";

/// Environment variable holding the command line driver list.
pub const ENV_DRIVERS: &str = "MALCOLM_DRIVERS";
