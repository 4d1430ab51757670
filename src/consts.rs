//! Project-wide constants.

use std::time::Duration;

pub const AUTHOR: &str = env!("CARGO_PKG_AUTHORS");
pub const HOMEPAGE: &str = env!("CARGO_PKG_HOMEPAGE");
pub const REPO: &str = env!("CARGO_PKG_REPOSITORY");

/// Default listen address for `tally serve`.
pub const DEFAULT_BIND: &str = "0.0.0.0:8080";

/// Route that accepts command batches.
pub const PROCESS_PATH: &str = "/process";

/// How long a single batch may run before the request is abandoned.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Worker pool size for the layered executor.
pub const DEFAULT_WORKERS: usize = 8;

/// Log filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "tally=info,tower_http=info";
