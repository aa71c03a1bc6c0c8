//! Options that control how a document is opened.
//!
//! # Example
//! ```ignore
//! use std::time::Duration;
//! use lode_core::config::ParseOptions;
//!
//! let options = ParseOptions::default()
//!     .password("secret")
//!     .lenient(false)
//!     .scan_deadline(Duration::from_secs(2));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Default number of materialized objects kept in the LRU cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Shared cancellation flag for long-running scans.
///
/// Clones observe the same flag, so a caller can keep one handle and pass
/// another into [`ParseOptions`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Settings threaded through header, xref and object parsing.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Recover from structural damage instead of failing.
    ///
    /// Only structural checks consult this flag. Decode failures and
    /// encryption failures are fatal in both modes.
    pub lenient: bool,
    /// User or owner password for encrypted documents.
    pub password: String,
    /// Upper bound on the brute-force object scan.
    pub scan_deadline: Option<Duration>,
    /// External cancellation for the brute-force object scan.
    pub cancel: Option<CancelToken>,
    /// Capacity of the materialized-object cache.
    pub cache_capacity: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            lenient: true,
            password: String::new(),
            scan_deadline: None,
            cancel: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl ParseOptions {
    /// Strict parsing: every structural check is fatal.
    pub fn strict() -> Self {
        Self::default().lenient(false)
    }

    pub fn lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }

    pub fn password(mut self, pwd: &str) -> Self {
        self.password = pwd.to_string();
        self
    }

    pub fn scan_deadline(mut self, deadline: Duration) -> Self {
        self.scan_deadline = Some(deadline);
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Sets the object cache capacity. Zero disables caching.
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }
}
