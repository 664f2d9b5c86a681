//! The `log` module defines the interface to propkit's internal logging
//! facilities. The framework emits leveled diagnostics on non-fatal anomalies
//! (double frees, out-of-range frees, clearing a pool with live allocations)
//! and never depends on log output for correctness.
//!
//! This module (re)exports the five logging macros: `error!`, `warn!`,
//! `info!`, `debug!` and `trace!`, where `error!` represents the
//! highest-priority messages and `trace!` the lowest. To emit a log message,
//! simply use one of these macros in your code:
//!
//! ```rust
//! use propkit::info;
//!
//! pub fn do_a_thing() {
//!     info!("A thing is being done.");
//! }
//! ```
//!
//! Logging is _disabled_ by default. Log messages are enabled/disabled using
//! the functions:
//!
//!  - `enable_logging()`: turns on all log messages
//!  - `disable_logging()`: turns off all log messages
//!  - `set_log_level(level: LevelFilter)`: enables only log messages with
//!    priority at least `level`

use std::sync::Once;

use env_logger::Builder;
pub use log::{debug, error, info, trace, warn, LevelFilter};

// Logging disabled.
const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Off;

static INIT_LOGGER: Once = Once::new();

/// Enables the logger with no global level filter / full logging. Equivalent
/// to `set_log_level(LevelFilter::Trace)`.
pub fn enable_logging() {
    set_log_level(LevelFilter::Trace);
}

/// Disables logging completely. Equivalent to
/// `set_log_level(LevelFilter::Off)`.
pub fn disable_logging() {
    set_log_level(DEFAULT_LOG_LEVEL);
}

/// Sets the global log level. A filter level of `LevelFilter::Off` disables
/// logging.
pub fn set_log_level(level: LevelFilter) {
    INIT_LOGGER.call_once(|| {
        // The global logger can only be installed once per process; level
        // changes after that go through `log::set_max_level`.
        let _ = Builder::new().filter_level(level).try_init();
    });
    log::set_max_level(level);
}
