//! A high-performance, multi-threaded logging core.
//!
//! This crate moves log records from many producer threads to a set of
//! pluggable handlers, each driven by its own worker thread. Producers pay
//! for a single atomic load when a record is filtered out; admitted records
//! are formatted into a thread-local buffer and fanned out over bounded
//! channels, with per-handler drop accounting under backpressure. Flush,
//! reconfiguration and exit travel on separate control channels, so they
//! are never starved behind data.
//!
//! # Usage
//!
//! Configure the handlers, initialize the core, log through named loggers,
//! and finalize before the process ends (a fatal-signal bridge that does
//! this for you is available as [`install_sighandler`]):
//!
//! ```rust
//! use fanlog::{info, out, Config, FilterSet, HandlerConfig, SinkConfig};
//!
//! let config = Config::new("example")
//!     .with_handler(HandlerConfig::new(SinkConfig::Null, FilterSet::new()));
//! fanlog::init(config).unwrap();
//!
//! let logger = fanlog::logger("example.main");
//! info!(logger, "the answer is {}", 42);
//! out!(logger, "printf replacement");
//!
//! fanlog::flush().unwrap();
//! fanlog::finalize(true).unwrap();
//! ```
//!
//! # Structure
//!
//! * [`registry`]: named [`Logger`]s with atomic levels, and the
//!   process-wide directory.
//! * [`filter`]: `prefix:level` filter sets, applied last-match-wins.
//! * [`producer`]: the producer fast path and thread ranks.
//! * [`transport`]: the bounded data/control channel fan-out.
//! * [`handler`]: the [`Handler`] contract, the worker runtime, and the
//!   console, file, syslog, null, callback and remote publisher sinks.
//! * [`lifecycle`]: the process-global init/flush/finalize controller.
//! * [`signal`]: the fatal-signal bridge.
//! * [`receiver`]: the remote receiver feeding records back into the
//!   local core.
//!
//! [`install_sighandler`]: ./signal/fn.install_sighandler.html
//! [`registry`]: ./registry/index.html
//! [`Logger`]: ./registry/struct.Logger.html
//! [`filter`]: ./filter/index.html
//! [`producer`]: ./producer/index.html
//! [`transport`]: ./transport/index.html
//! [`handler`]: ./handler/index.html
//! [`Handler`]: ./handler/trait.Handler.html
//! [`lifecycle`]: ./lifecycle/index.html
//! [`signal`]: ./signal/index.html
//! [`receiver`]: ./receiver/index.html

pub mod config;
pub mod error;
pub mod filter;
pub mod handler;
pub mod level;
pub mod lifecycle;
pub mod producer;
pub mod receiver;
pub mod record;
pub mod registry;
pub mod signal;
pub mod transport;
pub mod wire;

pub use crate::{
    config::{basic_config, unit_test_config, Config, HandlerConfig, SinkConfig},
    error::{Error, ErrorKind, Result},
    filter::{FilterRule, FilterSet},
    level::Level,
    lifecycle::{
        finalize, flush, flush_with_deadline, fork_child_reinit, init, is_initialized,
        lost_logs, reconfigure,
    },
    producer::set_thread_rank,
    receiver::{recv, ReceiverConfig, RemoteReceiver},
    record::Record,
    registry::{Logger, Registry},
    signal::install_sighandler,
};

use std::sync::Arc;

/// Returns the logger with the given name from the process-wide registry,
/// creating and registering it if needed.
pub fn logger(name: &str) -> Arc<Logger> {
    Registry::global().get_or_create(name)
}

/// Produce a log with the given logger at the given level.
///
/// The level check is inlined here: a rejected record costs one atomic
/// load. Errors on the producer path are counted and reported to stderr
/// once per distinct error, never to the caller.
#[macro_export]
macro_rules! log {
    ($logger:expr, $lvl:expr, $($arg:tt)+) => ({
        match &$logger {
            logger => {
                if logger.enabled($lvl) {
                    if let Err(error) = logger.log_args(
                        $lvl,
                        file!(),
                        line!(),
                        module_path!(),
                        format_args!($($arg)+),
                    ) {
                        $crate::producer::report_producer_error(&error);
                    }
                }
            }
        }
    });
}

/// Produce a log at the `Panic` level.
#[macro_export]
macro_rules! panic_log {
    ($logger:expr, $($arg:tt)+) => (
        $crate::log!($logger, $crate::Level::Panic, $($arg)+)
    );
}

/// Produce a log at the `Alert` level.
#[macro_export]
macro_rules! alert {
    ($logger:expr, $($arg:tt)+) => (
        $crate::log!($logger, $crate::Level::Alert, $($arg)+)
    );
}

/// Produce a log at the `Critical` level.
#[macro_export]
macro_rules! critical {
    ($logger:expr, $($arg:tt)+) => (
        $crate::log!($logger, $crate::Level::Critical, $($arg)+)
    );
}

/// Produce a log at the `Error` level.
#[macro_export]
macro_rules! error {
    ($logger:expr, $($arg:tt)+) => (
        $crate::log!($logger, $crate::Level::Error, $($arg)+)
    );
}

/// Produce a log at the `Warning` level.
#[macro_export]
macro_rules! warning {
    ($logger:expr, $($arg:tt)+) => (
        $crate::log!($logger, $crate::Level::Warning, $($arg)+)
    );
}

/// Produce a log at the `Notice` level.
#[macro_export]
macro_rules! notice {
    ($logger:expr, $($arg:tt)+) => (
        $crate::log!($logger, $crate::Level::Notice, $($arg)+)
    );
}

/// Produce a log at the `Output` level: a `println!` replacement that
/// flows through the logging core.
#[macro_export]
macro_rules! out {
    ($logger:expr, $($arg:tt)+) => (
        $crate::log!($logger, $crate::Level::Output, $($arg)+)
    );
}

/// Produce a log at the `Info` level.
#[macro_export]
macro_rules! info {
    ($logger:expr, $($arg:tt)+) => (
        $crate::log!($logger, $crate::Level::Info, $($arg)+)
    );
}

/// Produce a log at the `Debug` level.
#[macro_export]
macro_rules! debug {
    ($logger:expr, $($arg:tt)+) => (
        $crate::log!($logger, $crate::Level::Debug, $($arg)+)
    );
}

/// Produce a log at the `Fine` level.
#[macro_export]
macro_rules! fine {
    ($logger:expr, $($arg:tt)+) => (
        $crate::log!($logger, $crate::Level::Fine, $($arg)+)
    );
}

/// Produce a log at the `Trace` level.
#[macro_export]
macro_rules! trace {
    ($logger:expr, $($arg:tt)+) => (
        $crate::log!($logger, $crate::Level::Trace, $($arg)+)
    );
}

/// Produce a log at the `Lowest` level.
#[macro_export]
macro_rules! lowest {
    ($logger:expr, $($arg:tt)+) => (
        $crate::log!($logger, $crate::Level::Lowest, $($arg)+)
    );
}
