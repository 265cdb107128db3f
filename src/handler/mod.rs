//! The handler subsystem.
//!
//! A handler is a pluggable sink consumer: it owns its sink resources and a
//! per-handler [`FilterSet`] snapshot, and is driven by exactly one worker
//! thread (see [`runtime`]). The [`Handler`] trait is the polymorphic
//! contract every sink implements.
//!
//! Construction happens in two steps, mirroring the configuration/runtime
//! split: building a handler from its configuration allocates the parameter
//! block and must not perform I/O; [`Handler::init`] then opens the sink
//! resources on the worker thread. An `init` failure is fatal to that
//! handler only, never to the process.
//!
//! [`FilterSet`]: ../filter/struct.FilterSet.html
//! [`Handler`]: ./trait.Handler.html
//! [`Handler::init`]: ./trait.Handler.html#tymethod.init
//! [`runtime`]: ./runtime/index.html

use crate::{
    error::{Error, Result},
    filter::FilterSet,
    record::Record,
};

pub mod callback;
pub mod console;
pub mod file;
pub mod null;
pub mod remote;
pub mod runtime;
pub mod syslog;

/// The polymorphic contract every sink implements.
///
/// All methods run on the handler's worker thread; implementations never
/// need internal locking for their sink resources.
pub trait Handler: Send {
    /// Instance name, used in diagnostics and exit summaries.
    fn name(&self) -> &str;

    /// The per-handler filter snapshot used for consumer-side admission.
    fn filters(&self) -> &FilterSet;

    /// One-time open of the sink resources. A failure terminates this
    /// handler only.
    fn init(&mut self) -> Result<()>;

    /// Writes one record to the sink. Multi-line payloads must be emitted
    /// as independently framed entries, one per logical line.
    fn process_log(&mut self, record: &Record) -> Result<()>;

    /// Hook for the handler's own error policy. The worker records the
    /// error in its error set and rate-limits duplicates before calling
    /// this; implementations may additionally report through their own
    /// sink.
    fn process_err(&mut self, _error: &Error) -> Result<()> {
        Ok(())
    }

    /// Best-effort sink drain on an idle poll tick; errors are non-fatal.
    fn process_implicit_flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Strong drain: preceding records must be durable to the sink's
    /// notion of durability before this returns.
    fn process_explicit_flush(&mut self) -> Result<()> {
        self.process_implicit_flush()
    }

    /// Final drain and close.
    fn process_exit(&mut self) -> Result<()>;

    /// Installs a new filter snapshot.
    fn process_cfg(&mut self, filters: FilterSet) -> Result<()>;
}
