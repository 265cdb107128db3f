//! Loggers and the process-wide logger registry.
//!
//! A [`Logger`] is nothing but an immutable dotted name plus an atomic
//! level: producers read the level with a single relaxed load on the fast
//! path, while the registry serializes writes behind its lock. The
//! [`Registry`] is the process-wide directory answering name lookups and
//! applying a [`FilterSet`] to every registered logger.
//!
//! The registry holds strong [`Arc`] handles to its loggers; loggers hold no
//! reference back.
//!
//! [`Logger`]: ./struct.Logger.html
//! [`Registry`]: ./struct.Registry.html
//! [`FilterSet`]: ../filter/struct.FilterSet.html

use crate::{
    error::{ErrorKind, Result},
    filter::FilterSet,
    level::Level,
};
use lazy_static::lazy_static;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, RwLock,
    },
};

/// A named logger with an atomically readable level.
#[derive(Debug)]
pub struct Logger {
    name: String,
    level: AtomicUsize,
}

impl Logger {
    /// Creates a detached logger at the given level. Use
    /// [`Registry::get_or_create`] for the common case.
    ///
    /// [`Registry::get_or_create`]: ./struct.Registry.html#method.get_or_create
    pub fn new(name: impl Into<String>, level: Level) -> Arc<Logger> {
        Arc::new(Logger {
            name: name.into(),
            level: AtomicUsize::new(level as usize),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current level. A single relaxed atomic load.
    #[inline]
    pub fn level(&self) -> Level {
        Level::from_int(self.level.load(Ordering::Relaxed) as u64).unwrap_or(Level::Lowest)
    }

    /// Returns true if this logger emits records at `level`. This is the
    /// producer fast-reject check: one atomic load and a compare.
    #[inline]
    pub fn enabled(&self, level: Level) -> bool {
        level as usize <= self.level.load(Ordering::Relaxed)
    }

    /// Sets the level. Writes come from the registry when filters are
    /// (re)applied, or from explicit reconfiguration.
    pub fn set_level(&self, level: Level) {
        self.level.store(level as usize, Ordering::Relaxed);
    }

    /// Formats and enqueues a record. The macros inline the level check
    /// and call this only for admitted records; calling it directly skips
    /// the check.
    pub fn log_args(
        &self,
        level: Level,
        file: &str,
        line: u32,
        func: &str,
        args: std::fmt::Arguments,
    ) -> Result<()> {
        crate::producer::submit(self, level, file, line, func, args)
    }

    /// Enqueues a pre-built message without formatting, for callers and
    /// language bindings holding one already.
    pub fn log_rawstr(
        &self,
        level: Level,
        file: &str,
        line: u32,
        func: &str,
        rawstr: &str,
    ) -> Result<()> {
        crate::producer::submit_rawstr(self, level, file, line, func, rawstr)
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    loggers: HashMap<String, Arc<Logger>>,
    filters: FilterSet,
}

/// The process-wide directory of loggers.
///
/// Thread-safe with read-mostly access: lookups take the read lock,
/// registration and filter replacement take the write lock.
#[derive(Debug, Default)]
pub struct Registry {
    inner: RwLock<RegistryInner>,
}

lazy_static! {
    static ref REGISTRY: Registry = Registry::default();
}

impl Registry {
    /// The process-global registry instance.
    pub fn global() -> &'static Registry {
        &REGISTRY
    }

    /// Registers a logger. Idempotent when a logger of the same name and
    /// level is already present; a duplicate name with a divergent level is
    /// rejected with `AlreadyRegistered`.
    pub fn register(&self, logger: Arc<Logger>) -> Result<()> {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if let Some(existing) = inner.loggers.get(logger.name()) {
            if existing.level() == logger.level() {
                return Ok(());
            }
            return Err(ErrorKind::AlreadyRegistered(format!(
                "logger '{}' registered at level {}, re-registration at {}",
                logger.name(),
                existing.level(),
                logger.level()
            ))
            .into());
        }
        if let Some(level) = inner.filters.level_for(logger.name()) {
            logger.set_level(level);
        }
        inner.loggers.insert(logger.name().to_string(), logger);
        Ok(())
    }

    /// Removes a logger by identity. No-op if it is absent or if another
    /// logger owns the name.
    pub fn unregister(&self, logger: &Arc<Logger>) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        let same = inner
            .loggers
            .get(logger.name())
            .map(|existing| Arc::ptr_eq(existing, logger))
            .unwrap_or(false);
        if same {
            inner.loggers.remove(logger.name());
        }
    }

    /// Returns the logger with the given name, creating and registering it
    /// at [`Level::Lowest`] (then running the filter set against it) if it
    /// does not exist yet.
    ///
    /// [`Level::Lowest`]: ../level/enum.Level.html#variant.Lowest
    pub fn get_or_create(&self, name: &str) -> Arc<Logger> {
        {
            let inner = self.inner.read().expect("registry lock poisoned");
            if let Some(logger) = inner.loggers.get(name) {
                return logger.clone();
            }
        }
        let mut inner = self.inner.write().expect("registry lock poisoned");
        // Racing creators: somebody may have won between the locks.
        if let Some(logger) = inner.loggers.get(name) {
            return logger.clone();
        }
        let logger = Logger::new(name, Level::Lowest);
        if let Some(level) = inner.filters.level_for(name) {
            logger.set_level(level);
        }
        inner.loggers.insert(name.to_string(), logger.clone());
        logger
    }

    /// Looks up a logger without creating it.
    pub fn get(&self, name: &str) -> Option<Arc<Logger>> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.loggers.get(name).cloned()
    }

    /// Returns an immutable snapshot of the registered loggers. Later
    /// registry mutation does not affect the returned set.
    pub fn snapshot(&self) -> Vec<Arc<Logger>> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.loggers.values().cloned().collect()
    }

    /// Replaces the registry-wide filter set and re-applies it to every
    /// registered logger.
    pub fn set_filters(&self, filters: FilterSet) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        for logger in inner.loggers.values() {
            if let Some(level) = filters.level_for(logger.name()) {
                logger.set_level(level);
            }
        }
        inner.filters = filters;
    }

    /// A copy of the current registry-wide filter set.
    pub fn filters(&self) -> FilterSet {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.filters.clone()
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.loggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
