//! The callback handler.
//!
//! Forwards every admitted record to a user-provided function. This is the
//! seam for externally-initialized logging subsystems: a net-snmp agent,
//! a language binding, or a test collecting records in memory.

use crate::{error::Result, filter::FilterSet, handler::Handler, record::Record};

/// Parameters of the callback handler.
///
/// Note the lack of derives; they don't play well with `Box<dyn Fn...>`.
pub struct CallbackConfig {
    /// The function to call with each admitted record.
    pub callback: Box<dyn Fn(&Record) + Send>,
}

impl CallbackConfig {
    pub fn new(callback: impl Fn(&Record) + Send + 'static) -> CallbackConfig {
        CallbackConfig {
            callback: Box::new(callback),
        }
    }
}

impl std::fmt::Debug for CallbackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "CallbackConfig {{ callback: <...> }}")
    }
}

/// Callback sink.
pub struct CallbackHandler {
    name: String,
    filters: FilterSet,
    callback: Box<dyn Fn(&Record) + Send>,
}

impl CallbackHandler {
    pub fn new(
        name: impl Into<String>,
        filters: FilterSet,
        config: CallbackConfig,
    ) -> CallbackHandler {
        CallbackHandler {
            name: name.into(),
            filters,
            callback: config.callback,
        }
    }
}

impl Handler for CallbackHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn filters(&self) -> &FilterSet {
        &self.filters
    }

    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    fn process_log(&mut self, record: &Record) -> Result<()> {
        (self.callback)(record);
        Ok(())
    }

    fn process_exit(&mut self) -> Result<()> {
        Ok(())
    }

    fn process_cfg(&mut self, filters: FilterSet) -> Result<()> {
        self.filters = filters;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Level;
    use std::{
        sync::{Arc, Mutex},
        time::SystemTime,
    };

    #[test]
    fn forwards_admitted_records() {
        let seen = Arc::new(Mutex::new(vec![]));
        let sink = seen.clone();
        let mut handler = CallbackHandler::new(
            "callback",
            FilterSet::new(),
            CallbackConfig::new(move |record: &Record| {
                sink.lock().unwrap().push(record.payload().to_string());
            }),
        );
        handler.init().unwrap();
        let record = Record::new(
            "a",
            "seen",
            Level::Info,
            SystemTime::now(),
            1,
            2,
            0,
            "f.rs",
            "f",
            1,
        );
        handler.process_log(&record).unwrap();
        handler.process_exit().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["seen"]);
    }
}
