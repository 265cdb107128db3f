//! Logging configuration.
//!
//! A [`Config`] names the program, fixes the transport tunables and lists
//! the handlers to start. Each handler is described by a [`HandlerConfig`]:
//! the shared parameter block (filters, channel high-water marks, poll and
//! drain timing, error budget) plus one [`SinkConfig`] variant carrying the
//! sink-specific parameters. Building a handler from its configuration
//! performs no I/O; sinks are opened by the worker in
//! [`Handler::init`].
//!
//! [`Config`]: ./struct.Config.html
//! [`HandlerConfig`]: ./struct.HandlerConfig.html
//! [`SinkConfig`]: ./enum.SinkConfig.html
//! [`Handler::init`]: ../handler/trait.Handler.html#tymethod.init

use crate::{
    filter::FilterSet,
    handler::{
        callback::{CallbackConfig, CallbackHandler},
        console::{ConsoleConfig, ConsoleHandler},
        file::{FileConfig, FileHandler, OpenMode},
        null::NullHandler,
        remote::{RemoteConfig, RemoteHandler},
        runtime::{WorkerOptions, DEFAULT_DRAIN_DEADLINE, DEFAULT_ERROR_BUDGET, DEFAULT_POLL_TIMEOUT},
        syslog::{SyslogConfig, SyslogHandler},
        Handler,
    },
    producer::DEFAULT_FORMAT_BUF_SIZE,
    transport::{DEFAULT_BACKPRESSURE_TIMEOUT, DEFAULT_CTRL_HWM, DEFAULT_DATA_HWM},
};
use std::time::Duration;

/// The parameter block shared by every handler type.
#[derive(Clone, Debug)]
pub struct CommonHandlerConfig {
    /// Per-handler filter snapshot for consumer-side admission.
    pub filters: FilterSet,
    /// Data channel capacity, in records.
    pub data_hwm: usize,
    /// Control channel capacity, in messages.
    pub ctrl_hwm: usize,
    /// Worker poll timeout; expiry triggers an implicit flush.
    pub poll_timeout: Duration,
    /// Bound on draining the data channel during flush and exit.
    pub drain_deadline: Duration,
    /// Distinct errors tolerated before the handler is escalated to exit.
    pub error_budget: usize,
}

impl Default for CommonHandlerConfig {
    fn default() -> CommonHandlerConfig {
        CommonHandlerConfig {
            filters: FilterSet::new(),
            data_hwm: DEFAULT_DATA_HWM,
            ctrl_hwm: DEFAULT_CTRL_HWM,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            drain_deadline: DEFAULT_DRAIN_DEADLINE,
            error_budget: DEFAULT_ERROR_BUDGET,
        }
    }
}

impl CommonHandlerConfig {
    pub fn with_filters(filters: FilterSet) -> CommonHandlerConfig {
        CommonHandlerConfig {
            filters,
            ..CommonHandlerConfig::default()
        }
    }

    pub(crate) fn worker_options(&self) -> WorkerOptions {
        WorkerOptions {
            poll_timeout: self.poll_timeout,
            drain_deadline: self.drain_deadline,
            error_budget: self.error_budget,
        }
    }
}

/// The sink-specific parameters, one variant per handler type.
#[derive(Debug)]
pub enum SinkConfig {
    Console(ConsoleConfig),
    File(FileConfig),
    Syslog(SyslogConfig),
    Null,
    Remote(RemoteConfig),
    Callback(CallbackConfig),
}

/// Full description of one handler instance.
#[derive(Debug)]
pub struct HandlerConfig {
    pub common: CommonHandlerConfig,
    pub sink: SinkConfig,
}

impl HandlerConfig {
    pub fn new(sink: SinkConfig, filters: FilterSet) -> HandlerConfig {
        HandlerConfig {
            common: CommonHandlerConfig::with_filters(filters),
            sink,
        }
    }

    /// Name used for the worker thread, channel diagnostics and exit
    /// summaries.
    pub fn instance_name(&self) -> String {
        match &self.sink {
            SinkConfig::Console(_) => "console".to_string(),
            SinkConfig::File(config) => format!("file:{}", config.basename),
            SinkConfig::Syslog(config) => format!("syslog:{}", config.ident),
            SinkConfig::Null => "null".to_string(),
            SinkConfig::Remote(config) => format!("remote:{}", config.url),
            SinkConfig::Callback(_) => "callback".to_string(),
        }
    }

    /// Allocates the handler for this configuration. No I/O happens here.
    pub(crate) fn build(self, progname: &str) -> Box<dyn Handler> {
        let name = self.instance_name();
        let filters = self.common.filters;
        match self.sink {
            SinkConfig::Console(config) => Box::new(ConsoleHandler::new(name, filters, config)),
            SinkConfig::File(config) => Box::new(FileHandler::new(name, filters, config)),
            SinkConfig::Syslog(config) => Box::new(SyslogHandler::new(name, filters, config)),
            SinkConfig::Null => Box::new(NullHandler::new(name, filters)),
            SinkConfig::Remote(config) => {
                Box::new(RemoteHandler::new(name, filters, progname, config))
            }
            SinkConfig::Callback(config) => Box::new(CallbackHandler::new(name, filters, config)),
        }
    }
}

/// The logging configuration handed to `init`.
#[derive(Debug)]
pub struct Config {
    progname: String,
    /// Initial size of the per-thread format buffers.
    pub format_buf_size: usize,
    /// Bounded-send timeout for records at `Critical` or worse.
    pub backpressure_timeout: Duration,
    handlers: Vec<HandlerConfig>,
}

impl Config {
    pub fn new(progname: impl Into<String>) -> Config {
        let progname = progname.into();
        Config {
            progname: basename(&progname).to_string(),
            format_buf_size: DEFAULT_FORMAT_BUF_SIZE,
            backpressure_timeout: DEFAULT_BACKPRESSURE_TIMEOUT,
            handlers: vec![],
        }
    }

    pub fn progname(&self) -> &str {
        &self.progname
    }

    pub fn add_handler(&mut self, handler: HandlerConfig) {
        self.handlers.push(handler);
    }

    pub fn with_handler(mut self, handler: HandlerConfig) -> Config {
        self.add_handler(handler);
        self
    }

    pub fn handlers(&self) -> &[HandlerConfig] {
        &self.handlers
    }

    pub(crate) fn take_handlers(&mut self) -> Vec<HandlerConfig> {
        std::mem::replace(&mut self.handlers, vec![])
    }
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// The standard configuration: one file handler on `path` (`-` for
/// stdout), all handlers sharing the given filter set.
pub fn basic_config(
    progname: &str,
    path: &str,
    open_mode: OpenMode,
    filters: FilterSet,
) -> Config {
    let config = Config::new(progname);
    let file = FileConfig {
        basename: config.progname().to_string(),
        path: path.to_string(),
        open_mode,
    };
    config.with_handler(HandlerConfig::new(SinkConfig::File(file), filters))
}

/// Test configuration: two file handlers, the second on `/dev/null`, so
/// multi-handler fan-out is always exercised.
pub fn unit_test_config(
    progname: &str,
    path: &str,
    open_mode: OpenMode,
    filters: FilterSet,
) -> Config {
    let config = basic_config(progname, path, open_mode, filters.clone());
    let null_file = FileConfig {
        basename: config.progname().to_string(),
        path: "/dev/null".to_string(),
        open_mode,
    };
    config.with_handler(HandlerConfig::new(SinkConfig::File(null_file), filters))
}
