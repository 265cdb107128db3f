//! The syslog handler.
//!
//! Opens the process-wide syslog connection with `openlog(ident, options,
//! facility)` and forwards every logical line of a record as one `syslog()`
//! call with priority `level + 1`.

use crate::{
    error::Result,
    filter::FilterSet,
    handler::Handler,
    record::Record,
};
use std::ffi::CString;

/// `syslog` option flags, a thin wrapper over the libc constants.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SyslogOptions(libc::c_int);

impl SyslogOptions {
    /// Log the pid with each message.
    pub const LOG_PID: Self = SyslogOptions(libc::LOG_PID);
    /// Log to the console if the syslog daemon is unreachable.
    pub const LOG_CONS: Self = SyslogOptions(libc::LOG_CONS);
    /// Open the connection immediately.
    pub const LOG_NDELAY: Self = SyslogOptions(libc::LOG_NDELAY);
    /// Delay open until the first `syslog()` (default).
    pub const LOG_ODELAY: Self = SyslogOptions(libc::LOG_ODELAY);
    /// Also log to stderr.
    pub const LOG_PERROR: Self = SyslogOptions(libc::LOG_PERROR);

    pub fn bits(self) -> libc::c_int {
        self.0
    }
}

impl std::ops::BitOr for SyslogOptions {
    type Output = SyslogOptions;

    fn bitor(self, rhs: SyslogOptions) -> SyslogOptions {
        SyslogOptions(self.0 | rhs.0)
    }
}

/// `syslog` facility.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(i32)]
pub enum Facility {
    User = libc::LOG_USER,
    Daemon = libc::LOG_DAEMON,
    Auth = libc::LOG_AUTH,
    Syslog = libc::LOG_SYSLOG,
    Cron = libc::LOG_CRON,
    Local0 = libc::LOG_LOCAL0,
    Local1 = libc::LOG_LOCAL1,
    Local2 = libc::LOG_LOCAL2,
    Local3 = libc::LOG_LOCAL3,
    Local4 = libc::LOG_LOCAL4,
    Local5 = libc::LOG_LOCAL5,
    Local6 = libc::LOG_LOCAL6,
    Local7 = libc::LOG_LOCAL7,
}

impl Default for Facility {
    fn default() -> Facility {
        Facility::Local0
    }
}

/// Parameters of the syslog handler.
#[derive(Clone, Debug, PartialEq)]
pub struct SyslogConfig {
    /// Identification string; reduced to its basename at init.
    pub ident: String,
    pub options: SyslogOptions,
    pub facility: Facility,
}

/// Syslog sink.
pub struct SyslogHandler {
    name: String,
    filters: FilterSet,
    config: SyslogConfig,
    // openlog(3) keeps the ident pointer; the CString must outlive the
    // connection.
    ident: Option<CString>,
}

impl SyslogHandler {
    pub fn new(name: impl Into<String>, filters: FilterSet, config: SyslogConfig) -> SyslogHandler {
        SyslogHandler {
            name: name.into(),
            filters,
            config,
            ident: None,
        }
    }
}

impl Handler for SyslogHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn filters(&self) -> &FilterSet {
        &self.filters
    }

    fn init(&mut self) -> Result<()> {
        let basename = self
            .config
            .ident
            .rsplit('/')
            .next()
            .unwrap_or(&self.config.ident);
        let ident = CString::new(basename)?;
        unsafe {
            libc::openlog(
                ident.as_ptr(),
                self.config.options.bits(),
                self.config.facility as libc::c_int,
            );
        }
        self.ident = Some(ident);
        Ok(())
    }

    fn process_log(&mut self, record: &Record) -> Result<()> {
        let priority = record.level() as libc::c_int + 1;
        for line in record.lines() {
            let stripped: Vec<u8> = line.bytes().filter(|&b| b != 0).collect();
            let line = CString::new(stripped)?;
            unsafe {
                libc::syslog(priority, b"%s\0".as_ptr() as *const libc::c_char, line.as_ptr());
            }
        }
        Ok(())
    }

    fn process_exit(&mut self) -> Result<()> {
        if self.ident.take().is_some() {
            unsafe { libc::closelog() };
        }
        Ok(())
    }

    fn process_cfg(&mut self, filters: FilterSet) -> Result<()> {
        self.filters = filters;
        Ok(())
    }
}
