//! Log records.
//!
//! A [`Record`] is the immutable value describing a single log event: some
//! [`Metadata`] (level, timestamp, origin coordinates) plus the logger name
//! and the formatted message payload. Records are constructed once on the
//! producer thread and never mutated afterwards; the transport moves them by
//! value.
//!
//! [`Record`]: ./struct.Record.html
//! [`Metadata`]: ./struct.Metadata.html

use crate::level::Level;
use serde::{Deserialize, Serialize};
use std::{fmt, time::SystemTime};

/// Log record metadata.
///
/// The log metadata attached to a [`Record`].
///
/// [`Record`]: ./struct.Record.html
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Metadata {
    level: Level,
    timestamp: SystemTime,
    pid: u32,
    tid: u32,
    thread_rank: u16,
    file: String,
    func: String,
    line: u32,
}

/// A log record.
///
/// A log record consists of some metadata, the logger name and a payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Record {
    metadata: Metadata,
    logger: String,
    payload: String,
}

impl Record {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        logger: impl Into<String>,
        payload: impl Into<String>,
        level: Level,
        timestamp: SystemTime,
        pid: u32,
        tid: u32,
        thread_rank: u16,
        file: impl Into<String>,
        func: impl Into<String>,
        line: u32,
    ) -> Record {
        Record {
            metadata: Metadata {
                level,
                timestamp,
                pid,
                tid,
                thread_rank,
                file: file.into(),
                func: func.into(),
                line,
            },
            logger: logger.into(),
            payload: payload.into(),
        }
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }
    pub fn level(&self) -> Level {
        self.metadata.level
    }
    pub fn timestamp(&self) -> SystemTime {
        self.metadata.timestamp
    }
    pub fn pid(&self) -> u32 {
        self.metadata.pid
    }
    pub fn tid(&self) -> u32 {
        self.metadata.tid
    }
    pub fn thread_rank(&self) -> u16 {
        self.metadata.thread_rank
    }
    pub fn file(&self) -> &str {
        &self.metadata.file
    }
    pub fn func(&self) -> &str {
        &self.metadata.func
    }
    pub fn line(&self) -> u32 {
        self.metadata.line
    }
    pub fn logger(&self) -> &str {
        &self.logger
    }

    /// The logical lines of the payload. Handlers emit each as an
    /// independently framed entry.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.payload.split('\n')
    }

    /// Renders the fixed per-line prefix of the file format:
    /// `timestamp pid:tid@rank [L] logger file:func:line `.
    pub fn write_prefix(&self, f: &mut impl fmt::Write) -> fmt::Result {
        write!(
            f,
            "{} {}:{}@{} [{}] {} {}:{}:{} ",
            humantime::format_rfc3339_nanos(self.metadata.timestamp),
            self.metadata.pid,
            self.metadata.tid,
            self.metadata.thread_rank,
            self.metadata.level.letter(),
            self.logger,
            self.metadata.file,
            self.metadata.func,
            self.metadata.line,
        )
    }
}

impl fmt::Display for Record {
    /// The file log-line format, one physical line per logical line of the
    /// payload.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for line in self.lines() {
            if !first {
                writeln!(f)?;
            }
            first = false;
            self.write_prefix(f)?;
            f.write_str(line)?;
        }
        Ok(())
    }
}
