//! The console handler.
//!
//! Routes records whose level is at least as severe as `stderr_level` to
//! standard error and everything else to standard output. Every logical
//! line is prefixed with the single-letter level tag (`[I]`, `[W]`, ...),
//! except at [`Level::Output`] which prints the bare message, `println!`
//! style. Optional color themes tint each line with a per-level ANSI
//! escape sequence.
//!
//! [`Level::Output`]: ../../level/enum.Level.html#variant.Output

use crate::{
    error::{Error, Result},
    filter::FilterSet,
    handler::Handler,
    level::Level,
    record::Record,
};
use serde::{Deserialize, Serialize};
use std::{
    io,
    io::Write,
    time::SystemTime,
};
use strum_macros::{Display, EnumIter, EnumString};

const INTERNAL_LOGGER_NAME: &str = "fanlog.handler.console";

const RESET_COLORS: &str = "\x1b[0m";

// 6 × 6 × 6 = 216 colors: 16 + 36 × r + 6 × g + b (0 ≤ r, g, b ≤ 5)
const COLORS_216_DARK: [&str; 12] = [
    "\x1b[1m\x1b[38;5;207m",  // PANIC
    "\x1b[1m\x1b[38;5;200m",  // ALERT
    "\x1b[1m\x1b[38;5;198m",  // CRITICAL
    "\x1b[22m\x1b[38;5;196m", // ERROR
    "\x1b[22m\x1b[38;5;226m", // WARNING
    "\x1b[22m\x1b[38;5;229m", // NOTICE
    "\x1b[22m\x1b[38;5;231m", // OUTPUT
    "\x1b[2m\x1b[38;5;46m",   // INFO
    "\x1b[2m\x1b[38;5;83m",   // DEBUG
    "\x1b[2m\x1b[38;5;77m",   // FINE
    "\x1b[2m\x1b[38;5;71m",   // TRACE
    "\x1b[2m\x1b[38;5;65m",   // LOWEST
];

const COLORS_TC_DARK: [&str; 12] = [
    "\x1b[1m\x1b[38;2;255;51;255m",   // PANIC
    "\x1b[1m\x1b[38;2;255;0;175m",    // ALERT
    "\x1b[1m\x1b[38;2;255;0;150m",    // CRITICAL
    "\x1b[22m\x1b[38;2;255;0;0m",     // ERROR
    "\x1b[22m\x1b[38;2;255;255;0m",   // WARNING
    "\x1b[22m\x1b[38;2;255;255;153m", // NOTICE
    "\x1b[22m\x1b[38;2;255;255;255m", // OUTPUT
    "\x1b[2m\x1b[38;2;0;255;0m",      // INFO
    "\x1b[2m\x1b[38;2;51;255;51m",    // DEBUG
    "\x1b[2m\x1b[38;2;51;204;51m",    // FINE
    "\x1b[2m\x1b[38;2;51;153;51m",    // TRACE
    "\x1b[2m\x1b[38;2;51;102;51m",    // LOWEST
];

const COLORS_TC_LIGHT: [&str; 12] = [
    "\x1b[1m\x1b[38;2;255;25;70m",  // PANIC
    "\x1b[1m\x1b[38;2;200;0;50m",   // ALERT
    "\x1b[1m\x1b[38;2;175;0;0m",    // CRITICAL
    "\x1b[22m\x1b[38;2;128;25;0m",  // ERROR
    "\x1b[22m\x1b[38;2;128;75;0m",  // WARNING
    "\x1b[22m\x1b[38;2;75;50;0m",   // NOTICE
    "\x1b[22m\x1b[38;2;0;0;0m",     // OUTPUT
    "\x1b[2m\x1b[38;2;0;50;75m",    // INFO
    "\x1b[2m\x1b[38;2;0;50;100m",   // DEBUG
    "\x1b[2m\x1b[38;2;0;75;125m",   // FINE
    "\x1b[2m\x1b[38;2;0;75;150m",   // TRACE
    "\x1b[2m\x1b[38;2;0;100;175m",  // LOWEST
];

const COLORS_TC_DARKGRAY: [&str; 12] = [
    "\x1b[1m\x1b[38;2;255;255;255m",  // PANIC
    "\x1b[1m\x1b[38;2;233;233;233m",  // ALERT
    "\x1b[1m\x1b[38;2;212;212;212m",  // CRITICAL
    "\x1b[22m\x1b[38;2;191;191;191m", // ERROR
    "\x1b[22m\x1b[38;2;170;170;170m", // WARNING
    "\x1b[22m\x1b[38;2;149;149;149m", // NOTICE
    "\x1b[22m\x1b[38;2;128;128;128m", // OUTPUT
    "\x1b[2m\x1b[38;2;113;113;113m",  // INFO
    "\x1b[2m\x1b[38;2;98;98;98m",     // DEBUG
    "\x1b[2m\x1b[38;2;83;83;83m",     // FINE
    "\x1b[2m\x1b[38;2;68;68;68m",     // TRACE
    "\x1b[2m\x1b[38;2;53;53;53m",     // LOWEST
];

const COLORS_TC_LIGHTGRAY: [&str; 12] = [
    "\x1b[1m\x1b[38;2;38;38;38m",     // PANIC
    "\x1b[1m\x1b[38;2;53;53;53m",     // ALERT
    "\x1b[1m\x1b[38;2;68;38;68m",     // CRITICAL
    "\x1b[22m\x1b[38;2;83;83;83m",    // ERROR
    "\x1b[22m\x1b[38;2;98;98;98m",    // WARNING
    "\x1b[22m\x1b[38;2;113;113;113m", // NOTICE
    "\x1b[22m\x1b[38;2;128;128;128m", // OUTPUT
    "\x1b[2m\x1b[38;2;149;149;149m",  // INFO
    "\x1b[2m\x1b[38;2;170;170;170m",  // DEBUG
    "\x1b[2m\x1b[38;2;191;191;191m",  // FINE
    "\x1b[2m\x1b[38;2;202;202;202m",  // TRACE
    "\x1b[2m\x1b[38;2;210;210;210m",  // LOWEST
];

/// The console color themes.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
)]
pub enum ColorTheme {
    /// 216-color palette for dark backgrounds.
    #[strum(to_string = "216-dark")]
    Colors216Dark,
    /// Truecolor palette for dark backgrounds.
    #[strum(to_string = "truecolor-dark")]
    TrueColorDark,
    /// Truecolor grayscale for dark backgrounds.
    #[strum(to_string = "truecolor-darkgray")]
    TrueColorDarkGray,
    /// Truecolor palette for light backgrounds.
    #[strum(to_string = "truecolor-light")]
    TrueColorLight,
    /// Truecolor grayscale for light backgrounds.
    #[strum(to_string = "truecolor-lightgray")]
    TrueColorLightGray,
    /// No coloring.
    #[strum(to_string = "none")]
    None,
}

impl ColorTheme {
    fn table(self) -> Option<&'static [&'static str; 12]> {
        match self {
            ColorTheme::Colors216Dark => Some(&COLORS_216_DARK),
            ColorTheme::TrueColorDark => Some(&COLORS_TC_DARK),
            ColorTheme::TrueColorDarkGray => Some(&COLORS_TC_DARKGRAY),
            ColorTheme::TrueColorLight => Some(&COLORS_TC_LIGHT),
            ColorTheme::TrueColorLightGray => Some(&COLORS_TC_LIGHTGRAY),
            ColorTheme::None => None,
        }
    }
}

/// Parameters of the console handler.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ConsoleConfig {
    /// Records at this level or more severe go to stderr, the rest to
    /// stdout.
    pub stderr_level: Level,
    pub theme: ColorTheme,
}

impl Default for ConsoleConfig {
    fn default() -> ConsoleConfig {
        ConsoleConfig {
            stderr_level: Level::Warning,
            theme: ColorTheme::None,
        }
    }
}

/// Console sink.
pub struct ConsoleHandler {
    name: String,
    filters: FilterSet,
    config: ConsoleConfig,
    pid: u32,
    tid: u32,
}

impl ConsoleHandler {
    pub fn new(name: impl Into<String>, filters: FilterSet, config: ConsoleConfig) -> ConsoleHandler {
        ConsoleHandler {
            name: name.into(),
            filters,
            config,
            pid: 0,
            tid: 0,
        }
    }

    fn display(&self, record: &Record) -> Result<()> {
        let colors = self.config.theme.table();
        if record.level() <= self.config.stderr_level {
            let stderr = io::stderr();
            self.display_lines(&mut stderr.lock(), record, colors)
        } else {
            let stdout = io::stdout();
            self.display_lines(&mut stdout.lock(), record, colors)
        }
    }

    fn display_lines(
        &self,
        out: &mut impl Write,
        record: &Record,
        colors: Option<&'static [&'static str; 12]>,
    ) -> Result<()> {
        let level = record.level();
        for line in record.lines() {
            match (colors, level) {
                (Some(colors), Level::Output) => {
                    writeln!(out, "{}{}{}", colors[level as usize], line, RESET_COLORS)?
                }
                (Some(colors), _) => writeln!(
                    out,
                    "{}[{}] {}{}",
                    colors[level as usize],
                    level.letter(),
                    line,
                    RESET_COLORS
                )?,
                (None, Level::Output) => writeln!(out, "{}", line)?,
                (None, _) => writeln!(out, "[{}] {}", level.letter(), line)?,
            }
        }
        Ok(())
    }

    /// Reports through this handler's own sink under its internal logger
    /// name.
    fn internal_log(&mut self, level: Level, message: String) -> Result<()> {
        let record = Record::new(
            INTERNAL_LOGGER_NAME,
            message,
            level,
            SystemTime::now(),
            self.pid,
            self.tid,
            crate::producer::thread_rank(),
            file!(),
            module_path!(),
            line!(),
        );
        self.display(&record)
    }

    fn sync(&mut self) -> Result<()> {
        io::stderr().flush()?;
        io::stdout().flush()?;
        Ok(())
    }
}

impl Handler for ConsoleHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn filters(&self) -> &FilterSet {
        &self.filters
    }

    fn init(&mut self) -> Result<()> {
        self.pid = *crate::producer::PID;
        self.tid = crate::producer::tid();
        Ok(())
    }

    fn process_log(&mut self, record: &Record) -> Result<()> {
        self.display(record)
    }

    fn process_err(&mut self, error: &Error) -> Result<()> {
        self.internal_log(Level::Error, format!("An error occurred:\n {}", error))
    }

    fn process_implicit_flush(&mut self) -> Result<()> {
        // Stream flush failures on a console are of no interest.
        let _ = self.sync();
        Ok(())
    }

    fn process_explicit_flush(&mut self) -> Result<()> {
        self.sync()
    }

    fn process_exit(&mut self) -> Result<()> {
        self.sync()
    }

    fn process_cfg(&mut self, filters: FilterSet) -> Result<()> {
        self.filters = filters;
        Ok(())
    }
}
