//! Log levels.
//!
//! The [`Level`] enum is a superset of the syslog severities: twelve totally
//! ordered levels from [`Level::Panic`] (most severe, numeric 0) down to
//! [`Level::Lowest`] (most detailed, numeric 11). A record at level `l` is
//! emitted by a logger at level `m` iff `l <= m`.
//!
//! [`Level`]: ./enum.Level.html
//! [`Level::Panic`]: ./enum.Level.html#variant.Panic
//! [`Level::Lowest`]: ./enum.Level.html#variant.Lowest

use crate::error::{bad_level, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum_macros::{Display, EnumIter, EnumString};

/// Single-letter tags used by the console and file handlers, indexed by
/// numeric level.
pub const LEVEL_LETTERS: &[u8; 12] = b"PACEWNOIDFTL";

/// Loglevel for log records.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
)]
pub enum Level {
    /// System is unusable.
    #[strum(to_string = "panic", serialize = "emergency")]
    Panic = 0,
    /// Action must be taken immediately.
    #[strum(to_string = "alert")]
    Alert,
    /// Critical conditions.
    #[strum(to_string = "critical", serialize = "crit")]
    Critical,
    /// Error conditions.
    #[strum(to_string = "error", serialize = "err")]
    Error,
    /// Warning conditions.
    #[strum(to_string = "warning", serialize = "warn")]
    Warning,
    /// Normal but significant conditions.
    #[strum(to_string = "notice")]
    Notice,
    /// `println!` replacement: output requested by the user.
    #[strum(to_string = "output", serialize = "out")]
    Output,
    /// Informational messages.
    #[strum(to_string = "info")]
    Info,
    /// Debug-level messages.
    #[strum(to_string = "debug")]
    Debug,
    /// Detailed debug-level messages.
    #[strum(to_string = "fine")]
    Fine,
    /// Very detailed debug-level messages.
    #[strum(to_string = "trace")]
    Trace,
    /// Most detailed debug-level messages; the default level of a fresh
    /// logger.
    #[strum(to_string = "lowest")]
    Lowest = 11,
}

impl Level {
    /// Converts a numeric level. Values outside `[0, 11]` are rejected.
    pub fn from_int(value: u64) -> Result<Level> {
        match value {
            0 => Ok(Level::Panic),
            1 => Ok(Level::Alert),
            2 => Ok(Level::Critical),
            3 => Ok(Level::Error),
            4 => Ok(Level::Warning),
            5 => Ok(Level::Notice),
            6 => Ok(Level::Output),
            7 => Ok(Level::Info),
            8 => Ok(Level::Debug),
            9 => Ok(Level::Fine),
            10 => Ok(Level::Trace),
            11 => Ok(Level::Lowest),
            _ => bad_level(format!("numeric level {} outside [0, 11]", value)),
        }
    }

    /// Parses a level from its name (case-insensitive, synonyms accepted) or
    /// its numeric form.
    pub fn parse(s: &str) -> Result<Level> {
        if s.bytes().all(|b| b.is_ascii_digit()) && !s.is_empty() {
            match s.parse::<u64>() {
                Ok(n) => return Level::from_int(n),
                Err(_) => return bad_level(format!("numeric level '{}' out of range", s)),
            }
        }
        Level::from_str(&s.to_ascii_lowercase())
            .or_else(|_| bad_level(format!("unknown level name '{}'", s)))
    }

    /// The single-letter tag for this level.
    pub fn letter(self) -> char {
        LEVEL_LETTERS[self as usize] as char
    }

    /// All canonical level names in numeric order.
    pub fn all_names() -> &'static [&'static str] {
        &[
            "panic", "alert", "critical", "error", "warning", "notice", "output", "info", "debug",
            "fine", "trace", "lowest",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn level_order() {
        assert!(Level::Panic < Level::Alert);
        assert!(Level::Critical < Level::Error);
        assert!(Level::Output < Level::Info);
        assert!(Level::Trace < Level::Lowest);
    }

    #[test]
    fn numeric_round_trip() {
        for (i, level) in Level::iter().enumerate() {
            assert_eq!(Level::from_int(i as u64).unwrap(), level);
            assert_eq!(level as usize, i);
        }
        assert!(Level::from_int(12).is_err());
    }

    #[test]
    fn names_and_synonyms() {
        assert_eq!(Level::parse("warning").unwrap(), Level::Warning);
        assert_eq!(Level::parse("WARN").unwrap(), Level::Warning);
        assert_eq!(Level::parse("Emergency").unwrap(), Level::Panic);
        assert_eq!(Level::parse("crit").unwrap(), Level::Critical);
        assert_eq!(Level::parse("err").unwrap(), Level::Error);
        assert_eq!(Level::parse("out").unwrap(), Level::Output);
        assert_eq!(Level::parse("7").unwrap(), Level::Info);
        assert!(Level::parse("13").is_err());
        assert!(Level::parse("nope").is_err());
        assert!(Level::parse("").is_err());
    }

    #[test]
    fn letters() {
        assert_eq!(Level::Panic.letter(), 'P');
        assert_eq!(Level::Output.letter(), 'O');
        assert_eq!(Level::Info.letter(), 'I');
        assert_eq!(Level::Lowest.letter(), 'L');
    }

    #[test]
    fn display_is_canonical_name() {
        for (i, name) in Level::all_names().iter().enumerate() {
            assert_eq!(&Level::from_int(i as u64).unwrap().to_string(), name);
        }
    }
}
