//! Filter rules and filter sets.
//!
//! A [`FilterSet`] is an ordered list of `(prefix, level)` rules. The rule
//! that applies to a logger is the *last* one whose prefix is a string
//! prefix of the logger's name; the empty prefix matches every logger. The
//! textual form is `prefix:level[,prefix:level]*`, e.g.
//! `:warning,net:info,net.tls:debug`.
//!
//! [`FilterSet`]: ./struct.FilterSet.html

use crate::{
    error::{bad_syntax, Error, Result},
    level::Level,
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// A single `(prefix, level)` rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterRule {
    prefix: String,
    level: Level,
}

impl FilterRule {
    /// Constructs a rule. The prefix may only contain `[A-Za-z0-9_.]` and
    /// may be empty.
    pub fn new(prefix: impl Into<String>, level: Level) -> Result<FilterRule> {
        let prefix = prefix.into();
        if let Some(c) = prefix
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && *c != '_' && *c != '.')
        {
            return bad_syntax(format!("invalid character '{}' in prefix '{}'", c, prefix));
        }
        Ok(FilterRule { prefix, level })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn level(&self) -> Level {
        self.level
    }

    /// Returns true if this rule applies to the given logger name.
    pub fn matches(&self, logger_name: &str) -> bool {
        logger_name.starts_with(&self.prefix)
    }
}

/// An ordered list of filter rules, applied last-match-wins.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSet {
    rules: Vec<FilterRule>,
}

impl FilterSet {
    /// An empty filter set; matches nothing and changes nothing.
    pub fn new() -> FilterSet {
        FilterSet { rules: vec![] }
    }

    /// A single-rule set with the empty prefix: every logger gets `level`.
    pub fn all_at(level: Level) -> FilterSet {
        FilterSet {
            rules: vec![FilterRule {
                prefix: String::new(),
                level,
            }],
        }
    }

    /// Appends a rule; later rules take precedence over earlier ones.
    pub fn push(&mut self, rule: FilterRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The level of the last rule matching `logger_name`, if any.
    pub fn level_for(&self, logger_name: &str) -> Option<Level> {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.matches(logger_name))
            .map(|rule| rule.level)
    }

    /// Returns true if a record at `level` from `logger_name` passes this
    /// filter set. Loggers that match no rule are admitted.
    pub fn admits(&self, logger_name: &str, level: Level) -> bool {
        match self.level_for(logger_name) {
            Some(configured) => level <= configured,
            None => true,
        }
    }
}

impl FromStr for FilterSet {
    type Err = Error;

    /// Parses `prefix:level[,prefix:level]*`. Levels are parsed by
    /// [`Level::parse`] and thus accept names, synonyms and digits.
    ///
    /// [`Level::parse`]: ../level/enum.Level.html#method.parse
    fn from_str(s: &str) -> Result<FilterSet> {
        let mut rules = vec![];
        for item in s.split(',') {
            let mut splitter = item.splitn(2, ':');
            let prefix = splitter.next().unwrap_or("");
            let level = match splitter.next() {
                Some(level) => Level::parse(level)?,
                None => {
                    return bad_syntax(format!("expected a colon in filter rule '{}'", item));
                }
            };
            rules.push(FilterRule::new(prefix, level)?);
        }
        Ok(FilterSet { rules })
    }
}

impl fmt::Display for FilterSet {
    /// Turns the filter set into a string representation that can be parsed
    /// back by `from_str()`.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for rule in &self.rules {
            if !first {
                write!(f, ",")?;
            }
            first = false;
            write!(f, "{}:{}", rule.prefix, rule.level)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_basic() {
        let set = FilterSet::from_str(":warning,net:info,net.tls:debug").unwrap();
        assert_eq!(set.rules().len(), 3);
        assert_eq!(set.rules()[0].prefix(), "");
        assert_eq!(set.rules()[0].level(), Level::Warning);
        assert_eq!(set.rules()[2].prefix(), "net.tls");
        assert_eq!(set.rules()[2].level(), Level::Debug);
    }

    #[test]
    fn parse_rejects_bad_level() {
        assert!(FilterSet::from_str(":warning,a:13").is_err());
        assert!(FilterSet::from_str("a:nolevel").is_err());
    }

    #[test]
    fn parse_rejects_bad_syntax() {
        assert!(FilterSet::from_str("warning").is_err());
        assert!(FilterSet::from_str("a/b:info").is_err());
    }

    #[test]
    fn last_match_wins() {
        let set = FilterSet::from_str(":warning,a:info,a.b:debug").unwrap();
        assert_eq!(set.level_for("a"), Some(Level::Info));
        assert_eq!(set.level_for("a.b"), Some(Level::Debug));
        assert_eq!(set.level_for("a.b.c"), Some(Level::Debug));
        assert_eq!(set.level_for("x"), Some(Level::Warning));
    }

    #[test]
    fn string_prefix_not_dotted_segment() {
        // "a.bcd" matches the "a.b" prefix: plain string prefixes, no
        // segment boundary.
        let set = FilterSet::from_str("a.b:debug").unwrap();
        assert_eq!(set.level_for("a.bcd"), Some(Level::Debug));
        assert_eq!(set.level_for("a"), None);
    }

    #[test]
    fn empty_set_admits_everything() {
        let set = FilterSet::new();
        assert_eq!(set.level_for("anything"), None);
        assert!(set.admits("anything", Level::Lowest));
    }

    #[test]
    fn admits_checks_severity() {
        let set = FilterSet::from_str(":warning").unwrap();
        assert!(set.admits("a", Level::Error));
        assert!(set.admits("a", Level::Warning));
        assert!(!set.admits("a", Level::Info));
    }

    #[test]
    fn last_match_agrees_with_a_naive_reference() {
        let prefixes = ["", "a", "a.b", "a.b.c", "ax", "b", "net", "net.tls"];
        let names = ["a", "a.b", "a.b.c", "a.bcd", "ax.y", "b", "net.tls.x", "z"];
        let levels = [Level::Error, Level::Notice, Level::Debug];

        // Build a pile of rule permutations and compare against a direct
        // scan-from-the-end reference.
        for start in 0..prefixes.len() {
            let mut set = FilterSet::new();
            let mut reference: Vec<(&str, Level)> = vec![];
            for (i, prefix) in prefixes.iter().enumerate().skip(start) {
                let level = levels[i % levels.len()];
                set.push(FilterRule::new(*prefix, level).unwrap());
                reference.push((prefix, level));
            }
            for name in &names {
                let expected = reference
                    .iter()
                    .rev()
                    .find(|(prefix, _)| name.starts_with(prefix))
                    .map(|(_, level)| *level);
                assert_eq!(set.level_for(name), expected, "logger {}", name);
            }
        }
    }

    #[test]
    fn display_round_trip() {
        let text = ":warning,net:info,net.tls:debug";
        let set = FilterSet::from_str(text).unwrap();
        assert_eq!(set.to_string(), text);
        assert_eq!(FilterSet::from_str(&set.to_string()).unwrap(), set);
    }
}
