//! Trigger rules: a line predicate bound to an action.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::error::{LogWatchError, Result};

/// Predicate over a single log line
pub trait LineMatcher: Send + Sync {
    fn matches(&self, line: &str) -> bool;

    /// Human readable form for logs
    fn describe(&self) -> &str;
}

/// Matches when the phrase occurs anywhere in the line
#[derive(Debug, Clone)]
pub struct Contains {
    phrase: String,
}

impl Contains {
    pub fn new(phrase: impl Into<String>) -> Self {
        Self {
            phrase: phrase.into(),
        }
    }
}

impl LineMatcher for Contains {
    fn matches(&self, line: &str) -> bool {
        line.contains(&self.phrase)
    }

    fn describe(&self) -> &str {
        &self.phrase
    }
}

/// Matches when the regex matches at the start of the line
#[derive(Debug, Clone)]
pub struct StartsWithPattern {
    source: String,
    regex: Regex,
}

impl StartsWithPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(&format!("^(?:{})", pattern)).map_err(|source| {
            LogWatchError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            }
        })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }
}

impl LineMatcher for StartsWithPattern {
    fn matches(&self, line: &str) -> bool {
        self.regex.is_match(line)
    }

    fn describe(&self) -> &str {
        &self.source
    }
}

pub type TriggerAction = Arc<dyn Fn() + Send + Sync>;

/// A matcher bound to a zero-argument action.
///
/// Rules are kept in insertion order and never deduplicated; two rules with
/// the same phrase both fire.
pub struct TriggerRule {
    matcher: Box<dyn LineMatcher>,
    action: TriggerAction,
}

impl TriggerRule {
    pub fn new(matcher: impl LineMatcher + 'static, action: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            matcher: Box::new(matcher),
            action: Arc::new(action),
        }
    }

    pub fn contains(phrase: impl Into<String>, action: impl Fn() + Send + Sync + 'static) -> Self {
        Self::new(Contains::new(phrase), action)
    }

    pub fn pattern(pattern: &str, action: impl Fn() + Send + Sync + 'static) -> Result<Self> {
        Ok(Self::new(StartsWithPattern::new(pattern)?, action))
    }

    /// Run the action if `line` matches; returns whether it did
    pub fn check(&self, line: &str) -> bool {
        if self.matcher.matches(line) {
            (self.action)();
            true
        } else {
            false
        }
    }

    pub fn description(&self) -> &str {
        self.matcher.describe()
    }
}

impl fmt::Debug for TriggerRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerRule")
            .field("matcher", &self.matcher.describe())
            .finish_non_exhaustive()
    }
}
