//! Find query matching
//!
//! A query is a literal with at most one `*`. The `*` matches any substring,
//! including the empty one. Brace groups such as `{0}` are plain literal
//! characters as far as matching goes.

use crate::error::Result;
use crate::record::{validate_pattern, WILDCARD};

/// A parsed Find query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    prefix: String,
    /// Present when the query contained a `*`
    suffix: Option<String>,
}

impl Pattern {
    /// Validate and parse a query string
    pub fn parse(raw: &str) -> Result<Self> {
        let pattern = validate_pattern(raw)?;
        Ok(match pattern.split_once(WILDCARD) {
            Some((prefix, suffix)) => Self {
                prefix: prefix.to_string(),
                suffix: Some(suffix.to_string()),
            },
            None => Self {
                prefix: pattern.to_string(),
                suffix: None,
            },
        })
    }

    /// Does `name` satisfy this query?
    pub fn matches(&self, name: &str) -> bool {
        match &self.suffix {
            None => name == self.prefix,
            Some(suffix) => {
                name.len() >= self.prefix.len() + suffix.len()
                    && name.starts_with(self.prefix.as_str())
                    && name.ends_with(suffix.as_str())
            }
        }
    }

    /// True if the query has no wildcard
    pub fn is_exact(&self) -> bool {
        self.suffix.is_none()
    }

    /// The literal text before the wildcard, or the whole query when exact
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}
