//! Key name validation
//!
//! Legal key names are 1..=220 bytes drawn from `[A-Za-z0-9._-{}@]`.
//! A `.` may not lead the name. Braces must be balanced and not nested.
//!
//! Names coming from legacy callers may contain NUL: a NUL ends the name
//! (everything after it is ignored), so a NUL in position 0 yields an empty
//! and therefore invalid name.

use std::fmt;

use crate::error::{CfstoreError, Result};

/// Longest legal key name in bytes
pub const MAX_KEY_NAME_LENGTH: usize = 220;

/// Wildcard accepted by Find patterns
pub const WILDCARD: char = '*';

/// A validated key name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyName(String);

impl KeyName {
    /// Validate `raw` as a key name (no wildcard allowed)
    pub fn parse(raw: &str) -> Result<Self> {
        let name = significant(raw);
        check(name, false).map_err(CfstoreError::InvalidKeyName)?;
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for KeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for KeyName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Validate a Find query: a key name that may carry one `*`
pub fn validate_pattern(raw: &str) -> Result<&str> {
    let pattern = significant(raw);
    check(pattern, true).map_err(CfstoreError::InvalidKeyName)?;
    Ok(pattern)
}

/// True if `c` may appear in a stored key name
pub fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '{' | '}' | '@')
}

/// Cut at the first NUL
fn significant(raw: &str) -> &str {
    match raw.find('\0') {
        Some(pos) => &raw[..pos],
        None => raw,
    }
}

fn check(name: &str, allow_wildcard: bool) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("key name is empty".to_string());
    }
    if name.len() > MAX_KEY_NAME_LENGTH {
        return Err(format!(
            "key name is {} bytes (max {})",
            name.len(),
            MAX_KEY_NAME_LENGTH
        ));
    }
    if name.starts_with('.') {
        return Err("key name may not start with '.'".to_string());
    }

    let mut wildcards = 0;
    let mut in_brace = false;
    for (pos, c) in name.chars().enumerate() {
        match c {
            WILDCARD if allow_wildcard => {
                wildcards += 1;
                if wildcards > 1 {
                    return Err("pattern may contain only one '*'".to_string());
                }
            }
            '{' => {
                if in_brace {
                    return Err(format!("nested '{{' at position {}", pos));
                }
                in_brace = true;
            }
            '}' => {
                if !in_brace {
                    return Err(format!("unmatched '}}' at position {}", pos));
                }
                in_brace = false;
            }
            c if is_key_char(c) => {}
            c => {
                return Err(format!("illegal character {:?} at position {}", c, pos));
            }
        }
    }
    if in_brace {
        return Err("unterminated '{'".to_string());
    }
    Ok(())
}
