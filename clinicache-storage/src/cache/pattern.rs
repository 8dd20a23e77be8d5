//! Glob patterns for `delete_by_pattern`.
//!
//! Supports the subset of Redis `MATCH` syntax the engine emits: `*` (any
//! run of characters, including `:`), `?` (one character) and `\` escapes.

use clinicache_core::CacheError;
use regex::Regex;

/// A compiled glob pattern.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    regex: Regex,
}

impl GlobPattern {
    pub fn compile(pattern: &str) -> Result<Self, CacheError> {
        if pattern.is_empty() {
            return Err(CacheError::InvalidPattern {
                pattern: pattern.to_string(),
            });
        }

        let mut expr = String::with_capacity(pattern.len() + 8);
        expr.push('^');
        let mut chars = pattern.chars();
        while let Some(c) = chars.next() {
            match c {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                '\\' => {
                    let escaped = chars.next().ok_or_else(|| CacheError::InvalidPattern {
                        pattern: pattern.to_string(),
                    })?;
                    expr.push_str(&regex::escape(&escaped.to_string()));
                }
                other => expr.push_str(&regex::escape(&other.to_string())),
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|_| CacheError::InvalidPattern {
            pattern: pattern.to_string(),
        })?;
        Ok(Self { regex })
    }

    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }
}
