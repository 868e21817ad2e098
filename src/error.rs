//! Error types shared across the guard.

use std::fmt;

/// Errors raised while building or running the guard's checks.
#[derive(Debug)]
pub enum GuardError {
    /// A sensitive-file pattern failed to compile or to run.
    Pattern {
        pattern: String,
        source: Box<fancy_regex::Error>,
    },
    /// A configured rule value is unusable (for example an empty marker).
    InvalidRule(String),
}

impl GuardError {
    pub(crate) fn pattern(pattern: &str, source: fancy_regex::Error) -> Self {
        Self::Pattern {
            pattern: pattern.to_string(),
            source: Box::new(source),
        }
    }
}

impl fmt::Display for GuardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern { pattern, source } => {
                write!(f, "pattern `{pattern}` failed: {source}")
            }
            Self::InvalidRule(msg) => write!(f, "invalid rule: {msg}"),
        }
    }
}

impl std::error::Error for GuardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Pattern { source, .. } => Some(source.as_ref()),
            Self::InvalidRule(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_rule_display() {
        let err = GuardError::InvalidRule("marker must not be empty".to_string());
        assert_eq!(err.to_string(), "invalid rule: marker must not be empty");
        assert!(std::error::Error::source(&err).is_none());
    }

    #[test]
    fn pattern_error_keeps_source() {
        let source = fancy_regex::Regex::new("(unclosed").expect_err("invalid regex");
        let err = GuardError::pattern("(unclosed", source);
        assert!(err.to_string().contains("(unclosed"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
