//! Conflict classification of remote errors
//!
//! Classification goes by the structured error code only. Message text is
//! never inspected.

use crate::error::{ApiError, ConflictKind};
use std::collections::HashSet;

/// Maps a transport error to a retry-relevant [`ConflictKind`]
pub trait ConflictClassifier: Send + Sync {
    fn classify(&self, error: &ApiError) -> ConflictKind;
}

impl<F> ConflictClassifier for F
where
    F: Fn(&ApiError) -> ConflictKind + Send + Sync,
{
    fn classify(&self, error: &ApiError) -> ConflictKind {
        self(error)
    }
}

/// Table-driven classifier keyed on error codes.
///
/// Codes not present in any table are [`ConflictKind::Fatal`].
#[derive(Debug, Clone, Default)]
pub struct CodeClassifier {
    stale: HashSet<String>,
    busy: HashSet<String>,
    not_found: HashSet<String>,
}

impl CodeClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stale<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stale.extend(codes.into_iter().map(Into::into));
        self
    }

    pub fn busy<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.busy.extend(codes.into_iter().map(Into::into));
        self
    }

    pub fn not_found<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.not_found.extend(codes.into_iter().map(Into::into));
        self
    }
}

impl ConflictClassifier for CodeClassifier {
    fn classify(&self, error: &ApiError) -> ConflictKind {
        let code = error.code.as_str();
        if self.stale.contains(code) {
            ConflictKind::Stale
        } else if self.busy.contains(code) {
            ConflictKind::Busy
        } else if self.not_found.contains(code) {
            ConflictKind::NotFound
        } else {
            ConflictKind::Fatal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> CodeClassifier {
        CodeClassifier::new()
            .stale(["StaleToken"])
            .busy(["Throttled", "InternalError"])
            .not_found(["NoSuchItem"])
    }

    #[test]
    fn test_classifies_by_code() {
        let c = classifier();
        assert_eq!(c.classify(&ApiError::new("StaleToken", "")), ConflictKind::Stale);
        assert_eq!(c.classify(&ApiError::new("Throttled", "")), ConflictKind::Busy);
        assert_eq!(c.classify(&ApiError::new("InternalError", "")), ConflictKind::Busy);
        assert_eq!(c.classify(&ApiError::new("NoSuchItem", "")), ConflictKind::NotFound);
    }

    #[test]
    fn test_unknown_code_is_fatal() {
        let c = classifier();
        assert_eq!(
            c.classify(&ApiError::new("AccessDenied", "")),
            ConflictKind::Fatal
        );
    }

    #[test]
    fn test_message_text_is_ignored() {
        let c = classifier();
        let err = ApiError::new("QuotaExceeded", "StaleToken Throttled NoSuchItem");
        assert_eq!(c.classify(&err), ConflictKind::Fatal);
    }

    #[test]
    fn test_closure_classifier() {
        let c = |e: &ApiError| {
            if e.code == "X" {
                ConflictKind::Busy
            } else {
                ConflictKind::Fatal
            }
        };
        assert_eq!(c.classify(&ApiError::new("X", "")), ConflictKind::Busy);
    }
}
