//! Error policy and diagnostics shared by the parser and the state tracker.

use std::fmt;
use std::sync::Arc;

use crate::ast::SourceInfo;
use crate::errors::StateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
    Information,
    Hint,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Information => "info",
            Severity::Hint => "hint",
        })
    }
}

/// A message attached to a source range, consumed by editor tooling
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub range: Option<SourceInfo>,
    pub message: String,
    pub severity: Severity,
    /// Pipeline stage that produced the diagnostic
    pub source_tag: &'static str,
}

impl Diagnostic {
    pub fn warning(range: Option<SourceInfo>, message: impl Into<String>) -> Diagnostic {
        Diagnostic {
            range,
            message: message.into(),
            severity: Severity::Warning,
            source_tag: "state",
        }
    }

    pub fn error(range: Option<SourceInfo>, message: impl Into<String>) -> Diagnostic {
        Diagnostic {
            range,
            message: message.into(),
            severity: Severity::Error,
            source_tag: "state",
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.range {
            Some(range) => write!(f, "{} ({range}): {}", self.severity, self.message),
            None => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}

/// Answer of an [`ErrorPolicy::Hook`] callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    Continue,
    Abort,
}

pub type DiagnosticHook = Arc<dyn Fn(&Diagnostic) -> HookAction + Send + Sync>;

/// What to do with a recoverable state error
#[derive(Clone, Default)]
pub enum ErrorPolicy {
    /// Drop the error and continue with the next command
    Ignore,
    /// Log, record a diagnostic and continue
    Warn,
    /// Abort interpretation
    #[default]
    Raise,
    /// Let the embedding tool decide
    Hook(DiagnosticHook),
}

impl fmt::Debug for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPolicy::Ignore => f.write_str("Ignore"),
            ErrorPolicy::Warn => f.write_str("Warn"),
            ErrorPolicy::Raise => f.write_str("Raise"),
            ErrorPolicy::Hook(_) => f.write_str("Hook(..)"),
        }
    }
}

impl ErrorPolicy {
    pub fn hook(callback: impl Fn(&Diagnostic) -> HookAction + Send + Sync + 'static) -> ErrorPolicy {
        ErrorPolicy::Hook(Arc::new(callback))
    }

    /// Decide the fate of `error`.
    ///
    /// `Ok(Some(_))` records a diagnostic and continues, `Ok(None)` continues
    /// silently, `Err` aborts. Always-fatal errors abort under every policy.
    pub fn handle(
        &self,
        error: StateError,
        location: Option<SourceInfo>,
    ) -> Result<Option<Diagnostic>, StateError> {
        if error.is_always_fatal() {
            return Err(error);
        }
        match self {
            ErrorPolicy::Ignore => Ok(None),
            ErrorPolicy::Raise => Err(error),
            ErrorPolicy::Warn => {
                crate::log::warn!(%error, "continuing after state error");
                Ok(Some(Diagnostic::error(location, error.to_string())))
            }
            ErrorPolicy::Hook(callback) => {
                let diagnostic = Diagnostic::error(location, error.to_string());
                match callback(&diagnostic) {
                    HookAction::Continue => Ok(Some(diagnostic)),
                    HookAction::Abort => Err(error),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ApertureId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recoverable() -> StateError {
        StateError::ApertureNotDefined { id: ApertureId(11) }
    }

    #[test]
    fn raise_is_the_default() {
        let policy = ErrorPolicy::default();
        assert!(policy.handle(recoverable(), None).is_err());
    }

    #[test]
    fn ignore_and_warn_continue() {
        assert_eq!(ErrorPolicy::Ignore.handle(recoverable(), None), Ok(None));
        let diagnostic = ErrorPolicy::Warn.handle(recoverable(), None).unwrap().unwrap();
        assert_eq!(diagnostic.severity, Severity::Error);
        assert!(diagnostic.message.contains("D11"));
    }

    #[test]
    fn fatal_errors_ignore_policy() {
        let fatal = StateError::DivisionByZero { expression: "$1/0".into() };
        assert!(ErrorPolicy::Ignore.handle(fatal, None).is_err());
    }

    #[test]
    fn hook_decides() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let policy = ErrorPolicy::hook(move |_| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                HookAction::Continue
            } else {
                HookAction::Abort
            }
        });
        assert!(matches!(policy.handle(recoverable(), None), Ok(Some(_))));
        assert!(policy.handle(recoverable(), None).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
