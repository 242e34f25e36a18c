//! # Error Handling
//!
//! Diagnostic types and the error-handler collaborator used by every stage
//! of the pipeline.
//!
//! Diagnostics accumulate: a pass keeps going where it can so that several
//! problems surface in one run. After the analyzer, the driver consults
//! [`ErrorHandler::is_good`] and skips code generation if anything was
//! recorded as an error.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::token::TokenLoc;

/// Severity level of a diagnostic message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Severity {
    /// Warning: suspicious construct, compilation continues
    Warning,
    /// Error: the script will not produce code
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// How warnings are treated by an [`ErrorLog`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WarningMode {
    /// Drop warnings entirely
    Ignore,
    /// Record warnings as warnings
    #[default]
    Normal,
    /// Promote every warning to an error
    Strict,
}

/// A recorded diagnostic with its source position
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub line: u32,
    pub column: u32,
    pub source: String,
}

impl Diagnostic {
    fn new(severity: Severity, message: &str, loc: &TokenLoc) -> Self {
        Diagnostic {
            severity,
            message: String::from(message),
            line: loc.line,
            column: loc.column,
            source: loc.source.clone(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.source.is_empty() {
            write!(
                f,
                "{}: {} (line {}:{})",
                self.severity, self.message, self.line, self.column
            )
        } else {
            write!(
                f,
                "{}: {} ({}:{}:{})",
                self.severity, self.message, self.source, self.line, self.column
            )
        }
    }
}

/// Collaborator that receives diagnostics from every pipeline stage
pub trait ErrorHandler {
    /// Report an error at the given position
    fn error(&mut self, message: &str, loc: &TokenLoc);

    /// Report a warning at the given position. Implementations apply their
    /// warning mode here: a warning may be dropped or promoted.
    fn warning(&mut self, message: &str, loc: &TokenLoc);

    /// Forget everything recorded so far
    fn reset(&mut self);

    /// True while no error has been recorded
    fn is_good(&self) -> bool;
}

/// Recording error handler with a configurable warning mode
#[derive(Debug, Default)]
pub struct ErrorLog {
    mode: WarningMode,
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
    warning_count: usize,
}

impl ErrorLog {
    pub fn new(mode: WarningMode) -> Self {
        ErrorLog {
            mode,
            diagnostics: Vec::new(),
            error_count: 0,
            warning_count: 0,
        }
    }

    pub fn mode(&self) -> WarningMode {
        self.mode
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Move the recorded diagnostics out, leaving the log empty
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.error_count = 0;
        self.warning_count = 0;
        core::mem::take(&mut self.diagnostics)
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }
}

impl ErrorHandler for ErrorLog {
    fn error(&mut self, message: &str, loc: &TokenLoc) {
        self.error_count += 1;
        self.diagnostics
            .push(Diagnostic::new(Severity::Error, message, loc));
    }

    fn warning(&mut self, message: &str, loc: &TokenLoc) {
        match self.mode {
            WarningMode::Ignore => {}
            WarningMode::Normal => {
                self.warning_count += 1;
                self.diagnostics
                    .push(Diagnostic::new(Severity::Warning, message, loc));
            }
            WarningMode::Strict => self.error(message, loc),
        }
    }

    fn reset(&mut self) {
        self.diagnostics.clear();
        self.error_count = 0;
        self.warning_count = 0;
    }

    fn is_good(&self) -> bool {
        self.error_count == 0
    }
}

/// Error handler that discards messages but still tracks failure.
///
/// Used by batch compilation to avoid per-script diagnostic spam while
/// keeping the success/failure verdict accurate.
#[derive(Debug, Default)]
pub struct NullErrorHandler {
    failed: bool,
}

impl NullErrorHandler {
    pub fn new() -> Self {
        NullErrorHandler { failed: false }
    }
}

impl ErrorHandler for NullErrorHandler {
    fn error(&mut self, _message: &str, _loc: &TokenLoc) {
        self.failed = true;
    }

    fn warning(&mut self, _message: &str, _loc: &TokenLoc) {}

    fn reset(&mut self) {
        self.failed = false;
    }

    fn is_good(&self) -> bool {
        !self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    fn loc() -> TokenLoc {
        TokenLoc::new(3, 7, "test", "x")
    }

    #[test]
    fn test_error_log_records() {
        let mut log = ErrorLog::new(WarningMode::Normal);
        log.warning("odd construct", &loc());
        assert!(log.is_good());
        log.error("bad construct", &loc());
        assert!(!log.is_good());
        assert_eq!(log.diagnostics().len(), 2);
        assert_eq!(log.error_count(), 1);
        assert_eq!(log.warning_count(), 1);
    }

    #[test]
    fn test_warning_modes() {
        let mut ignore = ErrorLog::new(WarningMode::Ignore);
        ignore.warning("noise", &loc());
        assert!(ignore.is_good());
        assert!(ignore.diagnostics().is_empty());

        let mut strict = ErrorLog::new(WarningMode::Strict);
        strict.warning("noise", &loc());
        assert!(!strict.is_good());
        assert_eq!(strict.diagnostics()[0].severity, Severity::Error);
    }

    #[test]
    fn test_reset() {
        let mut log = ErrorLog::new(WarningMode::Normal);
        log.error("bad", &loc());
        log.reset();
        assert!(log.is_good());
        assert!(log.diagnostics().is_empty());
    }

    #[test]
    fn test_null_handler_tracks_failure() {
        let mut null = NullErrorHandler::new();
        null.warning("noise", &loc());
        assert!(null.is_good());
        null.error("bad", &loc());
        assert!(!null.is_good());
    }

    #[test]
    fn test_diagnostic_display() {
        let mut log = ErrorLog::new(WarningMode::Normal);
        log.error("Invalid set target. Must be a primitive.", &loc());
        assert_eq!(
            log.diagnostics()[0].to_string(),
            "error: Invalid set target. Must be a primitive. (test:3:7)"
        );
    }
}
