//! Diagnostics collected across every stage of a scan.
//!
//! Diagnostics are plain data. No stage raises them as errors across a file or
//! stage boundary; they are accumulated per file and merged by the assembler.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Severity
// ============================================================================

/// How serious a finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Notable but harmless (e.g. a last-scan-wins override)
    Info,
    /// Suspicious; escalated to failure only by a strict caller
    Warning,
    /// The unit (span, payload, field or file) could not be processed
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Diagnostic Codes
// ============================================================================

/// Which stage produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    /// Unterminated block comment or docstring
    LocatorWarning,
    /// Unbalanced or syntactically invalid payload
    ExtractorError,
    /// Schema mismatch that invalidates a field
    ValidatorError,
    /// Unknown field (strict mode only)
    ValidatorWarning,
    /// Dependency name that resolved to no entity
    AssemblerWarning,
    /// An entity id was produced twice in one run; the later one won
    AssemblerInfo,
    /// Source text could not be obtained for a file
    IoError,
    /// File exceeded the per-file time budget
    Timeout,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCode::LocatorWarning => "LOCATOR_WARNING",
            DiagnosticCode::ExtractorError => "EXTRACTOR_ERROR",
            DiagnosticCode::ValidatorError => "VALIDATOR_ERROR",
            DiagnosticCode::ValidatorWarning => "VALIDATOR_WARNING",
            DiagnosticCode::AssemblerWarning => "ASSEMBLER_WARNING",
            DiagnosticCode::AssemblerInfo => "ASSEMBLER_INFO",
            DiagnosticCode::IoError => "IO_ERROR",
            DiagnosticCode::Timeout => "TIMEOUT",
        }
    }

    /// Severity this code carries by default.
    pub fn default_severity(&self) -> Severity {
        match self {
            DiagnosticCode::LocatorWarning
            | DiagnosticCode::ValidatorWarning
            | DiagnosticCode::AssemblerWarning => Severity::Warning,
            DiagnosticCode::AssemblerInfo => Severity::Info,
            DiagnosticCode::ExtractorError
            | DiagnosticCode::ValidatorError
            | DiagnosticCode::IoError
            | DiagnosticCode::Timeout => Severity::Error,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Diagnostic
// ============================================================================

/// A located finding produced while scanning or assembling.
///
/// Lines and columns are 1-based. A line of 0 means the finding concerns the
/// file as a whole (e.g. it could not be read).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl Diagnostic {
    /// Create a diagnostic with the code's default severity.
    pub fn new(
        code: DiagnosticCode,
        message: impl Into<String>,
        file: impl Into<String>,
        line: usize,
        column: usize,
    ) -> Self {
        Self {
            severity: code.default_severity(),
            code,
            message: message.into(),
            file: file.into(),
            line,
            column,
        }
    }

    /// Create a file-level diagnostic (no position).
    pub fn file_level(
        code: DiagnosticCode,
        message: impl Into<String>,
        file: impl Into<String>,
    ) -> Self {
        Self::new(code, message, file, 0, 0)
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }

    /// Total order used to make reports independent of scan order.
    pub fn report_order(&self, other: &Self) -> Ordering {
        self.file
            .cmp(&other.file)
            .then(self.line.cmp(&other.line))
            .then(self.column.cmp(&other.column))
            .then(self.code.cmp(&other.code))
            .then(self.message.cmp(&other.message))
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            write!(
                f,
                "{}: {} [{}] {}",
                self.file, self.severity, self.code, self.message
            )
        } else {
            write!(
                f,
                "{}:{}:{}: {} [{}] {}",
                self.file, self.line, self.column, self.severity, self.code, self.message
            )
        }
    }
}

/// Sort diagnostics into report order.
pub fn sort_diagnostics(diagnostics: &mut [Diagnostic]) {
    diagnostics.sort_by(|a, b| a.report_order(b));
}

// ============================================================================
// Summary
// ============================================================================

/// Counts of diagnostics by severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticSummary {
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
}

impl DiagnosticSummary {
    pub fn from_diagnostics<'a>(diagnostics: impl IntoIterator<Item = &'a Diagnostic>) -> Self {
        let mut summary = Self::default();
        for diagnostic in diagnostics {
            match diagnostic.severity {
                Severity::Error => summary.errors += 1,
                Severity::Warning => summary.warnings += 1,
                Severity::Info => summary.infos += 1,
            }
        }
        summary
    }

    /// Whether a run with these findings should be reported as failed.
    ///
    /// Errors always fail; warnings fail only when the caller asked for strict
    /// mode. Escalation is caller policy; the engine itself never changes
    /// severities based on it.
    pub fn fails(&self, strict: bool) -> bool {
        self.errors > 0 || (strict && self.warnings > 0)
    }
}
