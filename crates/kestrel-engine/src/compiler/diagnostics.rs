//! Compile diagnostics
//!
//! Lowering never stops on a user error. It reports a `Diagnostic` to the
//! session's `ErrorManager` and keeps going; the compilation as a whole fails
//! afterwards if any error was recorded.

use crate::ast::Span;
use codespan_reporting::diagnostic::{Diagnostic as CsDiagnostic, Label, LabelStyle, Severity};
use codespan_reporting::files::{Files, SimpleFiles};
use codespan_reporting::term;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use termcolor::{Buffer, ColorChoice, StandardStream};

/// Diagnostic code (e.g. "E1001")
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode(pub &'static str);

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        self.0
    }
}

/// Codes for the diagnostics the lowering engine produces
pub mod codes {
    use super::ErrorCode;

    pub const INVALID_EXPRESSION: ErrorCode = ErrorCode("E1001");
    pub const DUPLICATE_PROPERTY: ErrorCode = ErrorCode("W1002");
    pub const DUPLICATE_PROTO: ErrorCode = ErrorCode("E1003");
    pub const MULTIPLE_SUPER: ErrorCode = ErrorCode("E1004");
    pub const SUPER_OUTSIDE_DERIVED: ErrorCode = ErrorCode("E1005");
    pub const NATIVE_SPREAD: ErrorCode = ErrorCode("E1006");
    pub const TYPED_ARRAY_SPREAD: ErrorCode = ErrorCode("E1007");
}

/// A diagnostic message with source code context
#[derive(Debug, Clone)]
pub struct Diagnostic {
    inner: CsDiagnostic<usize>,
    code: Option<ErrorCode>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Diagnostic {
            inner: CsDiagnostic::new(severity).with_message(message),
            code: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn note(message: impl Into<String>) -> Self {
        Self::new(Severity::Note, message)
    }

    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = Some(code);
        self.inner = self.inner.with_code(code.0);
        self
    }

    /// Add a primary label (main error location)
    pub fn with_primary_label(mut self, file_id: usize, span: Span, message: impl Into<String>) -> Self {
        let label = Label::primary(file_id, span.start..span.end).with_message(message);
        self.inner.labels.push(label);
        self
    }

    /// Add a secondary label (related location)
    pub fn with_secondary_label(mut self, file_id: usize, span: Span, message: impl Into<String>) -> Self {
        let label = Label::secondary(file_id, span.start..span.end).with_message(message);
        self.inner.labels.push(label);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.inner.notes.push(note.into());
        self
    }

    pub fn severity(&self) -> Severity {
        self.inner.severity
    }

    pub fn is_error(&self) -> bool {
        self.inner.severity >= Severity::Error
    }

    pub fn message(&self) -> &str {
        &self.inner.message
    }

    pub fn code(&self) -> Option<ErrorCode> {
        self.code
    }

    pub fn notes(&self) -> &[String] {
        &self.inner.notes
    }

    /// Messages of the secondary labels, in order
    pub fn secondary_messages(&self) -> Vec<&str> {
        self.inner
            .labels
            .iter()
            .filter(|l| l.style == LabelStyle::Secondary)
            .map(|l| l.message.as_str())
            .collect()
    }

    /// Byte range of the primary label
    pub fn primary_range(&self) -> Option<std::ops::Range<usize>> {
        self.inner
            .labels
            .iter()
            .find(|l| l.style == LabelStyle::Primary)
            .map(|l| l.range.clone())
    }

    /// Emit the diagnostic to stderr with colors
    pub fn emit(&self, files: &SimpleFiles<String, String>) -> Result<(), codespan_reporting::files::Error> {
        let mut writer = StandardStream::stderr(ColorChoice::Auto);
        let config = term::Config::default();
        term::emit(&mut writer, &config, files, &self.inner)
    }

    /// Render without colors into a string
    pub fn render(&self, files: &SimpleFiles<String, String>) -> Result<String, codespan_reporting::files::Error> {
        let mut buffer = Buffer::no_color();
        let config = term::Config::default();
        term::emit(&mut buffer, &config, files, &self.inner)?;
        Ok(String::from_utf8_lossy(buffer.as_slice()).into_owned())
    }

    pub fn inner(&self) -> &CsDiagnostic<usize> {
        &self.inner
    }

    /// Convert to JSON representation for tooling
    pub fn to_json(&self, files: &SimpleFiles<String, String>) -> Result<String, serde_json::Error> {
        let json_diag = JsonDiagnostic::from_diagnostic(self, files);
        serde_json::to_string_pretty(&json_diag)
    }
}

/// JSON representation of a diagnostic
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonDiagnostic {
    pub code: Option<String>,
    pub severity: String,
    pub message: String,
    pub labels: Vec<JsonLabel>,
    pub notes: Vec<String>,
}

/// JSON representation of a diagnostic label
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonLabel {
    pub file: String,
    /// 1-indexed
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
    pub message: Option<String>,
    /// "primary" or "secondary"
    pub style: String,
}

impl JsonDiagnostic {
    pub fn from_diagnostic(diag: &Diagnostic, files: &SimpleFiles<String, String>) -> Self {
        let severity = match diag.inner.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
            Severity::Help => "help",
            Severity::Bug => "bug",
        };

        let labels = diag
            .inner
            .labels
            .iter()
            .filter_map(|label| {
                let file = files.get(label.file_id).ok()?;
                let start = file.location((), label.range.start).ok()?;
                let end = file.location((), label.range.end).ok()?;
                Some(JsonLabel {
                    file: file.name().to_string(),
                    start_line: start.line_number,
                    start_column: start.column_number,
                    end_line: end.line_number,
                    end_column: end.column_number,
                    message: Some(label.message.clone()),
                    style: match label.style {
                        LabelStyle::Primary => "primary",
                        LabelStyle::Secondary => "secondary",
                    }
                    .to_string(),
                })
            })
            .collect();

        JsonDiagnostic {
            code: diag.code.map(|c| c.0.to_string()),
            severity: severity.to_string(),
            message: diag.inner.message.clone(),
            labels,
            notes: diag.inner.notes.clone(),
        }
    }
}

/// Collects the diagnostics of one compilation session
#[derive(Debug, Default)]
pub struct ErrorManager {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
    warning_count: usize,
    warnings_as_errors: bool,
    suppress_warnings: bool,
}

impl ErrorManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_warnings_as_errors(&mut self, enabled: bool) {
        self.warnings_as_errors = enabled;
    }

    pub fn set_suppress_warnings(&mut self, enabled: bool) {
        self.suppress_warnings = enabled;
    }

    /// Record a diagnostic, applying the warning policy
    pub fn report(&mut self, diag: Diagnostic) {
        let diag = match diag.severity() {
            Severity::Warning if self.suppress_warnings => return,
            Severity::Warning if self.warnings_as_errors => {
                let Diagnostic { mut inner, code } = diag;
                inner.severity = Severity::Error;
                Diagnostic { inner, code }
            }
            _ => diag,
        };
        match diag.severity() {
            Severity::Error | Severity::Bug => self.error_count += 1,
            Severity::Warning => self.warning_count += 1,
            _ => {}
        }
        self.diagnostics.push(diag);
    }

    pub fn error(&mut self, file_id: usize, span: Span, code: ErrorCode, message: impl Into<String>) {
        let message = message.into();
        self.report(
            Diagnostic::error(message.clone())
                .with_code(code)
                .with_primary_label(file_id, span, message),
        );
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.error_count = 0;
        self.warning_count = 0;
        std::mem::take(&mut self.diagnostics)
    }

    /// Emit every collected diagnostic to stderr
    pub fn emit_all(&self, files: &SimpleFiles<String, String>) -> Result<(), codespan_reporting::files::Error> {
        for diag in &self.diagnostics {
            diag.emit(files)?;
        }
        Ok(())
    }
}

/// Helper to create a SimpleFiles instance from source code
pub fn create_files(path: impl Into<PathBuf>, source: impl Into<String>) -> SimpleFiles<String, String> {
    let mut files = SimpleFiles::new();
    files.add(path.into().display().to_string(), source.into());
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_error_diagnostic() {
        let diag = Diagnostic::error("Test error message");
        assert_eq!(diag.severity(), Severity::Error);
        assert!(diag.is_error());
    }

    #[test]
    fn test_diagnostic_with_code() {
        let diag = Diagnostic::error("Test error").with_code(codes::MULTIPLE_SUPER);
        assert_eq!(diag.code(), Some(ErrorCode("E1004")));
    }

    #[test]
    fn test_error_manager_counts() {
        let mut em = ErrorManager::new();
        em.report(Diagnostic::warning("w"));
        em.error(0, Span::new(0, 1, 1, 1), codes::INVALID_EXPRESSION, "Invalid expression encountered");
        assert_eq!(em.error_count(), 1);
        assert_eq!(em.warning_count(), 1);
        assert!(em.has_errors());
    }

    #[test]
    fn test_warning_policies() {
        let mut em = ErrorManager::new();
        em.set_suppress_warnings(true);
        em.report(Diagnostic::warning("dropped"));
        assert!(em.diagnostics().is_empty());

        let mut em = ErrorManager::new();
        em.set_warnings_as_errors(true);
        em.report(Diagnostic::warning("promoted"));
        assert_eq!(em.error_count(), 1);
        assert_eq!(em.diagnostics()[0].severity(), Severity::Error);
    }

    #[test]
    fn test_json_output() {
        let files = create_files("test.js", "var o = {a: 1, a: 2};");
        let diag = Diagnostic::warning("the property \"a\" was set multiple times in the object definition.")
            .with_code(codes::DUPLICATE_PROPERTY)
            .with_primary_label(0, Span::new(15, 19, 1, 16), "")
            .with_secondary_label(0, Span::new(9, 13, 1, 10), "The first definition was here.");

        let json = diag.to_json(&files).unwrap();
        assert!(json.contains("\"W1002\""));
        assert!(json.contains("\"warning\""));
        assert!(json.contains("\"secondary\""));
        assert!(json.contains("\"start_column\": 16"));
    }

    #[test]
    fn test_render_plain_text() {
        let files = create_files("test.js", "super(); super();");
        let diag = Diagnostic::error("multiple super() calls in constructor")
            .with_primary_label(0, Span::new(9, 16, 1, 10), "second call");
        let text = diag.render(&files).unwrap();
        assert!(text.contains("multiple super() calls in constructor"));
        assert!(text.contains("test.js"));
    }
}
