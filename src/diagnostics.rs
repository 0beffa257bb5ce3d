//! Diagnostic collection: the parser and type checker append to a shared
//! `Report` rather than failing on the first error where that's trivial
//! (e.g. checking every item in a projection list), so the shell can show
//! a user everything wrong with a statement at once.

use crate::sql::lexer::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub span: Span,
    pub message: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Default)]
pub struct Report {
    pub diagnostics: Vec<Diagnostic>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, span: Span, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            span,
            message: message.into(),
            severity: Severity::Error,
        });
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    /// Render each diagnostic with a pointer into `source`'s byte offsets.
    pub fn render(&self, source: &str) -> String {
        let mut out = String::new();
        for d in &self.diagnostics {
            let line_start = source[..d.span.start.min(source.len())].rfind('\n').map(|i| i + 1).unwrap_or(0);
            let line_no = source[..line_start].matches('\n').count() + 1;
            let col = d.span.start - line_start + 1;
            out.push_str(&format!("error[{line_no}:{col}]: {}\n", d.message));
        }
        out
    }
}

impl std::fmt::Display for Report {
    /// Source-free fallback used when a `Report` surfaces through
    /// `ExecError::Diagnostics` without the original SQL text at hand;
    /// callers holding the source string should prefer `render` instead.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, d) in self.diagnostics.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "error (byte {}): {}", d.span.start, d.message)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_collects_multiple_errors() {
        let mut r = Report::new();
        r.error(Span::new(0, 1), "first");
        r.error(Span::new(2, 3), "second");
        assert!(r.has_errors());
        assert_eq!(r.diagnostics.len(), 2);
    }

    #[test]
    fn display_joins_every_diagnostic_on_its_own_line() {
        let mut r = Report::new();
        r.error(Span::new(0, 1), "first");
        r.error(Span::new(2, 3), "second");
        let text = r.to_string();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("first"));
        assert!(text.contains("second"));
    }
}
