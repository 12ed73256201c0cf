//! Diagnostics produced while lexing, parsing, analyzing, or evaluating a FHIRPath expression.
//!
//! Diagnostics are collected rather than raised as the first error encountered, so
//! that tools built on top of this crate (linters, editors) can report everything
//! wrong with an expression at once. [`Diagnostic::report`] renders one against its
//! source text with [`ariadne`], the same underline-and-label presentation
//! familiar from `rustc`'s own diagnostics.

use std::fmt;

/// How serious a diagnostic is, following the Language Server Protocol severity tiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Error,
    Warning,
    Information,
    Hint,
}

/// A stable identifier for the kind of problem a [`Diagnostic`] reports.
///
/// Lexical and syntax codes are produced by [`crate::parse`]; semantic codes by
/// [`crate::analyze`]; evaluation codes are raised by the evaluator at run time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiagnosticCode {
    // Lexical
    InvalidCharacter,
    UnterminatedString,
    UnterminatedDelimitedIdentifier,
    InvalidEscape,
    // Syntax
    InvalidOperator,
    UnclosedParenthesis,
    UnclosedBracket,
    UnclosedBrace,
    UnexpectedToken,
    ExpectedExpression,
    ExpectedIdentifier,
    ExpectedTypeSpecifier,
    MissingArguments,
    RecursionLimitReached,
    /// Emitted once, in place of further per-error diagnostics, when a parse
    /// hits its `max_errors` cap (§4.2, §4.5).
    MultipleErrors,
    // Semantic (analyzer)
    UnknownFunction,
    WrongArity,
    TypeMismatch,
    UndefinedVariable,
    UnknownType,
    AmbiguousNavigation,
    // Evaluation (runtime)
    DivideByZero,
    InvalidConversion,
    SingletonExpected,
    NotFatalEmptyResult,
    // Internal
    Internal,
}

impl DiagnosticCode {
    /// The default severity a diagnostic of this code is reported at.
    pub fn default_severity(self) -> Severity {
        use DiagnosticCode::*;
        match self {
            NotFatalEmptyResult => Severity::Information,
            AmbiguousNavigation => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// A secondary location attached to a diagnostic, e.g. "function defined with 2 parameters here".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelatedInformation {
    pub message: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// One problem found in a FHIRPath expression, with enough position information to
/// point back at the offending span of source text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub related: Vec<RelatedInformation>,
}

impl Diagnostic {
    pub fn new(code: DiagnosticCode, message: impl Into<String>, start_offset: usize, end_offset: usize) -> Self {
        Self {
            severity: code.default_severity(),
            code,
            message: message.into(),
            start_offset,
            end_offset,
            related: Vec::new(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_related(mut self, related: RelatedInformation) -> Self {
        self.related.push(related);
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Error
    }

    // Stable factory methods (§4.2) so every call site that raises a given
    // kind of problem phrases it identically.

    pub fn unclosed_parenthesis(open_offset: usize, at_offset: usize) -> Self {
        Self::new(
            DiagnosticCode::UnclosedParenthesis,
            "unclosed parenthesis: expected ')'",
            at_offset,
            at_offset,
        )
        .with_related(RelatedInformation {
            message: "matching '(' opened here".into(),
            start_offset: open_offset,
            end_offset: open_offset + 1,
        })
    }

    pub fn unclosed_bracket(open_offset: usize, at_offset: usize) -> Self {
        Self::new(
            DiagnosticCode::UnclosedBracket,
            "unclosed bracket: expected ']'",
            at_offset,
            at_offset,
        )
        .with_related(RelatedInformation {
            message: "matching '[' opened here".into(),
            start_offset: open_offset,
            end_offset: open_offset + 1,
        })
    }

    pub fn unclosed_brace(open_offset: usize, at_offset: usize) -> Self {
        Self::new(
            DiagnosticCode::UnclosedBrace,
            "unclosed brace: expected '}'",
            at_offset,
            at_offset,
        )
        .with_related(RelatedInformation {
            message: "matching '{' opened here".into(),
            start_offset: open_offset,
            end_offset: open_offset + 1,
        })
    }

    pub fn invalid_operator(message: impl Into<String>, start: usize, end: usize) -> Self {
        Self::new(DiagnosticCode::InvalidOperator, message, start, end)
    }

    pub fn expected_identifier(start: usize, end: usize) -> Self {
        Self::new(DiagnosticCode::ExpectedIdentifier, "expected an identifier", start, end)
    }

    pub fn expected_expression(start: usize, end: usize) -> Self {
        Self::new(DiagnosticCode::ExpectedExpression, "expected an expression", start, end)
    }

    pub fn unexpected_token(message: impl Into<String>, start: usize, end: usize) -> Self {
        Self::new(DiagnosticCode::UnexpectedToken, message, start, end)
    }

    pub fn missing_arguments(message: impl Into<String>, start: usize, end: usize) -> Self {
        Self::new(DiagnosticCode::MissingArguments, message, start, end)
    }

    pub fn unterminated_string(start: usize, end: usize) -> Self {
        Self::new(DiagnosticCode::UnterminatedString, "unterminated string literal", start, end)
    }

    pub fn invalid_escape(start: usize, end: usize) -> Self {
        Self::new(DiagnosticCode::InvalidEscape, "invalid escape sequence", start, end)
    }

    pub fn unknown_function(name: &str, start: usize, end: usize) -> Self {
        Self::new(DiagnosticCode::UnknownFunction, format!("unknown function '{name}'"), start, end)
    }

    pub fn wrong_arity(name: &str, expected: &str, actual: usize, start: usize, end: usize) -> Self {
        Self::new(
            DiagnosticCode::WrongArity,
            format!("'{name}' expects {expected} argument(s), found {actual}"),
            start,
            end,
        )
    }

    pub fn type_mismatch(message: impl Into<String>, start: usize, end: usize) -> Self {
        Self::new(DiagnosticCode::TypeMismatch, message, start, end)
    }

    pub fn undefined_variable(name: &str, start: usize, end: usize) -> Self {
        Self::new(DiagnosticCode::UndefinedVariable, format!("undefined variable '{name}'"), start, end)
    }

    pub fn unknown_type(name: &str, start: usize, end: usize) -> Self {
        Self::new(DiagnosticCode::UnknownType, format!("unknown type '{name}'"), start, end)
    }

    pub fn ambiguous_navigation(name: &str, start: usize, end: usize) -> Self {
        Self::new(
            DiagnosticCode::AmbiguousNavigation,
            format!("'{name}' resolves to more than one type here"),
            start,
            end,
        )
    }

    pub fn multiple_errors(count: usize, start: usize, end: usize) -> Self {
        Self::new(
            DiagnosticCode::MultipleErrors,
            format!("{count} additional errors were suppressed after reaching the error limit"),
            start,
            end,
        )
        .with_severity(Severity::Warning)
    }

    /// Render this diagnostic against `source` as an annotated multi-line report.
    pub fn report(&self, source: &str) -> String {
        use ariadne::ColorGenerator;
        use ariadne::Label;
        use ariadne::Report;
        use ariadne::ReportKind;
        use ariadne::Source;

        let kind = match self.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
            Severity::Information | Severity::Hint => ReportKind::Advice,
        };
        let mut colors = ColorGenerator::new();
        let color = colors.next();

        let start = self.start_offset.min(source.len());
        let end = self.end_offset.max(start).min(source.len());

        let mut builder = Report::build(kind, (), start)
            .with_message(&self.message)
            .with_label(
                Label::new(start..end)
                    .with_message(&self.message)
                    .with_color(color),
            );
        for related in &self.related {
            builder = builder.with_label(
                Label::new(related.start_offset..related.end_offset).with_message(&related.message),
            );
        }

        let mut buf = Vec::new();
        let _ = builder.finish().write(Source::from(source), &mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} [{:?}] {}..{}: {}",
            self.severity, self.code, self.start_offset, self.end_offset, self.message
        )
    }
}

/// Accumulates diagnostics during a single pass (lexing, parsing, analysis, or evaluation).
///
/// Append-only; deduplicates diagnostics that share `(code, range.start)`, and
/// optionally caps the number of errors it will hold, folding anything past
/// the cap into a single [`Diagnostic::multiple_errors`] summary (§4.2).
#[derive(Debug, Default, Clone)]
pub struct DiagnosticCollector {
    diagnostics: Vec<Diagnostic>,
    max_errors: Option<usize>,
    suppressed: usize,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_errors(max_errors: Option<usize>) -> Self {
        Self { max_errors, ..Self::default() }
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        if self
            .diagnostics
            .iter()
            .any(|d| d.code == diagnostic.code && d.start_offset == diagnostic.start_offset)
        {
            return;
        }
        if let Some(max) = self.max_errors {
            let error_count = self.diagnostics.iter().filter(|d| d.is_fatal()).count();
            if diagnostic.is_fatal() && error_count >= max {
                self.suppressed += 1;
                return;
            }
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_fatal)
    }

    pub fn into_vec(mut self) -> Vec<Diagnostic> {
        if self.suppressed > 0 {
            let at = self.diagnostics.last().map(|d| d.end_offset).unwrap_or(0);
            self.diagnostics
                .push(Diagnostic::multiple_errors(self.suppressed, at, at));
        }
        self.diagnostics
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_fatal())
    }
}
