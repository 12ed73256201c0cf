#![doc = include_str!("../README.md")]

pub mod analyzer;
mod collections;
pub mod compiler;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod evaluator;
pub mod model;
pub mod registry;
pub mod source_map;
pub mod value;

use std::sync::Arc;
use std::sync::OnceLock;

pub use fhirpath_parser::cst::CstNode;
pub use fhirpath_parser::cst::Expr;
use fhirpath_parser::cst::SourceFile;
pub use fhirpath_parser::ParseMode;
use fhirpath_parser::Parser;
pub use fhirpath_parser::SyntaxKind;
pub use fhirpath_parser::SyntaxNode;
pub use fhirpath_parser::SyntaxNodePtr;

pub use compiler::compile as compile_lowered;
pub use compiler::Program;
pub use context::Context;
pub use diagnostics::Diagnostic;
pub use diagnostics::DiagnosticCode;
pub use diagnostics::DiagnosticCollector;
pub use diagnostics::Severity;
pub use error::EvalError;
pub use evaluator::Evaluator;
pub use evaluator::TraceSink;
pub use model::DynamicModelProvider;
pub use model::ModelProvider;
pub use model::TypeInfo;
pub use model::TypeRef;
pub use registry::Registry;
pub use value::Collection;
pub use value::FhirObject;
pub use value::Quantity;
pub use value::Value;

/// The shared [`Registry`] used by [`analyze`], [`evaluate`], and [`compile`]
/// when the caller doesn't build one of their own. Built once per process —
/// its contents are a pure function of the language, not of any input.
pub fn default_registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Registry::new)
}

/// Options for [`parse`] (§6).
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    pub mode: ParseMode,
    /// Cap on the number of fatal diagnostics collected; anything past it is
    /// folded into one [`Diagnostic::multiple_errors`] summary.
    pub max_errors: Option<usize>,
    /// Return `Err` on the first fatal diagnostic instead of collecting.
    pub throw_on_error: bool,
    /// Compute [`ParseOutcome::ranges`], a line/column span for every node.
    pub track_ranges: bool,
}

/// A span for every node in a parsed tree, keyed by node identity.
pub type NodeRanges =
    crate::collections::HashMap<SyntaxNodePtr, (source_map::Position, source_map::Position)>;

/// The result of [`parse`].
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    /// The untyped syntax tree, or `None` in [`ParseMode::Validate`].
    pub ast: Option<SyntaxNode>,
    pub diagnostics: Vec<Diagnostic>,
    pub has_errors: bool,
    /// `Some` only in [`ParseMode::Diagnostic`]: whether the tree contains
    /// an `ERROR_NODE`/`INCOMPLETE_NODE` anywhere.
    pub is_partial: Option<bool>,
    /// `Some` only in [`ParseMode::Validate`].
    pub valid: Option<bool>,
    pub ranges: Option<NodeRanges>,
}

impl ParseOutcome {
    /// The top-level expression, if this outcome carries an [`ast`](Self::ast).
    pub fn expr(&self) -> Option<Expr> {
        SourceFile::cast(self.ast.clone()?)?.expr()
    }
}

/// Raised by [`parse`] when `options.throw_on_error` is set and parsing hits
/// a fatal diagnostic, and by [`parse_for_evaluation`], which always throws.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ParseFailure {
    pub message: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl ParseFailure {
    fn new(diagnostics: Vec<Diagnostic>) -> Self {
        let message = diagnostics
            .first()
            .map(|d| d.message.clone())
            .unwrap_or_else(|| "parsing failed with no further detail".to_string());
        Self { message, diagnostics }
    }
}

/// Parse `source` into a syntax tree (§4.5, §6).
///
/// ```rust
/// use fhirpath::{parse, ParseOptions};
///
/// let outcome = parse("Patient.name.given", ParseOptions::default()).unwrap();
/// assert!(!outcome.has_errors);
/// assert!(outcome.expr().is_some());
/// ```
pub fn parse(source: &str, options: ParseOptions) -> Result<ParseOutcome, ParseFailure> {
    let tree = Parser::new(source).with_mode(options.mode).parse();
    let has_errors = !tree.is_ok();

    let raw_diagnostics = tree.errors().map(diagnostic_from_parse_error);
    let mut collector = DiagnosticCollector::with_max_errors(options.max_errors);
    for diagnostic in raw_diagnostics {
        collector.push(diagnostic);
    }
    let diagnostics = collector.into_vec();

    if options.mode == ParseMode::Validate {
        let valid = !has_errors;
        if options.throw_on_error && !valid {
            return Err(ParseFailure::new(diagnostics));
        }
        return Ok(ParseOutcome {
            ast: None,
            diagnostics,
            has_errors,
            is_partial: None,
            valid: Some(valid),
            ranges: None,
        });
    }

    if options.throw_on_error && has_errors {
        return Err(ParseFailure::new(diagnostics));
    }

    let syntax = tree.syntax();
    let is_partial = (options.mode == ParseMode::Diagnostic).then(|| {
        syntax
            .descendants()
            .any(|n| matches!(n.kind(), SyntaxKind::ERROR_NODE | SyntaxKind::INCOMPLETE_NODE))
    });
    let ranges = options.track_ranges.then(|| build_ranges(source, &syntax));

    Ok(ParseOutcome {
        ast: Some(syntax),
        diagnostics,
        has_errors,
        is_partial,
        valid: None,
        ranges,
    })
}

/// Parse `source`, throwing on the first fatal diagnostic, and return its
/// top-level expression directly — the convenience entry point for
/// [`evaluate`] and [`compile`] (§6).
pub fn parse_for_evaluation(source: &str) -> Result<Expr, ParseFailure> {
    let options = ParseOptions { mode: ParseMode::Fast, throw_on_error: true, ..ParseOptions::default() };
    let outcome = parse(source, options)?;
    outcome
        .expr()
        .ok_or_else(|| ParseFailure::new(vec![Diagnostic::expected_expression(0, source.len())]))
}

/// Maps a low-level `fhirpath_parser::Error` onto a stable [`DiagnosticCode`].
///
/// Unclosed `(`/`[`/`{` carry the offset of their matching opener (see
/// `fhirpath_parser::Error::unclosed`), so those go through the dedicated
/// factories in [`diagnostics`] that attach related-information pointing back
/// at the opener instead of the generic fallback below.
fn diagnostic_from_parse_error(err: &fhirpath_parser::Error) -> Diagnostic {
    let start = err.index();
    let end = start + err.data().len();
    let message = err.message();

    if err.is_limit() {
        return Diagnostic::new(DiagnosticCode::RecursionLimitReached, message, start, start);
    }

    if let Some(open) = err.open_delim() {
        return if message.contains("R_PAREN") {
            Diagnostic::unclosed_parenthesis(open, start)
        } else if message.contains("R_BRACK") {
            Diagnostic::unclosed_bracket(open, start)
        } else {
            Diagnostic::unclosed_brace(open, start)
        };
    }

    let code = match message {
        "expected a member name after '.'" => DiagnosticCode::ExpectedIdentifier,
        "expected an expression" => DiagnosticCode::ExpectedExpression,
        "expected a type specifier" | "expected a type name after '.'" => DiagnosticCode::ExpectedTypeSpecifier,
        _ if message.contains("Invalid '..'") => DiagnosticCode::InvalidOperator,
        _ if message.starts_with("trailing comma") || message.starts_with("empty index expression") => {
            DiagnosticCode::MissingArguments
        }
        _ => DiagnosticCode::UnexpectedToken,
    };
    Diagnostic::new(code, message, start, end)
}

fn build_ranges(source: &str, syntax: &SyntaxNode) -> NodeRanges {
    let source_map = source_map::SourceMap::new(source);
    syntax
        .descendants()
        .map(|node| {
            let range = node.text_range();
            let start: u32 = range.start().into();
            let end: u32 = range.end().into();
            let positions = source_map.range_to_positions(source_map::Range::new(start as usize, end as usize));
            (SyntaxNodePtr::new(&node), positions)
        })
        .collect()
}

/// Whether the analyzer treats a warning-level finding as fatal (§6, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnalyzeMode {
    #[default]
    Lenient,
    Strict,
}

/// Options for [`analyze`].
#[derive(Default)]
pub struct AnalyzeOptions {
    pub mode: AnalyzeMode,
    /// The type the expression is evaluated against; `Any`, a singleton, if
    /// omitted.
    pub input_type: Option<TypeInfo>,
}

/// The result of [`analyze`]: the unchanged `ast` (rowan's tree has no
/// in-place node annotation), the diagnostics raised while checking it, and
/// the inferred type of the expression as a whole.
pub struct AnalyzeOutcome {
    pub ast: Expr,
    pub diagnostics: Vec<Diagnostic>,
    pub result_type: Option<TypeRef>,
    pub result_is_singleton: Option<bool>,
}

/// Type-check `ast` against `model_provider` (§4.6, §6).
///
/// `Strict` mode elevates every warning-severity diagnostic (currently just
/// [`DiagnosticCode::AmbiguousNavigation`]) to an error; `Lenient` reports it
/// as advisory only.
pub fn analyze(ast: Expr, model_provider: &Arc<dyn ModelProvider>, options: AnalyzeOptions) -> AnalyzeOutcome {
    let analyzer = analyzer::TypeAnalyzer::new(default_registry(), model_provider);
    let root_type = options.input_type.unwrap_or_else(TypeInfo::any);

    let mut collector = DiagnosticCollector::new();
    let result_type = analyzer.analyze(&ast, &root_type, &mut collector);
    let mut diagnostics = collector.into_vec();
    if options.mode == AnalyzeMode::Strict {
        for diagnostic in &mut diagnostics {
            if diagnostic.severity == Severity::Warning {
                diagnostic.severity = Severity::Error;
            }
        }
    }

    AnalyzeOutcome {
        ast,
        diagnostics,
        result_type: Some(result_type.ty),
        result_is_singleton: Some(result_type.is_singleton),
    }
}

/// Bindings threaded into the root [`Context`] by [`evaluate`]. The runtime
/// has one variable namespace for both `%externalConstants` and user-defined
/// `%variables` (`Context::get_variable` doesn't distinguish them), so these
/// two option fields are merged before evaluation — `variables` wins on a
/// name collision, since it's the more specific of the two.
#[derive(Default)]
pub struct EvaluateOptions {
    pub variables: Vec<(String, Collection)>,
    pub env: Vec<(String, Collection)>,
    pub model_provider: Option<Arc<dyn ModelProvider>>,
}

/// Raised by [`evaluate`]: either the source failed to parse, or evaluation
/// itself hit a fatal [`EvalError`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum EvaluateError {
    #[error(transparent)]
    Parse(#[from] ParseFailure),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// Parse and evaluate `source` against `input` (§6).
///
/// ```rust
/// use fhirpath::{evaluate, Collection, EvaluateOptions, FhirObject, Value};
/// use std::sync::Arc;
///
/// let name = |use_: &str, given: &str| {
///     Value::Object(Arc::new(
///         FhirObject::new(Some("HumanName"))
///             .with_field("use", Collection::singleton(Value::from(use_)))
///             .with_field("given", Collection::singleton(Value::from(given))),
///     ))
/// };
///
/// let patient = Value::Object(Arc::new(FhirObject::new(Some("Patient")).with_field(
///     "name",
///     Collection::collection([name("official", "Peter"), name("nickname", "Jim")]),
/// )));
///
/// let result = evaluate(
///     "name.where(use = 'official').given",
///     Collection::singleton(patient),
///     EvaluateOptions::default(),
/// )
/// .unwrap();
///
/// assert_eq!(result, Collection::singleton(Value::from("Peter")));
/// ```
pub fn evaluate(source: &str, input: Collection, options: EvaluateOptions) -> Result<Collection, EvaluateError> {
    let ast = parse_for_evaluation(source)?;
    evaluate_ast(&ast, input, options).map_err(EvaluateError::from)
}

/// Like [`evaluate`] but against an already-parsed expression, skipping the
/// parse step when the caller is evaluating the same expression repeatedly.
pub fn evaluate_ast(ast: &Expr, input: Collection, options: EvaluateOptions) -> Result<Collection, EvalError> {
    let mut ctx = Context::root(input);
    for (name, value) in options.env {
        ctx = ctx.set_variable(&name, value, true);
    }
    for (name, value) in options.variables {
        ctx = ctx.set_variable(&name, value, true);
    }
    Evaluator::new(options.model_provider).eval(ast, &ctx)
}

/// Lower `ast` into a reusable [`Program`] against the shared
/// [`default_registry`] (§4.9, §6). Call once per distinct expression text;
/// `program.eval(&ctx)`/`program.execute(input, env)` run it as many times
/// as the caller likes.
pub fn compile(ast: &Expr, model_provider: Option<Arc<dyn ModelProvider>>) -> Result<Program, EvalError> {
    compiler::compile(ast, default_registry(), model_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reports_no_errors_for_a_well_formed_expression() {
        let outcome = parse("Patient.name.where(use = 'official').given", ParseOptions::default()).unwrap();
        assert!(!outcome.has_errors);
        assert!(outcome.expr().is_some());
    }

    #[test]
    fn parse_collects_errors_in_standard_mode_instead_of_throwing() {
        let outcome = parse("Patient..name", ParseOptions::default()).unwrap();
        assert!(outcome.has_errors);
        assert_eq!(outcome.diagnostics[0].code, DiagnosticCode::InvalidOperator);
    }

    #[test]
    fn parse_throws_when_requested() {
        let err = parse("Patient..name", ParseOptions { throw_on_error: true, ..ParseOptions::default() })
            .unwrap_err();
        assert!(!err.diagnostics.is_empty());
    }

    #[test]
    fn validate_mode_reports_validity_without_an_ast() {
        let outcome = parse("(", ParseOptions { mode: ParseMode::Validate, ..ParseOptions::default() }).unwrap();
        assert_eq!(outcome.valid, Some(false));
        assert!(outcome.ast.is_none());
    }

    #[test]
    fn track_ranges_locates_every_node() {
        let outcome =
            parse("1 + 2", ParseOptions { track_ranges: true, ..ParseOptions::default() }).unwrap();
        let ranges = outcome.ranges.unwrap();
        assert!(!ranges.is_empty());
    }

    #[test]
    fn evaluate_navigates_filters_and_projects() {
        let name = |use_: &str, given: &str| {
            Value::Object(Arc::new(
                FhirObject::new(Some("HumanName"))
                    .with_field("use", Collection::singleton(Value::from(use_)))
                    .with_field("given", Collection::singleton(Value::from(given))),
            ))
        };
        let patient = Value::Object(Arc::new(FhirObject::new(Some("Patient")).with_field(
            "name",
            Collection::collection([name("official", "Peter"), name("nickname", "Jim")]),
        )));

        let result = evaluate(
            "name.where(use = 'official').given",
            Collection::singleton(patient),
            EvaluateOptions::default(),
        )
        .unwrap();

        assert_eq!(result, Collection::singleton(Value::from("Peter")));
    }

    #[test]
    fn evaluate_binds_variables_into_the_root_context() {
        let result = evaluate(
            "%threshold + 1",
            Collection::empty(),
            EvaluateOptions {
                variables: vec![("threshold".to_string(), Collection::singleton(Value::from(4i64)))],
                ..EvaluateOptions::default()
            },
        )
        .unwrap();

        assert_eq!(result, Collection::singleton(Value::from(5i64)));
    }

    #[test]
    fn analyze_infers_a_result_type() {
        let ast = parse_for_evaluation("3 + 4").unwrap();
        let model: Arc<dyn ModelProvider> = Arc::new(DynamicModelProvider::new());
        let outcome = analyze(ast, &model, AnalyzeOptions::default());
        assert_eq!(outcome.result_type.map(|t| t.as_str().to_string()), Some("Integer".to_string()));
    }

    #[test]
    fn compile_then_execute_matches_evaluate() {
        let ast = parse_for_evaluation("1 + 2").unwrap();
        let program = compile(&ast, None).unwrap();
        let result = program.execute(Collection::empty(), std::iter::empty()).unwrap();
        assert_eq!(result, Collection::singleton(Value::from(3i64)));
    }
}
