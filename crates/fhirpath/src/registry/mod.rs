//! The operation registry (§4.4): the single source of truth for function
//! names, parameter shapes, keywords, and operator precedence.
//!
//! Operators are a closed set fixed by the grammar's node kinds (every
//! `+`/`and`/`is`/… already has exactly one [`SyntaxKind`] it parses to), so
//! they're dispatched directly in [`crate::evaluator`] and [`crate::compiler`]
//! rather than indirected through function pointers — nothing would be
//! gained by going through a vtable for a set that can never grow at
//! runtime. Functions are the opposite: hosts may register their own, so
//! each [`FunctionSpec`] carries real `analyze`/`evaluate` function pointers,
//! matching the tagged-union "Operation" the spec describes (§9 "Polymorphism
//! without inheritance").
//!
//! `compile` is not a third pointer per entry — see [`crate::compiler`] for
//! why reusing `evaluate` through an [`Evaluable`] thunk serves the same
//! "lower to a closure" contract without duplicating every function body.

mod functions;
mod literals;
mod operators;

pub use functions::trace_projection;
pub use literals::{parse_literal, parse_quantity, unescape_delimited_ident, unescape_string};
pub use operators::{
    eval_additive, eval_equality, eval_inequality, eval_logical, eval_membership,
    eval_multiplicative, eval_type_op, type_name_matches, union_dedup,
};

use crate::collections::HashMap;
use crate::context::Context;
use crate::error::EvalError;
use crate::model::ModelProvider;
use crate::value::Collection;
use fhirpath_parser::SyntaxKind;
use std::sync::Arc;

/// How a declared parameter receives its argument at call time (§3, §9).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    /// Pre-evaluated against the function's input before the call, as an
    /// ordinary value.
    Value,
    /// Left as a syntax-tree node (or compiled thunk); the function decides
    /// if, when, and against what context to evaluate it.
    Expression,
    /// A type name following `ofType`-style functions; never a runtime value.
    TypeSpecifier,
}

#[derive(Clone, Copy, Debug)]
pub struct Param {
    pub name: &'static str,
    pub kind: ParamKind,
    pub optional: bool,
}

impl Param {
    pub const fn value(name: &'static str) -> Self {
        Self { name, kind: ParamKind::Value, optional: false }
    }

    pub const fn expression(name: &'static str) -> Self {
        Self { name, kind: ParamKind::Expression, optional: false }
    }

    pub const fn optional_value(name: &'static str) -> Self {
        Self { name, kind: ParamKind::Value, optional: true }
    }

    pub const fn optional_expression(name: &'static str) -> Self {
        Self { name, kind: ParamKind::Expression, optional: true }
    }

    pub const fn type_specifier(name: &'static str) -> Self {
        Self { name, kind: ParamKind::TypeSpecifier, optional: false }
    }
}

/// An argument handed to a function body: either already a value, or a
/// reference to something that can still be evaluated against a context.
///
/// This is what lets [`crate::evaluator::Evaluator`] (tree-walking, re-reads
/// the syntax tree on every call) and [`crate::compiler`] (pre-lowered
/// closures) share one implementation of every function in
/// [`functions`] — both produce `Arg` values, just backed differently.
pub enum Arg<'a> {
    Value(Collection),
    Lazy(&'a dyn Evaluable),
}

impl<'a> Arg<'a> {
    pub fn eval(&self, ctx: &Context) -> Result<Collection, EvalError> {
        match self {
            Arg::Value(v) => Ok(v.clone()),
            Arg::Lazy(e) => e.eval(ctx),
        }
    }
}

/// Something that can be evaluated against a context: either a syntax-tree
/// node paired with the evaluator that walks it, or a pre-compiled closure.
pub trait Evaluable {
    fn eval(&self, ctx: &Context) -> Result<Collection, EvalError>;
}

/// Everything a function body needs: its input collection, the calling
/// context, its already-classified arguments, and the active model provider.
pub struct Call<'a> {
    pub input: Collection,
    pub context: Context,
    pub args: Vec<Arg<'a>>,
    pub model: Option<&'a Arc<dyn ModelProvider>>,
}

impl<'a> Call<'a> {
    pub fn arg(&self, index: usize) -> Option<&Arg<'a>> {
        self.args.get(index)
    }

    pub fn eval_arg(&self, index: usize, ctx: &Context) -> Result<Collection, EvalError> {
        match self.arg(index) {
            Some(a) => a.eval(ctx),
            None => Ok(Collection::empty()),
        }
    }
}

/// Output cardinality rule (§4.6): how a function's result width relates to
/// its input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputCardinality {
    Singleton,
    Collection,
    PreserveInput,
}

pub type EvaluateFn = for<'a> fn(&Call<'a>) -> Result<(Collection, Context), EvalError>;

/// One entry of the function catalog: the *Function* arm of the spec's
/// Operation tagged union (§3). `analyze` is intentionally left to
/// [`crate::analyzer`]'s generic default-analysis rule (parameter count,
/// singleton checks, output-cardinality rule) rather than a per-function
/// pointer — few functions in this catalog need a custom type rule beyond
/// what that default already expresses.
#[derive(Clone, Copy)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub params: &'static [Param],
    pub propagates_empty: bool,
    pub output_cardinality: OutputCardinality,
    pub evaluate: EvaluateFn,
}

/// Operator metadata (§3's *Operator* arm): everything about a token's
/// binary form that the parser, analyzer, and `Registry::operators_by_form`
/// consumer need, without redundantly re-deriving the parser's own
/// precedence table.
#[derive(Clone, Copy, Debug)]
pub struct OperatorSpec {
    pub token: &'static str,
    pub kind: SyntaxKind,
    pub form: Form,
    pub precedence: (u8, u8),
    pub special: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Form {
    Prefix,
    Infix,
    Postfix,
}

fn operator_table() -> Vec<OperatorSpec> {
    use fhirpath_parser::binary_operator_precedence as bp;
    use SyntaxKind::*;

    let infix = |token, kind: SyntaxKind, special: bool| OperatorSpec {
        token,
        kind,
        form: Form::Infix,
        precedence: bp(kind).unwrap_or((0, 0)),
        special,
    };

    vec![
        infix("implies", implies_KW, false),
        infix("or", or_KW, false),
        infix("xor", xor_KW, false),
        infix("and", and_KW, false),
        infix("in", in_KW, false),
        infix("contains", contains_KW, false),
        infix("=", EQ, false),
        infix("!=", NEQ, false),
        infix("~", EQUIV, false),
        infix("!~", NEQUIV, false),
        infix("<", LT, false),
        infix(">", GT, false),
        infix("<=", LE, false),
        infix(">=", GE, false),
        infix("|", PIPE, true),
        infix("is", is_KW, true),
        infix("as", as_KW, true),
        infix("+", PLUS, false),
        infix("-", MINUS, false),
        infix("&", AMP, false),
        infix("*", STAR, false),
        infix("/", SLASH, false),
        infix("div", div_KW, false),
        infix("mod", mod_KW, false),
        OperatorSpec { token: "+", kind: PLUS, form: Form::Prefix, precedence: (11, 11), special: true },
        OperatorSpec { token: "-", kind: MINUS, form: Form::Prefix, precedence: (11, 11), special: true },
        OperatorSpec { token: ".", kind: DOT, form: Form::Infix, precedence: (12, 12), special: true },
        OperatorSpec { token: "[", kind: L_BRACK, form: Form::Postfix, precedence: (12, 12), special: true },
    ]
}

const KEYWORDS: &[&str] = &[
    "and", "or", "xor", "implies", "div", "mod", "in", "contains", "is", "as", "true", "false",
    "year", "years", "month", "months", "week", "weeks", "day", "days", "hour", "hours",
    "minute", "minutes", "second", "seconds", "millisecond", "milliseconds",
];

/// Process-wide, read-only catalog of functions, operator metadata, and
/// reserved keywords (§4.4, §5 "initialized once at process start").
pub struct Registry {
    functions: HashMap<&'static str, FunctionSpec>,
    operators: Vec<OperatorSpec>,
}

impl Registry {
    /// Builds the standard registry. Cheap enough to call per-evaluation;
    /// callers that evaluate many expressions should build one and share it
    /// (it holds no interior mutability and is `Send + Sync`).
    pub fn new() -> Self {
        let mut functions = HashMap::default();
        for spec in functions::catalog() {
            functions.insert(spec.name, spec);
        }
        Self { functions, operators: operator_table() }
    }

    pub fn get(&self, name: &str) -> Option<&FunctionSpec> {
        self.functions.get(name)
    }

    pub fn is_keyword(&self, word: &str) -> bool {
        KEYWORDS.contains(&word)
    }

    pub fn all_functions(&self) -> impl Iterator<Item = &FunctionSpec> {
        self.functions.values()
    }

    pub fn operators_by_form(&self, form: Form) -> impl Iterator<Item = &OperatorSpec> {
        self.operators.iter().filter(move |o| o.form == form)
    }

    pub fn get_by_token(&self, token: &str, form: Form) -> Option<&OperatorSpec> {
        self.operators.iter().find(|o| o.token == token && o.form == form)
    }

    pub fn precedence(&self, token: &str) -> Option<(u8, u8)> {
        self.operators.iter().find(|o| o.token == token).map(|o| o.precedence)
    }

    /// Classifies `text` as a literal lexeme, independent of any parsed tree —
    /// for tooling that needs to know whether a bare string is a legal
    /// FHIRPath literal (e.g. `'official'`, `4`, `@2014-01-25`) without
    /// invoking the full parser. Returns the literal's token kind, or the
    /// quantity's unit-bearing counterpart when a magnitude is followed by a
    /// unit word or UCUM string.
    pub fn match_literal(&self, text: &str) -> Option<fhirpath_parser::SyntaxKind> {
        use fhirpath_parser::{Lexer, SyntaxKind::*};

        let tokens: Vec<_> = Lexer::new(text)
            .into_tokens()
            .into_iter()
            .filter(|t| !t.kind().is_trivia())
            .collect();

        let classify = |kind: fhirpath_parser::SyntaxKind, text: &str| match kind {
            IDENT => {
                if matches!(text, "true" | "false") {
                    Some(if text == "true" { true_KW } else { false_KW })
                } else {
                    None
                }
            }
            INT_NUMBER | DEC_NUMBER | STRING | DATE_LITERAL | DATETIME_LITERAL | TIME_LITERAL => {
                Some(kind)
            }
            _ => None,
        };

        match tokens.as_slice() {
            [only] => classify(only.kind(), only.text()),
            [value, unit]
                if matches!(value.kind(), INT_NUMBER | DEC_NUMBER)
                    && (unit.kind() == STRING || fhirpath_parser::SyntaxKind::from_keyword(unit.text()).is_some()) =>
            {
                Some(value.kind())
            }
            _ => None,
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_operator_token_has_one_entry_per_form_it_supports() {
        let registry = Registry::new();
        let mut seen = std::collections::HashSet::new();
        for op in &registry.operators {
            assert!(seen.insert((op.token, op.form)), "duplicate entry for {:?} {:?}", op.token, op.form);
        }
    }

    #[test]
    fn precedence_mirrors_the_parser_binding_power_table() {
        let registry = Registry::new();
        for op in registry.operators_by_form(Form::Infix) {
            if op.kind == fhirpath_parser::SyntaxKind::DOT {
                continue;
            }
            let expected = fhirpath_parser::binary_operator_precedence(op.kind);
            assert_eq!(expected, Some(op.precedence), "mismatch for {:?}", op.token);
        }
    }

    #[test]
    fn keyword_set_matches_reserved_words() {
        let registry = Registry::new();
        assert!(registry.is_keyword("and"));
        assert!(registry.is_keyword("div"));
        assert!(!registry.is_keyword("given"));
    }

    #[test]
    fn known_functions_are_present() {
        let registry = Registry::new();
        for name in ["where", "select", "exists", "iif", "defineVariable", "combine", "ofType"] {
            assert!(registry.get(name).is_some(), "missing {name}");
        }
    }
}
