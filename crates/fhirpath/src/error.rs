//! The error taxonomy (§7): evaluation failures that are fatal and must
//! surface to the caller rather than collapse to an empty result.
//!
//! Most FHIRPath runtime problems — dividing by zero, navigating through a
//! missing property, comparing incompatible types — are defined by the
//! language to produce an empty collection, not an error. [`EvalError`]
//! covers only the handful of violations the spec calls out as fatal
//! (§4.8 Failure semantics, §7 EvaluationError).

use fhirpath_parser::SyntaxKind;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Error)]
pub enum EvalError {
    /// `single()` called on a collection with more than one item.
    #[error("single() expected at most one item, found {actual}")]
    SingletonViolation { actual: usize },
    /// A binary arithmetic operator other than `+`/`&` was given a
    /// non-numeric operand.
    #[error("operator '{operator}' requires numeric operands, found {found}")]
    NonNumericOperand { operator: &'static str, found: &'static str },
    /// `+`/`-` on a `Date`/`DateTime`/`Time` with an incompatible right-hand
    /// operand (anything but a calendar-duration `Quantity`).
    #[error("date/time arithmetic requires a calendar-duration quantity, found {found}")]
    InvalidDateArithmetic { found: &'static str },
    /// `is`/`as`/`ofType` given a type name the model provider can't resolve.
    #[error("unknown type '{name}'")]
    UnknownType { name: String },
    /// A function was called with the wrong number of arguments for any of
    /// its registered overloads.
    #[error("{function}() expects {expected} argument(s), found {actual}")]
    WrongArity { function: &'static str, expected: &'static str, actual: usize },
    /// An internal invariant was violated — a registry entry is missing, or
    /// a syntax-tree shape the parser should never produce reached the
    /// evaluator. Never expected in a conforming build (§7 InternalError).
    #[error("internal error: {0}")]
    Internal(String),
}

/// The name of a binary punctuation/keyword operator token, for error messages.
pub(crate) fn operator_name(kind: SyntaxKind) -> &'static str {
    use SyntaxKind::*;
    match kind {
        PLUS => "+",
        MINUS => "-",
        STAR => "*",
        SLASH => "/",
        AMP => "&",
        div_KW => "div",
        mod_KW => "mod",
        EQ => "=",
        NEQ => "!=",
        LT => "<",
        GT => ">",
        LE => "<=",
        GE => ">=",
        EQUIV => "~",
        NEQUIV => "!~",
        PIPE => "|",
        in_KW => "in",
        contains_KW => "contains",
        and_KW => "and",
        or_KW => "or",
        xor_KW => "xor",
        implies_KW => "implies",
        is_KW => "is",
        as_KW => "as",
        _ => "?",
    }
}
