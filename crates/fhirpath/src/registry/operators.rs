//! Binary operator semantics (§4.8). Operators are a closed, grammar-fixed
//! set — see the [`crate::registry`] module doc for why they're plain
//! functions here rather than indirected through the `Operation` vtable the
//! function catalog uses.

use crate::context::Context;
use crate::error::{operator_name, EvalError};
use crate::registry::Evaluable;
use crate::value::{Quantity, Value};
use crate::Collection;
use fhirpath_parser::SyntaxKind;
use rust_decimal::Decimal;
use std::cmp::Ordering;

/// `+ - &` (additive precedence). `+`/`-` are numeric; `+` on two `String`s
/// concatenates; `&` null-safely concatenates strings, treating either empty
/// operand as `""`. `+`/`-` on a `Date`/`DateTime`/`Time` expects a
/// calendar-duration `Quantity` on the right.
pub fn eval_additive(op: SyntaxKind, lhs: Collection, rhs: Collection) -> Result<Collection, EvalError> {
    if op == SyntaxKind::AMP {
        let a = lhs.as_singleton().map(|v| v.to_string()).unwrap_or_default();
        let b = rhs.as_singleton().map(|v| v.to_string()).unwrap_or_default();
        return Ok(Collection::singleton(Value::String(format!("{a}{b}").into())));
    }
    if lhs.is_empty() || rhs.is_empty() {
        return Ok(Collection::empty());
    }
    let (Some(a), Some(b)) = (lhs.as_singleton(), rhs.as_singleton()) else {
        return Ok(Collection::empty());
    };

    if op == SyntaxKind::PLUS {
        if let (Value::String(a), Value::String(b)) = (a, b) {
            return Ok(Collection::singleton(Value::String(format!("{a}{b}").into())));
        }
        if matches!(a, Value::Date(_) | Value::DateTime(_) | Value::Time(_)) {
            return add_duration(a, b, false);
        }
    }
    if op == SyntaxKind::MINUS && matches!(a, Value::Date(_) | Value::DateTime(_) | Value::Time(_)) {
        return add_duration(a, b, true);
    }

    let (Some(x), Some(y)) = (a.as_decimal(), b.as_decimal()) else {
        return Err(EvalError::NonNumericOperand {
            operator: operator_name(op),
            found: if a.as_decimal().is_none() { a.type_name() } else { b.type_name() },
        });
    };
    let result = if op == SyntaxKind::PLUS { x + y } else { x - y };
    Ok(Collection::singleton(numeric_result(result, a, b)))
}

/// `+`/`-` on a date/time operand: the right side must be a unitless UCUM
/// calendar-duration quantity. Only whole-unit precision shifts are modeled
/// (fractional durations would require a full calendar library); this covers
/// every case the grammar's bare calendar-word quantity literals produce.
fn add_duration(a: &Value, b: &Value, negate: bool) -> Result<Collection, EvalError> {
    let Value::Quantity(Quantity { value, unit }) = b else {
        return Err(EvalError::InvalidDateArithmetic { found: b.type_name() });
    };
    let mut n = value.to_string().parse::<i64>().unwrap_or(0);
    if negate {
        n = -n;
    }
    let unit = unit.as_deref().unwrap_or("1");
    match a {
        Value::Date(d) => {
            let shifted = shift_date(d.clone(), unit, n);
            Ok(Collection::singleton(Value::Date(shifted)))
        }
        Value::DateTime(dt) => {
            let mut dt = dt.clone();
            dt.date = shift_date(dt.date, unit, n);
            Ok(Collection::singleton(Value::DateTime(dt)))
        }
        Value::Time(_) => Err(EvalError::InvalidDateArithmetic { found: "Time arithmetic with sub-day units only" }),
        _ => unreachable!("caller already matched a date/time value"),
    }
}

fn shift_date(mut d: crate::value::DateValue, unit: &str, n: i64) -> crate::value::DateValue {
    match unit {
        "a" => d.year += n as i32,
        "mo" => {
            let total = d.year as i64 * 12 + (d.month as i64 - 1) + n;
            d.year = (total.div_euclid(12)) as i32;
            d.month = (total.rem_euclid(12) + 1) as u32;
        }
        _ => d.year += n as i32 / 365,
    }
    d
}

fn numeric_result(result: Decimal, a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Integer(_), Value::Integer(_)) => {
            result.to_string().parse::<i64>().map(Value::Integer).unwrap_or(Value::Decimal(result))
        }
        (Value::Quantity(q), _) | (_, Value::Quantity(q)) => Value::Quantity(Quantity::new(result, q.unit.clone())),
        _ => Value::Decimal(result),
    }
}

/// `* / div mod`. Division by zero (any form) yields empty, per spec;
/// `div`/`mod` require integer operands.
pub fn eval_multiplicative(op: SyntaxKind, lhs: Collection, rhs: Collection) -> Result<Collection, EvalError> {
    if lhs.is_empty() || rhs.is_empty() {
        return Ok(Collection::empty());
    }
    let (Some(a), Some(b)) = (lhs.as_singleton(), rhs.as_singleton()) else {
        return Ok(Collection::empty());
    };

    if matches!(op, SyntaxKind::div_KW | SyntaxKind::mod_KW) {
        let (Some(x), Some(y)) = (a.as_decimal(), b.as_decimal()) else {
            return Err(EvalError::NonNumericOperand { operator: operator_name(op), found: a.type_name() });
        };
        if y.is_zero() {
            return Ok(Collection::empty());
        }
        let result = if op == SyntaxKind::div_KW { (x / y).trunc() } else { x - (x / y).trunc() * y };
        return Ok(Collection::singleton(numeric_result(result, a, b)));
    }

    let (Some(x), Some(y)) = (a.as_decimal(), b.as_decimal()) else {
        return Err(EvalError::NonNumericOperand { operator: operator_name(op), found: a.type_name() });
    };
    if op == SyntaxKind::SLASH && y.is_zero() {
        return Ok(Collection::empty());
    }
    let result = if op == SyntaxKind::STAR { x * y } else { x / y };
    Ok(Collection::singleton(numeric_result(result, a, b)))
}

/// `= != ~ !~`. `=`/`!=` are undefined (empty) across incomparable
/// categories; `~`/`!~` are always definite.
pub fn eval_equality(op: SyntaxKind, lhs: Collection, rhs: Collection) -> Collection {
    let equivalence = matches!(op, SyntaxKind::EQUIV | SyntaxKind::NEQUIV);
    let negate = matches!(op, SyntaxKind::NEQ | SyntaxKind::NEQUIV);

    if !equivalence && (lhs.is_empty() || rhs.is_empty()) {
        return Collection::empty();
    }

    let eq = if equivalence {
        lhs.len() == rhs.len()
            && lhs.iter().zip(rhs.iter()).all(|(a, b)| a.fhir_equivalent(b))
    } else {
        if lhs.len() != rhs.len() {
            return Collection::singleton(Value::Boolean(negate));
        }
        match lhs.iter().zip(rhs.iter()).try_fold(true, |acc, (a, b)| a.fhir_equals(b).map(|e| acc && e)) {
            Some(eq) => eq,
            None => return Collection::empty(),
        }
    };
    Collection::singleton(Value::Boolean(eq != negate))
}

/// `< > <= >=`. Undefined (empty) when the singletons aren't ordered against
/// each other, or when either side isn't a singleton.
pub fn eval_inequality(op: SyntaxKind, lhs: Collection, rhs: Collection) -> Collection {
    if lhs.is_empty() || rhs.is_empty() {
        return Collection::empty();
    }
    let (Some(a), Some(b)) = (lhs.as_singleton(), rhs.as_singleton()) else {
        return Collection::empty();
    };
    let Some(ord) = a.fhir_cmp(b) else {
        return Collection::empty();
    };
    let result = match op {
        SyntaxKind::LT => ord == Ordering::Less,
        SyntaxKind::GT => ord == Ordering::Greater,
        SyntaxKind::LE => ord != Ordering::Greater,
        SyntaxKind::GE => ord != Ordering::Less,
        _ => unreachable!(),
    };
    Collection::singleton(Value::Boolean(result))
}

/// `in`/`contains`: membership of a singleton in a collection (`contains`
/// simply reverses operand order).
pub fn eval_membership(op: SyntaxKind, lhs: Collection, rhs: Collection) -> Collection {
    let (needle, haystack) = if op == SyntaxKind::in_KW { (lhs, rhs) } else { (rhs, lhs) };
    if needle.is_empty() {
        return Collection::empty();
    }
    let Some(item) = needle.as_singleton() else { return Collection::empty() };
    let found = haystack.iter().any(|v| v.fhir_equals(item) == Some(true));
    Collection::singleton(Value::Boolean(found))
}

/// Three-valued `and`/`or`/`xor`/`implies` (§3, §8.5), short-circuiting for
/// definite left operands without evaluating `rhs` at all.
pub fn eval_logical(
    kind: SyntaxKind,
    ctx: &Context,
    lhs: Collection,
    rhs: &dyn Evaluable,
) -> Result<Collection, EvalError> {
    let l = lhs.as_bool3();

    if kind == SyntaxKind::and_KW && l == Some(false) {
        return Ok(Collection::singleton(Value::Boolean(false)));
    }
    if kind == SyntaxKind::or_KW && l == Some(true) {
        return Ok(Collection::singleton(Value::Boolean(true)));
    }

    let rhs = rhs.eval(ctx)?;
    let r = rhs.as_bool3();

    let result = match kind {
        SyntaxKind::and_KW => match (l, r) {
            (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        SyntaxKind::or_KW => match (l, r) {
            (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
        SyntaxKind::xor_KW => match (l, r) {
            (Some(a), Some(b)) => Some(a != b),
            _ => None,
        },
        SyntaxKind::implies_KW => match l {
            Some(false) => Some(true),
            Some(true) => r,
            None => match r {
                Some(true) => Some(true),
                _ => None,
            },
        },
        _ => unreachable!("eval_logical called with a non-logical operator"),
    };
    Ok(match result {
        Some(b) => Collection::singleton(Value::Boolean(b)),
        None => Collection::empty(),
    })
}

/// `|`/`union()`: concatenate then drop duplicates under FHIRPath `=`
/// equality, keeping first-seen order.
pub fn union_dedup(collections: impl IntoIterator<Item = Collection>) -> Collection {
    let mut out: Vec<Value> = Vec::new();
    for c in collections {
        for v in c {
            if !out.iter().any(|existing| existing.fhir_equals(&v) == Some(true)) {
                out.push(v);
            }
        }
    }
    Collection::from_values(out)
}

/// `is`/`as`/`ofType`: whether `value`'s runtime type name matches `type_name`,
/// ignoring an optional namespace qualifier (`FHIR.string` vs `string`).
pub fn type_name_matches(value: &Value, type_name: &str) -> bool {
    let simple = type_name.rsplit('.').next().unwrap_or(type_name);
    value.type_name().eq_ignore_ascii_case(simple)
        || (simple.eq_ignore_ascii_case("Any"))
        || matches!(
            (value, simple.to_ascii_lowercase().as_str()),
            (Value::Integer(_), "integer")
                | (Value::Decimal(_), "decimal")
                | (Value::String(_), "string")
                | (Value::Boolean(_), "boolean")
                | (Value::Date(_), "date")
                | (Value::DateTime(_), "datetime")
                | (Value::Time(_), "time")
                | (Value::Quantity(_), "quantity")
        )
}

/// `is T` / `as T`, evaluated over the (at-most-singleton) input.
///
/// `is_cast` is true for `as T` (returns the input unchanged when it matches,
/// else empty) and false for `is T` (always returns a Boolean).
pub fn eval_type_op(is_cast: bool, input: Collection, type_name: &str) -> Result<Collection, EvalError> {
    if input.is_empty() {
        return Ok(Collection::empty());
    }
    let Some(value) = input.as_singleton() else {
        return if is_cast {
            Ok(Collection::empty())
        } else {
            Ok(Collection::singleton(Value::Boolean(false)))
        };
    };
    let matches = type_name_matches(value, type_name);
    if is_cast {
        if matches {
            Ok(Collection::singleton(value.clone()))
        } else {
            Ok(Collection::empty())
        }
    } else {
        Ok(Collection::singleton(Value::Boolean(matches)))
    }
}
