//! The function catalog: every entry's `evaluate` body, written against
//! [`Call`] so the same implementation serves both the tree-walking
//! evaluator and the compiler (see the [`crate::registry`] module doc).

use super::{Call, FunctionSpec, OutputCardinality, Param};
use crate::context::Context;
use crate::error::EvalError;
use crate::registry::operators;
use crate::value::Value;
use crate::Collection;

macro_rules! spec {
    ($name:literal, [$($param:expr),* $(,)?], $card:expr, $propagates:expr, $f:expr) => {
        FunctionSpec {
            name: $name,
            params: &[$($param),*],
            propagates_empty: $propagates,
            output_cardinality: $card,
            evaluate: $f,
        }
    };
}

pub fn catalog() -> Vec<FunctionSpec> {
    use OutputCardinality::*;
    vec![
        // Existence
        spec!("empty", [], Singleton, false, empty_fn),
        spec!("exists", [Param::optional_expression("criterion")], Singleton, false, exists_fn),
        spec!("all", [Param::expression("criterion")], Singleton, false, all_fn),
        spec!("allTrue", [], Singleton, false, all_true_fn),
        spec!("anyTrue", [], Singleton, false, any_true_fn),
        spec!("allFalse", [], Singleton, false, all_false_fn),
        spec!("anyFalse", [], Singleton, false, any_false_fn),
        spec!("count", [], Singleton, false, count_fn),
        spec!("isDistinct", [], Singleton, false, is_distinct_fn),
        spec!("distinct", [], Collection, false, distinct_fn),
        spec!("not", [], Singleton, true, not_fn),
        // Subsetting
        spec!("first", [], Singleton, false, first_fn),
        spec!("last", [], Singleton, false, last_fn),
        spec!("tail", [], Collection, false, tail_fn),
        spec!("skip", [Param::value("num")], Collection, false, skip_fn),
        spec!("take", [Param::value("num")], Collection, false, take_fn),
        spec!("single", [], Singleton, false, single_fn),
        // Filtering / projection
        spec!("where", [Param::expression("criterion")], Collection, false, where_fn),
        spec!("select", [Param::expression("projection")], Collection, false, select_fn),
        spec!("repeat", [Param::expression("projection")], Collection, false, repeat_fn),
        spec!("ofType", [Param::type_specifier("type")], Collection, false, of_type_fn),
        // Collection / set operations
        spec!("union", [Param::value("other")], Collection, false, union_fn),
        spec!("combine", [Param::value("other")], Collection, false, combine_fn),
        spec!("intersect", [Param::value("other")], Collection, false, intersect_fn),
        spec!("exclude", [Param::value("other")], Collection, false, exclude_fn),
        // Tree navigation
        spec!("children", [], Collection, false, children_fn),
        spec!("descendants", [], Collection, false, descendants_fn),
        // String
        spec!("length", [], Singleton, true, length_fn),
        spec!("upper", [], Singleton, true, upper_fn),
        spec!("lower", [], Singleton, true, lower_fn),
        spec!("trim", [], Singleton, true, trim_fn),
        spec!("startsWith", [Param::value("prefix")], Singleton, true, starts_with_fn),
        spec!("endsWith", [Param::value("suffix")], Singleton, true, ends_with_fn),
        spec!("indexOf", [Param::value("substring")], Singleton, true, index_of_fn),
        spec!("substring", [Param::value("start"), Param::optional_value("length")], Singleton, true, substring_fn),
        spec!("replace", [Param::value("pattern"), Param::value("substitution")], Singleton, true, replace_fn),
        spec!("split", [Param::value("separator")], Collection, true, split_fn),
        // Conversion
        spec!("toInteger", [], Singleton, true, to_integer_fn),
        spec!("toDecimal", [], Singleton, true, to_decimal_fn),
        spec!("toString", [], Singleton, true, to_string_fn),
        spec!("toBoolean", [], Singleton, true, to_boolean_fn),
        // Utility
        spec!("iif", [Param::value("criterion"), Param::expression("true_result"), Param::optional_expression("otherwise_result")], PreserveInput, false, iif_fn),
        spec!("defineVariable", [Param::value("name"), Param::optional_expression("expr")], PreserveInput, false, define_variable_fn),
        spec!("trace", [Param::value("name"), Param::optional_expression("projection")], PreserveInput, false, trace_fn),
        spec!("aggregate", [Param::expression("aggregator"), Param::optional_value("init")], Singleton, false, aggregate_fn),
    ]
}

fn same_ctx(value: Collection, call: &Call) -> Result<(Collection, Context), EvalError> {
    Ok((value, call.context.clone()))
}

fn boolean(b: bool) -> Collection {
    Collection::singleton(Value::Boolean(b))
}

// --- Existence -------------------------------------------------------------

fn empty_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    same_ctx(boolean(call.input.is_empty()), call)
}

fn exists_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    if call.args.is_empty() {
        return same_ctx(boolean(!call.input.is_empty()), call);
    }
    for (i, item) in call.input.iter().enumerate() {
        let iter_ctx = call.context.with_iterator(Collection::singleton(item.clone()), i);
        if call.eval_arg(0, &iter_ctx)?.as_bool3() == Some(true) {
            return same_ctx(boolean(true), call);
        }
    }
    same_ctx(boolean(false), call)
}

fn all_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    for (i, item) in call.input.iter().enumerate() {
        let iter_ctx = call.context.with_iterator(Collection::singleton(item.clone()), i);
        if call.eval_arg(0, &iter_ctx)?.as_bool3() != Some(true) {
            return same_ctx(boolean(false), call);
        }
    }
    same_ctx(boolean(true), call)
}

fn all_true_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    same_ctx(boolean(call.input.iter().all(|v| v.as_bool() == Some(true))), call)
}

fn any_true_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    same_ctx(boolean(call.input.iter().any(|v| v.as_bool() == Some(true))), call)
}

fn all_false_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    same_ctx(boolean(call.input.iter().all(|v| v.as_bool() == Some(false))), call)
}

fn any_false_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    same_ctx(boolean(call.input.iter().any(|v| v.as_bool() == Some(false))), call)
}

fn count_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    same_ctx(Collection::singleton(Value::Integer(call.input.len() as i64)), call)
}

fn is_distinct_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    let deduped = operators::union_dedup([call.input.clone()]);
    same_ctx(boolean(deduped.len() == call.input.len()), call)
}

fn distinct_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    same_ctx(operators::union_dedup([call.input.clone()]), call)
}

fn not_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    same_ctx(match call.input.as_bool3() {
        Some(b) => boolean(!b),
        None => Collection::empty(),
    }, call)
}

// --- Subsetting --------------------------------------------------------------

fn first_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    same_ctx(call.input.get(0).cloned().map(Collection::singleton).unwrap_or_default(), call)
}

fn last_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    let value = call.input.len().checked_sub(1).and_then(|i| call.input.get(i)).cloned();
    same_ctx(value.map(Collection::singleton).unwrap_or_default(), call)
}

fn tail_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    same_ctx(Collection::from_values(call.input.iter().skip(1).cloned()), call)
}

fn skip_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    let n = int_arg(call, 0)?.max(0) as usize;
    same_ctx(Collection::from_values(call.input.iter().skip(n).cloned()), call)
}

fn take_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    let n = int_arg(call, 0)?.max(0) as usize;
    same_ctx(Collection::from_values(call.input.iter().take(n).cloned()), call)
}

fn single_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    match call.input.len() {
        0 => same_ctx(Collection::empty(), call),
        1 => same_ctx(call.input.clone(), call),
        actual => Err(EvalError::SingletonViolation { actual }),
    }
}

fn int_arg(call: &Call, index: usize) -> Result<i64, EvalError> {
    match call.eval_arg(index, &call.context)?.as_singleton() {
        Some(Value::Integer(n)) => Ok(*n),
        _ => Ok(0),
    }
}

// --- Filtering / projection --------------------------------------------------

fn where_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    let mut out = Vec::new();
    for (i, item) in call.input.iter().enumerate() {
        let iter_ctx = call.context.with_iterator(Collection::singleton(item.clone()), i);
        if call.eval_arg(0, &iter_ctx)?.as_bool3() == Some(true) {
            out.push(item.clone());
        }
    }
    same_ctx(Collection::from_values(out), call)
}

fn select_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    let mut out = Collection::empty();
    for (i, item) in call.input.iter().enumerate() {
        let iter_ctx = call.context.with_iterator(Collection::singleton(item.clone()), i);
        out.extend(call.eval_arg(0, &iter_ctx)?);
    }
    same_ctx(out, call)
}

fn repeat_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    let mut collected: Vec<Value> = Vec::new();
    let mut frontier = call.input.clone();
    while !frontier.is_empty() {
        let mut next = Vec::new();
        for (i, item) in frontier.iter().enumerate() {
            let iter_ctx = call.context.with_iterator(Collection::singleton(item.clone()), i);
            next.extend(call.eval_arg(0, &iter_ctx)?);
        }
        let delta: Vec<Value> = next
            .into_iter()
            .filter(|v| !collected.iter().any(|c| c.fhir_equals(v) == Some(true)))
            .collect();
        if delta.is_empty() {
            break;
        }
        collected.extend(delta.iter().cloned());
        frontier = Collection::from_values(delta);
    }
    same_ctx(Collection::from_values(collected), call)
}

fn of_type_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    let type_name = type_specifier_arg(call, 0)?;
    let filtered: Vec<Value> = call
        .input
        .iter()
        .filter(|v| operators::type_name_matches(v, &type_name))
        .cloned()
        .collect();
    same_ctx(Collection::from_values(filtered), call)
}

fn type_specifier_arg(call: &Call, index: usize) -> Result<String, EvalError> {
    match call.eval_arg(index, &call.context)?.as_singleton() {
        Some(Value::String(s)) => Ok(s.to_string()),
        _ => Err(EvalError::Internal("ofType expects a type specifier".into())),
    }
}

// --- Collection / set operations ---------------------------------------------

fn union_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    let other = call.eval_arg(0, &call.context)?;
    same_ctx(operators::union_dedup([call.input.clone(), other]), call)
}

fn combine_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    let other = call.eval_arg(0, &call.context)?;
    same_ctx(Collection::concat([call.input.clone(), other]), call)
}

fn intersect_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    let other = call.eval_arg(0, &call.context)?;
    let kept: Vec<Value> = call
        .input
        .iter()
        .filter(|v| other.iter().any(|o| o.fhir_equals(v) == Some(true)))
        .cloned()
        .collect();
    same_ctx(operators::union_dedup([Collection::from_values(kept)]), call)
}

fn exclude_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    let other = call.eval_arg(0, &call.context)?;
    let kept: Vec<Value> = call
        .input
        .iter()
        .filter(|v| !other.iter().any(|o| o.fhir_equals(v) == Some(true)))
        .cloned()
        .collect();
    same_ctx(Collection::from_values(kept), call)
}

// --- Tree navigation ----------------------------------------------------------

fn children_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    let mut out = Vec::new();
    for item in call.input.iter() {
        if let Value::Object(obj) = item {
            for child in obj.fields.values() {
                out.extend(child.iter().cloned());
            }
        }
    }
    same_ctx(Collection::from_values(out), call)
}

fn descendants_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    let mut out = Vec::new();
    let mut frontier = call.input.clone();
    while !frontier.is_empty() {
        let mut next = Vec::new();
        for item in frontier.iter() {
            if let Value::Object(obj) = item {
                for child in obj.fields.values() {
                    next.extend(child.iter().cloned());
                }
            }
        }
        out.extend(next.iter().cloned());
        frontier = Collection::from_values(next);
    }
    same_ctx(Collection::from_values(out), call)
}

// --- String --------------------------------------------------------------------

fn string_arg(call: &Call) -> Option<std::sync::Arc<str>> {
    match call.input.as_singleton() {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

fn string_param(call: &Call, index: usize) -> Result<String, EvalError> {
    match call.eval_arg(index, &call.context)?.as_singleton() {
        Some(v) => Ok(v.to_string()),
        None => Ok(String::new()),
    }
}

fn length_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    same_ctx(
        string_arg(call).map(|s| Collection::singleton(Value::Integer(s.chars().count() as i64))).unwrap_or_default(),
        call,
    )
}

fn upper_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    same_ctx(string_arg(call).map(|s| Collection::singleton(Value::from(s.to_uppercase()))).unwrap_or_default(), call)
}

fn lower_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    same_ctx(string_arg(call).map(|s| Collection::singleton(Value::from(s.to_lowercase()))).unwrap_or_default(), call)
}

fn trim_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    same_ctx(string_arg(call).map(|s| Collection::singleton(Value::from(s.trim()))).unwrap_or_default(), call)
}

fn starts_with_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    let Some(s) = string_arg(call) else { return same_ctx(Collection::empty(), call) };
    let prefix = string_param(call, 0)?;
    same_ctx(boolean(s.starts_with(&prefix)), call)
}

fn ends_with_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    let Some(s) = string_arg(call) else { return same_ctx(Collection::empty(), call) };
    let suffix = string_param(call, 0)?;
    same_ctx(boolean(s.ends_with(&suffix)), call)
}

fn index_of_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    let Some(s) = string_arg(call) else { return same_ctx(Collection::empty(), call) };
    let needle = string_param(call, 0)?;
    let index = s.find(&needle).map(|byte| s[..byte].chars().count() as i64).unwrap_or(-1);
    same_ctx(Collection::singleton(Value::Integer(index)), call)
}

fn substring_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    let Some(s) = string_arg(call) else { return same_ctx(Collection::empty(), call) };
    let start = int_arg(call, 0)?;
    if start < 0 || start as usize > s.chars().count() {
        return same_ctx(Collection::empty(), call);
    }
    let length = match call.arg(1) {
        Some(_) => Some(int_arg(call, 1)?.max(0) as usize),
        None => None,
    };
    let chars: Vec<char> = s.chars().collect();
    let start = start as usize;
    let end = length.map(|l| (start + l).min(chars.len())).unwrap_or(chars.len());
    let result: String = chars[start..end].iter().collect();
    same_ctx(Collection::singleton(Value::from(result)), call)
}

fn replace_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    let Some(s) = string_arg(call) else { return same_ctx(Collection::empty(), call) };
    let pattern = string_param(call, 0)?;
    let substitution = string_param(call, 1)?;
    if pattern.is_empty() {
        return same_ctx(Collection::singleton(Value::from(s.to_string())), call);
    }
    same_ctx(Collection::singleton(Value::from(s.replace(&pattern, &substitution))), call)
}

fn split_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    let Some(s) = string_arg(call) else { return same_ctx(Collection::empty(), call) };
    let separator = string_param(call, 0)?;
    let parts: Vec<Value> = if separator.is_empty() {
        vec![Value::from(s.to_string())]
    } else {
        s.split(separator.as_str()).map(Value::from).collect()
    };
    same_ctx(Collection::from_values(parts), call)
}

// --- Conversion -----------------------------------------------------------------

fn to_integer_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    let converted = match call.input.as_singleton() {
        Some(Value::Integer(n)) => Some(Value::Integer(*n)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::Integer),
        Some(Value::Boolean(b)) => Some(Value::Integer(if *b { 1 } else { 0 })),
        _ => None,
    };
    same_ctx(converted.map(Collection::singleton).unwrap_or_default(), call)
}

fn to_decimal_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    let converted = match call.input.as_singleton() {
        Some(Value::Decimal(d)) => Some(Value::Decimal(*d)),
        Some(Value::Integer(n)) => Some(Value::Decimal((*n).into())),
        Some(Value::String(s)) => s.trim().parse().ok().map(Value::Decimal),
        Some(Value::Boolean(b)) => Some(Value::Decimal(if *b { 1 } else { 0 }.into())),
        _ => None,
    };
    same_ctx(converted.map(Collection::singleton).unwrap_or_default(), call)
}

fn to_string_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    same_ctx(call.input.as_singleton().map(|v| Collection::singleton(Value::from(v.to_string()))).unwrap_or_default(), call)
}

fn to_boolean_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    let converted = match call.input.as_singleton() {
        Some(Value::Boolean(b)) => Some(*b),
        Some(Value::Integer(1)) => Some(true),
        Some(Value::Integer(0)) => Some(false),
        Some(Value::String(s)) => match s.to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => Some(true),
            "false" | "f" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    };
    same_ctx(converted.map(boolean).unwrap_or_default(), call)
}

// --- Utility --------------------------------------------------------------------

fn iif_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    let cond = call.eval_arg(0, &call.context)?;
    let ambiguous = cond.len() > 1 || cond.as_singleton().is_some_and(|v| !matches!(v, Value::Boolean(_)));
    if ambiguous {
        return same_ctx(Collection::empty(), call);
    }
    match cond.as_bool3() {
        Some(true) => same_ctx(call.eval_arg(1, &call.context)?, call),
        _ => match call.arg(2) {
            Some(_) => same_ctx(call.eval_arg(2, &call.context)?, call),
            None => same_ctx(Collection::empty(), call),
        },
    }
}

fn define_variable_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    let name = match call.eval_arg(0, &call.context)?.as_singleton() {
        Some(Value::String(s)) => s.to_string(),
        _ => return Err(EvalError::Internal("defineVariable expects a string name".into())),
    };
    let value = match call.arg(1) {
        Some(_) => call.eval_arg(1, &call.context)?,
        None => call.input.clone(),
    };
    let ctx = call.context.set_variable(&name, value, false);
    Ok((call.input.clone(), ctx))
}

/// `trace(name[, projection])`: returns `input` unchanged (§4.8). The name
/// and the projection (if any, else `input` itself) reach a host's
/// `TraceSink` through the call site — `Evaluator::eval_function_call` and
/// `compiler::eval_call` both special-case `"trace"` after this returns and
/// forward to the sink they were each configured with, since a `TraceSink`
/// is a property of the caller (`Evaluator`/`Program`), not of the registry.
fn trace_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    same_ctx(call.input.clone(), call)
}

/// The value `trace()` hands its `TraceSink`: the evaluated projection
/// argument if one was given, else the unmodified input. Shared by the
/// evaluator and compiler call sites so they observe the same value trace_fn
/// itself returns to the pipeline.
pub fn trace_projection(call: &Call, ctx: &Context) -> Result<Collection, EvalError> {
    match call.arg(1) {
        Some(_) => call.eval_arg(1, ctx),
        None => Ok(call.input.clone()),
    }
}

fn aggregate_fn(call: &Call) -> Result<(Collection, Context), EvalError> {
    let mut total = match call.arg(1) {
        Some(_) => call.eval_arg(1, &call.context)?,
        None => Collection::empty(),
    };
    for (i, item) in call.input.iter().enumerate() {
        let mut iter_ctx = call.context.with_iterator(Collection::singleton(item.clone()), i);
        iter_ctx = iter_ctx.set_system_variable("total", total.clone());
        total = call.eval_arg(0, &iter_ctx)?;
    }
    same_ctx(total, call)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DynamicModelProvider;
    use std::sync::Arc;

    fn call(input: Collection, args: Vec<Collection>) -> (Call<'static>, Context) {
        let ctx = Context::root(input.clone());
        let args = args.into_iter().map(super::super::Arg::Value).collect();
        (Call { input, context: ctx.clone(), args, model: None }, ctx)
    }

    #[test]
    fn count_counts_elements() {
        let input = Collection::from_values([Value::Integer(1), Value::Integer(2)]);
        let (c, _) = call(input, vec![]);
        let (result, _) = count_fn(&c).unwrap();
        assert_eq!(result.as_singleton(), Some(&Value::Integer(2)));
    }

    #[test]
    fn distinct_drops_duplicates_preserving_order() {
        let input = Collection::from_values([Value::Integer(1), Value::Integer(1), Value::Integer(2)]);
        let (c, _) = call(input, vec![]);
        let (result, _) = distinct_fn(&c).unwrap();
        assert_eq!(result.into_values(), vec![Value::Integer(1), Value::Integer(2)]);
    }

    #[test]
    fn single_errors_on_multiple_elements() {
        let input = Collection::from_values([Value::Integer(1), Value::Integer(2)]);
        let (c, _) = call(input, vec![]);
        assert!(matches!(single_fn(&c), Err(EvalError::SingletonViolation { actual: 2 })));
    }

    #[test]
    fn define_variable_is_idempotent_on_redefinition() {
        let input = Collection::singleton(Value::Integer(1));
        let (c, ctx) = call(input.clone(), vec![Value::from("x").into()]);
        let (_, ctx2) = define_variable_fn(&c).unwrap();
        assert_eq!(ctx2.get_variable("x"), Some(input.clone()));
        let (c2, _) = call(input.clone(), vec![Value::from("x").into()]);
        let c2 = Call { context: ctx2.clone(), ..c2 };
        let (_, ctx3) = define_variable_fn(&c2).unwrap();
        assert_eq!(ctx3.get_variable("x"), Some(input));
        let _ = ctx;
        let _ = Arc::new(DynamicModelProvider::new());
    }
}
