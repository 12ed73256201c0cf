//! The *Literal* arm of the Operation union (§3): recognizing a lexed
//! literal token and turning it into a runtime [`Value`].
//!
//! The lexer keeps the raw lexeme (quotes, backticks, the leading `@` on
//! date/time literals, untouched escapes) rather than interpreting it —
//! that's a parsing concern shared by every literal kind and belongs here,
//! next to everything else that turns syntax into a registry-recognized
//! value.

use crate::error::EvalError;
use crate::value::{DateTimeValue, DateValue, Quantity, TimeValue, Value};
use fhirpath_parser::cst::{LiteralExpr, QuantityLiteral};
use fhirpath_parser::SyntaxKind;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Parse a `LiteralExpr`'s token into a [`Value`]. Returns `Ok(None)` only
/// for a malformed number/date/time lexeme, which should never occur for a
/// tree the lexer produced (its character classes guarantee the shape); the
/// caller folds that case to [`EvalError::Internal`].
pub fn parse_literal(expr: &LiteralExpr) -> Result<Value, EvalError> {
    let token = expr
        .token()
        .ok_or_else(|| EvalError::Internal("literal expression has no token".into()))?;
    let text = token.text();
    let value = match token.kind() {
        SyntaxKind::true_KW => Value::Boolean(true),
        SyntaxKind::false_KW => Value::Boolean(false),
        SyntaxKind::INT_NUMBER => Value::Integer(
            text.parse()
                .map_err(|_| EvalError::Internal(format!("malformed integer literal '{text}'")))?,
        ),
        SyntaxKind::DEC_NUMBER => Value::Decimal(
            Decimal::from_str(text)
                .map_err(|_| EvalError::Internal(format!("malformed decimal literal '{text}'")))?,
        ),
        SyntaxKind::STRING => Value::String(unescape_string(text).into()),
        SyntaxKind::DATE_LITERAL => {
            let body = text.trim_start_matches('@');
            let date = DateValue::parse(body)
                .ok_or_else(|| EvalError::Internal(format!("malformed date literal '{text}'")))?;
            Value::Date(date)
        }
        SyntaxKind::DATETIME_LITERAL => {
            let body = text.trim_start_matches('@');
            let dt = DateTimeValue::parse(body).ok_or_else(|| {
                EvalError::Internal(format!("malformed datetime literal '{text}'"))
            })?;
            Value::DateTime(dt)
        }
        SyntaxKind::TIME_LITERAL => {
            let body = text.trim_start_matches('@').trim_start_matches('T');
            let time = TimeValue::parse(body)
                .ok_or_else(|| EvalError::Internal(format!("malformed time literal '{text}'")))?;
            Value::Time(time)
        }
        other => {
            return Err(EvalError::Internal(format!("not a literal token kind: {other:?}")))
        }
    };
    Ok(value)
}

/// Parse a `4 days` / `10.1 'mg'` quantity literal into `Value::Quantity`.
pub fn parse_quantity(expr: &QuantityLiteral) -> Result<Value, EvalError> {
    let value_token = expr
        .value_token()
        .ok_or_else(|| EvalError::Internal("quantity literal has no numeric token".into()))?;
    let value = Decimal::from_str(value_token.text())
        .map_err(|_| EvalError::Internal(format!("malformed quantity magnitude '{}'", value_token.text())))?;
    let unit = expr.unit_token().map(|t| {
        if t.kind() == SyntaxKind::STRING {
            unescape_string(t.text())
        } else {
            calendar_unit_to_ucum(t.text())
        }
    });
    Ok(Value::Quantity(Quantity::new(value, unit)))
}

/// Maps a bare calendar-duration word (`days`, `year`, …) to its UCUM code,
/// per the FHIRPath quantity-literal grammar.
fn calendar_unit_to_ucum(word: &str) -> String {
    match word.trim_end_matches('s') {
        "year" => "a",
        "month" => "mo",
        "week" => "wk",
        "day" => "d",
        "hour" => "h",
        "minute" => "min",
        "second" => "s",
        "millisecond" => "ms",
        _ => word,
    }
    .to_string()
}

/// Strips the surrounding `'…'` and interprets FHIRPath's backslash escapes.
pub fn unescape_string(raw: &str) -> String {
    let inner = raw.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')).unwrap_or(raw);
    unescape_body(inner)
}

/// Strips the surrounding `` `…` `` of a delimited identifier and interprets escapes.
pub fn unescape_delimited_ident(raw: &str) -> String {
    let inner = raw.strip_prefix('`').and_then(|s| s.strip_suffix('`')).unwrap_or(raw);
    unescape_body(inner)
}

fn unescape_body(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{000C}'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('`') => out.push('`'),
            Some('/') => out.push('/'),
            Some('u') => {
                let hex: String = (&mut chars).take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push('\\');
                        out.push('u');
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unescapes_common_sequences() {
        assert_eq!(unescape_string(r"'it\'s'"), "it's");
        assert_eq!(unescape_string(r"'a\tb\nc'"), "a\tb\nc");
        assert_eq!(unescape_string("'A'"), "A");
    }

    #[test]
    fn calendar_units_map_to_ucum() {
        assert_eq!(calendar_unit_to_ucum("days"), "d");
        assert_eq!(calendar_unit_to_ucum("year"), "a");
    }
}
