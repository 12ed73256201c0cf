//! Recursive-descent, precedence-climbing grammar for FHIRPath expressions.
//!
//! Binding powers follow the FHIRPath operator precedence table, from loosest
//! to tightest: `implies` < `or`/`xor` < `and` < `in`/`contains` < `=`/`!=`/`~`/`!~`
//! < `>`/`<`/`>=`/`<=` < `|` < `is`/`as` < `+`/`-`/`&` < `*`/`/`/`div`/`mod`
//! < unary `+`/`-` < `.` and indexing, which bind inside `postfix_expr`.

use crate::parser::ParseMode;
use crate::parser::Parser;
use crate::SyntaxKind;
use crate::SyntaxKind::*;
use crate::T;

/// Parse a whole source file: one expression, then garbage collection of anything left over.
///
/// In [`ParseMode::Fast`], once the expression hits its first error, whatever
/// is left of the input is folded into a single `ERROR_NODE` rather than
/// re-entering recovery one token at a time.
pub(crate) fn source_file(p: &mut Parser) {
    let g = p.start_node(SOURCE_FILE);
    if !p.at_end() {
        expr(p);
    }
    if p.should_abort() {
        if !p.at_end() {
            let eg = p.start_node(ERROR_NODE);
            while !p.at_end() {
                p.bump_any();
            }
            eg.finish_node();
        }
    } else {
        while !p.at_end() {
            p.err_and_pop("unexpected token after expression");
        }
    }
    g.finish_node();
}

pub(crate) fn expr(p: &mut Parser) {
    expr_bp(p, 0);
}

fn expr_bp(p: &mut Parser, min_bp: u8) {
    if !p.enter_recursion() {
        return;
    }
    let checkpoint = p.checkpoint();
    postfix_expr(p);

    loop {
        if p.should_abort() {
            break;
        }
        let Some(kind) = p.peek() else { break };
        let Some((node_kind, l_bp, r_bp)) = binary_op(kind) else {
            break;
        };
        if l_bp < min_bp {
            break;
        }

        if matches!(kind, T![is] | T![as]) {
            p.bump(kind);
            type_specifier(p);
        } else {
            p.bump(kind);
            expr_bp(p, r_bp);
        }
        checkpoint.wrap_node(node_kind).finish_node();
    }

    p.exit_recursion();
}

/// The binding powers this grammar uses for `kind` as a binary operator, for
/// callers outside the parser (e.g. an operation registry) that want to
/// mirror this table rather than hard-code a second copy of it.
pub fn binary_operator_precedence(kind: SyntaxKind) -> Option<(u8, u8)> {
    binary_op(kind).map(|(_, l, r)| (l, r))
}

/// Binding power and resulting node kind for a binary operator token.
/// Returns `(node_kind, left_bp, right_bp)`; left-associative operators use `right_bp = left_bp + 1`.
fn binary_op(kind: SyntaxKind) -> Option<(SyntaxKind, u8, u8)> {
    Some(match kind {
        T![implies] => (IMPLIES_EXPR, 1, 2),
        T![or] => (OR_EXPR, 2, 3),
        T![xor] => (XOR_EXPR, 2, 3),
        T![and] => (AND_EXPR, 3, 4),
        T![in] => (MEMBERSHIP_EXPR, 4, 5),
        T![contains] => (MEMBERSHIP_EXPR, 4, 5),
        T![=] | T![!=] | T![~] | T![!~] => (EQUALITY_EXPR, 5, 6),
        T![<] | T![>] | T![<=] | T![>=] => (INEQUALITY_EXPR, 6, 7),
        T![|] => (UNION_EXPR, 7, 8),
        T![is] | T![as] => (TYPE_EXPR, 8, 9),
        T![+] | T![-] | T![&] => (ADDITIVE_EXPR, 9, 10),
        T![*] | T![/] | T![div] | T![mod] => (MULTIPLICATIVE_EXPR, 10, 11),
        _ => return None,
    })
}

/// A primary expression followed by any number of postfix `.member`/`[index]`/`(args)` suffixes.
fn postfix_expr(p: &mut Parser) {
    let checkpoint = p.checkpoint();
    unary_expr(p);

    loop {
        if p.should_abort() {
            break;
        }
        match p.peek() {
            Some(T![.]) => {
                let dot_checkpoint = p.checkpoint();
                let dot_start = p.current_offset();
                p.bump(T![.]);
                if p.at(T![.]) {
                    p.bump(T![.]);
                    p.push_err(crate::Error::with_loc(
                        "Invalid '..' operator: FHIRPath has no range/spread operator, use a single '.'",
                        "..".to_string(),
                        dot_start,
                    ));
                }
                // Counted after the `..` diagnostic: that one is a fully recovered
                // (not incomplete) production, so only `invocation`'s own errors
                // should mark this span incomplete.
                let errs_before = p.error_count();
                invocation(p);
                maybe_wrap_incomplete(p, &dot_checkpoint, errs_before);
                checkpoint.wrap_node(INVOCATION_EXPR).finish_node();
            }
            Some(T!['[']) => {
                let idx_checkpoint = p.checkpoint();
                let errs_before = p.error_count();
                let open = p.current_offset();
                p.bump(T!['[']);
                if p.at(T![']']) {
                    p.err("empty index expression, expected an expression between '[' and ']'");
                } else {
                    expr(p);
                }
                p.expect_close(T![']'], T![']'], open);
                maybe_wrap_incomplete(p, &idx_checkpoint, errs_before);
                checkpoint.wrap_node(INDEX_EXPR).finish_node();
            }
            _ => break,
        }
    }
}

/// In [`ParseMode::Diagnostic`], wraps whatever was produced since `checkpoint`
/// in an `INCOMPLETE_NODE` if the production recorded a new error — the
/// node-level marker `is_partial` (and any IDE walking the tree) looks for.
fn maybe_wrap_incomplete(p: &mut Parser, checkpoint: &crate::parser::Checkpoint, errs_before: usize) {
    if p.mode() == ParseMode::Diagnostic && p.error_count() > errs_before {
        checkpoint.wrap_node(INCOMPLETE_NODE).finish_node();
    }
}

/// Consumes one unparseable token via `err_and_pop`, wrapping it in an
/// `ERROR_NODE` in [`ParseMode::Diagnostic`] so the failed production leaves
/// a distinct, inspectable node behind instead of a bare `ERROR_TOKEN`.
fn err_and_pop_node(p: &mut Parser, message: &str) {
    if p.mode() == ParseMode::Diagnostic {
        let g = p.start_node(ERROR_NODE);
        p.err_and_pop(message);
        g.finish_node();
    } else {
        p.err_and_pop(message);
    }
}

/// Unary polarity (`+`/`-`) applied to a primary expression.
fn unary_expr(p: &mut Parser) {
    if matches!(p.peek(), Some(T![+] | T![-])) {
        if !p.enter_recursion() {
            return;
        }
        let g = p.start_node(POLARITY_EXPR);
        p.bump(p.peek().unwrap());
        unary_expr(p);
        g.finish_node();
        p.exit_recursion();
    } else {
        primary_expr(p);
    }
}

/// A member invocation after `.`: a bare identifier, a function call, or `$this`/`$index`/`$total`.
fn invocation(p: &mut Parser) {
    match p.peek() {
        Some(IDENT) | Some(DELIMITED_IDENT) => {
            if p.peek_n(1) == Some(T!['(']) {
                function_call(p);
            } else {
                let g = p.start_node(NAME_REF);
                p.bump(p.peek().unwrap());
                g.finish_node();
            }
        }
        Some(kind) if kind.is_keyword() => {
            if p.peek_n(1) == Some(T!['(']) {
                // A keyword that also names a function, e.g. `.contains(x)`.
                function_call(p);
            } else {
                // A keyword used as a plain member name (e.g. `Patient.day`, `Patient.as`).
                let g = p.start_node(NAME_REF);
                p.bump(kind);
                g.finish_node();
            }
        }
        Some(STAR) => {
            let g = p.start_node(NAME_REF);
            p.bump(STAR);
            g.finish_node();
        }
        _ => err_and_pop_node(p, "expected a member name after '.'"),
    }
}

fn function_call(p: &mut Parser) {
    let g = p.start_node(FUNCTION_CALL_EXPR);
    let name_kind = p.peek().unwrap();
    {
        let name_g = p.start_node(NAME_REF);
        p.bump(name_kind);
        name_g.finish_node();
    }
    arg_list(p);
    g.finish_node();
}

fn arg_list(p: &mut Parser) {
    let checkpoint = p.checkpoint();
    let errs_before = p.error_count();
    let g = p.start_node(ARG_LIST);
    let open = p.current_offset();
    p.expect(T!['('], T!['(']);
    if !p.at(T![')']) {
        expr(p);
        while p.at(T![,]) && !p.should_abort() {
            p.bump(T![,]);
            if p.at(T![')']) {
                p.err("trailing comma, expected another argument after ','");
                break;
            }
            expr(p);
        }
    }
    p.expect_close(T![')'], T![')'], open);
    g.finish_node();
    maybe_wrap_incomplete(p, &checkpoint, errs_before);
}

fn primary_expr(p: &mut Parser) {
    match p.peek() {
        Some(INT_NUMBER | DEC_NUMBER | STRING | DATE_LITERAL | DATETIME_LITERAL | TIME_LITERAL
            | T![true] | T![false]) => literal(p),
        Some(T!['(']) => paren_expr(p),
        Some(T!['{']) => collection_literal(p),
        Some(EXTERNAL_CONSTANT) => {
            let g = p.start_node(EXTERNAL_CONSTANT_EXPR);
            p.bump(EXTERNAL_CONSTANT);
            g.finish_node();
        }
        Some(SPECIAL_VARIABLE) => {
            let g = p.start_node(SPECIAL_VARIABLE_EXPR);
            p.bump(SPECIAL_VARIABLE);
            g.finish_node();
        }
        Some(IDENT) | Some(DELIMITED_IDENT) => {
            if p.peek_n(1) == Some(T!['(']) {
                let g = p.start_node(IDENTIFIER_EXPR);
                function_call(p);
                g.finish_node();
            } else {
                let g = p.start_node(IDENTIFIER_EXPR);
                let name_g = p.start_node(NAME_REF);
                p.bump(p.peek().unwrap());
                name_g.finish_node();
                g.finish_node();
            }
        }
        Some(kind) if kind.is_keyword() => {
            let g = p.start_node(IDENTIFIER_EXPR);
            if p.peek_n(1) == Some(T!['(']) {
                // A keyword that also names a function, in head position.
                function_call(p);
            } else {
                // A reserved word used in head position as a plain identifier (`day.exists()`).
                let name_g = p.start_node(NAME_REF);
                p.bump(kind);
                name_g.finish_node();
            }
            g.finish_node();
        }
        _ => err_and_pop_node(p, "expected an expression"),
    }
}

fn literal(p: &mut Parser) {
    let kind = p.peek().unwrap();
    // A numeric literal directly followed by a unit word or UCUM string is a Quantity.
    let is_quantity = matches!(kind, INT_NUMBER | DEC_NUMBER)
        && matches!(p.peek_n(1), Some(k) if is_unit_keyword(k) || k == STRING);

    let g = p.start_node(if is_quantity { QUANTITY_LITERAL } else { LITERAL_EXPR });
    p.bump(kind);
    if is_quantity {
        let unit_kind = p.peek().unwrap();
        p.bump(unit_kind);
    }
    g.finish_node();
}

fn is_unit_keyword(kind: SyntaxKind) -> bool {
    matches!(
        kind,
        year_KW
            | years_KW
            | month_KW
            | months_KW
            | week_KW
            | weeks_KW
            | day_KW
            | days_KW
            | hour_KW
            | hours_KW
            | minute_KW
            | minutes_KW
            | second_KW
            | seconds_KW
            | millisecond_KW
            | milliseconds_KW
    )
}

fn paren_expr(p: &mut Parser) {
    let checkpoint = p.checkpoint();
    let errs_before = p.error_count();
    let g = p.start_node(PAREN_EXPR);
    let open = p.current_offset();
    p.bump(T!['(']);
    expr(p);
    p.expect_close(T![')'], T![')'], open);
    g.finish_node();
    maybe_wrap_incomplete(p, &checkpoint, errs_before);
}

fn collection_literal(p: &mut Parser) {
    let checkpoint = p.checkpoint();
    let errs_before = p.error_count();
    let g = p.start_node(COLLECTION_LITERAL);
    let open = p.current_offset();
    p.bump(T!['{']);
    if !p.at(T!['}']) {
        expr(p);
        while p.at(T![,]) && !p.should_abort() {
            p.bump(T![,]);
            if p.at(T!['}']) {
                p.err("trailing comma, expected another element after ','");
                break;
            }
            expr(p);
        }
    }
    p.expect_close(T!['}'], T!['}'], open);
    g.finish_node();
    maybe_wrap_incomplete(p, &checkpoint, errs_before);
}

/// A type specifier following `is`/`as`: an optional namespace qualifier and a name,
/// e.g. `FHIR.Patient` or `Integer`.
fn type_specifier(p: &mut Parser) {
    let checkpoint = p.checkpoint();
    let errs_before = p.error_count();
    let g = p.start_node(TYPE_SPECIFIER);
    match p.peek() {
        Some(IDENT) | Some(DELIMITED_IDENT) => {
            p.bump(p.peek().unwrap());
            if p.at(T![.]) {
                p.bump(T![.]);
                match p.peek() {
                    Some(IDENT) | Some(DELIMITED_IDENT) => p.bump(p.peek().unwrap()),
                    _ => err_and_pop_node(p, "expected a type name after '.'"),
                }
            }
        }
        _ => err_and_pop_node(p, "expected a type specifier"),
    }
    g.finish_node();
    maybe_wrap_incomplete(p, &checkpoint, errs_before);
}
