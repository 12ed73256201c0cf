//! The tree-walking evaluator (§4.9): interprets a parsed expression tree
//! directly against a [`Context`], re-reading the syntax tree on every call.
//!
//! Function bodies live once in [`crate::registry::functions`] and are
//! shared with [`crate::compiler`] through the [`Evaluable`] thunk below —
//! this module's only job is to turn CST nodes into [`Arg`]s and dispatch.

use crate::context::Context;
use crate::error::EvalError;
use crate::model::ModelProvider;
use crate::registry::{self, Arg, Call, Evaluable, ParamKind, Registry};
use crate::value::{Collection, Quantity, Value};
use fhirpath_parser::cst::{
    CstNode, Expr, FunctionCallExpr, IndexExpr, InvocationExpr, Member, PolarityExpr, TypeExpr,
};
use fhirpath_parser::SyntaxKind;
use std::sync::Arc;

/// Observes `trace()` calls. FHIRPath's `trace` is a host-defined audit
/// channel, not a Rust logging statement, so hosts that want one wire a
/// sink here rather than the engine assuming a particular destination.
pub trait TraceSink: Send + Sync {
    fn trace(&self, name: &str, projection: &Collection);
}

/// Walks an [`Expr`] tree, dispatching literals and operators directly and
/// functions through the [`Registry`].
pub struct Evaluator {
    registry: Registry,
    model: Option<Arc<dyn ModelProvider>>,
    trace: Option<Arc<dyn TraceSink>>,
}

impl Evaluator {
    pub fn new(model: Option<Arc<dyn ModelProvider>>) -> Self {
        Self { registry: Registry::new(), model, trace: None }
    }

    pub fn with_trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.trace = Some(sink);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Evaluate `expr` against `ctx`, discarding any context mutation a
    /// trailing `defineVariable` would otherwise carry forward. Used for
    /// standalone expressions and for anything that isn't itself one link
    /// of an invocation chain (operands, arguments, collection elements).
    pub fn eval(&self, expr: &Expr, ctx: &Context) -> Result<Collection, EvalError> {
        self.eval_threaded(expr, ctx).map(|(value, _)| value)
    }

    /// Like [`Evaluator::eval`] but also returns the context as mutated by
    /// any `defineVariable` reached along the way — only invocation chains
    /// (`.`) need this, since that's the only construct `defineVariable`'s
    /// "rest of the pipeline" scoping rule applies to (§4.8).
    fn eval_threaded(&self, expr: &Expr, ctx: &Context) -> Result<(Collection, Context), EvalError> {
        match expr {
            Expr::Literal(lit) => Ok((Collection::singleton(registry::parse_literal(lit)?), ctx.clone())),
            Expr::Quantity(q) => Ok((Collection::singleton(registry::parse_quantity(q)?), ctx.clone())),
            Expr::SpecialVariable(sv) => {
                let token = sv
                    .token()
                    .ok_or_else(|| EvalError::Internal("special variable has no token".into()))?;
                let name = token.text().trim_start_matches('$').to_string();
                Ok((ctx.get_variable(&name).unwrap_or_default(), ctx.clone()))
            }
            Expr::ExternalConstant(ec) => {
                let token = ec
                    .token()
                    .ok_or_else(|| EvalError::Internal("external constant has no token".into()))?;
                let name = external_constant_name(token.text());
                Ok((ctx.get_variable(&name).unwrap_or_default(), ctx.clone()))
            }
            Expr::Paren(p) => match p.inner() {
                Some(inner) => self.eval_threaded(&inner, ctx),
                None => Ok((Collection::empty(), ctx.clone())),
            },
            Expr::Collection(c) => {
                let mut out = Collection::empty();
                for element in c.elements() {
                    out.extend(self.eval(&element, ctx)?);
                }
                Ok((out, ctx.clone()))
            }
            Expr::Identifier(ident) => {
                if let Some(call) = ident.function_call() {
                    self.eval_function_call(&call, ctx.focus().clone(), ctx)
                } else if let Some(name_ref) = ident.name_ref() {
                    Ok((ctx.focus().navigate(&name_ref.text()), ctx.clone()))
                } else {
                    Ok((Collection::empty(), ctx.clone()))
                }
            }
            Expr::FunctionCall(fc) => self.eval_function_call(fc, ctx.focus().clone(), ctx),
            Expr::Invocation(inv) => self.eval_invocation(inv, ctx),
            Expr::Index(ix) => self.eval_index(ix, ctx),
            Expr::Polarity(p) => self.eval_polarity(p, ctx),
            Expr::Multiplicative(e) => {
                let lhs = self.eval(&e.lhs().ok_or_else(missing("multiplicative lhs"))?, ctx)?;
                let rhs = self.eval(&e.rhs().ok_or_else(missing("multiplicative rhs"))?, ctx)?;
                let op = op_kind(e.op_token(), SyntaxKind::STAR);
                Ok((registry::eval_multiplicative(op, lhs, rhs)?, ctx.clone()))
            }
            Expr::Additive(e) => {
                let lhs = self.eval(&e.lhs().ok_or_else(missing("additive lhs"))?, ctx)?;
                let rhs = self.eval(&e.rhs().ok_or_else(missing("additive rhs"))?, ctx)?;
                let op = op_kind(e.op_token(), SyntaxKind::PLUS);
                Ok((registry::eval_additive(op, lhs, rhs)?, ctx.clone()))
            }
            Expr::Union(e) => {
                let lhs = self.eval(&e.lhs().ok_or_else(missing("union lhs"))?, ctx)?;
                let rhs = self.eval(&e.rhs().ok_or_else(missing("union rhs"))?, ctx)?;
                Ok((registry::union_dedup([lhs, rhs]), ctx.clone()))
            }
            Expr::Inequality(e) => {
                let lhs = self.eval(&e.lhs().ok_or_else(missing("inequality lhs"))?, ctx)?;
                let rhs = self.eval(&e.rhs().ok_or_else(missing("inequality rhs"))?, ctx)?;
                let op = op_kind(e.op_token(), SyntaxKind::LT);
                Ok((registry::eval_inequality(op, lhs, rhs), ctx.clone()))
            }
            Expr::Equality(e) => {
                let lhs = self.eval(&e.lhs().ok_or_else(missing("equality lhs"))?, ctx)?;
                let rhs = self.eval(&e.rhs().ok_or_else(missing("equality rhs"))?, ctx)?;
                let op = op_kind(e.op_token(), SyntaxKind::EQ);
                Ok((registry::eval_equality(op, lhs, rhs), ctx.clone()))
            }
            Expr::Membership(e) => {
                let lhs = self.eval(&e.lhs().ok_or_else(missing("membership lhs"))?, ctx)?;
                let rhs = self.eval(&e.rhs().ok_or_else(missing("membership rhs"))?, ctx)?;
                let op = op_kind(e.op_token(), SyntaxKind::in_KW);
                Ok((registry::eval_membership(op, lhs, rhs), ctx.clone()))
            }
            Expr::And(e) => self.eval_logical(SyntaxKind::and_KW, e.lhs(), e.rhs(), ctx),
            Expr::Or(e) => self.eval_logical(SyntaxKind::or_KW, e.lhs(), e.rhs(), ctx),
            Expr::Xor(e) => self.eval_logical(SyntaxKind::xor_KW, e.lhs(), e.rhs(), ctx),
            Expr::Implies(e) => self.eval_logical(SyntaxKind::implies_KW, e.lhs(), e.rhs(), ctx),
            Expr::Type(e) => self.eval_type_expr(e, ctx),
            Expr::Error(_) | Expr::Incomplete(_) => Ok((Collection::empty(), ctx.clone())),
        }
    }

    fn eval_invocation(&self, inv: &InvocationExpr, ctx: &Context) -> Result<(Collection, Context), EvalError> {
        let target_expr = inv.target().ok_or_else(missing("invocation target"))?;
        let (target, ctx) = self.eval_threaded(&target_expr, ctx)?;
        match inv.member() {
            Some(Member::Name(name_ref)) => Ok((target.navigate(&name_ref.text()), ctx)),
            Some(Member::Call(fc)) => self.eval_function_call(&fc, target, &ctx),
            None => Ok((Collection::empty(), ctx)),
        }
    }

    fn eval_index(&self, ix: &IndexExpr, ctx: &Context) -> Result<(Collection, Context), EvalError> {
        let target_expr = ix.target().ok_or_else(missing("index target"))?;
        let (target, ctx) = self.eval_threaded(&target_expr, ctx)?;
        let index_expr = ix.index().ok_or_else(missing("index expression"))?;
        let index = self.eval(&index_expr, &ctx)?;
        let result = match index.as_singleton() {
            Some(Value::Integer(i)) if *i >= 0 => {
                target.get(*i as usize).cloned().map(Collection::singleton).unwrap_or_default()
            }
            _ => Collection::empty(),
        };
        Ok((result, ctx))
    }

    fn eval_polarity(&self, p: &PolarityExpr, ctx: &Context) -> Result<(Collection, Context), EvalError> {
        let operand = self.eval(&p.operand().ok_or_else(missing("polarity operand"))?, ctx)?;
        if !p.is_negative() {
            return Ok((operand, ctx.clone()));
        }
        let negated = match operand.as_singleton() {
            Some(Value::Integer(n)) => Some(Value::Integer(-n)),
            Some(Value::Decimal(d)) => Some(Value::Decimal(-d)),
            Some(Value::Quantity(q)) => Some(Value::Quantity(Quantity::new(-q.value, q.unit.clone()))),
            _ => None,
        };
        Ok((negated.map(Collection::singleton).unwrap_or_default(), ctx.clone()))
    }

    fn eval_type_expr(&self, e: &TypeExpr, ctx: &Context) -> Result<(Collection, Context), EvalError> {
        let operand = self.eval(&e.operand().ok_or_else(missing("type expr operand"))?, ctx)?;
        let type_specifier = e.type_specifier().map(|t| t.segments()).unwrap_or_default();
        let bare = type_specifier.last().cloned().unwrap_or_default();
        let result = registry::eval_type_op(e.is_as(), operand, &bare)?;
        Ok((result, ctx.clone()))
    }

    fn eval_logical(
        &self,
        kind: SyntaxKind,
        lhs_expr: Option<Expr>,
        rhs_expr: Option<Expr>,
        ctx: &Context,
    ) -> Result<(Collection, Context), EvalError> {
        let lhs = self.eval(&lhs_expr.ok_or_else(missing("logical lhs"))?, ctx)?;
        let rhs_expr = rhs_expr.ok_or_else(missing("logical rhs"))?;
        let thunk = ExprThunk { evaluator: self, expr: rhs_expr };
        Ok((registry::eval_logical(kind, ctx, lhs, &thunk)?, ctx.clone()))
    }

    fn eval_function_call(
        &self,
        call: &FunctionCallExpr,
        input: Collection,
        ctx: &Context,
    ) -> Result<(Collection, Context), EvalError> {
        let name = call.name_ref().map(|n| n.text()).unwrap_or_default();
        let spec = self
            .registry
            .get(&name)
            .ok_or_else(|| EvalError::Internal(format!("unknown function '{name}'")))?;
        let arg_exprs: Vec<Expr> = call.arg_list().map(|al| al.args().collect()).unwrap_or_default();

        let thunks: Vec<Option<ExprThunk>> = spec
            .params
            .iter()
            .enumerate()
            .map(|(i, param)| {
                let expr = arg_exprs.get(i)?;
                matches!(param.kind, ParamKind::Expression)
                    .then(|| ExprThunk { evaluator: self, expr: expr.clone() })
            })
            .collect();

        let mut args = Vec::with_capacity(spec.params.len());
        for (i, param) in spec.params.iter().enumerate() {
            let Some(expr) = arg_exprs.get(i) else { continue };
            let arg = match param.kind {
                ParamKind::Expression => Arg::Lazy(thunks[i].as_ref().expect("expression thunk built above")),
                ParamKind::Value => Arg::Value(self.eval(expr, ctx)?),
                ParamKind::TypeSpecifier => Arg::Value(Collection::singleton(Value::from(type_specifier_text(expr)))),
            };
            args.push(arg);
        }

        let call_struct = Call { input, context: ctx.clone(), args, model: self.model.as_ref() };
        let (result, new_ctx) = (spec.evaluate)(&call_struct)?;
        if name == "trace" {
            if let Some(sink) = &self.trace {
                let label = call_struct
                    .eval_arg(0, &new_ctx)
                    .ok()
                    .and_then(|c| c.as_singleton().map(|v| v.to_string()))
                    .unwrap_or_default();
                let projected = registry::trace_projection(&call_struct, &new_ctx)?;
                sink.trace(&label, &projected);
            }
        }
        Ok((result, new_ctx))
    }
}

fn external_constant_name(raw: &str) -> String {
    let name = raw.trim_start_matches('%');
    if name.starts_with('\'') {
        registry::unescape_string(name)
    } else if name.starts_with('`') {
        registry::unescape_delimited_ident(name)
    } else {
        name.to_string()
    }
}

/// Reconstructs the dotted name of a type-specifier argument from its
/// expression shape (`FHIR.Patient`, or a bare `Patient`) — `ofType`'s
/// argument is parsed as an ordinary dotted identifier chain, not through
/// [`fhirpath_parser::cst::TypeSpecifier`], which only appears after `is`/`as`.
fn type_specifier_text(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(i) => i.name_ref().map(|n| n.text()).unwrap_or_default(),
        Expr::Invocation(inv) => match inv.member() {
            Some(Member::Name(n)) => n.text(),
            Some(Member::Call(c)) => c.name_ref().map(|n| n.text()).unwrap_or_default(),
            None => String::new(),
        },
        _ => String::new(),
    }
}

fn op_kind(token: Option<fhirpath_parser::SyntaxToken>, default: SyntaxKind) -> SyntaxKind {
    token.map(|t| t.kind()).unwrap_or(default)
}

fn missing(what: &'static str) -> impl FnOnce() -> EvalError {
    move || EvalError::Internal(format!("malformed syntax tree: missing {what}"))
}

struct ExprThunk<'a> {
    evaluator: &'a Evaluator,
    expr: Expr,
}

impl<'a> Evaluable for ExprThunk<'a> {
    fn eval(&self, ctx: &Context) -> Result<Collection, EvalError> {
        self.evaluator.eval(&self.expr, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FhirObject;
    use fhirpath_parser::Parser;
    use std::sync::Arc as StdArc;

    fn eval_str(src: &str, root: Collection) -> Collection {
        let tree = Parser::new(src).parse();
        let source_file = fhirpath_parser::cst::SourceFile::cast(tree.syntax()).expect("source file");
        let expr = source_file.expr().expect("expression");
        let evaluator = Evaluator::new(None);
        let ctx = Context::root(root);
        evaluator.eval(&expr, &ctx).expect("evaluation")
    }

    fn patient(given: &str, family: &str) -> Value {
        let name = FhirObject::new(Some("HumanName"))
            .with_field("given", Collection::singleton(Value::from(given)))
            .with_field("family", Collection::singleton(Value::from(family)));
        let patient = FhirObject::new(Some("Patient"))
            .with_field("name", Collection::singleton(Value::Object(StdArc::new(name))));
        Value::Object(StdArc::new(patient))
    }

    #[test]
    fn navigates_nested_properties() {
        let root = Collection::singleton(patient("Jim", "Smith"));
        let result = eval_str("name.given", root);
        assert_eq!(result.as_singleton(), Some(&Value::from("Jim")));
    }

    #[test]
    fn where_filters_by_boolean_criterion() {
        let root = Collection::from_values([Value::Integer(1), Value::Integer(2), Value::Integer(3)]);
        let result = eval_str("where($this > 1)", root);
        assert_eq!(result.into_values(), vec![Value::Integer(2), Value::Integer(3)]);
    }

    #[test]
    fn and_short_circuits_on_false_lhs() {
        let result = eval_str("false and (1/0 > 0)", Collection::empty());
        assert_eq!(result.as_singleton(), Some(&Value::Boolean(false)));
    }

    #[test]
    fn define_variable_is_visible_to_the_rest_of_the_pipeline() {
        let root = Collection::singleton(Value::Integer(5));
        let result = eval_str("defineVariable('x', 1).select(%x + $this)", root);
        assert_eq!(result.as_singleton(), Some(&Value::Integer(6)));
    }

    #[test]
    fn iif_returns_empty_for_a_non_boolean_condition() {
        let result = eval_str("iif(1, 'yes', 'no')", Collection::empty());
        assert!(result.is_empty());
    }

    #[test]
    fn exists_with_no_criterion_reports_non_emptiness_of_the_input() {
        let root = Collection::singleton(patient("Jim", "Smith"));
        assert_eq!(eval_str("name.exists()", root).as_singleton(), Some(&Value::Boolean(true)));
        assert_eq!(
            eval_str("name.exists()", Collection::empty()).as_singleton(),
            Some(&Value::Boolean(false))
        );
    }

    #[test]
    fn substring_with_omitted_length_runs_to_the_end_of_the_string() {
        let result = eval_str("'abc'.substring(1)", Collection::empty());
        assert_eq!(result.as_singleton(), Some(&Value::from("bc")));
    }

    #[test]
    fn define_variable_with_no_expr_binds_the_input_itself() {
        let root = Collection::singleton(Value::Integer(7));
        let result = eval_str("defineVariable('x').select(%x)", root);
        assert_eq!(result.as_singleton(), Some(&Value::Integer(7)));
    }
}
