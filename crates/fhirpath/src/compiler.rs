//! The compiler (§4.9): lowers a parsed expression once into a tree of
//! owned [`Node`]s, independent of the syntax tree that produced it, so
//! repeated evaluation (batch processing, a hot validation rule) skips
//! re-walking and re-dispatching from the CST every time.
//!
//! Every function body still lives in [`crate::registry::functions`] —
//! [`Node`] implements [`Evaluable`] the same way [`crate::evaluator`]'s
//! CST thunk does, so lowering reuses the registry rather than duplicating
//! semantics in a second form.

use crate::context::Context;
use crate::error::EvalError;
use crate::evaluator::TraceSink;
use crate::model::ModelProvider;
use crate::registry::{self, Arg, Call, Evaluable, FunctionSpec, ParamKind, Registry};
use crate::value::{Collection, Quantity, Value};
use fhirpath_parser::cst::{self, Expr, Member as CstMember};
use fhirpath_parser::SyntaxKind;
use std::sync::Arc;

/// A compiled expression, ready to run against any [`Context`] sharing the
/// [`ModelProvider`] it was compiled against.
pub struct Program {
    root: Node,
    model: Option<Arc<dyn ModelProvider>>,
    trace: Option<Arc<dyn TraceSink>>,
}

impl Program {
    /// Observe `trace()` calls reached while evaluating this program, the
    /// same audit hook [`crate::evaluator::Evaluator::with_trace_sink`]
    /// offers the tree-walker — the two engines must agree on what `trace()`
    /// does, not just on the collection it returns (§4.8, §4.9).
    pub fn with_trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.trace = Some(sink);
        self
    }

    pub fn eval(&self, ctx: &Context) -> Result<Collection, EvalError> {
        eval_node(&self.root, ctx, self.model.as_ref(), self.trace.as_ref()).map(|(value, _)| value)
    }

    /// Build a fresh root [`Context`] over `input`, bind each `env` variable
    /// into it, and evaluate. `env` entries for reserved names (`context`,
    /// `resource`, `rootResource`, `ucum`) are silently ignored, same as
    /// [`Context::set_variable`].
    pub fn execute(
        &self,
        input: Collection,
        env: impl IntoIterator<Item = (String, Collection)>,
    ) -> Result<Collection, EvalError> {
        let mut ctx = Context::root(input);
        for (name, value) in env {
            ctx = ctx.set_variable(&name, value, true);
        }
        self.eval(&ctx)
    }
}

/// Lowers `expr` into a [`Program`] using `registry` for function/operator
/// metadata. Call once per distinct expression text; reuse the result. Wire
/// a [`TraceSink`] afterward with [`Program::with_trace_sink`] if the host
/// wants `trace()` calls observed.
pub fn compile(expr: &Expr, registry: &Registry, model: Option<Arc<dyn ModelProvider>>) -> Result<Program, EvalError> {
    let root = lower(expr, registry)?;
    Ok(Program { root, model, trace: None })
}

enum Member {
    Name(String),
    Call { spec: FunctionSpec, args: Vec<CompiledArg> },
}

enum CompiledArg {
    Value(Node),
    Expression(Node),
    Type(String),
}

enum Node {
    Literal(Collection),
    SpecialVariable(String),
    ExternalConstant(String),
    Identifier(String),
    Paren(Box<Node>),
    Collection(Vec<Node>),
    Invocation { target: Box<Node>, member: Member },
    Index { target: Box<Node>, index: Box<Node> },
    Polarity { negative: bool, operand: Box<Node> },
    Additive(SyntaxKind, Box<Node>, Box<Node>),
    Multiplicative(SyntaxKind, Box<Node>, Box<Node>),
    Union(Box<Node>, Box<Node>),
    Inequality(SyntaxKind, Box<Node>, Box<Node>),
    Equality(SyntaxKind, Box<Node>, Box<Node>),
    Membership(SyntaxKind, Box<Node>, Box<Node>),
    Logical(SyntaxKind, Box<Node>, Box<Node>),
    TypeOp { is_cast: bool, type_name: String, operand: Box<Node> },
    Call { spec: FunctionSpec, args: Vec<CompiledArg> },
    Error,
}

/// Bridges a compiled node back into [`Arg::Lazy`]'s expectations, the same
/// role [`crate::evaluator`]'s CST thunk plays for the tree-walker.
struct NodeThunk<'a> {
    node: &'a Node,
    model: Option<&'a Arc<dyn ModelProvider>>,
    trace: Option<&'a Arc<dyn TraceSink>>,
}

impl<'a> Evaluable for NodeThunk<'a> {
    fn eval(&self, ctx: &Context) -> Result<Collection, EvalError> {
        eval_node(self.node, ctx, self.model, self.trace).map(|(value, _)| value)
    }
}

fn lower(expr: &Expr, registry: &Registry) -> Result<Node, EvalError> {
    Ok(match expr {
        Expr::Literal(lit) => Node::Literal(Collection::singleton(registry::parse_literal(lit)?)),
        Expr::Quantity(q) => Node::Literal(Collection::singleton(registry::parse_quantity(q)?)),
        Expr::SpecialVariable(sv) => {
            let token = sv.token().ok_or_else(missing("special variable"))?;
            Node::SpecialVariable(token.text().trim_start_matches('$').to_string())
        }
        Expr::ExternalConstant(ec) => {
            let token = ec.token().ok_or_else(missing("external constant"))?;
            Node::ExternalConstant(external_constant_name(token.text()))
        }
        Expr::Paren(p) => match p.inner() {
            Some(inner) => Node::Paren(Box::new(lower(&inner, registry)?)),
            None => Node::Error,
        },
        Expr::Collection(c) => Node::Collection(
            c.elements().map(|e| lower(&e, registry)).collect::<Result<Vec<_>, _>>()?,
        ),
        Expr::Identifier(ident) => {
            if let Some(call) = ident.function_call() {
                lower_call(&call, registry)?
            } else if let Some(name_ref) = ident.name_ref() {
                Node::Identifier(name_ref.text())
            } else {
                Node::Error
            }
        }
        Expr::FunctionCall(fc) => lower_call(fc, registry)?,
        Expr::Invocation(inv) => {
            let target = Box::new(lower(&inv.target().ok_or_else(missing("invocation target"))?, registry)?);
            let member = match inv.member() {
                Some(CstMember::Name(n)) => Member::Name(n.text()),
                Some(CstMember::Call(c)) => match lower_call(&c, registry)? {
                    Node::Call { spec, args } => Member::Call { spec, args },
                    _ => unreachable!("lower_call always returns Node::Call"),
                },
                None => Member::Name(String::new()),
            };
            Node::Invocation { target, member }
        }
        Expr::Index(ix) => Node::Index {
            target: Box::new(lower(&ix.target().ok_or_else(missing("index target"))?, registry)?),
            index: Box::new(lower(&ix.index().ok_or_else(missing("index expression"))?, registry)?),
        },
        Expr::Polarity(p) => Node::Polarity {
            negative: p.is_negative(),
            operand: Box::new(lower(&p.operand().ok_or_else(missing("polarity operand"))?, registry)?),
        },
        Expr::Multiplicative(e) => binary(Node::Multiplicative, e.lhs(), e.rhs(), e.op_token(), SyntaxKind::STAR, registry)?,
        Expr::Additive(e) => binary(Node::Additive, e.lhs(), e.rhs(), e.op_token(), SyntaxKind::PLUS, registry)?,
        Expr::Union(e) => Node::Union(
            Box::new(lower(&e.lhs().ok_or_else(missing("union lhs"))?, registry)?),
            Box::new(lower(&e.rhs().ok_or_else(missing("union rhs"))?, registry)?),
        ),
        Expr::Inequality(e) => binary(Node::Inequality, e.lhs(), e.rhs(), e.op_token(), SyntaxKind::LT, registry)?,
        Expr::Equality(e) => binary(Node::Equality, e.lhs(), e.rhs(), e.op_token(), SyntaxKind::EQ, registry)?,
        Expr::Membership(e) => binary(Node::Membership, e.lhs(), e.rhs(), e.op_token(), SyntaxKind::in_KW, registry)?,
        Expr::And(e) => logical(e.lhs(), e.rhs(), SyntaxKind::and_KW, registry)?,
        Expr::Or(e) => logical(e.lhs(), e.rhs(), SyntaxKind::or_KW, registry)?,
        Expr::Xor(e) => logical(e.lhs(), e.rhs(), SyntaxKind::xor_KW, registry)?,
        Expr::Implies(e) => logical(e.lhs(), e.rhs(), SyntaxKind::implies_KW, registry)?,
        Expr::Type(e) => {
            let operand = Box::new(lower(&e.operand().ok_or_else(missing("type expr operand"))?, registry)?);
            let type_name = e.type_specifier().map(|t| t.segments()).unwrap_or_default().last().cloned().unwrap_or_default();
            Node::TypeOp { is_cast: e.is_as(), type_name, operand }
        }
        Expr::Error(_) | Expr::Incomplete(_) => Node::Error,
    })
}

fn binary(
    make: impl FnOnce(SyntaxKind, Box<Node>, Box<Node>) -> Node,
    lhs: Option<Expr>,
    rhs: Option<Expr>,
    op_token: Option<fhirpath_parser::SyntaxToken>,
    default: SyntaxKind,
    registry: &Registry,
) -> Result<Node, EvalError> {
    let lhs = lower(&lhs.ok_or_else(missing("binary lhs"))?, registry)?;
    let rhs = lower(&rhs.ok_or_else(missing("binary rhs"))?, registry)?;
    let op = op_token.map(|t| t.kind()).unwrap_or(default);
    Ok(make(op, Box::new(lhs), Box::new(rhs)))
}

fn logical(lhs: Option<Expr>, rhs: Option<Expr>, kind: SyntaxKind, registry: &Registry) -> Result<Node, EvalError> {
    let lhs = lower(&lhs.ok_or_else(missing("logical lhs"))?, registry)?;
    let rhs = lower(&rhs.ok_or_else(missing("logical rhs"))?, registry)?;
    Ok(Node::Logical(kind, Box::new(lhs), Box::new(rhs)))
}

fn lower_call(call: &cst::FunctionCallExpr, registry: &Registry) -> Result<Node, EvalError> {
    let name = call.name_ref().map(|n| n.text()).unwrap_or_default();
    let spec = *registry
        .get(&name)
        .ok_or_else(|| EvalError::Internal(format!("unknown function '{name}'")))?;
    let arg_exprs: Vec<Expr> = call.arg_list().map(|al| al.args().collect()).unwrap_or_default();

    let mut args = Vec::with_capacity(spec.params.len());
    for (i, param) in spec.params.iter().enumerate() {
        let Some(expr) = arg_exprs.get(i) else { continue };
        let arg = match param.kind {
            ParamKind::Value => CompiledArg::Value(lower(expr, registry)?),
            ParamKind::Expression => CompiledArg::Expression(lower(expr, registry)?),
            ParamKind::TypeSpecifier => CompiledArg::Type(type_specifier_text(expr)),
        };
        args.push(arg);
    }
    Ok(Node::Call { spec, args })
}

fn type_specifier_text(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(i) => i.name_ref().map(|n| n.text()).unwrap_or_default(),
        Expr::Invocation(inv) => match inv.member() {
            Some(CstMember::Name(n)) => n.text(),
            Some(CstMember::Call(c)) => c.name_ref().map(|n| n.text()).unwrap_or_default(),
            None => String::new(),
        },
        _ => String::new(),
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

fn missing(what: &'static str) -> impl FnOnce() -> EvalError {
    move || EvalError::Internal(format!("malformed syntax tree: missing {what}"))
}

fn eval_node(
    node: &Node,
    ctx: &Context,
    model: Option<&Arc<dyn ModelProvider>>,
    trace: Option<&Arc<dyn TraceSink>>,
) -> Result<(Collection, Context), EvalError> {
    match node {
        Node::Literal(value) => Ok((value.clone(), ctx.clone())),
        Node::SpecialVariable(name) => Ok((ctx.get_variable(name).unwrap_or_default(), ctx.clone())),
        Node::ExternalConstant(name) => Ok((ctx.get_variable(name).unwrap_or_default(), ctx.clone())),
        Node::Identifier(name) => Ok((ctx.focus().navigate(name), ctx.clone())),
        Node::Paren(inner) => eval_node(inner, ctx, model, trace),
        Node::Collection(elements) => {
            let mut out = Collection::empty();
            for el in elements {
                out.extend(eval_node(el, ctx, model, trace)?.0);
            }
            Ok((out, ctx.clone()))
        }
        Node::Invocation { target, member } => {
            let (target_value, ctx) = eval_node(target, ctx, model, trace)?;
            match member {
                Member::Name(name) => Ok((target_value.navigate(name), ctx)),
                Member::Call { spec, args } => eval_call(spec, args, target_value, &ctx, model, trace),
            }
        }
        Node::Index { target, index } => {
            let (target_value, ctx) = eval_node(target, ctx, model, trace)?;
            let index_value = eval_node(index, &ctx, model, trace)?.0;
            let result = match index_value.as_singleton() {
                Some(Value::Integer(i)) if *i >= 0 => {
                    target_value.get(*i as usize).cloned().map(Collection::singleton).unwrap_or_default()
                }
                _ => Collection::empty(),
            };
            Ok((result, ctx))
        }
        Node::Polarity { negative, operand } => {
            let (value, ctx) = eval_node(operand, ctx, model, trace)?;
            if !negative {
                return Ok((value, ctx));
            }
            let negated = match value.as_singleton() {
                Some(Value::Integer(n)) => Some(Value::Integer(-n)),
                Some(Value::Decimal(d)) => Some(Value::Decimal(-d)),
                Some(Value::Quantity(q)) => Some(Value::Quantity(Quantity::new(-q.value, q.unit.clone()))),
                _ => None,
            };
            Ok((negated.map(Collection::singleton).unwrap_or_default(), ctx))
        }
        Node::Additive(op, lhs, rhs) => {
            let l = eval_node(lhs, ctx, model, trace)?.0;
            let r = eval_node(rhs, ctx, model, trace)?.0;
            Ok((registry::eval_additive(*op, l, r)?, ctx.clone()))
        }
        Node::Multiplicative(op, lhs, rhs) => {
            let l = eval_node(lhs, ctx, model, trace)?.0;
            let r = eval_node(rhs, ctx, model, trace)?.0;
            Ok((registry::eval_multiplicative(*op, l, r)?, ctx.clone()))
        }
        Node::Union(lhs, rhs) => {
            let l = eval_node(lhs, ctx, model, trace)?.0;
            let r = eval_node(rhs, ctx, model, trace)?.0;
            Ok((registry::union_dedup([l, r]), ctx.clone()))
        }
        Node::Inequality(op, lhs, rhs) => {
            let l = eval_node(lhs, ctx, model, trace)?.0;
            let r = eval_node(rhs, ctx, model, trace)?.0;
            Ok((registry::eval_inequality(*op, l, r), ctx.clone()))
        }
        Node::Equality(op, lhs, rhs) => {
            let l = eval_node(lhs, ctx, model, trace)?.0;
            let r = eval_node(rhs, ctx, model, trace)?.0;
            Ok((registry::eval_equality(*op, l, r), ctx.clone()))
        }
        Node::Membership(op, lhs, rhs) => {
            let l = eval_node(lhs, ctx, model, trace)?.0;
            let r = eval_node(rhs, ctx, model, trace)?.0;
            Ok((registry::eval_membership(*op, l, r), ctx.clone()))
        }
        Node::Logical(kind, lhs, rhs) => {
            let l = eval_node(lhs, ctx, model, trace)?.0;
            let thunk = NodeThunk { node: rhs, model, trace };
            Ok((registry::eval_logical(*kind, ctx, l, &thunk)?, ctx.clone()))
        }
        Node::TypeOp { is_cast, type_name, operand } => {
            let (value, ctx) = eval_node(operand, ctx, model, trace)?;
            Ok((registry::eval_type_op(*is_cast, value, type_name)?, ctx))
        }
        Node::Call { spec, args } => eval_call(spec, args, ctx.focus().clone(), ctx, model, trace),
        Node::Error => Ok((Collection::empty(), ctx.clone())),
    }
}

fn eval_call(
    spec: &FunctionSpec,
    compiled_args: &[CompiledArg],
    input: Collection,
    ctx: &Context,
    model: Option<&Arc<dyn ModelProvider>>,
    trace: Option<&Arc<dyn TraceSink>>,
) -> Result<(Collection, Context), EvalError> {
    let mut value_cache: Vec<Option<Collection>> = Vec::with_capacity(compiled_args.len());
    for arg in compiled_args {
        value_cache.push(match arg {
            CompiledArg::Value(node) => Some(eval_node(node, ctx, model, trace)?.0),
            CompiledArg::Type(name) => Some(Collection::singleton(Value::from(name.clone()))),
            CompiledArg::Expression(_) => None,
        });
    }
    let thunks: Vec<Option<NodeThunk>> = compiled_args
        .iter()
        .map(|arg| match arg {
            CompiledArg::Expression(node) => Some(NodeThunk { node, model, trace }),
            _ => None,
        })
        .collect();

    let args: Vec<Arg> = compiled_args
        .iter()
        .enumerate()
        .map(|(i, arg)| match arg {
            CompiledArg::Expression(_) => Arg::Lazy(thunks[i].as_ref().expect("expression thunk built above")),
            _ => Arg::Value(value_cache[i].clone().expect("value arg cached above")),
        })
        .collect();

    let call = Call { input, context: ctx.clone(), args, model };
    let (result, new_ctx) = (spec.evaluate)(&call)?;
    // `trace()` is an audit hook the caller observes, not a value the
    // registry entry itself can produce — mirrors `Evaluator::eval_function_call`
    // so a compiled `Program` and the tree-walker agree on this side effect.
    if spec.name == "trace" {
        if let Some(sink) = trace {
            let label = call
                .eval_arg(0, &new_ctx)
                .ok()
                .and_then(|c| c.as_singleton().map(|v| v.to_string()))
                .unwrap_or_default();
            let projected = registry::trace_projection(&call, &new_ctx)?;
            sink.trace(&label, &projected);
        }
    }
    Ok((result, new_ctx))
}
