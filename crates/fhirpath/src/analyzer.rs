//! The static type analyzer (§4.6, §4.9): annotates a parsed expression
//! with [`TypeInfo`] via a [`ModelProvider`], without evaluating anything.
//!
//! Functions get one generic analysis rule here — arity against
//! [`crate::registry::Param`] and the declared [`OutputCardinality`] — rather
//! than a per-function type-check pointer; few entries in the catalog need
//! anything sharper than that (see the [`crate::registry`] module doc).

use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticCollector, Severity};
use crate::model::{ModelProvider, TypeInfo, TypeRef};
use crate::registry::{OutputCardinality, ParamKind, Registry};
use fhirpath_parser::cst::{CstNode, Expr, Member};
use fhirpath_parser::SyntaxNode;
use std::sync::Arc;

fn range(node: &SyntaxNode) -> (usize, usize) {
    let r = node.text_range();
    (u32::from(r.start()) as usize, u32::from(r.end()) as usize)
}

/// Walks an [`Expr`] tree bottom-up, threading the "current input type"
/// the way the evaluator threads the current focus collection.
pub struct TypeAnalyzer<'a> {
    registry: &'a Registry,
    model: &'a Arc<dyn ModelProvider>,
}

impl<'a> TypeAnalyzer<'a> {
    pub fn new(registry: &'a Registry, model: &'a Arc<dyn ModelProvider>) -> Self {
        Self { registry, model }
    }

    /// Analyze `expr` assuming its input is `root_type` (the declared
    /// resource/context type), recording problems into `diagnostics` and
    /// returning the expression's inferred result type.
    pub fn analyze(&self, expr: &Expr, root_type: &TypeInfo, diagnostics: &mut DiagnosticCollector) -> TypeInfo {
        match expr {
            Expr::Literal(lit) => self.literal_type(lit),
            Expr::Quantity(_) => TypeInfo::singleton(TypeRef::new("Quantity")),
            Expr::SpecialVariable(sv) => {
                let text = sv.token().map(|t| t.text().to_string()).unwrap_or_default();
                match text.as_str() {
                    "$index" => TypeInfo::singleton(TypeRef::new("Integer")),
                    "$total" => TypeInfo::any(),
                    // `$this` (and any unrecognized special variable) takes on
                    // the narrowed input type in scope at this point.
                    _ => root_type.clone(),
                }
            }
            Expr::ExternalConstant(_) => TypeInfo::any(),
            Expr::Paren(p) => match p.inner() {
                Some(inner) => self.analyze(&inner, root_type, diagnostics),
                None => TypeInfo::any(),
            },
            Expr::Collection(c) => {
                let mut element = None;
                for el in c.elements() {
                    let ty = self.analyze(&el, root_type, diagnostics);
                    element = Some(match element {
                        None => ty.ty,
                        Some(prev) => self.model.common_type(&[prev, ty.ty]).unwrap_or(TypeRef::any()),
                    });
                }
                TypeInfo::collection(element.unwrap_or(TypeRef::any()))
            }
            Expr::Identifier(ident) => {
                if let Some(call) = ident.function_call() {
                    self.analyze_call(&call.name_ref().map(|n| n.text()).unwrap_or_default(), call.arg_list().map(|al| al.args().collect()).unwrap_or_default(), root_type, root_type, diagnostics, expr)
                } else if let Some(name_ref) = ident.name_ref() {
                    self.navigate_type(root_type, &name_ref.text(), expr, diagnostics)
                } else {
                    TypeInfo::any()
                }
            }
            Expr::FunctionCall(fc) => {
                let name = fc.name_ref().map(|n| n.text()).unwrap_or_default();
                let args = fc.arg_list().map(|al| al.args().collect()).unwrap_or_default();
                self.analyze_call(&name, args, root_type, root_type, diagnostics, expr)
            }
            Expr::Invocation(inv) => {
                let target_ty = match inv.target() {
                    Some(t) => self.analyze(&t, root_type, diagnostics),
                    None => TypeInfo::any(),
                };
                match inv.member() {
                    Some(Member::Name(name_ref)) => self.navigate_type(&target_ty, &name_ref.text(), expr, diagnostics),
                    Some(Member::Call(fc)) => {
                        let name = fc.name_ref().map(|n| n.text()).unwrap_or_default();
                        let args = fc.arg_list().map(|al| al.args().collect()).unwrap_or_default();
                        self.analyze_call(&name, args, &target_ty, root_type, diagnostics, expr)
                    }
                    None => TypeInfo::any(),
                }
            }
            Expr::Index(ix) => {
                let target_ty = match ix.target() {
                    Some(t) => self.analyze(&t, root_type, diagnostics),
                    None => TypeInfo::any(),
                };
                if let Some(index_expr) = ix.index() {
                    let index_ty = self.analyze(&index_expr, root_type, diagnostics);
                    if index_ty.ty.as_str() != "Integer" && index_ty.ty.as_str() != "Any" {
                        let (start, end) = range(index_expr.syntax());
                        diagnostics.push(Diagnostic::type_mismatch(
                            format!("index must be an Integer, found {}", index_ty.ty),
                            start,
                            end,
                        ));
                    }
                }
                target_ty.with_singleton(true)
            }
            Expr::Polarity(p) => match p.operand() {
                Some(operand) => self.analyze(&operand, root_type, diagnostics),
                None => TypeInfo::any(),
            },
            Expr::Multiplicative(e) => self.analyze_numeric_binary(e.lhs(), e.rhs(), root_type, diagnostics),
            Expr::Additive(e) => self.analyze_numeric_binary(e.lhs(), e.rhs(), root_type, diagnostics),
            Expr::Union(e) => {
                let lhs = e.lhs().map(|x| self.analyze(&x, root_type, diagnostics));
                let rhs = e.rhs().map(|x| self.analyze(&x, root_type, diagnostics));
                let ty = match (lhs, rhs) {
                    (Some(l), Some(r)) => self.model.common_type(&[l.ty, r.ty]).unwrap_or(TypeRef::any()),
                    _ => TypeRef::any(),
                };
                TypeInfo::collection(ty)
            }
            Expr::Inequality(e) => {
                self.analyze_opt(e.lhs(), root_type, diagnostics);
                self.analyze_opt(e.rhs(), root_type, diagnostics);
                TypeInfo::singleton(TypeRef::new("Boolean"))
            }
            Expr::Equality(e) => {
                self.analyze_opt(e.lhs(), root_type, diagnostics);
                self.analyze_opt(e.rhs(), root_type, diagnostics);
                TypeInfo::singleton(TypeRef::new("Boolean"))
            }
            Expr::Membership(e) => {
                self.analyze_opt(e.lhs(), root_type, diagnostics);
                self.analyze_opt(e.rhs(), root_type, diagnostics);
                TypeInfo::singleton(TypeRef::new("Boolean"))
            }
            Expr::And(e) => self.analyze_logical(e.lhs(), e.rhs(), root_type, diagnostics),
            Expr::Or(e) => self.analyze_logical(e.lhs(), e.rhs(), root_type, diagnostics),
            Expr::Xor(e) => self.analyze_logical(e.lhs(), e.rhs(), root_type, diagnostics),
            Expr::Implies(e) => self.analyze_logical(e.lhs(), e.rhs(), root_type, diagnostics),
            Expr::Type(e) => {
                let operand_ty = self.analyze_opt(e.operand(), root_type, diagnostics);
                let segments = e.type_specifier().map(|t| t.segments()).unwrap_or_default();
                let bare = segments.last().cloned().unwrap_or_default();
                // `is`/`as`/`ofType(T)` against a choice/union type (e.g. a FHIR
                // `value[x]` element the model provider surfaced with `choices`
                // set) warns when `T` isn't one of the union's element types —
                // a mode-independent advisory, not something Strict promotes.
                if let Some(choices) = &operand_ty.choices {
                    if !bare.is_empty() && !choices.iter().any(|c| c.as_str().eq_ignore_ascii_case(&bare)) {
                        let (start, end) = range(expr.syntax());
                        let known = choices.iter().map(TypeRef::as_str).collect::<Vec<_>>().join(", ");
                        diagnostics.push(Diagnostic::new(
                            DiagnosticCode::AmbiguousNavigation,
                            format!("'{bare}' is not one of this union's types ({known})"),
                            start,
                            end,
                        ));
                    }
                }
                match self.model.resolve_type(&bare) {
                    Some(ty) if e.is_as() => TypeInfo::singleton(ty),
                    Some(_) => TypeInfo::singleton(TypeRef::new("Boolean")),
                    None => {
                        let (start, end) = range(expr.syntax());
                        diagnostics.push(Diagnostic::unknown_type(&bare, start, end));
                        if e.is_as() { TypeInfo::any() } else { TypeInfo::singleton(TypeRef::new("Boolean")) }
                    }
                }
            }
            Expr::Error(_) | Expr::Incomplete(_) => TypeInfo::any(),
        }
    }

    fn analyze_opt(&self, expr: Option<Expr>, root_type: &TypeInfo, diagnostics: &mut DiagnosticCollector) -> TypeInfo {
        match expr {
            Some(e) => self.analyze(&e, root_type, diagnostics),
            None => TypeInfo::any(),
        }
    }

    fn analyze_numeric_binary(
        &self,
        lhs: Option<Expr>,
        rhs: Option<Expr>,
        root_type: &TypeInfo,
        diagnostics: &mut DiagnosticCollector,
    ) -> TypeInfo {
        let lhs = self.analyze_opt(lhs, root_type, diagnostics);
        let rhs = self.analyze_opt(rhs, root_type, diagnostics);
        let ty = self.model.common_type(&[lhs.ty, rhs.ty]).unwrap_or(TypeRef::any());
        TypeInfo::singleton(ty)
    }

    fn analyze_logical(
        &self,
        lhs: Option<Expr>,
        rhs: Option<Expr>,
        root_type: &TypeInfo,
        diagnostics: &mut DiagnosticCollector,
    ) -> TypeInfo {
        self.analyze_opt(lhs, root_type, diagnostics);
        self.analyze_opt(rhs, root_type, diagnostics);
        TypeInfo::singleton(TypeRef::new("Boolean"))
    }

    fn literal_type(&self, lit: &fhirpath_parser::cst::LiteralExpr) -> TypeInfo {
        use fhirpath_parser::SyntaxKind::*;
        let kind = lit.token().map(|t| t.kind());
        let name = match kind {
            Some(true_KW) | Some(false_KW) => "Boolean",
            Some(INT_NUMBER) => "Integer",
            Some(DEC_NUMBER) => "Decimal",
            Some(STRING) => "String",
            Some(DATE_LITERAL) => "Date",
            Some(DATETIME_LITERAL) => "DateTime",
            Some(TIME_LITERAL) => "Time",
            _ => "Any",
        };
        TypeInfo::singleton(TypeRef::new(name))
    }

    /// Resolves a property or root type-name reference against `base`,
    /// widening to a collection when `base` isn't a singleton (implicit
    /// per-element navigation, §4.6).
    fn navigate_type(&self, base: &TypeInfo, name: &str, expr: &Expr, diagnostics: &mut DiagnosticCollector) -> TypeInfo {
        if self.model.resolve_type(name).as_ref() == Some(&base.ty) {
            return base.clone();
        }
        match self.model.property_type(&base.ty, name) {
            Some(found) => {
                if base.is_singleton {
                    found
                } else {
                    found.with_singleton(false)
                }
            }
            None => {
                let (start, end) = range(expr.syntax());
                // Unknown *properties* are a warning in lenient mode, an error in
                // strict mode (spec.md's analyzer contract) — `analyze()` (lib.rs)
                // promotes every Warning to an Error when `AnalyzeMode::Strict` is
                // requested, so this only needs to report the lenient default here.
                diagnostics.push(Diagnostic::unknown_type(name, start, end).with_severity(Severity::Warning));
                TypeInfo::any()
            }
        }
    }

    fn analyze_call(
        &self,
        name: &str,
        arg_exprs: Vec<Expr>,
        input_type: &TypeInfo,
        root_type: &TypeInfo,
        diagnostics: &mut DiagnosticCollector,
        call_expr: &Expr,
    ) -> TypeInfo {
        let Some(spec) = self.registry.get(name) else {
            let (start, end) = range(call_expr.syntax());
            diagnostics.push(Diagnostic::unknown_function(name, start, end));
            return TypeInfo::any();
        };

        let required = spec.params.iter().filter(|p| !p.optional).count();
        if arg_exprs.len() < required || arg_exprs.len() > spec.params.len() {
            let expected = if required == spec.params.len() {
                format!("{required}")
            } else {
                format!("{required}-{}", spec.params.len())
            };
            let (start, end) = range(call_expr.syntax());
            diagnostics.push(Diagnostic::wrong_arity(name, &expected, arg_exprs.len(), start, end));
        }

        // Expression-kind parameters evaluate once per element of the
        // input collection ($this rebound each iteration); analyze them
        // against a singleton view of the input type rather than root.
        let element_type = input_type.clone().with_singleton(true);
        for (param, expr) in spec.params.iter().zip(arg_exprs.iter()) {
            match param.kind {
                ParamKind::Expression => {
                    self.analyze(expr, &element_type, diagnostics);
                }
                ParamKind::Value => {
                    self.analyze(expr, root_type, diagnostics);
                }
                ParamKind::TypeSpecifier => {}
            }
        }

        match spec.output_cardinality {
            OutputCardinality::Singleton => input_type.clone().with_singleton(true),
            OutputCardinality::Collection => input_type.clone().with_singleton(false),
            OutputCardinality::PreserveInput => input_type.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DynamicModelProvider;
    use fhirpath_parser::cst::SourceFile;
    use fhirpath_parser::Parser;

    fn analyze(src: &str) -> (TypeInfo, DiagnosticCollector) {
        let tree = Parser::new(src).parse();
        let source_file = SourceFile::cast(tree.syntax()).expect("source file");
        let expr = source_file.expr().expect("expression");
        let registry = Registry::new();
        let model: Arc<dyn ModelProvider> = Arc::new(DynamicModelProvider::new());
        let analyzer = TypeAnalyzer::new(&registry, &model);
        let mut diagnostics = DiagnosticCollector::new();
        let ty = analyzer.analyze(&expr, &TypeInfo::any(), &mut diagnostics);
        (ty, diagnostics)
    }

    #[test]
    fn infers_literal_types() {
        let (ty, diags) = analyze("42");
        assert_eq!(ty.ty.as_str(), "Integer");
        assert!(diags.iter().next().is_none());
    }

    #[test]
    fn flags_unknown_function() {
        let (_, diags) = analyze("bogusFunction()");
        assert!(diags.errors().any(|d| d.code == crate::diagnostics::DiagnosticCode::UnknownFunction));
    }

    #[test]
    fn flags_wrong_arity() {
        let (_, diags) = analyze("substring()");
        assert!(diags.errors().any(|d| d.code == crate::diagnostics::DiagnosticCode::WrongArity));
    }

    #[test]
    fn equality_yields_boolean() {
        let (ty, _) = analyze("1 = 2");
        assert_eq!(ty.ty.as_str(), "Boolean");
    }
}
