//! Typed wrappers over the untyped `rowan` tree, one per [`SyntaxKind`] node variant.
//!
//! Each type is a thin, `Clone`-able handle around a [`SyntaxNode`]; they borrow nothing
//! and can be matched on freely. This mirrors the generated AST layer of other `rowan`-based
//! parsers, written out by hand since the FHIRPath grammar is small enough not to need codegen.

use crate::SyntaxKind;
use crate::SyntaxNode;
use crate::SyntaxToken;

/// A typed view over a [`SyntaxNode`] of a specific kind.
pub trait CstNode: Sized {
    fn can_cast(kind: SyntaxKind) -> bool;
    fn cast(syntax: SyntaxNode) -> Option<Self>;
    fn syntax(&self) -> &SyntaxNode;
}

macro_rules! ast_node {
    ($name:ident, $kind:ident) => {
        #[derive(Clone, PartialEq, Eq, Hash, Debug)]
        pub struct $name {
            syntax: SyntaxNode,
        }

        impl CstNode for $name {
            fn can_cast(kind: SyntaxKind) -> bool {
                kind == SyntaxKind::$kind
            }

            fn cast(syntax: SyntaxNode) -> Option<Self> {
                Self::can_cast(syntax.kind()).then_some(Self { syntax })
            }

            fn syntax(&self) -> &SyntaxNode {
                &self.syntax
            }
        }
    };
}

ast_node!(SourceFile, SOURCE_FILE);
ast_node!(LiteralExpr, LITERAL_EXPR);
ast_node!(QuantityLiteral, QUANTITY_LITERAL);
ast_node!(NameRef, NAME_REF);
ast_node!(IdentifierExpr, IDENTIFIER_EXPR);
ast_node!(ExternalConstantExpr, EXTERNAL_CONSTANT_EXPR);
ast_node!(SpecialVariableExpr, SPECIAL_VARIABLE_EXPR);
ast_node!(ParenExpr, PAREN_EXPR);
ast_node!(CollectionLiteral, COLLECTION_LITERAL);
ast_node!(InvocationExpr, INVOCATION_EXPR);
ast_node!(IndexExpr, INDEX_EXPR);
ast_node!(FunctionCallExpr, FUNCTION_CALL_EXPR);
ast_node!(ArgList, ARG_LIST);
ast_node!(PolarityExpr, POLARITY_EXPR);
ast_node!(MultiplicativeExpr, MULTIPLICATIVE_EXPR);
ast_node!(AdditiveExpr, ADDITIVE_EXPR);
ast_node!(TypeExpr, TYPE_EXPR);
ast_node!(UnionExpr, UNION_EXPR);
ast_node!(InequalityExpr, INEQUALITY_EXPR);
ast_node!(EqualityExpr, EQUALITY_EXPR);
ast_node!(MembershipExpr, MEMBERSHIP_EXPR);
ast_node!(AndExpr, AND_EXPR);
ast_node!(OrExpr, OR_EXPR);
ast_node!(XorExpr, XOR_EXPR);
ast_node!(ImpliesExpr, IMPLIES_EXPR);
ast_node!(TypeSpecifier, TYPE_SPECIFIER);
ast_node!(ErrorNode, ERROR_NODE);
ast_node!(IncompleteNode, INCOMPLETE_NODE);

/// Any node that can appear in expression position.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Expr {
    Literal(LiteralExpr),
    Quantity(QuantityLiteral),
    Identifier(IdentifierExpr),
    ExternalConstant(ExternalConstantExpr),
    SpecialVariable(SpecialVariableExpr),
    Paren(ParenExpr),
    Collection(CollectionLiteral),
    Invocation(InvocationExpr),
    Index(IndexExpr),
    FunctionCall(FunctionCallExpr),
    Polarity(PolarityExpr),
    Multiplicative(MultiplicativeExpr),
    Additive(AdditiveExpr),
    Type(TypeExpr),
    Union(UnionExpr),
    Inequality(InequalityExpr),
    Equality(EqualityExpr),
    Membership(MembershipExpr),
    And(AndExpr),
    Or(OrExpr),
    Xor(XorExpr),
    Implies(ImpliesExpr),
    Error(ErrorNode),
    Incomplete(IncompleteNode),
}

impl CstNode for Expr {
    fn can_cast(kind: SyntaxKind) -> bool {
        matches!(
            kind,
            SyntaxKind::LITERAL_EXPR
                | SyntaxKind::QUANTITY_LITERAL
                | SyntaxKind::IDENTIFIER_EXPR
                | SyntaxKind::EXTERNAL_CONSTANT_EXPR
                | SyntaxKind::SPECIAL_VARIABLE_EXPR
                | SyntaxKind::PAREN_EXPR
                | SyntaxKind::COLLECTION_LITERAL
                | SyntaxKind::INVOCATION_EXPR
                | SyntaxKind::INDEX_EXPR
                | SyntaxKind::FUNCTION_CALL_EXPR
                | SyntaxKind::POLARITY_EXPR
                | SyntaxKind::MULTIPLICATIVE_EXPR
                | SyntaxKind::ADDITIVE_EXPR
                | SyntaxKind::TYPE_EXPR
                | SyntaxKind::UNION_EXPR
                | SyntaxKind::INEQUALITY_EXPR
                | SyntaxKind::EQUALITY_EXPR
                | SyntaxKind::MEMBERSHIP_EXPR
                | SyntaxKind::AND_EXPR
                | SyntaxKind::OR_EXPR
                | SyntaxKind::XOR_EXPR
                | SyntaxKind::IMPLIES_EXPR
                | SyntaxKind::ERROR_NODE
                | SyntaxKind::INCOMPLETE_NODE
        )
    }

    fn cast(syntax: SyntaxNode) -> Option<Self> {
        let expr = match syntax.kind() {
            SyntaxKind::LITERAL_EXPR => Expr::Literal(LiteralExpr { syntax }),
            SyntaxKind::QUANTITY_LITERAL => Expr::Quantity(QuantityLiteral { syntax }),
            SyntaxKind::IDENTIFIER_EXPR => Expr::Identifier(IdentifierExpr { syntax }),
            SyntaxKind::EXTERNAL_CONSTANT_EXPR => {
                Expr::ExternalConstant(ExternalConstantExpr { syntax })
            }
            SyntaxKind::SPECIAL_VARIABLE_EXPR => {
                Expr::SpecialVariable(SpecialVariableExpr { syntax })
            }
            SyntaxKind::PAREN_EXPR => Expr::Paren(ParenExpr { syntax }),
            SyntaxKind::COLLECTION_LITERAL => Expr::Collection(CollectionLiteral { syntax }),
            SyntaxKind::INVOCATION_EXPR => Expr::Invocation(InvocationExpr { syntax }),
            SyntaxKind::INDEX_EXPR => Expr::Index(IndexExpr { syntax }),
            SyntaxKind::FUNCTION_CALL_EXPR => Expr::FunctionCall(FunctionCallExpr { syntax }),
            SyntaxKind::POLARITY_EXPR => Expr::Polarity(PolarityExpr { syntax }),
            SyntaxKind::MULTIPLICATIVE_EXPR => Expr::Multiplicative(MultiplicativeExpr { syntax }),
            SyntaxKind::ADDITIVE_EXPR => Expr::Additive(AdditiveExpr { syntax }),
            SyntaxKind::TYPE_EXPR => Expr::Type(TypeExpr { syntax }),
            SyntaxKind::UNION_EXPR => Expr::Union(UnionExpr { syntax }),
            SyntaxKind::INEQUALITY_EXPR => Expr::Inequality(InequalityExpr { syntax }),
            SyntaxKind::EQUALITY_EXPR => Expr::Equality(EqualityExpr { syntax }),
            SyntaxKind::MEMBERSHIP_EXPR => Expr::Membership(MembershipExpr { syntax }),
            SyntaxKind::AND_EXPR => Expr::And(AndExpr { syntax }),
            SyntaxKind::OR_EXPR => Expr::Or(OrExpr { syntax }),
            SyntaxKind::XOR_EXPR => Expr::Xor(XorExpr { syntax }),
            SyntaxKind::IMPLIES_EXPR => Expr::Implies(ImpliesExpr { syntax }),
            SyntaxKind::ERROR_NODE => Expr::Error(ErrorNode { syntax }),
            SyntaxKind::INCOMPLETE_NODE => Expr::Incomplete(IncompleteNode { syntax }),
            _ => return None,
        };
        Some(expr)
    }

    fn syntax(&self) -> &SyntaxNode {
        match self {
            Expr::Literal(n) => n.syntax(),
            Expr::Quantity(n) => n.syntax(),
            Expr::Identifier(n) => n.syntax(),
            Expr::ExternalConstant(n) => n.syntax(),
            Expr::SpecialVariable(n) => n.syntax(),
            Expr::Paren(n) => n.syntax(),
            Expr::Collection(n) => n.syntax(),
            Expr::Invocation(n) => n.syntax(),
            Expr::Index(n) => n.syntax(),
            Expr::FunctionCall(n) => n.syntax(),
            Expr::Polarity(n) => n.syntax(),
            Expr::Multiplicative(n) => n.syntax(),
            Expr::Additive(n) => n.syntax(),
            Expr::Type(n) => n.syntax(),
            Expr::Union(n) => n.syntax(),
            Expr::Inequality(n) => n.syntax(),
            Expr::Equality(n) => n.syntax(),
            Expr::Membership(n) => n.syntax(),
            Expr::And(n) => n.syntax(),
            Expr::Or(n) => n.syntax(),
            Expr::Xor(n) => n.syntax(),
            Expr::Implies(n) => n.syntax(),
            Expr::Error(n) => n.syntax(),
            Expr::Incomplete(n) => n.syntax(),
        }
    }
}

fn children<N: CstNode>(parent: &SyntaxNode) -> impl Iterator<Item = N> {
    parent.children().filter_map(N::cast)
}

fn child<N: CstNode>(parent: &SyntaxNode) -> Option<N> {
    children(parent).next()
}

fn token(parent: &SyntaxNode, kind: SyntaxKind) -> Option<SyntaxToken> {
    parent
        .children_with_tokens()
        .filter_map(|el| el.into_token())
        .find(|t| t.kind() == kind)
}

impl SourceFile {
    pub fn expr(&self) -> Option<Expr> {
        self.syntax.children().find_map(Expr::cast)
    }
}

impl LiteralExpr {
    pub fn token(&self) -> Option<SyntaxToken> {
        self.syntax.children_with_tokens().filter_map(|e| e.into_token()).find(|t| !t.kind().is_trivia())
    }
}

impl QuantityLiteral {
    pub fn value_token(&self) -> Option<SyntaxToken> {
        self.syntax
            .children_with_tokens()
            .filter_map(|e| e.into_token())
            .find(|t| matches!(t.kind(), SyntaxKind::INT_NUMBER | SyntaxKind::DEC_NUMBER))
    }

    pub fn unit_token(&self) -> Option<SyntaxToken> {
        self.syntax
            .children_with_tokens()
            .filter_map(|e| e.into_token())
            .find(|t| matches!(t.kind(), SyntaxKind::STRING) || t.kind().is_keyword())
    }
}

impl NameRef {
    pub fn text(&self) -> String {
        self.syntax.text().to_string()
    }
}

impl IdentifierExpr {
    /// Set when this is a bare name (`Patient`, `active`).
    pub fn name_ref(&self) -> Option<NameRef> {
        child(&self.syntax)
    }

    /// Set when this is a function called in head position with an implicit
    /// `$this` target (`where(...)`), rather than a bare name.
    pub fn function_call(&self) -> Option<FunctionCallExpr> {
        child(&self.syntax)
    }
}

impl ExternalConstantExpr {
    pub fn token(&self) -> Option<SyntaxToken> {
        token(&self.syntax, SyntaxKind::EXTERNAL_CONSTANT)
    }
}

impl SpecialVariableExpr {
    pub fn token(&self) -> Option<SyntaxToken> {
        token(&self.syntax, SyntaxKind::SPECIAL_VARIABLE)
    }
}

impl ParenExpr {
    pub fn inner(&self) -> Option<Expr> {
        self.syntax.children().find_map(Expr::cast)
    }
}

impl CollectionLiteral {
    pub fn elements(&self) -> impl Iterator<Item = Expr> + '_ {
        self.syntax.children().filter_map(Expr::cast)
    }
}

/// The member named after a `.`: either a bare name or a nested function call
/// (`a.b` vs `a.where(...)`). Neither casts as an [`Expr`] on its own — a
/// [`NameRef`] isn't an expression in its own right, and the function call
/// here is a direct child rather than wrapped in an [`IdentifierExpr`].
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Member {
    Name(NameRef),
    Call(FunctionCallExpr),
}

impl Member {
    pub fn text(&self) -> String {
        match self {
            Member::Name(n) => n.text(),
            Member::Call(c) => c.name_ref().map(|n| n.text()).unwrap_or_default(),
        }
    }
}

impl InvocationExpr {
    pub fn target(&self) -> Option<Expr> {
        self.syntax.children().filter_map(Expr::cast).next()
    }

    pub fn member(&self) -> Option<Member> {
        self.syntax.children().find_map(|n| {
            NameRef::cast(n.clone())
                .map(Member::Name)
                .or_else(|| FunctionCallExpr::cast(n).map(Member::Call))
        })
    }
}

impl IndexExpr {
    pub fn target(&self) -> Option<Expr> {
        self.syntax.children().filter_map(Expr::cast).next()
    }

    pub fn index(&self) -> Option<Expr> {
        self.syntax.children().filter_map(Expr::cast).nth(1)
    }
}

impl FunctionCallExpr {
    pub fn name_ref(&self) -> Option<NameRef> {
        child(&self.syntax)
    }

    pub fn arg_list(&self) -> Option<ArgList> {
        child(&self.syntax)
    }
}

impl ArgList {
    pub fn args(&self) -> impl Iterator<Item = Expr> + '_ {
        self.syntax.children().filter_map(Expr::cast)
    }
}

macro_rules! binary_accessors {
    ($name:ident) => {
        impl $name {
            pub fn lhs(&self) -> Option<Expr> {
                self.syntax.children().filter_map(Expr::cast).next()
            }

            pub fn rhs(&self) -> Option<Expr> {
                self.syntax.children().filter_map(Expr::cast).nth(1)
            }

            pub fn op_token(&self) -> Option<SyntaxToken> {
                self.syntax
                    .children_with_tokens()
                    .filter_map(|e| e.into_token())
                    .find(|t| !t.kind().is_trivia() && !matches!(t.kind(), SyntaxKind::L_PAREN | SyntaxKind::R_PAREN))
            }
        }
    };
}

binary_accessors!(MultiplicativeExpr);
binary_accessors!(AdditiveExpr);
binary_accessors!(UnionExpr);
binary_accessors!(InequalityExpr);
binary_accessors!(EqualityExpr);
binary_accessors!(MembershipExpr);
binary_accessors!(AndExpr);
binary_accessors!(OrExpr);
binary_accessors!(XorExpr);
binary_accessors!(ImpliesExpr);

impl PolarityExpr {
    pub fn operand(&self) -> Option<Expr> {
        child(&self.syntax)
    }

    pub fn is_negative(&self) -> bool {
        token(&self.syntax, SyntaxKind::MINUS).is_some()
    }
}

impl TypeExpr {
    pub fn operand(&self) -> Option<Expr> {
        self.syntax.children().filter_map(Expr::cast).next()
    }

    pub fn type_specifier(&self) -> Option<TypeSpecifier> {
        child(&self.syntax)
    }

    pub fn is_as(&self) -> bool {
        token(&self.syntax, SyntaxKind::as_KW).is_some()
    }
}

impl TypeSpecifier {
    /// The dotted segments of the type name, e.g. `["FHIR", "Patient"]`.
    pub fn segments(&self) -> Vec<String> {
        self.syntax
            .children_with_tokens()
            .filter_map(|e| e.into_token())
            .filter(|t| matches!(t.kind(), SyntaxKind::IDENT | SyntaxKind::DELIMITED_IDENT))
            .map(|t| t.text().to_string())
            .collect()
    }
}
