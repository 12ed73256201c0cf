use crate::SyntaxKind;

/// A node in the immutable tree. It has other nodes and tokens as children.
pub type SyntaxNode = rowan::SyntaxNode<FhirPathLanguage>;
/// A leaf node in the tree.
pub type SyntaxToken = rowan::SyntaxToken<FhirPathLanguage>;
/// A `SyntaxNode` or a `SyntaxToken`.
pub type SyntaxElement = rowan::SyntaxElement<FhirPathLanguage>;
/// Children of a `SyntaxNode`.
pub type SyntaxNodeChildren = rowan::SyntaxNodeChildren<FhirPathLanguage>;
/// A wrapper around `SyntaxNodePtr`.
pub type SyntaxNodePtr = rowan::ast::SyntaxNodePtr<FhirPathLanguage>;

/// A language implementation for use in `rowan`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FhirPathLanguage {}

impl rowan::Language for FhirPathLanguage {
    type Kind = SyntaxKind;
    fn kind_from_raw(raw: rowan::SyntaxKind) -> Self::Kind {
        assert!(raw.0 <= (SyntaxKind::__LAST as u16));
        unsafe { std::mem::transmute::<u16, SyntaxKind>(raw.0) }
    }
    fn kind_to_raw(kind: Self::Kind) -> rowan::SyntaxKind {
        rowan::SyntaxKind(kind.into())
    }
}
