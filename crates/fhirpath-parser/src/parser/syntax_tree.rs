use crate::parser::language::SyntaxNode;
use crate::Error;
use crate::LimitTracker;
use crate::SyntaxKind;
use rowan::GreenNode;
use rowan::GreenNodeBuilder;

/// Accumulates tokens and nodes into a `rowan` green tree as the parser drives it.
pub(crate) struct SyntaxTreeBuilder {
    builder: GreenNodeBuilder<'static>,
}

impl SyntaxTreeBuilder {
    pub(crate) fn new() -> Self {
        Self {
            builder: GreenNodeBuilder::new(),
        }
    }

    pub(crate) fn start_node(&mut self, kind: SyntaxKind) {
        self.builder.start_node(kind.into());
    }

    pub(crate) fn token(&mut self, kind: SyntaxKind, text: &str) {
        self.builder.token(kind.into(), text);
    }

    pub(crate) fn finish_node(&mut self) {
        self.builder.finish_node();
    }

    pub(crate) fn checkpoint(&self) -> rowan::Checkpoint {
        self.builder.checkpoint()
    }

    pub(crate) fn wrap_node(&mut self, checkpoint: rowan::Checkpoint, kind: SyntaxKind) {
        self.builder.start_node_at(checkpoint, kind.into());
    }

    pub(crate) fn finish(self, errors: Vec<Error>, recursion_limit: LimitTracker) -> SyntaxTree {
        let green = self.builder.finish();
        SyntaxTree {
            green,
            errors,
            recursion_limit,
        }
    }
}

/// The result of parsing: a syntax tree plus any errors collected along the way.
///
/// The tree is produced even when errors occurred. In [`ParseMode::Diagnostic`](crate::parser::ParseMode::Diagnostic),
/// nodes around the error site are additionally marked `ERROR_NODE`/`INCOMPLETE_NODE`
/// so callers can still inspect the well-formed parts of the expression; other modes
/// recover the same tree shape but don't pay for that extra node-level bookkeeping.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    green: GreenNode,
    errors: Vec<Error>,
    recursion_limit: LimitTracker,
}

impl SyntaxTree {
    /// The root `SOURCE_FILE` node of the tree.
    pub fn syntax(&self) -> SyntaxNode {
        SyntaxNode::new_root(self.green.clone())
    }

    /// Errors collected while lexing and parsing, in source order.
    pub fn errors(&self) -> impl Iterator<Item = &Error> {
        self.errors.iter()
    }

    /// Whether the tree is free of lexical and syntactical errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Recursion-limit usage for this parse.
    pub fn recursion_limit(&self) -> &LimitTracker {
        &self.recursion_limit
    }
}
