mod language;
mod syntax_tree;

pub(crate) mod grammar;
pub use grammar::binary_operator_precedence;

use crate::lexer::Lexer;
use crate::lexer::Token;
use crate::Error;
use crate::LimitTracker;
pub use crate::syntax_kind::SyntaxKind;
pub use language::SyntaxElement;
pub use language::SyntaxNode;
pub use language::SyntaxNodeChildren;
pub use language::SyntaxNodePtr;
pub use language::SyntaxToken;
use std::cell::RefCell;
use std::rc::Rc;
pub use syntax_tree::SyntaxTree;
pub(crate) use syntax_tree::SyntaxTreeBuilder;

/// Controls how aggressively the parser recovers from and reports syntax errors.
///
/// `Standard` is the right default for evaluating expressions embedded in other
/// systems, `Diagnostic` is for editor tooling that wants `INCOMPLETE_NODE`
/// markers around unfinished input, and `Fast`/`Validate` trade recovery effort
/// for speed when only a yes/no parse result is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Stop recovering at the first error; the remaining input becomes one `ERROR_NODE`.
    Fast,
    /// Recover at well-known sync points (`.`, `)`, `]`, `}`, operators) and keep parsing.
    #[default]
    Standard,
    /// Like `Standard`, but also wraps unfinished productions in `INCOMPLETE_NODE`.
    Diagnostic,
    /// Parses only far enough to collect the error list, for expressions that are
    /// merely being validated (e.g. one stored in a resource's search parameter).
    Validate,
}

/// Parses FHIRPath expressions into a typed concrete syntax tree.
///
/// ```rust
/// use fhirpath_parser::Parser;
///
/// let parser = Parser::new("Patient.name.where(use = 'official').given");
/// let tree = parser.parse();
/// assert_eq!(tree.errors().count(), 0);
/// ```
#[derive(Debug)]
pub struct Parser {
    tokens: Vec<Token>,
    offsets: Vec<usize>,
    pos: usize,
    builder: Rc<RefCell<SyntaxTreeBuilder>>,
    errors: Vec<Error>,
    recursion_limit: LimitTracker,
    mode: ParseMode,
    accept_errors: bool,
    /// Set once, in [`ParseMode::Fast`], the moment the first error is recorded;
    /// every recursive production checks this to stop trying to parse further
    /// structure so [`source_file`](grammar::source_file) can slurp whatever is
    /// left into one `ERROR_NODE` instead of recovering token by token.
    fast_abort: bool,
}

/// Chosen so that pathologically nested expressions fail gracefully with a limit
/// error instead of overflowing the call stack during recursive-descent parsing.
const DEFAULT_RECURSION_LIMIT: usize = 500;

impl Parser {
    /// Create a new parser for `input`, running the lexer eagerly.
    pub fn new(input: &str) -> Self {
        let lexer = Lexer::new(input);
        let mut errors = Vec::new();
        for err in lexer.errors() {
            errors.push(Error::with_loc(err.message.clone(), String::new(), err.index));
        }
        let tokens = lexer.into_tokens();

        let mut offsets = Vec::with_capacity(tokens.len() + 1);
        let mut offset = 0;
        for token in &tokens {
            offsets.push(offset);
            offset += token.len();
        }
        offsets.push(offset);

        Self {
            tokens,
            offsets,
            pos: 0,
            builder: Rc::new(RefCell::new(SyntaxTreeBuilder::new())),
            errors,
            recursion_limit: LimitTracker::new(DEFAULT_RECURSION_LIMIT),
            mode: ParseMode::Standard,
            accept_errors: true,
            fast_abort: false,
        }
    }

    /// Select the parse mode (error-recovery strategy).
    pub fn with_mode(mut self, mode: ParseMode) -> Self {
        self.mode = mode;
        self
    }

    /// Configure the recursion limit to use while parsing.
    pub fn recursion_limit(mut self, recursion_limit: usize) -> Self {
        self.recursion_limit = LimitTracker::new(recursion_limit);
        self
    }

    /// Parse the input, producing a syntax tree and any collected errors.
    pub fn parse(mut self) -> SyntaxTree {
        grammar::source_file(&mut self);

        let builder = Rc::try_unwrap(self.builder)
            .expect("more than one reference to builder left")
            .into_inner();
        builder.finish(self.errors, self.recursion_limit)
    }

    pub(crate) fn mode(&self) -> ParseMode {
        self.mode
    }

    /// Whether [`ParseMode::Fast`] has already seen its one allowed error and
    /// every further production should stop attempting to parse structure.
    pub(crate) fn should_abort(&self) -> bool {
        self.fast_abort
    }

    /// Number of errors recorded so far; callers bracket a production with
    /// this to tell, after the fact, whether it recorded any error of its
    /// own (used to decide whether to wrap it in `INCOMPLETE_NODE`).
    pub(crate) fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Consume the current token under its own lexed kind, without recording
    /// an error or requiring it to match anything — used by [`ParseMode::Fast`]
    /// to fold whatever is left of the input into one `ERROR_NODE` after the
    /// first error, rather than emitting one diagnostic per leftover token.
    pub(crate) fn bump_any(&mut self) {
        self.skip_trivia();
        if self.pos >= self.tokens.len() {
            return;
        }
        let token = self.tokens[self.pos].clone();
        self.pos += 1;
        self.builder.borrow_mut().token(token.kind(), token.text());
    }

    /// Is the current token of `kind`?
    pub(crate) fn at(&mut self, kind: SyntaxKind) -> bool {
        self.peek() == Some(kind)
    }

    pub(crate) fn at_end(&mut self) -> bool {
        self.peek().is_none()
    }

    /// Peek the kind of the next non-trivia token.
    pub(crate) fn peek(&mut self) -> Option<SyntaxKind> {
        self.peek_n(0)
    }

    /// Peek the kind of the `n`-th non-trivia token ahead (0 = current).
    ///
    /// The lexer never distinguishes keywords from plain identifiers (it has
    /// no keyword table of its own); an `IDENT` whose text matches a reserved
    /// word is reclassified here, contextually, on every lookup. This is what
    /// lets `day`, `contains`, `is`, and friends work as ordinary member names
    /// (§ grammar: "reserved only in operator position") while still being
    /// recognized as operators wherever the grammar expects one.
    pub(crate) fn peek_n(&mut self, n: usize) -> Option<SyntaxKind> {
        self.tokens[self.pos..]
            .iter()
            .filter(|t| !t.kind().is_trivia())
            .nth(n)
            .map(|t| reclassify(t))
    }

    /// Peek the text of the current non-trivia token.
    pub(crate) fn peek_text(&mut self) -> Option<&str> {
        self.tokens[self.pos..]
            .iter()
            .find(|t| !t.kind().is_trivia())
            .map(|t| t.text())
    }

    /// Consume a token and append it to the tree under `kind`, skipping trivia first.
    pub(crate) fn bump(&mut self, kind: SyntaxKind) {
        self.skip_trivia();
        if self.pos >= self.tokens.len() {
            return;
        }
        let token = self.tokens[self.pos].clone();
        self.pos += 1;
        self.builder.borrow_mut().token(kind, token.text());
    }

    fn skip_trivia(&mut self) {
        while self.pos < self.tokens.len() && self.tokens[self.pos].kind().is_trivia() {
            let token = self.tokens[self.pos].clone();
            self.pos += 1;
            self.builder.borrow_mut().token(token.kind(), token.text());
        }
    }

    pub(crate) fn current_offset(&self) -> usize {
        self.offsets.get(self.pos).copied().unwrap_or(0)
    }

    fn current_text(&self) -> String {
        self.tokens
            .get(self.pos)
            .map(|t| t.text().to_string())
            .unwrap_or_else(|| "EOF".to_string())
    }

    /// Record a syntax error at the current position without consuming anything.
    pub(crate) fn err(&mut self, message: &str) {
        let index = self.current_offset();
        let err = if self.at_end() {
            Error::eof(message, index)
        } else {
            Error::with_loc(message, self.current_text(), index)
        };
        self.push_err(err);
        self.note_fast_abort();
    }

    /// Record a syntax error and consume the offending token into an `ERROR_TOKEN`.
    pub(crate) fn err_and_pop(&mut self, message: &str) {
        self.skip_trivia();
        if self.pos >= self.tokens.len() {
            self.err(message);
            return;
        }
        let index = self.current_offset();
        let text = self.current_text();
        self.bump(SyntaxKind::ERROR_TOKEN);
        self.push_err(Error::with_loc(message, text, index));
        self.note_fast_abort();
    }

    /// In [`ParseMode::Fast`], latch `fast_abort` the first time an error is
    /// recorded; every later-checked loop then stops trying to parse further
    /// structure (§4.5's Fast row: "stop recovering at the first error").
    fn note_fast_abort(&mut self) {
        if self.mode == ParseMode::Fast {
            self.fast_abort = true;
        }
    }

    /// Consume the next token if it is `expected`, recording an error otherwise.
    pub(crate) fn expect(&mut self, expected: SyntaxKind, as_kind: SyntaxKind) {
        if self.at(expected) {
            self.bump(as_kind);
            return;
        }
        let message = if self.at_end() {
            format!("expected {expected:?}, found end of input")
        } else {
            format!("expected {expected:?}, found {:?}", self.peek())
        };
        self.err(&message);
    }

    /// Like [`Parser::expect`], but for a closing delimiter whose matching opener
    /// was recorded at `open_index` — records an [`Error::unclosed`] carrying
    /// that offset instead of a generic expectation error, so the diagnostic
    /// layer can point back at the opening `(`/`[`/`{`.
    pub(crate) fn expect_close(&mut self, expected: SyntaxKind, as_kind: SyntaxKind, open_index: usize) {
        if self.at(expected) {
            self.bump(as_kind);
            return;
        }
        let index = self.current_offset();
        let message = if self.at_end() {
            format!("expected {expected:?}, found end of input")
        } else {
            format!("expected {expected:?}, found {:?}", self.peek())
        };
        let data = if self.at_end() { "EOF".to_string() } else { self.current_text() };
        self.push_err(Error::unclosed(message, data, index, open_index));
        self.note_fast_abort();
    }

    pub(crate) fn push_err(&mut self, err: Error) {
        if self.accept_errors {
            self.errors.push(err);
        }
    }

    /// Enter a recursive grammar production, recording a limit error if too deep.
    /// Returns `false` if the caller should bail out without recursing further.
    pub(crate) fn enter_recursion(&mut self) -> bool {
        self.recursion_limit.consume();
        if self.recursion_limit.limited() {
            if self.accept_errors {
                let index = self.current_offset();
                self.errors
                    .push(Error::limit("parser recursion limit reached", index));
                self.accept_errors = false;
            }
            return false;
        }
        true
    }

    pub(crate) fn exit_recursion(&mut self) {
        self.recursion_limit.release();
    }

    /// Start a node, returning a guard that closes it (via `Drop`) when released.
    pub(crate) fn start_node(&mut self, kind: SyntaxKind) -> NodeGuard {
        self.skip_trivia();
        self.builder.borrow_mut().start_node(kind);
        NodeGuard::new(self.builder.clone())
    }

    /// Mark a position to possibly wrap the following nodes in a new parent later.
    pub(crate) fn checkpoint(&mut self) -> Checkpoint {
        self.skip_trivia();
        let checkpoint = self.builder.borrow().checkpoint();
        Checkpoint::new(self.builder.clone(), checkpoint)
    }
}

/// An `IDENT` whose text is a reserved word reads as that keyword; every
/// other token keeps its lexed kind.
fn reclassify(token: &Token) -> SyntaxKind {
    if token.kind() == SyntaxKind::IDENT {
        SyntaxKind::from_keyword(token.text()).unwrap_or(SyntaxKind::IDENT)
    } else {
        token.kind()
    }
}

/// Closes the enclosing tree node when dropped, so grammar productions cannot
/// forget to balance `start_node`/`finish_node` calls.
#[must_use]
pub(crate) struct NodeGuard {
    builder: Rc<RefCell<SyntaxTreeBuilder>>,
}

impl NodeGuard {
    fn new(builder: Rc<RefCell<SyntaxTreeBuilder>>) -> Self {
        Self { builder }
    }

    pub(crate) fn finish_node(self) {
        drop(self);
    }
}

impl Drop for NodeGuard {
    fn drop(&mut self) {
        self.builder.borrow_mut().finish_node();
    }
}

/// A `rowan` checkpoint that can retroactively wrap parsed nodes in a new parent,
/// used for left-recursive binary-operator expressions (`a + b` becomes
/// `ADDITIVE_EXPR(a, +, b)` only once the operator is seen). Reusing the same
/// checkpoint for each operator in a left-associative chain nests correctly:
/// `a + b + c` wraps to `ADDITIVE_EXPR(ADDITIVE_EXPR(a, +, b), +, c)`.
pub(crate) struct Checkpoint {
    builder: Rc<RefCell<SyntaxTreeBuilder>>,
    checkpoint: rowan::Checkpoint,
}

impl Checkpoint {
    fn new(builder: Rc<RefCell<SyntaxTreeBuilder>>, checkpoint: rowan::Checkpoint) -> Self {
        Self { builder, checkpoint }
    }

    pub(crate) fn wrap_node(&self, kind: SyntaxKind) -> NodeGuard {
        self.builder.borrow_mut().wrap_node(self.checkpoint, kind);
        NodeGuard::new(self.builder.clone())
    }
}
