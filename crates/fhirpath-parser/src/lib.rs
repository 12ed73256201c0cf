#![doc = include_str!("../README.md")]

mod lexer;
#[cfg(test)]
mod tests;

pub mod cst;
mod error;
mod limit;
mod parser;
mod syntax_kind;

pub use crate::error::Error;
pub use crate::lexer::{LexError, Lexer, Token};
pub use crate::limit::LimitTracker;
pub use crate::parser::{
    binary_operator_precedence, ParseMode, Parser, SyntaxElement, SyntaxNode, SyntaxNodeChildren,
    SyntaxNodePtr, SyntaxTree, SyntaxToken,
};
pub use crate::syntax_kind::SyntaxKind;
