//! Declaration-level Go syntax: lexer, parser and arena AST.
//!
//! - Lexer uses Logos, implements Go semicolon insertion and keeps comments
//!   in a side table.
//! - Parser is recursive descent over the token stream; it models package,
//!   import, type, const, var and func declarations and skips bodies.

pub mod ast;
pub mod error;
pub mod lexer;
pub mod literal;
pub mod parser;
mod parser_support;
pub mod pos;
pub mod walk;

// Re-exports for convenience
pub use error::{Diag, DiagKind, ParseFailure};
pub use lexer::Lexer;
pub use parser::{ParsedFile, parse_source};
pub use pos::{LineCol, LineIndex};
