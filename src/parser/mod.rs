//! Statement parsing for the interactive shell: a lexer over the raw input
//! and a parser over the token stream.

mod lexer;
mod parser;

pub use lexer::{CompareOp, Keyword, Token, lexer};
pub use parser::{ColumnSpec, Literal, Predicate, Statement, TypeName, parser};

use chumsky::Parser;

/// Parse a batch of `;`-terminated statements
pub fn parse(input: &str) -> Result<Vec<Statement>, String> {
    let tokens = lexer()
        .parse(input)
        .into_result()
        .map_err(|errs| format!("Lexer errors: {:?}", errs))?;

    let tokens: Vec<Token<'_>> = tokens
        .into_iter()
        .filter(|token| !matches!(token, Token::Comment(_)))
        .collect();

    parser()
        .parse(tokens.as_slice())
        .into_result()
        .map_err(|errs| format!("Parser errors: {:?}", errs))
}
