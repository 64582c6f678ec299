use chumsky::{prelude::*, regex::regex, text::ascii::ident};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Create,
    Drop,
    Show,
    Use,
    Database,
    Databases,
    Table,
    Tables,
    Index,
    Indexes,
    On,
    Select,
    From,
    Where,
    Insert,
    Into,
    Values,
    Delete,
    Update,
    Set,
    Int,
    Float,
    Char,
    Unique,
    Not,
    Null,
    Quit,
    Execfile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token<'a> {
    Keyword(Keyword),
    Identifier(&'a str),
    Integer(i64),
    Float(f64),
    Str(&'a str),
    Op(CompareOp),
    Symbol(char),
    Comment(&'a str),
}

/// Keywords are matched case-insensitively; anything else stays an
/// identifier
fn keyword_of(word: &str) -> Option<Keyword> {
    let upper = word.to_ascii_uppercase();
    let keyword = match upper.as_str() {
        "CREATE" => Keyword::Create,
        "DROP" => Keyword::Drop,
        "SHOW" => Keyword::Show,
        "USE" => Keyword::Use,
        "DATABASE" => Keyword::Database,
        "DATABASES" => Keyword::Databases,
        "TABLE" => Keyword::Table,
        "TABLES" => Keyword::Tables,
        "INDEX" => Keyword::Index,
        "INDEXES" => Keyword::Indexes,
        "ON" => Keyword::On,
        "SELECT" => Keyword::Select,
        "FROM" => Keyword::From,
        "WHERE" => Keyword::Where,
        "INSERT" => Keyword::Insert,
        "INTO" => Keyword::Into,
        "VALUES" => Keyword::Values,
        "DELETE" => Keyword::Delete,
        "UPDATE" => Keyword::Update,
        "SET" => Keyword::Set,
        "INT" => Keyword::Int,
        "FLOAT" => Keyword::Float,
        "CHAR" => Keyword::Char,
        "UNIQUE" => Keyword::Unique,
        "NOT" => Keyword::Not,
        "NULL" => Keyword::Null,
        "QUIT" => Keyword::Quit,
        "EXECFILE" => Keyword::Execfile,
        _ => return None,
    };
    Some(keyword)
}

pub fn lexer<'a>() -> impl Parser<'a, &'a str, Vec<Token<'a>>, extra::Err<Rich<'a, char>>> {
    let comment = just("--")
        .ignore_then(none_of("\n").repeated())
        .to_slice()
        .map(Token::Comment)
        .padded();

    let float = regex(r"-?\d+\.\d*")
        .map(|s: &str| Token::Float(s.parse().unwrap()))
        .padded();

    let integer = regex(r"-?\d+")
        .map(|s: &str| Token::Integer(s.parse().unwrap()))
        .padded();

    let string = regex(r"'[^']*'")
        .map(|s: &str| Token::Str(&s[1..s.len() - 1]))
        .padded();

    let word = ident()
        .map(|s: &str| match keyword_of(s) {
            Some(keyword) => Token::Keyword(keyword),
            None => Token::Identifier(s),
        })
        .padded();

    let op = choice((
        just("<=").to(CompareOp::Le),
        just(">=").to(CompareOp::Ge),
        just("<>").to(CompareOp::Ne),
        just("<").to(CompareOp::Lt),
        just(">").to(CompareOp::Gt),
        just("=").to(CompareOp::Eq),
    ))
    .map(Token::Op)
    .padded();

    let symbol = one_of("(),;*").map(Token::Symbol).padded();

    choice((comment, float, integer, string, word, op, symbol))
        .repeated()
        .collect()
}
