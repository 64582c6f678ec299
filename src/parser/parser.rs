use chumsky::prelude::*;

use super::lexer::{CompareOp, Keyword as K, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeName {
    Int,
    Float,
    Char(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub type_name: TypeName,
    pub unique: bool,
    pub nullable: bool,
}

/// `WHERE <column> <op> <literal>`
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub op: CompareOp,
    pub value: Literal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateDatabase(String),
    DropDatabase(String),
    ShowDatabases,
    UseDatabase(String),
    ShowTables,
    ShowIndexes,
    CreateTable(String, Vec<ColumnSpec>),
    DropTable(String),
    CreateIndex {
        index_name: String,
        table_name: String,
        columns: Vec<String>,
    },
    DropIndex(String),
    Select {
        table_name: String,
        columns: Option<Vec<String>>,
        predicate: Option<Predicate>,
    },
    Insert {
        table_name: String,
        rows: Vec<Vec<Literal>>,
    },
    Delete {
        table_name: String,
        predicate: Option<Predicate>,
    },
    Update {
        table_name: String,
        assignments: Vec<(String, Literal)>,
        predicate: Option<Predicate>,
    },
    Quit,
    ExecFile(String),
}

type TokenInput<'a> = &'a [Token<'a>];
type ParseErr<'a> = extra::Err<Rich<'a, Token<'a>>>;

fn identifier<'a>() -> impl Parser<'a, TokenInput<'a>, String, ParseErr<'a>> {
    select! { Token::Identifier(name) => name.to_string() }
}

fn integer<'a>() -> impl Parser<'a, TokenInput<'a>, i64, ParseErr<'a>> {
    select! { Token::Integer(value) => value }
}

fn literal<'a>() -> impl Parser<'a, TokenInput<'a>, Literal, ParseErr<'a>> {
    choice((
        select! {
            Token::Integer(value) => Literal::Int(value),
            Token::Float(value) => Literal::Float(value),
            Token::Str(value) => Literal::Str(value.to_string()),
        },
        just(Token::Keyword(K::Null)).to(Literal::Null),
    ))
}

fn predicate<'a>() -> impl Parser<'a, TokenInput<'a>, Predicate, ParseErr<'a>> {
    identifier()
        .then(select! { Token::Op(op) => op })
        .then(literal())
        .map(|((column, op), value)| Predicate { column, op, value })
}

fn where_clause<'a>() -> impl Parser<'a, TokenInput<'a>, Option<Predicate>, ParseErr<'a>> {
    just(Token::Keyword(K::Where))
        .ignore_then(predicate())
        .or_not()
}

fn column_list<'a>() -> impl Parser<'a, TokenInput<'a>, Vec<String>, ParseErr<'a>> {
    identifier()
        .separated_by(just(Token::Symbol(',')))
        .at_least(1)
        .collect()
        .delimited_by(just(Token::Symbol('(')), just(Token::Symbol(')')))
}

fn db_statement<'a>() -> impl Parser<'a, TokenInput<'a>, Statement, ParseErr<'a>> {
    let create_db = just(Token::Keyword(K::Create))
        .ignore_then(just(Token::Keyword(K::Database)))
        .ignore_then(identifier())
        .map(Statement::CreateDatabase);

    let drop_db = just(Token::Keyword(K::Drop))
        .ignore_then(just(Token::Keyword(K::Database)))
        .ignore_then(identifier())
        .map(Statement::DropDatabase);

    let show_dbs = just(Token::Keyword(K::Show))
        .ignore_then(just(Token::Keyword(K::Databases)))
        .to(Statement::ShowDatabases);

    let use_db = just(Token::Keyword(K::Use))
        .ignore_then(identifier())
        .map(Statement::UseDatabase);

    let show_tables = just(Token::Keyword(K::Show))
        .ignore_then(just(Token::Keyword(K::Tables)))
        .to(Statement::ShowTables);

    let show_indexes = just(Token::Keyword(K::Show))
        .ignore_then(just(Token::Keyword(K::Indexes)))
        .to(Statement::ShowIndexes);

    let quit = just(Token::Keyword(K::Quit)).to(Statement::Quit);

    let execfile = just(Token::Keyword(K::Execfile))
        .ignore_then(select! { Token::Str(path) => path.to_string() })
        .map(Statement::ExecFile);

    choice((
        create_db,
        drop_db,
        show_dbs,
        use_db,
        show_tables,
        show_indexes,
        quit,
        execfile,
    ))
}

fn ddl_statement<'a>() -> impl Parser<'a, TokenInput<'a>, Statement, ParseErr<'a>> {
    let type_name = choice((
        just(Token::Keyword(K::Int)).to(TypeName::Int),
        just(Token::Keyword(K::Float)).to(TypeName::Float),
        just(Token::Keyword(K::Char))
            .ignore_then(
                integer().delimited_by(just(Token::Symbol('(')), just(Token::Symbol(')'))),
            )
            .map(|length| TypeName::Char(length as u32)),
    ));

    #[derive(PartialEq, Clone)]
    enum Constraint {
        Unique,
        NotNull,
    }
    let constraint = choice((
        just(Token::Keyword(K::Unique)).to(Constraint::Unique),
        just(Token::Keyword(K::Not))
            .ignore_then(just(Token::Keyword(K::Null)))
            .to(Constraint::NotNull),
    ));

    let column_spec = identifier()
        .then(type_name)
        .then(constraint.repeated().collect::<Vec<_>>())
        .map(|((name, type_name), constraints)| ColumnSpec {
            name,
            type_name,
            unique: constraints.contains(&Constraint::Unique),
            nullable: !constraints.contains(&Constraint::NotNull),
        });

    let create_table = just(Token::Keyword(K::Create))
        .ignore_then(just(Token::Keyword(K::Table)))
        .ignore_then(identifier())
        .then(
            column_spec
                .separated_by(just(Token::Symbol(',')))
                .at_least(1)
                .collect()
                .delimited_by(just(Token::Symbol('(')), just(Token::Symbol(')'))),
        )
        .map(|(table_name, columns)| Statement::CreateTable(table_name, columns));

    let drop_table = just(Token::Keyword(K::Drop))
        .ignore_then(just(Token::Keyword(K::Table)))
        .ignore_then(identifier())
        .map(Statement::DropTable);

    let create_index = just(Token::Keyword(K::Create))
        .ignore_then(just(Token::Keyword(K::Index)))
        .ignore_then(identifier())
        .then_ignore(just(Token::Keyword(K::On)))
        .then(identifier())
        .then(column_list())
        .map(|((index_name, table_name), columns)| Statement::CreateIndex {
            index_name,
            table_name,
            columns,
        });

    let drop_index = just(Token::Keyword(K::Drop))
        .ignore_then(just(Token::Keyword(K::Index)))
        .ignore_then(identifier())
        .map(Statement::DropIndex);

    choice((create_table, drop_table, create_index, drop_index))
}

fn dml_statement<'a>() -> impl Parser<'a, TokenInput<'a>, Statement, ParseErr<'a>> {
    let selectors = choice((
        just(Token::Symbol('*')).to(None),
        identifier()
            .separated_by(just(Token::Symbol(',')))
            .at_least(1)
            .collect::<Vec<_>>()
            .map(Some),
    ));

    let select = just(Token::Keyword(K::Select))
        .ignore_then(selectors)
        .then_ignore(just(Token::Keyword(K::From)))
        .then(identifier())
        .then(where_clause())
        .map(|((columns, table_name), predicate)| Statement::Select {
            table_name,
            columns,
            predicate,
        });

    let value_tuple = literal()
        .separated_by(just(Token::Symbol(',')))
        .at_least(1)
        .collect::<Vec<_>>()
        .delimited_by(just(Token::Symbol('(')), just(Token::Symbol(')')));

    let insert = just(Token::Keyword(K::Insert))
        .ignore_then(just(Token::Keyword(K::Into)))
        .ignore_then(identifier())
        .then_ignore(just(Token::Keyword(K::Values)))
        .then(
            value_tuple
                .separated_by(just(Token::Symbol(',')))
                .at_least(1)
                .collect::<Vec<_>>(),
        )
        .map(|(table_name, rows)| Statement::Insert { table_name, rows });

    let delete = just(Token::Keyword(K::Delete))
        .ignore_then(just(Token::Keyword(K::From)))
        .ignore_then(identifier())
        .then(where_clause())
        .map(|(table_name, predicate)| Statement::Delete {
            table_name,
            predicate,
        });

    let assignment = identifier()
        .then_ignore(just(Token::Op(CompareOp::Eq)))
        .then(literal());

    let update = just(Token::Keyword(K::Update))
        .ignore_then(identifier())
        .then_ignore(just(Token::Keyword(K::Set)))
        .then(
            assignment
                .separated_by(just(Token::Symbol(',')))
                .at_least(1)
                .collect::<Vec<_>>(),
        )
        .then(where_clause())
        .map(|((table_name, assignments), predicate)| Statement::Update {
            table_name,
            assignments,
            predicate,
        });

    choice((select, insert, delete, update))
}

pub fn parser<'a>() -> impl Parser<'a, TokenInput<'a>, Vec<Statement>, ParseErr<'a>> {
    choice((db_statement(), ddl_statement(), dml_statement()))
        .then_ignore(just(Token::Symbol(';')))
        .repeated()
        .collect()
}
