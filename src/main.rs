use std::io::{self, BufRead, Write};

use silo::database::{DatabaseError, DatabaseManager, QueryResult};
use silo::file::FileError;
use silo::parser::{self, Statement};

enum Flow {
    Continue,
    Quit,
}

fn main() {
    let data_dir = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "./database".to_string());

    let mut manager = match DatabaseManager::new(&data_dir) {
        Ok(manager) => manager,
        Err(err) => {
            eprintln!("failed to initialize data directory: {}", err);
            std::process::exit(1);
        }
    };

    let stdin = io::stdin();
    let mut buffer = String::new();
    let mut fatal = false;

    'outer: for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        buffer.push_str(&line);
        buffer.push('\n');
        // Statements run once the buffered input ends with a terminator
        if !line.trim_end().ends_with(';') {
            continue;
        }

        let statements = match parser::parse(&buffer) {
            Ok(statements) => statements,
            Err(err) => {
                eprintln!("{}", err);
                buffer.clear();
                continue;
            }
        };
        buffer.clear();

        for statement in statements {
            match run_statement(&mut manager, statement) {
                Ok(Flow::Quit) => break 'outer,
                Ok(Flow::Continue) => {}
                Err(err) => {
                    eprintln!("error: {}", err);
                    if is_fatal(&err) {
                        fatal = true;
                        break 'outer;
                    }
                }
            }
        }
        io::stdout().flush().ok();
    }

    if let Err(err) = manager.shutdown() {
        eprintln!("error: {}", err);
        fatal = true;
    }
    if fatal {
        std::process::exit(1);
    }
}

fn run_statement(
    manager: &mut DatabaseManager,
    statement: Statement,
) -> Result<Flow, DatabaseError> {
    match statement {
        Statement::Quit => Ok(Flow::Quit),
        Statement::ExecFile(path) => {
            run_script(manager, &path)?;
            Ok(Flow::Continue)
        }
        other => {
            let result = manager.execute(other)?;
            print_result(&result);
            Ok(Flow::Continue)
        }
    }
}

fn run_script(manager: &mut DatabaseManager, path: &str) -> Result<(), DatabaseError> {
    let text = std::fs::read_to_string(path)?;
    let statements = match parser::parse(&text) {
        Ok(statements) => statements,
        Err(err) => {
            eprintln!("{}: {}", path, err);
            return Ok(());
        }
    };
    for statement in statements {
        match statement {
            // A quit inside a script only ends the script
            Statement::Quit => break,
            Statement::ExecFile(nested) => run_script(manager, &nested)?,
            other => {
                let result = manager.execute(other)?;
                print_result(&result);
            }
        }
    }
    Ok(())
}

fn print_result(result: &QueryResult) {
    match result {
        QueryResult::Empty => {}
        QueryResult::RowsAffected(count) => println!("{} row(s) affected", count),
        QueryResult::ResultSet { headers, rows } => {
            println!("{}", headers.join(","));
            for row in rows {
                println!("{}", row.join(","));
            }
            println!("{} row(s)", rows.len());
        }
        QueryResult::List(items) => {
            for item in items {
                println!("{}", item);
            }
        }
    }
}

fn is_fatal(err: &DatabaseError) -> bool {
    matches!(
        err,
        DatabaseError::Io(_)
            | DatabaseError::File(FileError::Io(_))
            | DatabaseError::Record(silo::record::RecordError::File(FileError::Io(_)))
    )
}
