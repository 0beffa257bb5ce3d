//! The interactive shell: a thin `clap`-driven CLI wrapping `rustyline`'s
//! line editor around `tinydb::Db`.

use anyhow::{Context, Result};
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tinydb::{Db, DbError, ExecError, StatementOutcome};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tinydb", version, about = "A small embedded relational database.")]
struct Cli {
    /// Database file to open.
    #[arg(short = 'd', long = "db")]
    db: String,

    /// Run a file's statements as a batch instead of starting the REPL.
    #[arg(short = 'i', long = "input")]
    input: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let mut db = Db::open(&cli.db).with_context(|| format!("opening database `{}`", cli.db))?;

    if let Some(path) = &cli.input {
        run_file(&mut db, path)?;
        return Ok(());
    }

    repl(&mut db)
}

fn run_file(db: &mut Db, path: &str) -> Result<()> {
    let sql = std::fs::read_to_string(path).with_context(|| format!("reading `{path}`"))?;
    run_and_print(db, &sql);
    Ok(())
}

fn repl(db: &mut Db) -> Result<()> {
    println!("tinydb {} -- enter SQL statements terminated by ';'", env!("CARGO_PKG_VERSION"));
    let mut rl = DefaultEditor::new().context("initializing line editor")?;
    let mut pending = String::new();

    loop {
        let prompt = if pending.is_empty() { "tinydb> " } else { "   ...> " };
        match rl.readline(prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if pending.is_empty() {
                    if trimmed == ".exit" || trimmed == ".quit" {
                        break;
                    }
                    if let Some(arg) = trimmed.strip_prefix("-run ") {
                        let _ = rl.add_history_entry(line.as_str());
                        if let Err(e) = run_file(db, arg.trim()) {
                            eprintln!("error: {e:#}");
                        }
                        continue;
                    }
                }
                let _ = rl.add_history_entry(line.as_str());
                pending.push_str(&line);
                pending.push('\n');
                if trimmed.ends_with(';') {
                    let statements = std::mem::take(&mut pending);
                    run_and_print(db, &statements);
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("readline error: {e}");
                break;
            }
        }
    }
    Ok(())
}

fn run_and_print(db: &mut Db, sql: &str) {
    match db.run(sql) {
        Ok(report) => {
            for outcome in report.outcomes {
                match outcome {
                    StatementOutcome::RowsAffected(n) => println!("OK ({n} row{} affected)", if n == 1 { "" } else { "s" }),
                    StatementOutcome::Rows { row_type, rows } => {
                        println!("{}", tinydb::pretty::render_table(&row_type, &rows));
                    }
                }
            }
        }
        Err(DbError::Exec(ExecError::Diagnostics(report))) => {
            eprint!("{}", report.render(sql));
        }
        Err(e) => eprintln!("error: {e}"),
    }
}
