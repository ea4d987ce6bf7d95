//! Command-line boundary for the lending core.
//!
//! # Responsibility
//! - Parse primitive arguments and run one core operation per invocation.
//! - Print results as JSON on stdout; print failures as JSON on stderr with
//!   an exit code chosen by error kind.

use bookloan_core::db::{open_db, DbError};
use bookloan_core::logging::LogInitError;
use bookloan_core::{
    default_log_level, init_logging, CatalogRepository, ErrorKind, LoanService,
    LoanServiceError, NewBook, NewClient, RepoError, SqliteCatalogRepository, SqliteLoanStore,
    SystemClock,
};
use clap::{Parser, Subcommand};
use log::info;
use serde_json::{json, Value};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "bookloan", version, about = "Library lending operations")]
struct Cli {
    /// SQLite database file, created and migrated on first use.
    #[arg(long, env = "BOOKLOAN_DB", default_value = "bookloan.sqlite3")]
    db: PathBuf,

    /// trace|debug|info|warn|error
    #[arg(long, default_value_t = default_log_level().to_string())]
    log_level: String,

    /// Absolute directory for rolling log files. Logging is off when neither
    /// the flag nor `BOOKLOAN_LOG_DIR` is set.
    #[arg(long, env = "BOOKLOAN_LOG_DIR")]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Register a book.
    AddBook {
        title: String,
        author: String,
        isbn: String,
    },
    /// Register a client.
    AddClient { name: String, email: String },
    /// List books by title.
    Books {
        #[arg(long)]
        available: Option<bool>,
    },
    /// List clients by name.
    Clients,
    /// Lend a book to a client.
    Lend { client_id: i64, book_id: i64 },
    /// Return a loan and report the fine.
    Return { loan_id: i64 },
    /// Declare a loaned book lost.
    Lost { loan_id: i64 },
    /// Delete a loan record.
    Delete { loan_id: i64 },
    /// List loans, newest first.
    Loans,
    /// Report books whose availability disagrees with their loans.
    Audit,
}

#[derive(Debug)]
enum CliError {
    Logging(LogInitError),
    Db(DbError),
    Repo(RepoError),
    Loan(LoanServiceError),
    Json(serde_json::Error),
}

impl CliError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Loan(err) => err.kind(),
            Self::Repo(RepoError::Validation(_)) => ErrorKind::Validation,
            Self::Repo(RepoError::DuplicateIsbn(_)) | Self::Repo(RepoError::DuplicateEmail(_)) => {
                ErrorKind::Conflict
            }
            _ => ErrorKind::Internal,
        }
    }

    fn exit_code(&self) -> u8 {
        match self.kind() {
            ErrorKind::Internal => 1,
            ErrorKind::Validation => 2,
            ErrorKind::NotFound => 3,
            ErrorKind::Conflict => 4,
        }
    }
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Logging(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Loan(err) => write!(f, "{err}"),
            Self::Json(err) => write!(f, "{err}"),
        }
    }
}

impl From<LogInitError> for CliError {
    fn from(value: LogInitError) -> Self {
        Self::Logging(value)
    }
}

impl From<DbError> for CliError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<RepoError> for CliError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<LoanServiceError> for CliError {
    fn from(value: LoanServiceError) -> Self {
        Self::Loan(value)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!(
                "{}",
                json!({ "error": err.kind().as_str(), "message": err.to_string() })
            );
            ExitCode::from(err.exit_code())
        }
    }
}

fn run(cli: Cli) -> Result<Value, CliError> {
    if let Some(log_dir) = cli.log_dir.as_deref() {
        init_logging(&cli.log_level, log_dir)?;
    }
    info!(
        "event=cli_command module=cli status=start command={:?}",
        cli.command
    );

    let conn = open_db(&cli.db)?;
    let catalog = SqliteCatalogRepository::try_new(&conn)?;
    let loans = LoanService::new(SqliteLoanStore::try_new(&conn)?, SystemClock);

    let output = match cli.command {
        Command::AddBook {
            title,
            author,
            isbn,
        } => serde_json::to_value(catalog.insert_book(&NewBook::new(title, author, isbn))?)?,
        Command::AddClient { name, email } => {
            serde_json::to_value(catalog.insert_client(&NewClient::new(name, email))?)?
        }
        Command::Books { available } => serde_json::to_value(catalog.list_books(available)?)?,
        Command::Clients => serde_json::to_value(catalog.list_clients()?)?,
        Command::Lend { client_id, book_id } => {
            serde_json::to_value(loans.create_loan(client_id, book_id)?)?
        }
        Command::Return { loan_id } => serde_json::to_value(loans.return_loan(loan_id)?)?,
        Command::Lost { loan_id } => serde_json::to_value(loans.mark_lost(loan_id)?)?,
        Command::Delete { loan_id } => {
            loans.delete_loan(loan_id)?;
            json!({ "deleted": loan_id })
        }
        Command::Loans => serde_json::to_value(loans.list_loans()?)?,
        Command::Audit => serde_json::to_value(loans.check_availability()?)?,
    };
    Ok(output)
}
