//! Core lending logic for the library loan system.
//! This crate is the single writer of loan state and book availability.

pub mod clock;
pub mod db;
pub mod logging;
pub mod model;
pub mod policy;
pub mod repo;
pub mod service;

pub use clock::{Clock, FixedClock, SystemClock};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::book::{Book, BookId, NewBook};
pub use model::client::{Client, ClientId, NewClient};
pub use model::loan::{
    AvailabilityMismatch, Loan, LoanId, LoanListing, LoanStatus, NewLoan, ReturnOutcome,
};
pub use model::validation::ValidationError;
pub use policy::{compute_due_date, compute_fine, FINE_PER_DAY_LATE, LOAN_PERIOD_DAYS};
pub use repo::catalog_repo::{CatalogRepository, SqliteCatalogRepository};
pub use repo::loan_repo::{LoanStore, LoanTx, SqliteLoanStore, SqliteLoanTx};
pub use repo::{RepoError, RepoResult};
pub use service::loan_service::{ErrorKind, LoanService, LoanServiceError, LoanServiceResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
