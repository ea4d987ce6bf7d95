//! Loan lifecycle service.
//!
//! # Responsibility
//! - Create, return, mark lost and delete loans, keeping book availability
//!   in step with loan state.
//! - Compute due dates and fines through `policy`.
//!
//! # Invariants
//! - Every mutating operation runs in exactly one store transaction; any
//!   failure drops the transaction uncommitted, so nothing partial survives.
//! - At most one `OnLoan` loan per book after every commit.
//! - Only `OnLoan -> Returned` and `OnLoan -> Lost` transitions are allowed.
//! - Marking a loan lost leaves its book unavailable; returning it frees
//!   the book.
//! - The service keeps no state between calls; the store is the only
//!   source of truth.

use crate::clock::Clock;
use crate::model::book::BookId;
use crate::model::client::ClientId;
use crate::model::loan::{
    AvailabilityMismatch, Loan, LoanId, LoanListing, LoanStatus, NewLoan, ReturnOutcome,
};
use crate::model::validation::ValidationError;
use crate::policy::{compute_due_date, compute_fine};
use crate::repo::loan_repo::{LoanStore, LoanTx};
use crate::repo::RepoError;
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type LoanServiceResult<T> = Result<T, LoanServiceError>;

/// Caller-facing failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Referenced book, client or loan does not exist.
    NotFound,
    /// Current data forbids the requested transition.
    Conflict,
    /// Input failed field validation.
    Validation,
    /// Unexpected storage failure.
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Validation => "validation",
            Self::Internal => "internal",
        }
    }
}

/// Errors from loan lifecycle operations.
#[derive(Debug)]
pub enum LoanServiceError {
    BookNotFound(BookId),
    ClientNotFound(ClientId),
    LoanNotFound(LoanId),
    /// Book is already out on another loan (or lost).
    BookUnavailable(BookId),
    /// Loan already reached a terminal status.
    LoanClosed { loan_id: LoanId, status: LoanStatus },
    Validation(ValidationError),
    /// Storage failure surfaced unchanged.
    Internal(RepoError),
}

impl LoanServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BookNotFound(_) | Self::ClientNotFound(_) | Self::LoanNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::BookUnavailable(_) | Self::LoanClosed { .. } => ErrorKind::Conflict,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl Display for LoanServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BookNotFound(id) => write!(f, "book not found: {id}"),
            Self::ClientNotFound(id) => write!(f, "client not found: {id}"),
            Self::LoanNotFound(id) => write!(f, "loan not found: {id}"),
            Self::BookUnavailable(id) => write!(f, "book unavailable: {id}"),
            Self::LoanClosed { loan_id, status } => {
                write!(f, "loan {loan_id} is already {status}")
            }
            Self::Validation(err) => write!(f, "{err}"),
            Self::Internal(err) => write!(f, "{err}"),
        }
    }
}

impl Error for LoanServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Internal(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for LoanServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::BookNotFound(id) => Self::BookNotFound(id),
            RepoError::LoanNotFound(id) => Self::LoanNotFound(id),
            RepoError::ActiveLoanExists(id) => Self::BookUnavailable(id),
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Internal(other),
        }
    }
}

/// Loan lifecycle service over an injected store and clock.
pub struct LoanService<S: LoanStore, C: Clock> {
    store: S,
    clock: C,
}

impl<S: LoanStore, C: Clock> LoanService<S, C> {
    pub fn new(store: S, clock: C) -> Self {
        Self { store, clock }
    }

    /// Lends `book_id` to `client_id`.
    ///
    /// # Contract
    /// - Missing book or client -> `NotFound`.
    /// - Book already out -> `BookUnavailable` (`Conflict`).
    /// - On success the book is unavailable and the returned loan is
    ///   `OnLoan` with `due_date = compute_due_date(loan_date)`.
    pub fn create_loan(&self, client_id: ClientId, book_id: BookId) -> LoanServiceResult<Loan> {
        let started_at = Instant::now();
        let result = self.create_loan_tx(client_id, book_id);
        match &result {
            Ok(loan) => info!(
                "event=loan_create module=loan status=ok loan_id={} client_id={} book_id={} due_date={} duration_ms={}",
                loan.id,
                client_id,
                book_id,
                loan.due_date.to_rfc3339(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => log_failure(
                "loan_create",
                &format!("client_id={client_id} book_id={book_id}"),
                started_at,
                err,
            ),
        }
        result
    }

    fn create_loan_tx(&self, client_id: ClientId, book_id: BookId) -> LoanServiceResult<Loan> {
        let tx = self.store.begin()?;

        let book = tx
            .book_for_update(book_id)?
            .ok_or(LoanServiceError::BookNotFound(book_id))?;
        if !tx.client_exists(client_id)? {
            return Err(LoanServiceError::ClientNotFound(client_id));
        }
        if !book.available {
            return Err(LoanServiceError::BookUnavailable(book_id));
        }

        let loan_date = self.clock.now();
        let loan = tx.insert_loan(&NewLoan {
            client_id,
            book_id,
            loan_date,
            due_date: compute_due_date(loan_date),
        })?;
        tx.set_book_available(book_id, false)?;
        tx.commit()?;
        Ok(loan)
    }

    /// Closes an active loan as returned and reports the fine owed.
    ///
    /// The fine is not persisted.
    pub fn return_loan(&self, loan_id: LoanId) -> LoanServiceResult<ReturnOutcome> {
        let started_at = Instant::now();
        let result = self.return_loan_tx(loan_id);
        match &result {
            Ok(outcome) => info!(
                "event=loan_return module=loan status=ok loan_id={} book_id={} fine={} duration_ms={}",
                loan_id,
                outcome.loan.book_id,
                outcome.fine,
                started_at.elapsed().as_millis()
            ),
            Err(err) => log_failure(
                "loan_return",
                &format!("loan_id={loan_id}"),
                started_at,
                err,
            ),
        }
        result
    }

    fn return_loan_tx(&self, loan_id: LoanId) -> LoanServiceResult<ReturnOutcome> {
        let tx = self.store.begin()?;
        let mut loan = load_active_loan(&tx, loan_id)?;

        let return_date = self.clock.now();
        let fine = compute_fine(loan.due_date, return_date);
        tx.close_loan(loan_id, LoanStatus::Returned, return_date)?;
        tx.set_book_available(loan.book_id, true)?;
        tx.commit()?;

        loan.status = LoanStatus::Returned;
        loan.return_date = Some(return_date);
        Ok(ReturnOutcome { loan, fine })
    }

    /// Closes an active loan as lost. The book stays unavailable.
    ///
    /// Re-marking a lost loan is rejected like any other closed loan.
    pub fn mark_lost(&self, loan_id: LoanId) -> LoanServiceResult<Loan> {
        let started_at = Instant::now();
        let result = self.mark_lost_tx(loan_id);
        match &result {
            Ok(loan) => info!(
                "event=loan_mark_lost module=loan status=ok loan_id={} book_id={} duration_ms={}",
                loan_id,
                loan.book_id,
                started_at.elapsed().as_millis()
            ),
            Err(err) => log_failure(
                "loan_mark_lost",
                &format!("loan_id={loan_id}"),
                started_at,
                err,
            ),
        }
        result
    }

    fn mark_lost_tx(&self, loan_id: LoanId) -> LoanServiceResult<Loan> {
        let tx = self.store.begin()?;
        let mut loan = load_active_loan(&tx, loan_id)?;

        let return_date = self.clock.now();
        tx.close_loan(loan_id, LoanStatus::Lost, return_date)?;
        tx.commit()?;

        loan.status = LoanStatus::Lost;
        loan.return_date = Some(return_date);
        Ok(loan)
    }

    /// Deletes a loan, freeing its book first when the loan is still active.
    pub fn delete_loan(&self, loan_id: LoanId) -> LoanServiceResult<()> {
        let started_at = Instant::now();
        let result = self.delete_loan_tx(loan_id);
        match &result {
            Ok(released_book) => info!(
                "event=loan_delete module=loan status=ok loan_id={} released_book={} duration_ms={}",
                loan_id,
                released_book.map_or_else(|| "none".to_string(), |id| id.to_string()),
                started_at.elapsed().as_millis()
            ),
            Err(err) => log_failure(
                "loan_delete",
                &format!("loan_id={loan_id}"),
                started_at,
                err,
            ),
        }
        result.map(|_| ())
    }

    fn delete_loan_tx(&self, loan_id: LoanId) -> LoanServiceResult<Option<BookId>> {
        let tx = self.store.begin()?;
        let loan = tx
            .loan_for_update(loan_id)?
            .ok_or(LoanServiceError::LoanNotFound(loan_id))?;

        let released_book = if loan.is_active() {
            tx.set_book_available(loan.book_id, true)?;
            Some(loan.book_id)
        } else {
            None
        };
        tx.delete_loan(loan_id)?;
        tx.commit()?;
        Ok(released_book)
    }

    /// Lists every loan with client and book details, newest `loan_date`
    /// first. Each call re-runs one query against current data.
    pub fn list_loans(&self) -> LoanServiceResult<Vec<LoanListing>> {
        let started_at = Instant::now();
        match self.store.list_loans() {
            Ok(listings) => {
                info!(
                    "event=loan_list module=loan status=ok count={} duration_ms={}",
                    listings.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(listings)
            }
            Err(err) => {
                let err = LoanServiceError::from(err);
                log_failure("loan_list", "scope=all", started_at, &err);
                Err(err)
            }
        }
    }

    /// Reports books whose availability flag disagrees with the presence of
    /// an `OnLoan` loan. Read-only.
    ///
    /// Books lost through `mark_lost` stay unavailable with no active loan,
    /// so they are reported too, also after their loan row is deleted. Any
    /// other entry means some writer bypassed this service.
    pub fn check_availability(&self) -> LoanServiceResult<Vec<AvailabilityMismatch>> {
        let started_at = Instant::now();
        match self.store.availability_mismatches() {
            Ok(mismatches) => {
                for mismatch in &mismatches {
                    warn!(
                        "event=availability_mismatch module=loan status=warn book_id={} flagged_available={} active_loans={}",
                        mismatch.book_id, mismatch.flagged_available, mismatch.active_loans
                    );
                }
                info!(
                    "event=availability_check module=loan status=ok mismatches={} duration_ms={}",
                    mismatches.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(mismatches)
            }
            Err(err) => {
                let err = LoanServiceError::from(err);
                log_failure("availability_check", "scope=all", started_at, &err);
                Err(err)
            }
        }
    }
}

fn load_active_loan<T: LoanTx>(tx: &T, loan_id: LoanId) -> LoanServiceResult<Loan> {
    let loan = tx
        .loan_for_update(loan_id)?
        .ok_or(LoanServiceError::LoanNotFound(loan_id))?;
    if loan.status.is_terminal() {
        return Err(LoanServiceError::LoanClosed {
            loan_id,
            status: loan.status,
        });
    }
    Ok(loan)
}

fn log_failure(event: &str, subject: &str, started_at: Instant, err: &LoanServiceError) {
    let kind = err.kind();
    match kind {
        ErrorKind::Internal => error!(
            "event={} module=loan status=error {} error_kind={} duration_ms={} error={}",
            event,
            subject,
            kind.as_str(),
            started_at.elapsed().as_millis(),
            err
        ),
        _ => warn!(
            "event={} module=loan status=rejected {} error_kind={} duration_ms={} error={}",
            event,
            subject,
            kind.as_str(),
            started_at.elapsed().as_millis(),
            err
        ),
    }
}
