//! Loan persistence contracts and SQLite implementation.
//!
//! # Responsibility
//! - Open write transactions that serialize loan lifecycle changes.
//! - Provide the row-level primitives the loan service composes inside one
//!   transaction: locked reads, loan insert/close/delete, availability writes.
//! - Serve the denormalized loan listing and the availability audit.
//!
//! # Invariants
//! - `LoanStore::begin` returns a transaction that already holds the
//!   store's write lock, so reads made through it cannot go stale before
//!   commit.
//! - Dropping a `LoanTx` without `commit` rolls back every write made
//!   through it.
//! - At most one `on_loan` row per book (unique partial index); a violation
//!   is reported as `RepoError::ActiveLoanExists`.

use super::catalog_repo::load_book;
use super::{bool_to_int, ensure_schema_ready, from_epoch_ms, int_to_bool, is_unique_violation};
use super::to_epoch_ms;
use super::{RepoError, RepoResult};
use crate::model::book::{Book, BookId};
use crate::model::client::ClientId;
use crate::model::loan::{AvailabilityMismatch, Loan, LoanId, LoanListing, LoanStatus, NewLoan};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};

/// One write transaction over books and loans.
pub trait LoanTx {
    /// Reads a book under the transaction's write lock.
    fn book_for_update(&self, book_id: BookId) -> RepoResult<Option<Book>>;
    fn client_exists(&self, client_id: ClientId) -> RepoResult<bool>;
    /// Reads a loan under the transaction's write lock.
    fn loan_for_update(&self, loan_id: LoanId) -> RepoResult<Option<Loan>>;
    /// Inserts an `OnLoan` loan and returns it with its assigned id.
    fn insert_loan(&self, loan: &NewLoan) -> RepoResult<Loan>;
    fn set_book_available(&self, book_id: BookId, available: bool) -> RepoResult<()>;
    /// Moves an `OnLoan` loan to a terminal status.
    fn close_loan(
        &self,
        loan_id: LoanId,
        status: LoanStatus,
        return_date: DateTime<Utc>,
    ) -> RepoResult<()>;
    fn delete_loan(&self, loan_id: LoanId) -> RepoResult<()>;
    fn commit(self) -> RepoResult<()>;
}

/// Storage handle the loan service is built on.
pub trait LoanStore {
    type Tx<'a>: LoanTx
    where
        Self: 'a;

    /// Begins a write transaction holding the store's write lock.
    fn begin(&self) -> RepoResult<Self::Tx<'_>>;
    /// Lists all loans joined with client and book, newest first.
    fn list_loans(&self) -> RepoResult<Vec<LoanListing>>;
    /// Books whose availability flag disagrees with the presence of an
    /// `OnLoan` loan.
    fn availability_mismatches(&self) -> RepoResult<Vec<AvailabilityMismatch>>;
}

/// SQLite-backed loan store.
pub struct SqliteLoanStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLoanStore<'conn> {
    /// Creates store from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self { conn })
    }
}

/// SQLite transaction opened with `BEGIN IMMEDIATE`.
pub struct SqliteLoanTx<'conn> {
    tx: Transaction<'conn>,
}

impl LoanStore for SqliteLoanStore<'_> {
    type Tx<'a>
        = SqliteLoanTx<'a>
    where
        Self: 'a;

    fn begin(&self) -> RepoResult<Self::Tx<'_>> {
        // SQLite has no row locks; IMMEDIATE takes the database write lock up
        // front, so concurrent writers queue behind this transaction.
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        Ok(SqliteLoanTx { tx })
    }

    fn list_loans(&self) -> RepoResult<Vec<LoanListing>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                l.id AS id,
                l.loan_date AS loan_date,
                l.due_date AS due_date,
                l.return_date AS return_date,
                l.status AS status,
                c.id AS client_id,
                c.name AS client_name,
                b.id AS book_id,
                b.title AS book_title,
                b.author AS book_author
             FROM loans l
             INNER JOIN clients c ON c.id = l.client_id
             INNER JOIN books b ON b.id = l.book_id
             ORDER BY l.loan_date DESC, l.id DESC;",
        )?;

        let mut rows = stmt.query([])?;
        let mut listings = Vec::new();
        while let Some(row) = rows.next()? {
            listings.push(LoanListing {
                id: row.get("id")?,
                loan_date: from_epoch_ms(row.get("loan_date")?, "loans.loan_date")?,
                due_date: from_epoch_ms(row.get("due_date")?, "loans.due_date")?,
                return_date: parse_return_date(row)?,
                status: parse_status(row)?,
                client_id: row.get("client_id")?,
                client_name: row.get("client_name")?,
                book_id: row.get("book_id")?,
                book_title: row.get("book_title")?,
                book_author: row.get("book_author")?,
            });
        }
        Ok(listings)
    }

    fn availability_mismatches(&self) -> RepoResult<Vec<AvailabilityMismatch>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, available, active_loans
             FROM (
                SELECT
                    b.id AS id,
                    b.available AS available,
                    (SELECT COUNT(*) FROM loans l
                      WHERE l.book_id = b.id AND l.status = 'on_loan') AS active_loans
                FROM books b
             )
             WHERE (available = 1 AND active_loans > 0)
                OR (available = 0 AND active_loans = 0)
             ORDER BY id ASC;",
        )?;

        let mut rows = stmt.query([])?;
        let mut mismatches = Vec::new();
        while let Some(row) = rows.next()? {
            mismatches.push(AvailabilityMismatch {
                book_id: row.get("id")?,
                flagged_available: int_to_bool(row.get("available")?, "books.available")?,
                active_loans: row.get("active_loans")?,
            });
        }
        Ok(mismatches)
    }
}

impl LoanTx for SqliteLoanTx<'_> {
    fn book_for_update(&self, book_id: BookId) -> RepoResult<Option<Book>> {
        load_book(&self.tx, book_id)
    }

    fn client_exists(&self, client_id: ClientId) -> RepoResult<bool> {
        let exists: i64 = self.tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM clients WHERE id = ?1);",
            [client_id],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn loan_for_update(&self, loan_id: LoanId) -> RepoResult<Option<Loan>> {
        let mut stmt = self.tx.prepare(
            "SELECT id, client_id, book_id, loan_date, due_date, return_date, status
             FROM loans
             WHERE id = ?1;",
        )?;
        let mut rows = stmt.query([loan_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_loan_row(row)?));
        }
        Ok(None)
    }

    fn insert_loan(&self, loan: &NewLoan) -> RepoResult<Loan> {
        self.tx
            .execute(
                "INSERT INTO loans (client_id, book_id, loan_date, due_date, return_date, status)
                 VALUES (?1, ?2, ?3, ?4, NULL, 'on_loan');",
                params![
                    loan.client_id,
                    loan.book_id,
                    to_epoch_ms(loan.loan_date),
                    to_epoch_ms(loan.due_date),
                ],
            )
            .map_err(|err| {
                if is_unique_violation(&err) {
                    RepoError::ActiveLoanExists(loan.book_id)
                } else {
                    err.into()
                }
            })?;

        Ok(Loan {
            id: self.tx.last_insert_rowid(),
            client_id: loan.client_id,
            book_id: loan.book_id,
            loan_date: loan.loan_date,
            due_date: loan.due_date,
            return_date: None,
            status: LoanStatus::OnLoan,
        })
    }

    fn set_book_available(&self, book_id: BookId, available: bool) -> RepoResult<()> {
        let changed = self.tx.execute(
            "UPDATE books SET available = ?2 WHERE id = ?1;",
            params![book_id, bool_to_int(available)],
        )?;
        if changed == 0 {
            return Err(RepoError::BookNotFound(book_id));
        }
        Ok(())
    }

    fn close_loan(
        &self,
        loan_id: LoanId,
        status: LoanStatus,
        return_date: DateTime<Utc>,
    ) -> RepoResult<()> {
        if !status.is_terminal() {
            return Err(RepoError::InvalidData(format!(
                "cannot close loan {loan_id} with non-terminal status `{status}`"
            )));
        }

        let changed = self.tx.execute(
            "UPDATE loans
             SET status = ?2,
                 return_date = ?3
             WHERE id = ?1
               AND status = 'on_loan';",
            params![loan_id, status.as_str(), to_epoch_ms(return_date)],
        )?;
        if changed == 0 {
            return Err(RepoError::LoanNotActive(loan_id));
        }
        Ok(())
    }

    fn delete_loan(&self, loan_id: LoanId) -> RepoResult<()> {
        let changed = self
            .tx
            .execute("DELETE FROM loans WHERE id = ?1;", [loan_id])?;
        if changed == 0 {
            return Err(RepoError::LoanNotFound(loan_id));
        }
        Ok(())
    }

    fn commit(self) -> RepoResult<()> {
        self.tx.commit()?;
        Ok(())
    }
}

fn parse_loan_row(row: &Row<'_>) -> RepoResult<Loan> {
    let loan = Loan {
        id: row.get("id")?,
        client_id: row.get("client_id")?,
        book_id: row.get("book_id")?,
        loan_date: from_epoch_ms(row.get("loan_date")?, "loans.loan_date")?,
        due_date: from_epoch_ms(row.get("due_date")?, "loans.due_date")?,
        return_date: parse_return_date(row)?,
        status: parse_status(row)?,
    };

    if loan.is_active() != loan.return_date.is_none() {
        return Err(RepoError::InvalidData(format!(
            "loan {} has status `{}` inconsistent with its return date",
            loan.id, loan.status
        )));
    }
    Ok(loan)
}

fn parse_status(row: &Row<'_>) -> RepoResult<LoanStatus> {
    let value: String = row.get("status")?;
    LoanStatus::parse(&value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid loan status `{value}` in loans.status")))
}

fn parse_return_date(row: &Row<'_>) -> RepoResult<Option<DateTime<Utc>>> {
    match row.get::<_, Option<i64>>("return_date")? {
        Some(value) => Ok(Some(from_epoch_ms(value, "loans.return_date")?)),
        None => Ok(None),
    }
}
