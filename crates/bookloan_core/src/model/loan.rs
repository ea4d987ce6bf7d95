//! Loan domain model.
//!
//! # Responsibility
//! - Define the loan record, its lifecycle status and listing projection.
//!
//! # Invariants
//! - Status only moves `OnLoan -> Returned` or `OnLoan -> Lost`.
//! - `return_date` is `None` iff `status == OnLoan`.
//! - `due_date >= loan_date`.

use crate::model::book::BookId;
use crate::model::client::ClientId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Store-assigned loan identity.
pub type LoanId = i64;

/// Loan lifecycle state. `Returned` and `Lost` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    /// Book is out with the client.
    OnLoan,
    /// Book came back.
    Returned,
    /// Book was declared lost; it stays out of circulation.
    Lost,
}

impl LoanStatus {
    /// Returns whether no further transition is allowed.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::OnLoan)
    }

    /// Storage/wire token (`on_loan|returned|lost`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OnLoan => "on_loan",
            Self::Returned => "returned",
            Self::Lost => "lost",
        }
    }

    /// Parses a storage token produced by [`LoanStatus::as_str`].
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "on_loan" => Some(Self::OnLoan),
            "returned" => Some(Self::Returned),
            "lost" => Some(Self::Lost),
            _ => None,
        }
    }
}

impl Display for LoanStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted loan row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub client_id: ClientId,
    pub book_id: BookId,
    pub loan_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
}

impl Loan {
    /// Returns whether this loan still holds its book.
    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::OnLoan
    }
}

/// Insert payload for a fresh `OnLoan` loan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLoan {
    pub client_id: ClientId,
    pub book_id: BookId,
    pub loan_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
}

/// Result of a successful return: the closed loan and the fine owed.
///
/// The fine is reported once, at return time; it is not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnOutcome {
    pub loan: Loan,
    pub fine: Decimal,
}

/// Denormalized loan row joined with client and book details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanListing {
    pub id: LoanId,
    pub loan_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub client_id: ClientId,
    pub client_name: String,
    pub book_id: BookId,
    pub book_title: String,
    pub book_author: String,
}

/// A book whose `available` flag disagrees with its loans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityMismatch {
    pub book_id: BookId,
    /// Flag as stored on the book row.
    pub flagged_available: bool,
    /// Number of `OnLoan` loans referencing the book.
    pub active_loans: u32,
}
