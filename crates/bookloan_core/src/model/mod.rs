//! Lending domain model.
//!
//! # Responsibility
//! - Define the records shared by repositories, the loan service and callers.
//! - Keep field validation next to the data it guards.
//!
//! # Invariants
//! - Ids are store-assigned integers and never reused.
//! - `Book::available` mirrors "no `OnLoan` loan references this book".

pub mod book;
pub mod client;
pub mod loan;
pub mod validation;
