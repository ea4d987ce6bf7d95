use bookloan_core::db::open_db_in_memory;
use bookloan_core::{
    Book, CatalogRepository, Client, ErrorKind, FixedClock, LoanService, LoanServiceError,
    LoanStatus, NewBook, NewClient, SqliteCatalogRepository, SqliteLoanStore,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

fn seed(conn: &Connection) -> (Client, Book) {
    let catalog = SqliteCatalogRepository::try_new(conn).unwrap();
    let client = catalog
        .insert_client(&NewClient::new("Maria Silva", "maria@example.com"))
        .unwrap();
    let book = catalog
        .insert_book(&NewBook::new("1984", "George Orwell", "9788535905959"))
        .unwrap();
    (client, book)
}

fn book_available(conn: &Connection, book_id: i64) -> bool {
    let catalog = SqliteCatalogRepository::try_new(conn).unwrap();
    catalog.get_book(book_id).unwrap().unwrap().available
}

fn active_loans_for(conn: &Connection, book_id: i64) -> i64 {
    conn.query_row(
        "SELECT COUNT(*) FROM loans WHERE book_id = ?1 AND status = 'on_loan';",
        [book_id],
        |row| row.get(0),
    )
    .unwrap()
}

fn loan_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM loans;", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn create_loan_marks_book_unavailable_and_sets_due_date() {
    let conn = open_db_in_memory().unwrap();
    let (client, book) = seed(&conn);
    let clock = FixedClock::new(at(2024, 1, 1, 10));
    let service = LoanService::new(SqliteLoanStore::try_new(&conn).unwrap(), &clock);

    let loan = service.create_loan(client.id, book.id).unwrap();

    assert_eq!(loan.status, LoanStatus::OnLoan);
    assert_eq!(loan.client_id, client.id);
    assert_eq!(loan.book_id, book.id);
    assert_eq!(loan.loan_date, at(2024, 1, 1, 10));
    assert_eq!(loan.due_date, at(2024, 1, 31, 10));
    assert_eq!(loan.return_date, None);
    assert!(!book_available(&conn, book.id));
    assert_eq!(active_loans_for(&conn, book.id), 1);
}

#[test]
fn create_loan_on_weekend_target_moves_due_date_to_monday() {
    let conn = open_db_in_memory().unwrap();
    let (client, book) = seed(&conn);
    // 2024-01-04 + 30 days = Saturday 2024-02-03
    let clock = FixedClock::new(at(2024, 1, 4, 9));
    let service = LoanService::new(SqliteLoanStore::try_new(&conn).unwrap(), &clock);

    let loan = service.create_loan(client.id, book.id).unwrap();
    assert_eq!(loan.due_date, at(2024, 2, 5, 9));
}

#[test]
fn create_loan_on_unavailable_book_conflicts_and_creates_nothing() {
    let conn = open_db_in_memory().unwrap();
    let (client, book) = seed(&conn);
    let clock = FixedClock::new(at(2024, 1, 1, 10));
    let service = LoanService::new(SqliteLoanStore::try_new(&conn).unwrap(), &clock);

    service.create_loan(client.id, book.id).unwrap();
    let err = service.create_loan(client.id, book.id).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(matches!(err, LoanServiceError::BookUnavailable(id) if id == book.id));
    assert_eq!(loan_count(&conn), 1);
    assert!(!book_available(&conn, book.id));
}

#[test]
fn create_loan_with_missing_references_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let (client, book) = seed(&conn);
    let clock = FixedClock::new(at(2024, 1, 1, 10));
    let service = LoanService::new(SqliteLoanStore::try_new(&conn).unwrap(), &clock);

    let err = service.create_loan(client.id, 404).unwrap_err();
    assert!(matches!(err, LoanServiceError::BookNotFound(404)));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = service.create_loan(404, book.id).unwrap_err();
    assert!(matches!(err, LoanServiceError::ClientNotFound(404)));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    assert_eq!(loan_count(&conn), 0);
    assert!(book_available(&conn, book.id));
}

#[test]
fn active_loan_index_guards_against_a_stale_availability_flag() {
    let conn = open_db_in_memory().unwrap();
    let (client, book) = seed(&conn);
    let clock = FixedClock::new(at(2024, 1, 1, 10));
    let service = LoanService::new(SqliteLoanStore::try_new(&conn).unwrap(), &clock);

    service.create_loan(client.id, book.id).unwrap();
    conn.execute("UPDATE books SET available = 1 WHERE id = ?1;", [book.id])
        .unwrap();

    let err = service.create_loan(client.id, book.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(active_loans_for(&conn, book.id), 1);
    // The rolled-back transaction must not have touched the flag either.
    assert!(book_available(&conn, book.id));
}

#[test]
fn return_loan_frees_book_and_reports_fine() {
    let conn = open_db_in_memory().unwrap();
    let (client, book) = seed(&conn);
    let clock = FixedClock::new(at(2024, 1, 1, 10));
    let service = LoanService::new(SqliteLoanStore::try_new(&conn).unwrap(), &clock);

    let loan = service.create_loan(client.id, book.id).unwrap();
    clock.set(at(2024, 2, 3, 10));
    let outcome = service.return_loan(loan.id).unwrap();

    assert_eq!(outcome.fine, dec!(1.50));
    assert_eq!(outcome.loan.status, LoanStatus::Returned);
    assert_eq!(outcome.loan.return_date, Some(at(2024, 2, 3, 10)));
    assert_eq!(outcome.loan.due_date, at(2024, 1, 31, 10));
    assert!(book_available(&conn, book.id));
    assert_eq!(active_loans_for(&conn, book.id), 0);
}

#[test]
fn on_time_return_has_no_fine() {
    let conn = open_db_in_memory().unwrap();
    let (client, book) = seed(&conn);
    let clock = FixedClock::new(at(2024, 1, 1, 10));
    let service = LoanService::new(SqliteLoanStore::try_new(&conn).unwrap(), &clock);

    let loan = service.create_loan(client.id, book.id).unwrap();
    clock.advance(Duration::days(7));
    let outcome = service.return_loan(loan.id).unwrap();
    assert_eq!(outcome.fine, Decimal::ZERO);
}

#[test]
fn returned_book_can_be_lent_again() {
    let conn = open_db_in_memory().unwrap();
    let (client, book) = seed(&conn);
    let clock = FixedClock::new(at(2024, 1, 1, 10));
    let service = LoanService::new(SqliteLoanStore::try_new(&conn).unwrap(), &clock);

    let first = service.create_loan(client.id, book.id).unwrap();
    service.return_loan(first.id).unwrap();
    clock.advance(Duration::days(1));
    let second = service.create_loan(client.id, book.id).unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(active_loans_for(&conn, book.id), 1);
}

#[test]
fn closed_loans_reject_return_and_mark_lost_without_mutation() {
    let conn = open_db_in_memory().unwrap();
    let (client, book) = seed(&conn);
    let clock = FixedClock::new(at(2024, 1, 1, 10));
    let service = LoanService::new(SqliteLoanStore::try_new(&conn).unwrap(), &clock);

    let loan = service.create_loan(client.id, book.id).unwrap();
    let returned = service.return_loan(loan.id).unwrap().loan;
    clock.advance(Duration::days(3));

    let err = service.return_loan(loan.id).unwrap_err();
    assert!(matches!(
        err,
        LoanServiceError::LoanClosed {
            status: LoanStatus::Returned,
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let err = service.mark_lost(loan.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let listing = service.list_loans().unwrap();
    assert_eq!(listing[0].status, LoanStatus::Returned);
    assert_eq!(listing[0].return_date, returned.return_date);
    assert!(book_available(&conn, book.id));
}

#[test]
fn mark_lost_keeps_book_unavailable_and_is_terminal() {
    let conn = open_db_in_memory().unwrap();
    let (client, book) = seed(&conn);
    let clock = FixedClock::new(at(2024, 1, 1, 10));
    let service = LoanService::new(SqliteLoanStore::try_new(&conn).unwrap(), &clock);

    let loan = service.create_loan(client.id, book.id).unwrap();
    clock.set(at(2024, 3, 1, 12));
    let lost = service.mark_lost(loan.id).unwrap();

    assert_eq!(lost.status, LoanStatus::Lost);
    assert_eq!(lost.return_date, Some(at(2024, 3, 1, 12)));
    assert!(!book_available(&conn, book.id));

    clock.advance(Duration::days(1));
    let err = service.mark_lost(loan.id).unwrap_err();
    assert!(matches!(
        err,
        LoanServiceError::LoanClosed {
            status: LoanStatus::Lost,
            ..
        }
    ));
    let err = service.return_loan(loan.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let listing = service.list_loans().unwrap();
    assert_eq!(listing[0].return_date, Some(at(2024, 3, 1, 12)));
    assert!(!book_available(&conn, book.id));
}

#[test]
fn lifecycle_operations_on_missing_loan_are_not_found() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn);
    let clock = FixedClock::new(at(2024, 1, 1, 10));
    let service = LoanService::new(SqliteLoanStore::try_new(&conn).unwrap(), &clock);

    assert!(matches!(
        service.return_loan(77).unwrap_err(),
        LoanServiceError::LoanNotFound(77)
    ));
    assert!(matches!(
        service.mark_lost(77).unwrap_err(),
        LoanServiceError::LoanNotFound(77)
    ));
    let err = service.delete_loan(77).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn deleting_active_loan_restores_availability() {
    let conn = open_db_in_memory().unwrap();
    let (client, book) = seed(&conn);
    let clock = FixedClock::new(at(2024, 1, 1, 10));
    let service = LoanService::new(SqliteLoanStore::try_new(&conn).unwrap(), &clock);

    let loan = service.create_loan(client.id, book.id).unwrap();
    service.delete_loan(loan.id).unwrap();

    assert_eq!(loan_count(&conn), 0);
    assert!(book_available(&conn, book.id));
}

#[test]
fn deleting_closed_loan_leaves_availability_untouched() {
    let conn = open_db_in_memory().unwrap();
    let (client, book) = seed(&conn);
    let clock = FixedClock::new(at(2024, 1, 1, 10));
    let service = LoanService::new(SqliteLoanStore::try_new(&conn).unwrap(), &clock);

    let lost = service.create_loan(client.id, book.id).unwrap();
    service.mark_lost(lost.id).unwrap();
    service.delete_loan(lost.id).unwrap();
    assert!(!book_available(&conn, book.id));

    let catalog = SqliteCatalogRepository::try_new(&conn).unwrap();
    let other = catalog
        .insert_book(&NewBook::new("Dom Casmurro", "Machado de Assis", "9788573268802"))
        .unwrap();
    let returned = service.create_loan(client.id, other.id).unwrap();
    service.return_loan(returned.id).unwrap();
    service.delete_loan(returned.id).unwrap();
    assert!(book_available(&conn, other.id));
    assert_eq!(loan_count(&conn), 0);
}

#[test]
fn list_loans_joins_details_newest_first() {
    let conn = open_db_in_memory().unwrap();
    let (client, book) = seed(&conn);
    let catalog = SqliteCatalogRepository::try_new(&conn).unwrap();
    let other = catalog
        .insert_book(&NewBook::new("Dom Casmurro", "Machado de Assis", "9788573268802"))
        .unwrap();
    let clock = FixedClock::new(at(2024, 1, 1, 10));
    let service = LoanService::new(SqliteLoanStore::try_new(&conn).unwrap(), &clock);

    assert!(service.list_loans().unwrap().is_empty());

    let older = service.create_loan(client.id, book.id).unwrap();
    clock.advance(Duration::days(2));
    let newer = service.create_loan(client.id, other.id).unwrap();

    let listing = service.list_loans().unwrap();
    assert_eq!(listing.len(), 2);
    assert_eq!(listing[0].id, newer.id);
    assert_eq!(listing[0].book_title, "Dom Casmurro");
    assert_eq!(listing[0].book_author, "Machado de Assis");
    assert_eq!(listing[0].client_name, "Maria Silva");
    assert_eq!(listing[1].id, older.id);
    assert_eq!(listing[1].due_date, older.due_date);

    // Re-running the listing reflects current data.
    service.return_loan(older.id).unwrap();
    let listing = service.list_loans().unwrap();
    assert_eq!(listing[1].status, LoanStatus::Returned);
}

#[test]
fn check_availability_reports_flags_out_of_step_with_loans() {
    let conn = open_db_in_memory().unwrap();
    let (client, book) = seed(&conn);
    let clock = FixedClock::new(at(2024, 1, 1, 10));
    let service = LoanService::new(SqliteLoanStore::try_new(&conn).unwrap(), &clock);

    assert!(service.check_availability().unwrap().is_empty());
    service.create_loan(client.id, book.id).unwrap();
    assert!(service.check_availability().unwrap().is_empty());

    conn.execute("UPDATE books SET available = 1 WHERE id = ?1;", [book.id])
        .unwrap();
    let mismatches = service.check_availability().unwrap();
    assert_eq!(mismatches.len(), 1);
    assert_eq!(mismatches[0].book_id, book.id);
    assert!(mismatches[0].flagged_available);
    assert_eq!(mismatches[0].active_loans, 1);
}

#[test]
fn check_availability_lists_lost_books_before_and_after_loan_deletion() {
    let conn = open_db_in_memory().unwrap();
    let (client, book) = seed(&conn);
    let clock = FixedClock::new(at(2024, 1, 1, 10));
    let service = LoanService::new(SqliteLoanStore::try_new(&conn).unwrap(), &clock);

    let loan = service.create_loan(client.id, book.id).unwrap();
    service.mark_lost(loan.id).unwrap();
    let after_lost = service.check_availability().unwrap();
    assert_eq!(after_lost.len(), 1);
    assert_eq!(after_lost[0].book_id, book.id);
    assert!(!after_lost[0].flagged_available);
    assert_eq!(after_lost[0].active_loans, 0);

    service.delete_loan(loan.id).unwrap();
    assert_eq!(loan_count(&conn), 0);
    assert!(!book_available(&conn, book.id));
    assert_eq!(service.check_availability().unwrap(), after_lost);
}
