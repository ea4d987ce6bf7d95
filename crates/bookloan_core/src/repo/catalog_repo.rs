//! Book/client catalog repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Register and read the books and clients loans refer to.
//!
//! # Invariants
//! - New books always start available.
//! - ISBNs are stored in canonical digits-only form; emails are unique
//!   case-insensitively.
//! - Book availability is never written here; the loan store owns it.

use super::{bool_to_int, ensure_schema_ready, int_to_bool, is_unique_violation};
use super::{RepoError, RepoResult};
use crate::model::book::{Book, BookId, NewBook};
use crate::model::client::{Client, ClientId, NewClient};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

const BOOK_SELECT_SQL: &str = "SELECT id, title, author, isbn, available FROM books";
const CLIENT_SELECT_SQL: &str = "SELECT id, name, email FROM clients";

/// Repository interface for catalog reads and registrations.
pub trait CatalogRepository {
    fn insert_book(&self, book: &NewBook) -> RepoResult<Book>;
    fn get_book(&self, id: BookId) -> RepoResult<Option<Book>>;
    /// Lists books by title; `available` filters on the availability flag.
    fn list_books(&self, available: Option<bool>) -> RepoResult<Vec<Book>>;
    fn insert_client(&self, client: &NewClient) -> RepoResult<Client>;
    fn get_client(&self, id: ClientId) -> RepoResult<Option<Client>>;
    /// Lists clients by name.
    fn list_clients(&self) -> RepoResult<Vec<Client>>;
}

/// SQLite-backed catalog repository.
pub struct SqliteCatalogRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCatalogRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self { conn })
    }
}

impl CatalogRepository for SqliteCatalogRepository<'_> {
    fn insert_book(&self, book: &NewBook) -> RepoResult<Book> {
        let isbn = book.validate()?;
        let title = book.title.trim();
        let author = book.author.trim();

        self.conn
            .execute(
                "INSERT INTO books (title, author, isbn, available)
                 VALUES (?1, ?2, ?3, 1);",
                params![title, author, isbn.as_str()],
            )
            .map_err(|err| {
                if is_unique_violation(&err) {
                    RepoError::DuplicateIsbn(isbn.clone())
                } else {
                    err.into()
                }
            })?;

        Ok(Book {
            id: self.conn.last_insert_rowid(),
            title: title.to_string(),
            author: author.to_string(),
            isbn,
            available: true,
        })
    }

    fn get_book(&self, id: BookId) -> RepoResult<Option<Book>> {
        load_book(self.conn, id)
    }

    fn list_books(&self, available: Option<bool>) -> RepoResult<Vec<Book>> {
        let mut sql = String::from(BOOK_SELECT_SQL);
        let mut bind_values: Vec<Value> = Vec::new();
        if let Some(available) = available {
            sql.push_str(" WHERE available = ?");
            bind_values.push(Value::Integer(bool_to_int(available)));
        }
        sql.push_str(" ORDER BY title COLLATE NOCASE ASC, id ASC;");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut books = Vec::new();
        while let Some(row) = rows.next()? {
            books.push(parse_book_row(row)?);
        }
        Ok(books)
    }

    fn insert_client(&self, client: &NewClient) -> RepoResult<Client> {
        client.validate()?;
        let name = client.name.trim();
        let email = client.email.trim();

        self.conn
            .execute(
                "INSERT INTO clients (name, email) VALUES (?1, ?2);",
                params![name, email],
            )
            .map_err(|err| {
                if is_unique_violation(&err) {
                    RepoError::DuplicateEmail(email.to_string())
                } else {
                    err.into()
                }
            })?;

        Ok(Client {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            email: email.to_string(),
        })
    }

    fn get_client(&self, id: ClientId) -> RepoResult<Option<Client>> {
        let client = self
            .conn
            .query_row(
                &format!("{CLIENT_SELECT_SQL} WHERE id = ?1;"),
                [id],
                |row| {
                    Ok(Client {
                        id: row.get("id")?,
                        name: row.get("name")?,
                        email: row.get("email")?,
                    })
                },
            )
            .optional()?;
        Ok(client)
    }

    fn list_clients(&self) -> RepoResult<Vec<Client>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CLIENT_SELECT_SQL} ORDER BY name COLLATE NOCASE ASC, id ASC;"
        ))?;
        let clients = stmt
            .query_map([], |row| {
                Ok(Client {
                    id: row.get("id")?,
                    name: row.get("name")?,
                    email: row.get("email")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(clients)
    }
}

pub(super) fn load_book(conn: &Connection, id: BookId) -> RepoResult<Option<Book>> {
    let mut stmt = conn.prepare(&format!("{BOOK_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_book_row(row)?));
    }
    Ok(None)
}

fn parse_book_row(row: &Row<'_>) -> RepoResult<Book> {
    Ok(Book {
        id: row.get("id")?,
        title: row.get("title")?,
        author: row.get("author")?,
        isbn: row.get("isbn")?,
        available: int_to_bool(row.get("available")?, "books.available")?,
    })
}
