//! User repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist the `User` aggregate across the `user` and `book_user` tables.
//! - Reassemble aggregates from the base row plus their book links.
//!
//! # Invariants
//! - Text attributes are stored exactly as given; well-formedness checks
//!   belong to `User` constructors and `UserService`.
//! - After `update` commits, `book_user` rows for the user mirror `books`
//!   exactly; each distinct book id is stored once.
//! - `update` and `delete` are single immediate transactions; any failing
//!   step rolls the whole operation back.
//! - Single-id operations on a missing user fail with `NotFound`;
//!   `search`/`list` with zero rows fail with `NoMatches`.

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::DbError;
use crate::model::id::EntityId;
use crate::model::user::User;
use chrono::{DateTime, SubsecRound, Utc};
use log::{debug, warn};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use std::collections::BTreeSet;
use thiserror::Error;

const USER_SELECT_SQL: &str = "SELECT
    id,
    email,
    password,
    first_name,
    last_name,
    created_at,
    updated_at
FROM user";

const USER_ORDER_SQL: &str = "ORDER BY created_at ASC, id ASC";

const USER_COLUMNS: &[&str] = &[
    "id",
    "email",
    "password",
    "first_name",
    "last_name",
    "created_at",
    "updated_at",
];
const BOOK_USER_COLUMNS: &[&str] = &["user_id", "book_id", "created_at"];

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for user persistence and query operations.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("user not found: {0}")]
    NotFound(EntityId),
    #[error("no users matched")]
    NoMatches,
    #[error("user already exists: {0}")]
    Conflict(EntityId),
    #[error("invalid persisted user data: {0}")]
    InvalidData(String),
    #[error("connection schema version {actual_version} is older than required {expected_version}")]
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    #[error("required table `{0}` is missing")]
    MissingRequiredTable(&'static str),
    #[error("required column `{table}.{column}` is missing")]
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl RepoError {
    /// True for both a missing single user and an empty search/list.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::NoMatches)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Persistence contract for the user aggregate.
pub trait UserRepository {
    /// Stores the base attributes of a new user. Book links are not written.
    ///
    /// `created_at` is persisted from the aggregate at millisecond precision.
    fn create(&self, user: &User) -> RepoResult<EntityId>;
    /// Loads one user together with its book links.
    fn get(&self, id: EntityId) -> RepoResult<User>;
    /// Rewrites base attributes, replaces all book links and stamps
    /// `updated_at` on success.
    fn update(&mut self, user: &mut User) -> RepoResult<()>;
    /// Case-insensitive substring match against `"{first_name} {last_name}"`.
    fn search(&self, query: &str) -> RepoResult<Vec<User>>;
    /// Loads every user.
    fn list(&self) -> RepoResult<Vec<User>>;
    /// Removes a user and its book links.
    fn delete(&mut self, id: EntityId) -> RepoResult<()>;
}

/// SQLite-backed user repository.
pub struct SqliteUserRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteUserRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    ///
    /// # Errors
    /// - `UninitializedConnection` when migrations have not been applied.
    /// - `MissingRequiredTable` / `MissingRequiredColumn` when the schema
    ///   does not carry the `user` and `book_user` shape.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl UserRepository for SqliteUserRepository<'_> {
    fn create(&self, user: &User) -> RepoResult<EntityId> {
        self.conn.execute(
            "INSERT INTO user (
                id,
                email,
                password,
                first_name,
                last_name,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                user.id.to_string(),
                user.email.as_str(),
                user.password.as_str(),
                user.first_name.as_str(),
                user.last_name.as_str(),
                user.created_at.timestamp_millis(),
            ],
        )?;

        debug!("event=user_create module=repo status=ok user_id={}", user.id);
        Ok(user.id)
    }

    fn get(&self, id: EntityId) -> RepoResult<User> {
        load_user(self.conn, id)?.ok_or(RepoError::NotFound(id))
    }

    fn update(&mut self, user: &mut User) -> RepoResult<()> {
        // Stored as epoch milliseconds; keep the in-memory stamp identical.
        let updated_at = Utc::now().trunc_subsecs(3);
        let books: BTreeSet<EntityId> = user.books.iter().copied().collect();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        match replace_user_in_tx(&tx, user, &books, updated_at) {
            Ok(()) => {
                tx.commit()?;
                user.updated_at = Some(updated_at);
                debug!(
                    "event=user_update module=repo status=ok user_id={} books={}",
                    user.id,
                    books.len()
                );
                Ok(())
            }
            Err(err) => {
                warn!(
                    "event=user_update module=repo status=rollback user_id={} error={}",
                    user.id, err
                );
                Err(err)
            }
        }
    }

    fn search(&self, query: &str) -> RepoResult<Vec<User>> {
        let pattern = format!("%{}%", escape_like(query));
        let mut stmt = self.conn.prepare(&format!(
            "{USER_SELECT_SQL}
             WHERE (first_name || ' ' || last_name) LIKE ?1 ESCAPE '\\'
             {USER_ORDER_SQL};"
        ))?;
        let mut rows = stmt.query([pattern.as_str()])?;
        let users = collect_users(self.conn, &mut rows)?;

        debug!(
            "event=user_search module=repo status=ok matches={}",
            users.len()
        );
        non_empty(users)
    }

    fn list(&self) -> RepoResult<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{USER_SELECT_SQL} {USER_ORDER_SQL};"))?;
        let mut rows = stmt.query([])?;
        let users = collect_users(self.conn, &mut rows)?;
        non_empty(users)
    }

    fn delete(&mut self, id: EntityId) -> RepoResult<()> {
        let id_text = id.to_string();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let unlinked = tx.execute(
            "DELETE FROM book_user WHERE user_id = ?1;",
            [id_text.as_str()],
        )?;
        let changed = tx.execute("DELETE FROM user WHERE id = ?1;", [id_text.as_str()])?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        tx.commit()?;

        debug!(
            "event=user_delete module=repo status=ok user_id={} unlinked_books={}",
            id, unlinked
        );
        Ok(())
    }
}

fn replace_user_in_tx(
    tx: &Transaction<'_>,
    user: &User,
    books: &BTreeSet<EntityId>,
    updated_at: DateTime<Utc>,
) -> RepoResult<()> {
    let user_id = user.id.to_string();
    let stamp = updated_at.timestamp_millis();

    let changed = tx.execute(
        "UPDATE user
         SET
            email = ?1,
            password = ?2,
            first_name = ?3,
            last_name = ?4,
            updated_at = ?5
         WHERE id = ?6;",
        params![
            user.email.as_str(),
            user.password.as_str(),
            user.first_name.as_str(),
            user.last_name.as_str(),
            stamp,
            user_id.as_str(),
        ],
    )?;
    if changed == 0 {
        return Err(RepoError::NotFound(user.id));
    }

    tx.execute(
        "DELETE FROM book_user WHERE user_id = ?1;",
        [user_id.as_str()],
    )?;

    let mut insert = tx.prepare(
        "INSERT INTO book_user (user_id, book_id, created_at) VALUES (?1, ?2, ?3);",
    )?;
    for book_id in books {
        insert.execute(params![user_id.as_str(), book_id.to_string(), stamp])?;
    }

    Ok(())
}

fn load_user(conn: &Connection, id: EntityId) -> RepoResult<Option<User>> {
    let mut stmt = conn.prepare(&format!("{USER_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    match rows.next()? {
        Some(row) => {
            let mut user = parse_user_row(row)?;
            user.books = load_books_for_user(conn, id)?;
            Ok(Some(user))
        }
        None => Ok(None),
    }
}

fn collect_users(conn: &Connection, rows: &mut rusqlite::Rows<'_>) -> RepoResult<Vec<User>> {
    let mut users = Vec::new();
    while let Some(row) = rows.next()? {
        let mut user = parse_user_row(row)?;
        user.books = load_books_for_user(conn, user.id)?;
        users.push(user);
    }
    Ok(users)
}

fn load_books_for_user(conn: &Connection, user_id: EntityId) -> RepoResult<Vec<EntityId>> {
    let mut stmt = conn.prepare(
        "SELECT book_id
         FROM book_user
         WHERE user_id = ?1
         ORDER BY book_id ASC;",
    )?;
    let mut rows = stmt.query([user_id.to_string()])?;
    let mut books = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        books.push(parse_id(&value, "book_user.book_id")?);
    }
    Ok(books)
}

fn parse_user_row(row: &Row<'_>) -> RepoResult<User> {
    let id_text: String = row.get("id")?;
    let created_at: i64 = row.get("created_at")?;
    let updated_at: Option<i64> = row.get("updated_at")?;

    Ok(User {
        id: parse_id(&id_text, "user.id")?,
        email: row.get("email")?,
        password: row.get("password")?,
        first_name: row.get("first_name")?,
        last_name: row.get("last_name")?,
        created_at: parse_timestamp(created_at, "user.created_at")?,
        updated_at: updated_at
            .map(|value| parse_timestamp(value, "user.updated_at"))
            .transpose()?,
        books: Vec::new(),
    })
}

fn parse_id(value: &str, column: &str) -> RepoResult<EntityId> {
    value
        .parse()
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

fn parse_timestamp(millis: i64, column: &str) -> RepoResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid timestamp `{millis}` in {column}"))
    })
}

fn non_empty(users: Vec<User>) -> RepoResult<Vec<User>> {
    if users.is_empty() {
        return Err(RepoError::NoMatches);
    }
    Ok(users)
}

/// Escapes `LIKE` wildcards so the query matches literally.
fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for ch in query.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version < expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for (table, columns) in [("user", USER_COLUMNS), ("book_user", BOOK_USER_COLUMNS)] {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !table_has_column(conn, table, column)? {
                return Err(RepoError::MissingRequiredColumn { table, column });
            }
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
