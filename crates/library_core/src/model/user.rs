//! User aggregate.
//!
//! # Responsibility
//! - Hold user attributes plus the set of borrowed book identifiers.
//! - Provide borrow/return helpers that keep `books` free of duplicates.
//!
//! # Invariants
//! - `id` is stable and never reused for another user.
//! - `created_at` never changes after creation.
//! - `books` is treated as a set; order carries no meaning.
//! - `password` is opaque; hashing happens before it reaches this type.

use crate::model::id::EntityId;
use chrono::{DateTime, SubsecRound, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+$").expect("valid email regex"));

/// Aggregate validation and borrow-state errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UserValidationError {
    #[error("email must not be empty")]
    EmptyEmail,
    #[error("email `{0}` is not a valid address")]
    InvalidEmail(String),
    #[error("password must not be empty")]
    EmptyPassword,
    #[error("first name must not be empty")]
    EmptyFirstName,
    #[error("last name must not be empty")]
    EmptyLastName,
    #[error("book {0} is already borrowed by this user")]
    BookAlreadyBorrowed(EntityId),
    #[error("book {0} is not borrowed by this user")]
    BookNotBorrowed(EntityId),
}

/// User aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: EntityId,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
    /// `None` until the first successful update.
    pub updated_at: Option<DateTime<Utc>>,
    /// Borrowed book ids.
    #[serde(default)]
    pub books: Vec<EntityId>,
}

impl User {
    /// Creates a validated user with a freshly generated id.
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Result<Self, UserValidationError> {
        Self::with_id(EntityId::new(), email, password, first_name, last_name)
    }

    /// Creates a validated user with a caller-provided id.
    pub fn with_id(
        id: EntityId,
        email: impl Into<String>,
        password: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Result<Self, UserValidationError> {
        let user = Self {
            id,
            email: email.into(),
            password: password.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            // Storage keeps epoch milliseconds.
            created_at: Utc::now().trunc_subsecs(3),
            updated_at: None,
            books: Vec::new(),
        };
        user.validate()?;
        Ok(user)
    }

    /// Checks that every text attribute is present and the email is well formed.
    ///
    /// Repositories store text as given; callers validate before writing.
    pub fn validate(&self) -> Result<(), UserValidationError> {
        let email = self.email.trim();
        if email.is_empty() {
            return Err(UserValidationError::EmptyEmail);
        }
        if !EMAIL_RE.is_match(email) {
            return Err(UserValidationError::InvalidEmail(self.email.clone()));
        }
        if self.password.is_empty() {
            return Err(UserValidationError::EmptyPassword);
        }
        if self.first_name.trim().is_empty() {
            return Err(UserValidationError::EmptyFirstName);
        }
        if self.last_name.trim().is_empty() {
            return Err(UserValidationError::EmptyLastName);
        }
        Ok(())
    }

    /// Records a borrowed book.
    pub fn add_book(&mut self, book_id: EntityId) -> Result<(), UserValidationError> {
        if self.has_book(book_id) {
            return Err(UserValidationError::BookAlreadyBorrowed(book_id));
        }
        self.books.push(book_id);
        Ok(())
    }

    /// Drops a borrowed book.
    pub fn remove_book(&mut self, book_id: EntityId) -> Result<(), UserValidationError> {
        let position = self
            .books
            .iter()
            .position(|current| *current == book_id)
            .ok_or(UserValidationError::BookNotBorrowed(book_id))?;
        self.books.remove(position);
        Ok(())
    }

    pub fn has_book(&self, book_id: EntityId) -> bool {
        self.books.contains(&book_id)
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}
