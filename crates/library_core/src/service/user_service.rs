//! User use-case service.
//!
//! # Responsibility
//! - Provide register/borrow/return entry points on top of `UserRepository`.
//! - Translate repository not-found results into service-level errors.
//! - Validate aggregates before they reach the repository.
//!
//! # Invariants
//! - Borrow/return always read the current aggregate before writing it back.
//! - The service never issues SQL directly.

use crate::model::id::EntityId;
use crate::model::user::{User, UserValidationError};
use crate::repo::user_repo::{RepoError, UserRepository};
use log::info;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("user not found: {0}")]
    UserNotFound(EntityId),
    #[error(transparent)]
    Validation(#[from] UserValidationError),
    #[error(transparent)]
    Repo(RepoError),
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::UserNotFound(id),
            other => Self::Repo(other),
        }
    }
}

/// Use-case wrapper around a user repository.
pub struct UserService<R: UserRepository> {
    repo: R,
}

impl<R: UserRepository> UserService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Builds, validates and stores a new user; returns its generated id.
    ///
    /// `password` must already be hashed by the caller.
    pub fn register(
        &self,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> ServiceResult<EntityId> {
        let user = User::new(email, password, first_name, last_name)?;
        let id = self.repo.create(&user)?;
        info!("event=user_register module=service status=ok user_id={id}");
        Ok(id)
    }

    pub fn get_user(&self, id: EntityId) -> ServiceResult<User> {
        Ok(self.repo.get(id)?)
    }

    /// Returns every user; an empty store is `Repo(NoMatches)`.
    pub fn list_users(&self) -> ServiceResult<Vec<User>> {
        Ok(self.repo.list()?)
    }

    pub fn search_users(&self, query: &str) -> ServiceResult<Vec<User>> {
        Ok(self.repo.search(query)?)
    }

    /// Validates and persists `user`, replacing its stored book links.
    pub fn update_user(&mut self, user: &mut User) -> ServiceResult<()> {
        user.validate()?;
        Ok(self.repo.update(user)?)
    }

    pub fn delete_user(&mut self, id: EntityId) -> ServiceResult<()> {
        self.repo.delete(id)?;
        info!("event=user_delete module=service status=ok user_id={id}");
        Ok(())
    }

    /// Adds `book_id` to the user's borrowed set and persists it.
    pub fn borrow_book(&mut self, user_id: EntityId, book_id: EntityId) -> ServiceResult<User> {
        let mut user = self.repo.get(user_id)?;
        user.add_book(book_id)?;
        self.repo.update(&mut user)?;
        info!(
            "event=book_borrow module=service status=ok user_id={user_id} book_id={book_id}"
        );
        Ok(user)
    }

    /// Removes `book_id` from the user's borrowed set and persists it.
    pub fn return_book(&mut self, user_id: EntityId, book_id: EntityId) -> ServiceResult<User> {
        let mut user = self.repo.get(user_id)?;
        user.remove_book(book_id)?;
        self.repo.update(&mut user)?;
        info!(
            "event=book_return module=service status=ok user_id={user_id} book_id={book_id}"
        );
        Ok(user)
    }
}
