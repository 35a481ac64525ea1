//! In-memory user repository for tests and database-free callers.
//!
//! Mirrors the SQLite repository's observable contract: book links are not
//! stored by `create`, `update` replaces them as a deduplicated set, search
//! folds ASCII case only (as SQLite `LIKE` does), and the same `NotFound` /
//! `NoMatches` sentinels are returned.

use crate::model::id::EntityId;
use crate::model::user::User;
use crate::repo::user_repo::{RepoError, RepoResult, UserRepository};
use chrono::{SubsecRound, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    users: RwLock<BTreeMap<EntityId, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted_matches<F>(&self, predicate: F) -> Vec<User>
    where
        F: Fn(&User) -> bool,
    {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        let mut matches: Vec<User> = users
            .values()
            .filter(|user| predicate(user))
            .cloned()
            .collect();
        matches.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        matches
    }
}

impl UserRepository for InMemoryUserRepository {
    fn create(&self, user: &User) -> RepoResult<EntityId> {
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        if users.contains_key(&user.id) {
            return Err(RepoError::Conflict(user.id));
        }

        let mut stored = user.clone();
        stored.created_at = user.created_at.trunc_subsecs(3);
        stored.updated_at = None;
        stored.books.clear();
        users.insert(user.id, stored);
        Ok(user.id)
    }

    fn get(&self, id: EntityId) -> RepoResult<User> {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        users.get(&id).cloned().ok_or(RepoError::NotFound(id))
    }

    fn update(&mut self, user: &mut User) -> RepoResult<()> {
        let users = self.users.get_mut().unwrap_or_else(PoisonError::into_inner);
        let stored = users.get_mut(&user.id).ok_or(RepoError::NotFound(user.id))?;

        let updated_at = Utc::now().trunc_subsecs(3);
        stored.email = user.email.clone();
        stored.password = user.password.clone();
        stored.first_name = user.first_name.clone();
        stored.last_name = user.last_name.clone();
        stored.updated_at = Some(updated_at);
        stored.books = user
            .books
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        user.updated_at = Some(updated_at);
        Ok(())
    }

    fn search(&self, query: &str) -> RepoResult<Vec<User>> {
        let needle = query.to_ascii_lowercase();
        let matches =
            self.sorted_matches(|user| user.full_name().to_ascii_lowercase().contains(&needle));
        if matches.is_empty() {
            return Err(RepoError::NoMatches);
        }
        Ok(matches)
    }

    fn list(&self) -> RepoResult<Vec<User>> {
        let users = self.sorted_matches(|_| true);
        if users.is_empty() {
            return Err(RepoError::NoMatches);
        }
        Ok(users)
    }

    fn delete(&mut self, id: EntityId) -> RepoResult<()> {
        let users = self.users.get_mut().unwrap_or_else(PoisonError::into_inner);
        users.remove(&id).map(|_| ()).ok_or(RepoError::NotFound(id))
    }
}
