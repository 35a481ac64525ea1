//! Domain model for library users and their borrowed books.
//!
//! # Responsibility
//! - Define the `User` aggregate and the identifier type shared with books.
//!
//! # Invariants
//! - Every entity is identified by a stable `EntityId`.
//! - A user's borrowed books are owned by the user aggregate.

pub mod id;
pub mod user;
