//! Repository layer for the user aggregate.
//!
//! # Responsibility
//! - Define the user persistence contract.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository writes store text attributes as given; validation happens
//!   at construction and in the service layer.
//! - Repository APIs return semantic errors (`NotFound`, `NoMatches`) in
//!   addition to storage errors.

pub mod memory;
pub mod user_repo;
