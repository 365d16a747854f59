//! Repository functions — one function per database operation.
//!
//! Every function takes a `&DbPool` and returns a `Result<T, DbError>`.
//! No business logic, no status decisions — pure SQL. Queries use the
//! sqlx runtime API so the crate builds without a live database.

pub mod instances;
pub mod records;
pub mod templates;
