//! Contact records and the destination address book.
//!
//! - [`normalize`] maps legacy rows to [`NormalizedContact`](crate::models::NormalizedContact)
//! - [`email`] holds the syntactic address check used on primary emails
//! - [`store`] defines the [`ContactStore`] contract and its Postgres implementation

pub mod email;
pub mod normalize;
pub mod store;

use rocket_db_pools::sqlx;
use thiserror::Error;

pub use normalize::{Rejection, canonical_email, normalize_contact};
pub use store::{ContactStore, PgContactStore};

/// Errors raised by a destination address book.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("record rejected: {0}")]
    Rejected(String),
}
