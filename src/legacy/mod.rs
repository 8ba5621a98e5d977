//! Read access to the legacy address-book database.
//!
//! The legacy schema spreads accounts over shard tables picked by the first
//! character of the username (see [`shard`]). A migration opens one
//! connection through a [`LegacyConnector`], then reads every contact row and
//! every group row for the user through the returned [`LegacyStore`].

pub mod reader;
pub mod shard;

use crate::models::{LegacyContactRow, LegacyGroupRow, UserContext};
use rocket_db_pools::sqlx;
use thiserror::Error;

pub use reader::{PgLegacyConnector, PgLegacyStore};
pub use shard::ShardTables;

#[derive(Debug, Error)]
pub enum LegacyError {
    #[error("legacy database url is not configured")]
    MissingDatabaseUrl,
    #[error("legacy database connection failed: {0}")]
    Connection(sqlx::Error),
    #[error("legacy query failed: {0}")]
    Query(sqlx::Error),
}

/// Opens a session against the legacy store.
#[rocket::async_trait]
pub trait LegacyConnector: Send + Sync {
    type Store: LegacyStore;

    async fn connect(&self) -> Result<Self::Store, LegacyError>;
}

/// Row access for one open legacy session.
///
/// Both queries return rows in the order the database produced them and an
/// empty vector when the user has nothing stored. `close` ends the session;
/// no query is issued after it.
#[rocket::async_trait]
pub trait LegacyStore: Send + Sync {
    async fn fetch_contacts(
        &self,
        user: &UserContext,
    ) -> Result<Vec<LegacyContactRow>, LegacyError>;

    async fn fetch_groups(&self, user: &UserContext) -> Result<Vec<LegacyGroupRow>, LegacyError>;

    async fn close(&self);
}
