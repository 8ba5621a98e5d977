//! Legacy address-book migration.
//!
//! This module moves one user's contacts and contact groups from the legacy
//! sharded schema into the destination address book:
//!
//! 1. **Coordination** (`coordinator`) - Pre-check, ordering, and the login-hook entry point
//! 2. **Email index** (`index`) - Run-scoped canonical email → contact id map
//! 3. **Groups** (`groups`) - Group creation, member linking, duplicate detection
//! 4. **Statistics** (`stats`) - Run counters and their text rendering
//! 5. **Debug log** (`debug_log`) - Opt-in append-only summary file
//! 6. **Locks** (`locks`) - Per-user serialisation inside one process
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use atmail_import::legacy::PgLegacyConnector;
//! use atmail_import::contacts::PgContactStore;
//! use atmail_import::migration::ContactMigration;
//!
//! let migration = ContactMigration::new(
//!     PgLegacyConnector::new(config.legacy.clone()),
//!     PgContactStore::new(pool),
//!     config.options.clone(),
//! );
//!
//! let completed = migration.run_after_login(&UserContext::new("alice")).await;
//! ```

pub mod coordinator;
pub mod debug_log;
pub mod groups;
pub mod index;
pub mod locks;
pub mod stats;

pub use coordinator::{ContactMigration, LoginHook, MigrationOutcome, SharedLoginHook};
pub use index::EmailIndex;
pub use locks::{UserLockGuard, UserLocks};
pub use stats::{GroupSummary, MigrationSummary};
