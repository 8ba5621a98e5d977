//! Migration coordination for one user's address book.
//!
//! The ContactMigration runs the whole import in order:
//! 1. Skip if the destination address book already has contacts
//! 2. Read all legacy contact and group rows, then close the legacy session
//! 3. Normalize and insert contacts, building the email index
//! 4. Create groups and link members
//! 5. Hand back the summary (and optionally append it to the debug file)

use crate::config::MigrationOptions;
use crate::contacts::{ContactStore, normalize_contact};
use crate::error::MigrationError;
use crate::legacy::{LegacyConnector, LegacyStore};
use crate::migration::debug_log;
use crate::migration::groups::GroupResolver;
use crate::migration::index::EmailIndex;
use crate::migration::locks::UserLocks;
use crate::migration::stats::MigrationSummary;
use crate::models::{LegacyContactRow, LegacyGroupRow, UserContext};
use std::sync::Arc;

/// Result of a run that did not hit a fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The address book was already populated; nothing was written.
    Skipped { existing_contacts: i64 },
    /// All legacy rows were processed.
    Completed(MigrationSummary),
}

/// Something to run when the host reports a successful login.
#[rocket::async_trait]
pub trait LoginHook: Send + Sync {
    /// Returns false when the work for this login aborted.
    async fn on_login(&self, user: &UserContext) -> bool;
}

pub type SharedLoginHook = Arc<dyn LoginHook>;

/// Imports a user's legacy contacts and groups into the address book.
pub struct ContactMigration<C, S> {
    connector: C,
    store: S,
    options: MigrationOptions,
    locks: Arc<UserLocks>,
}

impl<C, S> ContactMigration<C, S>
where
    C: LegacyConnector,
    S: ContactStore,
{
    pub fn new(connector: C, store: S, options: MigrationOptions) -> Self {
        Self {
            connector,
            store,
            options,
            locks: Arc::new(UserLocks::new()),
        }
    }

    /// Share a lock table with other migrations in the same process.
    pub fn with_locks(mut self, locks: Arc<UserLocks>) -> Self {
        self.locks = locks;
        self
    }

    /// Run the migration and report its outcome.
    ///
    /// Legacy rows are fully read before the first destination write, so an
    /// `Err` always means nothing was written.
    pub async fn run(&self, user: &UserContext) -> Result<MigrationOutcome, MigrationError> {
        let _guard = self.locks.acquire(user).await;

        let existing = self
            .store
            .address_book_size(user)
            .await
            .map_err(MigrationError::AddressBook)?;
        if existing > 0 {
            log::debug!(
                "{}: address book already holds {} contacts, skipping import",
                user,
                existing
            );
            return Ok(MigrationOutcome::Skipped {
                existing_contacts: existing,
            });
        }

        let legacy = self.connector.connect().await?;
        let fetched = read_legacy(&legacy, user).await;
        legacy.close().await;
        let (contact_rows, group_rows) = fetched?;

        log::info!(
            "{}: importing {} legacy contacts and {} group rows",
            user,
            contact_rows.len(),
            group_rows.len()
        );

        let mut summary = MigrationSummary::new(user);
        let index = self.import_contacts(user, &contact_rows, &mut summary).await;

        GroupResolver::new(&self.store, user, &index, self.options.group_link_policy)
            .resolve(&group_rows, &mut summary)
            .await;

        log::info!(
            "{}: imported {}/{} contacts ({} rejected, {} failed), {} groups, {} links, {} duplicates, {} failed links",
            user,
            summary.contacts_imported,
            summary.contacts_examined,
            summary.contacts_rejected,
            summary.contacts_failed,
            summary.groups_created,
            summary.links_created,
            summary.duplicates_skipped,
            summary.failed_links.len()
        );

        Ok(MigrationOutcome::Completed(summary))
    }

    /// Login-hook entry point.
    ///
    /// Returns `false` only when the run aborted (legacy store unreachable or
    /// the address book could not be read). A skipped run and a run that
    /// imported nothing both count as success.
    pub async fn run_after_login(&self, user: &UserContext) -> bool {
        match self.run(user).await {
            Ok(MigrationOutcome::Skipped { .. }) => true,
            Ok(MigrationOutcome::Completed(summary)) => {
                debug_log::emit(&self.options.debug, &summary).await;
                true
            }
            Err(err) => {
                log::error!("{}: contact migration aborted: {}", user, err);
                false
            }
        }
    }

    async fn import_contacts(
        &self,
        user: &UserContext,
        rows: &[LegacyContactRow],
        summary: &mut MigrationSummary,
    ) -> EmailIndex {
        let mut index = EmailIndex::new();

        for row in rows {
            summary.contacts_examined += 1;

            let contact = match normalize_contact(row, self.options.display_name_policy) {
                Ok(contact) => contact,
                Err(rejection) => {
                    log::trace!("{}: skipping legacy row: {:?}", user, rejection);
                    summary.contacts_rejected += 1;
                    continue;
                }
            };

            match self.store.insert_contact(user, &contact, true).await {
                Ok(Some(id)) => {
                    index.insert(contact.primary_email(), id);
                    summary.contacts_imported += 1;
                }
                Ok(None) => {
                    log::warn!(
                        "{}: address book declined contact {}",
                        user,
                        contact.primary_email()
                    );
                    summary.contacts_failed += 1;
                }
                Err(err) => {
                    log::warn!(
                        "{}: failed to insert contact {}: {}",
                        user,
                        contact.primary_email(),
                        err
                    );
                    summary.contacts_failed += 1;
                }
            }
        }

        log::debug!("{}: email index holds {} addresses", user, index.len());
        index
    }
}

async fn read_legacy<L: LegacyStore>(
    legacy: &L,
    user: &UserContext,
) -> Result<(Vec<LegacyContactRow>, Vec<LegacyGroupRow>), MigrationError> {
    let contacts = legacy.fetch_contacts(user).await?;
    let groups = legacy.fetch_groups(user).await?;
    Ok((contacts, groups))
}

#[rocket::async_trait]
impl<C, S> LoginHook for ContactMigration<C, S>
where
    C: LegacyConnector,
    S: ContactStore,
{
    async fn on_login(&self, user: &UserContext) -> bool {
        self.run_after_login(user).await
    }
}
