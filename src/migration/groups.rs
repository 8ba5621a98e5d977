//! Group creation and membership linking.
//!
//! Rows are processed in legacy order. A row whose group does not exist yet
//! creates it; whether that same row is also linked depends on the
//! [`GroupLinkPolicy`]. When creation fails the next row with the same name
//! tries again; a row whose attempt failed is never linked. Member
//! emails are only linked when they belong to a contact imported earlier in
//! the same run, and each (group, email) pair is linked at most once.

use crate::config::GroupLinkPolicy;
use crate::contacts::{ContactStore, canonical_email};
use crate::migration::index::EmailIndex;
use crate::migration::stats::{GroupSummary, MigrationSummary};
use crate::models::{LegacyGroupRow, UserContext};

pub struct GroupResolver<'a, S: ContactStore + ?Sized> {
    store: &'a S,
    user: &'a UserContext,
    index: &'a EmailIndex,
    policy: GroupLinkPolicy,
}

impl<'a, S: ContactStore + ?Sized> GroupResolver<'a, S> {
    pub fn new(
        store: &'a S,
        user: &'a UserContext,
        index: &'a EmailIndex,
        policy: GroupLinkPolicy,
    ) -> Self {
        Self {
            store,
            user,
            index,
            policy,
        }
    }

    /// Walk every group row and fold the results into `summary`.
    pub async fn resolve(&self, rows: &[LegacyGroupRow], summary: &mut MigrationSummary) {
        for row in rows {
            let name = row.group_name.as_str();

            if !summary.groups.contains_key(name) {
                if !self.create_group(name, summary).await {
                    continue;
                }
                if self.policy == GroupLinkPolicy::SkipFirstRow {
                    continue;
                }
            }

            self.link_member(name, &row.email, summary).await;
        }
    }

    async fn create_group(&self, name: &str, summary: &mut MigrationSummary) -> bool {
        match self.store.create_group(self.user, name).await {
            Ok(Some(id)) => {
                log::debug!("{}: created group '{}' (id {})", self.user, name, id);
                summary
                    .groups
                    .insert(name.to_string(), GroupSummary::new(id));
                summary.groups_created += 1;
                summary.failed_groups.retain(|failed| failed != name);
                true
            }
            Ok(None) => {
                log::warn!("{}: address book declined group '{}'", self.user, name);
                mark_failed(name, summary);
                false
            }
            Err(err) => {
                log::warn!("{}: failed to create group '{}': {}", self.user, name, err);
                mark_failed(name, summary);
                false
            }
        }
    }

    async fn link_member(&self, name: &str, raw_email: &str, summary: &mut MigrationSummary) {
        let email = canonical_email(raw_email);
        if email.is_empty() {
            return;
        }
        let Some(contact_id) = self.index.get(&email) else {
            log::trace!("{}: '{}' was not imported, not linking", self.user, email);
            return;
        };

        summary.emails_considered += 1;

        let Some(group) = summary.groups.get_mut(name) else {
            return;
        };

        if group.emails.contains(&email) {
            summary.duplicates_skipped += 1;
            return;
        }

        let linked = match self
            .store
            .add_group_member(self.user, group.id, contact_id)
            .await
        {
            Ok(count) => count,
            Err(err) => {
                log::warn!(
                    "{}: failed to link '{}' to group '{}': {}",
                    self.user,
                    email,
                    name,
                    err
                );
                0
            }
        };

        if linked == 0 {
            summary.failed_links.push(email);
        } else {
            summary.links_created += linked;
            group.emails.insert(email);
        }
    }
}

/// Names are listed once, and only while no attempt has succeeded.
fn mark_failed(name: &str, summary: &mut MigrationSummary) {
    if !summary.failed_groups.iter().any(|failed| failed == name) {
        summary.failed_groups.push(name.to_string());
    }
}
