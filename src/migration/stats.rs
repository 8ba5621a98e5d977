//! Counters collected during a migration run.

use crate::models::{GroupId, UserContext};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A group created during the run and the members linked to it so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSummary {
    pub id: GroupId,
    pub emails: BTreeSet<String>,
}

impl GroupSummary {
    pub fn new(id: GroupId) -> Self {
        Self {
            id,
            emails: BTreeSet::new(),
        }
    }
}

/// Outcome counters for one user's migration.
///
/// Only anomalies that do not abort the run end up here; a run that fails
/// on the legacy connection never produces a summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationSummary {
    pub user: String,
    /// Legacy contact rows looked at
    pub contacts_examined: usize,
    /// Contacts the address book accepted
    pub contacts_imported: usize,
    /// Rows dropped for a missing or invalid primary email
    pub contacts_rejected: usize,
    /// Valid contacts the address book declined or failed to store
    pub contacts_failed: usize,
    pub groups_created: usize,
    /// Member rows whose email maps to an imported contact
    pub emails_considered: usize,
    pub links_created: u64,
    pub duplicates_skipped: usize,
    pub failed_links: Vec<String>,
    pub failed_groups: Vec<String>,
    pub groups: BTreeMap<String, GroupSummary>,
}

impl MigrationSummary {
    pub fn new(user: &UserContext) -> Self {
        Self {
            user: user.username().to_string(),
            ..Default::default()
        }
    }
}

impl fmt::Display for MigrationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} Groups created: {}, Emails considered: {}, Successfully added to a group: {}, Skipped duplicates: {}",
            self.user,
            self.groups_created,
            self.emails_considered,
            self.links_created,
            self.duplicates_skipped
        )?;

        writeln!(f, "Imported Groups:")?;
        for (name, group) in &self.groups {
            if group.emails.is_empty() {
                writeln!(f, "  {} (id {}): (none)", name, group.id)?;
            } else {
                let emails: Vec<&str> = group.emails.iter().map(String::as_str).collect();
                writeln!(f, "  {} (id {}): {}", name, group.id, emails.join(", "))?;
            }
        }

        writeln!(f, "Imported Group failed emails:")?;
        for email in &self.failed_links {
            writeln!(f, "  {}", email)?;
        }

        if !self.failed_groups.is_empty() {
            writeln!(f, "Groups that could not be created:")?;
            for name in &self.failed_groups {
                writeln!(f, "  {}", name)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_display() {
        let mut summary = MigrationSummary::new(&UserContext::new("Alice"));
        summary.groups_created = 2;
        summary.emails_considered = 3;
        summary.links_created = 1;
        summary.duplicates_skipped = 1;
        summary.failed_links.push("zed@example.com".to_string());

        let mut family = GroupSummary::new(GroupId(7));
        family.emails.insert("b@x.com".to_string());
        summary.groups.insert("Family".to_string(), family);
        summary
            .groups
            .insert("Work".to_string(), GroupSummary::new(GroupId(8)));

        let display = format!("{}", summary);
        let lines: Vec<&str> = display.lines().collect();
        assert_eq!(
            lines[0],
            "alice Groups created: 2, Emails considered: 3, Successfully added to a group: 1, Skipped duplicates: 1"
        );
        assert_eq!(lines[1], "Imported Groups:");
        assert_eq!(lines[2], "  Family (id 7): b@x.com");
        assert_eq!(lines[3], "  Work (id 8): (none)");
        assert_eq!(lines[4], "Imported Group failed emails:");
        assert_eq!(lines[5], "  zed@example.com");
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn failed_groups_are_listed_when_present() {
        let mut summary = MigrationSummary::new(&UserContext::new("bob"));
        summary.failed_groups.push("Broken".to_string());

        let display = summary.to_string();
        assert!(display.contains("Groups that could not be created:\n  Broken\n"));
    }
}
