//! Run-scoped lookup from canonical email to imported contact.

use crate::contacts::canonical_email;
use crate::models::ContactId;
use std::collections::HashMap;

/// Canonical email → destination contact id, for contacts imported in this run.
#[derive(Debug, Clone, Default)]
pub struct EmailIndex {
    entries: HashMap<String, ContactId>,
}

impl EmailIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an imported contact. A later insert for the same address wins.
    pub fn insert(&mut self, email: &str, id: ContactId) {
        self.entries.insert(canonical_email(email), id);
    }

    /// Look up an address in any case or padding.
    pub fn get(&self, email: &str) -> Option<ContactId> {
        self.entries.get(&canonical_email(email)).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_ignore_case_and_padding() {
        let mut index = EmailIndex::new();
        index.insert("a@x.com", ContactId(1));

        assert_eq!(index.get("a@x.com"), Some(ContactId(1)));
        assert_eq!(index.get("  A@X.COM "), Some(ContactId(1)));
        assert_eq!(index.get("b@x.com"), None);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn reinserting_replaces_the_id() {
        let mut index = EmailIndex::new();
        index.insert("a@x.com", ContactId(1));
        index.insert("A@x.com", ContactId(2));

        assert_eq!(index.get("a@x.com"), Some(ContactId(2)));
        assert_eq!(index.len(), 1);
    }
}
