//! Shard table naming for the legacy schema.
//!
//! Accounts are split across tables by the first character of the lowercase
//! username: `a` through `z` each own a table, anything else lands in the
//! `other` table. Contacts live in `abook_{suffix}` and group memberships in
//! `abookgroup_{suffix}`.

use crate::models::UserContext;

const CONTACT_TABLE_PREFIX: &str = "abook_";
const GROUP_TABLE_PREFIX: &str = "abookgroup_";
const OTHER_SHARD: &str = "other";

/// Resolved shard tables for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardTables {
    suffix: String,
}

impl ShardTables {
    pub fn for_user(user: &UserContext) -> Self {
        Self {
            suffix: shard_suffix(user.username()),
        }
    }

    pub fn contacts(&self) -> String {
        format!("{}{}", CONTACT_TABLE_PREFIX, self.suffix)
    }

    pub fn groups(&self) -> String {
        format!("{}{}", GROUP_TABLE_PREFIX, self.suffix)
    }
}

/// Shard suffix for a username.
///
/// The suffix is always one of 27 fixed values, which is what makes it safe
/// to splice into table names.
pub fn shard_suffix(username: &str) -> String {
    match username.chars().next().map(|c| c.to_ascii_lowercase()) {
        Some(first) if first.is_ascii_lowercase() => first.to_string(),
        _ => OTHER_SHARD.to_string(),
    }
}
