//! Destination address book contract and its Postgres implementation.

use crate::contacts::StoreError;
use crate::models::{ContactId, GroupId, NormalizedContact, UserContext};
use rocket_db_pools::sqlx::types::Json;
use rocket_db_pools::sqlx::{self, PgPool};

/// Operations the migration needs from the destination address book.
///
/// Each call is expected to be atomic on its own; nothing wraps a whole run
/// in a transaction.
#[rocket::async_trait]
pub trait ContactStore: Send + Sync {
    /// Number of live contacts the user already has.
    async fn address_book_size(&self, user: &UserContext) -> Result<i64, StoreError>;

    /// Insert a contact. `Ok(None)` means the store declined the record.
    async fn insert_contact(
        &self,
        user: &UserContext,
        record: &NormalizedContact,
        allow_overwrite: bool,
    ) -> Result<Option<ContactId>, StoreError>;

    /// Create a group. `Ok(None)` means the store declined to create it.
    async fn create_group(
        &self,
        user: &UserContext,
        name: &str,
    ) -> Result<Option<GroupId>, StoreError>;

    /// Link a contact to a group, returning how many links were created.
    async fn add_group_member(
        &self,
        user: &UserContext,
        group: GroupId,
        contact: ContactId,
    ) -> Result<u64, StoreError>;
}

/// Address book backed by the `contacts`, `contactgroups` and
/// `contactgroupmembers` tables.
#[derive(Debug, Clone)]
pub struct PgContactStore {
    pool: PgPool,
}

impl PgContactStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Comma-separated list of the non-empty work emails, as stored in the
/// searchable `email` column.
fn email_column(record: &NormalizedContact) -> String {
    record.non_empty_emails().collect::<Vec<_>>().join(", ")
}

#[rocket::async_trait]
impl ContactStore for PgContactStore {
    async fn address_book_size(&self, user: &UserContext) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM contacts WHERE user_id = $1 AND del = FALSE",
        )
        .bind(user.username())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn insert_contact(
        &self,
        user: &UserContext,
        record: &NormalizedContact,
        allow_overwrite: bool,
    ) -> Result<Option<ContactId>, StoreError> {
        let primary = record.primary_email();
        if primary.is_empty() {
            return Err(StoreError::Rejected("contact has no primary email".into()));
        }

        let sql = if allow_overwrite {
            r#"INSERT INTO contacts (user_id, name, email, primary_email, firstname, surname, record)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               ON CONFLICT (user_id, primary_email) DO UPDATE
               SET name = EXCLUDED.name,
                   email = EXCLUDED.email,
                   firstname = EXCLUDED.firstname,
                   surname = EXCLUDED.surname,
                   record = EXCLUDED.record,
                   del = FALSE,
                   changed = NOW()
               RETURNING contact_id"#
        } else {
            r#"INSERT INTO contacts (user_id, name, email, primary_email, firstname, surname, record)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               ON CONFLICT (user_id, primary_email) DO NOTHING
               RETURNING contact_id"#
        };

        let id: Option<i64> = sqlx::query_scalar(sql)
            .bind(user.username())
            .bind(&record.name)
            .bind(email_column(record))
            .bind(primary)
            .bind(&record.firstname)
            .bind(&record.surname)
            .bind(Json(record))
            .fetch_optional(&self.pool)
            .await?;

        Ok(id.map(ContactId))
    }

    async fn create_group(
        &self,
        user: &UserContext,
        name: &str,
    ) -> Result<Option<GroupId>, StoreError> {
        let id: Option<i64> = sqlx::query_scalar(
            "INSERT INTO contactgroups (user_id, name) VALUES ($1, $2) RETURNING contactgroup_id",
        )
        .bind(user.username())
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id.map(GroupId))
    }

    async fn add_group_member(
        &self,
        user: &UserContext,
        group: GroupId,
        contact: ContactId,
    ) -> Result<u64, StoreError> {
        // both ids must belong to the user; foreign rows insert nothing
        let result = sqlx::query(
            r#"INSERT INTO contactgroupmembers (contactgroup_id, contact_id)
               SELECT g.contactgroup_id, c.contact_id
               FROM contactgroups g, contacts c
               WHERE g.contactgroup_id = $1 AND g.user_id = $3
                 AND c.contact_id = $2 AND c.user_id = $3
               ON CONFLICT (contactgroup_id, contact_id) DO NOTHING"#,
        )
        .bind(group.0)
        .bind(contact.0)
        .bind(user.username())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Address, AddressContext};
    use std::collections::BTreeMap;

    #[test]
    fn email_column_skips_empty_slots() {
        let record = NormalizedContact {
            name: "Ada Lovelace".into(),
            firstname: "Ada".into(),
            middlename: String::new(),
            surname: "Lovelace".into(),
            emails: vec![
                "ada@example.com".into(),
                String::new(),
                " ada@work.example ".into(),
                String::new(),
                String::new(),
            ],
            addresses: BTreeMap::from([(AddressContext::Home, Address::default())]),
            phones: BTreeMap::new(),
            organization: String::new(),
            department: String::new(),
            jobtitle: String::new(),
            birthday: String::new(),
            notes: String::new(),
        };

        assert_eq!(email_column(&record), "ada@example.com, ada@work.example");
    }
}
