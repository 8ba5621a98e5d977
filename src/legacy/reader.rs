//! Postgres-backed legacy reader.

use crate::config::LegacyDbConfig;
use crate::legacy::{LegacyConnector, LegacyError, LegacyStore, ShardTables};
use crate::models::{LegacyContactRow, LegacyGroupRow, UserContext};
use rocket_db_pools::sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use rocket_db_pools::sqlx::{self, PgPool};

/// Postgres error code for `undefined_table`.
const UNDEFINED_TABLE: &str = "42P01";

/// Legacy column → alias pairs for contact rows, in select order.
const CONTACT_COLUMNS: &[(&str, &str)] = &[
    ("UserFirstName", "first_name"),
    ("UserLastName", "last_name"),
    ("UserMiddleName", "middle_name"),
    ("UserEmail", "email1"),
    ("UserEmail2", "email2"),
    ("UserEmail3", "email3"),
    ("UserEmail4", "email4"),
    ("UserEmail5", "email5"),
    ("UserHomeAddress", "home_street"),
    ("UserHomeCity", "home_city"),
    ("UserHomeState", "home_state"),
    ("UserHomeCountry", "home_country"),
    ("UserHomeZip", "home_zip"),
    ("UserHomePhone", "home_phone"),
    ("UserHomeMobile", "home_mobile"),
    ("UserHomeFax", "home_fax"),
    ("UserWorkCompany", "work_company"),
    ("UserWorkDept", "work_department"),
    ("UserWorkTitle", "work_title"),
    ("UserWorkAddress", "work_street"),
    ("UserWorkCity", "work_city"),
    ("UserWorkState", "work_state"),
    ("UserWorkCountry", "work_country"),
    ("UserWorkZip", "work_zip"),
    ("UserWorkPhone", "work_phone"),
    ("UserWorkMobile", "work_mobile"),
    ("UserWorkFax", "work_fax"),
    ("UserInfo", "notes"),
    ("UserDOB", "date_of_birth"),
];

/// Build the contact query for a shard table.
///
/// Every column is cast to text and NULL is coalesced to an empty string so
/// rows always decode into the fixed-shape [`LegacyContactRow`].
fn contacts_query(table: &str) -> String {
    let columns = CONTACT_COLUMNS
        .iter()
        .map(|(column, alias)| format!("COALESCE(CAST({column} AS TEXT), '') AS {alias}"))
        .collect::<Vec<_>>()
        .join(", ");

    format!("SELECT {columns} FROM {table} WHERE Account = $1")
}

fn groups_query(table: &str) -> String {
    format!(
        "SELECT COALESCE(CAST(GroupName AS TEXT), '') AS group_name, \
         COALESCE(CAST(GroupEmail AS TEXT), '') AS email \
         FROM {table} WHERE Account = $1"
    )
}

fn is_missing_table(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err)
            if db_err.code().map(|code| code == UNDEFINED_TABLE).unwrap_or(false)
    )
}

/// Opens a single-connection pool against the legacy database.
#[derive(Debug, Clone)]
pub struct PgLegacyConnector {
    config: LegacyDbConfig,
}

impl PgLegacyConnector {
    pub fn new(config: LegacyDbConfig) -> Self {
        Self { config }
    }

    fn connect_options(&self) -> Result<PgConnectOptions, LegacyError> {
        let url = self
            .config
            .database_url
            .as_deref()
            .ok_or(LegacyError::MissingDatabaseUrl)?;

        let mut options: PgConnectOptions = url.parse().map_err(LegacyError::Connection)?;
        if let Some(username) = &self.config.username {
            options = options.username(username);
        }
        if let Some(password) = &self.config.password {
            options = options.password(password);
        }

        Ok(options)
    }
}

#[rocket::async_trait]
impl LegacyConnector for PgLegacyConnector {
    type Store = PgLegacyStore;

    async fn connect(&self) -> Result<PgLegacyStore, LegacyError> {
        let options = self.connect_options()?;

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(self.config.connect_timeout)
            .connect_with(options)
            .await
            .map_err(LegacyError::Connection)?;

        log::debug!("connected to legacy address-book database");
        Ok(PgLegacyStore::new(pool))
    }
}

/// Reads legacy contact and group rows from the user's shard tables.
#[derive(Debug, Clone)]
pub struct PgLegacyStore {
    pool: PgPool,
}

impl PgLegacyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[rocket::async_trait]
impl LegacyStore for PgLegacyStore {
    async fn fetch_contacts(
        &self,
        user: &UserContext,
    ) -> Result<Vec<LegacyContactRow>, LegacyError> {
        let table = ShardTables::for_user(user).contacts();

        let rows = sqlx::query_as::<_, LegacyContactRow>(&contacts_query(&table))
            .bind(user.username())
            .fetch_all(&self.pool)
            .await;

        match rows {
            Ok(rows) => {
                log::debug!("{}: {} contact rows in {}", user, rows.len(), table);
                Ok(rows)
            }
            Err(err) if is_missing_table(&err) => {
                log::debug!("{}: shard table {} does not exist", user, table);
                Ok(Vec::new())
            }
            Err(err) => Err(LegacyError::Query(err)),
        }
    }

    async fn fetch_groups(&self, user: &UserContext) -> Result<Vec<LegacyGroupRow>, LegacyError> {
        let table = ShardTables::for_user(user).groups();

        let rows = sqlx::query_as::<_, LegacyGroupRow>(&groups_query(&table))
            .bind(user.username())
            .fetch_all(&self.pool)
            .await;

        match rows {
            Ok(rows) => {
                log::debug!("{}: {} group rows in {}", user, rows.len(), table);
                Ok(rows)
            }
            Err(err) if is_missing_table(&err) => {
                log::debug!("{}: shard table {} does not exist", user, table);
                Ok(Vec::new())
            }
            Err(err) => Err(LegacyError::Query(err)),
        }
    }

    async fn close(&self) {
        self.pool.close().await;
        log::debug!("closed legacy address-book connection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contacts_query_selects_every_column_as_text() {
        let sql = contacts_query("abook_a");
        assert!(sql.starts_with("SELECT COALESCE(CAST(UserFirstName AS TEXT), '') AS first_name"));
        assert!(sql.contains("COALESCE(CAST(UserDOB AS TEXT), '') AS date_of_birth"));
        assert!(sql.ends_with("FROM abook_a WHERE Account = $1"));
        assert_eq!(sql.matches("COALESCE").count(), CONTACT_COLUMNS.len());
    }

    #[test]
    fn groups_query_targets_group_shard() {
        let sql = groups_query("abookgroup_other");
        assert!(sql.contains("AS group_name"));
        assert!(sql.contains("FROM abookgroup_other WHERE Account = $1"));
    }

    #[tokio::test]
    async fn missing_url_is_a_connection_failure() {
        let connector = PgLegacyConnector::new(LegacyDbConfig {
            database_url: None,
            username: None,
            password: None,
            connect_timeout: std::time::Duration::from_millis(10),
        });

        let err = connector.connect().await.expect_err("no url configured");
        assert!(matches!(err, LegacyError::MissingDatabaseUrl));
    }
}
