use rocket_db_pools::sqlx::migrate::Migrator;
use rocket_db_pools::sqlx::{self, PgPool};
use rocket_db_pools::Database;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Destination address-book database.
#[derive(Database)]
#[database("contacts_db")]
pub struct ContactsDb(sqlx::PgPool);

/// Apply pending address-book migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    log::info!("running address book migrations");
    MIGRATOR.run(pool).await?;
    Ok(())
}
