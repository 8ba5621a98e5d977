use atmail_import::config::{LegacyDbConfig, MigrationOptions};
use atmail_import::contacts::{ContactStore, PgContactStore};
use atmail_import::legacy::{LegacyConnector, LegacyStore, PgLegacyConnector, PgLegacyStore};
use atmail_import::migration::{ContactMigration, MigrationOutcome};
use atmail_import::models::{NormalizedContact, UserContext};
use atmail_import::test_support::TestDatabase;
use rocket_db_pools::sqlx::{self, PgPool};

const LEGACY_SCHEMA: &[&str] = &[
    r#"CREATE TABLE abook_a (
        id SERIAL PRIMARY KEY,
        Account TEXT NOT NULL,
        UserFirstName TEXT, UserLastName TEXT, UserMiddleName TEXT,
        UserEmail TEXT, UserEmail2 TEXT, UserEmail3 TEXT, UserEmail4 TEXT, UserEmail5 TEXT,
        UserHomeAddress TEXT, UserHomeCity TEXT, UserHomeState TEXT, UserHomeCountry TEXT,
        UserHomeZip TEXT, UserHomePhone TEXT, UserHomeMobile TEXT, UserHomeFax TEXT,
        UserWorkCompany TEXT, UserWorkDept TEXT, UserWorkTitle TEXT,
        UserWorkAddress TEXT, UserWorkCity TEXT, UserWorkState TEXT, UserWorkCountry TEXT,
        UserWorkZip INTEGER, UserWorkPhone TEXT, UserWorkMobile TEXT, UserWorkFax TEXT,
        UserInfo TEXT, UserDOB DATE
    )"#,
    r#"CREATE TABLE abookgroup_a (
        id SERIAL PRIMARY KEY,
        Account TEXT NOT NULL,
        GroupName TEXT NOT NULL,
        GroupEmail TEXT
    )"#,
];

async fn provision() -> Option<TestDatabase> {
    match TestDatabase::new_from_env().await {
        Ok(db) => Some(db),
        Err(err) if err.is_unavailable() => {
            eprintln!("skipping postgres store test: {err}");
            None
        }
        Err(err) => panic!("failed to provision test database: {err:?}"),
    }
}

async fn seed_legacy(pool: &PgPool) {
    for statement in LEGACY_SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .expect("legacy table created");
    }

    sqlx::query(
        r#"INSERT INTO abook_a (Account, UserFirstName, UserLastName, UserEmail, UserEmail2,
                                UserWorkCompany, UserWorkZip, UserDOB)
           VALUES ('alice', 'Ann', 'Lee', ' Ann@Example.com ', 'ann@home.example', 'Acme', 90210, '1980-02-03'),
                  ('alice', 'Ben', NULL, 'ben@example.com', NULL, NULL, NULL, NULL),
                  ('alice', 'No', 'Mail', NULL, NULL, NULL, NULL, NULL),
                  ('bob', 'Other', 'User', 'other@example.com', NULL, NULL, NULL, NULL)"#,
    )
    .execute(pool)
    .await
    .expect("legacy contacts seeded");

    sqlx::query(
        r#"INSERT INTO abookgroup_a (Account, GroupName, GroupEmail)
           VALUES ('alice', 'Friends', 'ann@example.com'),
                  ('alice', 'Friends', 'ben@example.com'),
                  ('alice', 'Friends', 'BEN@example.com'),
                  ('alice', 'Friends', 'ann@example.com'),
                  ('alice', 'Friends', 'stranger@example.com'),
                  ('bob', 'Friends', 'other@example.com')"#,
    )
    .execute(pool)
    .await
    .expect("legacy groups seeded");
}

fn contact(email: &str) -> NormalizedContact {
    NormalizedContact {
        name: "Test Contact".into(),
        firstname: "Test".into(),
        middlename: String::new(),
        surname: "Contact".into(),
        emails: vec![email.to_string()],
        addresses: Default::default(),
        phones: Default::default(),
        organization: String::new(),
        department: String::new(),
        jobtitle: String::new(),
        birthday: String::new(),
        notes: String::new(),
    }
}

#[tokio::test]
async fn legacy_reader_decodes_shard_rows() {
    let Some(test_db) = provision().await else {
        return;
    };
    seed_legacy(test_db.pool()).await;

    let legacy = PgLegacyStore::new(test_db.pool_clone());
    let user = UserContext::new("Alice");

    let contacts = legacy.fetch_contacts(&user).await.expect("contacts read");
    assert_eq!(contacts.len(), 3);
    assert_eq!(contacts[0].emails[0], " Ann@Example.com ");
    assert_eq!(contacts[0].emails[1], "ann@home.example");
    assert_eq!(contacts[0].work.zip, "90210");
    assert_eq!(contacts[0].date_of_birth, "1980-02-03");
    assert_eq!(contacts[1].last_name, "");
    assert_eq!(contacts[2].emails[0], "");

    let groups = legacy.fetch_groups(&user).await.expect("groups read");
    assert_eq!(groups.len(), 5);
    assert!(groups.iter().all(|row| row.group_name == "Friends"));

    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn missing_shard_tables_read_as_empty() {
    let Some(test_db) = provision().await else {
        return;
    };

    let legacy = PgLegacyStore::new(test_db.pool_clone());
    let user = UserContext::new("zoe");

    assert!(legacy.fetch_contacts(&user).await.expect("contacts read").is_empty());
    assert!(legacy.fetch_groups(&user).await.expect("groups read").is_empty());

    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn contact_store_upserts_on_primary_email() {
    let Some(test_db) = provision().await else {
        return;
    };

    let store = PgContactStore::new(test_db.pool_clone());
    let user = UserContext::new("alice");

    assert_eq!(store.address_book_size(&user).await.expect("size"), 0);

    let first = store
        .insert_contact(&user, &contact("ann@example.com"), true)
        .await
        .expect("insert")
        .expect("contact id");
    let again = store
        .insert_contact(&user, &contact("ann@example.com"), true)
        .await
        .expect("upsert")
        .expect("contact id");
    assert_eq!(first, again);

    let declined = store
        .insert_contact(&user, &contact("ann@example.com"), false)
        .await
        .expect("insert without overwrite");
    assert_eq!(declined, None);

    assert_eq!(store.address_book_size(&user).await.expect("size"), 1);
    assert_eq!(
        store
            .address_book_size(&UserContext::new("bob"))
            .await
            .expect("size"),
        0
    );

    let group = store
        .create_group(&user, "Friends")
        .await
        .expect("create group")
        .expect("group id");
    assert_eq!(store.add_group_member(&user, group, first).await.expect("link"), 1);
    assert_eq!(store.add_group_member(&user, group, first).await.expect("relink"), 0);

    let foreign = store
        .add_group_member(&UserContext::new("bob"), group, first)
        .await
        .expect("foreign link");
    assert_eq!(foreign, 0);

    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn full_migration_against_postgres() {
    let Some(test_db) = provision().await else {
        return;
    };
    seed_legacy(test_db.pool()).await;

    let connector = PgLegacyConnector::new(LegacyDbConfig::with_url(test_db.url()));
    connector.connect().await.expect("legacy connection");

    let migration = ContactMigration::new(
        connector,
        PgContactStore::new(test_db.pool_clone()),
        MigrationOptions::default(),
    );
    let user = UserContext::new("ALICE");

    let summary = match migration.run(&user).await.expect("migration runs") {
        MigrationOutcome::Completed(summary) => summary,
        other => panic!("expected a completed run, got {other:?}"),
    };

    assert_eq!(summary.contacts_examined, 3);
    assert_eq!(summary.contacts_imported, 2);
    assert_eq!(summary.contacts_rejected, 1);
    assert_eq!(summary.groups_created, 1);
    assert_eq!(summary.emails_considered, 3);
    assert_eq!(summary.links_created, 2);
    assert_eq!(summary.duplicates_skipped, 1);
    assert!(summary.failed_links.is_empty());

    let primaries: Vec<String> = sqlx::query_scalar(
        "SELECT primary_email FROM contacts WHERE user_id = $1 ORDER BY primary_email",
    )
    .bind("alice")
    .fetch_all(test_db.pool())
    .await
    .expect("contacts listed");
    assert_eq!(primaries, vec!["ann@example.com", "ben@example.com"]);

    let ann_email: String =
        sqlx::query_scalar("SELECT email FROM contacts WHERE primary_email = 'ann@example.com'")
            .fetch_one(test_db.pool())
            .await
            .expect("email column");
    assert_eq!(ann_email, "ann@example.com, ann@home.example");

    let members: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contactgroupmembers")
        .fetch_one(test_db.pool())
        .await
        .expect("members counted");
    assert_eq!(members, 2);

    let second = migration.run(&user).await.expect("second run");
    assert_eq!(second, MigrationOutcome::Skipped { existing_contacts: 2 });

    test_db.close().await.expect("failed to drop test database");
}
