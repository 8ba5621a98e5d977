#[macro_use]
extern crate rocket;

pub mod config;
pub mod contacts;
pub mod db;
pub mod error;
pub mod legacy;
pub mod migration;
pub mod models;
pub mod request_logger;
pub mod routes;

use crate::config::MigrationConfig;
use crate::contacts::PgContactStore;
use crate::db::ContactsDb;
use crate::legacy::PgLegacyConnector;
use crate::migration::{ContactMigration, SharedLoginHook};
use crate::request_logger::RequestLogger;
use env_logger::Env;
use rocket::fairing::AdHoc;
use rocket::{Build, Rocket};
use rocket_db_pools::Database;
use rocket_okapi::{
    openapi_get_routes,
    rapidoc::{GeneralConfig, HideShowConfig, RapiDocConfig, make_rapidoc},
    settings::UrlObject,
    swagger_ui::{SwaggerUIConfig, make_swagger_ui},
};
use std::sync::{Arc, Once};

static LOGGER: Once = Once::new();

pub fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(
            Env::default().default_filter_or("info,rocket::server=warn,rocket::request=warn"),
        )
        .init();
    });
}

pub fn rocket() -> Rocket<Build> {
    init_logger();

    let config = MigrationConfig::from_env();
    let hook_config = config.clone();

    log::info!(
        "legacy import: debug sink {}, group link policy {:?}, display name policy {:?}",
        if config.options.debug.enabled { "enabled" } else { "disabled" },
        config.options.group_link_policy,
        config.options.display_name_policy
    );
    if config.legacy.database_url.is_none() {
        log::warn!("ATMAIL_DATABASE_URL is not set; every login migration will fail");
    }

    rocket::build()
        .attach(RequestLogger::new(config.user_header.clone()))
        .attach(ContactsDb::init())
        // Run database migrations on startup
        .attach(AdHoc::try_on_ignite(
            "Run Migrations",
            |rocket| async move {
                match ContactsDb::fetch(&rocket) {
                    Some(db) => {
                        let pool = (**db).clone();
                        match db::run_migrations(&pool).await {
                            Ok(_) => {
                                log::info!("database migrations successful");
                                Ok(rocket)
                            }
                            Err(e) => {
                                log::error!("database migrations failed: {}", e);
                                Err(rocket)
                            }
                        }
                    }
                    None => {
                        log::error!("database pool not available for migrations");
                        Err(rocket)
                    }
                }
            },
        ))
        // Build the login hook around the managed destination pool
        .attach(AdHoc::try_on_ignite(
            "Contact Migration Hook",
            move |rocket| async move {
                match ContactsDb::fetch(&rocket) {
                    Some(db) => {
                        let pool = (**db).clone();
                        let hook: SharedLoginHook = Arc::new(ContactMigration::new(
                            PgLegacyConnector::new(hook_config.legacy.clone()),
                            PgContactStore::new(pool),
                            hook_config.options.clone(),
                        ));
                        Ok(rocket.manage(hook))
                    }
                    None => {
                        log::error!("database pool not available for login hook");
                        Err(rocket)
                    }
                }
            },
        ))
        .manage(config)
        .mount(
            "/api/v1",
            openapi_get_routes![
                routes::health::health_check,
                routes::hooks::login_hook,
            ],
        )
        .mount(
            "/api/docs/swagger/",
            make_swagger_ui(&SwaggerUIConfig {
                url: "../../v1/openapi.json".to_owned(),
                ..Default::default()
            }),
        )
        .mount(
            "/api/docs/rapidoc/",
            make_rapidoc(&RapiDocConfig {
                general: GeneralConfig {
                    spec_urls: vec![UrlObject::new("Address Book Import API", "../../v1/openapi.json")],
                    ..Default::default()
                },
                hide_show: HideShowConfig {
                    allow_spec_url_load: false,
                    allow_spec_file_load: false,
                    ..Default::default()
                },
                ..Default::default()
            }),
        )
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use crate::config::MigrationConfig;
    use crate::migration::SharedLoginHook;
    use rocket::config::LogLevel;
    use rocket::figment::Figment;
    use rocket::local::asynchronous::Client as AsyncClient;
    use rocket::local::blocking::Client;
    use rocket::{Build, Rocket, Route};

    pub use database::{TestDatabase, TestDatabaseError};
    pub use memory::{MemoryContactStore, MemoryLegacyConnector, MemoryLegacyStore};

    pub mod memory {
        use crate::contacts::{ContactStore, StoreError};
        use crate::legacy::{LegacyConnector, LegacyError, LegacyStore};
        use crate::models::{
            ContactId, GroupId, LegacyContactRow, LegacyGroupRow, NormalizedContact, UserContext,
        };
        use parking_lot::Mutex;
        use rocket_db_pools::sqlx;
        use std::collections::{BTreeSet, HashMap, HashSet};
        use std::sync::Arc;

        #[derive(Debug, Default)]
        struct BookState {
            next_id: i64,
            contacts: HashMap<String, Vec<(ContactId, NormalizedContact)>>,
            groups: HashMap<String, Vec<(GroupId, String)>>,
            members: BTreeSet<(GroupId, ContactId)>,
            declined_emails: HashSet<String>,
            declined_groups: HashSet<String>,
            declined_groups_once: HashSet<String>,
            failing_links: HashSet<ContactId>,
            size_unavailable: bool,
            insert_calls: usize,
            create_group_calls: usize,
            add_member_calls: usize,
        }

        /// In-memory address book recording every call made against it.
        ///
        /// Clones share state, so a test can keep a handle while the
        /// migration owns another.
        #[derive(Debug, Clone, Default)]
        pub struct MemoryContactStore {
            state: Arc<Mutex<BookState>>,
        }

        impl MemoryContactStore {
            pub fn new() -> Self {
                Self::default()
            }

            /// Pre-populate `count` placeholder contacts for `user`.
            pub fn seed_contacts(&self, user: &UserContext, count: usize) {
                let mut state = self.state.lock();
                for n in 0..count {
                    state.next_id += 1;
                    let id = ContactId(state.next_id);
                    let contact = NormalizedContact {
                        name: format!("Existing {n}"),
                        firstname: String::new(),
                        middlename: String::new(),
                        surname: String::new(),
                        emails: vec![format!("existing{n}@example.com")],
                        addresses: Default::default(),
                        phones: Default::default(),
                        organization: String::new(),
                        department: String::new(),
                        jobtitle: String::new(),
                        birthday: String::new(),
                        notes: String::new(),
                    };
                    state
                        .contacts
                        .entry(user.username().to_string())
                        .or_default()
                        .push((id, contact));
                }
            }

            /// Make `insert_contact` decline records with this primary email.
            pub fn decline_contact(&self, email: &str) {
                self.state.lock().declined_emails.insert(email.to_string());
            }

            /// Make `create_group` decline this group name.
            pub fn decline_group(&self, name: &str) {
                self.state.lock().declined_groups.insert(name.to_string());
            }

            /// Make the next `create_group` call for this name decline; later
            /// calls succeed.
            pub fn decline_group_once(&self, name: &str) {
                self.state
                    .lock()
                    .declined_groups_once
                    .insert(name.to_string());
            }

            /// Make `add_group_member` report zero links for this contact.
            pub fn fail_links_for(&self, contact: ContactId) {
                self.state.lock().failing_links.insert(contact);
            }

            /// Make `address_book_size` fail.
            pub fn fail_address_book_size(&self) {
                self.state.lock().size_unavailable = true;
            }

            pub fn contacts(&self, user: &UserContext) -> Vec<(ContactId, NormalizedContact)> {
                self.state
                    .lock()
                    .contacts
                    .get(user.username())
                    .cloned()
                    .unwrap_or_default()
            }

            pub fn groups(&self, user: &UserContext) -> Vec<(GroupId, String)> {
                self.state
                    .lock()
                    .groups
                    .get(user.username())
                    .cloned()
                    .unwrap_or_default()
            }

            pub fn members(&self) -> Vec<(GroupId, ContactId)> {
                self.state.lock().members.iter().copied().collect()
            }

            pub fn insert_calls(&self) -> usize {
                self.state.lock().insert_calls
            }

            pub fn create_group_calls(&self) -> usize {
                self.state.lock().create_group_calls
            }

            pub fn add_member_calls(&self) -> usize {
                self.state.lock().add_member_calls
            }

            /// Total number of write operations attempted.
            pub fn write_calls(&self) -> usize {
                let state = self.state.lock();
                state.insert_calls + state.create_group_calls + state.add_member_calls
            }
        }

        #[rocket::async_trait]
        impl ContactStore for MemoryContactStore {
            async fn address_book_size(&self, user: &UserContext) -> Result<i64, StoreError> {
                let state = self.state.lock();
                if state.size_unavailable {
                    return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
                }
                Ok(state
                    .contacts
                    .get(user.username())
                    .map(|contacts| contacts.len() as i64)
                    .unwrap_or(0))
            }

            async fn insert_contact(
                &self,
                user: &UserContext,
                record: &NormalizedContact,
                allow_overwrite: bool,
            ) -> Result<Option<ContactId>, StoreError> {
                let mut state = self.state.lock();
                state.insert_calls += 1;

                let primary = record.primary_email().to_string();
                if state.declined_emails.contains(&primary) {
                    return Ok(None);
                }

                state.next_id += 1;
                let new_id = ContactId(state.next_id);
                let book = state.contacts.entry(user.username().to_string()).or_default();

                if let Some(slot) = book
                    .iter_mut()
                    .find(|(_, existing)| existing.primary_email() == primary)
                {
                    if !allow_overwrite {
                        return Ok(None);
                    }
                    slot.1 = record.clone();
                    return Ok(Some(slot.0));
                }

                book.push((new_id, record.clone()));
                Ok(Some(new_id))
            }

            async fn create_group(
                &self,
                user: &UserContext,
                name: &str,
            ) -> Result<Option<GroupId>, StoreError> {
                let mut state = self.state.lock();
                state.create_group_calls += 1;

                if state.declined_groups.contains(name) || state.declined_groups_once.remove(name) {
                    return Ok(None);
                }

                state.next_id += 1;
                let id = GroupId(state.next_id);
                state
                    .groups
                    .entry(user.username().to_string())
                    .or_default()
                    .push((id, name.to_string()));
                Ok(Some(id))
            }

            async fn add_group_member(
                &self,
                _user: &UserContext,
                group: GroupId,
                contact: ContactId,
            ) -> Result<u64, StoreError> {
                let mut state = self.state.lock();
                state.add_member_calls += 1;

                if state.failing_links.contains(&contact) {
                    return Ok(0);
                }
                Ok(u64::from(state.members.insert((group, contact))))
            }
        }

        /// Legacy rows held in memory, keyed by lowercase username.
        ///
        /// Clones share the close counter, so a test can keep a handle to the
        /// store it gave a connector.
        #[derive(Debug, Clone, Default)]
        pub struct MemoryLegacyStore {
            contacts: HashMap<String, Vec<LegacyContactRow>>,
            groups: HashMap<String, Vec<LegacyGroupRow>>,
            failing_queries: bool,
            closes: Arc<Mutex<usize>>,
        }

        impl MemoryLegacyStore {
            pub fn new() -> Self {
                Self::default()
            }

            pub fn with_contacts(mut self, user: &UserContext, rows: Vec<LegacyContactRow>) -> Self {
                self.contacts.insert(user.username().to_string(), rows);
                self
            }

            pub fn with_groups(mut self, user: &UserContext, rows: Vec<LegacyGroupRow>) -> Self {
                self.groups.insert(user.username().to_string(), rows);
                self
            }

            /// Make every query fail after the connection succeeds.
            pub fn failing_queries(mut self) -> Self {
                self.failing_queries = true;
                self
            }

            /// Number of sessions closed so far.
            pub fn close_calls(&self) -> usize {
                *self.closes.lock()
            }
        }

        #[rocket::async_trait]
        impl LegacyStore for MemoryLegacyStore {
            async fn fetch_contacts(
                &self,
                user: &UserContext,
            ) -> Result<Vec<LegacyContactRow>, LegacyError> {
                if self.failing_queries {
                    return Err(LegacyError::Query(sqlx::Error::PoolClosed));
                }
                Ok(self.contacts.get(user.username()).cloned().unwrap_or_default())
            }

            async fn fetch_groups(
                &self,
                user: &UserContext,
            ) -> Result<Vec<LegacyGroupRow>, LegacyError> {
                if self.failing_queries {
                    return Err(LegacyError::Query(sqlx::Error::PoolClosed));
                }
                Ok(self.groups.get(user.username()).cloned().unwrap_or_default())
            }

            async fn close(&self) {
                *self.closes.lock() += 1;
            }
        }

        /// Connector handing out a [`MemoryLegacyStore`], or failing like an
        /// unreachable database.
        #[derive(Debug, Clone, Default)]
        pub struct MemoryLegacyConnector {
            store: Option<MemoryLegacyStore>,
            connects: Arc<Mutex<usize>>,
        }

        impl MemoryLegacyConnector {
            pub fn new(store: MemoryLegacyStore) -> Self {
                Self {
                    store: Some(store),
                    connects: Arc::default(),
                }
            }

            pub fn unreachable() -> Self {
                Self::default()
            }

            /// Number of connection attempts made so far.
            pub fn connect_calls(&self) -> usize {
                *self.connects.lock()
            }
        }

        #[rocket::async_trait]
        impl LegacyConnector for MemoryLegacyConnector {
            type Store = MemoryLegacyStore;

            async fn connect(&self) -> Result<MemoryLegacyStore, LegacyError> {
                *self.connects.lock() += 1;
                self.store
                    .clone()
                    .ok_or(LegacyError::Connection(sqlx::Error::PoolTimedOut))
            }
        }
    }

    pub mod database {
        use log::LevelFilter;
        use rocket_db_pools::sqlx::postgres::{PgConnectOptions, PgPoolOptions};
        use rocket_db_pools::sqlx::{self, ConnectOptions, PgPool};
        use testcontainers::{GenericImage, ImageExt, core::WaitFor};
        use testcontainers_modules::testcontainers::{
            ContainerAsync, core::error::TestcontainersError, runners::AsyncRunner,
        };
        use thiserror::Error;
        use tokio::runtime::Handle;
        use uuid::Uuid;

        static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

        #[derive(Debug, Error)]
        pub enum TestDatabaseError {
            #[error("TEST_DATABASE_URL not set")]
            MissingUrl,
            #[error("database error: {0}")]
            Sqlx(#[from] sqlx::Error),
            #[error("migration error: {0}")]
            Migration(#[from] sqlx::migrate::MigrateError),
            #[error("container error: {0}")]
            Container(#[from] TestcontainersError),
        }

        impl TestDatabaseError {
            /// True when no database could be provisioned at all, as opposed
            /// to a provisioned database misbehaving.
            pub fn is_unavailable(&self) -> bool {
                matches!(
                    self,
                    TestDatabaseError::MissingUrl | TestDatabaseError::Container(_)
                )
            }
        }

        /// Ephemeral database factory for integration tests.
        pub struct TestDatabase {
            pool: Option<PgPool>,
            admin_options: PgConnectOptions,
            database_name: String,
            database_url: String,
            container: Option<ContainerAsync<GenericImage>>,
        }

        impl TestDatabase {
            /// Use `TEST_DATABASE_URL` when set, otherwise launch a disposable
            /// Postgres container.
            pub async fn new_from_env() -> Result<Self, TestDatabaseError> {
                match std::env::var("TEST_DATABASE_URL") {
                    Ok(url) => Self::with_admin_url(&url, None).await,
                    Err(_) => Self::new().await,
                }
            }

            /// Provision a fresh database inside a new Postgres container.
            pub async fn new() -> Result<Self, TestDatabaseError> {
                let image = GenericImage::new("postgres", "16-alpine")
                    .with_wait_for(WaitFor::message_on_stderr(
                        "database system is ready to accept connections",
                    ));

                let request = image
                    .with_env_var("POSTGRES_DB", "postgres")
                    .with_env_var("POSTGRES_USER", "postgres")
                    .with_env_var("POSTGRES_PASSWORD", "postgres");

                let container = request.start().await?;

                let host = container.get_host().await?.to_string();
                let port = container.get_host_port_ipv4(5432).await?;
                let admin_url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

                Self::with_admin_url(&admin_url, Some(container)).await
            }

            async fn with_admin_url(
                admin_url: &str,
                container: Option<ContainerAsync<GenericImage>>,
            ) -> Result<Self, TestDatabaseError> {
                let base_options: PgConnectOptions =
                    admin_url.parse().map_err(TestDatabaseError::Sqlx)?;
                let base_options = base_options.log_statements(LevelFilter::Off);

                let base_name = base_options
                    .get_database()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "postgres".to_string());

                let admin_options = base_options.clone().database("postgres");
                let admin_pool = PgPoolOptions::new()
                    .max_connections(1)
                    .connect_with(admin_options.clone())
                    .await
                    .map_err(TestDatabaseError::Sqlx)?;

                let new_db_name = format!("{}_{}", base_name, Uuid::new_v4().simple());
                let create_sql = format!("CREATE DATABASE \"{}\" TEMPLATE template0", new_db_name);
                sqlx::query(&create_sql)
                    .execute(&admin_pool)
                    .await
                    .map_err(TestDatabaseError::Sqlx)?;
                admin_pool.close().await;

                let database_options = base_options.clone().database(&new_db_name);
                let pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect_with(database_options)
                    .await
                    .map_err(TestDatabaseError::Sqlx)?;

                MIGRATOR.run(&pool).await?;

                Ok(Self {
                    pool: Some(pool),
                    admin_options,
                    database_url: swap_database(admin_url, &new_db_name),
                    database_name: new_db_name,
                    container,
                })
            }

            /// Cloneable connection pool for use in tests and Rocket state.
            pub fn pool(&self) -> &PgPool {
                self.pool.as_ref().expect("test database pool is available")
            }

            /// Convenience method returning a clone of the pooled connection handle.
            pub fn pool_clone(&self) -> PgPool {
                self.pool().clone()
            }

            /// Connection URL for the ephemeral database.
            pub fn url(&self) -> &str {
                &self.database_url
            }

            /// Close pool connections and drop the ephemeral database.
            pub async fn close(mut self) -> Result<(), TestDatabaseError> {
                if let Some(pool) = self.pool.take() {
                    pool.close().await;
                }

                drop_database_with_fallback(self.admin_options.clone(), &self.database_name)
                    .await
                    .map_err(TestDatabaseError::Sqlx)?;

                if let Some(container) = self.container.take() {
                    drop(container);
                }

                Ok(())
            }
        }

        /// Point a connection URL at another database, keeping credentials and
        /// query parameters.
        fn swap_database(url: &str, database: &str) -> String {
            let (base, query) = match url.split_once('?') {
                Some((base, query)) => (base, Some(query)),
                None => (url, None),
            };
            let (scheme, rest) = base.split_once("://").unwrap_or(("postgres", base));
            let authority = rest.split('/').next().unwrap_or(rest);

            let mut swapped = format!("{scheme}://{authority}/{database}");
            if let Some(query) = query {
                swapped.push('?');
                swapped.push_str(query);
            }
            swapped
        }

        async fn drop_database_with_fallback(
            admin_options: PgConnectOptions,
            database_name: &str,
        ) -> Result<(), sqlx::Error> {
            let admin_pool = PgPoolOptions::new()
                .max_connections(1)
                .connect_with(admin_options)
                .await?;

            let drop_force = format!("DROP DATABASE \"{}\" WITH (FORCE)", database_name);
            match sqlx::query(&drop_force).execute(&admin_pool).await {
                Ok(_) => Ok(()),
                Err(err) if force_drop_unsupported(&err) => {
                    let drop_sql = format!("DROP DATABASE \"{}\"", database_name);
                    sqlx::query(&drop_sql).execute(&admin_pool).await?;
                    Ok(())
                }
                Err(err) => Err(err),
            }
        }

        fn force_drop_unsupported(err: &sqlx::Error) -> bool {
            matches!(
                err,
                sqlx::Error::Database(db_err)
                    if db_err
                        .code()
                        .map(|code| code == "42601" || code == "0A000")
                        .unwrap_or(false)
            )
        }

        impl Drop for TestDatabase {
            fn drop(&mut self) {
                if let Some(pool) = self.pool.take() {
                    let admin_options = self.admin_options.clone();
                    let db_name = self.database_name.clone();
                    if let Ok(handle) = Handle::try_current() {
                        handle.spawn(async move {
                            pool.close().await;
                            let _ =
                                drop_database_with_fallback(admin_options.clone(), &db_name).await;
                        });
                    } else {
                        std::thread::spawn(move || {
                            if let Ok(rt) = tokio::runtime::Runtime::new() {
                                rt.block_on(async move {
                                    pool.close().await;
                                    let _ = drop_database_with_fallback(
                                        admin_options.clone(),
                                        &db_name,
                                    )
                                    .await;
                                });
                            }
                        });
                    }
                }

                if let Some(container) = self.container.take() {
                    drop(container);
                }
            }
        }
    }

    /// Builder for constructing Rocket instances tailored for integration tests.
    #[derive(Default)]
    pub struct TestRocketBuilder {
        figment: Figment,
        mounts: Vec<(String, Vec<Route>)>,
        login_hook: Option<SharedLoginHook>,
        config: Option<MigrationConfig>,
    }

    impl TestRocketBuilder {
        /// Start a builder with sensible defaults: random port, logging disabled.
        pub fn new() -> Self {
            let figment = rocket::Config::figment()
                .merge(("port", 0))
                .merge(("log_level", LogLevel::Off))
                .merge(("cli_colors", false));

            Self {
                figment,
                mounts: Vec::new(),
                login_hook: None,
                config: None,
            }
        }

        /// Mount routes under `/api/v1`.
        pub fn mount_api_routes(mut self, routes: Vec<Route>) -> Self {
            self.mounts.push(("/api/v1".to_string(), routes));
            self
        }

        /// Manage the hook the login route runs.
        pub fn manage_login_hook(mut self, hook: SharedLoginHook) -> Self {
            self.login_hook = Some(hook);
            self
        }

        /// Manage a configuration, e.g. to change the trusted user header.
        pub fn manage_config(mut self, config: MigrationConfig) -> Self {
            self.config = Some(config);
            self
        }

        /// Finish building the Rocket instance.
        pub fn build(self) -> Rocket<Build> {
            let mut rocket = rocket::custom(self.figment);

            for (base, routes) in self.mounts {
                rocket = rocket.mount(base, routes);
            }

            if let Some(hook) = self.login_hook {
                rocket = rocket.manage(hook);
            }

            if let Some(config) = self.config {
                rocket = rocket.manage(config);
            }

            rocket
        }

        /// Convenience helper to produce a blocking local client.
        pub fn blocking_client(self) -> Client {
            Client::tracked(self.build()).expect("valid Rocket instance")
        }

        /// Convenience helper to produce an asynchronous local client.
        pub async fn async_client(self) -> AsyncClient {
            AsyncClient::tracked(self.build())
                .await
                .expect("valid Rocket instance")
        }
    }
}
