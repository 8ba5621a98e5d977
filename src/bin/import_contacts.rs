use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use atmail_import::config::{DisplayNamePolicy, GroupLinkPolicy, MigrationConfig};
use atmail_import::contacts::PgContactStore;
use atmail_import::legacy::PgLegacyConnector;
use atmail_import::migration::{ContactMigration, MigrationOutcome, debug_log};
use atmail_import::models::UserContext;

#[derive(Parser, Debug)]
#[command(
    name = "import_contacts",
    about = "Import one user's legacy Atmail contacts and groups into the address book"
)]
struct Args {
    /// Username to migrate (case insensitive).
    #[arg(long)]
    user: String,

    /// Legacy database URL. Defaults to ATMAIL_DATABASE_URL.
    #[arg(long)]
    database_url: Option<String>,

    /// Append the run summary to the debug file.
    #[arg(long)]
    debug: bool,

    /// Debug file to append to. Defaults to ATMAIL_DEBUG_FILE.
    #[arg(long)]
    debug_file: Option<PathBuf>,

    /// Link the row that creates a group as well as the rows after it.
    #[arg(long)]
    link_first_row: bool,

    /// Trim surrounding whitespace from display names.
    #[arg(long)]
    trim_display_name: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    let user = UserContext::new(args.user.trim());

    if user.username().is_empty() {
        writeln!(io::stderr(), "error: --user must not be empty")?;
        std::process::exit(1);
    }

    let mut config = MigrationConfig::from_env();
    if let Some(url) = args.database_url {
        config.legacy.database_url = Some(url);
    }
    if args.debug {
        config.options.debug.enabled = true;
    }
    if let Some(path) = args.debug_file {
        config.options.debug.path = path;
    }
    if args.link_first_row {
        config.options.group_link_policy = GroupLinkPolicy::EveryRow;
    }
    if args.trim_display_name {
        config.options.display_name_policy = DisplayNamePolicy::Trimmed;
    }

    let database_url = std::env::var("DATABASE_URL")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    atmail_import::db::run_migrations(&pool).await?;

    let migration = ContactMigration::new(
        PgLegacyConnector::new(config.legacy.clone()),
        PgContactStore::new(pool),
        config.options.clone(),
    );

    match migration.run(&user).await {
        Ok(MigrationOutcome::Skipped { existing_contacts }) => {
            println!("'{user}' already has {existing_contacts} contacts; nothing imported");
        }
        Ok(MigrationOutcome::Completed(summary)) => {
            debug_log::emit(&config.options.debug, &summary).await;
            print!("{summary}");
            println!(
                "Contacts imported: {}/{} ({} rejected, {} failed)",
                summary.contacts_imported,
                summary.contacts_examined,
                summary.contacts_rejected,
                summary.contacts_failed
            );
        }
        Err(err) => {
            writeln!(io::stderr(), "error: migration for '{user}' aborted: {err}")?;
            std::process::exit(1);
        }
    }

    Ok(())
}
