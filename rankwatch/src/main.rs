mod clock;
mod config;
mod dispatcher;
mod edit_distance;
mod error;
mod models;
mod reconciler;
mod schema;
mod scraper;
mod store;

use std::io;
use std::process::ExitCode;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::dispatcher::Dispatcher;
use crate::scraper::Scraper;
use crate::store::PgStore;

fn print_usage() {
    println!("usage: rankwatch [config.yml]");
    println!("  zero arguments: run using the default config path ({})", config::DEFAULT_CONFIG_PATH);
    println!("  any argument:   print this message and exit");
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        print_usage();
        return ExitCode::SUCCESS;
    }

    let db_config = match config::load_db_config(config::DEFAULT_CONFIG_PATH) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "failed to load database configuration");
            return ExitCode::FAILURE;
        }
    };
    let environment = config::load_environment(config::DEFAULT_ENV_PATH);

    // An empty `Dbhost` means "connect over the default Unix socket",
    // matching libpq's own convention of falling back to the socket when no
    // host is given.
    let database_url = if db_config.dbhost.is_empty() {
        format!(
            "postgres://{user}:{pw}@/{name}",
            user = db_config.dbuser,
            pw = db_config.dbpw,
            name = db_config.dbname,
        )
    } else {
        format!(
            "postgres://{user}:{pw}@{host}/{name}",
            user = db_config.dbuser,
            pw = db_config.dbpw,
            host = db_config.dbhost,
            name = db_config.dbname,
        )
    };

    let pool = match PgStore::build_pool(&database_url) {
        Ok(pool) => pool,
        Err(err) => {
            tracing::error!(error = %err, "failed to build database connection pool");
            return ExitCode::FAILURE;
        }
    };

    let store = PgStore::new(pool);
    let scraper = Scraper::new();
    let dispatcher = Dispatcher::new(store, scraper, environment.interval_hour);

    tracing::info!(interval_hour = environment.interval_hour, "rankwatch starting");
    dispatcher.run().await;
    tracing::info!("rankwatch exiting");

    ExitCode::SUCCESS
}
