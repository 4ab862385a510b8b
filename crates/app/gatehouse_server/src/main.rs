//! Gatehouse server binary.
//!
//! Loads the authority's verification keys, keeps them fresh in the
//! background and serves the decision endpoints over HTTP.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use gatehouse_api::AppState;
use gatehouse_core::authority::HttpAuthority;
use gatehouse_core::config::{AuthConfig, ConfigError};
use gatehouse_core::gate::Gate;
use gatehouse_core::keys::KeyStore;
use gatehouse_core::store::RecordStore;
use gatehouse_core::store::memory::MemoryStore;
use gatehouse_core::store::postgres::PgRecordStore;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Where resolved tokens and users are cached.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum StoreKind {
    Postgres,
    Memory,
}

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "gatehouse_server", about = "Gatehouse authorization server")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3100")]
    bind: String,

    /// Record cache backend.
    #[arg(long, value_enum, default_value_t = StoreKind::Postgres)]
    store: StoreKind,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/gatehouse"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Timeout of each authority request, in seconds.
    #[arg(long, default_value_t = 10)]
    request_timeout_secs: u64,

    /// Interval between verification key refreshes, in seconds.
    #[arg(long, default_value_t = 3600)]
    key_refresh_secs: u64,
}

impl Args {
    /// Authority settings come from the environment; timings from the CLI.
    fn auth_config(&self) -> Result<AuthConfig, ConfigError> {
        let mut config = AuthConfig::from_env()?;
        config.request_timeout = Duration::from_secs(self.request_timeout_secs);
        config.key_refresh_interval = Duration::from_secs(self.key_refresh_secs);
        config.validate()?;
        Ok(config)
    }
}

async fn open_store(args: &Args) -> Result<Arc<dyn RecordStore>, Box<dyn std::error::Error>> {
    match args.store {
        StoreKind::Memory => {
            warn!("using in-memory record cache; records are lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreKind::Postgres => {
            info!(max_connections = args.max_connections, "configuring connection pool");
            let pool = PgPoolOptions::new()
                .max_connections(args.max_connections)
                .acquire_timeout(Duration::from_secs(30))
                .connect(&args.database_url)
                .await?;
            info!("running database migrations");
            gatehouse_core::migrate::migrate(&pool).await?;
            Ok(Arc::new(PgRecordStore::new(pool)))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,gatehouse_core=debug,gatehouse_api=debug")),
        )
        .init();

    let args = Args::parse();
    let config = Arc::new(args.auth_config()?);

    info!(
        version = gatehouse_core::version(),
        auth_origin = %config.auth_origin,
        user_origin = %config.user_origin,
        bind = %args.bind,
        "starting gatehouse_server"
    );

    let store = open_store(&args).await?;

    let authority = Arc::new(HttpAuthority::new(&config)?);
    // No key, no service: a failed first fetch aborts startup.
    let keys = KeyStore::bootstrap(authority.clone()).await?;
    let refresh = keys.spawn_refresh_task(config.key_refresh_interval);

    let gate = Arc::new(Gate::new(keys, store, authority));
    let app = gatehouse_api::router(AppState::new(gate));

    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    info!(addr = %listener.local_addr()?, "listening");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    refresh.abort();
    result?;
    Ok(())
}
