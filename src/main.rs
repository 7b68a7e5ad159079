use dotenvy::dotenv;
use finance_tracker::{
    cache::{HttpFxSource, RateCache},
    config::{self, database, users::configured_identity},
    core::{local_state::LocalStorage, session::Session},
    errors::Result,
};
use std::{path::Path, sync::Arc};
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Creates the parent directory of a `sqlite://path?...` URL so `mode=rwc` can
/// create the file.
fn ensure_sqlite_dir(url: &str) -> Result<()> {
    let Some(path) = url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or(path);
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

async fn build_session(app_config: &config::AppConfig) -> Result<Session> {
    if app_config.demo.enabled {
        info!("Demo mode enabled, using a private in-memory store");
        return Session::demo(app_config).await;
    }

    ensure_sqlite_dir(&app_config.store.database_url)?;
    ensure_sqlite_dir(&app_config.local.database_url)?;

    let db = Arc::new(
        database::open_store(&app_config.store.database_url)
            .await
            .inspect(|_| info!("Store initialized successfully."))
            .inspect_err(|e| error!("Failed to initialize store: {}", e))?,
    );
    let local = LocalStorage::new(
        database::open_local(&app_config.local.database_url)
            .await
            .inspect_err(|e| error!("Failed to initialize local state: {}", e))?,
    );

    let rates = Arc::new(
        RateCache::new(&app_config.rates)
            .with_source(Arc::new(HttpFxSource::new(app_config.rates.api_url.as_str())))
            .with_store(Arc::clone(&db))
            .with_local(local.clone()),
    );
    rates.load().await;
    Arc::clone(&rates).spawn_periodic_refresh(app_config.rates.refresh_interval());

    let mut session = Session::live(db, local, rates, app_config.sync.change_debounce());
    match configured_identity() {
        Some(identity) => session.sign_in(identity).await?,
        None => warn!("FINANCE_USER_ID is not set, running signed out"),
    }
    Ok(session)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    // 3. Load the application configuration
    let app_config = config::load_default_config()?;
    info!("Successfully processed application configuration.");

    // 4. Build the session
    let session = Arc::new(Mutex::new(build_session(&app_config).await?));

    {
        let session = session.lock().await;
        match session.summary().await {
            Ok(summary) => info!(
                "Total balance {:.2} {} across {} accounts ({} transactions), rates as of {}",
                summary.total_balance,
                summary.display_currency,
                summary.account_count,
                summary.transaction_count,
                summary.rates_as_of
            ),
            Err(e) => warn!("No dashboard summary: {}", e),
        }
    }

    // 5. Run until interrupted
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    session.lock().await.sign_out().await;
    Ok(())
}
