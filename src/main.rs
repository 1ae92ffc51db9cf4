use chrono::Utc;
use dotenvy::dotenv;
use loyalty_ledger::{
    config::{database, program},
    core::{
        context::LoyaltyContext,
        query::list_ready_for_redemption,
        refresh::{format_refresh_summary, refresh_active_points},
    },
    errors::Result,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Load program configuration
    let config = program::load_default_config()
        .inspect_err(|e| error!("Failed to load program configuration: {}", e))?;
    info!(
        "Listing page size defaults to {}",
        config.listing.default_page_size
    );

    // 4. Connect and make sure the schema exists
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|_| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to initialize database: {}", e))?;

    let ctx = LoyaltyContext::with_config(db, &config);

    // 5. Bring time-dependent balances up to date
    let result = refresh_active_points(&ctx, Utc::now())
        .await
        .inspect_err(|e| error!("Failed to refresh active points: {}", e))?;
    info!("{}", format_refresh_summary(&result).trim_end());

    let ready = list_ready_for_redemption(&ctx, 1, Some(1)).await?;
    info!("{} accounts ready for redemption", ready.total);

    Ok(())
}
