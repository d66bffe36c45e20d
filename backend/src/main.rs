use learnchain_backend::config::Config;
use learnchain_backend::errors::PipelineError;
use learnchain_backend::state::AppState;
use learnchain_backend::{api, db};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;

    std::fs::create_dir_all(&config.data_dir)?;

    let db_path = config.data_dir.join("ledger.sqlite");
    let db_url = format!("sqlite:{}?mode=rwc", db_path.to_string_lossy());

    let db = db::connect(&db_url).await?;
    db::init_schema(&db).await?;

    let state = AppState::from_config(&config, db)?;

    match state.health.check_health().await {
        Ok(report) => tracing::info!(
            block = report.block_number,
            gas_price_gwei = report.gas_price_gwei,
            balance_eth = report.balance_eth,
            healthy = report.healthy,
            "connected to chain"
        ),
        Err(e) => tracing::warn!(error = %e, "initial health check failed"),
    }

    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!(addr = %config.bind_addr, app = %config.app_name, "backend listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}
