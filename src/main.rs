use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use PriceInfra::adapters::default_adapters;
use PriceInfra::config::loader::AppConfig;
use PriceInfra::fallback::coingecko::CoinGeckoSource;
use PriceInfra::observability::metrics::register_metrics;
use PriceInfra::service::PriceFeedService;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    register_metrics();

    let env = std::env::var("PRICEINFRA_ENV").unwrap_or_else(|_| "default".to_string());
    let config = AppConfig::load(&env)?;
    info!(symbols = ?config.symbols, "starting price feed service");

    let fallback = Arc::new(CoinGeckoSource::new(&config.fallback));
    let service = PriceFeedService::connect(
        default_adapters(),
        config.symbols.clone(),
        config.feed.clone(),
        fallback,
    );

    let price_subs: Vec<_> = config
        .symbols
        .iter()
        .map(|symbol| {
            service.on_price(symbol.clone(), |tick| {
                info!(
                    symbol = %tick.symbol,
                    price = tick.price,
                    source = %tick.source,
                    confidence = tick.confidence,
                    "fused tick"
                );
            })
        })
        .collect();

    let status_sub = service.on_status(|statuses| {
        for status in statuses {
            debug!(
                adapter = %status.adapter,
                state = %status.state,
                attempts = status.reconnect_attempts,
                "connection status"
            );
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    for sub in &price_subs {
        sub.unsubscribe();
    }
    status_sub.unsubscribe();
    service.disconnect().await;
    Ok(())
}
