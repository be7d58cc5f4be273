use metrics_exporter_prometheus::PrometheusBuilder;
use mock_service::{tps_measure_task, MockConfig};
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mock_service=info")),
        )
        .init();

    let addr: SocketAddr = env_or("MOCK_ADDR", "0.0.0.0:3000").parse()?;
    let config = MockConfig::default()
        .delay(Duration::from_millis(env_or("MOCK_DELAY_MS", "50").parse()?))
        .jitter(Duration::from_millis(env_or("MOCK_JITTER_MS", "0").parse()?))
        .error_every(env_or("MOCK_ERROR_EVERY", "0").parse()?)
        .max_tps(env_or("MOCK_MAX_TPS", "0").parse()?);

    if let Ok(metrics_addr) = std::env::var("MOCK_METRICS_ADDR") {
        PrometheusBuilder::new()
            .with_http_listener(metrics_addr.parse::<SocketAddr>()?)
            .install()?;
    }

    tokio::spawn(tps_measure_task());

    tracing::info!("Serving {config:?} on {addr}");
    mock_service::run(addr, config).await
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
