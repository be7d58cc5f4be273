use geoload::core::RunConfig;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use mock_service::MockConfig;
use std::sync::OnceLock;
use tracing::error;
use tracing_subscriber::FmtSubscriber;

/// Install logging, a panic hook and an in-process Prometheus recorder once
/// per test binary.
#[allow(unused)]
pub fn init() -> PrometheusHandle {
    static ONCE_LOCK: OnceLock<PrometheusHandle> = OnceLock::new();

    ONCE_LOCK
        .get_or_init(|| {
            let default_panic = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| {
                default_panic(info);
                error!("Panic occurred: {info:?}");
            }));

            let _ = FmtSubscriber::builder()
                .with_env_filter("geoload=debug,mock_service=info")
                .with_test_writer()
                .try_init();

            PrometheusBuilder::new().install_recorder().unwrap()
        })
        .clone()
}

/// Start a mock service and return its base URL.
#[allow(unused)]
pub async fn mock(config: MockConfig) -> String {
    let addr = mock_service::spawn(config).await.unwrap();
    format!("http://{addr}")
}

/// A one-scenario configuration with short timings, in the stock file format.
#[allow(unused)]
pub fn single(base_url: &str, stages: &str, request: &str, extra: &str) -> RunConfig {
    let json = format!(
        r#"{{
            "base_url": "{base_url}",
            "defaults": {{ "think_time": "20ms", "poll_interval": "10ms", "grace_period": "2s" }},
            "scenarios": [ {{
                "name": "e2e",
                "stages": {stages},
                "request": {request}
                {extra}
            }} ]
        }}"#
    );
    RunConfig::from_json(&json).unwrap()
}
