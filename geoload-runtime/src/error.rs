use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("No configuration file given")]
    NoConfig,

    #[error("Invalid configuration: {0}")]
    Config(#[from] geoload_core::ConfigError),

    #[error(transparent)]
    Scenario(#[from] geoload::Error),

    #[error("Failed to serialize report: {0}")]
    Output(#[from] serde_json::Error),

    #[error("Failed to start metrics exporter: {0}")]
    Exporter(#[from] metrics_exporter_prometheus::BuildError),
}
