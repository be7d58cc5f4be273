use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Scenario task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
