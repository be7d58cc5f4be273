use geoload_runtime::{render, GeoloadRuntime};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> ExitCode {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("geoload=info,geoload_core=info,geoload_runtime=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let runtime = GeoloadRuntime::new().with_args();
    let format = runtime.format();

    match runtime.run().await.and_then(|stats| render(&stats, format)) {
        Ok(report) => {
            println!("{report}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
