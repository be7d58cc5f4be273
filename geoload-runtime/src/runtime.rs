//! Default geoload runtime
//!
//! Loads a JSON run configuration, runs the selected scenarios concurrently
//! and renders one report per scenario.
use crate::error::RuntimeError;
use clap::{Parser, ValueEnum};
use geoload::{cancellation, CancelToken, Scenario};
use geoload_core::{RunConfig, RunStatistics, ScenarioConfig};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinSet;
#[allow(unused)]
use tracing::{debug, error, info, instrument, warn, Instrument};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "geoload", version, about = "Ramping virtual-user load tests for geospatial APIs")]
struct GeoloadCli {
    /// JSON run configuration.
    #[arg(short, long)]
    config: PathBuf,

    /// Run only the named scenario. Repeatable; defaults to all.
    #[arg(short, long = "scenario")]
    scenarios: Vec<String>,

    /// Override the base URL of every scenario.
    #[arg(short, long)]
    base_url: Option<String>,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Log a progress snapshot at this interval, e.g. `10s`.
    #[arg(short, long, value_parser = humantime::parse_duration)]
    report_interval: Option<Duration>,

    /// Serve Prometheus metrics on this address while running.
    #[arg(short, long)]
    metrics_addr: Option<SocketAddr>,
}

/// Default geoload runtime.
///
/// # Example
///
/// ```no_run
/// use geoload_runtime::{render, GeoloadRuntime};
///
/// #[tokio::main]
/// async fn main() -> Result<(), geoload_runtime::RuntimeError> {
///     let runtime = GeoloadRuntime::new().with_args();
///     let format = runtime.format();
///     let stats = runtime.run().await?;
///     println!("{}", render(&stats, format)?);
///     Ok(())
/// }
/// ```
#[derive(Debug, Default)]
pub struct GeoloadRuntime {
    config: Option<PathBuf>,
    scenarios: Vec<String>,
    base_url: Option<String>,
    format: OutputFormat,
    report_interval: Option<Duration>,
    metrics_addr: Option<SocketAddr>,
}

impl GeoloadRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the command-line arguments.
    ///
    /// ```ignore
    /// $ geoload --config scenarios/autocomplete.json
    /// $ geoload -c scenarios/search.json -b http://staging:6060 -f json -m 0.0.0.0:9000
    /// ```
    pub fn with_args(self) -> Self {
        self.with_cli(GeoloadCli::parse())
    }

    fn with_cli(mut self, args: GeoloadCli) -> Self {
        self.config = Some(args.config);
        self.scenarios = args.scenarios;
        self.base_url = args.base_url;
        self.format = args.format;
        self.report_interval = args.report_interval;
        self.metrics_addr = args.metrics_addr;
        self
    }

    pub fn config(mut self, path: impl Into<PathBuf>) -> Self {
        self.config = Some(path.into());
        self
    }

    pub fn scenario(mut self, name: &str) -> Self {
        self.scenarios.push(name.to_string());
        self
    }

    pub fn base_url(mut self, base_url: &str) -> Self {
        self.base_url = Some(base_url.to_string());
        self
    }

    pub fn report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = Some(interval);
        self
    }

    pub fn metrics_addr(mut self, addr: SocketAddr) -> Self {
        self.metrics_addr = Some(addr);
        self
    }

    pub fn output(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Load, select and override the configured scenarios.
    pub fn load(&self) -> Result<Vec<ScenarioConfig>, RuntimeError> {
        let path = self.config.as_ref().ok_or(RuntimeError::NoConfig)?;
        let mut config = RunConfig::from_file(path)?.select(&self.scenarios)?;
        if let Some(base_url) = &self.base_url {
            config.override_base_url(base_url)?;
        }

        let scenarios = config
            .into_scenarios()
            .into_iter()
            .map(|scenario| match self.report_interval {
                Some(interval) => scenario.report_interval(Some(interval)),
                None => scenario,
            })
            .collect();
        Ok(scenarios)
    }

    /// Run every selected scenario to completion, cancelling on ctrl-c.
    #[instrument(name = "geoload", skip_all)]
    pub async fn run(self) -> Result<Vec<RunStatistics>, RuntimeError> {
        let scenarios = self.load()?;

        if let Some(addr) = self.metrics_addr {
            PrometheusBuilder::new().with_http_listener(addr).install()?;
            info!("Serving metrics on http://{addr}/metrics");
        }

        let (canceller, token) = cancellation();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling run");
                canceller.cancel();
            }
        });

        run_scenarios(scenarios, token).await
    }
}

/// Run scenarios concurrently, each with its own sample store. Results are in
/// configuration order.
pub async fn run_scenarios(
    scenarios: Vec<ScenarioConfig>,
    token: CancelToken,
) -> Result<Vec<RunStatistics>, RuntimeError> {
    let count = scenarios.len();
    let mut set = JoinSet::new();
    for (idx, config) in scenarios.into_iter().enumerate() {
        let scenario = Scenario::new(config).cancel_on(token.clone());
        set.spawn(async move { (idx, scenario.await) }.in_current_span());
    }

    let mut results: Vec<Option<RunStatistics>> = vec![None; count];
    while let Some(joined) = set.join_next().await {
        let (idx, stats) = joined.map_err(geoload::Error::from)?;
        results[idx] = Some(stats?);
    }

    Ok(results.into_iter().flatten().collect())
}

/// Render reports in the requested format.
pub fn render(stats: &[RunStatistics], format: OutputFormat) -> Result<String, RuntimeError> {
    match format {
        OutputFormat::Text => Ok(stats
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(stats)?),
    }
}
