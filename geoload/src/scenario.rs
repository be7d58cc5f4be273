//! Scenario execution: the ramp scheduler and its future.
use crate::error::Error;
use crate::population::Population;
use crate::recorder::SampleRecorder;
use crate::report::Reporter;
use crate::request::RequestBuilder;
use crate::signal::{wait_cancelled, CancelToken, RunState};
use crate::timer::Timer;
use crate::user::UserContext;
use geoload_core::{RunStatistics, ScenarioConfig, MAX_DURATION};
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::sync::watch;
use tokio::time::Instant;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

/// A single scenario run.
///
/// Awaiting it drives the virtual-user population through the configured ramp
/// profile and resolves to the statistics of every completed call.
///
/// # Example
/// ```no_run
/// use geoload::prelude::*;
/// use std::time::Duration;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let profile = RampProfile::constant(Duration::from_secs(30), 10);
/// let request = RequestTemplate::new(Method::Post, "/api/autocomplete").query("Taman Mini");
/// let config = ScenarioConfig::new("autocomplete", "http://localhost:3000", profile, request)?;
///
/// let stats = Scenario::new(config).await?;
/// println!("{stats}");
/// # Ok(())
/// # }
/// ```
#[pin_project::pin_project]
pub struct Scenario {
    config: ScenarioConfig,
    client: Option<reqwest::Client>,
    cancel: Option<CancelToken>,
    recorder: Option<SampleRecorder>,
    runner_fut: Option<Pin<Box<dyn Future<Output = Result<RunStatistics, Error>> + Send>>>,
}

impl Scenario {
    pub fn new(config: ScenarioConfig) -> Self {
        Self {
            config,
            client: None,
            cancel: None,
            recorder: None,
            runner_fut: None,
        }
    }

    /// Use an existing HTTP client instead of building one from the config.
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Stop the run early when `token` is cancelled.
    pub fn cancel_on(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Record into `recorder`, allowing samples to be read while the run is live.
    pub fn recorder(mut self, recorder: SampleRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }
}

impl Future for Scenario {
    type Output = Result<RunStatistics, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let runner = this.runner_fut.get_or_insert_with(|| {
            let config = this.config.clone();
            let recorder = this
                .recorder
                .take()
                .unwrap_or_else(|| SampleRecorder::new(config.name()));
            Box::pin(run_scenario(
                config,
                this.client.take(),
                this.cancel.take(),
                recorder,
            ))
        });

        runner.as_mut().poll(cx)
    }
}

#[instrument(name = "scenario", skip_all, fields(name = config.name()))]
pub(crate) async fn run_scenario(
    config: ScenarioConfig,
    client: Option<reqwest::Client>,
    mut cancel: Option<CancelToken>,
    recorder: SampleRecorder,
) -> Result<RunStatistics, Error> {
    let profile = config.profile().clone();
    // Loaded profiles are bounded already; programmatic ones may not be.
    let total = profile.total_duration().min(MAX_DURATION);
    info!(
        "Running {} against {} for {} (peak {} users)",
        config.name(),
        config.base_url(),
        humantime::format_duration(total),
        profile.peak_target()
    );

    let client = match client {
        Some(client) => client,
        None => build_client(&config)?,
    };

    let start = Instant::now();
    let end = start + total;
    let (state_tx, state_rx) = watch::channel(RunState::Running);
    let (think_time, think_jitter) = config.think();

    let ctx = UserContext {
        builder: Arc::new(RequestBuilder::for_scenario(&config)),
        client,
        recorder: recorder.clone(),
        expect: config.expectation(),
        timeout: config.request_timeout(),
        think_time,
        think_jitter,
        run_start: start,
        state: state_rx,
    };
    let mut population = Population::new(config.name(), ctx);
    let mut reporter = Reporter::new(
        config.name(),
        config.reported_percentiles(),
        recorder,
        start,
    )
    .every(config.report_every());

    let mut timer = Timer::new(config.poll()).await;
    debug!("Reconciling population every {timer}");

    // NOTE: Cancellation is checked before every reconciliation so that no
    // user is spawned once it has been requested.
    let cancelled = loop {
        if cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            break true;
        }

        let elapsed = start.elapsed();
        if elapsed >= total {
            break false;
        }

        let target = profile.target_at(elapsed) as usize;
        if target != population.len() {
            trace!("Target {target} users at {elapsed:?}");
        }
        population.set_concurrency(target);
        reporter.tick(population.len(), population.peak());

        tokio::select! {
            _ = timer.tick() => {}
            _ = tokio::time::sleep_until(end) => {}
            _ = wait_cancelled(&mut cancel) => break true,
        }
    };

    let users = population.len();
    let peak = population.peak();
    let grace = config.grace();

    let aborted = if cancelled {
        info!("Cancelled, abandoning in-flight calls");
        state_tx.send_replace(RunState::Cancelled);
        population.shutdown(grace).await
    } else {
        debug!(
            "Profile complete, draining {users} users and {} retirees",
            population.draining()
        );
        state_tx.send_replace(RunState::Stopping);

        let shutdown = population.shutdown(grace);
        tokio::pin!(shutdown);
        tokio::select! {
            aborted = &mut shutdown => aborted,
            _ = wait_cancelled(&mut cancel) => {
                warn!("Cancelled while draining, abandoning in-flight calls");
                state_tx.send_replace(RunState::Cancelled);
                shutdown.await
            }
        }
    };

    let stats = reporter.finish(users, peak);
    info!(
        requests = stats.count,
        failed = stats.failed,
        aborted,
        "Scenario complete"
    );

    Ok(stats)
}

fn build_client(config: &ScenarioConfig) -> Result<reqwest::Client, Error> {
    let idle = (config.profile().peak_target() as usize).max(1);
    Ok(reqwest::Client::builder()
        .timeout(config.request_timeout())
        .pool_max_idle_per_host(idle)
        .build()?)
}
