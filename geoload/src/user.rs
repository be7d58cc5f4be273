use crate::outcome::{check, CallResult};
use crate::recorder::SampleRecorder;
use crate::request::{RequestBuilder, RequestInstance};
use crate::signal::{left_running, run_cancelled, RunState};
use geoload_core::{Expectation, Sample};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, instrument, trace, warn};

/// Everything a virtual user needs, shared by all users of one scenario.
#[derive(Clone)]
pub(crate) struct UserContext {
    pub builder: Arc<RequestBuilder>,
    pub client: reqwest::Client,
    pub recorder: SampleRecorder,
    pub expect: Expectation,
    pub timeout: Duration,
    pub think_time: Duration,
    pub think_jitter: Duration,
    pub run_start: Instant,
    pub state: watch::Receiver<RunState>,
}

/// One simulated caller. Owned by the population for its whole life.
pub(crate) struct VirtualUser {
    id: u64,
    iteration: u64,
    retire: Arc<AtomicBool>,
    ctx: UserContext,
    rng: SmallRng,
}

impl VirtualUser {
    pub fn new(id: u64, retire: Arc<AtomicBool>, ctx: UserContext) -> Self {
        Self {
            id,
            iteration: 0,
            retire,
            ctx,
            rng: SmallRng::from_entropy(),
        }
    }

    #[instrument(name = "vu", skip_all, fields(id = self.id))]
    pub async fn run(mut self) {
        trace!("Virtual user started");

        while self.running() {
            let request = self.ctx.builder.build(self.iteration);
            let issued = Instant::now();

            let mut state = self.ctx.state.clone();
            let result = tokio::select! {
                biased;
                _ = run_cancelled(&mut state) => {
                    trace!("Abandoning in-flight call");
                    break;
                }
                result = execute(&self.ctx.client, request, self.ctx.timeout) => result,
            };

            let duration = issued.elapsed();
            let outcome = check(&self.ctx.expect, &result);
            trace!(iteration = self.iteration, ?duration, ?outcome, "Call completed");

            self.ctx.recorder.record(Sample {
                user: self.id,
                iteration: self.iteration,
                started_at: issued - self.ctx.run_start,
                duration,
                outcome,
            });
            self.iteration += 1;

            if !self.think().await {
                break;
            }

            if self.retire.load(Ordering::Acquire) {
                trace!("Retiring");
                break;
            }
        }

        trace!(iterations = self.iteration, "Virtual user exited");
    }

    fn running(&self) -> bool {
        *self.ctx.state.borrow() == RunState::Running && !self.retire.load(Ordering::Acquire)
    }

    /// Pause between iterations. Returns `false` if the run stopped meanwhile.
    async fn think(&mut self) -> bool {
        let mut pause = self.ctx.think_time;
        if !self.ctx.think_jitter.is_zero() {
            pause += self.rng.gen_range(Duration::ZERO..=self.ctx.think_jitter);
        }

        let mut state = self.ctx.state.clone();
        tokio::select! {
            _ = tokio::time::sleep(pause) => true,
            _ = left_running(&mut state) => false,
        }
    }
}

/// Issue one request and read the full response body.
pub(crate) async fn execute(
    client: &reqwest::Client,
    request: RequestInstance,
    timeout: Duration,
) -> CallResult {
    let response = request.into_reqwest(client, timeout).send().await?;
    let status = response.status().as_u16();
    response.bytes().await?;
    Ok(status)
}
