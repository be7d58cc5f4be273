use crate::user::{UserContext, VirtualUser};
use geoload_core::MAX_DURATION;
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, trace, warn};

struct UserHandle {
    id: u64,
    retire: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// The live set of virtual users for one scenario.
///
/// Spawning is immediate; retirement is cooperative. A retired user finishes
/// its current iteration and think-time before exiting, and no longer counts
/// towards the live population while it drains.
pub(crate) struct Population {
    ctx: UserContext,
    active: Vec<UserHandle>,
    retiring: Vec<JoinHandle<()>>,
    next_id: u64,
    peak: usize,
    #[cfg(feature = "metrics")]
    gauge: metrics::Gauge,
}

impl Population {
    pub fn new(scenario: &str, ctx: UserContext) -> Self {
        #[cfg(not(feature = "metrics"))]
        let _ = scenario;

        Self {
            ctx,
            active: vec![],
            retiring: vec![],
            next_id: 0,
            peak: 0,
            #[cfg(feature = "metrics")]
            gauge: metrics::gauge!(crate::recorder::USERS_METRIC, "scenario" => scenario.to_string()),
        }
    }

    /// Spawn or retire users until exactly `concurrency` are live.
    pub fn set_concurrency(&mut self, concurrency: usize) {
        self.reap();

        match self.active.len().cmp(&concurrency) {
            CmpOrdering::Equal => {}
            CmpOrdering::Greater => {
                let retired = self.active.len() - concurrency;
                for user in self.active.drain(concurrency..) {
                    user.retire.store(true, Ordering::Release);
                    trace!("Retiring virtual user {}", user.id);
                    self.retiring.push(user.handle);
                }
                debug!("Retired {retired} virtual users, {concurrency} live");
            }
            CmpOrdering::Less => {
                let spawned = concurrency - self.active.len();
                while self.active.len() < concurrency {
                    let id = self.next_id;
                    self.next_id += 1;

                    let retire = Arc::new(AtomicBool::new(false));
                    let user = VirtualUser::new(id, retire.clone(), self.ctx.clone());
                    self.active.push(UserHandle {
                        id,
                        retire,
                        handle: tokio::spawn(user.run()),
                    });
                }
                debug!("Spawned {spawned} virtual users, {concurrency} live");
            }
        }

        self.peak = self.peak.max(self.active.len());

        #[cfg(feature = "metrics")]
        self.gauge.set(self.active.len() as f64);
    }

    /// Live (non-retiring) users.
    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn peak(&self) -> usize {
        self.peak
    }

    pub fn draining(&self) -> usize {
        self.retiring.len()
    }

    /// Drop handles of users that have exited. Live users that exited on
    /// their own (a panic) are removed so the next reconciliation replaces them.
    fn reap(&mut self) {
        self.retiring.retain(|handle| !handle.is_finished());
        self.active.retain(|user| {
            if user.handle.is_finished() {
                error!("Virtual user {} exited unexpectedly", user.id);
                false
            } else {
                true
            }
        });
    }

    /// Wait up to `grace` for every user to exit, then abort the stragglers.
    ///
    /// The caller must already have moved the run out of `Running`. Returns the
    /// number of aborted users.
    pub async fn shutdown(mut self, grace: Duration) -> usize {
        let deadline = Instant::now() + grace.min(MAX_DURATION);
        let handles = self
            .active
            .drain(..)
            .map(|user| user.handle)
            .chain(self.retiring.drain(..));

        let mut aborted = 0;
        for mut handle in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!("Virtual user failed: {err}"),
                Err(_) => {
                    handle.abort();
                    aborted += 1;
                }
            }
        }

        if aborted > 0 {
            warn!(
                "Aborted {aborted} virtual users still running after the {} grace period",
                humantime::format_duration(grace)
            );
        }

        #[cfg(feature = "metrics")]
        self.gauge.set(0.);

        aborted
    }
}
