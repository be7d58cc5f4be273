//! Run-level cancellation and the run state broadcast to virtual users.
use std::sync::Arc;
use tokio::sync::watch;

/// Create a linked cancellation pair.
///
/// Dropping the [`Canceller`] without calling [`Canceller::cancel`] never
/// cancels the run.
pub fn cancellation() -> (Canceller, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (Canceller(Arc::new(tx)), CancelToken(rx))
}

#[derive(Clone, Debug)]
pub struct Canceller(Arc<watch::Sender<bool>>);

impl Canceller {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

#[derive(Clone, Debug)]
pub struct CancelToken(watch::Receiver<bool>);

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&mut self) {
        let closed = self.0.wait_for(|cancelled| *cancelled).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}

pub(crate) async fn wait_cancelled(token: &mut Option<CancelToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Lifecycle of a run as seen by every virtual user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunState {
    Running,
    /// The profile is over: finish the in-flight call, skip think-time, exit.
    Stopping,
    /// Cancelled: abandon the in-flight call without recording it.
    Cancelled,
}

pub(crate) async fn left_running(state: &mut watch::Receiver<RunState>) {
    let closed = state.wait_for(|s| *s != RunState::Running).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

pub(crate) async fn run_cancelled(state: &mut watch::Receiver<RunState>) {
    let closed = state.wait_for(|s| *s == RunState::Cancelled).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}
