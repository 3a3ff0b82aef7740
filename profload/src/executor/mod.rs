//! Executor: orchestration of simulated users
//!
//! The `Executor` trait is the runtime that executes a `Scenario`. Two strategies
//! are built in:
//!
//! - [`UserExecutor`]: a fixed population of simulated users, spawned at a given
//!   rate, each running the action back to back (optionally pausing between
//!   iterations) until the run time is over. Load follows from how fast the
//!   system under test answers.
//! - [`RateExecutor`]: a token-bucket governor driven by ramp [`Stage`]s that
//!   starts iterations at a target rate, regardless of how fast they complete,
//!   on a pool of worker tasks.
//!
//! Both give every user/worker its own [`Aggregate`] and merge them at the end, so
//! the hot path never contends on shared state. A user that panics contributes an
//! empty aggregate instead of taking the whole run down.
//!
//! # Shutdown
//! Shutdown is graceful: a user or worker that is in the middle of an iteration
//! finishes it before exiting, so a profile that was created also gets its delete
//! and verify steps. Request timeouts on the client bound how long that takes.
//!
//! A run ends when its time is over or, earlier, when its [`StopSignal`] is
//! triggered. Either way the aggregates collected so far are merged and
//! returned.
pub mod rate;
pub mod users;

pub use rate::{RateExecutor, Stage};
pub use users::UserExecutor;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{aggregate::Aggregate, scenario::Scenario};

/// The runtime hook that executes a `Scenario`.
pub trait Executor<A, F, Fut>
where
    Self: Send + Sync + Sized,
    A: Aggregate,
    F: Fn() -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = A::Metric> + Send + 'static,
{
    type Error;

    /// Execute the scenario and return the final aggregate.
    fn exec(
        &self,
        scenario: &Scenario<A, Self, F, Fut>,
    ) -> impl Future<Output = Result<A, Self::Error>> + Send;
}

/// Ends a run early. Clones share the same signal, so one can be handed to an
/// executor and another kept by whoever decides to stop (a Ctrl-C handler).
///
/// Once triggered a signal stays triggered.
#[derive(Clone, Debug)]
pub struct StopSignal(Arc<watch::Sender<bool>>);

impl Default for StopSignal {
    fn default() -> Self {
        Self(Arc::new(watch::channel(false).0))
    }
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once the signal is triggered.
    pub async fn triggered(&self) {
        let mut rx = self.0.subscribe();
        // The sender lives in `self`, so this only returns once triggered
        let _ = rx.wait_for(|stop| *stop).await;
    }
}

/// Join every task and merge their aggregates. A task that panicked or was
/// cancelled is logged and skipped.
pub(crate) async fn merge_handles<A: Aggregate + 'static>(handles: Vec<JoinHandle<A>>) -> A {
    let mut final_agg = A::new();
    for res in futures::future::join_all(handles).await {
        match res {
            Ok(agg) => final_agg.merge(agg),
            Err(e) => tracing::error!("Simulated user panicked: {e}"),
        }
    }
    final_agg
}
