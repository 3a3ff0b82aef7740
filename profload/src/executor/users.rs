//! The `UserExecutor`: a population of simulated users.
//!
//! `users` tasks are spawned `1 / spawn_rate` seconds apart. Each one runs the
//! action back to back, sleeping `wait_time` between iterations, until
//! `run_time` (counted from the first spawn) is over or `stop` is triggered.
//! Every user keeps a local aggregate that is merged once all users have
//! stopped.
use std::time::Duration;

use tokio::sync::watch::{self, Receiver};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use typed_builder::TypedBuilder;

use super::{Executor, StopSignal, merge_handles};
use crate::error::{Error, Result};
use crate::{aggregate::Aggregate, scenario::Scenario};

#[derive(Debug, Clone, TypedBuilder)]
pub struct UserExecutor {
    /// Number of concurrent simulated users.
    pub users: usize,
    /// Users started per second.
    #[builder(default = 1.0)]
    pub spawn_rate: f64,
    /// How long the whole run lasts, ramp-up included.
    pub run_time: Duration,
    /// Pause of a user between two iterations.
    #[builder(default = Duration::ZERO)]
    pub wait_time: Duration,
    /// Ends the run before `run_time` when triggered.
    #[builder(default)]
    pub stop: StopSignal,
}

impl UserExecutor {
    pub fn validate(&self) -> Result<()> {
        if self.users == 0 {
            return Err(Error::Config("users must be at least 1".into()));
        }
        if !self.spawn_rate.is_finite() || self.spawn_rate <= 0.0 {
            return Err(Error::Config(format!(
                "spawn rate must be positive, got {}",
                self.spawn_rate
            )));
        }
        if self.run_time.is_zero() {
            return Err(Error::Config("run time must be positive".into()));
        }
        Ok(())
    }

    /// Delay between two consecutive user spawns.
    pub fn spawn_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.spawn_rate)
    }
}

impl<A, F, Fut> Executor<A, F, Fut> for UserExecutor
where
    Self: Send + Sync + Sized,
    A: Aggregate + 'static,
    F: Fn() -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = A::Metric> + Send + 'static,
{
    type Error = Error;

    async fn exec(&self, scenario: &Scenario<A, Self, F, Fut>) -> Result<A> {
        self.validate()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let start = Instant::now();
        let deadline = start + self.run_time;
        let interval = self.spawn_interval();

        tracing::info!(
            "Running scenario '{}': {} users at {}/s for {:?}",
            scenario.name,
            self.users,
            self.spawn_rate,
            self.run_time
        );
        let mut handles = Vec::with_capacity(self.users);
        for i in 0..self.users {
            let spawn_at = start + interval.mul_f64(i as f64);
            if spawn_at >= deadline {
                tracing::warn!(
                    "Run time over after spawning {i} of {} users",
                    self.users
                );
                break;
            }
            tokio::select! {
                biased;
                _ = self.stop.triggered() => {
                    tracing::warn!("Stopped after spawning {i} of {} users", self.users);
                    break;
                }
                _ = tokio::time::sleep_until(spawn_at) => {}
            }
            handles.push(spawn_user(
                i,
                shutdown_rx.clone(),
                scenario.action.clone(),
                self.wait_time,
            ));
        }
        tracing::info!("{} users spawned", handles.len());

        tokio::select! {
            biased;
            _ = self.stop.triggered() => {
                tracing::info!("Stop requested, letting users finish their iteration...");
            }
            _ = tokio::time::sleep_until(deadline) => {
                tracing::info!("Run time over, stopping users...");
            }
        }
        // Fails only when every user is already gone
        let _ = shutdown_tx.send(true);

        let final_agg = merge_handles(handles).await;
        tracing::info!("Done running scenario: {}!", scenario.name);
        Ok(final_agg)
    }
}

/// One simulated user. The shutdown flag is checked between iterations, so
/// an iteration that has started always completes.
fn spawn_user<A, F, Fut>(
    id: usize,
    mut shutdown: Receiver<bool>,
    action: F,
    wait_time: Duration,
) -> JoinHandle<A>
where
    A: Aggregate + 'static,
    F: Fn() -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = A::Metric> + Send + 'static,
{
    tokio::spawn(async move {
        let mut agg = A::new();
        tracing::debug!("User {id} started.");
        while !*shutdown.borrow() {
            let metric = action().await;
            agg.consume(&metric);
            if !wait_time.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(wait_time) => {}
                    _ = shutdown.wait_for(|b| *b) => {}
                }
            }
        }
        tracing::debug!("User {id} stopped.");
        agg
    })
}
