//! The `RateExecutor`: stage-based, rate-controlled execution.
//!
//! A token-bucket governor is driven by a list of [`Stage`]s. Each `Stage` defines a
//! target rate of iterations per second and a duration over which the governor
//! interpolates from the previous rate to that target. Workers take one token per
//! iteration.
//!
//! # High-level flow
//! 1. A shared execution context holds the shutdown signal and the token pool
//!    (a `tokio::sync::Semaphore` with no initial permits).
//! 2. N worker tasks are spawned. Each repeatedly acquires a token and, once it
//!    has one, runs the action to completion and consumes its metric into a
//!    worker-local aggregate.
//! 3. The governor task is spawned last and adds tokens every `tick`.
//! 4. When the governor finishes all stages, or the executor's [`StopSignal`] is
//!    triggered, shutdown is signalled. Workers finish their in-flight iteration
//!    and hand back their aggregates, which are merged.
//!
//! # Governor math
//! For a stage with `start_rate` (previous rate) and `end_rate` (stage target) over
//! `duration`, at time `elapsed`:
//!
//! ```text
//! t = elapsed / duration
//! r(t) = start_rate + (end_rate - start_rate) * t
//! add_f = r(t) * tick_seconds
//! add_total = floor(add_f + fractional)
//! fractional = (add_f + fractional) - add_total
//! ```
//!
//! `add_total` tokens are added to the pool, saturating at `bucket_capacity`.
use std::{str::FromStr, sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tokio::time::Instant;
use typed_builder::TypedBuilder;

use super::{Executor, StopSignal, merge_handles};
use crate::config::parse_duration;
use crate::error::{Error, Result};
use crate::{aggregate::Aggregate, scenario::Scenario};
use internals::*;

/// A stage defines a target rate and how long to ramp to it.
///
/// `Stage::new(Duration::from_secs(10), 100.0)` ramps to 100 iterations/s over 10s.
/// A stage with `Duration::ZERO` jumps to its target instantly without adding
/// tokens itself; follow it with a timed stage to sustain that rate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stage {
    pub duration: Duration,
    /// Iterations per second
    pub target: f64,
}

impl Stage {
    pub fn new(duration: Duration, target: f64) -> Self {
        Self { duration, target }
    }
}

impl FromStr for Stage {
    type Err = Error;

    /// Parses `DURATION:RATE`, e.g. `30s:10` or `2m:0.5`.
    fn from_str(s: &str) -> Result<Self> {
        let (duration, target) = s
            .split_once(':')
            .ok_or_else(|| Error::Config(format!("stage '{s}' is not DURATION:RATE")))?;
        let target: f64 = target
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("invalid stage rate '{target}'")))?;
        if !target.is_finite() || target < 0.0 {
            return Err(Error::Config(format!("stage rate must be >= 0, got {target}")));
        }
        Ok(Self::new(parse_duration(duration)?, target))
    }
}

/// The semaphore implementation uses 3 bits of usize for flags.
/// Any value greater than this is capped.
const MAX_TOKENS: usize = usize::MAX >> 3;

/// Executor that drives a token bucket governed by ramp stages and spawns worker tasks.
///
/// - `tick`: granularity of governor updates. Smaller ticks give smoother rate
///   control at the cost of more wakeups.
/// - `bucket_capacity`: maximum stored tokens, i.e. how large a burst can get when
///   workers fall behind.
/// - `workers`: number of worker tasks, which caps how many iterations can be in
///   flight at once.
#[derive(Debug, Clone, TypedBuilder)]
pub struct RateExecutor {
    pub stages: Vec<Stage>,
    #[builder(default = Duration::from_millis(100))]
    pub tick: Duration,
    #[builder(default = MAX_TOKENS)]
    pub bucket_capacity: usize,
    // An iteration is four sequential requests, mostly waiting on the network
    #[builder(default = num_cpus::get() * 32)]
    pub workers: usize,
    /// Ends the run before the last stage when triggered.
    #[builder(default)]
    pub stop: StopSignal,
}

impl RateExecutor {
    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(Error::Config("at least one stage is required".into()));
        }
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".into()));
        }
        if self.tick.is_zero() {
            return Err(Error::Config("tick must be positive".into()));
        }
        Ok(())
    }

    /// Sum of all stage durations.
    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }
}

impl<A, F, Fut> Executor<A, F, Fut> for RateExecutor
where
    Self: Send + Sync + Sized,
    A: Aggregate + 'static,
    F: Fn() -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = A::Metric> + Send + 'static,
{
    type Error = Error;

    async fn exec(&self, scenario: &Scenario<A, Self, F, Fut>) -> Result<A> {
        self.validate()?;
        let (ctx, shutdown_tx) = ExecutionContext::new();

        tracing::info!("Spawning {} workers...", self.workers);
        let handles = spawn_workers(ctx.clone(), self.workers, scenario.action.clone());

        tracing::info!(
            "Running scenario '{}' over {} stages ({:?})",
            scenario.name,
            self.stages.len(),
            self.total_duration()
        );
        let mut governor = tokio::spawn(token_governor_task(
            ctx,
            self.stages.clone(),
            self.tick,
            self.bucket_capacity,
        ));

        // The governor ending means the run is over
        let finished = tokio::select! {
            biased;
            _ = self.stop.triggered() => None,
            res = &mut governor => Some(res),
        };
        // Fails only when every worker is already gone
        let _ = shutdown_tx.send(true);
        let governed = match finished {
            Some(res) => {
                tracing::info!("Governor finished, signaling shutdown...");
                res
            }
            None => {
                tracing::info!("Stop requested, letting workers finish their iteration...");
                // The governor also listens to the shutdown signal
                governor.await
            }
        };
        governed.map_err(|e| Error::Executor(format!("token governor failed: {e}")))?;

        tracing::info!("Retrieving data from workers...");
        let final_agg = merge_handles(handles).await;

        tracing::info!("Done running scenario: {}!", scenario.name);
        Ok(final_agg)
    }
}

#[cfg(feature = "internals")]
pub use internals::*;

/// Governor and worker plumbing of the `RateExecutor`.
mod internals {
    use super::*;
    use tokio::sync::{
        Semaphore,
        watch::{Receiver, Sender, channel},
    };

    /// Shared state of the governor and all workers.
    #[derive(Clone)]
    pub struct ExecutionContext {
        /// Flips to `true` once to stop all tasks.
        pub shutdown: Receiver<bool>,
        /// The token bucket. Workers acquire permits, the governor adds them.
        pub tokens: Arc<Semaphore>,
    }

    impl ExecutionContext {
        pub fn new() -> (Self, Sender<bool>) {
            let (tx, rx) = channel(false);
            (
                Self {
                    shutdown: rx,
                    tokens: Arc::new(Semaphore::new(0)),
                },
                tx,
            )
        }
    }

    /// Adds tokens to the shared semaphore according to `stages`, returning
    /// once the last stage is over or shutdown was signalled.
    pub async fn token_governor_task(
        mut ctx: ExecutionContext,
        stages: Vec<Stage>,
        tick: Duration,
        bucket_capacity: usize,
    ) {
        let tokens = ctx.tokens.clone();
        let main_task = async move {
            let mut rate = 0.0;
            let mut fractional = 0.0;
            let j = stages.len();
            for (i, stage) in stages.into_iter().enumerate() {
                tracing::info!(
                    "Starting stage {}/{j}: {:?} to {}/s",
                    i + 1,
                    stage.duration,
                    stage.target
                );
                if stage.duration.is_zero() {
                    rate = stage.target;
                    continue;
                }

                let stage_start = Instant::now();
                let mut next_tick = stage_start;
                let start_rate = rate;
                let end_rate = stage.target;

                loop {
                    let elapsed = Instant::now().duration_since(stage_start);
                    if elapsed >= stage.duration {
                        break;
                    }
                    next_tick += tick;

                    let (add_total, f) = calc_token_limit(
                        elapsed,
                        stage.duration,
                        start_rate,
                        end_rate,
                        fractional,
                        tick,
                    );
                    fractional = f;

                    let avail = tokens.available_permits();
                    if add_total > 0 && avail < bucket_capacity {
                        let add = add_total.min(bucket_capacity - avail);
                        tokens.add_permits(add);
                    }
                    tokio::time::sleep_until(next_tick).await;
                }
                // Next stage starts from this stage's exact target
                rate = end_rate;
            }
        };

        tokio::select! {
            _ = main_task => {
                tracing::debug!("Governor task finished all stages.");
            }
            _ = ctx.shutdown.wait_for(|b| *b) => {
                tracing::debug!("Governor received shutdown signal.");
            }
        };
    }

    /// Number of tokens to add this tick and the fractional part to carry.
    ///
    /// Negative rates yield no tokens; huge rates saturate at the semaphore limit.
    pub fn calc_token_limit(
        elapsed: Duration,
        stage_duration: Duration,
        start_rate: f64,
        end_rate: f64,
        fractional: f64,
        tick: Duration,
    ) -> (usize, f64) {
        let t = (elapsed.as_secs_f64() / stage_duration.as_secs_f64()).min(1.0);
        let tick_rate = start_rate + (end_rate - start_rate) * t;
        let add_f = tick_rate * tick.as_secs_f64();

        let add_total_f = (add_f + fractional).floor();
        let fractional = (add_f + fractional) - add_total_f;

        let add_total = if add_total_f >= MAX_TOKENS as f64 {
            MAX_TOKENS
        } else if add_total_f < 0.0 {
            0
        } else {
            add_total_f as usize
        };

        (add_total, fractional)
    }

    /// Spawns `workers` tasks that each take a token, run `action` to
    /// completion, and repeat until shutdown.
    pub fn spawn_workers<A, F, Fut>(
        ctx: ExecutionContext,
        workers: usize,
        action: F,
    ) -> Vec<JoinHandle<A>>
    where
        A: Aggregate + 'static,
        F: Fn() -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = A::Metric> + Send + 'static,
    {
        (0..workers)
            .map(|i| {
                let mut ctx = ctx.clone();
                let action = action.clone();
                tokio::spawn(async move {
                    let mut agg = A::new();
                    tracing::debug!("Worker {i} started.");

                    loop {
                        let permit = tokio::select! {
                            permit = ctx.tokens.acquire() => permit,
                            _ = ctx.shutdown.wait_for(|b| *b) => break,
                        };
                        match permit {
                            // The governor alone refills the bucket
                            Ok(p) => p.forget(),
                            Err(_) => break,
                        }
                        let metric = action().await;
                        agg.consume(&metric);
                    }

                    tracing::debug!("Worker {i} shutting down.");
                    agg
                })
            })
            .collect()
    }
}
