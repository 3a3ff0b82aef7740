//! profload: load test for the profile manager API.
//!
//! Every iteration of the load test walks one profile through its whole life:
//! create it, read it back and compare, delete it, and check that it is gone.
//! Each step passes or fails on its own and is reported under the `/profiles`
//! endpoint name; a failing step never stops the steps after it.
//!
//! # Architecture
//!
//! - [`ProfileWorkflow`]: the create → read → delete → verify-gone cycle. It only
//!   needs an [`HttpClient`]; [`client::ReqwestClient`] is the real one.
//! - [`Scenario`]: ties the workflow (as an action producing one [`CycleMetric`]
//!   per call) to an [`Executor`].
//! - [`Executor`]: decides how many simulated users run the action and for how
//!   long. [`executor::UserExecutor`] keeps a fixed population of users looping,
//!   [`executor::RateExecutor`] starts iterations at a staged target rate.
//! - [`Metric`] → [`Aggregate`] → [`Report`] → [`Reporter`]: per-request samples
//!   are folded into mergeable per-endpoint statistics, turned into averages and
//!   percentiles, and printed or written as JSON.
//!
//! # Example
//!
//! ```rust, no_run
//! use std::time::Duration;
//!
//! use profload::{
//!     ProfileWorkflow, Reporter, Scenario,
//!     aggregate::WorkflowAggregate,
//!     client::ReqwestClient,
//!     executor::UserExecutor,
//!     report::{StdoutReporter, WorkflowReport},
//! };
//!
//! #[tokio::main]
//! async fn main() -> profload::Result<()> {
//!     // Build the client once; every iteration gets a cheap clone
//!     let client = ReqwestClient::new("http://localhost:8080", Duration::from_secs(30))?;
//!     let workflow = std::sync::Arc::new(ProfileWorkflow::default());
//!
//!     let results = Scenario::<WorkflowAggregate, _, _, _>::builder()
//!         .name("profile CRUD")
//!         .action(move || {
//!             let client = client.clone();
//!             let workflow = workflow.clone();
//!             async move { workflow.run_cycle(&client).await }
//!         })
//!         .executor(
//!             UserExecutor::builder()
//!                 .users(10)
//!                 .spawn_rate(2.0)
//!                 .run_time(Duration::from_secs(60))
//!                 .build(),
//!         )
//!         .build()
//!         .run()
//!         .await?;
//!
//!     StdoutReporter.report(&WorkflowReport::from(results)).await
//! }
//! ```
extern crate self as profload;

/// Metric aggregators
pub mod aggregate;
/// Command line arguments
pub mod cli;
/// HTTP client primitive
pub mod client;
/// Launch configuration
pub mod config;
pub mod error;
/// Orchestrators that define how things will actually run
pub mod executor;
/// Single metrics
pub mod metric;
pub mod profile;
/// Reports and Reporters
pub mod report;
pub mod runner;
/// Glue between an action and its executor
pub mod scenario;
/// The profile CRUD cycle
pub mod workflow;

pub use aggregate::Aggregate;
pub use client::HttpClient;
pub use error::{Error, Result};
pub use executor::{Executor, StopSignal};
pub use metric::{CycleMetric, Metric, RequestMetric};
pub use report::{Report, Reporter};
pub use scenario::Scenario;
pub use workflow::ProfileWorkflow;

/// Procedural macros to reduce boilerplate
pub mod macros {
    pub use profload_macros::*;
}
