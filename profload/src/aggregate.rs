use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};

use crate::Metric;
use crate::client::Method;
use crate::macros::aggregate;
use crate::metric::{CycleMetric, RequestMetric};

/// The `Aggregate` trait defines how raw [`Metric`] values are collected and combined
/// into an intermediate, mergeable representation.
///
/// **Important:** `Aggregate` implementations should **not** compute final statistics
/// such as averages or percentiles. Those belong in a [`crate::Report`], which is
/// converted from an `Aggregate`. Aggregates store compact, mergeable raw data (counts,
/// sums, histograms, error counters) so the report can derive accurate summaries.
///
/// Every simulated user owns a local aggregate; the executor merges them when the run
/// ends. `merge` must therefore be **associative** and **commutative**.
///
/// # Example
/// ```rust
/// use profload::{Aggregate, macros::*};
///
/// #[metric]
/// struct MyMetric(u64);
///
/// #[aggregate]
/// struct MyAggregate {
///     count: u64,
///     sum: u128,
/// }
///
/// impl Aggregate for MyAggregate {
///     type Metric = MyMetric;
///
///     fn new() -> Self {
///         Self::default()
///     }
///
///     fn consume(&mut self, metric: &Self::Metric) {
///         self.count += 1;
///         self.sum += metric.0 as u128;
///     }
///
///     fn merge(&mut self, other: Self) {
///         self.count += other.count;
///         self.sum += other.sum;
///     }
/// }
/// ```
pub trait Aggregate
where
    Self: Serialize + DeserializeOwned + PartialEq + Send + Sync + Debug + Clone,
{
    /// The metric type this aggregate summarizes.
    type Metric: Metric;

    /// Create a new, empty instance of the aggregate.
    fn new() -> Self;

    /// Aggregate multiple metrics into the current instance.
    fn aggregate(&mut self, metrics: &[Self::Metric]) {
        metrics.iter().for_each(|m| self.consume(m));
    }

    /// Incorporate a single metric into the aggregate.
    fn consume(&mut self, metric: &Self::Metric);

    /// Combine two different aggregates into one.
    fn merge(&mut self, other: Self);
}

/// Round a latency the way the histogram buckets it: exact below 100ms, then
/// to 10ms below 1s, 100ms below 10s and whole seconds above.
pub fn round_latency(latency: Duration) -> u64 {
    let ms = (latency.as_secs_f64() * 1000.0).round() as u64;
    let step = match ms {
        0..100 => return ms,
        100..1_000 => 10,
        1_000..10_000 => 100,
        _ => 1_000,
    };
    (ms + step / 2) / step * step
}

/// Raw statistics of one `(method, name)` endpoint.
#[aggregate]
pub struct EndpointStats {
    pub method: Option<Method>,
    pub name: String,
    pub requests: usize,
    pub failures: usize,
    pub total_latency: Duration,
    pub min_latency: Option<Duration>,
    pub max_latency: Duration,
    pub total_bytes: usize,
    /// Rounded latency in milliseconds -> number of requests
    pub latencies: BTreeMap<u64, usize>,
    /// Failure message -> occurrences
    pub failure_messages: BTreeMap<String, usize>,
}

impl EndpointStats {
    pub fn record(&mut self, metric: &RequestMetric) {
        if self.method.is_none() {
            self.method = Some(metric.method);
            self.name = metric.name.clone();
        }
        self.requests += 1;
        self.total_latency += metric.latency;
        self.min_latency = Some(match self.min_latency {
            Some(min) => min.min(metric.latency),
            None => metric.latency,
        });
        self.max_latency = self.max_latency.max(metric.latency);
        self.total_bytes += metric.bytes;
        *self.latencies.entry(round_latency(metric.latency)).or_default() += 1;
        if let Some(message) = &metric.failure {
            self.failures += 1;
            *self.failure_messages.entry(message.clone()).or_default() += 1;
        }
    }

    pub fn merge(&mut self, other: Self) {
        if self.method.is_none() {
            self.method = other.method;
            self.name = other.name;
        }
        self.requests += other.requests;
        self.failures += other.failures;
        self.total_latency += other.total_latency;
        self.min_latency = match (self.min_latency, other.min_latency) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.max_latency = self.max_latency.max(other.max_latency);
        self.total_bytes += other.total_bytes;
        for (bucket, count) in other.latencies {
            *self.latencies.entry(bucket).or_default() += count;
        }
        for (message, count) in other.failure_messages {
            *self.failure_messages.entry(message).or_default() += count;
        }
    }
}

/// Per-endpoint statistics of profile workflow cycles.
#[aggregate]
pub struct WorkflowAggregate {
    /// Cycles consumed, aborted ones included
    pub iterations: usize,
    /// Cycles that ended with a fault
    pub aborted: usize,
    /// Keyed by `"METHOD name"`
    pub endpoints: BTreeMap<String, EndpointStats>,
    /// Fault message -> occurrences
    pub errors: BTreeMap<String, usize>,
}

impl WorkflowAggregate {
    pub fn record_request(&mut self, metric: &RequestMetric) {
        self.endpoints
            .entry(format!("{} {}", metric.method, metric.name))
            .or_default()
            .record(metric);
    }

    pub fn total_requests(&self) -> usize {
        self.endpoints.values().map(|e| e.requests).sum()
    }

    pub fn total_failures(&self) -> usize {
        self.endpoints.values().map(|e| e.failures).sum()
    }
}

impl Aggregate for WorkflowAggregate {
    type Metric = CycleMetric;

    fn new() -> Self {
        Self::default()
    }

    fn consume(&mut self, metric: &Self::Metric) {
        self.iterations += 1;
        metric.requests.iter().for_each(|r| self.record_request(r));
        if let Some(error) = &metric.error {
            self.aborted += 1;
            *self.errors.entry(error.clone()).or_default() += 1;
        }
    }

    fn merge(&mut self, other: Self) {
        self.iterations += other.iterations;
        self.aborted += other.aborted;
        for (key, stats) in other.endpoints {
            self.endpoints.entry(key).or_default().merge(stats);
        }
        for (error, count) in other.errors {
            *self.errors.entry(error).or_default() += count;
        }
    }
}
