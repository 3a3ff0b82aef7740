use std::fmt::Debug;
use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};

use crate::client::Method;
use crate::macros::metric;

/// A `Metric` represents a single observed measurement produced by the system under test.
///
/// Metrics are the most granular level of data. They are later collected and summarized by an
/// [`crate::Aggregate`], then analyzed and reported by a [`crate::Report`] and
/// [`crate::Reporter`].
///
/// Metrics can be composed of other metrics: a [`CycleMetric`] is the ordered list of
/// [`RequestMetric`]s one workflow repetition produced.
///
/// ## Example
/// ```rust
/// use profload::macros::metric;
/// use std::time::Duration;
///
/// #[metric]
/// struct MyMetric {
///     latency: Duration,
///     success: bool,
/// }
/// ```
pub trait Metric
where
    Self: Serialize + DeserializeOwned + PartialEq + Send + Sync + Debug + Clone,
{
}

/// One HTTP call made by the workflow.
#[metric]
pub struct RequestMetric {
    pub method: Method,
    /// Logical endpoint name statistics are grouped under
    pub name: String,
    /// `0` when the transport failed before a status line was received
    pub status: u16,
    pub latency: Duration,
    /// Response body length
    pub bytes: usize,
    /// Set when the step's success condition did not hold
    pub failure: Option<String>,
}

impl RequestMetric {
    pub fn success(&self) -> bool {
        self.failure.is_none()
    }
}

/// One repetition of the workflow.
#[metric]
#[derive(Default)]
pub struct CycleMetric {
    /// Requests in the order they were issued
    pub requests: Vec<RequestMetric>,
    /// Fault that aborted the iteration, if any
    pub error: Option<String>,
}

impl CycleMetric {
    pub fn push(&mut self, request: RequestMetric) {
        self.requests.push(request);
    }

    /// Messages of every failed step, in request order.
    pub fn failures(&self) -> Vec<&str> {
        self.requests
            .iter()
            .filter_map(|r| r.failure.as_deref())
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.error.is_none() && self.requests.iter().all(RequestMetric::success)
    }
}
