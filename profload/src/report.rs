use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::Aggregate;
use crate::aggregate::{EndpointStats, WorkflowAggregate};
use crate::error::Result;

/// A [`Report`] represents the processed form of an [`Aggregate`].
///
/// Reports turn raw aggregated data into averages, percentiles and ratios. They are
/// pure data structures: no I/O, only the logic needed to derive the final results.
/// Once created, a report is handed to a [`Reporter`].
pub trait Report<A>
where
    Self: Send + Sync + Debug + From<A> + Serialize + DeserializeOwned,
    A: Aggregate,
{
}

/// A [`Reporter`] consumes a [`Report`] and performs side effects: printing it,
/// persisting it, or sending it somewhere.
#[async_trait]
pub trait Reporter<A: Aggregate, R: Report<A>> {
    async fn report(&self, report: &R) -> Result<()>;
}

/// Latency below which `percent` of the requests completed, read off a rounded
/// latency histogram. Returns `0` for an empty histogram.
pub fn percentile(latencies: &BTreeMap<u64, usize>, requests: usize, percent: f64) -> u64 {
    let within = (requests as f64 * percent) as usize;
    let mut processed = 0;
    for (latency, count) in latencies.iter().rev() {
        processed += count;
        if requests.saturating_sub(processed) <= within {
            return *latency;
        }
    }
    0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointReport {
    pub method: String,
    pub name: String,
    pub requests: usize,
    pub failures: usize,
    pub average_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub median_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub average_bytes: f64,
}

impl From<&EndpointStats> for EndpointReport {
    fn from(stats: &EndpointStats) -> Self {
        let n = stats.requests;
        let ratio = |total: f64| if n == 0 { 0.0 } else { total / n as f64 };
        Self {
            method: stats.method.map(|m| m.to_string()).unwrap_or_default(),
            name: stats.name.clone(),
            requests: n,
            failures: stats.failures,
            average_ms: ratio(stats.total_latency.as_secs_f64() * 1000.0),
            min_ms: stats.min_latency.map_or(0, |d| d.as_millis() as u64),
            max_ms: stats.max_latency.as_millis() as u64,
            median_ms: percentile(&stats.latencies, n, 0.5),
            p95_ms: percentile(&stats.latencies, n, 0.95),
            p99_ms: percentile(&stats.latencies, n, 0.99),
            average_bytes: ratio(stats.total_bytes as f64),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    pub method: String,
    pub name: String,
    pub message: String,
    pub occurrences: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub message: String,
    pub occurrences: usize,
}

/// Summary of a profile workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowReport {
    pub iterations: usize,
    pub aborted: usize,
    pub endpoints: Vec<EndpointReport>,
    /// All endpoints folded together
    pub total: EndpointReport,
    pub failures: Vec<FailureReport>,
    pub errors: Vec<ErrorReport>,
    /// Failed requests over all requests, in `[0, 1]`
    pub failure_ratio: f64,
}

impl From<WorkflowAggregate> for WorkflowReport {
    fn from(value: WorkflowAggregate) -> Self {
        let mut total = EndpointStats::default();
        let mut endpoints = Vec::with_capacity(value.endpoints.len());
        let mut failures = Vec::new();
        for stats in value.endpoints.into_values() {
            let row = EndpointReport::from(&stats);
            for (message, occurrences) in &stats.failure_messages {
                failures.push(FailureReport {
                    method: row.method.clone(),
                    name: row.name.clone(),
                    message: message.clone(),
                    occurrences: *occurrences,
                });
            }
            endpoints.push(row);
            total.merge(stats);
        }
        failures.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));

        let mut total = EndpointReport::from(&total);
        total.method = String::new();
        total.name = "Aggregated".to_string();

        let failure_ratio = if total.requests == 0 {
            0.0
        } else {
            total.failures as f64 / total.requests as f64
        };

        Self {
            iterations: value.iterations,
            aborted: value.aborted,
            endpoints,
            total,
            failures,
            errors: value
                .errors
                .into_iter()
                .map(|(message, occurrences)| ErrorReport {
                    message,
                    occurrences,
                })
                .collect(),
            failure_ratio,
        }
    }
}

impl Report<WorkflowAggregate> for WorkflowReport {}

fn write_row(f: &mut fmt::Formatter<'_>, row: &EndpointReport) -> fmt::Result {
    writeln!(
        f,
        "{:<8} {:<24} {:>8} {:>8} {:>8.0} {:>8} {:>8} {:>8} {:>8} {:>8} {:>10.0}",
        row.method,
        row.name,
        row.requests,
        row.failures,
        row.average_ms,
        row.min_ms,
        row.max_ms,
        row.median_ms,
        row.p95_ms,
        row.p99_ms,
        row.average_bytes,
    )
}

impl fmt::Display for WorkflowReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<8} {:<24} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>10}",
            "Type",
            "Name",
            "# reqs",
            "# fails",
            "Avg",
            "Min",
            "Max",
            "Med",
            "95%",
            "99%",
            "Avg size"
        )?;
        for row in &self.endpoints {
            write_row(f, row)?;
        }
        write_row(f, &self.total)?;
        writeln!(
            f,
            "\n{} iterations, {} aborted, {:.2}% requests failed",
            self.iterations,
            self.aborted,
            self.failure_ratio * 100.0
        )?;

        if !self.failures.is_empty() {
            writeln!(f, "\n{:>8}  Failure", "# occ")?;
            for failure in &self.failures {
                writeln!(
                    f,
                    "{:>8}  {} {}: {}",
                    failure.occurrences, failure.method, failure.name, failure.message
                )?;
            }
        }
        if !self.errors.is_empty() {
            writeln!(f, "\n{:>8}  Error", "# occ")?;
            for error in &self.errors {
                writeln!(f, "{:>8}  {}", error.occurrences, error.message)?;
            }
        }
        Ok(())
    }
}

/// Prints the report as a table.
pub struct StdoutReporter;

#[async_trait]
impl Reporter<WorkflowAggregate, WorkflowReport> for StdoutReporter {
    async fn report(&self, report: &WorkflowReport) -> Result<()> {
        println!("{report}");
        Ok(())
    }
}

/// Writes the report as pretty JSON, to `path` or to stdout when `None`.
pub struct JsonReporter {
    pub path: Option<PathBuf>,
}

#[async_trait]
impl<A, R> Reporter<A, R> for JsonReporter
where
    A: Aggregate,
    R: Report<A>,
{
    async fn report(&self, report: &R) -> Result<()> {
        let value = serde_json::to_string_pretty(report)?;
        match &self.path {
            Some(path) => {
                tokio::fs::write(path, value).await?;
                tracing::info!("Report written to {}", path.display());
            }
            None => println!("{value}"),
        }
        Ok(())
    }
}
