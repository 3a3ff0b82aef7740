//! Launch configuration.
//!
//! Settings come from an optional TOML file and from the command line; command
//! line values win. [`Settings`] is the raw, all-optional layer both sources
//! produce, [`LoadConfig`] the validated result the binary runs with.
use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::executor::Stage;
use crate::profile::ProfileRequest;

pub const DEFAULT_RUN_TIME: Duration = Duration::from_secs(60);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Parse a duration such as `250ms`, `30s`, `5m`, `1h30m` or a bare number of
/// seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s)
        .map_err(|e| Error::Config(format!("invalid duration '{s}': {e}")))
}

/// Raw settings, as found in the config file or on the command line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Base URL of the profile manager API
    pub host: Option<String>,
    pub users: Option<usize>,
    pub spawn_rate: Option<f64>,
    #[serde(with = "humantime_serde")]
    pub run_time: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub wait_time: Option<Duration>,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
    /// `DURATION:RATE` entries; any stage switches to the rate executor
    pub stages: Vec<String>,
    pub workers: Option<usize>,
    pub page_check: Option<bool>,
    /// Create request body, `{"name":{"first":"Test"}}` when unset
    pub payload: Option<Value>,
    /// Where to write the JSON report, `-` for stdout
    pub json_report: Option<String>,
}

impl Settings {
    pub fn from_toml(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        tracing::debug!("Loaded config file {}", path.display());
        Self::from_toml(&content)
    }

    /// Layer `other` on top of `self`: every value `other` sets wins.
    pub fn merge(self, other: Settings) -> Settings {
        Settings {
            host: other.host.or(self.host),
            users: other.users.or(self.users),
            spawn_rate: other.spawn_rate.or(self.spawn_rate),
            run_time: other.run_time.or(self.run_time),
            wait_time: other.wait_time.or(self.wait_time),
            timeout: other.timeout.or(self.timeout),
            stages: if other.stages.is_empty() {
                self.stages
            } else {
                other.stages
            },
            workers: other.workers.or(self.workers),
            page_check: other.page_check.or(self.page_check),
            payload: other.payload.or(self.payload),
            json_report: other.json_report.or(self.json_report),
        }
    }
}

/// How load is generated.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadModel {
    /// A fixed population of simulated users
    Users {
        users: usize,
        spawn_rate: f64,
        run_time: Duration,
        wait_time: Duration,
    },
    /// Iterations started at a staged target rate
    Rate {
        stages: Vec<Stage>,
        workers: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum JsonTarget {
    Stdout,
    File(PathBuf),
}

/// Validated configuration of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadConfig {
    pub host: String,
    pub timeout: Duration,
    pub model: LoadModel,
    pub page_check: bool,
    pub payload: Value,
    pub json_report: Option<JsonTarget>,
}

impl TryFrom<Settings> for LoadConfig {
    type Error = Error;

    fn try_from(settings: Settings) -> Result<Self> {
        let host = settings
            .host
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| {
                Error::Config("no host given (--host or PROFILE_MANAGER_API)".into())
            })?;

        let timeout = settings.timeout.unwrap_or(DEFAULT_TIMEOUT);
        if timeout.is_zero() {
            return Err(Error::Config("timeout must be positive".into()));
        }

        let model = if settings.stages.is_empty() {
            let users = settings.users.unwrap_or(1);
            let spawn_rate = settings.spawn_rate.unwrap_or(1.0);
            if users == 0 {
                return Err(Error::Config("users must be at least 1".into()));
            }
            if !spawn_rate.is_finite() || spawn_rate <= 0.0 {
                return Err(Error::Config(format!(
                    "spawn rate must be positive, got {spawn_rate}"
                )));
            }
            let run_time = settings.run_time.unwrap_or(DEFAULT_RUN_TIME);
            if run_time.is_zero() {
                return Err(Error::Config("run time must be positive".into()));
            }
            let wait_time = settings.wait_time.unwrap_or_default();
            LoadModel::Users {
                users,
                spawn_rate,
                run_time,
                wait_time,
            }
        } else {
            let stages = settings
                .stages
                .iter()
                .map(|s| s.parse())
                .collect::<Result<Vec<Stage>>>()?;
            if settings.workers == Some(0) {
                return Err(Error::Config("workers must be at least 1".into()));
            }
            LoadModel::Rate {
                stages,
                workers: settings.workers,
            }
        };

        let payload = settings
            .payload
            .unwrap_or_else(|| ProfileRequest::default().to_value());
        if !payload.is_object() {
            return Err(Error::Config("payload must be a JSON object".into()));
        }

        let json_report = settings.json_report.map(|target| match target.as_str() {
            "-" => JsonTarget::Stdout,
            path => JsonTarget::File(PathBuf::from(path)),
        });

        Ok(Self {
            host,
            timeout,
            model,
            page_check: settings.page_check.unwrap_or(false),
            payload,
            json_report,
        })
    }
}
