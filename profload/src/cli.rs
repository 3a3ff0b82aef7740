//! Command line arguments

use std::{path::PathBuf, time::Duration};

use clap::Parser;

use crate::config::{Settings, parse_duration};

#[derive(Parser, Debug)]
#[command(name = "profload")]
#[command(author, version, about = "Load test for the profile manager API", long_about = None)]
pub struct Cli {
    /// Base URL of the profile manager API
    #[arg(long, env = "PROFILE_MANAGER_API")]
    pub host: Option<String>,

    /// Number of concurrent simulated users
    #[arg(short, long)]
    pub users: Option<usize>,

    /// Users started per second
    #[arg(short = 'r', long)]
    pub spawn_rate: Option<f64>,

    /// Run time, e.g. 30s, 5m, 1h30m
    #[arg(short = 't', long, value_parser = parse_duration)]
    pub run_time: Option<Duration>,

    /// Pause of each user between two iterations
    #[arg(long, value_parser = parse_duration)]
    pub wait_time: Option<Duration>,

    /// Request timeout
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Rate stage as DURATION:RATE (iterations/s); repeat for several stages.
    /// Switches from simulated users to rate-driven execution.
    #[arg(long = "stage")]
    pub stages: Vec<String>,

    /// Worker tasks for rate-driven execution
    #[arg(long)]
    pub workers: Option<usize>,

    /// Also fetch the profiles page on every iteration
    #[arg(long)]
    pub page_check: bool,

    /// Write the JSON report to this path, `-` for stdout
    #[arg(long = "json")]
    pub json_report: Option<String>,

    /// TOML config file; command line values override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// The settings given on the command line.
    pub fn settings(&self) -> Settings {
        Settings {
            host: self.host.clone(),
            users: self.users,
            spawn_rate: self.spawn_rate,
            run_time: self.run_time,
            wait_time: self.wait_time,
            timeout: self.timeout,
            stages: self.stages.clone(),
            workers: self.workers,
            // A flag can only turn the check on
            page_check: self.page_check.then_some(true),
            payload: None,
            json_report: self.json_report.clone(),
        }
    }

    /// Config file settings overridden by the command line.
    pub fn resolve(&self) -> crate::Result<Settings> {
        let file = match &self.config {
            Some(path) => Settings::from_file(path)?,
            None => Settings::default(),
        };
        Ok(file.merge(self.settings()))
    }
}
