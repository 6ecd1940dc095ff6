// MPBench: Benchmarking Multipath TCP Schedulers under Controlled Network Impairments
// Copyright (C) 2024-2025 Roland Schmid <roschmi@ethz.ch> and Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//! Configuration of a benchmark run.

use std::{
    net::Ipv4Addr,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    fabric::LinkRef,
    records::{Endpoint, LossRate},
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read the configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("No scheduler configured")]
    NoSchedulers,
    #[error("No loss rate configured")]
    NoLossRates,
    #[error("The phase duration must be positive")]
    ZeroPhaseDuration,
    #[error("The sample period must be positive")]
    ZeroSamplePeriod,
    #[error("The fabric timeout must be positive")]
    ZeroFabricTimeout,
    #[error("Invalid loss rate: {0}%")]
    InvalidLossRate(LossRate),
    #[error("Exactly two endpoints are required, got {0}")]
    EndpointCount(usize),
}

/// Configuration of the benchmark. Every field has a default, so a configuration file only needs
/// to contain the fields that differ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Schedulers to benchmark, in the order of the report.
    pub schedulers: Vec<String>,
    /// Loss rates in percent.
    pub loss_rates: Vec<LossRate>,
    /// Duration of each of the three phases.
    pub phase_duration_secs: u64,
    /// Directory of all artifacts.
    pub result_dir: PathBuf,
    /// Local addresses of the two paths of the client.
    pub endpoints: Vec<Endpoint>,
    /// Interface on which the loss is injected.
    pub impaired_link: LinkRef,
    pub client_host: String,
    pub server_host: String,
    pub server_addr: Ipv4Addr,
    /// Prefix that makes the bandwidth test use multipath sockets.
    pub command_prefix: String,
    /// Time given to the server to start up.
    pub server_grace_ms: u64,
    /// Period of the statistics sampler.
    pub sample_period_ms: u64,
    /// Upper bound on every single interaction with the fabric.
    pub fabric_timeout_secs: u64,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            schedulers: vec!["default".to_string()],
            loss_rates: vec![0, 1, 5],
            phase_duration_secs: 60,
            result_dir: PathBuf::from("scheduler_results"),
            endpoints: vec![
                Endpoint::new(Ipv4Addr::new(10, 0, 1, 1), "path 1"),
                Endpoint::new(Ipv4Addr::new(10, 0, 3, 1), "path 2"),
            ],
            impaired_link: LinkRef::new("h1", "h1-eth0"),
            client_host: "h1".to_string(),
            server_host: "h3".to_string(),
            server_addr: Ipv4Addr::new(10, 0, 2, 2),
            command_prefix: "mptcpize run".to_string(),
            server_grace_ms: 2000,
            sample_period_ms: 1000,
            fabric_timeout_secs: 30,
        }
    }
}

impl BenchConfig {
    /// Read the configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schedulers.is_empty() {
            return Err(ConfigError::NoSchedulers);
        }
        if self.loss_rates.is_empty() {
            return Err(ConfigError::NoLossRates);
        }
        if self.phase_duration_secs == 0 {
            return Err(ConfigError::ZeroPhaseDuration);
        }
        if self.sample_period_ms == 0 {
            return Err(ConfigError::ZeroSamplePeriod);
        }
        if self.fabric_timeout_secs == 0 {
            return Err(ConfigError::ZeroFabricTimeout);
        }
        if let Some(l) = self.loss_rates.iter().find(|l| **l > 100) {
            return Err(ConfigError::InvalidLossRate(*l));
        }
        if self.endpoints.len() != 2 {
            return Err(ConfigError::EndpointCount(self.endpoints.len()));
        }
        Ok(())
    }

    pub fn phase_duration(&self) -> Duration {
        Duration::from_secs(self.phase_duration_secs)
    }

    pub fn server_grace(&self) -> Duration {
        Duration::from_millis(self.server_grace_ms)
    }

    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms)
    }

    pub fn fabric_timeout(&self) -> Duration {
        Duration::from_secs(self.fabric_timeout_secs)
    }

    /// The two paths, in the order of the time series.
    pub fn paths(&self) -> Option<[&Endpoint; 2]> {
        match self.endpoints.as_slice() {
            [p1, p2] => Some([p1, p2]),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = BenchConfig::default();
        c.validate().unwrap();
        assert_eq!(c.phase_duration(), Duration::from_secs(60));
        assert_eq!(c.server_grace(), Duration::from_secs(2));
        assert_eq!(c.paths().unwrap()[1].addr, Ipv4Addr::new(10, 0, 3, 1));
    }

    #[test]
    fn partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.json");
        std::fs::write(
            &file,
            r#"{"schedulers": ["default", "blest"], "loss_rates": [0, 10], "phase_duration_secs": 5}"#,
        )
        .unwrap();
        let c = BenchConfig::from_file(&file).unwrap();
        assert_eq!(c.schedulers, vec!["default", "blest"]);
        assert_eq!(c.loss_rates, vec![0, 10]);
        assert_eq!(c.phase_duration_secs, 5);
        assert_eq!(c.server_host, "h3");
        assert_eq!(c.impaired_link, LinkRef::new("h1", "h1-eth0"));
    }

    #[test]
    fn invalid() {
        let check = |f: fn(&mut BenchConfig)| {
            let mut c = BenchConfig::default();
            f(&mut c);
            c.validate()
        };
        assert!(matches!(check(|c| c.schedulers.clear()), Err(ConfigError::NoSchedulers)));
        assert!(matches!(check(|c| c.loss_rates.clear()), Err(ConfigError::NoLossRates)));
        assert!(matches!(
            check(|c| c.phase_duration_secs = 0),
            Err(ConfigError::ZeroPhaseDuration)
        ));
        assert!(matches!(
            check(|c| c.sample_period_ms = 0),
            Err(ConfigError::ZeroSamplePeriod)
        ));
        assert!(matches!(
            check(|c| c.fabric_timeout_secs = 0),
            Err(ConfigError::ZeroFabricTimeout)
        ));
        assert!(matches!(
            check(|c| c.loss_rates.push(101)),
            Err(ConfigError::InvalidLossRate(101))
        ));
        assert!(matches!(
            check(|c| {
                c.endpoints.pop();
            }),
            Err(ConfigError::EndpointCount(1))
        ));
    }

    #[test]
    fn broken_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.json");
        std::fs::write(&file, "{").unwrap();
        assert!(matches!(BenchConfig::from_file(&file), Err(ConfigError::Json(_))));
        assert!(matches!(
            BenchConfig::from_file(dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }
}
