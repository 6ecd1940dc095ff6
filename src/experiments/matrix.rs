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
//! Module that runs the full matrix of schedulers and loss rates and aggregates the results.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Write,
    fs::File,
    path::Path,
    time::Duration,
};

use itertools::iproduct;
use mpbench_utils::serde::OrderedMap;
use serde::{Deserialize, Serialize};

use super::{Testbed, TrialError};
use crate::records::{LossRate, MeasuredBandwidth, RunResult, TrialRecord};

/// File name of the summary document in the result directory.
pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, thiserror::Error)]
pub enum MatrixError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid summary document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Cannot write the csv file: {0}")]
    Csv(#[from] csv::Error),
    #[error("Trial {trial} aborted the matrix: {source}")]
    Aborted {
        trial: String,
        #[source]
        source: TrialError,
    },
}

/// Results keyed by scheduler and then by loss rate. Schedulers keep the order in which they were
/// registered, loss rates are ordered numerically. A missing entry means that the trial did not
/// run or failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultMatrix<T = RunResult>(OrderedMap<String, BTreeMap<LossRate, T>>);

impl<T> Default for ResultMatrix<T> {
    fn default() -> Self {
        Self(OrderedMap::default())
    }
}

impl<T> ResultMatrix<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the scheduler (without any result) if it is not yet known.
    pub fn register_scheduler(&mut self, scheduler: &str) -> &mut BTreeMap<LossRate, T> {
        let entries = &mut self.0 .0;
        let pos = match entries.iter().position(|(s, _)| s == scheduler) {
            Some(pos) => pos,
            None => {
                entries.push((scheduler.to_string(), BTreeMap::new()));
                entries.len() - 1
            }
        };
        &mut entries[pos].1
    }

    /// Insert a result, replacing the previous one of the same trial.
    pub fn insert(&mut self, scheduler: &str, loss_rate: LossRate, value: T) -> Option<T> {
        self.register_scheduler(scheduler).insert(loss_rate, value)
    }

    pub fn scheduler(&self, scheduler: &str) -> Option<&BTreeMap<LossRate, T>> {
        self.0 .0
            .iter()
            .find(|(s, _)| s == scheduler)
            .map(|(_, results)| results)
    }

    pub fn get(&self, scheduler: &str, loss_rate: LossRate) -> Option<&T> {
        self.scheduler(scheduler)?.get(&loss_rate)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeMap<LossRate, T>)> {
        self.0 .0.iter().map(|(s, r)| (s.as_str(), r))
    }

    pub fn schedulers(&self) -> impl Iterator<Item = &str> {
        self.iter().map(|(s, _)| s)
    }

    /// All loss rates of any scheduler, in numerical order.
    pub fn loss_rates(&self) -> BTreeSet<LossRate> {
        self.iter().flat_map(|(_, r)| r.keys().copied()).collect()
    }

    /// Number of results in the matrix.
    pub fn len(&self) -> usize {
        self.iter().map(|(_, r)| r.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn map<U>(&self, f: impl Fn(&T) -> U) -> ResultMatrix<U> {
        ResultMatrix(OrderedMap(
            self.0
                .0
                .iter()
                .map(|(s, r)| (s.clone(), r.iter().map(|(l, x)| (*l, f(x))).collect()))
                .collect(),
        ))
    }
}

/// Relative performance in percent of `bandwidth` compared to `baseline`. Zero if the baseline is
/// not positive.
pub fn relative_performance(bandwidth: f64, baseline: f64) -> f64 {
    if baseline > 0.0 {
        bandwidth / baseline * 100.0
    } else {
        0.0
    }
}

impl<T: MeasuredBandwidth> ResultMatrix<T> {
    /// Bandwidth of the loss-free trial of the scheduler, or 0.0 if it did not run.
    pub fn baseline(&self, scheduler: &str) -> f64 {
        self.get(scheduler, 0)
            .map(|r| r.avg_bandwidth_mbps())
            .unwrap_or(0.0)
    }

    /// Relative performance (in percent) of a trial compared to the loss-free trial of the same
    /// scheduler. Returns `None` if the trial did not run.
    pub fn relative_performance(&self, scheduler: &str, loss_rate: LossRate) -> Option<f64> {
        let bw = self.get(scheduler, loss_rate)?.avg_bandwidth_mbps();
        Some(relative_performance(bw, self.baseline(scheduler)))
    }

    /// Human-readable table of the bandwidth and relative performance of each scheduler.
    pub fn report(&self) -> String {
        let mut s = String::new();
        let rule = "-".repeat(50);
        for (scheduler, results) in self.iter() {
            let _ = writeln!(s, "\n[{scheduler}]");
            let _ = writeln!(s, "{rule}");
            let _ = writeln!(s, "{:<12}{:>18}{:>18}", "loss rate", "bandwidth", "relative");
            let _ = writeln!(s, "{rule}");
            let baseline = self.baseline(scheduler);
            for (loss_rate, r) in results {
                let bw = r.avg_bandwidth_mbps();
                let _ = writeln!(
                    s,
                    "{:>8}%   {:>13.2} Mbps{:>17.1}%",
                    loss_rate,
                    bw,
                    relative_performance(bw, baseline)
                );
            }
        }
        s
    }

    /// Write a table with one row per loss rate and one column per scheduler, filled with the
    /// value of `f`. Missing trials are written as empty cells.
    fn write_table(
        &self,
        path: impl AsRef<Path>,
        f: impl Fn(&str, LossRate, &T) -> f64,
    ) -> Result<(), MatrixError> {
        let mut csv = csv::Writer::from_path(path)?;
        let mut header = vec!["loss_rate".to_string()];
        header.extend(self.schedulers().map(String::from));
        csv.write_record(&header)?;
        for loss_rate in self.loss_rates() {
            let mut row = vec![loss_rate.to_string()];
            row.extend(self.iter().map(|(s, results)| {
                results
                    .get(&loss_rate)
                    .map(|r| format!("{:.2}", f(s, loss_rate, r)))
                    .unwrap_or_default()
            }));
            csv.write_record(&row)?;
        }
        csv.flush()?;
        Ok(())
    }

    /// Write the average bandwidth of every trial.
    pub fn write_bandwidth_comparison(&self, path: impl AsRef<Path>) -> Result<(), MatrixError> {
        self.write_table(path, |_, _, r| r.avg_bandwidth_mbps())
    }

    /// Write the relative performance of every trial.
    pub fn write_performance_degradation(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<(), MatrixError> {
        self.write_table(path, |s, _, r| {
            relative_performance(r.avg_bandwidth_mbps(), self.baseline(s))
        })
    }
}

impl ResultMatrix<RunResult> {
    /// The summary document of the matrix.
    pub fn summary(&self) -> ResultMatrix<TrialRecord> {
        self.map(RunResult::record)
    }
}

/// One row of the flat matrix csv.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixRecord {
    pub scheduler: String,
    pub loss_rate: LossRate,
    pub duration: u64,
    pub avg_bandwidth_mbps: f64,
    pub relative_performance: f64,
}

impl ResultMatrix<TrialRecord> {
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), MatrixError> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, MatrixError> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }

    /// All trials as flat records, ordered by scheduler and then by loss rate.
    pub fn records(&self) -> Vec<MatrixRecord> {
        self.iter()
            .flat_map(|(s, results)| {
                results.iter().map(move |(l, r)| MatrixRecord {
                    scheduler: s.to_string(),
                    loss_rate: *l,
                    duration: r.duration,
                    avg_bandwidth_mbps: r.avg_bandwidth_mbps,
                    relative_performance: self.relative_performance(s, *l).unwrap_or(0.0),
                })
            })
            .collect()
    }
}

impl Testbed {
    /// Run a trial for every pair of scheduler and loss rate, one after the other. A trial that
    /// fails is logged and left out of the matrix. If the fabric becomes unavailable, the matrix
    /// is aborted.
    pub async fn run_matrix(
        &mut self,
        schedulers: &[String],
        loss_rates: &[LossRate],
        phase_duration: Duration,
    ) -> Result<ResultMatrix, MatrixError> {
        let mut matrix = ResultMatrix::new();
        if let Some(bar) = self.progress.as_ref() {
            bar.set_length((schedulers.len() * loss_rates.len()) as u64);
        }

        for (scheduler, loss_rate) in iproduct!(schedulers, loss_rates) {
            matrix.register_scheduler(scheduler);
            match self.run(scheduler, *loss_rate, phase_duration).await {
                Ok(result) => {
                    matrix.insert(scheduler, *loss_rate, result);
                }
                Err(e) if e.is_fatal() => {
                    return Err(MatrixError::Aborted {
                        trial: crate::util::trial_name(scheduler, *loss_rate),
                        source: e,
                    })
                }
                Err(e) => log::error!(
                    "[{}] Trial skipped: {e}",
                    crate::util::trial_name(scheduler, *loss_rate)
                ),
            }
            if let Some(bar) = self.progress.as_ref() {
                bar.inc(1);
            }
        }

        log::info!("Finished {} of {} trials", matrix.len(), schedulers.len() * loss_rates.len());
        Ok(matrix)
    }
}
