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
//! Module defining the record data types of a trial, and how they are (de-)serialized to CSV and
//! JSON.
use std::{
    fmt,
    fs::{self, File, OpenOptions},
    io,
    net::Ipv4Addr,
    path::{Path, PathBuf},
};

use chrono::NaiveTime;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::util::{trial_name, PathBufExt};

/// Loss rate on the impaired link, in percent.
pub type LossRate = u32;

/// A logical path of the multipath connection, identified by the local address of its subflow.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub addr: Ipv4Addr,
    pub label: String,
}

impl Endpoint {
    pub fn new(addr: Ipv4Addr, label: impl Into<String>) -> Self {
        Self {
            addr,
            label: label.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.addr)
    }
}

/// One observation of a subflow in the periodic statistics capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSample {
    /// Wall-clock time of the snapshot, `None` if the capture had no timestamp marker yet.
    pub time: Option<NaiveTime>,
    pub endpoint: Endpoint,
    /// Congestion window in segments, `None` if not available.
    pub congestion_window: Option<u64>,
    /// Smoothed round-trip time in milliseconds, `None` if not available.
    pub round_trip_time_ms: Option<f64>,
    /// Cumulative number of bytes sent on the subflow.
    pub bytes_sent: u64,
}

/// One reporting interval of the bandwidth test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThroughputInterval {
    pub start_sec: f64,
    pub end_sec: f64,
    /// Sender throughput in MByte/s.
    pub throughput_mbyte_s: f64,
    pub retransmissions: u64,
    /// Congestion window of the sender in KByte.
    pub window_kb: f64,
}

/// Paths of all files produced by a single trial. All paths are a function of the result
/// directory, the scheduler and the loss rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFiles {
    /// Raw capture of the statistics sampler.
    pub ss_data: PathBuf,
    /// Raw log of the bandwidth test.
    pub iperf_log: PathBuf,
    /// Per-path time series extracted from `ss_data`.
    pub series: PathBuf,
    /// Throughput intervals extracted from `iperf_log`.
    pub intervals: PathBuf,
    /// The trial record.
    pub result: PathBuf,
}

impl ArtifactFiles {
    pub fn new(result_dir: impl AsRef<Path>, scheduler: &str, loss_rate: LossRate) -> Self {
        let dir = result_dir.as_ref();
        let name = trial_name(scheduler, loss_rate);
        Self {
            ss_data: dir.then(format!("ss_{name}.txt")),
            iperf_log: dir.then(format!("iperf_{name}.log")),
            series: dir.then(format!("series_{name}.csv")),
            intervals: dir.then(format!("iperf_{name}.csv")),
            result: dir.then(format!("result_{name}.json")),
        }
    }

    /// Create (or truncate) the two raw capture files, creating the result directory if needed.
    /// Returns the opened files in the order `(ss_data, iperf_log)`.
    pub fn create_captures(&self) -> Result<(File, File), (PathBuf, io::Error)> {
        if let Some(dir) = self.ss_data.parent() {
            fs::create_dir_all(dir).map_err(|e| (dir.to_path_buf(), e))?;
        }
        let open = |path: &PathBuf| {
            OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)
                .map_err(|e| (path.clone(), e))
        };
        Ok((open(&self.ss_data)?, open(&self.iperf_log)?))
    }
}

/// The record of a trial as it is stored in the per-trial result file and in the summary document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub scheduler: String,
    pub loss_rate: LossRate,
    /// Total duration of the trial in seconds.
    pub duration: u64,
    pub avg_bandwidth_mbps: f64,
    pub files: ArtifactFiles,
}

/// Result of a single trial.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub scheduler: String,
    pub loss_rate_pct: LossRate,
    pub duration_sec: u64,
    /// Average receiver-side bandwidth in Mbit/s. `0.0` if the bandwidth test did not report.
    pub avg_bandwidth_mbps: f64,
    pub snapshots: Vec<SnapshotSample>,
    pub intervals: Vec<ThroughputInterval>,
    pub files: ArtifactFiles,
}

impl RunResult {
    pub fn record(&self) -> TrialRecord {
        TrialRecord {
            scheduler: self.scheduler.clone(),
            loss_rate: self.loss_rate_pct,
            duration: self.duration_sec,
            avg_bandwidth_mbps: self.avg_bandwidth_mbps,
            files: self.files.clone(),
        }
    }

    /// Align the snapshots of the two paths by their timestamp.
    pub fn series(&self, paths: [&Endpoint; 2]) -> Vec<PathSeriesRecord> {
        self.snapshots
            .iter()
            .group_by(|s| s.time)
            .into_iter()
            .enumerate()
            .map(|(i, (time, group))| {
                let group = group.collect_vec();
                let get = |ep: &Endpoint| group.iter().rev().find(|s| &s.endpoint == ep).copied();
                let p1 = get(paths[0]);
                let p2 = get(paths[1]);
                PathSeriesRecord {
                    index: i + 1,
                    time: time.map(|t| t.format("%H:%M:%S").to_string()),
                    p1_cwnd: p1.and_then(|s| s.congestion_window),
                    p1_rtt_ms: p1.and_then(|s| s.round_trip_time_ms),
                    p1_sent_mb: p1.map(|s| sent_mb(s.bytes_sent)),
                    p2_cwnd: p2.and_then(|s| s.congestion_window),
                    p2_rtt_ms: p2.and_then(|s| s.round_trip_time_ms),
                    p2_sent_mb: p2.map(|s| sent_mb(s.bytes_sent)),
                }
            })
            .collect()
    }
}

/// Cumulative bytes converted to MByte, rounded to two decimals.
fn sent_mb(bytes: u64) -> f64 {
    (bytes as f64 / 1024.0 / 1024.0 * 100.0).round() / 100.0
}

/// One row of the per-path time series. Missing values are written as empty cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSeriesRecord {
    pub index: usize,
    pub time: Option<String>,
    pub p1_cwnd: Option<u64>,
    pub p1_rtt_ms: Option<f64>,
    pub p1_sent_mb: Option<f64>,
    pub p2_cwnd: Option<u64>,
    pub p2_rtt_ms: Option<f64>,
    pub p2_sent_mb: Option<f64>,
}

/// Any record carrying a measured average bandwidth.
pub trait MeasuredBandwidth {
    fn avg_bandwidth_mbps(&self) -> f64;
}

impl MeasuredBandwidth for RunResult {
    fn avg_bandwidth_mbps(&self) -> f64 {
        self.avg_bandwidth_mbps
    }
}

impl MeasuredBandwidth for TrialRecord {
    fn avg_bandwidth_mbps(&self) -> f64 {
        self.avg_bandwidth_mbps
    }
}

/// Write all records into a csv file (with headers), overwriting an existing file.
pub fn write_csv<R: Serialize>(
    path: impl AsRef<Path>,
    records: impl IntoIterator<Item = R>,
) -> Result<(), csv::Error> {
    let mut csv = csv::WriterBuilder::new().has_headers(true).from_writer(
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?,
    );
    for record in records {
        csv.serialize(record)?;
    }
    csv.flush()?;
    Ok(())
}
