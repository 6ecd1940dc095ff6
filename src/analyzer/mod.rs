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
//! Module that turns the raw captures of a trial into structured records.

use crate::records::{ArtifactFiles, Endpoint, SnapshotSample, ThroughputInterval};

pub mod iperf_log_parser;
mod log_parser;
pub mod ss_log_parser;

pub use iperf_log_parser::{average_receiver_bandwidth, IperfLogParser};
pub use log_parser::{LogParser, ParserError};
pub use ss_log_parser::{SsLogParser, MIN_BYTES_SENT};

/// Structured content of both captures of a trial.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureAnalysis {
    pub snapshots: Vec<SnapshotSample>,
    pub intervals: Vec<ThroughputInterval>,
    /// Average receiver-side bandwidth in Mbit/s.
    pub avg_bandwidth_mbps: f64,
}

/// Parse both raw captures of a trial. Must only be called once the captures are complete.
pub fn analyze_captures(
    files: &ArtifactFiles,
    endpoints: &[Endpoint],
) -> Result<CaptureAnalysis, ParserError> {
    let snapshots = SsLogParser::new(endpoints.iter().cloned()).parse_file(&files.ss_data)?;
    let raw_iperf = std::fs::read_to_string(&files.iperf_log).map_err(|source| {
        ParserError::Read {
            path: files.iperf_log.clone(),
            source,
        }
    })?;
    let intervals = IperfLogParser::new().parse(&raw_iperf);
    let avg_bandwidth_mbps = average_receiver_bandwidth(&raw_iperf);
    log::debug!(
        "Parsed {} snapshots and {} intervals from the captures",
        snapshots.len(),
        intervals.len()
    );
    Ok(CaptureAnalysis {
        snapshots,
        intervals,
        avg_bandwidth_mbps,
    })
}

#[cfg(test)]
mod test {
    use std::{fs, net::Ipv4Addr};

    use super::*;

    #[test]
    fn captures_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let files = ArtifactFiles::new(dir.path(), "default", 0);
        fs::write(
            &files.ss_data,
            "10:00:01\nESTAB 0 0 10.0.1.1:1 10.0.2.2:5201\ncwnd:20 rtt:15.2 bytes_sent:600000\n",
        )
        .unwrap();
        fs::write(
            &files.iperf_log,
            "[  5]   0.00-1.00   sec  1.50 MBytes  12.0 Mbits/sec    0    110 KBytes\n\
             [  5]   0.00-1.04   sec  1.38 MBytes  11.0 Mbits/sec                  receiver\n",
        )
        .unwrap();

        let endpoints = [Endpoint::new(Ipv4Addr::new(10, 0, 1, 1), "path 1")];
        let analysis = analyze_captures(&files, &endpoints).unwrap();
        assert_eq!(analysis.snapshots.len(), 1);
        assert_eq!(analysis.intervals.len(), 1);
        assert_eq!(analysis.avg_bandwidth_mbps, 11.0);
    }

    #[test]
    fn missing_capture() {
        let dir = tempfile::tempdir().unwrap();
        let files = ArtifactFiles::new(dir.path(), "default", 0);
        match analyze_captures(&files, &[]) {
            Err(ParserError::Read { path, .. }) => assert_eq!(path, files.ss_data),
            x => panic!("unexpected result {x:?}"),
        }
    }
}
