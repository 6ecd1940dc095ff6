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
//! Parser for the periodic socket statistics capture (`date; ss -tni` once per sample period).

use std::{collections::BTreeMap, net::Ipv4Addr};

use chrono::NaiveTime;
use lazy_static::lazy_static;
use regex::Regex;

use super::log_parser::{capture, parse_num, LogParser};
use crate::records::{Endpoint, SnapshotSample};

/// Samples with at most this many bytes sent belong to control-only subflows and are dropped.
pub const MIN_BYTES_SENT: u64 = 500_000;

/// Marker of an established connection in the header line of a socket block.
const ESTABLISHED: &str = "ESTAB";

lazy_static! {
    static ref TIME_RE: Regex = Regex::new(r"\b(\d{2}):(\d{2}):(\d{2})\b").unwrap();
    static ref ADDR_RE: Regex = Regex::new(r"\b(\d{1,3}(?:\.\d{1,3}){3})\b").unwrap();
    static ref CWND_RE: Regex = Regex::new(r"\bcwnd:(\d+)").unwrap();
    static ref RTT_RE: Regex = Regex::new(r"\brtt:([\d.]+)").unwrap();
    static ref BYTES_SENT_RE: Regex = Regex::new(r"\bbytes_sent:(\d+)").unwrap();
}

/// Parser that extracts per-path [`SnapshotSample`]s for the configured endpoints.
///
/// The capture interleaves timestamp markers with socket blocks. A socket block starts with a
/// header line that contains [`ESTABLISHED`] and the local address, and the statistics are
/// expected on the line *immediately* after the header. If the statistics are not adjacent to the
/// header, the sample is skipped.
///
/// Samples are ordered by timestamp, and within one timestamp by the order of the endpoints. If an
/// endpoint appears more than once within the same timestamp, the last one is kept. Samples that
/// appear before the first timestamp marker have no time and are ordered last.
#[derive(Debug, Clone)]
pub struct SsLogParser {
    endpoints: Vec<Endpoint>,
}

impl SsLogParser {
    pub fn new(endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        Self {
            endpoints: endpoints.into_iter().collect(),
        }
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Return the index of the configured endpoint on that header line, if the line is a header of
    /// an established connection.
    fn header_endpoint(&self, line: &str) -> Option<usize> {
        if !line.contains(ESTABLISHED) {
            return None;
        }
        ADDR_RE
            .captures_iter(line)
            .filter_map(|c| parse_num::<Ipv4Addr>(c.get(1)?.as_str()))
            .find_map(|addr| self.endpoints.iter().position(|e| e.addr == addr))
    }

    fn sample(&self, time: Option<NaiveTime>, idx: usize, line: &str) -> Option<SnapshotSample> {
        let bytes_sent: u64 = capture(&BYTES_SENT_RE, line)?;
        if bytes_sent <= MIN_BYTES_SENT {
            return None;
        }
        Some(SnapshotSample {
            time,
            endpoint: self.endpoints[idx].clone(),
            congestion_window: capture(&CWND_RE, line),
            round_trip_time_ms: capture(&RTT_RE, line),
            bytes_sent,
        })
    }
}

/// Parse a timestamp marker, e.g., the output of `date`.
fn timestamp(line: &str) -> Option<NaiveTime> {
    let c = TIME_RE.captures(line)?;
    let h = parse_num(&c[1])?;
    let m = parse_num(&c[2])?;
    let s = parse_num(&c[3])?;
    NaiveTime::from_hms_opt(h, m, s)
}

impl LogParser for SsLogParser {
    type Record = SnapshotSample;

    fn description() -> &'static str {
        "socket statistics"
    }

    fn parse(&self, raw: &str) -> Vec<SnapshotSample> {
        let lines: Vec<&str> = raw.lines().collect();
        // samples without time sort after all timestamps
        let mut samples: BTreeMap<(bool, Option<NaiveTime>), BTreeMap<usize, SnapshotSample>> =
            BTreeMap::new();
        let mut time = None;

        for (i, line) in lines.iter().enumerate() {
            if let Some(t) = timestamp(line) {
                time = Some(t);
                continue;
            }
            let Some(idx) = self.header_endpoint(line) else {
                continue;
            };
            if let Some(sample) = lines.get(i + 1).and_then(|next| self.sample(time, idx, next)) {
                samples
                    .entry((time.is_none(), time))
                    .or_default()
                    .insert(idx, sample);
            }
        }

        samples.into_values().flat_map(|x| x.into_values()).collect()
    }
}
