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
//! Parser for the client log of the bandwidth test (`iperf3 -c <server> -i 1`).

use lazy_static::lazy_static;
use regex::Regex;

use super::log_parser::{parse_num, rate_unit_to_mbit, size_unit_to_kbyte, LogParser};
use crate::records::ThroughputInterval;

/// Marker of the receiver-side summary line.
const RECEIVER: &str = "receiver";
/// Marker of the terminal line of the bandwidth test.
const DONE: &str = "iperf Done.";

lazy_static! {
    static ref INTERVAL_RE: Regex = Regex::new(
        r"\[\s*\d+\]\s+([\d.]+)-([\d.]+)\s+sec\s+[\d.]+\s+\w*Bytes\s+([\d.]+)\s+([KMG]?bits/sec)\s+(\d+)\s+([\d.]+)\s+([KMG]?Bytes)"
    )
    .unwrap();
}

/// Parser that extracts the per-second [`ThroughputInterval`]s of the sender.
///
/// Only lines that carry a retransmission count and a congestion window are intervals. The summary
/// lines at the end of the test (`sender` / `receiver`) and all header lines are skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct IperfLogParser;

impl IperfLogParser {
    pub fn new() -> Self {
        Self
    }

    fn interval(line: &str) -> Option<ThroughputInterval> {
        let c = INTERVAL_RE.captures(line)?;
        let rate = parse_num::<f64>(&c[3])? * rate_unit_to_mbit(&c[4])?;
        Some(ThroughputInterval {
            start_sec: parse_num(&c[1])?,
            end_sec: parse_num(&c[2])?,
            throughput_mbyte_s: rate / 8.0,
            retransmissions: parse_num(&c[5])?,
            window_kb: parse_num::<f64>(&c[6])? * size_unit_to_kbyte(&c[7])?,
        })
    }
}

impl LogParser for IperfLogParser {
    type Record = ThroughputInterval;

    fn description() -> &'static str {
        "bandwidth test"
    }

    fn parse(&self, raw: &str) -> Vec<ThroughputInterval> {
        raw.lines().filter_map(Self::interval).collect()
    }
}

/// Return the value (in Mbit/s) in front of the first rate unit on that line.
fn rate_on_line(line: &str) -> Option<f64> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let (i, factor) = tokens
        .iter()
        .enumerate()
        .find_map(|(i, t)| Some((i, rate_unit_to_mbit(t)?)))?;
    let value: f64 = parse_num(tokens.get(i.checked_sub(1)?)?)?;
    Some(value * factor)
}

/// Compute the average receiver-side bandwidth in Mbit/s.
///
/// All receiver summary lines are averaged. If there is none, the bandwidth on the terminal line
/// of the test is used. If that is missing as well, the test did not produce a result and `0.0` is
/// returned.
pub fn average_receiver_bandwidth(raw: &str) -> f64 {
    let receivers: Vec<f64> = raw
        .lines()
        .filter(|l| l.contains(RECEIVER))
        .filter_map(rate_on_line)
        .collect();
    if !receivers.is_empty() {
        return receivers.iter().sum::<f64>() / receivers.len() as f64;
    }
    raw.lines()
        .filter(|l| l.contains(DONE))
        .find_map(rate_on_line)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod test {
    use super::*;

    const LOG: &str = "\
Connecting to host 10.0.2.2, port 5201
[  5] local 10.0.1.1 port 39714 connected to 10.0.2.2 port 5201
[ ID] Interval           Transfer     Bitrate         Retr  Cwnd
[  5]   0.00-1.00   sec  1.50 MBytes  12.6 Mbits/sec    0    110 KBytes
[  5]   1.00-2.00   sec  1.12 MBytes  9.44 Mbits/sec    3   1.25 MBytes
[  5]   2.00-3.00   sec   896 KBytes  7.34 Mbits/sec   12   64.0 KBytes
- - - - - - - - - - - - - - - - - - - - - - - - -
[ ID] Interval           Transfer     Bitrate         Retr
[  5]   0.00-3.00   sec  3.50 MBytes  9.79 Mbits/sec   15             sender
[  5]   0.00-3.04   sec  3.38 MBytes  9.32 Mbits/sec                  receiver

iperf Done.
";

    #[test]
    fn intervals() {
        let intervals = IperfLogParser::new().parse(LOG);
        assert_eq!(intervals.len(), 3);
        assert_eq!(
            intervals[0],
            ThroughputInterval {
                start_sec: 0.0,
                end_sec: 1.0,
                throughput_mbyte_s: 12.6 / 8.0,
                retransmissions: 0,
                window_kb: 110.0,
            }
        );
        assert_eq!(intervals[1].window_kb, 1.25 * 1024.0);
        assert_eq!(intervals[1].retransmissions, 3);
        assert_eq!(intervals[2].end_sec, 3.0);
        assert_eq!(intervals[2].retransmissions, 12);
    }

    #[test]
    fn interval_rate_units() {
        let line = "[  5]   0.00-1.00   sec   112 MBytes   940 Mbits/sec    0   3.00 MBytes";
        let i = IperfLogParser::interval(line).unwrap();
        assert_eq!(i.throughput_mbyte_s, 117.5);
        assert_eq!(i.window_kb, 3072.0);
        let line = "[  5]   0.00-1.00   sec  1.10 GBytes  1.00 Gbits/sec    0   2.00 MBytes";
        assert_eq!(IperfLogParser::interval(line).unwrap().throughput_mbyte_s, 125.0);
        let line = "[  5]   0.00-1.00   sec  0.00 Bytes  0.00 bits/sec    0   0.00 Bytes";
        assert_eq!(IperfLogParser::interval(line).unwrap().throughput_mbyte_s, 0.0);
    }

    #[test]
    fn receiver_bandwidth() {
        assert_eq!(average_receiver_bandwidth(LOG), 9.32);
        let raw = "[  5]   0.00-10.04  sec  1.10 GBytes   942 Mbits/sec                  receiver";
        assert_eq!(average_receiver_bandwidth(raw), 942.0);
    }

    #[test]
    fn receiver_bandwidth_is_averaged() {
        let raw = "\
[  5]   0.00-10.04  sec  12 MBytes   10 Mbits/sec                  receiver
[  7]   0.00-10.04  sec  12 MBytes   20 Mbits/sec                  receiver
[SUM]   0.00-10.04  sec  12 MBytes   abc Mbits/sec                 receiver
";
        assert_eq!(average_receiver_bandwidth(raw), 15.0);
    }

    #[test]
    fn receiver_bandwidth_units() {
        let raw = "[  5]   0.00-10.04  sec  1.10 GBytes   1.5 Gbits/sec                  receiver";
        assert_eq!(average_receiver_bandwidth(raw), 1500.0);
    }

    #[test]
    fn done_fallback() {
        let raw = "iperf Done. 8.5 Mbits/sec\n";
        assert_eq!(average_receiver_bandwidth(raw), 8.5);
        let raw = "iperf Done.\n";
        assert_eq!(average_receiver_bandwidth(raw), 0.0);
    }

    #[test]
    fn no_result() {
        assert_eq!(average_receiver_bandwidth(""), 0.0);
        assert_eq!(
            average_receiver_bandwidth("iperf3: error - unable to connect to server"),
            0.0
        );
        assert!(IperfLogParser::new().parse("").is_empty());
    }
}
