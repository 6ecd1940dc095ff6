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
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use regex::Regex;

#[derive(Debug, thiserror::Error)]
pub enum ParserError {
    #[error("Cannot read capture {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Parser of a raw capture produced by an external tool during a trial.
///
/// Parsing is lenient: lines that do not match the expected structure are skipped, and fields that
/// cannot be parsed are reported as `None` (or cause the record to be dropped if the record cannot
/// exist without them). Only reading the capture itself can fail.
pub trait LogParser {
    type Record;

    /// Return a description of the parser
    fn description() -> &'static str;

    /// Parse the entire raw capture.
    fn parse(&self, raw: &str) -> Vec<Self::Record>;

    /// Read the capture at the given path and parse it.
    fn parse_file(&self, path: impl AsRef<Path>) -> Result<Vec<Self::Record>, ParserError> {
        let path = path.as_ref();
        log::debug!("Parsing {} capture {path:?}", Self::description());
        let raw = fs::read_to_string(path).map_err(|source| ParserError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(self.parse(&raw))
    }
}

/// Parse the first capture group of `re` in `line`.
pub fn capture<T: FromStr>(re: &Regex, line: &str) -> Option<T> {
    re.captures(line)
        .and_then(|m| m.get(1))
        .and_then(|m| parse_num(m.as_str()))
}

pub fn parse_num<T: FromStr>(num: impl AsRef<str>) -> Option<T> {
    T::from_str(num.as_ref()).ok()
}

/// Return the factor to convert a rate with the given unit (e.g., `Mbits/sec`) to Mbit/s. Returns
/// `None` if the token is not a rate unit.
pub fn rate_unit_to_mbit(unit: &str) -> Option<f64> {
    match unit.strip_suffix("/sec")? {
        "bits" => Some(1e-6),
        "Kbits" => Some(1e-3),
        "Mbits" => Some(1.0),
        "Gbits" => Some(1e3),
        _ => None,
    }
}

/// Return the factor to convert a size with the given unit (e.g., `MBytes`) to KByte. Returns `None`
/// if the token is not a size unit.
pub fn size_unit_to_kbyte(unit: &str) -> Option<f64> {
    match unit {
        "Bytes" => Some(1.0 / 1024.0),
        "KBytes" => Some(1.0),
        "MBytes" => Some(1024.0),
        "GBytes" => Some(1024.0 * 1024.0),
        _ => None,
    }
}
