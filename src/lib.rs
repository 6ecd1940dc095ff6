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
//! Library for benchmarking multipath TCP packet schedulers under controlled network impairments.

pub mod analyzer;
pub mod config;
pub mod experiments;
pub mod fabric;
pub mod records;
pub mod topology;
pub mod util;

#[cfg(test)]
mod test;

pub mod prelude {
    pub use super::{
        config::BenchConfig,
        experiments::{ResultMatrix, Testbed, TrialError},
        fabric::{EmulationFabric, NetnsFabric, SysctlStack, TransportStack},
        records::{LossRate, RunResult, TrialRecord},
    };
}
