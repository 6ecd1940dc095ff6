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
//! Module facilitating to run trials and matrices of trials on the testbed.

pub mod capture;
pub mod matrix;
pub mod runner;
pub mod timeline;

pub use matrix::{relative_performance, MatrixError, MatrixRecord, ResultMatrix, SUMMARY_FILE};
pub use runner::{Testbed, TrialError, SERVER_LISTENING};
pub use timeline::{Action, FaultTimeline, Phase};
