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
//! Print the summary of a finished benchmark and write the comparison tables.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use mpbench::{
    experiments::{ResultMatrix, SUMMARY_FILE},
    records::TrialRecord,
    util::{init_logging, PathBufExt},
};

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
struct Args {
    /// Directory of the benchmark results.
    #[arg(default_value = "scheduler_results")]
    result_dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();
    let dir = args.result_dir.as_path();

    let path = dir.then(SUMMARY_FILE);
    let summary = ResultMatrix::<TrialRecord>::load(&path)
        .with_context(|| format!("Cannot load {path:?}. Did the benchmark run?"))?;
    log::info!(
        "Loaded {} trials of {} schedulers",
        summary.len(),
        summary.schedulers().count()
    );

    println!("{}", "=".repeat(50));
    println!("Multipath TCP scheduler benchmark");
    println!("{}", "=".repeat(50));
    println!("{}", summary.report());

    let bandwidth = dir.then("bandwidth_comparison.csv");
    summary.write_bandwidth_comparison(&bandwidth)?;
    log::info!("Bandwidth comparison written to {bandwidth:?}");

    let degradation = dir.then("performance_degradation.csv");
    summary.write_performance_degradation(&degradation)?;
    log::info!("Performance degradation written to {degradation:?}");

    Ok(())
}
