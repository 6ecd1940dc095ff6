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
//! Run the benchmark matrix on network namespaces of this machine. Requires root.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;

use mpbench::{
    experiments::SUMMARY_FILE,
    prelude::*,
    records::write_csv,
    util::PathBufExt,
};
use mpbench_utils::other::get_timestamp;

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
struct Args {
    /// JSON configuration file. All fields are optional.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Scheduler to benchmark (can be given multiple times). Overwrites the configuration.
    #[arg(short, long = "scheduler")]
    schedulers: Vec<String>,
    /// Loss rate in percent (can be given multiple times). Overwrites the configuration.
    #[arg(short, long = "loss-rate")]
    loss_rates: Vec<LossRate>,
    /// Duration of each phase in seconds.
    #[arg(short, long)]
    duration: Option<u64>,
    /// Directory of all artifacts.
    #[arg(short, long)]
    result_dir: Option<PathBuf>,
    /// Upper bound on a single interaction with the fabric, in seconds.
    #[arg(long)]
    fabric_timeout: Option<u64>,
}

impl Args {
    fn config(self) -> anyhow::Result<BenchConfig> {
        let mut config = match self.config.as_ref() {
            Some(path) => BenchConfig::from_file(path)
                .with_context(|| format!("Cannot load the configuration {path:?}"))?,
            None => BenchConfig::default(),
        };
        if !self.schedulers.is_empty() {
            config.schedulers = self.schedulers;
        }
        if !self.loss_rates.is_empty() {
            config.loss_rates = self.loss_rates;
        }
        if let Some(duration) = self.duration {
            config.phase_duration_secs = duration;
        }
        if let Some(result_dir) = self.result_dir {
            config.result_dir = result_dir;
        }
        if let Some(timeout) = self.fabric_timeout {
            config.fabric_timeout_secs = timeout;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut builder = pretty_env_logger::formatted_builder();
    builder.parse_filters(&std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()));
    let logger = builder.build();
    let level = logger.filter();
    let multi = MultiProgress::new();
    LogWrapper::new(multi.clone(), logger).try_init()?;
    log::set_max_level(level);

    let config = Args::parse().config()?;
    log::info!(
        "Benchmarking {:?} with loss rates {:?} and {}s per phase",
        config.schedulers,
        config.loss_rates,
        config.phase_duration_secs
    );

    let bar = multi.add(
        ProgressBar::new(0).with_style(
            ProgressStyle::with_template(
                "[{bar:60}] trial: {pos}/{len}, elapsed: {elapsed}, eta: {eta} {msg}",
            )?
            .progress_chars("##-"),
        ),
    );
    let mut testbed = Testbed::new(
        Arc::new(NetnsFabric::default()),
        Arc::new(SysctlStack::default()),
        config.clone(),
    )
    .with_progress(bar.clone());

    let matrix = testbed
        .run_matrix(
            &config.schedulers,
            &config.loss_rates,
            config.phase_duration(),
        )
        .await?;
    bar.finish_and_clear();

    let dir = config.result_dir.as_path();
    std::fs::create_dir_all(dir).with_context(|| format!("Cannot create {dir:?}"))?;
    let summary = matrix.summary();
    summary.save(dir.then(SUMMARY_FILE))?;
    write_csv(
        dir.then(format!("matrix_{}.csv", get_timestamp())),
        summary.records(),
    )?;
    log::info!("Results written to {dir:?}");

    println!("{}", summary.report());

    Ok(())
}
