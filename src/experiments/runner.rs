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
//! Module that executes a single trial on the testbed.

use std::{
    collections::BTreeSet,
    fs::File,
    future::Future,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use indicatif::ProgressBar;
use tokio::time::{sleep, timeout};

use super::{
    capture::{join_all, CaptureContext, CaptureFile, CaptureTask},
    timeline::{Action, FaultTimeline},
};
use crate::{
    analyzer::{analyze_captures, ParserError},
    config::{BenchConfig, ConfigError},
    fabric::{EmulationFabric, FabricError, LinkRef, TopologyHandle, TransportStack},
    records::{write_csv, ArtifactFiles, LossRate, RunResult},
    topology::TopologySpec,
    util::trial_name,
};

#[derive(Debug, thiserror::Error)]
pub enum TrialError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("Scheduler {scheduler} is not available (available: {available:?})")]
    Configuration {
        scheduler: String,
        available: BTreeSet<String>,
    },
    #[error("Cannot write {path:?}: {source}")]
    CaptureIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("The emulation fabric is unavailable: {0}")]
    FabricUnavailable(String),
    #[error("Fabric error: {0}")]
    Fabric(#[from] FabricError),
    #[error("{0} did not finish within {1:?}")]
    Timeout(String, Duration),
    #[error("Capture task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Parser(#[from] ParserError),
    #[error("Cannot serialize the trial record: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Cannot write the csv file: {0}")]
    Csv(#[from] csv::Error),
}

impl TrialError {
    /// Whether the error prevents any further trial from running.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FabricUnavailable(_) | Self::InvalidConfig(_))
    }
}

/// Succeeds only if a bandwidth test server listens in the namespace of the host.
pub const SERVER_LISTENING: &str = "ss -Hltn 'sport = :5201' | grep -q .";

/// Run an interaction with the fabric, giving up after `limit`.
async fn bounded<T>(
    what: &str,
    limit: Duration,
    fut: impl Future<Output = Result<T, FabricError>>,
) -> Result<T, TrialError> {
    match timeout(limit, fut).await {
        Ok(r) => Ok(r?),
        Err(_) => Err(TrialError::Timeout(what.to_string(), limit)),
    }
}

/// Topology held by the current trial, together with the fault that is currently injected.
struct Lease {
    topo: TopologyHandle,
    fault: Option<LinkRef>,
}

impl Lease {
    /// Clear any outstanding fault and tear down the topology.
    async fn release(self, fabric: &dyn EmulationFabric, limit: Duration) -> Result<(), TrialError> {
        if let Some(link) = self.fault.as_ref() {
            log::debug!("Clearing the outstanding fault on {link}");
            if let Err(e) = bounded("clear fault", limit, fabric.clear_fault(&self.topo, link)).await {
                log::warn!("Cannot clear the fault on {link}: {e}");
            }
        }
        bounded("teardown", limit, fabric.teardown(self.topo))
            .await
            .map_err(|e| TrialError::FabricUnavailable(e.to_string()))
    }
}

/// The testbed owns the emulation fabric and the transport stack. Only one trial can run at a time,
/// which is enforced by [`Testbed::run`] taking `&mut self`.
pub struct Testbed {
    pub(crate) fabric: Arc<dyn EmulationFabric>,
    pub(crate) stack: Arc<dyn TransportStack>,
    pub(crate) config: BenchConfig,
    pub(crate) topology: TopologySpec,
    pub(crate) progress: Option<ProgressBar>,
}

impl Testbed {
    /// Create a testbed on the dual-path topology.
    pub fn new(
        fabric: Arc<dyn EmulationFabric>,
        stack: Arc<dyn TransportStack>,
        config: BenchConfig,
    ) -> Self {
        Self {
            fabric,
            stack,
            config,
            topology: TopologySpec::dual_path(),
            progress: None,
        }
    }

    pub fn with_topology(mut self, topology: TopologySpec) -> Self {
        self.topology = topology;
        self
    }

    /// Report the progress of a matrix on this bar.
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// Run a single trial. The trial selects the scheduler, builds the topology, starts the
    /// bandwidth test and the statistics sampler, executes the fault timeline, tears down the
    /// topology, and finally parses the captures.
    ///
    /// The artifacts are written into the result directory, at paths that only depend on the
    /// scheduler and the loss rate.
    pub async fn run(
        &mut self,
        scheduler: &str,
        loss_pct: LossRate,
        phase_duration: Duration,
    ) -> Result<RunResult, TrialError> {
        let name = trial_name(scheduler, loss_pct);
        let limit = self.config.fabric_timeout();
        if let Some(bar) = self.progress.as_ref() {
            bar.set_message(name.clone());
        }
        log::info!("[{name}] Starting trial");
        self.config.validate()?;

        // select the scheduler
        let available = timeout(limit, self.stack.list_schedulers())
            .await
            .map_err(|_| TrialError::Timeout("list schedulers".to_string(), limit))?;
        if !available.contains(scheduler) {
            return Err(TrialError::Configuration {
                scheduler: scheduler.to_string(),
                available,
            });
        }
        let selected = timeout(limit, self.stack.set_scheduler(scheduler))
            .await
            .map_err(|_| TrialError::Timeout("set scheduler".to_string(), limit))?;
        if !selected {
            return Err(TrialError::Configuration {
                scheduler: scheduler.to_string(),
                available,
            });
        }

        let files = ArtifactFiles::new(&self.config.result_dir, scheduler, loss_pct);
        let (ss_file, iperf_file) = files
            .create_captures()
            .map_err(|(path, source)| TrialError::CaptureIo { path, source })?;

        let topo = bounded(
            "build topology",
            limit,
            self.fabric.build_topology(&self.topology),
        )
        .await
        .map_err(|e| TrialError::FabricUnavailable(e.to_string()))?;
        log::debug!("[{name}] Built topology {topo}");

        let timeline = FaultTimeline::generate(
            phase_duration,
            loss_pct,
            self.config.impaired_link.clone(),
        );
        let total = timeline.total_duration();

        let mut lease = Lease { topo, fault: None };
        let captures = [
            CaptureFile::new(ss_file, &files.ss_data),
            CaptureFile::new(iperf_file, &files.iperf_log),
        ];
        let outcome = self
            .execute(&name, &mut lease, timeline, captures)
            .await;
        let released = lease.release(self.fabric.as_ref(), limit).await;
        match (outcome, released) {
            (_, Err(e)) => return Err(e),
            (Err(e), Ok(())) => return Err(e),
            (Ok(()), Ok(())) => log::debug!("[{name}] Topology released"),
        }

        let analysis = analyze_captures(&files, &self.config.endpoints)?;
        let result = RunResult {
            scheduler: scheduler.to_string(),
            loss_rate_pct: loss_pct,
            duration_sec: total.as_secs(),
            avg_bandwidth_mbps: analysis.avg_bandwidth_mbps,
            snapshots: analysis.snapshots,
            intervals: analysis.intervals,
            files,
        };
        self.write_artifacts(&result)?;

        log::info!(
            "[{name}] Finished with {:.2} Mbit/s",
            result.avg_bandwidth_mbps
        );
        Ok(result)
    }

    /// Start the server and the captures, and execute the timeline. The captures are always
    /// stopped when this function returns.
    async fn execute(
        &self,
        name: &str,
        lease: &mut Lease,
        timeline: FaultTimeline,
        [ss_capture, iperf_capture]: [CaptureFile; 2],
    ) -> Result<(), TrialError> {
        let cfg = &self.config;
        let limit = cfg.fabric_timeout();
        let total = timeline.total_duration();

        let server = prefixed(&cfg.command_prefix, "iperf3 -s -D");
        let out = bounded(
            "start server",
            limit,
            self.fabric.execute(&lease.topo, &cfg.server_host, &server),
        )
        .await?;
        if !out.success() {
            log::warn!("[{name}] `{server}` exited with {:?}", out.exit_code);
        }
        sleep(cfg.server_grace()).await;
        let alive = bounded(
            "check server",
            limit,
            self.fabric.execute(&lease.topo, &cfg.server_host, SERVER_LISTENING),
        )
        .await?;
        if !alive.success() {
            log::warn!("[{name}] Server is not confirmed running, continuing anyways");
        }

        let ctx = CaptureContext {
            fabric: self.fabric.clone(),
            topo: lease.topo.clone(),
            trial: name.to_string(),
        };
        let period = cfg.sample_period();
        let samples = (total.as_millis() / period.as_millis().max(1)) as u64;
        let client = prefixed(
            &cfg.command_prefix,
            &format!("iperf3 -c {} -t {} -i 1", cfg.server_addr, total.as_secs()),
        );
        let tasks: [CaptureTask; 2] = [
            ctx.sampler(
                &cfg.client_host,
                "date; ss -tni",
                period,
                samples,
                limit,
                ss_capture,
            ),
            ctx.client(&cfg.client_host, &client, total + limit, iperf_capture),
        ];

        match self.execute_timeline(name, lease, timeline).await {
            Ok(()) => join_all(tasks).await,
            Err(e) => {
                for task in tasks {
                    task.cancel().await;
                }
                Err(e)
            }
        }
    }

    async fn execute_timeline(
        &self,
        name: &str,
        lease: &mut Lease,
        timeline: FaultTimeline,
    ) -> Result<(), TrialError> {
        let limit = self.config.fabric_timeout();
        for action in timeline {
            match action {
                Action::Wait(phase, duration) => {
                    log::debug!("[{name}] {phase} phase for {duration:?}");
                    sleep(duration).await;
                }
                Action::InjectFault(link, pct) => {
                    log::info!("[{name}] Injecting {pct}% loss on {link}");
                    lease.fault = Some(link.clone());
                    bounded(
                        "inject fault",
                        limit,
                        self.fabric.inject_fault(&lease.topo, &link, pct),
                    )
                    .await?;
                }
                Action::ClearFault(link) => {
                    log::info!("[{name}] Clearing the loss on {link}");
                    bounded(
                        "clear fault",
                        limit,
                        self.fabric.clear_fault(&lease.topo, &link),
                    )
                    .await?;
                    lease.fault = None;
                }
            }
        }
        Ok(())
    }

    /// Write the per-path time series, the throughput intervals and the trial record.
    fn write_artifacts(&self, result: &RunResult) -> Result<(), TrialError> {
        let files = &result.files;
        if let Some(paths) = self.config.paths() {
            write_csv(&files.series, result.series(paths))?;
        }
        write_csv(&files.intervals, &result.intervals)?;
        let file = File::create(&files.result).map_err(|source| TrialError::CaptureIo {
            path: files.result.clone(),
            source,
        })?;
        serde_json::to_writer_pretty(file, &result.record())?;
        Ok(())
    }
}

fn prefixed(prefix: &str, command: &str) -> String {
    if prefix.is_empty() {
        command.to_string()
    } else {
        format!("{prefix} {command}")
    }
}
