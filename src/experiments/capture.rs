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
//! Background capture tasks that run on the hosts while the timeline executes.

use std::{fs::File, path::PathBuf, sync::Arc, time::Duration};

use tokio::{
    io::AsyncWriteExt,
    task::JoinHandle,
    time::{interval, timeout, MissedTickBehavior},
};

use super::TrialError;
use crate::fabric::{EmulationFabric, TopologyHandle};

/// Opened raw capture file.
#[derive(Debug)]
pub struct CaptureFile {
    pub file: File,
    pub path: PathBuf,
}

impl CaptureFile {
    pub fn new(file: File, path: impl Into<PathBuf>) -> Self {
        Self {
            file,
            path: path.into(),
        }
    }
}

/// Running capture task with a fixed lifetime.
#[derive(Debug)]
pub struct CaptureTask {
    what: &'static str,
    handle: JoinHandle<Result<(), TrialError>>,
}

impl CaptureTask {
    /// Wait for the task to finish on its own.
    pub async fn join(self) -> Result<(), TrialError> {
        log::trace!("Waiting for the {} capture", self.what);
        self.handle.await?
    }

    /// Abort the task and wait until it is stopped.
    pub async fn cancel(self) {
        self.handle.abort();
        let _ = self.handle.await;
        log::trace!("Cancelled the {} capture", self.what);
    }
}

/// Wait for all tasks in order. If one of them fails, the remaining ones are cancelled.
pub async fn join_all(tasks: impl IntoIterator<Item = CaptureTask>) -> Result<(), TrialError> {
    let mut tasks = tasks.into_iter();
    while let Some(task) = tasks.next() {
        if let Err(e) = task.join().await {
            for task in tasks {
                task.cancel().await;
            }
            return Err(e);
        }
    }
    Ok(())
}

/// Everything a capture task needs to run commands on the topology of a trial.
#[derive(Clone)]
pub struct CaptureContext {
    pub fabric: Arc<dyn EmulationFabric>,
    pub topo: TopologyHandle,
    /// Name of the trial, used as log prefix.
    pub trial: String,
}

impl CaptureContext {
    /// Execute `command` on `host` once every `period`, `samples` times, and append each output to
    /// the capture. A sample that fails or does not finish within `limit` is skipped.
    pub fn sampler(
        &self,
        host: &str,
        command: &str,
        period: Duration,
        samples: u64,
        limit: Duration,
        out: CaptureFile,
    ) -> CaptureTask {
        let ctx = self.clone();
        let host = host.to_string();
        let command = command.to_string();
        let handle = tokio::spawn(async move {
            let CaptureFile { file, path } = out;
            let io_err = |source| TrialError::CaptureIo {
                path: path.clone(),
                source,
            };
            let mut file = tokio::fs::File::from_std(file);
            let mut ticks = interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

            for i in 0..samples {
                ticks.tick().await;
                match timeout(limit, ctx.fabric.execute(&ctx.topo, &host, &command)).await {
                    Ok(Ok(output)) => file
                        .write_all(output.stdout.as_bytes())
                        .await
                        .map_err(io_err)?,
                    Ok(Err(e)) => log::warn!("[{}] Sample {i} failed: {e}", ctx.trial),
                    Err(_) => log::warn!("[{}] Sample {i} timed out", ctx.trial),
                }
            }
            file.flush().await.map_err(io_err)?;
            Ok(())
        });
        CaptureTask {
            what: "statistics",
            handle,
        }
    }

    /// Execute the long-running `command` on `host` and write its output to the capture. The
    /// command is allowed to run for at most `limit`. A command that fails or times out leaves an
    /// empty capture.
    pub fn client(&self, host: &str, command: &str, limit: Duration, out: CaptureFile) -> CaptureTask {
        let ctx = self.clone();
        let host = host.to_string();
        let command = command.to_string();
        let handle = tokio::spawn(async move {
            let CaptureFile { file, path } = out;
            let io_err = |source| TrialError::CaptureIo {
                path: path.clone(),
                source,
            };
            let mut file = tokio::fs::File::from_std(file);

            match timeout(limit, ctx.fabric.execute(&ctx.topo, &host, &command)).await {
                Ok(Ok(output)) => {
                    if !output.success() {
                        log::warn!(
                            "[{}] `{command}` exited with {:?}",
                            ctx.trial,
                            output.exit_code
                        );
                    }
                    file.write_all(output.stdout.as_bytes())
                        .await
                        .map_err(io_err)?;
                }
                Ok(Err(e)) => log::warn!("[{}] `{command}` failed: {e}", ctx.trial),
                Err(_) => log::warn!("[{}] `{command}` did not finish within {limit:?}", ctx.trial),
            }
            file.flush().await.map_err(io_err)?;
            Ok(())
        });
        CaptureTask {
            what: "bandwidth test",
            handle,
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_task_cancels_the_rest() {
        let stopped = Arc::new(AtomicBool::new(false));
        let guard = SetOnDrop(stopped.clone());
        let failing = CaptureTask {
            what: "statistics",
            handle: tokio::spawn(async {
                Err(TrialError::Timeout("sample".to_string(), Duration::from_secs(1)))
            }),
        };
        let running = CaptureTask {
            what: "bandwidth test",
            handle: tokio::spawn(async move {
                let _guard = guard;
                std::future::pending::<()>().await;
                Ok(())
            }),
        };

        let err = join_all([failing, running]).await.unwrap_err();
        assert!(matches!(err, TrialError::Timeout(..)), "{err:?}");
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn all_tasks_joined() {
        let tasks = (0..2).map(|_| CaptureTask {
            what: "statistics",
            handle: tokio::spawn(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }),
        });
        join_all(tasks).await.unwrap();
    }
}
