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
//! Orchestration tests on a scripted in-memory fabric.
//!
//! The tests run in paused tokio time, so a trial with three one-minute phases completes
//! instantly while all waits still happen in (virtual) order.

use std::{
    collections::{BTreeSet, VecDeque},
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::{
    config::BenchConfig,
    experiments::{Testbed, SERVER_LISTENING},
    fabric::{CommandOutput, EmulationFabric, FabricError, LinkRef, TopologyHandle, TransportStack},
    records::LossRate,
    topology::TopologySpec,
};

mod matrix;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Build,
    Execute(String, String),
    Inject(LinkRef, LossRate),
    Clear(LinkRef),
    Teardown,
}

/// Fabric that records every interaction together with the (virtual) time it happened at.
pub struct FakeFabric {
    start: Instant,
    next_id: AtomicU64,
    samples: AtomicU64,
    events: Mutex<Vec<(Duration, Event)>>,
    iperf_logs: Mutex<VecDeque<String>>,
    pub fail_build: bool,
    pub fail_teardown: bool,
    pub hang_inject: bool,
    pub server_dead: bool,
}

impl FakeFabric {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            next_id: AtomicU64::new(0),
            samples: AtomicU64::new(0),
            events: Mutex::new(Vec::new()),
            iperf_logs: Mutex::new(VecDeque::new()),
            fail_build: false,
            fail_teardown: false,
            hang_inject: false,
            server_dead: false,
        }
    }

    /// Queue the output of the next bandwidth test, reporting `mbps` at the receiver.
    pub fn push_bandwidth(&self, mbps: f64) {
        self.iperf_logs.lock().unwrap().push_back(iperf_log(mbps));
    }

    pub fn events(&self) -> Vec<(Duration, Event)> {
        self.events.lock().unwrap().clone()
    }

    /// Time of the first event that matches.
    pub fn time_of(&self, f: impl Fn(&Event) -> bool) -> Option<Duration> {
        self.events().into_iter().find(|(_, e)| f(e)).map(|(t, _)| t)
    }

    fn record(&self, event: Event) {
        self.events
            .lock()
            .unwrap()
            .push((self.start.elapsed(), event));
    }

    fn ss_output(&self) -> String {
        let n = self.samples.fetch_add(1, Ordering::SeqCst);
        let t = 10 * 3600 + n;
        let sent = (n + 1) * 600_000;
        let sent_p2 = (n + 2) * 300_000;
        format!(
            "Fri Oct 16 {:02}:{:02}:{:02} UTC 2026\n\
             State Recv-Q Send-Q Local Address:Port Peer Address:Port\n\
             ESTAB 0 0 10.0.1.1:40000 10.0.2.2:5201\n\
             \t cubic rtt:20.5/1.2 cwnd:10 bytes_sent:{sent}\n\
             ESTAB 0 0 10.0.3.1:40001 10.0.2.2:5201\n\
             \t cubic rtt:30.5/1.2 cwnd:12 bytes_sent:{sent_p2}\n",
            t / 3600,
            t / 60 % 60,
            t % 60,
        )
    }
}

pub fn iperf_log(mbps: f64) -> String {
    format!(
        "Connecting to host 10.0.2.2, port 5201\n\
         [  5]   0.00-1.00   sec  1.12 MBytes  9.44 Mbits/sec    0    110 KBytes\n\
         [  5]   1.00-2.00   sec  1.12 MBytes  9.44 Mbits/sec    2   1.00 MBytes\n\
         - - - - - - - - - - - - - - - - - - - - - - - - -\n\
         [  5]   0.00-2.00   sec  2.25 MBytes  9.44 Mbits/sec    2             sender\n\
         [  5]   0.00-2.04   sec  2.20 MBytes  {mbps} Mbits/sec                  receiver\n\
         \n\
         iperf Done.\n"
    )
}

#[async_trait]
impl EmulationFabric for FakeFabric {
    async fn build_topology(&self, spec: &TopologySpec) -> Result<TopologyHandle, FabricError> {
        self.record(Event::Build);
        if self.fail_build {
            return Err(FabricError::CommandFailed {
                host: "h1".to_string(),
                command: "ip netns add".to_string(),
                code: Some(1),
                stderr: "Operation not permitted".to_string(),
            });
        }
        Ok(TopologyHandle::new(
            self.next_id.fetch_add(1, Ordering::SeqCst),
            &spec.name,
        ))
    }

    async fn execute(
        &self,
        _topo: &TopologyHandle,
        host: &str,
        command: &str,
    ) -> Result<CommandOutput, FabricError> {
        self.record(Event::Execute(host.to_string(), command.to_string()));
        let output = if command.contains("ss -tni") {
            CommandOutput {
                stdout: self.ss_output(),
                exit_code: Some(0),
            }
        } else if command.contains("iperf3 -c") {
            match self.iperf_logs.lock().unwrap().pop_front() {
                Some(stdout) => CommandOutput {
                    stdout,
                    exit_code: Some(0),
                },
                None => CommandOutput {
                    stdout: "iperf3: error - unable to connect to server\n".to_string(),
                    exit_code: Some(1),
                },
            }
        } else if command == SERVER_LISTENING {
            CommandOutput {
                stdout: String::new(),
                exit_code: Some(if self.server_dead { 1 } else { 0 }),
            }
        } else {
            CommandOutput {
                stdout: String::new(),
                exit_code: Some(0),
            }
        };
        Ok(output)
    }

    async fn inject_fault(
        &self,
        _topo: &TopologyHandle,
        link: &LinkRef,
        loss_pct: LossRate,
    ) -> Result<(), FabricError> {
        self.record(Event::Inject(link.clone(), loss_pct));
        if self.hang_inject {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn clear_fault(&self, _topo: &TopologyHandle, link: &LinkRef) -> Result<(), FabricError> {
        self.record(Event::Clear(link.clone()));
        Ok(())
    }

    async fn teardown(&self, _topo: TopologyHandle) -> Result<(), FabricError> {
        self.record(Event::Teardown);
        if self.fail_teardown {
            return Err(FabricError::Io(std::io::Error::other("device busy")));
        }
        Ok(())
    }
}

/// Transport stack with a fixed set of schedulers.
pub struct FakeStack {
    available: BTreeSet<String>,
    pub reject: bool,
    selected: Mutex<Vec<String>>,
}

impl FakeStack {
    pub fn new<'a>(available: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            available: available.into_iter().map(String::from).collect(),
            reject: false,
            selected: Mutex::new(Vec::new()),
        }
    }

    pub fn selected(&self) -> Vec<String> {
        self.selected.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransportStack for FakeStack {
    async fn list_schedulers(&self) -> BTreeSet<String> {
        self.available.clone()
    }

    async fn set_scheduler(&self, name: &str) -> bool {
        self.selected.lock().unwrap().push(name.to_string());
        !self.reject
    }
}

pub fn config(result_dir: &Path) -> BenchConfig {
    BenchConfig {
        result_dir: result_dir.to_path_buf(),
        ..Default::default()
    }
}

pub fn testbed(fabric: &Arc<FakeFabric>, stack: &Arc<FakeStack>, result_dir: &Path) -> Testbed {
    Testbed::new(fabric.clone(), stack.clone(), config(result_dir))
}
