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
//! Module defining the interfaces to the network emulation fabric and to the transport stack.
//!
//! The orchestration only talks to those two collaborators through the traits in this module. A
//! topology is represented by a [`TopologyHandle`], which is owned by exactly one trial at a time
//! and released explicitly with [`EmulationFabric::teardown`].

use std::{collections::BTreeSet, fmt};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{records::LossRate, topology::TopologySpec};

pub mod netns;
pub mod sysctl;

pub use netns::NetnsFabric;
pub use sysctl::SysctlStack;

/// Reference to an interface of a host in the topology.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkRef {
    pub host: String,
    pub interface: String,
}

impl LinkRef {
    pub fn new(host: impl Into<String>, interface: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            interface: interface.into(),
        }
    }
}

impl fmt::Display for LinkRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.interface)
    }
}

/// Handle to a topology built by the fabric.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopologyHandle {
    id: u64,
    name: String,
}

impl TopologyHandle {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for TopologyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

/// Output of a command executed on a host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    /// Exit code of the command, `None` if it was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FabricError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Command `{command}` on {host} failed with code {code:?}: {stderr}")]
    CommandFailed {
        host: String,
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("Unknown host: {0}")]
    UnknownHost(String),
    #[error("Unknown topology: {0}")]
    UnknownTopology(TopologyHandle),
}

/// The network emulation fabric: provides hosts and links, executes commands on hosts and injects
/// loss on interfaces.
#[async_trait]
pub trait EmulationFabric: Send + Sync {
    /// Build the topology and return the handle to it.
    async fn build_topology(&self, spec: &TopologySpec) -> Result<TopologyHandle, FabricError>;

    /// Execute a shell command on a host and wait for it to terminate. A non-zero exit code is
    /// not an error.
    async fn execute(
        &self,
        topo: &TopologyHandle,
        host: &str,
        command: &str,
    ) -> Result<CommandOutput, FabricError>;

    /// Drop `loss_pct` percent of all packets leaving the interface.
    async fn inject_fault(
        &self,
        topo: &TopologyHandle,
        link: &LinkRef,
        loss_pct: LossRate,
    ) -> Result<(), FabricError>;

    /// Remove the loss from the interface.
    async fn clear_fault(&self, topo: &TopologyHandle, link: &LinkRef) -> Result<(), FabricError>;

    /// Destroy the topology.
    async fn teardown(&self, topo: TopologyHandle) -> Result<(), FabricError>;
}

/// Control of the multipath transport stack, exposing the packet scheduler as a global setting.
#[async_trait]
pub trait TransportStack: Send + Sync {
    /// Names of all schedulers available in the environment. Empty if they cannot be determined.
    async fn list_schedulers(&self) -> BTreeSet<String>;

    /// Select the scheduler. Returns `false` if the stack rejected it.
    async fn set_scheduler(&self, name: &str) -> bool;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(LinkRef::new("h1", "h1-eth0").to_string(), "h1:h1-eth0");
        assert_eq!(TopologyHandle::new(3, "dual-path").to_string(), "dual-path#3");
    }

    #[test]
    fn command_success() {
        let mut out = CommandOutput::default();
        assert!(!out.success());
        out.exit_code = Some(0);
        assert!(out.success());
        out.exit_code = Some(1);
        assert!(!out.success());
    }
}
