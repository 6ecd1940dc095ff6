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
//! Emulation fabric based on Linux network namespaces, veth pairs and `tc netem`. Requires root.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use tokio::process::Command;

use super::{CommandOutput, EmulationFabric, FabricError, LinkRef, TopologyHandle};
use crate::{
    records::LossRate,
    topology::{LinkSpec, TopologySpec},
};

/// Default prefix of all namespaces created by the fabric.
pub const NETNS_PREFIX: &str = "mpb-";

#[derive(Debug, Clone)]
struct Built {
    spec: TopologySpec,
    namespaces: Vec<String>,
}

/// Fabric that creates one network namespace per host.
#[derive(Debug)]
pub struct NetnsFabric {
    prefix: String,
    next_id: AtomicU64,
    built: Mutex<HashMap<u64, Built>>,
}

impl Default for NetnsFabric {
    fn default() -> Self {
        Self::new(NETNS_PREFIX)
    }
}

impl NetnsFabric {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next_id: AtomicU64::new(0),
            built: Mutex::new(HashMap::new()),
        }
    }

    fn netns(&self, host: &str) -> String {
        format!("{}{host}", self.prefix)
    }

    fn lookup(&self, topo: &TopologyHandle) -> Result<Built, FabricError> {
        self.built
            .lock()
            .map_err(|_| FabricError::UnknownTopology(topo.clone()))?
            .get(&topo.id())
            .cloned()
            .ok_or_else(|| FabricError::UnknownTopology(topo.clone()))
    }

    fn host_netns(&self, topo: &TopologyHandle, host: &str) -> Result<(Built, String), FabricError> {
        let built = self.lookup(topo)?;
        if !built.spec.hosts.iter().any(|h| h == host) {
            return Err(FabricError::UnknownHost(host.to_string()));
        }
        Ok((built, self.netns(host)))
    }

    async fn create(&self, spec: &TopologySpec, namespaces: &mut Vec<String>) -> Result<(), FabricError> {
        for host in spec.hosts.iter() {
            let ns = self.netns(host);
            checked(host, "ip", ["netns", "add", ns.as_str()]).await?;
            namespaces.push(ns.clone());
            checked(host, "ip", ["netns", "exec", &ns, "ip", "link", "set", "lo", "up"]).await?;
        }

        for link in spec.links.iter() {
            let (ns_a, ns_b) = (self.netns(&link.a), self.netns(&link.b));
            checked(
                &link.a,
                "ip",
                [
                    "link", "add", &link.a_iface, "netns", &ns_a, "type", "veth", "peer", "name",
                    &link.b_iface, "netns", &ns_b,
                ],
            )
            .await?;
            for (ns, iface) in [(&ns_a, &link.a_iface), (&ns_b, &link.b_iface)] {
                checked(&link.a, "ip", ["netns", "exec", ns, "ip", "link", "set", iface, "up"])
                    .await?;
                let netem = netem_args(Some(link), None);
                if !netem.is_empty() {
                    let mut args = vec!["netns", "exec", ns, "tc", "qdisc", "add", "dev", iface];
                    args.extend(["root", "netem"]);
                    args.extend(netem.iter().map(String::as_str));
                    checked(&link.a, "ip", args).await?;
                }
            }
        }

        for cmd in spec.setup.iter() {
            let out = exec_in(&self.netns(&cmd.host), &cmd.command).await?;
            if !out.success() {
                log::warn!(
                    "Setup command `{}` on {} exited with {:?}",
                    cmd.command,
                    cmd.host,
                    out.exit_code
                );
            }
        }

        Ok(())
    }

    async fn set_qdisc(
        &self,
        topo: &TopologyHandle,
        link: &LinkRef,
        loss_pct: Option<LossRate>,
    ) -> Result<(), FabricError> {
        let (built, ns) = self.host_netns(topo, &link.host)?;
        let shaping = built.spec.link_of(&link.host, &link.interface);
        let netem = netem_args(shaping, loss_pct);
        let mut args = vec!["netns", "exec", &ns, "tc", "qdisc"];
        if netem.is_empty() {
            args.extend(["del", "dev", &link.interface, "root"]);
        } else {
            args.extend(["replace", "dev", &link.interface, "root", "netem"]);
            args.extend(netem.iter().map(String::as_str));
        }
        checked(&link.host, "ip", args).await?;
        Ok(())
    }
}

/// Arguments of the netem qdisc on an interface of that link, with an optional loss on top of the
/// shaping of the link. Empty if the interface needs no qdisc at all.
pub fn netem_args(link: Option<&LinkSpec>, loss_pct: Option<LossRate>) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(delay) = link.and_then(|l| l.delay_ms) {
        args.push("delay".to_string());
        args.push(format!("{delay}ms"));
    }
    if let Some(rate) = link.and_then(|l| l.bandwidth_mbit) {
        args.push("rate".to_string());
        args.push(format!("{rate}mbit"));
    }
    if let Some(loss) = loss_pct {
        args.push("loss".to_string());
        args.push(format!("{loss}%"));
    }
    args
}

async fn exec_in(ns: &str, command: &str) -> Result<CommandOutput, FabricError> {
    let output = Command::new("ip")
        .args(["netns", "exec", ns, "sh", "-c", command])
        .kill_on_drop(true)
        .output()
        .await?;
    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        exit_code: output.status.code(),
    })
}

/// Run the program and fail if it does not exit successfully.
async fn checked<'a>(
    host: &str,
    program: &str,
    args: impl IntoIterator<Item = &'a str>,
) -> Result<(), FabricError> {
    let args: Vec<&str> = args.into_iter().collect();
    log::trace!("{host}: {program} {}", args.join(" "));
    let output = Command::new(program)
        .args(&args)
        .kill_on_drop(true)
        .output()
        .await?;
    if output.status.success() {
        Ok(())
    } else {
        Err(FabricError::CommandFailed {
            host: host.to_string(),
            command: format!("{program} {}", args.join(" ")),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Parse the output of `ip netns pids`.
fn parse_pids(stdout: &str) -> Vec<u32> {
    stdout
        .split_whitespace()
        .filter_map(|p| p.parse().ok())
        .collect()
}

/// Kill every process that still runs in the namespace. Deleting a namespace does not stop them.
async fn kill_processes(ns: &str) -> Result<(), FabricError> {
    let output = Command::new("ip")
        .args(["netns", "pids", ns])
        .kill_on_drop(true)
        .output()
        .await?;
    let pids = parse_pids(&String::from_utf8_lossy(&output.stdout));
    if pids.is_empty() {
        return Ok(());
    }
    log::debug!("Killing {} processes in {ns}", pids.len());
    let pids: Vec<String> = pids.iter().map(u32::to_string).collect();
    checked(ns, "kill", ["-KILL"].into_iter().chain(pids.iter().map(String::as_str))).await
}

async fn delete_namespaces(namespaces: &[String]) -> Result<(), FabricError> {
    let mut result = Ok(());
    for ns in namespaces {
        if let Err(e) = kill_processes(ns).await {
            log::warn!("Cannot stop the processes in {ns}: {e}");
        }
        if let Err(e) = checked(ns, "ip", ["netns", "del", ns.as_str()]).await {
            log::warn!("Cannot delete namespace {ns}: {e}");
            result = Err(e);
        }
    }
    result
}

#[async_trait]
impl EmulationFabric for NetnsFabric {
    async fn build_topology(&self, spec: &TopologySpec) -> Result<TopologyHandle, FabricError> {
        let mut namespaces = Vec::new();
        if let Err(e) = self.create(spec, &mut namespaces).await {
            let _ = delete_namespaces(&namespaces).await;
            return Err(e);
        }

        let handle = TopologyHandle::new(self.next_id.fetch_add(1, Ordering::SeqCst), &spec.name);
        log::debug!("Built topology {handle} with namespaces {namespaces:?}");
        self.built
            .lock()
            .map_err(|_| FabricError::UnknownTopology(handle.clone()))?
            .insert(
                handle.id(),
                Built {
                    spec: spec.clone(),
                    namespaces,
                },
            );
        Ok(handle)
    }

    async fn execute(
        &self,
        topo: &TopologyHandle,
        host: &str,
        command: &str,
    ) -> Result<CommandOutput, FabricError> {
        let (_, ns) = self.host_netns(topo, host)?;
        exec_in(&ns, command).await
    }

    async fn inject_fault(
        &self,
        topo: &TopologyHandle,
        link: &LinkRef,
        loss_pct: LossRate,
    ) -> Result<(), FabricError> {
        self.set_qdisc(topo, link, Some(loss_pct)).await
    }

    async fn clear_fault(&self, topo: &TopologyHandle, link: &LinkRef) -> Result<(), FabricError> {
        self.set_qdisc(topo, link, None).await
    }

    async fn teardown(&self, topo: TopologyHandle) -> Result<(), FabricError> {
        let built = self
            .built
            .lock()
            .map_err(|_| FabricError::UnknownTopology(topo.clone()))?
            .remove(&topo.id())
            .ok_or_else(|| FabricError::UnknownTopology(topo.clone()))?;
        delete_namespaces(&built.namespaces).await?;
        log::debug!("Removed topology {topo}");
        Ok(())
    }
}
