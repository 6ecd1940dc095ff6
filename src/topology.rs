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
//! Description of the emulated topology, independent of the fabric that builds it.

use serde::{Deserialize, Serialize};

/// A point-to-point link between two hosts, shaped to a bandwidth and a one-way delay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSpec {
    pub a: String,
    pub a_iface: String,
    pub b: String,
    pub b_iface: String,
    /// Bandwidth in Mbit/s, unlimited if `None`.
    pub bandwidth_mbit: Option<u32>,
    /// One-way delay in milliseconds, no delay if `None`.
    pub delay_ms: Option<u32>,
}

impl LinkSpec {
    /// Create the link `a-ethX <-> b-ethY`, shaped to 10 Mbit/s with 10 ms delay.
    pub fn shaped(a: &str, a_port: usize, b: &str, b_port: usize) -> Self {
        Self {
            a: a.to_string(),
            a_iface: format!("{a}-eth{a_port}"),
            b: b.to_string(),
            b_iface: format!("{b}-eth{b_port}"),
            bandwidth_mbit: Some(10),
            delay_ms: Some(10),
        }
    }
}

/// A command that configures a host once all links are up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCommand {
    pub host: String,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologySpec {
    pub name: String,
    pub hosts: Vec<String>,
    pub links: Vec<LinkSpec>,
    /// Commands executed in order after the links are created.
    pub setup: Vec<HostCommand>,
}

impl TopologySpec {
    /// Return the link attached to the given interface.
    pub fn link_of(&self, host: &str, iface: &str) -> Option<&LinkSpec> {
        self.links
            .iter()
            .find(|l| (l.a == host && l.a_iface == iface) || (l.b == host && l.b_iface == iface))
    }

    /// The dual-path topology: the client `h1` reaches the server `h3` over the router `h2`
    /// (path 1, `10.0.1.0/24` and `10.0.2.0/24`) and over the router `h4` (path 2, `10.0.3.0/24`
    /// and `10.0.4.0/24`). Both end hosts route per source address, and announce the second
    /// address as an MPTCP endpoint.
    pub fn dual_path() -> Self {
        let hosts = ["h1", "h2", "h3", "h4"];
        let links = vec![
            LinkSpec::shaped("h1", 0, "h2", 0),
            LinkSpec::shaped("h2", 1, "h3", 0),
            LinkSpec::shaped("h1", 1, "h4", 0),
            LinkSpec::shaped("h4", 1, "h3", 1),
        ];

        let mut setup = Vec::new();
        let mut cmd = |host: &str, command: &str| {
            setup.push(HostCommand {
                host: host.to_string(),
                command: command.to_string(),
            })
        };

        for (host, iface, addr) in [
            ("h1", "h1-eth0", "10.0.1.1"),
            ("h1", "h1-eth1", "10.0.3.1"),
            ("h2", "h2-eth0", "10.0.1.2"),
            ("h2", "h2-eth1", "10.0.2.1"),
            ("h4", "h4-eth0", "10.0.3.2"),
            ("h4", "h4-eth1", "10.0.4.1"),
            ("h3", "h3-eth0", "10.0.2.2"),
            ("h3", "h3-eth1", "10.0.4.2"),
        ] {
            cmd(host, &format!("ip addr add {addr}/24 dev {iface}"));
        }

        // routers
        cmd("h2", "sysctl -w net.ipv4.ip_forward=1");
        cmd("h2", "ip route add 10.0.4.2 via 10.0.2.2 dev h2-eth1");
        cmd("h4", "sysctl -w net.ipv4.ip_forward=1");
        cmd("h4", "ip route add 10.0.2.2 via 10.0.4.2 dev h4-eth1");

        for host in hosts {
            cmd(host, "sysctl -w net.ipv4.conf.all.rp_filter=0");
            cmd(host, "sysctl -w net.ipv4.conf.default.rp_filter=0");
            cmd(host, "sysctl -w net.mptcp.enabled=1");
        }
        for link in links.iter() {
            for (host, iface) in [(&link.a, &link.a_iface), (&link.b, &link.b_iface)] {
                cmd(host, &format!("sysctl -w net.ipv4.conf.{iface}.rp_filter=0"));
            }
        }

        // one routing table per source address on the end hosts
        for (host, table, addr, net, iface, gw) in [
            ("h1", 1, "10.0.1.1", "10.0.1.0/24", "h1-eth0", "10.0.1.2"),
            ("h1", 2, "10.0.3.1", "10.0.3.0/24", "h1-eth1", "10.0.3.2"),
            ("h3", 1, "10.0.2.2", "10.0.2.0/24", "h3-eth0", "10.0.2.1"),
            ("h3", 2, "10.0.4.2", "10.0.4.0/24", "h3-eth1", "10.0.4.1"),
        ] {
            cmd(host, &format!("ip rule add from {addr} table {table}"));
            cmd(
                host,
                &format!("ip route add {net} dev {iface} scope link table {table}"),
            );
            cmd(
                host,
                &format!("ip route add default via {gw} dev {iface} table {table}"),
            );
        }
        cmd("h1", "ip route add 10.0.4.0/24 via 10.0.3.2 dev h1-eth1");
        cmd("h1", "ip route add default via 10.0.1.2");
        cmd("h3", "ip route add 10.0.3.0/24 via 10.0.4.1 dev h3-eth1");
        cmd("h3", "ip route add default via 10.0.2.1");

        // mptcp endpoints
        cmd("h1", "ip mptcp endpoint flush");
        cmd("h1", "ip mptcp endpoint add 10.0.3.1 dev h1-eth1 subflow");
        cmd("h3", "ip mptcp endpoint flush");
        cmd("h3", "ip mptcp endpoint add 10.0.4.2 dev h3-eth1 signal");
        cmd("h1", "ip mptcp limits set subflow 2 add_addr_accepted 2");
        cmd("h3", "ip mptcp limits set subflow 2 add_addr_accepted 2");

        Self {
            name: "dual-path".to_string(),
            hosts: hosts.iter().map(|h| h.to_string()).collect(),
            links,
            setup,
        }
    }
}
