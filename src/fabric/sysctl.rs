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
//! Transport stack control of the Linux MPTCP implementation, using `sysctl`.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::process::Command;

use super::TransportStack;

/// Procfs file listing the names of all available packet schedulers.
pub const AVAILABLE_SCHEDULERS: &str = "/proc/sys/net/mptcp/available_schedulers";
/// Sysctl key of the active packet scheduler.
pub const SCHEDULER_KEY: &str = "net.mptcp.scheduler";

#[derive(Debug, Clone)]
pub struct SysctlStack {
    available: PathBuf,
}

impl Default for SysctlStack {
    fn default() -> Self {
        Self::new(AVAILABLE_SCHEDULERS)
    }
}

impl SysctlStack {
    pub fn new(available: impl AsRef<Path>) -> Self {
        Self {
            available: available.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl TransportStack for SysctlStack {
    async fn list_schedulers(&self) -> BTreeSet<String> {
        match tokio::fs::read_to_string(&self.available).await {
            Ok(s) => s.split_whitespace().map(String::from).collect(),
            Err(e) => {
                log::warn!("Cannot read the available schedulers from {:?}: {e}", self.available);
                BTreeSet::new()
            }
        }
    }

    async fn set_scheduler(&self, name: &str) -> bool {
        match Command::new("sysctl")
            .arg("-w")
            .arg(format!("{SCHEDULER_KEY}={name}"))
            .output()
            .await
        {
            Ok(out) if out.status.success() => true,
            Ok(out) => {
                log::warn!(
                    "Cannot set {SCHEDULER_KEY} to {name}: {}",
                    String::from_utf8_lossy(&out.stderr).trim()
                );
                false
            }
            Err(e) => {
                log::warn!("Cannot execute sysctl: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn available_schedulers() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("available_schedulers");
        std::fs::write(&file, "default blest\tredundant\n").unwrap();

        let stack = SysctlStack::new(&file);
        let got = stack.list_schedulers().await;
        let want: BTreeSet<String> = ["blest", "default", "redundant"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(got, want);
    }

    #[tokio::test]
    async fn no_schedulers() {
        let dir = tempfile::tempdir().unwrap();
        let stack = SysctlStack::new(dir.path().join("missing"));
        assert!(stack.list_schedulers().await.is_empty());
    }
}
