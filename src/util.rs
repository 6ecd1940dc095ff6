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
//! Utility module collection of functions

use std::path::{Path, PathBuf};

use crate::records::LossRate;

/// Default location of the log4rs configuration.
pub const LOG_CONFIG_FILE: &str = "log4rs.yml";

/// Initialize logging from `log4rs.yml` in the working directory. If the file does not exist (or
/// cannot be loaded), fall back to `pretty_env_logger`, configured by `RUST_LOG`.
pub fn init_logging() {
    if Path::new(LOG_CONFIG_FILE).exists() {
        match log4rs::init_file(LOG_CONFIG_FILE, Default::default()) {
            Ok(()) => return,
            Err(e) => eprintln!("Cannot load {LOG_CONFIG_FILE}: {e}"),
        }
    }
    // the logger may already be set (e.g., when called twice in tests)
    let _ = pretty_env_logger::try_init();
}

/// Name of a trial, used for all of its artifact files and as prefix in the log.
pub fn trial_name(scheduler: &str, loss_rate: LossRate) -> String {
    format!("{scheduler}_{loss_rate}pct_loss")
}

pub trait PathBufExt: Sized {
    fn then(self, p: impl AsRef<Path>) -> PathBuf;
}

impl PathBufExt for PathBuf {
    fn then(mut self, p: impl AsRef<Path>) -> PathBuf {
        self.push(p);
        self
    }
}

impl PathBufExt for &Path {
    fn then(self, p: impl AsRef<Path>) -> PathBuf {
        let mut path = self.to_path_buf();
        path.push(p);
        path
    }
}
