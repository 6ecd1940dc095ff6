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
//! The three-phase fault timeline of a trial.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::{fabric::LinkRef, records::LossRate};

/// Phase of a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Phase {
    Baseline,
    Impaired,
    Recovery,
}

/// A single step of the timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Wait until the phase is over.
    Wait(Phase, Duration),
    /// Start dropping the given percentage of packets on the link.
    InjectFault(LinkRef, LossRate),
    /// Stop dropping packets on the link.
    ClearFault(LinkRef),
}

/// Ordered schedule of the actions of a trial. The timeline has no side effects; it is executed by
/// the [`Testbed`](super::Testbed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultTimeline {
    actions: Vec<Action>,
}

impl FaultTimeline {
    /// Generate the timeline `baseline -> impaired -> recovery`, each phase lasting
    /// `phase_duration`. The fault is injected at the start of the impaired phase and cleared at
    /// its end. If `fault_pct` is zero, no fault is ever injected or cleared.
    pub fn generate(phase_duration: Duration, fault_pct: LossRate, target: LinkRef) -> Self {
        let faulty = fault_pct > 0;
        let mut actions = Vec::with_capacity(5);
        actions.push(Action::Wait(Phase::Baseline, phase_duration));
        if faulty {
            actions.push(Action::InjectFault(target.clone(), fault_pct));
        }
        actions.push(Action::Wait(Phase::Impaired, phase_duration));
        if faulty {
            actions.push(Action::ClearFault(target));
        }
        actions.push(Action::Wait(Phase::Recovery, phase_duration));
        Self { actions }
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Sum of all waits.
    pub fn total_duration(&self) -> Duration {
        self.actions
            .iter()
            .map(|a| match a {
                Action::Wait(_, d) => *d,
                _ => Duration::ZERO,
            })
            .sum()
    }
}

impl IntoIterator for FaultTimeline {
    type Item = Action;
    type IntoIter = std::vec::IntoIter<Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.into_iter()
    }
}
