// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use spc_actors_runtime::MessageAccumulator;

use crate::State;

pub struct StateSummary {
    pub entry_count: usize,
}

/// Checks internal invariants of cron state
pub fn check_state_invariants(state: &State) -> (StateSummary, MessageAccumulator) {
    let acc = MessageAccumulator::default();
    for (i, entry) in state.entries.iter().enumerate() {
        acc.require(
            entry.receiver.id().is_ok(),
            format!("entry {} receiver {} is not an ID address", i, entry.receiver),
        );
    }
    (StateSummary { entry_count: state.entries.len() }, acc)
}
