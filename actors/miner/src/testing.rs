// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_shared::address::Protocol;
use num_traits::Signed;

use spc_actors_runtime::MessageAccumulator;

use crate::{MinerPower, State};

pub struct StateSummary {
    pub power: MinerPower,
    pub sector_count: usize,
}

/// Checks internal invariants of miner state.
pub fn check_state_invariants(state: &State) -> (StateSummary, MessageAccumulator) {
    let acc = MessageAccumulator::default();

    acc.require(
        state.info.owner.protocol() == Protocol::ID,
        format!("owner {} is not an ID address", state.info.owner),
    );
    acc.require(
        state.info.worker.protocol() == Protocol::ID,
        format!("worker {} is not an ID address", state.info.worker),
    );

    for pair in state.sectors.windows(2) {
        acc.require(
            pair[0].sector_number < pair[1].sector_number,
            format!(
                "sectors out of order: {} before {}",
                pair[0].sector_number, pair[1].sector_number
            ),
        );
    }
    for sector in &state.sectors {
        acc.require(
            sector.power.is_positive(),
            format!("sector {} has non-positive power {}", sector.sector_number, sector.power),
        );
    }
    if let Some(challenge) = state.challenge {
        acc.require(
            challenge.challenge_epoch < challenge.expiry_epoch,
            format!(
                "challenge at {} expires at or before it was issued ({})",
                challenge.challenge_epoch, challenge.expiry_epoch
            ),
        );
    }

    (StateSummary { power: state.power(), sector_count: state.sectors.len() }, acc)
}
