// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_shared::address::{Address, Protocol};

use spc_actors_runtime::MessageAccumulator;

use crate::State;

pub struct StateSummary {
    pub pubkey_address: Address,
}

/// Checks internal invariants of account state.
pub fn check_state_invariants(state: &State) -> (StateSummary, MessageAccumulator) {
    let acc = MessageAccumulator::default();
    acc.require(
        matches!(state.address.protocol(), Protocol::BLS | Protocol::Secp256k1),
        format!("actor address {} must be BLS or SECP256K1 protocol", state.address),
    );
    (StateSummary { pubkey_address: state.address }, acc)
}
