// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::HashMap;

use fvm_ipld_blockstore::Blockstore;
use fvm_shared::address::{Address, Protocol};
use fvm_shared::ActorID;

use spc_actors_runtime::{MessageAccumulator, FIRST_NON_SINGLETON_ADDR};

use crate::State;

pub struct StateSummary {
    pub ids_by_address: HashMap<Address, ActorID>,
    pub next_id: ActorID,
}

/// Checks internal invariants of init state.
pub fn check_state_invariants<BS: Blockstore>(
    state: &State,
    store: &BS,
) -> (StateSummary, MessageAccumulator) {
    let acc = MessageAccumulator::default();

    acc.require(!state.network_name.is_empty(), "network name is empty");
    acc.require(
        state.next_id >= FIRST_NON_SINGLETON_ADDR,
        format!("next id {} is too low", state.next_id),
    );

    let mut ids_by_address = HashMap::new();
    let mut address_by_id = HashMap::<ActorID, Address>::new();
    match state.load_address_map(store) {
        Ok(map) => {
            let ret = map.for_each(|key, actor_id| {
                acc.require(key.protocol() != Protocol::ID, format!("key {key} is an ID address"));
                acc.require(
                    *actor_id >= FIRST_NON_SINGLETON_ADDR,
                    format!("unexpected singleton ID value {actor_id}"),
                );
                acc.require(
                    *actor_id < state.next_id,
                    format!("id {actor_id} is not below next id {}", state.next_id),
                );
                if let Some(duplicate) = address_by_id.insert(*actor_id, key) {
                    acc.add(format!(
                        "duplicate mapping to ID {actor_id}: {key} {duplicate}"
                    ));
                }
                ids_by_address.insert(key, *actor_id);
                Ok(())
            });
            acc.require_no_error(ret, "error iterating address map");
        }
        Err(e) => acc.add(format!("error loading address map: {e}")),
    }

    (StateSummary { ids_by_address, next_id: state.next_id }, acc)
}
