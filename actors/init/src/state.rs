// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::tuple::*;
use fvm_shared::address::{Address, Protocol};
use fvm_shared::ActorID;

use spc_actors_runtime::{actor_error, ActorError, Map, DEFAULT_HAMT_CONFIG, FIRST_NON_SINGLETON_ADDR};

pub type AddressMap<BS> = Map<BS, Address, ActorID>;

/// State is reponsible for creating
#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug)]
pub struct State {
    pub address_map: Cid,
    pub next_id: ActorID,
    pub network_name: String,
}

impl State {
    pub fn new<BS: Blockstore>(store: &BS, network_name: String) -> Result<Self, ActorError> {
        let address_map = AddressMap::flush_empty(store, DEFAULT_HAMT_CONFIG)?;
        Ok(Self { address_map, next_id: FIRST_NON_SINGLETON_ADDR, network_name })
    }

    pub fn load_address_map<'bs, BS: Blockstore>(
        &self,
        store: &'bs BS,
    ) -> Result<AddressMap<&'bs BS>, ActorError> {
        AddressMap::load(store, &self.address_map, DEFAULT_HAMT_CONFIG, "address map")
    }

    /// Allocates a new ID address and stores a mapping of the argument address to it.
    /// Fails if the argument address is already present in the map.
    ///
    /// Returns the newly-allocated actor ID.
    pub fn map_address_to_new_id<BS: Blockstore>(
        &mut self,
        store: &BS,
        addr: &Address,
    ) -> Result<ActorID, ActorError> {
        let id = self.next_id;
        self.next_id += 1;

        let mut map = self.load_address_map(store)?;
        if !map.set_if_absent(addr, id)? {
            return Err(actor_error!(
                forbidden,
                "robust address {} is already allocated in the address map",
                addr
            ));
        }
        self.address_map = map.flush()?;
        Ok(id)
    }

    /// ResolveAddress resolves an address to an ID-address, if possible.
    /// If the provided address is an ID address, it is returned as-is.
    /// This means that mapped ID-addresses (which should only appear as values, not keys) and
    /// singleton actor addresses (which are not in the map) pass through unchanged.
    ///
    /// Returns `None` if the address was not an ID-address and not found in the mapping.
    pub fn resolve_address<BS: Blockstore>(
        &self,
        store: &BS,
        addr: &Address,
    ) -> Result<Option<ActorID>, ActorError> {
        if addr.protocol() == Protocol::ID {
            return Ok(addr.id().ok());
        }
        Ok(self.load_address_map(store)?.get(addr)?.copied())
    }
}
