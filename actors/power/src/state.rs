// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::BTreeSet;

use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::tuple::*;
use fvm_shared::address::Address;
use fvm_shared::bigint::bigint_ser;
use fvm_shared::clock::ChainEpoch;
use fvm_shared::econ::TokenAmount;
use fvm_shared::sector::{SectorNumber, StoragePower};
use fvm_shared::ActorID;
use num_traits::Zero;

use spc_actors_runtime::runtime::Policy;
use spc_actors_runtime::{
    actor_error, ActorError, Map, MapKey, Set, SetMultimap, SetMultimapConfig,
    DEFAULT_HAMT_CONFIG,
};

use crate::balance_table::BalanceTable;
use crate::surprise::SweepUpdate;

pub type PowerTable<'a, BS> = Map<&'a BS, Address, PowerTableEntry>;
pub type ChallengeExpiryEvents<'a, BS> = SetMultimap<&'a BS, ChainEpoch, Address>;
pub type SectorExpiryEvents<'a, BS> = SetMultimap<&'a BS, ChainEpoch, SectorExpiryDescriptor>;
pub type SurpriseSweep<'a, BS> = Set<&'a BS, Address>;

/// Storage power actor state
#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug, PartialEq, Eq)]
pub struct State {
    #[serde(with = "bigint_ser")]
    pub total_active_power: StoragePower,
    #[serde(with = "bigint_ser")]
    pub total_inactive_power: StoragePower,

    pub miner_count: i64,
    /// Number of miners whose active power is at least the policy minimum.
    pub num_miners_meeting_min_power: i64,

    /// Power claimed by each registered miner.
    pub power_table: Cid, // HAMT[ID-address]PowerTableEntry
    /// Pledge collateral held for each registered miner.
    pub escrow_table: Cid, // HAMT[ID-address]TokenAmount

    /// Miners that must have answered a surprise challenge by the keyed epoch.
    pub challenge_expiry_events: Cid, // HAMT[epoch]HAMT-set[ID-address]
    /// Sectors that expire at the keyed epoch.
    pub sector_expiry_events: Cid, // HAMT[epoch]HAMT-set[SectorExpiryDescriptor]

    /// Miners already challenged in the current sweep over the power table.
    pub surprise_sweep: Cid, // HAMT-set[ID-address]
}

#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug, PartialEq, Eq, Default)]
pub struct PowerTableEntry {
    #[serde(with = "bigint_ser")]
    pub active_power: StoragePower,
    #[serde(with = "bigint_ser")]
    pub inactive_power: StoragePower,
}

/// A sector scheduled to expire, identified by its owning miner.
#[derive(Serialize_tuple, Deserialize_tuple, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SectorExpiryDescriptor {
    pub miner: ActorID,
    pub sector_number: SectorNumber,
}

impl MapKey for SectorExpiryDescriptor {
    fn from_bytes(b: &[u8]) -> Result<Self, String> {
        fvm_ipld_encoding::from_slice(b).map_err(|e| e.to_string())
    }

    fn to_bytes(&self) -> Result<Vec<u8>, String> {
        fvm_ipld_encoding::to_vec(self).map_err(|e| e.to_string())
    }
}

impl State {
    pub fn new<BS: Blockstore>(store: &BS) -> Result<State, ActorError> {
        let empty_map = PowerTable::flush_empty(store, DEFAULT_HAMT_CONFIG)?;
        let empty_escrow = BalanceTable::empty(store)?.root();
        let empty_challenges =
            ChallengeExpiryEvents::empty(store, SetMultimapConfig::default(), "challenges")
                .flush()?;
        let empty_sectors =
            SectorExpiryEvents::empty(store, SetMultimapConfig::default(), "sector expiries")
                .flush()?;
        let empty_sweep = SurpriseSweep::empty(store, DEFAULT_HAMT_CONFIG, "sweep").flush()?;

        Ok(State {
            total_active_power: StoragePower::zero(),
            total_inactive_power: StoragePower::zero(),
            miner_count: 0,
            num_miners_meeting_min_power: 0,
            power_table: empty_map,
            escrow_table: empty_escrow,
            challenge_expiry_events: empty_challenges,
            sector_expiry_events: empty_sectors,
            surprise_sweep: empty_sweep,
        })
    }

    pub fn load_power_table<'a, BS: Blockstore>(
        &self,
        store: &'a BS,
    ) -> Result<PowerTable<'a, BS>, ActorError> {
        PowerTable::load(store, &self.power_table, DEFAULT_HAMT_CONFIG, "power table")
    }

    pub fn escrow<'a, BS: Blockstore>(&self, store: &'a BS) -> BalanceTable<'a, BS> {
        BalanceTable::from_root(store, &self.escrow_table)
    }

    pub fn set_escrow<BS: Blockstore>(&mut self, table: &BalanceTable<BS>) {
        self.escrow_table = table.root();
    }

    pub fn get_power_entry<BS: Blockstore>(
        &self,
        store: &BS,
        miner: &Address,
    ) -> Result<Option<PowerTableEntry>, ActorError> {
        Ok(self.load_power_table(store)?.get(miner)?.cloned())
    }

    pub fn is_registered<BS: Blockstore>(
        &self,
        store: &BS,
        miner: &Address,
    ) -> Result<bool, ActorError> {
        self.load_power_table(store)?.contains_key(miner)
    }

    /// Registers a miner with zero power and an escrow balance of `initial_pledge`.
    pub fn add_miner<BS: Blockstore>(
        &mut self,
        store: &BS,
        miner: &Address,
        initial_pledge: &TokenAmount,
    ) -> Result<(), ActorError> {
        let mut power_table = self.load_power_table(store)?;
        if !power_table.set_if_absent(miner, PowerTableEntry::default())? {
            return Err(actor_error!(assertion_failed; "miner {} already registered", miner));
        }
        let escrow = self.escrow(store).with_new_address_entry(miner, initial_pledge)?;

        self.power_table = power_table.flush()?;
        self.set_escrow(&escrow);
        self.miner_count += 1;
        Ok(())
    }

    /// Removes a miner's power and escrow entries and drops it from the surprise sweep.
    /// Callers must have checked that both are zero.
    pub fn remove_miner<BS: Blockstore>(&mut self, store: &BS, miner: &Address) -> Result<(), ActorError> {
        let mut power_table = self.load_power_table(store)?;
        if power_table.delete(miner)?.is_none() {
            return Err(actor_error!(assertion_failed; "miner {} not registered", miner));
        }
        let escrow = self.escrow(store).with_deleted_address_entry(miner)?;

        let mut sweep = self.load_sweep(store)?;
        if sweep.delete(miner)? {
            self.surprise_sweep = sweep.flush()?;
        }

        self.power_table = power_table.flush()?;
        self.set_escrow(&escrow);
        self.miner_count -= 1;
        Ok(())
    }

    /// Replaces a registered miner's power, maintaining the network totals and the
    /// count of miners meeting the minimum power.
    pub fn set_power_entry<BS: Blockstore>(
        &mut self,
        policy: &Policy,
        store: &BS,
        miner: &Address,
        entry: PowerTableEntry,
    ) -> Result<(), ActorError> {
        let mut power_table = self.load_power_table(store)?;
        let old = power_table
            .get(miner)?
            .cloned()
            .ok_or_else(|| actor_error!(illegal_state; "miner {} not registered", miner))?;

        self.total_active_power += &entry.active_power - &old.active_power;
        self.total_inactive_power += &entry.inactive_power - &old.inactive_power;

        let was_above = old.active_power >= policy.minimum_miner_power;
        let is_above = entry.active_power >= policy.minimum_miner_power;
        if !was_above && is_above {
            self.num_miners_meeting_min_power += 1;
        } else if was_above && !is_above {
            self.num_miners_meeting_min_power -= 1;
        }

        power_table.set(miner, entry)?;
        self.power_table = power_table.flush()?;
        Ok(())
    }

    /// IDs of all registered miners in ascending order.
    pub fn registered_miners<BS: Blockstore>(&self, store: &BS) -> Result<Vec<ActorID>, ActorError> {
        let mut ids = self
            .load_power_table(store)?
            .keys()?
            .iter()
            .map(|addr| {
                addr.id().map_err(|_| actor_error!(illegal_state; "non-ID key {} in power table", addr))
            })
            .collect::<Result<Vec<_>, _>>()?;
        ids.sort_unstable();
        Ok(ids)
    }

    pub fn escrow_balance<BS: Blockstore>(
        &self,
        store: &BS,
        miner: &Address,
    ) -> Result<TokenAmount, ActorError> {
        self.escrow(store)
            .get(miner)?
            .ok_or_else(|| actor_error!(illegal_state; "no escrow entry for {}", miner))
    }

    pub fn load_sweep<'a, BS: Blockstore>(&self, store: &'a BS) -> Result<SurpriseSweep<'a, BS>, ActorError> {
        SurpriseSweep::load(store, &self.surprise_sweep, DEFAULT_HAMT_CONFIG, "sweep")
    }

    /// IDs of the miners already challenged in the current sweep.
    pub fn swept_miners<BS: Blockstore>(&self, store: &BS) -> Result<BTreeSet<ActorID>, ActorError> {
        self.load_sweep(store)?
            .collect_keys()?
            .iter()
            .map(|addr| {
                addr.id().map_err(|_| actor_error!(illegal_state; "non-ID key {} in sweep", addr))
            })
            .collect()
    }

    pub fn update_sweep<BS: Blockstore>(
        &mut self,
        store: &BS,
        update: &SweepUpdate,
    ) -> Result<(), ActorError> {
        let (mut sweep, added) = match update {
            SweepUpdate::Extend(added) => (self.load_sweep(store)?, added),
            SweepUpdate::Restart(added) => {
                (SurpriseSweep::empty(store, DEFAULT_HAMT_CONFIG, "sweep"), added)
            }
        };
        for id in added {
            sweep.put(&Address::new_id(*id))?;
        }
        self.surprise_sweep = sweep.flush()?;
        Ok(())
    }

    pub fn load_challenge_expiries<'a, BS: Blockstore>(
        &self,
        store: &'a BS,
    ) -> Result<ChallengeExpiryEvents<'a, BS>, ActorError> {
        ChallengeExpiryEvents::load(
            store,
            &self.challenge_expiry_events,
            SetMultimapConfig::default(),
            "challenges",
        )
    }

    pub fn load_sector_expiries<'a, BS: Blockstore>(
        &self,
        store: &'a BS,
    ) -> Result<SectorExpiryEvents<'a, BS>, ActorError> {
        SectorExpiryEvents::load(
            store,
            &self.sector_expiry_events,
            SetMultimapConfig::default(),
            "sector expiries",
        )
    }

    /// Records that each of `miners` must respond to a surprise challenge by `expiry`.
    pub fn add_challenge_expiries<BS: Blockstore>(
        &mut self,
        store: &BS,
        expiry: ChainEpoch,
        miners: &[Address],
    ) -> Result<(), ActorError> {
        let mut events = self.load_challenge_expiries(store)?;
        for miner in miners {
            events.put(&expiry, *miner)?;
        }
        self.challenge_expiry_events = events.flush()?;
        Ok(())
    }

    /// Removes `miner` from the challenge bucket at `expiry`. Returns whether it was there.
    pub fn clear_challenge_expiry<BS: Blockstore>(
        &mut self,
        store: &BS,
        expiry: ChainEpoch,
        miner: &Address,
    ) -> Result<bool, ActorError> {
        let mut events = self.load_challenge_expiries(store)?;
        if !events.remove(&expiry, miner)? {
            return Ok(false);
        }
        self.challenge_expiry_events = events.flush()?;
        Ok(true)
    }

    /// Deletes the challenge bucket at `epoch`, returning its miners.
    pub fn take_challenge_expiries<BS: Blockstore>(
        &mut self,
        store: &BS,
        epoch: ChainEpoch,
    ) -> Result<Vec<Address>, ActorError> {
        let mut events = self.load_challenge_expiries(store)?;
        let miners = events.remove_all(&epoch)?;
        if !miners.is_empty() {
            self.challenge_expiry_events = events.flush()?;
        }
        Ok(miners)
    }

    pub fn add_sector_expiry<BS: Blockstore>(
        &mut self,
        store: &BS,
        expiry: ChainEpoch,
        sector: SectorExpiryDescriptor,
    ) -> Result<(), ActorError> {
        let mut events = self.load_sector_expiries(store)?;
        events.put(&expiry, sector)?;
        self.sector_expiry_events = events.flush()?;
        Ok(())
    }

    /// Deletes the sector expiry bucket at `epoch`, returning its descriptors.
    pub fn take_sector_expiries<BS: Blockstore>(
        &mut self,
        store: &BS,
        epoch: ChainEpoch,
    ) -> Result<Vec<SectorExpiryDescriptor>, ActorError> {
        let mut events = self.load_sector_expiries(store)?;
        let sectors = events.remove_all(&epoch)?;
        if !sectors.is_empty() {
            self.sector_expiry_events = events.flush()?;
        }
        Ok(sectors)
    }
}
