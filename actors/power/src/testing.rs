// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::{BTreeMap, BTreeSet};

use fvm_ipld_blockstore::Blockstore;
use fvm_shared::address::Address;
use fvm_shared::clock::ChainEpoch;
use fvm_shared::econ::TokenAmount;
use fvm_shared::sector::StoragePower;
use num_traits::{Signed, Zero};

use spc_actors_runtime::{runtime::Policy, MessageAccumulator};

use crate::{PowerTableEntry, SectorExpiryDescriptor, State};

type EntriesByAddress = BTreeMap<Address, PowerTableEntry>;
type EscrowByAddress = BTreeMap<Address, TokenAmount>;

pub struct StateSummary {
    pub entries: EntriesByAddress,
    pub escrow: EscrowByAddress,
    pub challenges: BTreeMap<ChainEpoch, Vec<Address>>,
    pub sector_expiries: BTreeMap<ChainEpoch, Vec<SectorExpiryDescriptor>>,
}

/// Checks internal invariants of power state
pub fn check_state_invariants<BS: Blockstore>(
    policy: &Policy,
    state: &State,
    store: &BS,
) -> (StateSummary, MessageAccumulator) {
    let acc = MessageAccumulator::default();

    acc.require(
        !state.total_active_power.is_negative(),
        format!("total active power is negative {}", state.total_active_power),
    );
    acc.require(
        !state.total_inactive_power.is_negative(),
        format!("total inactive power is negative {}", state.total_inactive_power),
    );

    let entries = check_power_table_invariants(policy, state, store, &acc);
    let escrow = check_escrow_invariants(state, store, &entries, &acc);
    let challenges = check_challenge_invariants(state, store, &entries, &acc);
    let sector_expiries = check_sector_expiry_invariants(state, store, &acc);

    (StateSummary { entries, escrow, challenges, sector_expiries }, acc)
}

fn check_power_table_invariants<BS: Blockstore>(
    policy: &Policy,
    state: &State,
    store: &BS,
    acc: &MessageAccumulator,
) -> EntriesByAddress {
    let mut entries = EntriesByAddress::new();
    let mut active = StoragePower::zero();
    let mut inactive = StoragePower::zero();
    let mut meeting_min_power = 0;

    match state.load_power_table(store) {
        Ok(table) => {
            let ret = table.for_each(|addr, entry| {
                acc.require(addr.id().is_ok(), format!("power table key {addr} is not an ID address"));
                acc.require(
                    !entry.active_power.is_negative() && !entry.inactive_power.is_negative(),
                    format!("negative power for {addr}: {entry:?}"),
                );
                active += &entry.active_power;
                inactive += &entry.inactive_power;
                if entry.active_power >= policy.minimum_miner_power {
                    meeting_min_power += 1;
                }
                entries.insert(addr, entry.clone());
                Ok(())
            });
            acc.require_no_error(ret, "error iterating power table");
        }
        Err(e) => acc.add(format!("error loading power table: {e}")),
    }

    acc.require(
        active == state.total_active_power,
        format!("sum of active power {active} does not match recorded total {}", state.total_active_power),
    );
    acc.require(
        inactive == state.total_inactive_power,
        format!(
            "sum of inactive power {inactive} does not match recorded total {}",
            state.total_inactive_power
        ),
    );
    acc.require(
        entries.len() as i64 == state.miner_count,
        format!("power table has {} entries, miner count is {}", entries.len(), state.miner_count),
    );
    acc.require(
        meeting_min_power == state.num_miners_meeting_min_power,
        format!(
            "{meeting_min_power} miners meet the minimum power, recorded {}",
            state.num_miners_meeting_min_power
        ),
    );
    entries
}

fn check_escrow_invariants<BS: Blockstore>(
    state: &State,
    store: &BS,
    entries: &EntriesByAddress,
    acc: &MessageAccumulator,
) -> EscrowByAddress {
    let mut escrow = EscrowByAddress::new();
    let table = state.escrow(store);
    for addr in entries.keys() {
        match table.get(addr) {
            Ok(Some(balance)) => {
                acc.require(!balance.is_negative(), format!("negative escrow for {addr}: {balance}"));
                escrow.insert(*addr, balance);
            }
            Ok(None) => acc.add(format!("registered miner {addr} has no escrow entry")),
            Err(e) => acc.add(format!("error reading escrow for {addr}: {e}")),
        }
    }
    match table.total() {
        Ok(total) => {
            let summed = escrow.values().fold(TokenAmount::zero(), |sum, b| sum + b);
            acc.require(total == summed, format!("escrow holds {total} for unregistered miners"));
        }
        Err(e) => acc.add(format!("error totalling escrow: {e}")),
    }
    escrow
}

fn check_challenge_invariants<BS: Blockstore>(
    state: &State,
    store: &BS,
    entries: &EntriesByAddress,
    acc: &MessageAccumulator,
) -> BTreeMap<ChainEpoch, Vec<Address>> {
    let mut by_epoch = BTreeMap::new();
    match state.load_challenge_expiries(store) {
        Ok(events) => {
            let mut epochs = Vec::new();
            let ret = events.for_each(|epoch, _| {
                epochs.push(epoch);
                Ok(())
            });
            acc.require_no_error(ret, "error iterating challenge expiries");
            for epoch in epochs {
                match events.get(&epoch).and_then(|set| match set {
                    Some(set) => set.collect_keys(),
                    None => Ok(Vec::new()),
                }) {
                    Ok(mut miners) => {
                        acc.require(!miners.is_empty(), format!("empty challenge bucket at {epoch}"));
                        miners.sort_by_key(|a| a.id().ok());
                        by_epoch.insert(epoch, miners);
                    }
                    Err(e) => acc.add(format!("error reading challenges at {epoch}: {e}")),
                }
            }
        }
        Err(e) => acc.add(format!("error loading challenge expiries: {e}")),
    }

    match state.swept_miners(store) {
        Ok(swept) => {
            let registered: BTreeSet<u64> = entries.keys().filter_map(|a| a.id().ok()).collect();
            for id in swept.difference(&registered) {
                acc.add(format!("swept miner {id} is not registered"));
            }
        }
        Err(e) => acc.add(format!("error loading surprise sweep: {e}")),
    }
    by_epoch
}

fn check_sector_expiry_invariants<BS: Blockstore>(
    state: &State,
    store: &BS,
    acc: &MessageAccumulator,
) -> BTreeMap<ChainEpoch, Vec<SectorExpiryDescriptor>> {
    let mut by_epoch = BTreeMap::new();
    match state.load_sector_expiries(store) {
        Ok(events) => {
            let mut epochs = Vec::new();
            let ret = events.for_each(|epoch, _| {
                epochs.push(epoch);
                Ok(())
            });
            acc.require_no_error(ret, "error iterating sector expiries");
            for epoch in epochs {
                let mut sectors = Vec::new();
                let ret = events.for_each_in(&epoch, |sector| {
                    sectors.push(sector);
                    Ok(())
                });
                acc.require_no_error(ret, format!("error reading sector expiries at {epoch}"));
                acc.require(!sectors.is_empty(), format!("empty sector expiry bucket at {epoch}"));
                sectors.sort_unstable();
                by_epoch.insert(epoch, sectors);
            }
        }
        Err(e) => acc.add(format!("error loading sector expiries: {e}")),
    }
    by_epoch
}
