// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;
use num_traits::{Signed, Zero};

use spc_actors_runtime::{actor_error, ActorError, Map, DEFAULT_HAMT_CONFIG};

type BalanceMap<'a, BS> = Map<&'a BS, Address, TokenAmount>;

/// Per-address token balances held as a HAMT root.
///
/// The table is a value: every update writes a new root and returns a new table,
/// leaving the receiver (and the blocks it refers to) untouched. A failed update
/// therefore never leaves a partially modified table behind.
pub struct BalanceTable<'a, BS: Blockstore> {
    root: Cid,
    store: &'a BS,
}

impl<'a, BS: Blockstore> BalanceTable<'a, BS> {
    /// Writes an empty table to the store.
    pub fn empty(store: &'a BS) -> Result<Self, ActorError> {
        let root = BalanceMap::flush_empty(store, DEFAULT_HAMT_CONFIG)?;
        Ok(Self { root, store })
    }

    pub fn from_root(store: &'a BS, root: &Cid) -> Self {
        Self { root: *root, store }
    }

    pub fn root(&self) -> Cid {
        self.root
    }

    fn load(&self) -> Result<BalanceMap<'a, BS>, ActorError> {
        BalanceMap::load(self.store, &self.root, DEFAULT_HAMT_CONFIG, "balance table")
    }

    fn with_map(&self, mut map: BalanceMap<'a, BS>) -> Result<Self, ActorError> {
        Ok(Self { root: map.flush()?, store: self.store })
    }

    /// Returns the balance of `key`, or `None` if it has no entry.
    pub fn get(&self, key: &Address) -> Result<Option<TokenAmount>, ActorError> {
        Ok(self.load()?.get(key)?.cloned())
    }

    /// Sum of all balances.
    pub fn total(&self) -> Result<TokenAmount, ActorError> {
        let mut total = TokenAmount::zero();
        self.load()?.for_each(|_, v| {
            total += v;
            Ok(())
        })?;
        Ok(total)
    }

    /// Adds `amount` to the entry for `key`, creating it if absent.
    /// Returns `None` for a negative amount.
    pub fn with_add(&self, key: &Address, amount: &TokenAmount) -> Result<Option<Self>, ActorError> {
        if amount.is_negative() {
            return Ok(None);
        }
        let mut map = self.load()?;
        let prev = map.get(key)?.cloned().unwrap_or_default();
        map.set(key, prev + amount)?;
        Ok(Some(self.with_map(map)?))
    }

    /// Extracts as much of `requested` as possible while leaving at least `min_balance`
    /// behind. An entry already below `min_balance` yields nothing.
    /// Returns `None` if the entry is absent or `requested` is negative.
    pub fn with_extract_partial(
        &self,
        key: &Address,
        requested: &TokenAmount,
        min_balance: &TokenAmount,
    ) -> Result<Option<(Self, TokenAmount)>, ActorError> {
        if requested.is_negative() {
            return Ok(None);
        }
        let mut map = self.load()?;
        let prev = match map.get(key)? {
            Some(prev) => prev.clone(),
            None => return Ok(None),
        };
        let available = std::cmp::max(&prev - min_balance, TokenAmount::zero());
        let extracted = std::cmp::min(requested.clone(), available);
        map.set(key, &prev - &extracted)?;
        Ok(Some((self.with_map(map)?, extracted)))
    }

    /// Deducts up to `amount` from the entry for `key`, never going below zero.
    /// Returns the new table and the amount actually deducted.
    pub fn with_subtract_clamped(
        &self,
        key: &Address,
        amount: &TokenAmount,
    ) -> Result<(Self, TokenAmount), ActorError> {
        let mut map = self.load()?;
        let prev = map
            .get(key)?
            .cloned()
            .ok_or_else(|| actor_error!(assertion_failed; "no balance entry for {}", key))?;
        let subtracted = std::cmp::max(std::cmp::min(amount.clone(), prev.clone()), TokenAmount::zero());
        map.set(key, prev - &subtracted)?;
        Ok((self.with_map(map)?, subtracted))
    }

    /// Inserts `initial` as the balance of a new key. An existing entry is an internal error.
    pub fn with_new_address_entry(
        &self,
        key: &Address,
        initial: &TokenAmount,
    ) -> Result<Self, ActorError> {
        let mut map = self.load()?;
        if !map.set_if_absent(key, initial.clone())? {
            return Err(actor_error!(assertion_failed; "balance entry for {} already exists", key));
        }
        self.with_map(map)
    }

    /// Removes the entry for `key`. A missing entry is an internal error.
    pub fn with_deleted_address_entry(&self, key: &Address) -> Result<Self, ActorError> {
        let mut map = self.load()?;
        if map.delete(key)?.is_none() {
            return Err(actor_error!(assertion_failed; "no balance entry for {} to delete", key));
        }
        self.with_map(map)
    }

    /// Whether the entry for `key` holds at least `required`.
    /// Returns `None` if there is no entry.
    pub fn is_entry_sufficient(
        &self,
        key: &Address,
        required: &TokenAmount,
    ) -> Result<Option<bool>, ActorError> {
        Ok(self.get(key)?.map(|balance| &balance >= required))
    }
}
