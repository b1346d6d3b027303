// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::marker::PhantomData;

use cid::Cid;
use fvm_ipld_blockstore::Blockstore;

use crate::{ActorError, Config, Map, MapKey, DEFAULT_HAMT_CONFIG};

use super::Set;

#[derive(Clone, Debug)]
pub struct SetMultimapConfig {
    pub outer: Config,
    pub inner: Config,
}

impl Default for SetMultimapConfig {
    fn default() -> Self {
        Self { outer: DEFAULT_HAMT_CONFIG, inner: DEFAULT_HAMT_CONFIG }
    }
}

/// SetMultimap is a hamt whose values are hamt sets.
///
/// A key is present only while its set is non-empty: removing the last member of a set
/// removes the key.
pub struct SetMultimap<BS, K, V>
where
    BS: Blockstore,
    K: MapKey,
    V: MapKey,
{
    outer: Map<BS, K, Cid>,
    inner_config: Config,
    value_type: PhantomData<V>,
}

impl<BS, K, V> SetMultimap<BS, K, V>
where
    BS: Blockstore + Clone,
    K: MapKey,
    V: MapKey,
{
    pub fn empty(bs: BS, config: SetMultimapConfig, name: &'static str) -> Self {
        Self {
            outer: Map::empty(bs, config.outer, name),
            inner_config: config.inner,
            value_type: Default::default(),
        }
    }

    /// Initializes a SetMultimap from a root Cid.
    pub fn load(
        bs: BS,
        root: &Cid,
        config: SetMultimapConfig,
        name: &'static str,
    ) -> Result<Self, ActorError> {
        Ok(Self {
            outer: Map::load(bs, root, config.outer, name)?,
            inner_config: config.inner,
            value_type: Default::default(),
        })
    }

    #[inline]
    pub fn flush(&mut self) -> Result<Cid, ActorError> {
        self.outer.flush()
    }

    pub fn is_empty(&self) -> bool {
        self.outer.is_empty()
    }

    /// Adds a value to the set at `key`, creating the set on first insert.
    pub fn put(&mut self, key: &K, value: V) -> Result<(), ActorError> {
        let mut set = self.get(key)?.unwrap_or_else(|| {
            Set::empty(self.outer.store().clone(), self.inner_config.clone(), "multimap inner")
        });

        set.put(&value)?;

        let new_root = set.flush()?;
        self.outer.set(key, new_root)?;
        Ok(())
    }

    /// Gets the set at the given key.
    #[inline]
    pub fn get(&self, key: &K) -> Result<Option<Set<BS, V>>, ActorError> {
        match self.outer.get(key)? {
            Some(cid) => Ok(Some(Set::load(
                self.outer.store().clone(),
                cid,
                self.inner_config.clone(),
                "multimap inner",
            )?)),
            None => Ok(None),
        }
    }

    /// Removes a value from the set at `key`, dropping the key if the set becomes empty.
    /// Returns whether the value was present.
    pub fn remove(&mut self, key: &K, v: &V) -> Result<bool, ActorError> {
        let mut set = match self.get(key)? {
            Some(s) => s,
            None => return Ok(false),
        };

        if !set.delete(v)? {
            return Ok(false);
        }

        if set.is_empty() {
            self.outer.delete(key)?;
        } else {
            let new_root = set.flush()?;
            self.outer.set(key, new_root)?;
        }
        Ok(true)
    }

    /// Removes the whole set at `key`, returning its members.
    pub fn remove_all(&mut self, key: &K) -> Result<Vec<V>, ActorError> {
        let members = match self.get(key)? {
            Some(set) => set.collect_keys()?,
            None => return Ok(Vec::new()),
        };
        self.outer.delete(key)?;
        Ok(members)
    }

    /// Iterates over all keys and their set roots.
    pub fn for_each<F>(&self, mut f: F) -> Result<(), ActorError>
    where
        F: FnMut(K, &Cid) -> Result<(), ActorError>,
    {
        self.outer.for_each(|k, v| f(k, v))
    }

    /// Iterates values for a key.
    pub fn for_each_in<F>(&self, key: &K, f: F) -> Result<(), ActorError>
    where
        F: FnMut(V) -> Result<(), ActorError>,
    {
        let set = match self.get(key)? {
            Some(s) => s,
            None => return Ok(()),
        };

        set.for_each(f)
    }
}
