// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Deterministic selection of miners for surprise proof-of-spacetime challenges.
//!
//! Selection walks a sweep over the power table: a miner is not drawn again until
//! every registered miner has been drawn once. With `challenge_count` miners drawn
//! per epoch, each registered miner is challenged at least once per proving period.

use std::collections::BTreeSet;

use fvm_shared::clock::ChainEpoch;
use fvm_shared::randomness::RANDOMNESS_LENGTH;
use fvm_shared::ActorID;

/// Number of miners challenged per epoch: `ceil(miners / proving_period)`.
pub fn challenge_count(miners: usize, proving_period: ChainEpoch) -> usize {
    let period = std::cmp::max(proving_period, 1) as usize;
    (miners + period - 1) / period
}

/// How the surprise sweep changes after a selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepUpdate {
    /// Add these miners to the current sweep.
    Extend(Vec<ActorID>),
    /// The sweep completed; start a new one containing only these miners.
    Restart(Vec<ActorID>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Selected miners in ascending ID order.
    pub selected: Vec<ActorID>,
    pub sweep: SweepUpdate,
}

/// Selects `count` distinct miners from `registered` (ascending IDs), preferring miners
/// not yet in `swept`.
///
/// If fewer than `count` miners remain unswept, all of them are selected, the sweep
/// restarts, and the shortfall is drawn from the other registered miners.
pub fn select_miners_to_surprise<H>(
    hasher: H,
    registered: &[ActorID],
    swept: &BTreeSet<ActorID>,
    count: usize,
    seed: &[u8; RANDOMNESS_LENGTH],
) -> Selection
where
    H: Fn(&[u8]) -> [u8; 32],
{
    let count = std::cmp::min(count, registered.len());
    let (unswept, others): (Vec<ActorID>, Vec<ActorID>) =
        registered.iter().partition(|id| !swept.contains(*id));

    let (mut selected, sweep) = if unswept.len() >= count {
        let drawn = draw_without_replacement(&hasher, unswept, count, seed);
        (drawn.clone(), SweepUpdate::Extend(drawn))
    } else {
        let shortfall = count - unswept.len();
        let drawn = draw_without_replacement(&hasher, others, shortfall, seed);
        let mut selected = unswept;
        selected.extend_from_slice(&drawn);
        (selected, SweepUpdate::Restart(drawn))
    };
    selected.sort_unstable();
    Selection { selected, sweep }
}

/// Partial seeded Fisher-Yates shuffle returning the first `k` elements.
///
/// Position `i` swaps with `i + r % (len - i)` where `r` is the big-endian u64 prefix of
/// `hash(seed || i as u64 big-endian)`.
pub fn draw_without_replacement<H>(
    hasher: H,
    mut candidates: Vec<ActorID>,
    k: usize,
    seed: &[u8; RANDOMNESS_LENGTH],
) -> Vec<ActorID>
where
    H: Fn(&[u8]) -> [u8; 32],
{
    let k = std::cmp::min(k, candidates.len());
    let len = candidates.len();
    let mut buf = Vec::with_capacity(RANDOMNESS_LENGTH + 8);
    for i in 0..k {
        buf.clear();
        buf.extend_from_slice(seed);
        buf.extend_from_slice(&(i as u64).to_be_bytes());
        let digest = hasher(&buf);
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        let r = u64::from_be_bytes(prefix);
        let j = i + (r % (len - i) as u64) as usize;
        candidates.swap(i, j);
    }
    candidates.truncate(k);
    candidates
}
