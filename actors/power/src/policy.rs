// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_shared::bigint::BigInt;
use fvm_shared::econ::TokenAmount;
use num_derive::FromPrimitive;
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Share of a faulty miner's escrow slashed for a verified consensus fault.
pub const CONSENSUS_FAULT_SLASH_PERCENT: u64 = 100;

/// Kind of storage fault reported by a miner against itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, FromPrimitive, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum StorageFaultType {
    /// Announced by the miner ahead of a missed proof.
    Declared = 1,
    /// Found by the network when a surprise challenge went unanswered.
    Detected = 2,
    /// Sector terminated before its committed expiration.
    Terminated = 3,
}

impl StorageFaultType {
    /// Percentage of the affected pledge slashed for this fault.
    pub const fn slash_percent(&self) -> u64 {
        match self {
            StorageFaultType::Declared => 1,
            StorageFaultType::Detected => 10,
            StorageFaultType::Terminated => 100,
        }
    }
}

/// `amount * percent / 100`, rounding toward zero.
pub fn percent_of(amount: &TokenAmount, percent: u64) -> TokenAmount {
    TokenAmount::from_atto(amount.atto() * BigInt::from(percent) / BigInt::from(100u64))
}

/// Penalty for a storage fault given the pledge attributable to the affected power.
pub fn storage_fault_slash(affected_pledge: &TokenAmount, fault: StorageFaultType) -> TokenAmount {
    percent_of(affected_pledge, fault.slash_percent())
}
