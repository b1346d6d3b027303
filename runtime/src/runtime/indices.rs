// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_shared::bigint::BigInt;
use fvm_shared::econ::TokenAmount;
use fvm_shared::sector::StoragePower;
use num_traits::Zero;

use super::Policy;

/// Network-wide economic parameters consulted by the power actor when sizing pledge
/// requirements and penalties.
pub trait EconomicIndices {
    /// Pledge a miner must hold in escrow to back the given power.
    fn pledge_collateral_requirement(
        &self,
        active_power: &StoragePower,
        inactive_power: &StoragePower,
        current_pledge: &TokenAmount,
    ) -> TokenAmount;

    /// Portion of a miner's pledge attributable to `affected_power`, before any
    /// fault-specific percentage is applied.
    fn pledge_slash_for_storage_fault(
        &self,
        affected_power: &StoragePower,
        active_power: &StoragePower,
        inactive_power: &StoragePower,
        current_pledge: &TokenAmount,
    ) -> TokenAmount;
}

/// Pledge linear in power, priced per byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearIndices {
    pub active_pledge_per_byte: TokenAmount,
    pub inactive_pledge_per_byte: TokenAmount,
}

impl LinearIndices {
    pub fn from_policy(policy: &Policy) -> Self {
        Self {
            active_pledge_per_byte: policy.active_pledge_per_byte.clone(),
            inactive_pledge_per_byte: policy.inactive_pledge_per_byte.clone(),
        }
    }
}

impl Default for LinearIndices {
    fn default() -> Self {
        Self::from_policy(&Policy::default())
    }
}

impl EconomicIndices for LinearIndices {
    fn pledge_collateral_requirement(
        &self,
        active_power: &StoragePower,
        inactive_power: &StoragePower,
        _current_pledge: &TokenAmount,
    ) -> TokenAmount {
        TokenAmount::from_atto(
            self.active_pledge_per_byte.atto() * active_power
                + self.inactive_pledge_per_byte.atto() * inactive_power,
        )
    }

    fn pledge_slash_for_storage_fault(
        &self,
        affected_power: &StoragePower,
        active_power: &StoragePower,
        inactive_power: &StoragePower,
        current_pledge: &TokenAmount,
    ) -> TokenAmount {
        let total: BigInt = active_power + inactive_power;
        if total.is_zero() {
            return TokenAmount::zero();
        }
        let affected = std::cmp::min(affected_power, &total);
        TokenAmount::from_atto(current_pledge.atto() * affected / total)
    }
}
