// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_shared::bigint::{bigint_ser, BigInt};
use fvm_shared::clock::ChainEpoch;
use fvm_shared::econ::TokenAmount;
use fvm_shared::sector::StoragePower;
use serde::{Deserialize, Serialize};

pub trait RuntimePolicy {
    fn policy(&self) -> &Policy;
}

/// The policy itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Number of epochs over which every registered miner is challenged exactly once.
    pub proving_period: ChainEpoch,
    /// Epochs a challenged miner has to answer before its challenge expires.
    pub max_surprise_post_response_period: ChainEpoch,

    /// Consensus faults reported more than this many epochs after the fault are rejected.
    pub consensus_fault_max_age: ChainEpoch,
    /// Share of a consensus fault slash paid to the reporter.
    pub consensus_fault_reporter_share_percent: u64,

    /// Minimum active power for a miner to count towards the min-power set.
    #[serde(with = "bigint_ser")]
    pub minimum_miner_power: StoragePower,

    /// Pledge required per byte of active power.
    pub active_pledge_per_byte: TokenAmount,
    /// Pledge required per byte of inactive power.
    pub inactive_pledge_per_byte: TokenAmount,
}

impl Default for Policy {
    fn default() -> Policy {
        Policy {
            proving_period: policy_constants::PROVING_PERIOD,
            max_surprise_post_response_period: policy_constants::MAX_SURPRISE_POST_RESPONSE_PERIOD,
            consensus_fault_max_age: policy_constants::CONSENSUS_FAULT_MAX_AGE,
            consensus_fault_reporter_share_percent:
                policy_constants::CONSENSUS_FAULT_REPORTER_SHARE_PERCENT,
            minimum_miner_power: StoragePower::from(policy_constants::MINIMUM_MINER_POWER),
            active_pledge_per_byte: TokenAmount::from_atto(BigInt::from(
                policy_constants::ACTIVE_PLEDGE_PER_BYTE,
            )),
            inactive_pledge_per_byte: TokenAmount::from_atto(BigInt::from(
                policy_constants::INACTIVE_PLEDGE_PER_BYTE,
            )),
        }
    }
}

pub mod policy_constants {
    use fvm_shared::clock::ChainEpoch;

    #[cfg(not(feature = "short-proving-period"))]
    pub const PROVING_PERIOD: ChainEpoch = 2;
    #[cfg(feature = "short-proving-period")]
    pub const PROVING_PERIOD: ChainEpoch = 1;

    pub const MAX_SURPRISE_POST_RESPONSE_PERIOD: ChainEpoch = 4;

    pub const CONSENSUS_FAULT_MAX_AGE: ChainEpoch = 900;
    pub const CONSENSUS_FAULT_REPORTER_SHARE_PERCENT: u64 = 10;

    /// 1 KiB
    pub const MINIMUM_MINER_POWER: u64 = 1 << 10;

    // Pledge in atto per byte.
    pub const ACTIVE_PLEDGE_PER_BYTE: u64 = 10;
    pub const INACTIVE_PLEDGE_PER_BYTE: u64 = 1;
}
