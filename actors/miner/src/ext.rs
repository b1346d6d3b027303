// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_encoding::tuple::*;
use fvm_shared::address::Address;
use fvm_shared::bigint::bigint_ser;
use fvm_shared::clock::ChainEpoch;
use fvm_shared::econ::TokenAmount;
use fvm_shared::sector::{SectorNumber, StoragePower};

pub mod power {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_repr::{Deserialize_repr, Serialize_repr};

    pub const WITHDRAW_BALANCE_METHOD: u64 = 3;
    pub const ENSURE_PLEDGE_COLLATERAL_SATISFIED_METHOD: u64 = 6;
    pub const PROCESS_POWER_REPORT_METHOD: u64 = 7;
    pub const SLASH_PLEDGE_FOR_STORAGE_FAULT_METHOD: u64 = 8;
    pub const ENROLL_SECTOR_EXPIRY_METHOD: u64 = 9;
    pub const CLEAR_SURPRISE_POST_CHALLENGE_METHOD: u64 = 10;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
    #[repr(u8)]
    pub enum StorageFaultType {
        Declared = 1,
        Detected = 2,
        Terminated = 3,
    }

    #[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, PartialEq, Eq)]
    pub struct WithdrawBalanceParams {
        pub miner: Address,
        pub requested: TokenAmount,
    }

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
    #[serde(transparent)]
    pub struct WithdrawBalanceReturn {
        pub amount_withdrawn: TokenAmount,
    }

    #[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, PartialEq, Eq)]
    pub struct ProcessPowerReportParams {
        #[serde(with = "bigint_ser")]
        pub active_power: StoragePower,
        #[serde(with = "bigint_ser")]
        pub inactive_power: StoragePower,
    }

    #[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, PartialEq, Eq)]
    pub struct SlashPledgeForStorageFaultParams {
        #[serde(with = "bigint_ser")]
        pub affected_power: StoragePower,
        pub fault_type: StorageFaultType,
    }

    #[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, PartialEq, Eq)]
    pub struct EnrollSectorExpiryParams {
        pub sector_number: SectorNumber,
        pub expiry_epoch: ChainEpoch,
    }

    #[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, PartialEq, Eq)]
    pub struct ClearSurprisePoStChallengeParams {
        pub expiry_epoch: ChainEpoch,
    }
}
