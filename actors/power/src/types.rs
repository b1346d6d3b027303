// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_encoding::strict_bytes;
use fvm_ipld_encoding::tuple::*;
use fvm_shared::address::Address;
use fvm_shared::bigint::bigint_ser;
use fvm_shared::clock::ChainEpoch;
use fvm_shared::econ::TokenAmount;
use fvm_shared::sector::{SectorNumber, StoragePower};
use serde::{Deserialize, Serialize};

use crate::StorageFaultType;

#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, Eq, PartialEq)]
pub struct AddBalanceParams {
    pub miner: Address,
}

#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, Eq, PartialEq)]
pub struct WithdrawBalanceParams {
    pub miner: Address,
    pub requested: TokenAmount,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Default)]
#[serde(transparent)]
pub struct WithdrawBalanceReturn {
    pub amount_withdrawn: TokenAmount,
}

#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, Eq, PartialEq)]
pub struct CreateStorageMinerParams {
    pub owner: Address,
    pub worker: Address,
    #[serde(with = "strict_bytes")]
    pub peer_id: Vec<u8>,
}

#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, Eq, PartialEq)]
pub struct CreateStorageMinerReturn {
    /// Canonical ID-based address for the actor.
    pub id_address: Address,
    /// Re-org safe address for created actor.
    pub robust_address: Address,
}

#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, Eq, PartialEq)]
pub struct ProcessPowerReportParams {
    #[serde(with = "bigint_ser")]
    pub active_power: StoragePower,
    #[serde(with = "bigint_ser")]
    pub inactive_power: StoragePower,
}

#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, Eq, PartialEq)]
pub struct SlashPledgeForStorageFaultParams {
    #[serde(with = "bigint_ser")]
    pub affected_power: StoragePower,
    pub fault_type: StorageFaultType,
}

#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, Eq, PartialEq)]
pub struct EnrollSectorExpiryParams {
    pub sector_number: SectorNumber,
    pub expiry_epoch: ChainEpoch,
}

#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, Eq, PartialEq)]
pub struct ClearSurprisePoStChallengeParams {
    pub expiry_epoch: ChainEpoch,
}

#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, Eq, PartialEq)]
pub struct ReportConsensusFaultParams {
    #[serde(with = "strict_bytes")]
    pub block_header_1: Vec<u8>,
    #[serde(with = "strict_bytes")]
    pub block_header_2: Vec<u8>,
    #[serde(with = "strict_bytes")]
    pub block_header_extra: Vec<u8>,
}

#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, Eq, PartialEq)]
pub struct ReportConsensusFaultReturn {
    /// Total removed from the faulty miner's escrow.
    pub slashed: TokenAmount,
    /// Portion of `slashed` paid to the reporter. The rest is burnt.
    pub reward: TokenAmount,
}
