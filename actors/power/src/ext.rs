// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_ipld_encoding::tuple::*;
use fvm_ipld_encoding::{strict_bytes, RawBytes};
use fvm_shared::address::Address;

pub mod init {
    use super::*;

    pub const EXEC_METHOD: u64 = 2;

    /// Init actor Exec Params
    #[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, PartialEq, Eq)]
    pub struct ExecParams {
        pub code_cid: Cid,
        pub constructor_params: RawBytes,
    }

    /// Init actor Exec Return value
    #[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, PartialEq, Eq)]
    pub struct ExecReturn {
        /// ID based address for created actor
        pub id_address: Address,
        /// Reorg safe address for actor
        pub robust_address: Address,
    }
}

pub mod miner {
    use super::*;
    use fvm_shared::clock::ChainEpoch;
    use fvm_shared::sector::SectorNumber;

    pub const SURPRISE_POST_CHALLENGE_METHOD: u64 = 2;
    pub const UPDATE_SURPRISE_POST_STATE_METHOD: u64 = 4;
    pub const ON_SECTOR_EXPIRY_METHOD: u64 = 5;

    #[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, PartialEq, Eq)]
    pub struct MinerConstructorParams {
        pub owner: Address,
        pub worker: Address,
        #[serde(with = "strict_bytes")]
        pub peer_id: Vec<u8>,
    }

    #[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, PartialEq, Eq)]
    pub struct SurprisePoStChallengeParams {
        pub challenge_epoch: ChainEpoch,
        /// Epoch at which an unanswered challenge is treated as a detected fault.
        pub expiry_epoch: ChainEpoch,
    }

    #[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, PartialEq, Eq)]
    pub struct OnSectorExpiryParams {
        pub sector_number: SectorNumber,
    }
}
