// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_encoding::strict_bytes;
use fvm_ipld_encoding::tuple::*;
use fvm_shared::address::Address;
use fvm_shared::bigint::bigint_ser;
use fvm_shared::clock::ChainEpoch;
use fvm_shared::sector::{SectorNumber, StoragePower};
use num_traits::Zero;

use spc_actors_runtime::{actor_error, ActorError};

#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, PartialEq, Eq)]
pub struct MinerInfo {
    /// Account that owns the miner: receives withdrawn pledge.
    pub owner: Address,
    /// Account that commits sectors and answers challenges.
    pub worker: Address,
    #[serde(with = "strict_bytes")]
    pub peer_id: Vec<u8>,
}

#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, PartialEq, Eq)]
pub struct SectorOnChainInfo {
    pub sector_number: SectorNumber,
    #[serde(with = "bigint_ser")]
    pub power: StoragePower,
    pub expiration: ChainEpoch,
    pub faulty: bool,
}

/// An unanswered surprise PoSt challenge.
#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurpriseChallenge {
    pub challenge_epoch: ChainEpoch,
    pub expiry_epoch: ChainEpoch,
}

/// Power derived from a miner's sectors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MinerPower {
    pub active: StoragePower,
    pub inactive: StoragePower,
}

#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone)]
pub struct State {
    pub info: MinerInfo,
    /// Committed sectors in ascending sector number order.
    pub sectors: Vec<SectorOnChainInfo>,
    pub challenge: Option<SurpriseChallenge>,
}

impl State {
    pub fn new(info: MinerInfo) -> Self {
        Self { info, sectors: Vec::new(), challenge: None }
    }

    pub fn power(&self) -> MinerPower {
        self.sectors.iter().fold(MinerPower::default(), |mut power, sector| {
            if sector.faulty {
                power.inactive += &sector.power;
            } else {
                power.active += &sector.power;
            }
            power
        })
    }

    pub fn get_sector(&self, sector_number: SectorNumber) -> Option<&SectorOnChainInfo> {
        self.sectors
            .binary_search_by_key(&sector_number, |s| s.sector_number)
            .ok()
            .map(|i| &self.sectors[i])
    }

    pub fn add_sector(&mut self, sector: SectorOnChainInfo) -> Result<(), ActorError> {
        match self.sectors.binary_search_by_key(&sector.sector_number, |s| s.sector_number) {
            Ok(_) => Err(actor_error!(
                illegal_argument;
                "sector {} already committed",
                sector.sector_number
            )),
            Err(i) => {
                self.sectors.insert(i, sector);
                Ok(())
            }
        }
    }

    pub fn remove_sector(&mut self, sector_number: SectorNumber) -> Option<SectorOnChainInfo> {
        self.sectors
            .binary_search_by_key(&sector_number, |s| s.sector_number)
            .ok()
            .map(|i| self.sectors.remove(i))
    }

    /// Marks the given sectors faulty, returning the power they carried.
    /// Fails without changes if any sector is missing or already faulty.
    pub fn declare_faults(&mut self, sectors: &[SectorNumber]) -> Result<StoragePower, ActorError> {
        let mut indices = Vec::with_capacity(sectors.len());
        for number in sectors {
            let i = self
                .sectors
                .binary_search_by_key(number, |s| s.sector_number)
                .map_err(|_| actor_error!(not_found; "sector {} not committed", number))?;
            if self.sectors[i].faulty || indices.contains(&i) {
                return Err(actor_error!(illegal_argument; "sector {} already faulty", number));
            }
            indices.push(i);
        }

        let mut affected = StoragePower::zero();
        for i in indices {
            self.sectors[i].faulty = true;
            affected += &self.sectors[i].power;
        }
        Ok(affected)
    }

    /// Marks every sector faulty, returning the active power lost.
    pub fn fault_all(&mut self) -> StoragePower {
        let lost = self.power().active;
        for sector in self.sectors.iter_mut() {
            sector.faulty = true;
        }
        lost
    }
}
