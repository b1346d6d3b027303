// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use num_derive::FromPrimitive;

/// Identifies the builtin actor kinds. The runtime resolves an actor's stored code CID
/// to one of these when dispatching.
#[derive(PartialEq, Eq, Clone, Copy, PartialOrd, Ord, FromPrimitive, Debug, Hash)]
#[repr(i32)]
pub enum Type {
    System = 1,
    Init = 2,
    Cron = 3,
    Account = 4,
    Power = 5,
    Miner = 6,
}

impl Type {
    pub const fn name(&self) -> &'static str {
        match *self {
            Type::System => "system",
            Type::Init => "init",
            Type::Cron => "cron",
            Type::Account => "account",
            Type::Power => "storagepower",
            Type::Miner => "storageminer",
        }
    }

    /// Whether actors of this kind exist once per chain at a fixed address.
    pub const fn is_singleton(&self) -> bool {
        matches!(self, Type::System | Type::Init | Type::Cron | Type::Power)
    }
}
