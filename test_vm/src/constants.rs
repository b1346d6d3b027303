// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_shared::address::Address;
use fvm_shared::ActorID;

use spc_actors_runtime::FIRST_NON_SINGLETON_ADDR;

pub const TEST_NETWORK_NAME: &str = "spc-testnet";

// account keys seeded by new_with_singletons
pub const BURNT_FUNDS_KEY: &[u8] = &[99; fvm_shared::address::BLS_PUB_LEN];
pub const FAUCET_ROOT_KEY: &[u8] = &[153; fvm_shared::address::BLS_PUB_LEN];
pub const TEST_FAUCET_ADDR: Address = Address::new_id(FIRST_NON_SINGLETON_ADDR);
pub const FIRST_TEST_USER_ADDR: ActorID = FIRST_NON_SINGLETON_ADDR + 1;

/// Whole tokens minted into the faucet at genesis.
pub const FAUCET_SUPPLY: i64 = 1_000_000_000;

// static values for predictable testing
pub const TEST_VM_RAND_SEED: u64 = 0x5eed_0f_c0ffee;
pub const TEST_VM_INVALID_POST: &str = "i_am_invalid_post";
pub const TEST_VM_INVALID_SIGNATURE: &[u8] = b"i_am_invalid_signature";
