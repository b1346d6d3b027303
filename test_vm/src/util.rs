// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_encoding::RawBytes;
use fvm_shared::address::{Address, BLS_PUB_LEN};
use fvm_shared::clock::ChainEpoch;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::sector::{SectorNumber, StoragePower};
use fvm_shared::{MethodNum, METHOD_SEND};
use num_traits::Zero;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use spc_actor_cron::Method as CronMethod;
use spc_actor_miner::{
    CommitSectorParams, DeclareFaultsParams, Method as MinerMethod, State as MinerState,
};
use spc_actor_power::testing::{
    check_state_invariants as check_power_invariants, StateSummary as PowerSummary,
};
use spc_actor_power::{
    AddBalanceParams, CreateStorageMinerParams, CreateStorageMinerReturn, Method as PowerMethod,
    State as PowerState,
};
use spc_actors_runtime::{MessageAccumulator, CRON_ACTOR_ADDR, INIT_ACTOR_ADDR};
use spc_actors_runtime::{STORAGE_POWER_ACTOR_ADDR, SYSTEM_ACTOR_ADDR};

use crate::{TestVM, TEST_FAUCET_ADDR};

// Generate count addresses by seeding an rng
pub fn pk_addrs_from(seed: u64, count: u64) -> Vec<Address> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count).map(|_| new_bls_from_rng(&mut rng)).collect()
}

// Generate nice 32 byte arrays sampled uniformly at random based off of a u64 seed
fn new_bls_from_rng(rng: &mut ChaCha8Rng) -> Address {
    let mut bytes = [0u8; BLS_PUB_LEN];
    rng.fill_bytes(&mut bytes);
    Address::new_bls(&bytes).unwrap()
}

pub const ACCOUNT_SEED: u64 = 93837778;

pub fn create_accounts(v: &TestVM, count: u64, balance: TokenAmount) -> Vec<Address> {
    create_accounts_seeded(v, count, balance, ACCOUNT_SEED)
}

pub fn create_accounts_seeded(
    v: &TestVM,
    count: u64,
    balance: TokenAmount,
    seed: u64,
) -> Vec<Address> {
    let pk_addrs = pk_addrs_from(seed, count);
    // Send funds from faucet to pk address, creating account actor
    for pk_addr in pk_addrs.iter() {
        apply_ok(v, &TEST_FAUCET_ADDR, pk_addr, &balance, METHOD_SEND, RawBytes::default());
    }
    // Normalize pk address to return id address of account actor
    pk_addrs.iter().map(|pk_addr| v.resolve_id_address(pk_addr).unwrap()).collect()
}

pub fn serialize<T: Serialize>(params: &T) -> RawBytes {
    RawBytes::serialize(params).unwrap()
}

pub fn apply_ok(
    v: &TestVM,
    from: &Address,
    to: &Address,
    value: &TokenAmount,
    method: MethodNum,
    params: RawBytes,
) -> RawBytes {
    apply_code(v, from, to, value, method, params, ExitCode::OK)
}

pub fn apply_code(
    v: &TestVM,
    from: &Address,
    to: &Address,
    value: &TokenAmount,
    method: MethodNum,
    params: RawBytes,
    code: ExitCode,
) -> RawBytes {
    let res = v.apply_message(from, to, value, method, params).unwrap();
    assert_eq!(code, res.code, "unexpected exit code: {}", res.message);
    res.ret
}

/// Creates a miner through the power actor. `value` becomes the miner's initial pledge.
pub fn create_miner(
    v: &TestVM,
    owner: &Address,
    worker: &Address,
    value: &TokenAmount,
) -> (Address, Address) {
    let params = CreateStorageMinerParams {
        owner: *owner,
        worker: *worker,
        peer_id: b"miner".to_vec(),
    };
    let ret: CreateStorageMinerReturn = apply_ok(
        v,
        owner,
        &STORAGE_POWER_ACTOR_ADDR,
        value,
        PowerMethod::CreateStorageMiner as MethodNum,
        serialize(&params),
    )
    .deserialize()
    .unwrap();
    (ret.id_address, ret.robust_address)
}

/// Deposits `amount` from `from` into the miner's pledge escrow.
pub fn add_pledge(v: &TestVM, from: &Address, miner: &Address, amount: &TokenAmount) {
    apply_ok(
        v,
        from,
        &STORAGE_POWER_ACTOR_ADDR,
        amount,
        PowerMethod::AddBalance as MethodNum,
        serialize(&AddBalanceParams { miner: *miner }),
    );
}

pub fn commit_sector(
    v: &TestVM,
    worker: &Address,
    miner: &Address,
    sector_number: SectorNumber,
    power: i64,
    expiration: ChainEpoch,
) {
    let params =
        CommitSectorParams { sector_number, power: StoragePower::from(power), expiration };
    apply_ok(
        v,
        worker,
        miner,
        &TokenAmount::zero(),
        MinerMethod::CommitSector as MethodNum,
        serialize(&params),
    );
}

pub fn declare_faults(v: &TestVM, worker: &Address, miner: &Address, sectors: Vec<SectorNumber>) {
    apply_ok(
        v,
        worker,
        miner,
        &TokenAmount::zero(),
        MinerMethod::DeclareFaults as MethodNum,
        serialize(&DeclareFaultsParams { sectors }),
    );
}

pub fn submit_surprise_post(v: &TestVM, worker: &Address, miner: &Address) {
    apply_ok(
        v,
        worker,
        miner,
        &TokenAmount::zero(),
        MinerMethod::SubmitSurprisePoStResponse as MethodNum,
        RawBytes::default(),
    );
}

/// Runs the implicit end-of-epoch cron message.
pub fn cron_tick(v: &TestVM) {
    let res = v
        .execute_message_implicit(
            &SYSTEM_ACTOR_ADDR,
            &CRON_ACTOR_ADDR,
            &TokenAmount::zero(),
            CronMethod::EpochTick as MethodNum,
            RawBytes::default(),
        )
        .unwrap();
    assert_eq!(ExitCode::OK, res.code, "cron tick failed: {}", res.message);
}

/// Moves to `epoch` and runs its cron tick.
pub fn advance_and_tick(v: &TestVM, epoch: ChainEpoch) {
    v.set_epoch(epoch);
    cron_tick(v);
}

pub fn power_state(v: &TestVM) -> PowerState {
    v.get_state(&STORAGE_POWER_ACTOR_ADDR).unwrap()
}

pub fn miner_state(v: &TestVM, miner: &Address) -> MinerState {
    v.get_state(miner).unwrap()
}

pub fn escrow_balance(v: &TestVM, miner: &Address) -> TokenAmount {
    power_state(v).escrow(&*v.store).get(miner).unwrap().unwrap_or_default()
}

/// Decoded power actor tables.
pub fn power_summary(v: &TestVM) -> PowerSummary {
    check_power_invariants(v.policy(), &power_state(v), &*v.store).0
}

/// Checks the state invariants of the power, init and cron actors.
pub fn check_invariants(v: &TestVM) -> MessageAccumulator {
    let acc = MessageAccumulator::default();

    let (_, power_acc) = check_power_invariants(v.policy(), &power_state(v), &*v.store);
    merge(&acc.with_prefix("power: "), &power_acc);

    let init: spc_actor_init::State = v.get_state(&INIT_ACTOR_ADDR).unwrap();
    let (_, init_acc) = spc_actor_init::testing::check_state_invariants(&init, &*v.store);
    merge(&acc.with_prefix("init: "), &init_acc);

    let cron: spc_actor_cron::State = v.get_state(&CRON_ACTOR_ADDR).unwrap();
    let (_, cron_acc) = spc_actor_cron::testing::check_state_invariants(&cron);
    merge(&acc.with_prefix("cron: "), &cron_acc);

    acc
}

fn merge(into: &MessageAccumulator, from: &MessageAccumulator) {
    from.messages().iter().for_each(|msg| into.add(msg));
}

pub fn assert_invariants(v: &TestVM) {
    check_invariants(v).assert_empty()
}
