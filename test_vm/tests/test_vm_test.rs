// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::rc::Rc;

use fvm_ipld_blockstore::MemoryBlockstore;
use fvm_ipld_encoding::RawBytes;
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::{MethodNum, METHOD_SEND};
use num_traits::Zero;

use spc_actor_account::Method as AccountMethod;
use spc_actor_power::{AddBalanceParams, Method as PowerMethod};
use spc_actors_runtime::runtime::DomainSeparationTag;
use spc_actors_runtime::{BURNT_FUNDS_ACTOR_ADDR, STORAGE_POWER_ACTOR_ADDR};
use spc_test_vm::util::{
    apply_code, apply_ok, assert_invariants, create_accounts, pk_addrs_from, serialize, ACCOUNT_SEED,
};
use spc_test_vm::{TestVM, BURNT_FUNDS_KEY, FAUCET_SUPPLY, FIRST_TEST_USER_ADDR, TEST_FAUCET_ADDR};

fn new_vm() -> TestVM {
    TestVM::new_with_singletons(Rc::new(MemoryBlockstore::new()))
}

#[test]
fn genesis_funds_the_faucet() {
    let v = new_vm();
    let supply = TokenAmount::from_whole(FAUCET_SUPPLY);
    assert_eq!(supply, v.balance(&TEST_FAUCET_ADDR));
    assert_eq!(supply, v.total_balance());
    assert!(v.balance(&BURNT_FUNDS_ACTOR_ADDR).is_zero());

    let burnt_key = Address::new_bls(BURNT_FUNDS_KEY).unwrap();
    let ret = apply_ok(
        &v,
        &TEST_FAUCET_ADDR,
        &BURNT_FUNDS_ACTOR_ADDR,
        &TokenAmount::zero(),
        AccountMethod::PubkeyAddress as MethodNum,
        RawBytes::default(),
    );
    assert_eq!(burnt_key, ret.deserialize::<Address>().unwrap());
    assert_invariants(&v);
}

#[test]
fn send_to_key_address_creates_account() {
    let v = new_vm();
    let balance = TokenAmount::from_whole(100);
    let accounts = create_accounts(&v, 3, balance.clone());

    let expected: Vec<Address> =
        (0..3).map(|i| Address::new_id(FIRST_TEST_USER_ADDR + i)).collect();
    assert_eq!(expected, accounts);
    for (pk, id) in pk_addrs_from(ACCOUNT_SEED, 3).iter().zip(accounts.iter()) {
        assert_eq!(Some(*id), v.resolve_id_address(pk));
        assert_eq!(balance, v.balance(id));
    }
    assert_eq!(TokenAmount::from_whole(FAUCET_SUPPLY), v.total_balance());
    assert_invariants(&v);
}

#[test]
fn failed_message_rolls_back_everything_but_call_seq() {
    let v = new_vm();
    let balance = TokenAmount::from_whole(10);
    let accounts = create_accounts(&v, 2, balance.clone());
    let (sender, not_a_miner) = (accounts[0], accounts[1]);

    apply_code(
        &v,
        &sender,
        &STORAGE_POWER_ACTOR_ADDR,
        &TokenAmount::from_whole(1),
        PowerMethod::AddBalance as MethodNum,
        serialize(&AddBalanceParams { miner: not_a_miner }),
        ExitCode::USR_ILLEGAL_ARGUMENT,
    );

    let act = v.actor(&sender).unwrap();
    assert_eq!(1, act.call_seq);
    assert_eq!(balance, act.balance);
    assert!(v.balance(&STORAGE_POWER_ACTOR_ADDR).is_zero());
    assert_eq!(TokenAmount::from_whole(FAUCET_SUPPLY), v.total_balance());
}

#[test]
fn transfer_failures() {
    let v = new_vm();
    let accounts = create_accounts(&v, 1, TokenAmount::from_atto(100));
    let sender = accounts[0];

    let res = v
        .apply_message(
            &sender,
            &TEST_FAUCET_ADDR,
            &TokenAmount::from_atto(101),
            METHOD_SEND,
            RawBytes::default(),
        )
        .unwrap();
    assert_eq!(ExitCode::SYS_INSUFFICIENT_FUNDS, res.code);

    let res = v
        .apply_message(
            &sender,
            &Address::new_id(9999),
            &TokenAmount::from_atto(1),
            METHOD_SEND,
            RawBytes::default(),
        )
        .unwrap();
    assert_eq!(ExitCode::SYS_INVALID_RECEIVER, res.code);

    assert_eq!(TokenAmount::from_atto(100), v.balance(&sender));
    assert_eq!(2, v.actor(&sender).unwrap().call_seq);
}

#[test]
fn only_accounts_sign_messages() {
    let v = new_vm();
    let err = v
        .apply_message(
            &STORAGE_POWER_ACTOR_ADDR,
            &TEST_FAUCET_ADDR,
            &TokenAmount::zero(),
            METHOD_SEND,
            RawBytes::default(),
        )
        .unwrap_err();
    assert!(err.to_string().contains("not an account"));

    let unknown = pk_addrs_from(1, 1)[0];
    assert!(v
        .apply_message(&unknown, &TEST_FAUCET_ADDR, &TokenAmount::zero(), METHOD_SEND, RawBytes::default())
        .is_err());
}

#[test]
fn randomness_is_deterministic_per_epoch() {
    let v = new_vm();
    let tag = DomainSeparationTag::SurprisePoStSelectMiners;
    let a = v.randomness(tag, 5, b"entropy");
    assert_eq!(a, v.randomness(tag, 5, b"entropy"));
    assert_ne!(a, v.randomness(tag, 6, b"entropy"));
    assert_ne!(a, v.randomness(tag, 5, b"other"));
}
