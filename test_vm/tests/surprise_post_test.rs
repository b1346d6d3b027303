// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::BTreeSet;
use std::rc::Rc;

use fvm_ipld_blockstore::MemoryBlockstore;
use fvm_ipld_encoding::RawBytes;
use fvm_shared::address::Address;
use fvm_shared::clock::ChainEpoch;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::sector::StoragePower;
use fvm_shared::MethodNum;
use num_traits::Zero;

use spc_actor_miner::Method as MinerMethod;
use spc_actor_power::{challenge_count, ClearSurprisePoStChallengeParams, Method as PowerMethod};
use spc_actors_runtime::{BURNT_FUNDS_ACTOR_ADDR, STORAGE_POWER_ACTOR_ADDR};
use spc_test_vm::expects::Expect;
use spc_test_vm::trace::ExpectInvocation;
use spc_test_vm::util::*;
use spc_test_vm::{TestVM, FAUCET_SUPPLY};

const PLEDGE: u64 = 100_000;
const SECTOR_POWER: i64 = 1024;

struct Miner {
    worker: Address,
    id: Address,
}

/// Registers `count` miners, each pledged and holding one sector that outlives the test.
fn setup(count: usize) -> (TestVM, Vec<Miner>) {
    let v = TestVM::new_with_singletons(Rc::new(MemoryBlockstore::new()));
    let accounts = create_accounts(&v, 2 * count as u64, TokenAmount::from_whole(10_000));
    let miners = accounts
        .chunks(2)
        .map(|pair| {
            let (owner, worker) = (pair[0], pair[1]);
            let (id, _) = create_miner(&v, &owner, &worker, &TokenAmount::zero());
            add_pledge(&v, &owner, &id, &TokenAmount::from_atto(PLEDGE));
            commit_sector(&v, &worker, &id, 1, SECTOR_POWER, 1000);
            Miner { worker, id }
        })
        .collect();
    v.take_invocations();
    (v, miners)
}

fn challenge_of(v: &TestVM, miner: &Address) -> Option<(ChainEpoch, ChainEpoch)> {
    miner_state(v, miner).challenge.map(|c| (c.challenge_epoch, c.expiry_epoch))
}

/// Ticks through one proving period starting at epoch 1, so that every miner holds a challenge.
fn sweep_once(v: &TestVM) {
    for epoch in 1..=v.policy().proving_period {
        advance_and_tick(v, epoch);
    }
}

#[test]
fn sweep_challenges_every_miner_once_per_proving_period() {
    let (v, miners) = setup(10);
    let period = v.policy().proving_period;
    let per_epoch = challenge_count(miners.len(), period);
    let response_period = v.policy().max_surprise_post_response_period;

    let mut challenged = BTreeSet::new();
    for epoch in 1..=period {
        advance_and_tick(&v, epoch);

        let invocs = v.take_invocations();
        let tick_end = &invocs[0].subinvocations[0];
        let targets: Vec<Address> = tick_end
            .subinvocations
            .iter()
            .filter(|i| i.method == MinerMethod::SurprisePoStChallenge as MethodNum)
            .map(|i| i.to)
            .collect();
        assert_eq!(per_epoch, targets.len(), "epoch {}", epoch);

        // notifications go out in ascending ID order
        let mut sorted = targets.clone();
        sorted.sort_by_key(|a| a.id().unwrap());
        assert_eq!(sorted, targets);

        for target in targets {
            assert!(challenged.insert(target), "{} challenged twice in one sweep", target);
            assert_eq!(Some((epoch, epoch + response_period)), challenge_of(&v, &target));
        }
    }
    assert_eq!(miners.len(), challenged.len());

    let summary = power_summary(&v);
    let pending: usize = summary.challenges.values().map(|m| m.len()).sum();
    assert_eq!(miners.len(), pending);
    assert_invariants(&v);
}

#[test]
fn response_clears_challenge_expiry() {
    let (v, miners) = setup(1);
    let m = &miners[0];
    advance_and_tick(&v, 1);
    let (_, expiry) = challenge_of(&v, &m.id).unwrap();
    v.take_invocations();

    submit_surprise_post(&v, &m.worker, &m.id);

    ExpectInvocation {
        from: m.worker,
        to: m.id,
        method: MinerMethod::SubmitSurprisePoStResponse as MethodNum,
        subinvocs: Some(vec![ExpectInvocation {
            from: m.id,
            to: STORAGE_POWER_ACTOR_ADDR,
            method: PowerMethod::ClearSurprisePoStChallenge as MethodNum,
            params: Some(
                RawBytes::serialize(ClearSurprisePoStChallengeParams { expiry_epoch: expiry }).unwrap(),
            ),
            subinvocs: Some(vec![]),
            ..Default::default()
        }]),
        ..Default::default()
    }
    .matches(v.take_invocations().last().unwrap());

    assert_eq!(None, challenge_of(&v, &m.id));
    assert!(!power_summary(&v).challenges.contains_key(&expiry));

    // a second response has nothing to answer
    apply_code(
        &v,
        &m.worker,
        &m.id,
        &TokenAmount::zero(),
        MinerMethod::SubmitSurprisePoStResponse as MethodNum,
        RawBytes::default(),
        ExitCode::USR_ILLEGAL_STATE,
    );
    assert_invariants(&v);
}

#[test]
fn unanswered_challenge_is_detected_fault() {
    let (v, miners) = setup(2);
    sweep_once(&v);
    let (responder, silent) = (&miners[0], &miners[1]);
    assert!(challenge_of(&v, &responder.id).is_some());
    let (_, expiry) = challenge_of(&v, &silent.id).unwrap();

    submit_surprise_post(&v, &responder.worker, &responder.id);

    for epoch in v.epoch() + 1..expiry {
        advance_and_tick(&v, epoch);
        assert!(challenge_of(&v, &silent.id).is_some());
    }
    assert!(v.balance(&BURNT_FUNDS_ACTOR_ADDR).is_zero());
    v.take_invocations();
    advance_and_tick(&v, expiry);

    // the whole pledge backs the faulted power, 10% of it is slashed
    let slash = TokenAmount::from_atto(PLEDGE / 10);
    let invocs = v.take_invocations();
    let update = invocs[0]
        .flatten()
        .into_iter()
        .find(|i| i.method == MinerMethod::UpdateSurprisePoStState as MethodNum && i.to == silent.id)
        .cloned()
        .unwrap();
    ExpectInvocation {
        from: STORAGE_POWER_ACTOR_ADDR,
        to: silent.id,
        method: MinerMethod::UpdateSurprisePoStState as MethodNum,
        subinvocs: Some(vec![
            ExpectInvocation {
                from: silent.id,
                to: STORAGE_POWER_ACTOR_ADDR,
                method: PowerMethod::SlashPledgeForStorageFault as MethodNum,
                subinvocs: Some(vec![Expect::burn(STORAGE_POWER_ACTOR_ADDR, Some(slash.clone()))]),
                ..Default::default()
            },
            Expect::power_report(silent.id, StoragePower::zero(), StoragePower::from(SECTOR_POWER)),
        ]),
        ..Default::default()
    }
    .matches(&update);

    assert_eq!(None, challenge_of(&v, &silent.id));
    assert!(miner_state(&v, &silent.id).sectors.iter().all(|s| s.faulty));
    assert_eq!(TokenAmount::from_atto(PLEDGE) - &slash, escrow_balance(&v, &silent.id));
    assert_eq!(slash, v.balance(&BURNT_FUNDS_ACTOR_ADDR));

    let summary = power_summary(&v);
    assert_eq!(StoragePower::zero(), summary.entries[&silent.id].active_power);
    assert_eq!(StoragePower::from(SECTOR_POWER), summary.entries[&silent.id].inactive_power);

    // the responder is untouched
    assert!(miner_state(&v, &responder.id).sectors.iter().all(|s| !s.faulty));
    assert_eq!(TokenAmount::from_atto(PLEDGE), escrow_balance(&v, &responder.id));
    assert_eq!(StoragePower::from(SECTOR_POWER), summary.entries[&responder.id].active_power);

    // too late to answer
    apply_code(
        &v,
        &silent.worker,
        &silent.id,
        &TokenAmount::zero(),
        MinerMethod::SubmitSurprisePoStResponse as MethodNum,
        RawBytes::default(),
        ExitCode::USR_ILLEGAL_STATE,
    );

    assert_eq!(TokenAmount::from_whole(FAUCET_SUPPLY), v.total_balance());
    assert_invariants(&v);
}

#[test]
fn pending_challenge_takes_precedence() {
    let (v, miners) = setup(1);
    let m = &miners[0];
    advance_and_tick(&v, 1);
    let first = challenge_of(&v, &m.id).unwrap();

    // a lone miner is drawn again every epoch, but keeps its first challenge
    advance_and_tick(&v, 2);
    advance_and_tick(&v, 3);
    assert_eq!(Some(first), challenge_of(&v, &m.id));

    // answering clears the first expiry only; later notifications find nothing to fault
    submit_surprise_post(&v, &m.worker, &m.id);
    for epoch in 4..=first.1 + 2 {
        advance_and_tick(&v, epoch);
        if let Some((challenge_epoch, _)) = challenge_of(&v, &m.id) {
            // re-challenged after answering; answer again
            assert!(challenge_epoch > first.0);
            submit_surprise_post(&v, &m.worker, &m.id);
        }
    }
    assert!(miner_state(&v, &m.id).sectors.iter().all(|s| !s.faulty));
    assert_eq!(TokenAmount::from_atto(PLEDGE), escrow_balance(&v, &m.id));
    assert_invariants(&v);
}
