// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_encoding::RawBytes;
use fvm_shared::address::Address;
use fvm_shared::clock::ChainEpoch;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::sector::{SectorNumber, StoragePower};
use fvm_shared::{MethodNum, METHOD_SEND};
use lazy_static::lazy_static;
use num_traits::Zero;
use test_case::test_case;

use spc_actor_miner::ext::power::{
    ClearSurprisePoStChallengeParams, EnrollSectorExpiryParams, ProcessPowerReportParams,
    SlashPledgeForStorageFaultParams, StorageFaultType, WithdrawBalanceParams,
    WithdrawBalanceReturn, CLEAR_SURPRISE_POST_CHALLENGE_METHOD, ENROLL_SECTOR_EXPIRY_METHOD,
    ENSURE_PLEDGE_COLLATERAL_SATISFIED_METHOD, PROCESS_POWER_REPORT_METHOD,
    SLASH_PLEDGE_FOR_STORAGE_FAULT_METHOD, WITHDRAW_BALANCE_METHOD,
};
use spc_actor_miner::testing::check_state_invariants;
use spc_actor_miner::{
    Actor as MinerActor, CommitSectorParams, DeclareFaultsParams, Method, MinerConstructorParams,
    OnSectorExpiryParams, State, SurpriseChallenge, SurprisePoStChallengeParams,
    WithdrawPledgeParams, WithdrawPledgeReturn,
};
use spc_actors_runtime::test_utils::*;
use spc_actors_runtime::{ActorError, INIT_ACTOR_ADDR, STORAGE_POWER_ACTOR_ADDR};

lazy_static! {
    static ref RECEIVER: Address = Address::new_id(1000);
    static ref OWNER: Address = Address::new_id(100);
    static ref WORKER: Address = Address::new_id(101);
}

fn setup() -> MockRuntime {
    let mut rt = MockRuntime {
        receiver: *RECEIVER,
        caller: INIT_ACTOR_ADDR,
        caller_type: *INIT_ACTOR_CODE_ID,
        ..Default::default()
    };
    rt.set_address_actor_type(*OWNER, *ACCOUNT_ACTOR_CODE_ID);
    rt.set_address_actor_type(*WORKER, *ACCOUNT_ACTOR_CODE_ID);

    let params = MinerConstructorParams { owner: *OWNER, worker: *WORKER, peer_id: b"peer".to_vec() };
    rt.expect_validate_caller_addr(vec![INIT_ACTOR_ADDR]);
    rt.call::<MinerActor>(Method::Constructor as MethodNum, &RawBytes::serialize(params).unwrap())
        .unwrap();
    rt.verify();
    rt
}

fn check_state(rt: &MockRuntime) {
    let (_, acc) = check_state_invariants(&rt.get_state());
    acc.assert_empty();
}

fn call_as_power(rt: &mut MockRuntime, method: Method, params: RawBytes) -> Result<RawBytes, ActorError> {
    rt.set_caller(*POWER_ACTOR_CODE_ID, STORAGE_POWER_ACTOR_ADDR);
    rt.expect_validate_caller_addr(vec![STORAGE_POWER_ACTOR_ADDR]);
    let ret = rt.call::<MinerActor>(method as MethodNum, &params);
    rt.verify();
    ret
}

fn call_as(
    rt: &mut MockRuntime,
    caller: Address,
    method: Method,
    params: RawBytes,
) -> Result<RawBytes, ActorError> {
    rt.set_caller(*ACCOUNT_ACTOR_CODE_ID, caller);
    rt.expect_validate_caller_addr(vec![caller]);
    let ret = rt.call::<MinerActor>(method as MethodNum, &params);
    rt.verify();
    ret
}

fn expect_power_send(rt: &mut MockRuntime, method: MethodNum, params: RawBytes, exit_code: ExitCode) {
    rt.expect_send(
        STORAGE_POWER_ACTOR_ADDR,
        method,
        params,
        TokenAmount::zero(),
        RawBytes::default(),
        exit_code,
    );
}

fn expect_power_report(rt: &mut MockRuntime, active: i64, inactive: i64) {
    let params = ProcessPowerReportParams {
        active_power: StoragePower::from(active),
        inactive_power: StoragePower::from(inactive),
    };
    expect_power_send(rt, PROCESS_POWER_REPORT_METHOD, RawBytes::serialize(params).unwrap(), ExitCode::OK);
}

fn commit_sector(rt: &mut MockRuntime, sector_number: SectorNumber, power: i64, expiration: ChainEpoch) {
    let state: State = rt.get_state();
    let current = state.power();
    let enroll = EnrollSectorExpiryParams { sector_number, expiry_epoch: expiration };
    expect_power_send(rt, ENROLL_SECTOR_EXPIRY_METHOD, RawBytes::serialize(enroll).unwrap(), ExitCode::OK);
    let params = ProcessPowerReportParams {
        active_power: current.active + StoragePower::from(power),
        inactive_power: current.inactive,
    };
    expect_power_send(rt, PROCESS_POWER_REPORT_METHOD, RawBytes::serialize(params).unwrap(), ExitCode::OK);
    expect_power_send(rt, ENSURE_PLEDGE_COLLATERAL_SATISFIED_METHOD, RawBytes::default(), ExitCode::OK);

    let params = CommitSectorParams { sector_number, power: StoragePower::from(power), expiration };
    call_as(rt, *WORKER, Method::CommitSector, RawBytes::serialize(params).unwrap()).unwrap();
}

fn challenge(rt: &mut MockRuntime, challenge_epoch: ChainEpoch, expiry_epoch: ChainEpoch) {
    let params = SurprisePoStChallengeParams { challenge_epoch, expiry_epoch };
    call_as_power(rt, Method::SurprisePoStChallenge, RawBytes::serialize(params).unwrap()).unwrap();
}

#[test]
fn construction_resolves_control_addresses() {
    let rt = setup();
    let state: State = rt.get_state();
    assert_eq!(*OWNER, state.info.owner);
    assert_eq!(*WORKER, state.info.worker);
    assert_eq!(b"peer".to_vec(), state.info.peer_id);
    assert!(state.sectors.is_empty());
    assert_eq!(None, state.challenge);
    check_state(&rt);
}

#[test]
fn construction_fails_for_unknown_worker() {
    let mut rt = MockRuntime {
        receiver: *RECEIVER,
        caller: INIT_ACTOR_ADDR,
        caller_type: *INIT_ACTOR_CODE_ID,
        ..Default::default()
    };
    let params =
        MinerConstructorParams { owner: *OWNER, worker: new_bls_addr(7), peer_id: vec![] };
    rt.expect_validate_caller_addr(vec![INIT_ACTOR_ADDR]);
    expect_abort(
        ExitCode::USR_ILLEGAL_ARGUMENT,
        rt.call::<MinerActor>(Method::Constructor as MethodNum, &RawBytes::serialize(params).unwrap()),
    );
    rt.verify();
}

mod surprise_post {
    use super::*;

    #[test]
    fn response_clears_challenge() {
        let mut rt = setup();
        challenge(&mut rt, 10, 14);
        let state: State = rt.get_state();
        assert_eq!(Some(SurpriseChallenge { challenge_epoch: 10, expiry_epoch: 14 }), state.challenge);

        let clear = ClearSurprisePoStChallengeParams { expiry_epoch: 14 };
        expect_power_send(
            &mut rt,
            CLEAR_SURPRISE_POST_CHALLENGE_METHOD,
            RawBytes::serialize(clear).unwrap(),
            ExitCode::OK,
        );
        call_as(&mut rt, *WORKER, Method::SubmitSurprisePoStResponse, RawBytes::default()).unwrap();

        let state: State = rt.get_state();
        assert_eq!(None, state.challenge);
        check_state(&rt);
    }

    #[test]
    fn earlier_pending_challenge_takes_precedence() {
        let mut rt = setup();
        challenge(&mut rt, 10, 14);
        challenge(&mut rt, 11, 15);
        let state: State = rt.get_state();
        assert_eq!(Some(SurpriseChallenge { challenge_epoch: 10, expiry_epoch: 14 }), state.challenge);
    }

    #[test]
    fn response_without_challenge_fails() {
        let mut rt = setup();
        expect_abort(
            ExitCode::USR_ILLEGAL_STATE,
            call_as(&mut rt, *WORKER, Method::SubmitSurprisePoStResponse, RawBytes::default()),
        );
    }

    #[test]
    fn response_only_from_worker() {
        let mut rt = setup();
        challenge(&mut rt, 10, 14);
        rt.set_caller(*ACCOUNT_ACTOR_CODE_ID, *OWNER);
        rt.expect_validate_caller_addr(vec![*WORKER]);
        expect_abort(
            ExitCode::USR_FORBIDDEN,
            rt.call::<MinerActor>(Method::SubmitSurprisePoStResponse as MethodNum, &RawBytes::default()),
        );
        rt.verify();
    }

    #[test]
    fn unanswered_challenge_is_detected_fault() {
        let mut rt = setup();
        commit_sector(&mut rt, 1, 600, 100);
        commit_sector(&mut rt, 2, 400, 100);
        challenge(&mut rt, 10, 14);
        rt.set_epoch(14);

        let slash = SlashPledgeForStorageFaultParams {
            affected_power: StoragePower::from(1000),
            fault_type: StorageFaultType::Detected,
        };
        expect_power_send(
            &mut rt,
            SLASH_PLEDGE_FOR_STORAGE_FAULT_METHOD,
            RawBytes::serialize(slash).unwrap(),
            ExitCode::OK,
        );
        expect_power_report(&mut rt, 0, 1000);
        call_as_power(&mut rt, Method::UpdateSurprisePoStState, RawBytes::default()).unwrap();

        let state: State = rt.get_state();
        assert_eq!(None, state.challenge);
        assert!(state.sectors.iter().all(|s| s.faulty));
        check_state(&rt);
    }

    #[test]
    fn answered_challenge_expiry_is_noop() {
        let mut rt = setup();
        commit_sector(&mut rt, 1, 600, 100);
        rt.set_epoch(14);
        call_as_power(&mut rt, Method::UpdateSurprisePoStState, RawBytes::default()).unwrap();

        let state: State = rt.get_state();
        assert!(state.sectors.iter().all(|s| !s.faulty));
    }

    #[test]
    fn later_challenge_survives_earlier_expiry() {
        let mut rt = setup();
        challenge(&mut rt, 10, 20);
        rt.set_epoch(14);
        call_as_power(&mut rt, Method::UpdateSurprisePoStState, RawBytes::default()).unwrap();

        let state: State = rt.get_state();
        assert_eq!(Some(SurpriseChallenge { challenge_epoch: 10, expiry_epoch: 20 }), state.challenge);
    }
}

mod sectors {
    use super::*;
    use test_case::test_case;

    #[test]
    fn commit_reports_power() {
        let mut rt = setup();
        commit_sector(&mut rt, 3, 500, 50);
        commit_sector(&mut rt, 1, 200, 60);

        let state: State = rt.get_state();
        assert_eq!(vec![1, 3], state.sectors.iter().map(|s| s.sector_number).collect::<Vec<_>>());
        assert_eq!(StoragePower::from(700), state.power().active);
        check_state(&rt);
    }

    #[test_case(0, 50, ExitCode::USR_ILLEGAL_ARGUMENT; "zero power")]
    #[test_case(100, 0, ExitCode::USR_ILLEGAL_ARGUMENT; "expiration not in future")]
    fn commit_rejects_invalid_params(power: i64, expiration: ChainEpoch, code: ExitCode) {
        let mut rt = setup();
        let params = CommitSectorParams { sector_number: 1, power: StoragePower::from(power), expiration };
        expect_abort(code, call_as(&mut rt, *WORKER, Method::CommitSector, RawBytes::serialize(params).unwrap()));
    }

    #[test]
    fn commit_rejects_duplicate_sector() {
        let mut rt = setup();
        commit_sector(&mut rt, 1, 100, 50);
        let params = CommitSectorParams { sector_number: 1, power: StoragePower::from(100), expiration: 50 };
        expect_abort(
            ExitCode::USR_ILLEGAL_ARGUMENT,
            call_as(&mut rt, *WORKER, Method::CommitSector, RawBytes::serialize(params).unwrap()),
        );
    }

    #[test]
    fn commit_aborts_when_pledge_insufficient() {
        let mut rt = setup();
        let enroll = EnrollSectorExpiryParams { sector_number: 1, expiry_epoch: 50 };
        expect_power_send(&mut rt, ENROLL_SECTOR_EXPIRY_METHOD, RawBytes::serialize(enroll).unwrap(), ExitCode::OK);
        expect_power_report(&mut rt, 100, 0);
        expect_power_send(
            &mut rt,
            ENSURE_PLEDGE_COLLATERAL_SATISFIED_METHOD,
            RawBytes::default(),
            ExitCode::new(32),
        );

        let params = CommitSectorParams { sector_number: 1, power: StoragePower::from(100), expiration: 50 };
        expect_abort(
            ExitCode::new(32),
            call_as(&mut rt, *WORKER, Method::CommitSector, RawBytes::serialize(params).unwrap()),
        );
        let state: State = rt.get_state();
        assert!(state.sectors.is_empty());
    }

    #[test]
    fn expiry_removes_sector() {
        let mut rt = setup();
        commit_sector(&mut rt, 1, 600, 50);
        commit_sector(&mut rt, 2, 400, 60);

        rt.set_epoch(50);
        expect_power_report(&mut rt, 400, 0);
        let params = OnSectorExpiryParams { sector_number: 1 };
        call_as_power(&mut rt, Method::OnSectorExpiry, RawBytes::serialize(params).unwrap()).unwrap();

        let state: State = rt.get_state();
        assert!(state.get_sector(1).is_none());
        assert!(state.get_sector(2).is_some());

        let params = OnSectorExpiryParams { sector_number: 1 };
        expect_abort(
            ExitCode::USR_NOT_FOUND,
            call_as_power(&mut rt, Method::OnSectorExpiry, RawBytes::serialize(params).unwrap()),
        );
        check_state(&rt);
    }

    #[test]
    fn declared_faults_are_slashed() {
        let mut rt = setup();
        commit_sector(&mut rt, 1, 600, 50);
        commit_sector(&mut rt, 2, 400, 60);

        let slash = SlashPledgeForStorageFaultParams {
            affected_power: StoragePower::from(400),
            fault_type: StorageFaultType::Declared,
        };
        expect_power_send(
            &mut rt,
            SLASH_PLEDGE_FOR_STORAGE_FAULT_METHOD,
            RawBytes::serialize(slash).unwrap(),
            ExitCode::OK,
        );
        expect_power_report(&mut rt, 600, 400);
        let params = DeclareFaultsParams { sectors: vec![2] };
        call_as(&mut rt, *WORKER, Method::DeclareFaults, RawBytes::serialize(&params).unwrap()).unwrap();

        // declaring the same sector again changes nothing
        expect_abort(
            ExitCode::USR_ILLEGAL_ARGUMENT,
            call_as(&mut rt, *WORKER, Method::DeclareFaults, RawBytes::serialize(&params).unwrap()),
        );
        let params = DeclareFaultsParams { sectors: vec![1, 9] };
        expect_abort(
            ExitCode::USR_NOT_FOUND,
            call_as(&mut rt, *WORKER, Method::DeclareFaults, RawBytes::serialize(&params).unwrap()),
        );

        let state: State = rt.get_state();
        assert!(!state.get_sector(1).unwrap().faulty);
        assert!(state.get_sector(2).unwrap().faulty);
        check_state(&rt);
    }
}

#[test]
fn withdraw_pledge_pays_owner() {
    let mut rt = setup();
    let amount = TokenAmount::from_atto(250);
    rt.set_balance(amount.clone());

    let params = WithdrawBalanceParams { miner: *RECEIVER, requested: TokenAmount::from_atto(300) };
    rt.expect_send(
        STORAGE_POWER_ACTOR_ADDR,
        WITHDRAW_BALANCE_METHOD,
        RawBytes::serialize(params).unwrap(),
        TokenAmount::zero(),
        RawBytes::serialize(WithdrawBalanceReturn { amount_withdrawn: amount.clone() }).unwrap(),
        ExitCode::OK,
    );
    rt.expect_send(*OWNER, METHOD_SEND, RawBytes::default(), amount.clone(), RawBytes::default(), ExitCode::OK);

    let ret: WithdrawPledgeReturn = call_as(
        &mut rt,
        *OWNER,
        Method::WithdrawPledge,
        RawBytes::serialize(WithdrawPledgeParams { requested: TokenAmount::from_atto(300) }).unwrap(),
    )
    .unwrap()
    .deserialize()
    .unwrap();
    assert_eq!(amount, ret.amount_withdrawn);
    assert!(rt.balance.borrow().is_zero());
}
