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

use spc_actor_power::ext::init::{ExecParams, ExecReturn, EXEC_METHOD};
use spc_actor_power::ext::miner::{
    MinerConstructorParams, OnSectorExpiryParams, SurprisePoStChallengeParams,
    ON_SECTOR_EXPIRY_METHOD, SURPRISE_POST_CHALLENGE_METHOD, UPDATE_SURPRISE_POST_STATE_METHOD,
};
use spc_actor_power::testing::check_state_invariants;
use spc_actor_power::{
    challenge_count, select_miners_to_surprise, AddBalanceParams, CreateStorageMinerParams,
    CreateStorageMinerReturn, EnrollSectorExpiryParams, Method, PowerTableEntry,
    ProcessPowerReportParams, State, WithdrawBalanceParams, WithdrawBalanceReturn,
};
use spc_actors_runtime::runtime::builtins::Type;
use spc_actors_runtime::runtime::DomainSeparationTag;
use spc_actors_runtime::test_utils::{
    blake2b_256, MockRuntime, ACCOUNT_ACTOR_CODE_ID, CRON_ACTOR_CODE_ID, MINER_ACTOR_CODE_ID,
    SYSTEM_ACTOR_CODE_ID,
};
use spc_actors_runtime::{
    ActorError, CRON_ACTOR_ADDR, INIT_ACTOR_ADDR, STORAGE_POWER_ACTOR_ADDR, SYSTEM_ACTOR_ADDR,
};

use crate::PowerActor;

lazy_static! {
    pub static ref OWNER: Address = Address::new_id(101);
    pub static ref MINER: Address = Address::new_id(201);
    pub static ref ACTOR: Address = Address::new_actor("actor".as_bytes());
}

pub fn new_runtime() -> MockRuntime {
    MockRuntime {
        receiver: STORAGE_POWER_ACTOR_ADDR,
        caller: SYSTEM_ACTOR_ADDR,
        caller_type: *SYSTEM_ACTOR_CODE_ID,
        ..Default::default()
    }
}

pub fn new_harness() -> Harness {
    Harness { miner_seq: 0 }
}

pub fn setup() -> (Harness, MockRuntime) {
    let mut rt = new_runtime();
    let h = new_harness();
    h.construct(&mut rt);
    (h, rt)
}

pub struct Harness {
    miner_seq: u64,
}

/// Notifications expected from one `OnEpochTickEnd`.
#[derive(Debug, Default)]
pub struct TickOutcome {
    pub challenged: Vec<Address>,
    pub expired_challenges: Vec<Address>,
    pub expired_sectors: Vec<(Address, SectorNumber)>,
}

#[allow(dead_code)]
impl Harness {
    pub fn construct(&self, rt: &mut MockRuntime) {
        rt.expect_validate_caller_addr(vec![SYSTEM_ACTOR_ADDR]);
        rt.call::<PowerActor>(Method::Constructor as MethodNum, &RawBytes::default()).unwrap();
        rt.verify()
    }

    pub fn construct_and_verify(&self, rt: &mut MockRuntime) {
        self.construct(rt);
        let st: State = rt.get_state();
        assert_eq!(StoragePower::zero(), st.total_active_power);
        assert_eq!(StoragePower::zero(), st.total_inactive_power);
        assert_eq!(0, st.miner_count);
        assert_eq!(0, st.num_miners_meeting_min_power);
        self.check_state(rt);
    }

    pub fn create_miner(
        &self,
        rt: &mut MockRuntime,
        owner: &Address,
        miner: &Address,
        robust: &Address,
        peer: Vec<u8>,
        value: &TokenAmount,
    ) -> Result<CreateStorageMinerReturn, ActorError> {
        rt.set_caller(*ACCOUNT_ACTOR_CODE_ID, *owner);
        rt.set_value(value.clone());
        rt.add_balance(value.clone());
        rt.expect_validate_caller_type(vec![Type::Account]);

        let constructor_params = RawBytes::serialize(MinerConstructorParams {
            owner: *owner,
            worker: *owner,
            peer_id: peer.clone(),
        })
        .unwrap();
        let exec_params = ExecParams { code_cid: *MINER_ACTOR_CODE_ID, constructor_params };
        let exec_ret = ExecReturn { id_address: *miner, robust_address: *robust };
        rt.expect_send(
            INIT_ACTOR_ADDR,
            EXEC_METHOD,
            RawBytes::serialize(exec_params).unwrap(),
            TokenAmount::zero(),
            RawBytes::serialize(exec_ret).unwrap(),
            ExitCode::OK,
        );

        let params = CreateStorageMinerParams { owner: *owner, worker: *owner, peer_id: peer };
        let ret = rt.call::<PowerActor>(
            Method::CreateStorageMiner as MethodNum,
            &RawBytes::serialize(params).unwrap(),
        )?;
        rt.set_value(TokenAmount::zero());
        rt.verify();
        rt.set_address_actor_type(*miner, *MINER_ACTOR_CODE_ID);
        Ok(ret.deserialize().unwrap())
    }

    /// Registers a fresh miner with ID `1000 + seq`.
    pub fn create_miner_basic(&mut self, rt: &mut MockRuntime) -> Address {
        self.miner_seq += 1;
        let miner = Address::new_id(1000 + self.miner_seq);
        let robust = Address::new_actor(&self.miner_seq.to_be_bytes());
        self.create_miner(rt, &OWNER, &miner, &robust, b"peer".to_vec(), &TokenAmount::zero())
            .unwrap();
        miner
    }

    pub fn add_balance(
        &self,
        rt: &mut MockRuntime,
        miner: &Address,
        value: &TokenAmount,
    ) -> Result<(), ActorError> {
        rt.set_caller(*ACCOUNT_ACTOR_CODE_ID, *OWNER);
        rt.set_value(value.clone());
        rt.add_balance(value.clone());
        rt.expect_validate_caller_any();
        let res = rt.call::<PowerActor>(
            Method::AddBalance as MethodNum,
            &RawBytes::serialize(AddBalanceParams { miner: *miner }).unwrap(),
        );
        rt.set_value(TokenAmount::zero());
        if res.is_err() {
            let refunded = rt.balance.borrow().clone() - value;
            rt.set_balance(refunded);
        }
        res?;
        rt.verify();
        Ok(())
    }

    /// Withdraws from `miner`'s escrow, expecting `expected` to be paid out.
    pub fn withdraw_balance(
        &self,
        rt: &mut MockRuntime,
        miner: &Address,
        requested: &TokenAmount,
        expected: &TokenAmount,
    ) -> Result<TokenAmount, ActorError> {
        rt.set_caller(*MINER_ACTOR_CODE_ID, *miner);
        rt.expect_validate_caller_matches();
        if !expected.is_zero() {
            rt.expect_send(
                *miner,
                METHOD_SEND,
                RawBytes::default(),
                expected.clone(),
                RawBytes::default(),
                ExitCode::OK,
            );
        }
        let params = WithdrawBalanceParams { miner: *miner, requested: requested.clone() };
        let ret: WithdrawBalanceReturn = rt
            .call::<PowerActor>(
                Method::WithdrawBalance as MethodNum,
                &RawBytes::serialize(params).unwrap(),
            )?
            .deserialize()
            .unwrap();
        rt.verify();
        assert_eq!(*expected, ret.amount_withdrawn);
        Ok(ret.amount_withdrawn)
    }

    pub fn process_power_report(
        &self,
        rt: &mut MockRuntime,
        miner: &Address,
        active: i64,
        inactive: i64,
    ) -> Result<(), ActorError> {
        rt.set_caller(*MINER_ACTOR_CODE_ID, *miner);
        rt.expect_validate_caller_type(vec![Type::Miner]);
        let params = ProcessPowerReportParams {
            active_power: StoragePower::from(active),
            inactive_power: StoragePower::from(inactive),
        };
        rt.call::<PowerActor>(
            Method::ProcessPowerReport as MethodNum,
            &RawBytes::serialize(params).unwrap(),
        )?;
        rt.verify();
        Ok(())
    }

    pub fn enroll_sector_expiry(
        &self,
        rt: &mut MockRuntime,
        miner: &Address,
        sector_number: SectorNumber,
        expiry_epoch: ChainEpoch,
    ) -> Result<(), ActorError> {
        rt.set_caller(*MINER_ACTOR_CODE_ID, *miner);
        rt.expect_validate_caller_type(vec![Type::Miner]);
        let params = EnrollSectorExpiryParams { sector_number, expiry_epoch };
        rt.call::<PowerActor>(
            Method::EnrollSectorExpiry as MethodNum,
            &RawBytes::serialize(params).unwrap(),
        )?;
        rt.verify();
        Ok(())
    }

    pub fn remove_storage_miner(
        &self,
        rt: &mut MockRuntime,
        miner: &Address,
    ) -> Result<(), ActorError> {
        rt.set_caller(*MINER_ACTOR_CODE_ID, *miner);
        rt.expect_validate_caller_type(vec![Type::Miner]);
        rt.call::<PowerActor>(Method::RemoveStorageMiner as MethodNum, &RawBytes::default())?;
        rt.verify();
        Ok(())
    }

    /// Runs `OnEpochTickEnd` at the runtime's current epoch, predicting every notification
    /// from the current state. Miners in `failing` abort their notifications.
    pub fn on_epoch_tick_end(
        &self,
        rt: &mut MockRuntime,
        seed: [u8; 32],
        failing: &[Address],
    ) -> TickOutcome {
        let epoch = rt.epoch;
        let exit_for =
            |a: &Address| if failing.contains(a) { ExitCode::USR_ILLEGAL_STATE } else { ExitCode::OK };
        let st: State = rt.get_state();
        let (summary, _) = check_state_invariants(&rt.policy, &st, &rt.store);
        let mut outcome = TickOutcome::default();

        rt.set_caller(*CRON_ACTOR_CODE_ID, CRON_ACTOR_ADDR);
        rt.expect_validate_caller_addr(vec![CRON_ACTOR_ADDR]);

        if st.miner_count > 0 {
            rt.expect_get_randomness(DomainSeparationTag::SurprisePoStSelectMiners, epoch, vec![], seed);
            let registered = st.registered_miners(&rt.store).unwrap();
            let swept = st.swept_miners(&rt.store).unwrap();
            let count = challenge_count(registered.len(), rt.policy.proving_period);
            let selection = select_miners_to_surprise(blake2b_256, &registered, &swept, count, &seed);
            let expiry_epoch = epoch + rt.policy.max_surprise_post_response_period;
            let params =
                RawBytes::serialize(SurprisePoStChallengeParams { challenge_epoch: epoch, expiry_epoch })
                    .unwrap();
            for id in selection.selected {
                let miner = Address::new_id(id);
                rt.expect_send_catching(
                    miner,
                    SURPRISE_POST_CHALLENGE_METHOD,
                    params.clone(),
                    TokenAmount::zero(),
                    exit_for(&miner),
                );
                outcome.challenged.push(miner);
            }
        }

        let mut expired = summary.challenges.get(&epoch).cloned().unwrap_or_default();
        expired.sort_by_key(|a| a.id().unwrap());
        for miner in expired {
            rt.expect_send_catching(
                miner,
                UPDATE_SURPRISE_POST_STATE_METHOD,
                RawBytes::default(),
                TokenAmount::zero(),
                exit_for(&miner),
            );
            outcome.expired_challenges.push(miner);
        }

        for sector in summary.sector_expiries.get(&epoch).cloned().unwrap_or_default() {
            let miner = Address::new_id(sector.miner);
            let params =
                RawBytes::serialize(OnSectorExpiryParams { sector_number: sector.sector_number })
                    .unwrap();
            rt.expect_send_catching(
                miner,
                ON_SECTOR_EXPIRY_METHOD,
                params,
                TokenAmount::zero(),
                exit_for(&miner),
            );
            outcome.expired_sectors.push((miner, sector.sector_number));
        }

        rt.call::<PowerActor>(Method::OnEpochTickEnd as MethodNum, &RawBytes::default()).unwrap();
        rt.verify();
        outcome
    }

    pub fn get_power_entry(&self, rt: &MockRuntime, miner: &Address) -> Option<PowerTableEntry> {
        let st: State = rt.get_state();
        st.get_power_entry(&rt.store, miner).unwrap()
    }

    pub fn escrow_balance(&self, rt: &MockRuntime, miner: &Address) -> Option<TokenAmount> {
        let st: State = rt.get_state();
        st.escrow(&rt.store).get(miner).unwrap()
    }

    pub fn escrow_total(&self, rt: &MockRuntime) -> TokenAmount {
        let st: State = rt.get_state();
        st.escrow(&rt.store).total().unwrap()
    }

    pub fn check_state(&self, rt: &MockRuntime) {
        let st: State = rt.get_state();
        let (_, acc) = check_state_invariants(&rt.policy, &st, &rt.store);
        acc.assert_empty();
    }
}
