// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_encoding::RawBytes;
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;
use fvm_shared::sector::StoragePower;
use fvm_shared::METHOD_CONSTRUCTOR;
use num_derive::FromPrimitive;
use num_traits::{Signed, Zero};

use spc_actors_runtime::runtime::{ActorCode, Runtime};
use spc_actors_runtime::{
    actor_dispatch, actor_error, resolve_to_actor_id, ActorError, INIT_ACTOR_ADDR,
    STORAGE_POWER_ACTOR_ADDR,
};

pub use self::state::*;
pub use self::types::*;

pub mod ext;
mod state;
pub mod testing;
mod types;

/// Storage Miner actor methods available
#[derive(FromPrimitive)]
#[repr(u64)]
pub enum Method {
    Constructor = METHOD_CONSTRUCTOR,
    SurprisePoStChallenge = 2,
    SubmitSurprisePoStResponse = 3,
    UpdateSurprisePoStState = 4,
    OnSectorExpiry = 5,
    CommitSector = 6,
    DeclareFaults = 7,
    WithdrawPledge = 8,
}

/// Storage Miner Actor
pub struct Actor;

impl Actor {
    pub fn constructor(rt: &impl Runtime, params: MinerConstructorParams) -> Result<(), ActorError> {
        rt.validate_immediate_caller_is(std::iter::once(&INIT_ACTOR_ADDR))?;

        let owner = Address::new_id(resolve_to_actor_id(rt, &params.owner)?);
        let worker = Address::new_id(resolve_to_actor_id(rt, &params.worker)?);
        let st = State::new(MinerInfo { owner, worker, peer_id: params.peer_id });
        rt.create(&st)?;
        Ok(())
    }

    /// Records a surprise challenge from the power actor. An earlier challenge that is still
    /// pending takes precedence.
    pub fn surprise_post_challenge(
        rt: &impl Runtime,
        params: SurprisePoStChallengeParams,
    ) -> Result<(), ActorError> {
        rt.validate_immediate_caller_is(std::iter::once(&STORAGE_POWER_ACTOR_ADDR))?;

        rt.transaction(|st: &mut State, _| {
            if let Some(pending) = st.challenge {
                log::warn!(
                    "miner already challenged at {} (expiring {}), ignoring challenge at {}",
                    pending.challenge_epoch,
                    pending.expiry_epoch,
                    params.challenge_epoch
                );
                return Ok(());
            }
            st.challenge = Some(SurpriseChallenge {
                challenge_epoch: params.challenge_epoch,
                expiry_epoch: params.expiry_epoch,
            });
            Ok(())
        })
    }

    /// Answers the pending surprise challenge and cancels its expiry at the power actor.
    pub fn submit_surprise_post_response(rt: &impl Runtime) -> Result<(), ActorError> {
        let st: State = rt.state()?;
        rt.validate_immediate_caller_is(std::iter::once(&st.info.worker))?;

        let challenge = rt.transaction(|st: &mut State, _| {
            st.challenge.take().ok_or_else(|| actor_error!(illegal_state; "no pending surprise challenge"))
        })?;

        rt.send(
            &STORAGE_POWER_ACTOR_ADDR,
            ext::power::CLEAR_SURPRISE_POST_CHALLENGE_METHOD,
            RawBytes::serialize(ext::power::ClearSurprisePoStChallengeParams {
                expiry_epoch: challenge.expiry_epoch,
            })?,
            TokenAmount::zero(),
        )?;
        Ok(())
    }

    /// Invoked by the power actor when a challenge expires. An unanswered challenge is a
    /// detected fault covering all of the miner's active power.
    pub fn update_surprise_post_state(rt: &impl Runtime) -> Result<(), ActorError> {
        rt.validate_immediate_caller_is(std::iter::once(&STORAGE_POWER_ACTOR_ADDR))?;
        let epoch = rt.curr_epoch();

        let faulted = rt.transaction(|st: &mut State, _| match st.challenge {
            Some(c) if c.expiry_epoch <= epoch => {
                st.challenge = None;
                Ok(Some((st.fault_all(), st.power())))
            }
            _ => Ok(None),
        })?;

        if let Some((affected, power)) = faulted {
            log::info!("surprise challenge expired unanswered at {}, {} bytes faulted", epoch, affected);
            if !affected.is_zero() {
                slash_for_fault(rt, affected, ext::power::StorageFaultType::Detected)?;
            }
            report_power(rt, power)?;
        }
        Ok(())
    }

    /// Invoked by the power actor at a sector's scheduled expiration.
    pub fn on_sector_expiry(rt: &impl Runtime, params: OnSectorExpiryParams) -> Result<(), ActorError> {
        rt.validate_immediate_caller_is(std::iter::once(&STORAGE_POWER_ACTOR_ADDR))?;

        let power = rt.transaction(|st: &mut State, _| {
            st.remove_sector(params.sector_number)
                .ok_or_else(|| actor_error!(not_found; "sector {} not committed", params.sector_number))?;
            Ok(st.power())
        })?;
        report_power(rt, power)
    }

    /// Commits a sector, enrolls its expiry and reports the new power. Fails if the escrow
    /// no longer covers the pledge requirement.
    pub fn commit_sector(rt: &impl Runtime, params: CommitSectorParams) -> Result<(), ActorError> {
        let st: State = rt.state()?;
        rt.validate_immediate_caller_is(std::iter::once(&st.info.worker))?;

        if !params.power.is_positive() {
            return Err(actor_error!(illegal_argument; "sector power {} must be positive", params.power));
        }
        if params.expiration <= rt.curr_epoch() {
            return Err(actor_error!(
                illegal_argument;
                "sector expiration {} must be after current epoch {}",
                params.expiration,
                rt.curr_epoch()
            ));
        }

        let power = rt.transaction(|st: &mut State, _| {
            st.add_sector(SectorOnChainInfo {
                sector_number: params.sector_number,
                power: params.power.clone(),
                expiration: params.expiration,
                faulty: false,
            })?;
            Ok(st.power())
        })?;

        rt.send(
            &STORAGE_POWER_ACTOR_ADDR,
            ext::power::ENROLL_SECTOR_EXPIRY_METHOD,
            RawBytes::serialize(ext::power::EnrollSectorExpiryParams {
                sector_number: params.sector_number,
                expiry_epoch: params.expiration,
            })?,
            TokenAmount::zero(),
        )?;
        report_power(rt, power)?;
        rt.send(
            &STORAGE_POWER_ACTOR_ADDR,
            ext::power::ENSURE_PLEDGE_COLLATERAL_SATISFIED_METHOD,
            RawBytes::default(),
            TokenAmount::zero(),
        )?;
        Ok(())
    }

    /// Declares sectors faulty ahead of a missed proof.
    pub fn declare_faults(rt: &impl Runtime, params: DeclareFaultsParams) -> Result<(), ActorError> {
        let st: State = rt.state()?;
        rt.validate_immediate_caller_is(std::iter::once(&st.info.worker))?;

        let (affected, power) = rt.transaction(|st: &mut State, _| {
            let affected = st.declare_faults(&params.sectors)?;
            Ok((affected, st.power()))
        })?;

        if !affected.is_zero() {
            slash_for_fault(rt, affected, ext::power::StorageFaultType::Declared)?;
        }
        report_power(rt, power)
    }

    /// Withdraws pledge in excess of the requirement and pays it to the owner.
    pub fn withdraw_pledge(
        rt: &impl Runtime,
        params: WithdrawPledgeParams,
    ) -> Result<WithdrawPledgeReturn, ActorError> {
        let st: State = rt.state()?;
        rt.validate_immediate_caller_is(std::iter::once(&st.info.owner))?;

        if params.requested.is_negative() {
            return Err(actor_error!(illegal_argument; "negative withdrawal {}", params.requested));
        }

        let ret: ext::power::WithdrawBalanceReturn = rt
            .send(
                &STORAGE_POWER_ACTOR_ADDR,
                ext::power::WITHDRAW_BALANCE_METHOD,
                RawBytes::serialize(ext::power::WithdrawBalanceParams {
                    miner: rt.message().receiver(),
                    requested: params.requested,
                })?,
                TokenAmount::zero(),
            )?
            .deserialize()?;

        if ret.amount_withdrawn.is_positive() {
            rt.send_funds(&st.info.owner, ret.amount_withdrawn.clone())?;
        }
        Ok(WithdrawPledgeReturn { amount_withdrawn: ret.amount_withdrawn })
    }
}

fn report_power(rt: &impl Runtime, power: MinerPower) -> Result<(), ActorError> {
    rt.send(
        &STORAGE_POWER_ACTOR_ADDR,
        ext::power::PROCESS_POWER_REPORT_METHOD,
        RawBytes::serialize(ext::power::ProcessPowerReportParams {
            active_power: power.active,
            inactive_power: power.inactive,
        })?,
        TokenAmount::zero(),
    )?;
    Ok(())
}

fn slash_for_fault(
    rt: &impl Runtime,
    affected_power: StoragePower,
    fault_type: ext::power::StorageFaultType,
) -> Result<(), ActorError> {
    rt.send(
        &STORAGE_POWER_ACTOR_ADDR,
        ext::power::SLASH_PLEDGE_FOR_STORAGE_FAULT_METHOD,
        RawBytes::serialize(ext::power::SlashPledgeForStorageFaultParams {
            affected_power,
            fault_type,
        })?,
        TokenAmount::zero(),
    )?;
    Ok(())
}

impl ActorCode for Actor {
    type Methods = Method;
    actor_dispatch! {
        Constructor => constructor,
        SurprisePoStChallenge => surprise_post_challenge,
        SubmitSurprisePoStResponse => submit_surprise_post_response,
        UpdateSurprisePoStState => update_surprise_post_state,
        OnSectorExpiry => on_sector_expiry,
        CommitSector => commit_sector,
        DeclareFaults => declare_faults,
        WithdrawPledge => withdraw_pledge,
    }
}
