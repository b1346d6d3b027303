// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_encoding::RawBytes;
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::{ActorID, METHOD_CONSTRUCTOR};
use itertools::Itertools;
use num_derive::FromPrimitive;
use num_traits::{Signed, Zero};

use spc_actors_runtime::runtime::builtins::Type;
use spc_actors_runtime::runtime::{ActorCode, DomainSeparationTag, Runtime, StateHandle};
use spc_actors_runtime::{
    actor_dispatch, actor_error, resolve_to_actor_id, ActorError, BURNT_FUNDS_ACTOR_ADDR,
    CALLER_TYPES_SIGNABLE, CRON_ACTOR_ADDR, INIT_ACTOR_ADDR, SYSTEM_ACTOR_ADDR,
};

pub use self::balance_table::BalanceTable;
pub use self::policy::*;
pub use self::state::*;
pub use self::surprise::*;
pub use self::types::*;

pub mod balance_table;
pub mod ext;
mod policy;
mod state;
mod surprise;
pub mod testing;
mod types;

/// Escrow balance is below the pledge collateral requirement for the miner's power.
pub const ERR_INSUFFICIENT_PLEDGE_COLLATERAL: ExitCode = ExitCode::new(32);

/// Storage power actor methods available
#[derive(FromPrimitive)]
#[repr(u64)]
pub enum Method {
    Constructor = METHOD_CONSTRUCTOR,
    AddBalance = 2,
    WithdrawBalance = 3,
    CreateStorageMiner = 4,
    RemoveStorageMiner = 5,
    EnsurePledgeCollateralSatisfied = 6,
    ProcessPowerReport = 7,
    SlashPledgeForStorageFault = 8,
    EnrollSectorExpiry = 9,
    ClearSurprisePoStChallenge = 10,
    OnEpochTickEnd = 11,
    ReportConsensusFault = 12,
}

/// Storage Power Actor
pub struct Actor;

impl Actor {
    /// Constructor for StoragePower actor
    pub fn constructor(rt: &impl Runtime) -> Result<(), ActorError> {
        rt.validate_immediate_caller_is(std::iter::once(&SYSTEM_ACTOR_ADDR))?;
        let st = State::new(rt.store())?;
        rt.create(&st)?;
        Ok(())
    }

    /// Deposits the attached value into a registered miner's pledge escrow.
    pub fn add_balance(rt: &impl Runtime, params: AddBalanceParams) -> Result<(), ActorError> {
        rt.validate_immediate_caller_accept_any()?;
        let miner = Address::new_id(resolve_to_actor_id(rt, &params.miner)?);
        let amount = rt.message().value_received();

        rt.transaction(|st: &mut State, rt| {
            if !st.is_registered(rt.store(), &miner)? {
                return Err(actor_error!(illegal_argument; "miner {} not registered", miner));
            }
            let escrow = st.escrow(rt.store()).with_add(&miner, &amount)?.ok_or_else(|| {
                actor_error!(illegal_state; "negative amount {} added to escrow of {}", amount, miner)
            })?;
            st.set_escrow(&escrow);
            Ok(())
        })
    }

    /// Withdraws escrow in excess of the miner's pledge requirement, paying it to the miner.
    pub fn withdraw_balance(
        rt: &impl Runtime,
        params: WithdrawBalanceParams,
    ) -> Result<WithdrawBalanceReturn, ActorError> {
        let resolved = rt.resolve_address(&params.miner);
        rt.validate_immediate_caller_matches(&|caller: &Address, typ: Option<Type>| {
            typ == Some(Type::Miner) && resolved.is_some() && caller.id().ok() == resolved
        })?;
        let miner = rt.message().caller();

        if params.requested.is_negative() {
            return Err(actor_error!(illegal_argument; "negative withdrawal {}", params.requested));
        }

        let amount_withdrawn = rt.transaction(|st: &mut State, rt| {
            let entry = st
                .get_power_entry(rt.store(), &miner)?
                .ok_or_else(|| actor_error!(illegal_argument; "miner {} not registered", miner))?;
            let balance = st.escrow_balance(rt.store(), &miner)?;
            let min_balance = rt.curr_indices().pledge_collateral_requirement(
                &entry.active_power,
                &entry.inactive_power,
                &balance,
            );
            let (escrow, extracted) = st
                .escrow(rt.store())
                .with_extract_partial(&miner, &params.requested, &min_balance)?
                .ok_or_else(|| actor_error!(illegal_state; "failed to withdraw from {}", miner))?;
            st.set_escrow(&escrow);
            Ok(extracted)
        })?;

        if !amount_withdrawn.is_zero() {
            rt.send_funds(&miner, amount_withdrawn.clone())?;
        }
        Ok(WithdrawBalanceReturn { amount_withdrawn })
    }

    /// Creates a miner actor through the Init actor and registers it with zero power.
    /// The attached value seeds the new miner's pledge escrow.
    pub fn create_storage_miner(
        rt: &impl Runtime,
        params: CreateStorageMinerParams,
    ) -> Result<CreateStorageMinerReturn, ActorError> {
        rt.validate_immediate_caller_type(CALLER_TYPES_SIGNABLE)?;
        let value = rt.message().value_received();

        let constructor_params = RawBytes::serialize(ext::miner::MinerConstructorParams {
            owner: params.owner,
            worker: params.worker,
            peer_id: params.peer_id,
        })?;
        let exec_params = ext::init::ExecParams {
            code_cid: rt.get_code_cid_for_type(Type::Miner),
            constructor_params,
        };
        let addresses: ext::init::ExecReturn = rt
            .send(
                &INIT_ACTOR_ADDR,
                ext::init::EXEC_METHOD,
                RawBytes::serialize(exec_params)?,
                TokenAmount::zero(),
            )?
            .deserialize()?;

        rt.transaction(|st: &mut State, rt| {
            st.add_miner(rt.store(), &addresses.id_address, &value)
        })?;

        Ok(CreateStorageMinerReturn {
            id_address: addresses.id_address,
            robust_address: addresses.robust_address,
        })
    }

    /// Deregisters the calling miner. Requires zero power and an empty escrow.
    pub fn remove_storage_miner(rt: &impl Runtime) -> Result<(), ActorError> {
        rt.validate_immediate_caller_type(std::iter::once(&Type::Miner))?;
        let miner = rt.message().caller();

        rt.transaction(|st: &mut State, rt| {
            let entry = st
                .get_power_entry(rt.store(), &miner)?
                .ok_or_else(|| actor_error!(illegal_argument; "miner {} not registered", miner))?;
            if !entry.active_power.is_zero() || !entry.inactive_power.is_zero() {
                return Err(actor_error!(
                    illegal_state;
                    "miner {} still has power (active {}, inactive {})",
                    miner,
                    entry.active_power,
                    entry.inactive_power
                ));
            }
            let balance = st.escrow_balance(rt.store(), &miner)?;
            if !balance.is_zero() {
                return Err(actor_error!(illegal_state; "miner {} still has pledge {}", miner, balance));
            }
            st.remove_miner(rt.store(), &miner)
        })
    }

    /// Aborts with `ERR_INSUFFICIENT_PLEDGE_COLLATERAL` if the calling miner's escrow is
    /// below the requirement for its current power.
    pub fn ensure_pledge_collateral_satisfied(rt: &impl Runtime) -> Result<(), ActorError> {
        rt.validate_immediate_caller_type(std::iter::once(&Type::Miner))?;
        let miner = rt.message().caller();

        let (handle, st): (StateHandle, State) = rt.lease_state()?;
        let satisfied = Self::pledge_satisfied(rt, &st, &miner);
        rt.release_unchanged(handle, &st)?;

        if !satisfied? {
            return Err(ActorError::unchecked(
                ERR_INSUFFICIENT_PLEDGE_COLLATERAL,
                format!("insufficient pledge collateral for miner {}", miner),
            ));
        }
        Ok(())
    }

    fn pledge_satisfied(rt: &impl Runtime, st: &State, miner: &Address) -> Result<bool, ActorError> {
        let entry = st
            .get_power_entry(rt.store(), miner)?
            .ok_or_else(|| actor_error!(illegal_argument; "miner {} not registered", miner))?;
        let escrow = st.escrow(rt.store());
        let balance = st.escrow_balance(rt.store(), miner)?;
        let required = rt.curr_indices().pledge_collateral_requirement(
            &entry.active_power,
            &entry.inactive_power,
            &balance,
        );
        escrow
            .is_entry_sufficient(miner, &required)?
            .ok_or_else(|| actor_error!(illegal_state; "no escrow entry for {}", miner))
    }

    /// Replaces the calling miner's active and inactive power.
    pub fn process_power_report(
        rt: &impl Runtime,
        params: ProcessPowerReportParams,
    ) -> Result<(), ActorError> {
        rt.validate_immediate_caller_type(std::iter::once(&Type::Miner))?;
        let miner = rt.message().caller();

        if params.active_power.is_negative() || params.inactive_power.is_negative() {
            return Err(actor_error!(
                illegal_argument;
                "negative power reported (active {}, inactive {})",
                params.active_power,
                params.inactive_power
            ));
        }

        rt.transaction(|st: &mut State, rt| {
            let entry = PowerTableEntry {
                active_power: params.active_power,
                inactive_power: params.inactive_power,
            };
            st.set_power_entry(rt.policy(), rt.store(), &miner, entry)
        })
    }

    /// Slashes the calling miner's escrow for a storage fault and burns the proceeds.
    pub fn slash_pledge_for_storage_fault(
        rt: &impl Runtime,
        params: SlashPledgeForStorageFaultParams,
    ) -> Result<(), ActorError> {
        rt.validate_immediate_caller_type(std::iter::once(&Type::Miner))?;
        let miner = rt.message().caller();

        if params.affected_power.is_negative() {
            return Err(actor_error!(illegal_argument; "negative affected power {}", params.affected_power));
        }

        let slashed = rt.transaction(|st: &mut State, rt| {
            let entry = st
                .get_power_entry(rt.store(), &miner)?
                .ok_or_else(|| actor_error!(illegal_state; "miner {} not registered", miner))?;
            let balance = st.escrow_balance(rt.store(), &miner)?;
            let affected_pledge = rt.curr_indices().pledge_slash_for_storage_fault(
                &params.affected_power,
                &entry.active_power,
                &entry.inactive_power,
                &balance,
            );
            let amount = storage_fault_slash(&affected_pledge, params.fault_type);

            let (escrow, slashed) = st.escrow(rt.store()).with_subtract_clamped(&miner, &amount)?;
            if slashed < amount {
                log::warn!(
                    "storage fault slash for {} clamped from {} to escrow balance {}",
                    miner,
                    amount,
                    slashed
                );
            }
            st.set_escrow(&escrow);
            Ok(slashed)
        })?;

        if !slashed.is_zero() {
            rt.send_funds(&BURNT_FUNDS_ACTOR_ADDR, slashed)?;
        }
        Ok(())
    }

    /// Schedules an expiry notification for one of the calling miner's sectors.
    pub fn enroll_sector_expiry(
        rt: &impl Runtime,
        params: EnrollSectorExpiryParams,
    ) -> Result<(), ActorError> {
        rt.validate_immediate_caller_type(std::iter::once(&Type::Miner))?;
        let miner = rt.message().caller();
        let miner_id = caller_id(&miner)?;

        if params.expiry_epoch <= rt.curr_epoch() {
            return Err(actor_error!(
                illegal_argument;
                "sector expiry {} not after current epoch {}",
                params.expiry_epoch,
                rt.curr_epoch()
            ));
        }

        rt.transaction(|st: &mut State, rt| {
            if !st.is_registered(rt.store(), &miner)? {
                return Err(actor_error!(illegal_state; "miner {} not registered", miner));
            }
            let sector = SectorExpiryDescriptor { miner: miner_id, sector_number: params.sector_number };
            st.add_sector_expiry(rt.store(), params.expiry_epoch, sector)
        })
    }

    /// Cancels the calling miner's pending surprise challenge expiry after it proved.
    pub fn clear_surprise_post_challenge(
        rt: &impl Runtime,
        params: ClearSurprisePoStChallengeParams,
    ) -> Result<(), ActorError> {
        rt.validate_immediate_caller_type(std::iter::once(&Type::Miner))?;
        let miner = rt.message().caller();

        rt.transaction(|st: &mut State, rt| {
            if !st.clear_challenge_expiry(rt.store(), params.expiry_epoch, &miner)? {
                return Err(actor_error!(
                    not_found;
                    "no surprise challenge for {} expiring at {}",
                    miner,
                    params.expiry_epoch
                ));
            }
            Ok(())
        })
    }

    /// Per-epoch processing, invoked by the cron actor after all other messages.
    pub fn on_epoch_tick_end(rt: &impl Runtime) -> Result<(), ActorError> {
        rt.validate_immediate_caller_is(std::iter::once(&CRON_ACTOR_ADDR))?;

        Self::initiate_surprise_post_challenges(rt)?;
        Self::process_challenge_expiries(rt)?;
        Self::process_sector_expiries(rt)?;
        Ok(())
    }

    fn initiate_surprise_post_challenges(rt: &impl Runtime) -> Result<(), ActorError> {
        let st: State = rt.state()?;
        if st.miner_count == 0 {
            return Ok(());
        }

        let epoch = rt.curr_epoch();
        let seed = rt.get_randomness(DomainSeparationTag::SurprisePoStSelectMiners, epoch, &[])?;
        let policy = rt.policy();
        let expiry_epoch = epoch + policy.max_surprise_post_response_period;

        let selected = rt.transaction(|st: &mut State, rt| {
            let registered = st.registered_miners(rt.store())?;
            let swept = st.swept_miners(rt.store())?;
            let count = challenge_count(registered.len(), policy.proving_period);
            let selection = select_miners_to_surprise(
                |data| rt.hash_blake2b(data),
                &registered,
                &swept,
                count,
                &seed,
            );
            log::debug!(
                "epoch {}: surprise challenging {:?} of {} miners ({:?})",
                epoch,
                selection.selected,
                registered.len(),
                selection.sweep
            );

            let selected: Vec<Address> =
                selection.selected.iter().map(|id| Address::new_id(*id)).collect();
            st.add_challenge_expiries(rt.store(), expiry_epoch, &selected)?;
            st.update_sweep(rt.store(), &selection.sweep)?;
            Ok(selected)
        })?;

        let params = RawBytes::serialize(ext::miner::SurprisePoStChallengeParams {
            challenge_epoch: epoch,
            expiry_epoch,
        })?;
        for miner in selected {
            notify_miner(rt, &miner, ext::miner::SURPRISE_POST_CHALLENGE_METHOD, params.clone())?;
        }
        Ok(())
    }

    fn process_challenge_expiries(rt: &impl Runtime) -> Result<(), ActorError> {
        let epoch = rt.curr_epoch();
        let expired = rt.transaction(|st: &mut State, rt| {
            st.take_challenge_expiries(rt.store(), epoch)
        })?;

        for miner in expired.into_iter().sorted_by_key(|addr| addr.id().ok()) {
            notify_miner(
                rt,
                &miner,
                ext::miner::UPDATE_SURPRISE_POST_STATE_METHOD,
                RawBytes::default(),
            )?;
        }
        Ok(())
    }

    fn process_sector_expiries(rt: &impl Runtime) -> Result<(), ActorError> {
        let epoch = rt.curr_epoch();
        let expired =
            rt.transaction(|st: &mut State, rt| st.take_sector_expiries(rt.store(), epoch))?;

        for sector in expired.into_iter().sorted() {
            let params = RawBytes::serialize(ext::miner::OnSectorExpiryParams {
                sector_number: sector.sector_number,
            })?;
            notify_miner(
                rt,
                &Address::new_id(sector.miner),
                ext::miner::ON_SECTOR_EXPIRY_METHOD,
                params,
            )?;
        }
        Ok(())
    }

    /// Verifies a consensus fault, slashes the offender's escrow and rewards the reporter.
    pub fn report_consensus_fault(
        rt: &impl Runtime,
        params: ReportConsensusFaultParams,
    ) -> Result<ReportConsensusFaultReturn, ActorError> {
        rt.validate_immediate_caller_type(CALLER_TYPES_SIGNABLE)?;
        let reporter = rt.message().caller();

        let fault = rt
            .verify_consensus_fault(
                &params.block_header_1,
                &params.block_header_2,
                &params.block_header_extra,
            )
            .map_err(|e| actor_error!(illegal_argument; "fault not verified: {}", e))?
            .ok_or_else(|| actor_error!(illegal_argument; "no consensus fault"))?;

        if fault.epoch > rt.curr_epoch() {
            return Err(actor_error!(
                illegal_argument;
                "fault at epoch {} is after current epoch {}",
                fault.epoch,
                rt.curr_epoch()
            ));
        }
        let age = rt.curr_epoch() - fault.epoch;
        if age > rt.policy().consensus_fault_max_age {
            return Err(actor_error!(
                forbidden;
                "fault at epoch {} is {} epochs old, limit {}",
                fault.epoch,
                age,
                rt.policy().consensus_fault_max_age
            ));
        }

        let target = rt
            .resolve_address(&fault.target)
            .map(Address::new_id)
            .ok_or_else(|| actor_error!(not_found; "no actor for fault target {}", fault.target))?;

        let slashed = rt.transaction(|st: &mut State, rt| {
            let balance = st
                .escrow(rt.store())
                .get(&target)?
                .ok_or_else(|| actor_error!(not_found; "miner {} not registered", target))?;
            let amount = percent_of(&balance, CONSENSUS_FAULT_SLASH_PERCENT);
            let (escrow, slashed) = st.escrow(rt.store()).with_subtract_clamped(&target, &amount)?;
            if slashed.is_zero() {
                log::warn!("consensus fault by {} found an empty escrow", target);
            }
            st.set_escrow(&escrow);
            Ok(slashed)
        })?;

        let reward = percent_of(&slashed, rt.policy().consensus_fault_reporter_share_percent);
        let burnt = &slashed - &reward;
        if !reward.is_zero() {
            rt.send_funds(&reporter, reward.clone())?;
        }
        if !burnt.is_zero() {
            rt.send_funds(&BURNT_FUNDS_ACTOR_ADDR, burnt)?;
        }
        Ok(ReportConsensusFaultReturn { slashed, reward })
    }
}

fn caller_id(caller: &Address) -> Result<ActorID, ActorError> {
    caller.id().map_err(|_| actor_error!(illegal_state; "caller {} is not an ID address", caller))
}

/// Sends a scheduled notification to a miner. Failures of the miner are logged and
/// do not abort the tick.
fn notify_miner(
    rt: &impl Runtime,
    miner: &Address,
    method: u64,
    params: RawBytes,
) -> Result<(), ActorError> {
    let code = rt.send_catching_errors(miner, method, params, TokenAmount::zero())?;
    if !code.is_success() {
        log::error!("failed to notify miner {} with method {}: exit code {}", miner, method, code);
    }
    Ok(())
}

impl ActorCode for Actor {
    type Methods = Method;
    actor_dispatch! {
        Constructor => constructor,
        AddBalance => add_balance,
        WithdrawBalance => withdraw_balance,
        CreateStorageMiner => create_storage_miner,
        RemoveStorageMiner => remove_storage_miner,
        EnsurePledgeCollateralSatisfied => ensure_pledge_collateral_satisfied,
        ProcessPowerReport => process_power_report,
        SlashPledgeForStorageFault => slash_pledge_for_storage_fault,
        EnrollSectorExpiry => enroll_sector_expiry,
        ClearSurprisePoStChallenge => clear_surprise_post_challenge,
        OnEpochTickEnd => on_epoch_tick_end,
        ReportConsensusFault => report_consensus_fault,
    }
}
