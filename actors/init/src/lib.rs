// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_shared::address::Address;
use fvm_shared::{ActorID, METHOD_CONSTRUCTOR};
use num_derive::FromPrimitive;

use spc_actors_runtime::runtime::builtins::Type;
use spc_actors_runtime::runtime::{ActorCode, Runtime};
use spc_actors_runtime::{actor_dispatch, actor_error, ActorError, SYSTEM_ACTOR_ADDR};

pub use self::state::State;
pub use self::types::*;

mod state;
pub mod testing;
mod types;

/// Init actor methods available
#[derive(FromPrimitive)]
#[repr(u64)]
pub enum Method {
    Constructor = METHOD_CONSTRUCTOR,
    Exec = 2,
}

/// Init actor
pub struct Actor;

impl Actor {
    /// Init actor constructor
    pub fn constructor(rt: &impl Runtime, params: ConstructorParams) -> Result<(), ActorError> {
        rt.validate_immediate_caller_is(std::iter::once(&SYSTEM_ACTOR_ADDR))?;
        let state = State::new(rt.store(), params.network_name)?;
        rt.create(&state)?;
        Ok(())
    }

    /// Creates a new actor of the given code, allocating its ID and invoking its constructor.
    pub fn exec(rt: &impl Runtime, params: ExecParams) -> Result<ExecReturn, ActorError> {
        rt.validate_immediate_caller_accept_any()?;

        let caller = rt.message().caller();
        let caller_code = caller
            .id()
            .ok()
            .and_then(|id| rt.get_actor_code_cid(&id))
            .ok_or_else(|| actor_error!(illegal_state; "no code for caller {}", caller))?;
        log::trace!("exec of {} requested by {} ({})", params.code_cid, caller, caller_code);

        if !can_exec(rt, &caller_code, &params.code_cid) {
            return Err(actor_error!(forbidden;
                "caller type {} cannot exec actor type {}", caller_code, params.code_cid));
        }

        // Compute a re-org-stable address.
        // This address exists for use by messages coming from outside the system, in order to
        // stably address the newly created actor even if a chain re-org causes it to end up with
        // a different ID.
        let robust_address = rt.new_actor_address()?;

        let id_address: ActorID = rt.transaction(|s: &mut State, rt| {
            s.map_address_to_new_id(rt.store(), &robust_address)
        })?;

        // Create an empty actor
        rt.create_actor(params.code_cid, id_address)?;

        // Invoke constructor
        rt.send(
            &Address::new_id(id_address),
            METHOD_CONSTRUCTOR,
            params.constructor_params,
            rt.message().value_received(),
        )
        .map_err(|err| err.wrap("constructor failed"))?;

        Ok(ExecReturn { id_address: Address::new_id(id_address), robust_address })
    }
}

/// Miners are created by the storage power actor only. No other builtin type is
/// created through exec: singletons exist from genesis and accounts are created
/// implicitly on first transfer.
fn can_exec(rt: &impl Runtime, caller: &Cid, exec: &Cid) -> bool {
    match rt.resolve_builtin_actor_type(exec) {
        Some(Type::Miner) => rt.resolve_builtin_actor_type(caller) == Some(Type::Power),
        _ => false,
    }
}

impl ActorCode for Actor {
    type Methods = Method;
    actor_dispatch! {
        Constructor => constructor,
        Exec => exec,
    }
}
