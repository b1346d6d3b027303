// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::tuple::*;
use fvm_ipld_encoding::CborStore;
use fvm_shared::error::ExitCode;
use fvm_shared::METHOD_CONSTRUCTOR;
use multihash::Code;
use num_derive::FromPrimitive;

use spc_actors_runtime::runtime::{ActorCode, Runtime};
use spc_actors_runtime::{
    actor_dispatch, ActorContext, ActorError, AsActorError, SYSTEM_ACTOR_ADDR,
};

/// System actor methods.
#[derive(FromPrimitive)]
#[repr(u64)]
pub enum Method {
    Constructor = METHOD_CONSTRUCTOR,
}

/// Builtin actor registry: actor type name to code CID.
pub type BuiltinActors = Vec<(String, Cid)>;

#[derive(Default, Debug, Serialize_tuple, Deserialize_tuple)]
pub struct ConstructorParams {
    pub builtin_actors: BuiltinActors,
}

/// System actor state.
#[derive(Default, Deserialize_tuple, Serialize_tuple, Debug, Clone)]
pub struct State {
    pub builtin_actors: Cid,
}

impl State {
    pub fn new<BS: Blockstore>(store: &BS, builtin_actors: &BuiltinActors) -> Result<Self, ActorError> {
        let c = store
            .put_cbor(builtin_actors, Code::Blake2b256)
            .context_code(ExitCode::USR_ILLEGAL_STATE, "failed to store system state")?;
        Ok(Self { builtin_actors: c })
    }

    pub fn get_builtin_actors<B: Blockstore>(&self, store: &B) -> Result<BuiltinActors, ActorError> {
        store
            .get_cbor(&self.builtin_actors)
            .context_code(ExitCode::USR_ILLEGAL_STATE, "failed to load builtin actor registry")?
            .context_code(ExitCode::USR_ILLEGAL_STATE, "builtin actor registry not found")
    }
}

/// System actor.
pub struct Actor;

impl Actor {
    /// System actor constructor.
    pub fn constructor(rt: &impl Runtime, params: ConstructorParams) -> Result<(), ActorError> {
        rt.validate_immediate_caller_is(std::iter::once(&SYSTEM_ACTOR_ADDR))?;

        let state =
            State::new(rt.store(), &params.builtin_actors).context("failed to construct state")?;
        rt.create(&state)?;
        Ok(())
    }
}

impl ActorCode for Actor {
    type Methods = Method;
    actor_dispatch! {
        Constructor => constructor [default_params],
    }
}

#[cfg(test)]
mod tests {
    use fvm_ipld_encoding::RawBytes;
    use fvm_shared::MethodNum;

    use spc_actors_runtime::runtime::builtins::Type;
    use spc_actors_runtime::test_utils::{MockRuntime, POWER_ACTOR_CODE_ID, SYSTEM_ACTOR_CODE_ID};
    use spc_actors_runtime::SYSTEM_ACTOR_ADDR;

    use crate::{Actor, ConstructorParams, Method, State};

    pub fn new_runtime() -> MockRuntime {
        MockRuntime {
            receiver: SYSTEM_ACTOR_ADDR,
            caller: SYSTEM_ACTOR_ADDR,
            caller_type: *SYSTEM_ACTOR_CODE_ID,
            ..Default::default()
        }
    }

    #[test]
    fn construct_with_empty_registry() {
        let mut rt = new_runtime();
        rt.expect_validate_caller_addr(vec![SYSTEM_ACTOR_ADDR]);
        rt.call::<Actor>(Method::Constructor as MethodNum, &RawBytes::default()).unwrap();
        rt.verify();

        let state: State = rt.get_state();
        let builtin_actors = state.get_builtin_actors(&rt.store).unwrap();
        assert!(builtin_actors.is_empty());
    }

    #[test]
    fn construct_with_registry() {
        let mut rt = new_runtime();
        let params = ConstructorParams {
            builtin_actors: vec![(Type::Power.name().to_string(), *POWER_ACTOR_CODE_ID)],
        };
        rt.expect_validate_caller_addr(vec![SYSTEM_ACTOR_ADDR]);
        rt.call::<Actor>(Method::Constructor as MethodNum, &RawBytes::serialize(&params).unwrap())
            .unwrap();
        rt.verify();

        let state: State = rt.get_state();
        assert_eq!(params.builtin_actors, state.get_builtin_actors(&rt.store).unwrap());
    }
}
