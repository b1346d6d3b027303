// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_encoding::tuple::*;
use fvm_ipld_encoding::RawBytes;
use fvm_shared::econ::TokenAmount;
use fvm_shared::METHOD_CONSTRUCTOR;
use num_derive::FromPrimitive;
use num_traits::Zero;

use spc_actors_runtime::runtime::{ActorCode, Runtime};
use spc_actors_runtime::{actor_dispatch, actor_error, ActorError, SYSTEM_ACTOR_ADDR};

pub use self::state::{Entry, State};

mod state;
pub mod testing;

/// Cron actor methods available
#[derive(FromPrimitive)]
#[repr(u64)]
pub enum Method {
    Constructor = METHOD_CONSTRUCTOR,
    EpochTick = 2,
}

/// Constructor parameters for Cron actor, contains entries
/// of actors and methods to call on each epoch
#[derive(Default, Debug, Serialize_tuple, Deserialize_tuple)]
pub struct ConstructorParams {
    /// Entries is a set of actors (and corresponding methods) to call during EpochTick.
    pub entries: Vec<Entry>,
}

/// Cron actor
pub struct Actor;

impl Actor {
    /// Constructor for Cron actor
    pub fn constructor(rt: &impl Runtime, params: ConstructorParams) -> Result<(), ActorError> {
        rt.validate_immediate_caller_is(std::iter::once(&SYSTEM_ACTOR_ADDR))?;
        if let Some(entry) = params.entries.iter().find(|e| e.receiver.id().is_err()) {
            return Err(actor_error!(
                illegal_argument;
                "cron entry receiver {} is not an ID address",
                entry.receiver
            ));
        }
        rt.create(&State { entries: params.entries })?;
        Ok(())
    }

    /// Executes built-in periodic actions, run at every Epoch.
    /// epoch_tick(r) is called after all other messages in the epoch have been applied.
    /// This can be seen as an implicit last message.
    pub fn epoch_tick(rt: &impl Runtime) -> Result<(), ActorError> {
        rt.validate_immediate_caller_is(std::iter::once(&SYSTEM_ACTOR_ADDR))?;

        let st: State = rt.state()?;
        for entry in st.entries {
            // A failing entry is rolled back on its own and must not stop the others.
            let code = rt.send_catching_errors(
                &entry.receiver,
                entry.method_num,
                RawBytes::default(),
                TokenAmount::zero(),
            )?;
            if !code.is_success() {
                log::error!(
                    "cron failed to send entry to {}, method {}, exit code {}",
                    entry.receiver,
                    entry.method_num,
                    code
                );
            }
        }
        Ok(())
    }
}

impl ActorCode for Actor {
    type Methods = Method;
    actor_dispatch! {
        Constructor => constructor,
        EpochTick => epoch_tick,
    }
}
