// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_shared::address::Address;
use fvm_shared::ActorID;

use crate::runtime::builtins::Type;
use crate::runtime::Runtime;
use crate::{actor_error, ActorError};

pub const HAMT_BIT_WIDTH: u32 = 5;

/// Actor types that may originate top-level messages.
pub const CALLER_TYPES_SIGNABLE: &[Type] = &[Type::Account];

/// Resolves the given address to its actor ID, failing with an illegal argument
/// error if no actor is bound to it.
pub fn resolve_to_actor_id(rt: &impl Runtime, address: &Address) -> Result<ActorID, ActorError> {
    rt.resolve_address(address)
        .ok_or_else(|| actor_error!(illegal_argument, "failed to resolve address {}", address))
}
