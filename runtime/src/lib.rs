// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub use self::actor_error::*;
pub use self::builtin::*;
pub use self::util::*;
pub use dispatch::{dispatch, dispatch_default};

pub mod actor_error;
pub mod builtin;
mod dispatch;
pub mod runtime;
pub mod util;

#[cfg(feature = "test_utils")]
pub mod test_utils;

/// Hash function used for all HAMT key hashing.
pub type Hasher = fvm_ipld_hamt::Sha256;
