// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;

use super::Runtime;
use crate::ActorError;

/// An exclusive lease over the receiver's state root for the duration of one invocation.
///
/// The handle must be given back with exactly one of [`StateHandle::release`] (no change)
/// or [`StateHandle::update_release`] (new head). Sends, actor creation and deletion are
/// rejected while a handle is outstanding, and an invocation that returns while still
/// holding one fails.
#[must_use = "a leased state handle must be released before the invocation returns"]
#[derive(Debug, PartialEq, Eq)]
pub struct StateHandle {
    head: Cid,
    lease: u64,
}

impl StateHandle {
    /// Constructs a handle. Only runtimes should call this.
    #[doc(hidden)]
    pub fn lease(head: Cid, lease: u64) -> Self {
        Self { head, lease }
    }

    /// Content id of the state at the time the lease was taken.
    pub fn take(&self) -> Cid {
        self.head
    }

    /// Identifier the runtime uses to match a release to its lease.
    pub fn lease_id(&self) -> u64 {
        self.lease
    }

    /// Gives the lease back asserting the state is still `expected`.
    pub fn release<RT: Runtime + ?Sized>(self, rt: &RT, expected: &Cid) -> Result<(), ActorError> {
        rt.release_state(self, expected)
    }

    /// Gives the lease back installing `new_head` as the receiver's state.
    pub fn update_release<RT: Runtime + ?Sized>(
        self,
        rt: &RT,
        new_head: &Cid,
    ) -> Result<(), ActorError> {
        rt.update_release_state(self, new_head)
    }
}
