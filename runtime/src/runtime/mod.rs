// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::{CborStore, RawBytes};
use fvm_shared::address::Address;
use fvm_shared::clock::ChainEpoch;
use fvm_shared::consensus::ConsensusFault;
use fvm_shared::crypto::signature::Signature;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::piece::PieceInfo;
use fvm_shared::randomness::RANDOMNESS_LENGTH;
use fvm_shared::sector::{RegisteredSealProof, SealVerifyInfo, WindowPoStVerifyInfo};
use fvm_shared::{ActorID, MethodNum, METHOD_SEND};
use multihash::Code;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use self::actor_code::*;
pub use self::indices::*;
pub use self::policy::*;
pub use self::randomness::{draw_randomness, DomainSeparationTag};
pub use self::state_handle::StateHandle;
use crate::runtime::builtins::Type;
use crate::{actor_error, ActorError};

mod actor_code;
pub mod builtins;
mod indices;
pub mod policy;
mod randomness;
mod state_handle;

pub(crate) mod empty;

pub use empty::EMPTY_ARR_CID;

/// Runtime is the VM's internal runtime object.
/// this is everything that is accessible to actors, beyond parameters.
///
/// All methods take `&self`: the runtime tracks per-invocation bookkeeping (caller
/// validation, the outstanding state lease) internally.
pub trait Runtime: Primitives + Verifier + RuntimePolicy {
    type Blockstore: Blockstore;

    /// Information related to the current message being executed.
    fn message(&self) -> &dyn MessageInfo;

    /// The current chain epoch number. The genesis block has epoch zero.
    fn curr_epoch(&self) -> ChainEpoch;

    /// Validates the caller against some predicate.
    /// Exported actor methods must invoke exactly one caller validation before returning.
    fn validate_immediate_caller_accept_any(&self) -> Result<(), ActorError>;
    fn validate_immediate_caller_is<'a, I>(&self, addresses: I) -> Result<(), ActorError>
    where
        I: IntoIterator<Item = &'a Address>;
    fn validate_immediate_caller_type<'a, I>(&self, types: I) -> Result<(), ActorError>
    where
        I: IntoIterator<Item = &'a Type>;
    /// Validates the caller with an arbitrary predicate over its address and actor kind.
    fn validate_immediate_caller_matches<P>(&self, pattern: &P) -> Result<(), ActorError>
    where
        P: CallerPattern + ?Sized;

    /// The balance of the receiver.
    fn current_balance(&self) -> TokenAmount;

    /// Resolves an address of any protocol to an ID address (via the Init actor's table).
    /// If the argument is an ID address it is returned directly.
    fn resolve_address(&self, address: &Address) -> Option<ActorID>;

    /// Look up the code ID at an actor address.
    fn get_actor_code_cid(&self, id: &ActorID) -> Option<Cid>;

    /// Returns whether the specified CodeCID belongs to a built-in actor.
    fn resolve_builtin_actor_type(&self, code_id: &Cid) -> Option<Type>;

    /// Returns the CodeCID for a built-in actor type.
    fn get_code_cid_for_type(&self, typ: Type) -> Cid;

    /// Randomness returns a (pseudo)random byte array drawing from the chain at the
    /// given epoch and incorporating requisite entropy.
    fn get_randomness(
        &self,
        personalization: DomainSeparationTag,
        rand_epoch: ChainEpoch,
        entropy: &[u8],
    ) -> Result<[u8; RANDOMNESS_LENGTH], ActorError>;

    /// Takes the single state lease of this invocation.
    fn acquire_state(&self) -> Result<StateHandle, ActorError>;

    /// Returns a lease without changing state. `expected` must equal the current head.
    fn release_state(&self, handle: StateHandle, expected: &Cid) -> Result<(), ActorError>;

    /// Returns a lease, installing `new_head` as the receiver's state.
    fn update_release_state(&self, handle: StateHandle, new_head: &Cid) -> Result<(), ActorError>;

    /// Returns reference to blockstore
    fn store(&self) -> &Self::Blockstore;

    /// Sends a message to another actor. If the callee aborts, its state changes (and
    /// those of any messages it sent in turn) are rolled back, the error is returned, and
    /// the enclosing message is marked as failed.
    fn send(
        &self,
        to: &Address,
        method: MethodNum,
        params: RawBytes,
        value: TokenAmount,
    ) -> Result<RawBytes, ActorError>;

    /// Sends a message, converting a callee abort into its exit code. Only the callee's
    /// call tree is rolled back. Restricted to the cron mechanism: either the receiver or
    /// the immediate caller must be the cron actor.
    fn send_catching_errors(
        &self,
        to: &Address,
        method: MethodNum,
        params: RawBytes,
        value: TokenAmount,
    ) -> Result<ExitCode, ActorError>;

    /// Computes an address for a new actor. The returned address is intended to uniquely refer to
    /// the actor even in the event of a chain re-org (whereas an ID-address might refer to a
    /// different actor after messages are re-ordered).
    /// Always an ActorExec address.
    fn new_actor_address(&self) -> Result<Address, ActorError>;

    /// Creates an actor with code `codeID` and an empty state at id `actor_id`.
    /// May only be called by Init actor.
    fn create_actor(&self, code_id: Cid, actor_id: ActorID) -> Result<(), ActorError>;

    /// Deletes the actor at `addr`, burning any remaining balance.
    /// May only be called by the actor itself.
    fn delete_actor(&self, addr: &Address) -> Result<(), ActorError>;

    /// Network economic indices.
    fn curr_indices(&self) -> &dyn EconomicIndices;

    /// Pure value transfer.
    fn send_funds(&self, to: &Address, amount: TokenAmount) -> Result<(), ActorError> {
        self.send(to, METHOD_SEND, RawBytes::default(), amount)?;
        Ok(())
    }

    /// Initializes the state object.
    /// This is only valid when the state has not yet been initialized.
    fn create<T: Serialize>(&self, obj: &T) -> Result<(), ActorError> {
        let handle = self.acquire_state()?;
        let head = handle.take();
        if head != *EMPTY_ARR_CID {
            handle.release(self, &head)?;
            return Err(actor_error!(
                illegal_state;
                "failed to create state; expected empty array CID, got: {}",
                head
            ));
        }
        let new_head = match self.ipld_put(obj) {
            Ok(c) => c,
            Err(e) => {
                handle.release(self, &head)?;
                return Err(e.wrap("failed to write actor state during creation"));
            }
        };
        handle.update_release(self, &new_head)
    }

    /// Loads a readonly copy of the state of the receiver.
    fn state<T: DeserializeOwned>(&self) -> Result<T, ActorError> {
        let (handle, st) = self.lease_state()?;
        let head = handle.take();
        handle.release(self, &head)?;
        Ok(st)
    }

    /// Loads a mutable copy of the state of the receiver, passes it to `f`,
    /// and after `f` completes puts the state object back to the store and sets it as
    /// the receiver's state root. If `f` fails the lease is released unchanged.
    ///
    /// During the call to `f`, execution is protected from side-effects, (including message send).
    ///
    /// Returns the result of `f`.
    fn transaction<S, RT, F>(&self, f: F) -> Result<RT, ActorError>
    where
        S: Serialize + DeserializeOwned,
        F: FnOnce(&mut S, &Self) -> Result<RT, ActorError>,
    {
        let (handle, mut st) = self.lease_state::<S>()?;
        let head = handle.take();
        let ret = match f(&mut st, self) {
            Ok(ret) => ret,
            Err(e) => {
                handle.release(self, &head)?;
                return Err(e);
            }
        };
        match self.ipld_put(&st) {
            Ok(new_head) => {
                handle.update_release(self, &new_head)?;
                Ok(ret)
            }
            Err(e) => {
                handle.release(self, &head)?;
                Err(e)
            }
        }
    }

    /// Takes the state lease and decodes the state it covers. The caller must give the
    /// handle back, usually with [`Runtime::release_unchanged`].
    fn lease_state<T: DeserializeOwned>(&self) -> Result<(StateHandle, T), ActorError> {
        let handle = self.acquire_state()?;
        let head = handle.take();
        match self.ipld_get(&head) {
            Ok(Some(st)) => Ok((handle, st)),
            Ok(None) => {
                handle.release(self, &head)?;
                Err(actor_error!(illegal_state; "state {} not found or not decodable", head))
            }
            Err(e) => {
                handle.release(self, &head)?;
                Err(e)
            }
        }
    }

    /// Releases a lease asserting that `st` still encodes to the leased head.
    fn release_unchanged<T: Serialize>(&self, handle: StateHandle, st: &T) -> Result<(), ActorError> {
        let expected = self.ipld_put(st)?;
        handle.release(self, &expected)
    }

    /// Loads a typed object. Absence and decode mismatches both yield `None`.
    fn ipld_get<T: DeserializeOwned>(&self, cid: &Cid) -> Result<Option<T>, ActorError> {
        let block = self
            .store()
            .get(cid)
            .map_err(|e| actor_error!(illegal_state; "failed to load {}: {}", cid, e))?;
        Ok(block.and_then(|bytes| fvm_ipld_encoding::from_slice(&bytes).ok()))
    }

    /// Stores a typed object as DAG-CBOR under its Blake2b-256 content id.
    fn ipld_put<T: Serialize>(&self, obj: &T) -> Result<Cid, ActorError> {
        self.store()
            .put_cbor(obj, Code::Blake2b256)
            .map_err(|e| actor_error!(illegal_state; "failed to store object: {}", e))
    }
}

/// Message information available to the actor about executing message.
pub trait MessageInfo {
    /// The address of the immediate calling actor. Always an ID-address.
    fn caller(&self) -> Address;

    /// The address of the actor receiving the message. Always an ID-address.
    fn receiver(&self) -> Address;

    /// The value attached to the message being processed, implicitly
    /// added to current_balance() before method invocation.
    fn value_received(&self) -> TokenAmount;
}

/// A predicate over the immediate caller, used by
/// [`Runtime::validate_immediate_caller_matches`].
pub trait CallerPattern {
    fn matches(&self, caller: &Address, caller_type: Option<Type>) -> bool;
}

impl<F> CallerPattern for F
where
    F: Fn(&Address, Option<Type>) -> bool,
{
    fn matches(&self, caller: &Address, caller_type: Option<Type>) -> bool {
        self(caller, caller_type)
    }
}

/// Pure functions implemented as primitives by the runtime.
pub trait Primitives {
    /// Hashes input data using blake2b with 256 bit output.
    fn hash_blake2b(&self, data: &[u8]) -> [u8; 32];

    /// Computes an unsealed sector CID (CommD) from its constituent piece CIDs (CommPs) and sizes.
    fn compute_unsealed_sector_cid(
        &self,
        proof_type: RegisteredSealProof,
        pieces: &[PieceInfo],
    ) -> Result<Cid, anyhow::Error>;

    /// Verifies that a signature is valid for an address and plaintext.
    fn verify_signature(
        &self,
        signature: &Signature,
        signer: &Address,
        plaintext: &[u8],
    ) -> Result<(), anyhow::Error>;
}

/// filcrypto verification primitives provided by the runtime
pub trait Verifier {
    /// Verifies a sector seal proof.
    fn verify_seal(&self, vi: &SealVerifyInfo) -> Result<(), anyhow::Error>;

    /// Verifies a proof of spacetime.
    fn verify_post(&self, verify_info: &WindowPoStVerifyInfo) -> Result<(), anyhow::Error>;

    /// Verifies that two block headers provide proof of a consensus fault:
    /// - both headers mined by the same actor
    /// - headers are different
    /// - first header is of the same or lower epoch as the second
    /// - the headers provide evidence of a fault.
    /// The third "extra" parameter is consulted only for the "parent grinding fault".
    /// Returns `None` if the headers don't prove a fault.
    fn verify_consensus_fault(
        &self,
        h1: &[u8],
        h2: &[u8],
        extra: &[u8],
    ) -> Result<Option<ConsensusFault>, anyhow::Error>;
}
