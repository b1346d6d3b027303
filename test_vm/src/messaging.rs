// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use anyhow::anyhow;
use cid::multihash::Code;
use cid::Cid;
use fvm_ipld_blockstore::MemoryBlockstore;
use fvm_ipld_encoding::{CborStore, RawBytes};
use fvm_shared::address::{Address, Payload};
use fvm_shared::clock::ChainEpoch;
use fvm_shared::consensus::ConsensusFault;
use fvm_shared::crypto::signature::Signature;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::piece::PieceInfo;
use fvm_shared::randomness::RANDOMNESS_LENGTH;
use fvm_shared::sector::{RegisteredSealProof, SealVerifyInfo, WindowPoStVerifyInfo};
use fvm_shared::{ActorID, MethodNum, METHOD_CONSTRUCTOR, METHOD_SEND};
use num_traits::{Signed, Zero};

use spc_actor_account::Actor as AccountActor;
use spc_actor_cron::Actor as CronActor;
use spc_actor_init::{Actor as InitActor, State as InitState};
use spc_actor_miner::Actor as MinerActor;
use spc_actor_power::Actor as PowerActor;
use spc_actor_system::Actor as SystemActor;
use spc_actors_runtime::runtime::builtins::Type;
use spc_actors_runtime::runtime::{
    ActorCode, CallerPattern, DomainSeparationTag, EconomicIndices, MessageInfo, Policy,
    Primitives, Runtime, RuntimePolicy, StateHandle, Verifier, EMPTY_ARR_CID,
};
use spc_actors_runtime::test_utils::*;
use spc_actors_runtime::{
    actor_error, ActorError, BURNT_FUNDS_ACTOR_ADDR, CRON_ACTOR_ADDR, INIT_ACTOR_ADDR,
    SYSTEM_ACTOR_ID,
};

use crate::trace::InvocationTrace;
use crate::{actor, ActorState, TestVM, TEST_VM_INVALID_POST, TEST_VM_INVALID_SIGNATURE};

/// Context shared by every invocation made on behalf of one top-level message.
pub struct TopCtx {
    pub originator_stable_addr: Address,
    pub originator_call_seq: u64,
    pub new_actor_addr_count: Cell<u64>,
}

#[derive(Clone, Debug)]
pub struct InternalMessage {
    pub from: ActorID,
    pub to: Address,
    pub value: TokenAmount,
    pub method: MethodNum,
    pub params: RawBytes,
}

/// The runtime handed to a single actor invocation.
pub struct InvocationCtx<'invocation> {
    pub v: &'invocation TestVM,
    pub top: &'invocation TopCtx,
    pub msg: InternalMessage,
    caller_validated: Cell<bool>,
    lease: Cell<Option<u64>>,
    next_lease: Cell<u64>,
    /// First fail-fast send failure seen by this invocation.
    aborted: RefCell<Option<ActorError>>,
    subinvocations: RefCell<Vec<InvocationTrace>>,
}

impl MessageInfo for InvocationCtx<'_> {
    fn caller(&self) -> Address {
        Address::new_id(self.msg.from)
    }
    fn receiver(&self) -> Address {
        self.msg.to
    }
    fn value_received(&self) -> TokenAmount {
        self.msg.value.clone()
    }
}

impl<'invocation> InvocationCtx<'invocation> {
    pub fn new(v: &'invocation TestVM, top: &'invocation TopCtx, msg: InternalMessage) -> Self {
        Self {
            v,
            top,
            msg,
            caller_validated: Cell::new(false),
            lease: Cell::new(None),
            next_lease: Cell::new(0),
            aborted: RefCell::new(None),
            subinvocations: RefCell::new(vec![]),
        }
    }

    /// Finds the receiver, creating an account actor for an unknown key address.
    fn resolve_target(&self, target: &Address) -> Result<(ActorState, Address), ActorError> {
        if let Some(a) = self.v.resolve_id_address(target) {
            if let Some(act) = self.v.actor(&a) {
                return Ok((act, a));
            }
            if target.protocol() == fvm_shared::address::Protocol::ID {
                return Err(ActorError::unchecked(
                    ExitCode::SYS_INVALID_RECEIVER,
                    format!("no actor at {}", target),
                ));
            }
        }

        match target.payload() {
            Payload::Secp256k1(_) | Payload::BLS(_) => {}
            _ => {
                return Err(ActorError::unchecked(
                    ExitCode::SYS_INVALID_RECEIVER,
                    format!("cannot create account for address {} type {}", target, target.protocol()),
                ));
            }
        }

        let mut st: InitState = self
            .v
            .get_state(&INIT_ACTOR_ADDR)
            .ok_or_else(|| actor_error!(illegal_state; "init actor state not found"))?;
        let target_id = st.map_address_to_new_id(&*self.v.store, target)?;
        let mut init_actor = self
            .v
            .actor(&INIT_ACTOR_ADDR)
            .ok_or_else(|| actor_error!(illegal_state; "init actor not found"))?;
        init_actor.head = self
            .v
            .store
            .put_cbor(&st, Code::Blake2b256)
            .map_err(|e| actor_error!(illegal_state; "failed to store init state: {}", e))?;
        self.v.set_actor(&INIT_ACTOR_ADDR, init_actor);

        let target_id_addr = Address::new_id(target_id);
        self.v.set_actor(
            &target_id_addr,
            actor(*ACCOUNT_ACTOR_CODE_ID, *EMPTY_ARR_CID, 0, TokenAmount::zero()),
        );
        let constructor = InternalMessage {
            from: SYSTEM_ACTOR_ID,
            to: target_id_addr,
            value: TokenAmount::zero(),
            method: METHOD_CONSTRUCTOR,
            params: RawBytes::serialize(target)?,
        };
        let mut new_ctx = InvocationCtx::new(self.v, self.top, constructor);
        let res = new_ctx.invoke();
        let trace = new_ctx.gather_trace(&res);
        self.subinvocations.borrow_mut().push(trace);
        res?;

        let act = self
            .v
            .actor(&target_id_addr)
            .ok_or_else(|| actor_error!(illegal_state; "account {} vanished", target_id_addr))?;
        Ok((act, target_id_addr))
    }

    pub fn gather_trace(&mut self, invoke_result: &Result<RawBytes, ActorError>) -> InvocationTrace {
        let (return_value, exit_code) = match invoke_result {
            Ok(ret) => (ret.clone(), ExitCode::OK),
            Err(e) => (RawBytes::default(), e.exit_code()),
        };
        let to = self.v.resolve_id_address(&self.msg.to).unwrap_or(self.msg.to);
        InvocationTrace {
            from: self.msg.from,
            to,
            value: self.msg.value.clone(),
            method: self.msg.method,
            params: self.msg.params.clone(),
            exit_code,
            return_value,
            subinvocations: self.subinvocations.take(),
        }
    }

    /// Runs the message, rolling back every state change it made if it fails.
    pub fn invoke(&mut self) -> Result<RawBytes, ActorError> {
        let prior_root = self.v.checkpoint();
        let res = self.invoke_inner();
        if res.is_err() {
            self.v.rollback(prior_root);
        }
        res
    }

    fn invoke_inner(&mut self) -> Result<RawBytes, ActorError> {
        // Transfer funds
        let from_addr = Address::new_id(self.msg.from);
        let mut from_actor = self.v.actor(&from_addr).ok_or_else(|| {
            ActorError::unchecked(ExitCode::SYS_SENDER_INVALID, format!("no sender actor {}", from_addr))
        })?;
        if self.msg.value.is_negative() {
            return Err(ActorError::unchecked(
                ExitCode::SYS_ASSERTION_FAILED,
                "attempt to transfer negative value".to_string(),
            ));
        }
        if from_actor.balance < self.msg.value {
            return Err(ActorError::unchecked(
                ExitCode::SYS_INSUFFICIENT_FUNDS,
                format!("insufficient balance {} to transfer {}", from_actor.balance, self.msg.value),
            ));
        }

        // Load, deduct, store from actor before loading to actor to handle self-send case
        from_actor.balance -= &self.msg.value;
        self.v.set_actor(&from_addr, from_actor);

        let (mut to_actor, to_addr) = self.resolve_target(&self.msg.to)?;
        to_actor.balance += &self.msg.value;
        let code = to_actor.code;
        self.v.set_actor(&to_addr, to_actor);
        self.msg.to = to_addr;

        if self.msg.method == METHOD_SEND {
            return Ok(RawBytes::default());
        }

        let method = self.msg.method;
        let params = self.msg.params.clone();
        let typ = ACTOR_TYPES.get(&code).copied().ok_or_else(|| {
            ActorError::unchecked(
                ExitCode::SYS_INVALID_RECEIVER,
                format!("actor {} has unknown code {}", to_addr, code),
            )
        })?;
        let rt = &*self;
        let mut res = match typ {
            Type::System => SystemActor::invoke_method(rt, method, &params),
            Type::Init => InitActor::invoke_method(rt, method, &params),
            Type::Cron => CronActor::invoke_method(rt, method, &params),
            Type::Account => AccountActor::invoke_method(rt, method, &params),
            Type::Power => PowerActor::invoke_method(rt, method, &params),
            Type::Miner => MinerActor::invoke_method(rt, method, &params),
        };

        if res.is_ok() {
            if let Some(e) = self.aborted.take() {
                res = Err(e.wrap(format!("send from {} failed", to_addr)));
            } else if let Some(lease) = self.lease.get() {
                res = Err(actor_error!(runtime_api; "returned while holding state lease {}", lease));
            } else if !self.caller_validated.get() {
                res = Err(actor_error!(assertion_failed; "failed to validate caller"));
            }
        }
        res
    }

    fn require_no_lease(&self) -> Result<(), ActorError> {
        if self.lease.get().is_some() {
            return Err(actor_error!(assertion_failed; "side-effect within transaction"));
        }
        Ok(())
    }

    fn mark_caller_validated(&self) -> Result<(), ActorError> {
        if self.caller_validated.replace(true) {
            return Err(actor_error!(runtime_api; "caller double validated"));
        }
        Ok(())
    }

    fn check_lease(&self, handle: &StateHandle) -> Result<(), ActorError> {
        match self.lease.get() {
            Some(id) if id == handle.lease_id() => Ok(()),
            _ => Err(actor_error!(runtime_api; "release of unknown state lease {}", handle.lease_id())),
        }
    }

    fn receiver_actor(&self) -> Result<ActorState, ActorError> {
        self.v.actor(&self.msg.to).ok_or_else(|| {
            actor_error!(runtime_api; "receiver {} does not exist", self.msg.to)
        })
    }

    fn caller_type(&self) -> Option<Type> {
        self.v
            .actor(&Address::new_id(self.msg.from))
            .and_then(|a| ACTOR_TYPES.get(&a.code).copied())
    }

    /// Runs a nested message and records its trace.
    fn send_inner(
        &self,
        to: &Address,
        method: MethodNum,
        params: RawBytes,
        value: TokenAmount,
    ) -> Result<RawBytes, ActorError> {
        let from = self.msg.to.id().map_err(|e| actor_error!(runtime_api; "bad receiver: {}", e))?;
        let msg = InternalMessage { from, to: *to, value, method, params };
        let mut new_ctx = InvocationCtx::new(self.v, self.top, msg);
        let res = new_ctx.invoke();
        let trace = new_ctx.gather_trace(&res);
        self.subinvocations.borrow_mut().push(trace);
        res
    }
}

impl Runtime for InvocationCtx<'_> {
    type Blockstore = Rc<MemoryBlockstore>;

    fn message(&self) -> &dyn MessageInfo {
        self
    }

    fn curr_epoch(&self) -> ChainEpoch {
        self.v.epoch()
    }

    fn validate_immediate_caller_accept_any(&self) -> Result<(), ActorError> {
        self.mark_caller_validated()
    }

    fn validate_immediate_caller_is<'a, I>(&self, addresses: I) -> Result<(), ActorError>
    where
        I: IntoIterator<Item = &'a Address>,
    {
        self.mark_caller_validated()?;
        let caller = self.caller();
        if addresses.into_iter().any(|a| *a == caller) {
            return Ok(());
        }
        Err(actor_error!(forbidden; "immediate caller {} address forbidden", caller))
    }

    fn validate_immediate_caller_type<'a, I>(&self, types: I) -> Result<(), ActorError>
    where
        I: IntoIterator<Item = &'a Type>,
    {
        self.mark_caller_validated()?;
        if let Some(to_match) = self.caller_type() {
            if types.into_iter().any(|t| *t == to_match) {
                return Ok(());
            }
        }
        Err(actor_error!(forbidden; "immediate caller {} actor type forbidden", self.caller()))
    }

    fn validate_immediate_caller_matches<P>(&self, pattern: &P) -> Result<(), ActorError>
    where
        P: CallerPattern + ?Sized,
    {
        self.mark_caller_validated()?;
        if pattern.matches(&self.caller(), self.caller_type()) {
            return Ok(());
        }
        Err(actor_error!(forbidden; "immediate caller {} does not match", self.caller()))
    }

    fn current_balance(&self) -> TokenAmount {
        self.v.actor(&self.msg.to).map(|a| a.balance).unwrap_or_default()
    }

    fn resolve_address(&self, address: &Address) -> Option<ActorID> {
        self.v.resolve_id_address(address).and_then(|a| a.id().ok())
    }

    fn get_actor_code_cid(&self, id: &ActorID) -> Option<Cid> {
        self.v.actor(&Address::new_id(*id)).map(|a| a.code)
    }

    fn resolve_builtin_actor_type(&self, code_id: &Cid) -> Option<Type> {
        ACTOR_TYPES.get(code_id).cloned()
    }

    fn get_code_cid_for_type(&self, typ: Type) -> Cid {
        ACTOR_CODES[&typ]
    }

    fn get_randomness(
        &self,
        personalization: DomainSeparationTag,
        rand_epoch: ChainEpoch,
        entropy: &[u8],
    ) -> Result<[u8; RANDOMNESS_LENGTH], ActorError> {
        if rand_epoch > self.v.epoch() {
            return Err(actor_error!(illegal_argument;
                "randomness requested for future epoch {} at {}", rand_epoch, self.v.epoch()));
        }
        Ok(self.v.randomness(personalization, rand_epoch, entropy))
    }

    fn acquire_state(&self) -> Result<StateHandle, ActorError> {
        if let Some(id) = self.lease.get() {
            return Err(actor_error!(runtime_api; "state already leased ({})", id));
        }
        let head = self.receiver_actor()?.head;
        let id = self.next_lease.get();
        self.next_lease.set(id + 1);
        self.lease.set(Some(id));
        Ok(StateHandle::lease(head, id))
    }

    fn release_state(&self, handle: StateHandle, expected: &Cid) -> Result<(), ActorError> {
        self.check_lease(&handle)?;
        let head = self.receiver_actor()?.head;
        if head != *expected {
            return Err(actor_error!(runtime_api;
                "state released as unchanged with head {}, but current head is {}", expected, head));
        }
        self.lease.set(None);
        Ok(())
    }

    fn update_release_state(&self, handle: StateHandle, new_head: &Cid) -> Result<(), ActorError> {
        self.check_lease(&handle)?;
        let mut act = self.receiver_actor()?;
        act.head = *new_head;
        self.v.set_actor(&self.msg.to, act);
        self.lease.set(None);
        Ok(())
    }

    fn store(&self) -> &Rc<MemoryBlockstore> {
        &self.v.store
    }

    fn send(
        &self,
        to: &Address,
        method: MethodNum,
        params: RawBytes,
        value: TokenAmount,
    ) -> Result<RawBytes, ActorError> {
        self.require_no_lease()?;
        let res = self.send_inner(to, method, params, value);
        if let Err(e) = &res {
            self.aborted.borrow_mut().get_or_insert_with(|| e.clone());
        }
        res
    }

    fn send_catching_errors(
        &self,
        to: &Address,
        method: MethodNum,
        params: RawBytes,
        value: TokenAmount,
    ) -> Result<ExitCode, ActorError> {
        if self.msg.to != CRON_ACTOR_ADDR && self.caller() != CRON_ACTOR_ADDR {
            return Err(actor_error!(runtime_api;
                "non-propagating send to {} outside the cron mechanism", to));
        }
        self.require_no_lease()?;
        Ok(match self.send_inner(to, method, params, value) {
            Ok(_) => ExitCode::OK,
            Err(e) => e.exit_code(),
        })
    }

    fn new_actor_address(&self) -> Result<Address, ActorError> {
        let count = self.top.new_actor_addr_count.get();
        self.top.new_actor_addr_count.set(count + 1);

        let mut b = self.top.originator_stable_addr.to_bytes();
        b.extend_from_slice(&self.top.originator_call_seq.to_be_bytes());
        b.extend_from_slice(&count.to_be_bytes());
        Ok(Address::new_actor(&b))
    }

    fn create_actor(&self, code_id: Cid, actor_id: ActorID) -> Result<(), ActorError> {
        self.require_no_lease()?;
        if self.msg.to != INIT_ACTOR_ADDR {
            return Err(actor_error!(runtime_api; "actor {} may not create actors", self.msg.to));
        }
        match ACTOR_TYPES.get(&code_id) {
            Some(typ) if !typ.is_singleton() => {}
            _ => {
                return Err(actor_error!(runtime_api;
                    "create_actor called with singleton or unknown code {}", code_id));
            }
        }
        let addr = Address::new_id(actor_id);
        if self.v.actor(&addr).is_some() {
            return Err(actor_error!(forbidden; "attempt to create new actor at existing address {}", addr));
        }
        self.v.set_actor(&addr, actor(code_id, *EMPTY_ARR_CID, 0, TokenAmount::zero()));
        Ok(())
    }

    fn delete_actor(&self, addr: &Address) -> Result<(), ActorError> {
        self.require_no_lease()?;
        if *addr != self.msg.to {
            return Err(actor_error!(runtime_api; "actor {} cannot delete {}", self.msg.to, addr));
        }
        let act = self.receiver_actor()?;
        if !act.balance.is_zero() {
            let mut burnt = self.v.actor(&BURNT_FUNDS_ACTOR_ADDR).ok_or_else(|| {
                actor_error!(illegal_state; "burnt funds actor not found")
            })?;
            burnt.balance += &act.balance;
            self.v.set_actor(&BURNT_FUNDS_ACTOR_ADDR, burnt);
        }
        self.v.delete_actor(addr);
        Ok(())
    }

    fn curr_indices(&self) -> &dyn EconomicIndices {
        self.v.indices()
    }
}

impl Primitives for InvocationCtx<'_> {
    fn hash_blake2b(&self, data: &[u8]) -> [u8; 32] {
        blake2b_256(data)
    }

    fn compute_unsealed_sector_cid(
        &self,
        _proof_type: RegisteredSealProof,
        _pieces: &[PieceInfo],
    ) -> Result<Cid, anyhow::Error> {
        Err(anyhow!("unsealed sector cids are not supported by the test vm"))
    }

    fn verify_signature(
        &self,
        signature: &Signature,
        _signer: &Address,
        _plaintext: &[u8],
    ) -> Result<(), anyhow::Error> {
        if signature.bytes == TEST_VM_INVALID_SIGNATURE {
            return Err(anyhow!("invalid signature"));
        }
        Ok(())
    }
}

impl Verifier for InvocationCtx<'_> {
    fn verify_seal(&self, _vi: &SealVerifyInfo) -> Result<(), anyhow::Error> {
        Ok(())
    }

    fn verify_post(&self, verify_info: &WindowPoStVerifyInfo) -> Result<(), anyhow::Error> {
        for proof in &verify_info.proofs {
            if proof.proof_bytes == TEST_VM_INVALID_POST.as_bytes() {
                return Err(anyhow!("invalid proof"));
            }
        }
        Ok(())
    }

    fn verify_consensus_fault(
        &self,
        _h1: &[u8],
        _h2: &[u8],
        _extra: &[u8],
    ) -> Result<Option<ConsensusFault>, anyhow::Error> {
        Ok(None)
    }
}

impl RuntimePolicy for InvocationCtx<'_> {
    fn policy(&self) -> &Policy {
        self.v.policy()
    }
}
