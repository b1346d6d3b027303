// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use cid::Cid;
use fvm_ipld_blockstore::MemoryBlockstore;
use fvm_ipld_encoding::tuple::*;
use fvm_ipld_encoding::{CborStore, RawBytes};
use fvm_shared::address::{Address, Protocol};
use fvm_shared::clock::ChainEpoch;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::randomness::RANDOMNESS_LENGTH;
use fvm_shared::{ActorID, MethodNum, METHOD_CONSTRUCTOR, METHOD_SEND};
use num_traits::Zero;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::de::DeserializeOwned;

use spc_actor_cron::{ConstructorParams as CronConstructorParams, Entry as CronEntry};
use spc_actor_init::{ConstructorParams as InitConstructorParams, State as InitState};
use spc_actor_power::Method as PowerMethod;
use spc_actor_system::ConstructorParams as SystemConstructorParams;
use spc_actors_runtime::runtime::builtins::Type;
use spc_actors_runtime::runtime::{
    draw_randomness, DomainSeparationTag, LinearIndices, Policy, EMPTY_ARR_CID,
};
use spc_actors_runtime::test_utils::*;
use spc_actors_runtime::{
    ActorError, Map, BURNT_FUNDS_ACTOR_ADDR, CRON_ACTOR_ADDR, DEFAULT_HAMT_CONFIG, INIT_ACTOR_ADDR,
    STORAGE_POWER_ACTOR_ADDR, SYSTEM_ACTOR_ADDR, SYSTEM_ACTOR_ID,
};

use crate::messaging::{InternalMessage, InvocationCtx, TopCtx};
use crate::trace::InvocationTrace;

pub use constants::*;

mod constants;
pub mod expects;
mod messaging;
pub mod trace;
pub mod util;

type ActorMap = Map<Rc<MemoryBlockstore>, ActorID, ActorState>;

/// An in-memory VM executing the builtin actors against a content-addressed state tree.
///
/// Every invocation checkpoints the actor tree and rolls it back if the invocation fails, so
/// a failed top-level message leaves no trace beyond its sender's call sequence number.
pub struct TestVM {
    pub store: Rc<MemoryBlockstore>,
    actors: RefCell<ActorMap>,
    epoch: Cell<ChainEpoch>,
    policy: Policy,
    indices: LinearIndices,
    invocations: RefCell<Vec<InvocationTrace>>,
}

#[derive(Serialize_tuple, Deserialize_tuple, Clone, PartialEq, Eq, Debug)]
pub struct ActorState {
    pub code: Cid,
    pub head: Cid,
    pub call_seq: u64,
    pub balance: TokenAmount,
}

pub fn actor(code: Cid, head: Cid, call_seq: u64, balance: TokenAmount) -> ActorState {
    ActorState { code, head, call_seq, balance }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MessageResult {
    pub code: ExitCode,
    pub message: String,
    pub ret: RawBytes,
}

#[derive(Debug, thiserror::Error)]
#[error("{msg}")]
pub struct VMError {
    msg: String,
}

pub fn vm_err(msg: &str) -> VMError {
    VMError { msg: msg.to_string() }
}

impl From<ActorError> for VMError {
    fn from(e: ActorError) -> Self {
        vm_err(&e.to_string())
    }
}

impl TestVM {
    /// Creates a VM with an empty state tree at epoch zero.
    pub fn new(store: Rc<MemoryBlockstore>) -> TestVM {
        let actors = ActorMap::empty(store.clone(), DEFAULT_HAMT_CONFIG, "actors");
        TestVM {
            store,
            actors: RefCell::new(actors),
            epoch: Cell::new(0),
            policy: Policy::default(),
            indices: LinearIndices::default(),
            invocations: RefCell::new(vec![]),
        }
    }

    /// Creates a VM holding the singleton actors, the burnt funds account and a funded
    /// faucet account. Cron runs the power actor's end-of-epoch processing.
    pub fn new_with_singletons(store: Rc<MemoryBlockstore>) -> TestVM {
        let entries = vec![CronEntry {
            receiver: STORAGE_POWER_ACTOR_ADDR,
            method_num: PowerMethod::OnEpochTickEnd as MethodNum,
        }];
        Self::new_with_cron_entries(store, entries)
    }

    /// Like [`TestVM::new_with_singletons`] with an explicit cron table.
    pub fn new_with_cron_entries(store: Rc<MemoryBlockstore>, entries: Vec<CronEntry>) -> TestVM {
        let v = TestVM::new(store);
        let supply = TokenAmount::from_whole(FAUCET_SUPPLY);

        // system is constructed first so that it can fund the faucet
        v.set_actor(&SYSTEM_ACTOR_ADDR, actor(*SYSTEM_ACTOR_CODE_ID, *EMPTY_ARR_CID, 0, supply.clone()));
        let builtin_actors =
            ACTOR_CODES.iter().map(|(typ, code)| (typ.name().to_string(), *code)).collect();
        v.construct_singleton(
            &SYSTEM_ACTOR_ADDR,
            Type::System,
            RawBytes::serialize(SystemConstructorParams { builtin_actors }).unwrap(),
        );
        v.construct_singleton(
            &INIT_ACTOR_ADDR,
            Type::Init,
            RawBytes::serialize(InitConstructorParams { network_name: TEST_NETWORK_NAME.to_string() })
                .unwrap(),
        );
        v.construct_singleton(&STORAGE_POWER_ACTOR_ADDR, Type::Power, RawBytes::default());
        v.construct_singleton(
            &CRON_ACTOR_ADDR,
            Type::Cron,
            RawBytes::serialize(CronConstructorParams { entries }).unwrap(),
        );
        v.construct_singleton(
            &BURNT_FUNDS_ACTOR_ADDR,
            Type::Account,
            RawBytes::serialize(Address::new_bls(BURNT_FUNDS_KEY).unwrap()).unwrap(),
        );

        // the faucet is created implicitly by the first transfer to its key
        let faucet_key = Address::new_bls(FAUCET_ROOT_KEY).unwrap();
        let res = v
            .execute_message_implicit(&SYSTEM_ACTOR_ADDR, &faucet_key, &supply, METHOD_SEND, RawBytes::default())
            .unwrap();
        assert_eq!(ExitCode::OK, res.code, "failed to fund faucet: {}", res.message);
        assert_eq!(Some(TEST_FAUCET_ADDR), v.resolve_id_address(&faucet_key));

        v.checkpoint();
        v.take_invocations();
        v
    }

    fn construct_singleton(&self, addr: &Address, typ: Type, params: RawBytes) {
        if self.actor(addr).is_none() {
            self.set_actor(addr, actor(ACTOR_CODES[&typ], *EMPTY_ARR_CID, 0, TokenAmount::zero()));
        }
        let res = self
            .execute_message_implicit(&SYSTEM_ACTOR_ADDR, addr, &TokenAmount::zero(), METHOD_CONSTRUCTOR, params)
            .unwrap();
        assert_eq!(ExitCode::OK, res.code, "failed to construct {} actor: {}", typ.name(), res.message);
    }

    pub fn epoch(&self) -> ChainEpoch {
        self.epoch.get()
    }

    /// Moves the chain to `epoch`. Epochs only move forward.
    pub fn set_epoch(&self, epoch: ChainEpoch) {
        assert!(epoch >= self.epoch.get(), "epoch {} is before current {}", epoch, self.epoch.get());
        self.epoch.set(epoch);
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn indices(&self) -> &LinearIndices {
        &self.indices
    }

    pub fn actor(&self, addr: &Address) -> Option<ActorState> {
        let id = addr.id().ok()?;
        self.actors.borrow().get(&id).ok().flatten().cloned()
    }

    /// Blindly overwrites the actor at this ID address whether it previously existed or not.
    pub fn set_actor(&self, addr: &Address, a: ActorState) {
        let id = addr.id().expect("actors are stored under ID addresses");
        self.actors.borrow_mut().set(&id, a).unwrap();
    }

    pub fn delete_actor(&self, addr: &Address) {
        let id = addr.id().expect("actors are stored under ID addresses");
        self.actors.borrow_mut().delete(&id).unwrap();
    }

    pub fn balance(&self, addr: &Address) -> TokenAmount {
        self.resolve_id_address(addr)
            .and_then(|id| self.actor(&id))
            .map(|a| a.balance)
            .unwrap_or_default()
    }

    /// Sum of all actor balances. Only top-level value injection changes it.
    pub fn total_balance(&self) -> TokenAmount {
        let mut total = TokenAmount::zero();
        self.actors
            .borrow()
            .for_each(|_, a| {
                total += &a.balance;
                Ok(())
            })
            .unwrap();
        total
    }

    /// Flushes the actor tree and returns its root.
    pub fn checkpoint(&self) -> Cid {
        self.actors.borrow_mut().flush().unwrap()
    }

    /// Restores the actor tree to a root previously returned by [`TestVM::checkpoint`].
    pub fn rollback(&self, root: Cid) {
        let actors = ActorMap::load(self.store.clone(), &root, DEFAULT_HAMT_CONFIG, "actors").unwrap();
        *self.actors.borrow_mut() = actors;
    }

    /// Resolves any address to its ID address through the init actor's table.
    pub fn resolve_id_address(&self, addr: &Address) -> Option<Address> {
        if addr.protocol() == Protocol::ID {
            return Some(*addr);
        }
        let st: InitState = self.get_state(&INIT_ACTOR_ADDR)?;
        st.resolve_address(&*self.store, addr).ok().flatten().map(Address::new_id)
    }

    pub fn get_state<T: DeserializeOwned>(&self, addr: &Address) -> Option<T> {
        let a = self.actor(&self.resolve_id_address(addr)?)?;
        self.store.get_cbor(&a.head).ok().flatten()
    }

    /// Beacon randomness for `epoch`, mixed with the tag and entropy.
    pub fn randomness(
        &self,
        tag: DomainSeparationTag,
        epoch: ChainEpoch,
        entropy: &[u8],
    ) -> [u8; RANDOMNESS_LENGTH] {
        let mut rng = ChaCha8Rng::seed_from_u64(TEST_VM_RAND_SEED ^ epoch as u64);
        let mut base = [0u8; RANDOMNESS_LENGTH];
        rng.fill_bytes(&mut base);
        draw_randomness(blake2b_256, &base, tag, epoch, entropy)
    }

    /// Applies a signed message from an account actor.
    pub fn apply_message(
        &self,
        from: &Address,
        to: &Address,
        value: &TokenAmount,
        method: MethodNum,
        params: RawBytes,
    ) -> Result<MessageResult, VMError> {
        let from_id = self
            .resolve_id_address(from)
            .ok_or_else(|| vm_err(&format!("sender {} not found", from)))?;
        let mut sender =
            self.actor(&from_id).ok_or_else(|| vm_err(&format!("sender {} not found", from)))?;
        if ACTOR_TYPES.get(&sender.code) != Some(&Type::Account) {
            return Err(vm_err(&format!("sender {} is not an account", from)));
        }
        let call_seq = sender.call_seq;
        sender.call_seq += 1;
        self.set_actor(&from_id, sender);

        self.execute(*from, from_id, call_seq, to, value, method, params)
    }

    /// Applies a message from the system actor (block reward, cron tick) without bumping
    /// any call sequence number.
    pub fn execute_message_implicit(
        &self,
        from: &Address,
        to: &Address,
        value: &TokenAmount,
        method: MethodNum,
        params: RawBytes,
    ) -> Result<MessageResult, VMError> {
        let from_id = self
            .resolve_id_address(from)
            .ok_or_else(|| vm_err(&format!("sender {} not found", from)))?;
        self.execute(*from, from_id, 0, to, value, method, params)
    }

    #[allow(clippy::too_many_arguments)]
    fn execute(
        &self,
        from: Address,
        from_id: Address,
        call_seq: u64,
        to: &Address,
        value: &TokenAmount,
        method: MethodNum,
        params: RawBytes,
    ) -> Result<MessageResult, VMError> {
        let top = TopCtx {
            originator_stable_addr: from,
            originator_call_seq: call_seq,
            new_actor_addr_count: Cell::new(0),
        };
        let msg = InternalMessage {
            from: from_id.id().map_err(|e| vm_err(&e.to_string()))?,
            to: *to,
            value: value.clone(),
            method,
            params,
        };
        let mut ctx = InvocationCtx::new(self, &top, msg);
        let res = ctx.invoke();
        let trace = ctx.gather_trace(&res);
        self.invocations.borrow_mut().push(trace);

        self.checkpoint();
        Ok(match res {
            Ok(ret) => MessageResult { code: ExitCode::OK, message: String::new(), ret },
            Err(e) => {
                log::debug!("message to {} method {} failed: {}", to, method, e);
                MessageResult { code: e.exit_code(), message: e.msg().to_string(), ret: RawBytes::default() }
            }
        })
    }

    /// Takes all the invocations that have been made since the last call to this method.
    pub fn take_invocations(&self) -> Vec<InvocationTrace> {
        self.invocations.take()
    }
}
