// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use core::fmt;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, VecDeque};

use anyhow::anyhow;
use cid::multihash::Multihash;
use cid::Cid;
use fvm_ipld_blockstore::MemoryBlockstore;
use fvm_ipld_encoding::de::DeserializeOwned;
use fvm_ipld_encoding::{CborStore, RawBytes};
use fvm_shared::address::{Address, Protocol};
use fvm_shared::clock::ChainEpoch;
use fvm_shared::consensus::ConsensusFault;
use fvm_shared::crypto::signature::Signature;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::piece::PieceInfo;
use fvm_shared::randomness::RANDOMNESS_LENGTH;
use fvm_shared::sector::{RegisteredSealProof, SealVerifyInfo, WindowPoStVerifyInfo};
use fvm_shared::{ActorID, MethodNum};
use lazy_static::lazy_static;
use multihash::Code;
use serde::Serialize;

use crate::runtime::builtins::Type;
use crate::runtime::{
    ActorCode, CallerPattern, DomainSeparationTag, EconomicIndices, LinearIndices, MessageInfo,
    Policy, Primitives, Runtime, RuntimePolicy, StateHandle, Verifier, EMPTY_ARR_CID,
};
use crate::{actor_error, ActorError, CRON_ACTOR_ADDR};

lazy_static! {
    pub static ref SYSTEM_ACTOR_CODE_ID: Cid = make_builtin(b"fil/test/system");
    pub static ref INIT_ACTOR_CODE_ID: Cid = make_builtin(b"fil/test/init");
    pub static ref CRON_ACTOR_CODE_ID: Cid = make_builtin(b"fil/test/cron");
    pub static ref ACCOUNT_ACTOR_CODE_ID: Cid = make_builtin(b"fil/test/account");
    pub static ref POWER_ACTOR_CODE_ID: Cid = make_builtin(b"fil/test/storagepower");
    pub static ref MINER_ACTOR_CODE_ID: Cid = make_builtin(b"fil/test/storageminer");
    pub static ref ACTOR_TYPES: BTreeMap<Cid, Type> = {
        let mut map = BTreeMap::new();
        map.insert(*SYSTEM_ACTOR_CODE_ID, Type::System);
        map.insert(*INIT_ACTOR_CODE_ID, Type::Init);
        map.insert(*CRON_ACTOR_CODE_ID, Type::Cron);
        map.insert(*ACCOUNT_ACTOR_CODE_ID, Type::Account);
        map.insert(*POWER_ACTOR_CODE_ID, Type::Power);
        map.insert(*MINER_ACTOR_CODE_ID, Type::Miner);
        map
    };
    pub static ref ACTOR_CODES: BTreeMap<Type, Cid> = [
        (Type::System, *SYSTEM_ACTOR_CODE_ID),
        (Type::Init, *INIT_ACTOR_CODE_ID),
        (Type::Cron, *CRON_ACTOR_CODE_ID),
        (Type::Account, *ACCOUNT_ACTOR_CODE_ID),
        (Type::Power, *POWER_ACTOR_CODE_ID),
        (Type::Miner, *MINER_ACTOR_CODE_ID),
    ]
    .into_iter()
    .collect();
}

const IPLD_RAW: u64 = 0x55;

/// Returns an identity CID for bz.
pub fn make_builtin(bz: &[u8]) -> Cid {
    Cid::new_v1(IPLD_RAW, Multihash::wrap(0, bz).expect("name too long"))
}

pub struct MockRuntime {
    pub epoch: ChainEpoch,
    pub id_addresses: HashMap<Address, Address>,
    pub actor_code_cids: HashMap<Address, Cid>,
    pub new_actor_addr: Option<Address>,
    pub receiver: Address,
    pub caller: Address,
    pub caller_type: Cid,
    pub value_received: TokenAmount,
    pub hash_func: Box<dyn Fn(&[u8]) -> [u8; 32]>,

    // Actor State
    pub state: RefCell<Cid>,
    pub balance: RefCell<TokenAmount>,

    // VM Impl
    pub in_call: bool,
    pub store: MemoryBlockstore,
    pub lease: RefCell<Option<u64>>,
    pub next_lease: Cell<u64>,
    pub caller_validated: Cell<bool>,
    /// First fail-fast send failure seen during the current call.
    pub aborted: RefCell<Option<ActorError>>,

    // Expectations
    pub expectations: RefCell<Expectations>,

    // policy
    pub policy: Policy,
    pub indices: LinearIndices,
}

#[derive(Default)]
pub struct Expectations {
    pub expect_validate_caller_any: bool,
    pub expect_validate_caller_addr: Option<Vec<Address>>,
    pub expect_validate_caller_type: Option<Vec<Type>>,
    pub expect_validate_caller_matches: bool,
    pub expect_sends: VecDeque<ExpectedMessage>,
    pub expect_create_actor: Option<ExpectCreateActor>,
    pub expect_delete_actor: Option<Address>,
    pub expect_verify_sigs: VecDeque<ExpectedVerifySig>,
    pub expect_verify_seal: Option<ExpectVerifySeal>,
    pub expect_verify_post: Option<ExpectVerifyPoSt>,
    pub expect_verify_consensus_fault: Option<ExpectVerifyConsensusFault>,
    pub expect_get_randomness: VecDeque<ExpectRandomness>,
}

impl Expectations {
    fn reset(&mut self) {
        *self = Default::default();
    }

    fn verify(&mut self) {
        assert!(!self.expect_validate_caller_any, "expected ValidateCallerAny, not received");
        assert!(
            self.expect_validate_caller_addr.is_none(),
            "expected ValidateCallerAddr {:?}, not received",
            self.expect_validate_caller_addr
        );
        assert!(
            self.expect_validate_caller_type.is_none(),
            "expected ValidateCallerType {:?}, not received",
            self.expect_validate_caller_type
        );
        assert!(
            !self.expect_validate_caller_matches,
            "expected ValidateCallerMatches, not received"
        );
        assert!(
            self.expect_sends.is_empty(),
            "expected all message to be send, unsent messages {:?}",
            self.expect_sends
        );
        assert!(
            self.expect_create_actor.is_none(),
            "expected actor to be created, uncreated actor: {:?}",
            self.expect_create_actor
        );
        assert!(
            self.expect_delete_actor.is_none(),
            "expected actor to be deleted: {:?}",
            self.expect_delete_actor
        );
        assert!(
            self.expect_verify_sigs.is_empty(),
            "expect_verify_sigs: {:?}, not received",
            self.expect_verify_sigs
        );
        assert!(
            self.expect_verify_seal.is_none(),
            "expect_verify_seal {:?}, not received",
            self.expect_verify_seal
        );
        assert!(
            self.expect_verify_post.is_none(),
            "expect_verify_post {:?}, not received",
            self.expect_verify_post
        );
        assert!(
            self.expect_verify_consensus_fault.is_none(),
            "expect_verify_consensus_fault {:?}, not received",
            self.expect_verify_consensus_fault
        );
        assert!(
            self.expect_get_randomness.is_empty(),
            "expect_get_randomness {:?}, not received",
            self.expect_get_randomness
        );
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self {
            epoch: Default::default(),
            id_addresses: Default::default(),
            actor_code_cids: Default::default(),
            new_actor_addr: Default::default(),
            receiver: Address::new_id(0),
            caller: Address::new_id(0),
            caller_type: Default::default(),
            value_received: Default::default(),
            hash_func: Box::new(blake2b_256),
            state: RefCell::new(*EMPTY_ARR_CID),
            balance: Default::default(),
            in_call: Default::default(),
            store: Default::default(),
            lease: Default::default(),
            next_lease: Default::default(),
            caller_validated: Default::default(),
            aborted: Default::default(),
            expectations: Default::default(),
            policy: Default::default(),
            indices: Default::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExpectCreateActor {
    pub code_id: Cid,
    pub actor_id: ActorID,
}

#[derive(Clone, Debug)]
pub struct ExpectedMessage {
    pub to: Address,
    pub method: MethodNum,
    pub params: RawBytes,
    pub value: TokenAmount,
    /// Whether the message is expected through `send_catching_errors`.
    pub catching: bool,

    // returns from applying expectedMessage
    pub send_return: RawBytes,
    pub exit_code: ExitCode,
}

#[derive(Debug)]
pub struct ExpectedVerifySig {
    pub sig: Signature,
    pub signer: Address,
    pub plaintext: Vec<u8>,
    pub result: Result<(), anyhow::Error>,
}

#[derive(Clone, Debug)]
pub struct ExpectVerifySeal {
    seal: SealVerifyInfo,
    exit_code: ExitCode,
}

#[derive(Clone, Debug)]
pub struct ExpectVerifyPoSt {
    post: WindowPoStVerifyInfo,
    exit_code: ExitCode,
}

#[derive(Clone, Debug)]
pub struct ExpectVerifyConsensusFault {
    block_header_1: Vec<u8>,
    block_header_2: Vec<u8>,
    block_header_extra: Vec<u8>,
    fault: Option<ConsensusFault>,
    exit_code: ExitCode,
}

#[derive(Clone, Debug)]
pub struct ExpectRandomness {
    tag: DomainSeparationTag,
    epoch: ChainEpoch,
    entropy: Vec<u8>,
    out: [u8; RANDOMNESS_LENGTH],
}

pub fn expect_empty(res: RawBytes) {
    assert_eq!(res, RawBytes::default());
}

pub fn expect_abort_contains_message<T: fmt::Debug>(
    expect_exit_code: ExitCode,
    expect_msg: &str,
    res: Result<T, ActorError>,
) {
    let err = res.expect_err(&format!(
        "expected abort with exit code {}, but call succeeded",
        expect_exit_code
    ));
    assert_eq!(
        err.exit_code(),
        expect_exit_code,
        "expected failure with exit code {}, but failed with exit code {}; error message: {}",
        expect_exit_code,
        err.exit_code(),
        err.msg(),
    );
    let err_msg = err.msg();
    assert!(
        err.msg().contains(expect_msg),
        "expected err message '{}' to contain '{}'",
        err_msg,
        expect_msg,
    );
}

pub fn expect_abort<T: fmt::Debug>(exit_code: ExitCode, res: Result<T, ActorError>) {
    expect_abort_contains_message(exit_code, "", res);
}

/// Routes `log` output to stderr for the current test binary. Safe to call repeatedly.
pub fn init_logging() {
    let _ = pretty_env_logger::try_init();
}

impl MockRuntime {
    ///// Runtime access for tests /////

    pub fn get_state<T: DeserializeOwned>(&self) -> T {
        self.store_get(&self.state.borrow())
    }

    pub fn replace_state<T: Serialize>(&mut self, obj: &T) {
        let head = self.store_put(obj);
        *self.state.get_mut() = head;
    }

    pub fn set_balance(&mut self, amount: TokenAmount) {
        *self.balance.get_mut() = amount;
    }

    pub fn add_balance(&mut self, amount: TokenAmount) {
        *self.balance.get_mut() += amount;
    }

    pub fn set_value(&mut self, value: TokenAmount) {
        self.value_received = value;
    }

    pub fn set_caller(&mut self, code_id: Cid, address: Address) {
        self.caller = address;
        self.caller_type = code_id;
        self.actor_code_cids.insert(address, code_id);
    }

    pub fn set_address_actor_type(&mut self, address: Address, actor_type: Cid) {
        self.actor_code_cids.insert(address, actor_type);
    }

    pub fn set_epoch(&mut self, epoch: ChainEpoch) {
        self.epoch = epoch;
    }

    pub fn get_id_address(&self, address: &Address) -> Option<Address> {
        if address.protocol() == Protocol::ID {
            return Some(*address);
        }
        self.id_addresses.get(address).cloned()
    }

    /// Invokes a method on actor `A` with the runtime's current message context.
    ///
    /// Like the VM, a call fails if a fail-fast send failed underneath it, if it returns
    /// while holding the state lease, or if it never validated its caller. Failed calls
    /// leave the state head unchanged.
    pub fn call<A: ActorCode>(
        &mut self,
        method_num: MethodNum,
        params: &RawBytes,
    ) -> Result<RawBytes, ActorError> {
        self.in_call = true;
        let prev_state = *self.state.get_mut();
        self.caller_validated.set(false);
        self.aborted.replace(None);
        self.lease.replace(None);

        let mut res = A::invoke_method(&*self, method_num, params);
        if res.is_ok() {
            if let Some(e) = self.aborted.take() {
                res = Err(e);
            } else if let Some(lease) = *self.lease.borrow() {
                res = Err(actor_error!(runtime_api; "returned while holding state lease {}", lease));
            } else if !self.caller_validated.get() {
                res = Err(actor_error!(assertion_failed; "method {} did not validate its caller", method_num));
            }
        }

        if res.is_err() {
            *self.state.get_mut() = prev_state;
        }
        self.lease.replace(None);
        self.in_call = false;
        res
    }

    /// Verifies that all mock expectations have been met.
    pub fn verify(&mut self) {
        self.expectations.borrow_mut().verify()
    }

    /// Clears all mock expectations.
    pub fn reset(&mut self) {
        self.expectations.borrow_mut().reset();
    }

    ///// Mock expectations /////

    pub fn expect_validate_caller_addr(&mut self, addr: Vec<Address>) {
        assert!(!addr.is_empty(), "addrs must be non-empty");
        self.expectations.get_mut().expect_validate_caller_addr = Some(addr);
    }

    pub fn expect_validate_caller_type(&mut self, types: Vec<Type>) {
        assert!(!types.is_empty(), "types must be non-empty");
        self.expectations.get_mut().expect_validate_caller_type = Some(types);
    }

    pub fn expect_validate_caller_any(&self) {
        self.expectations.borrow_mut().expect_validate_caller_any = true;
    }

    pub fn expect_validate_caller_matches(&self) {
        self.expectations.borrow_mut().expect_validate_caller_matches = true;
    }

    pub fn expect_verify_signature(&self, exp: ExpectedVerifySig) {
        self.expectations.borrow_mut().expect_verify_sigs.push_back(exp);
    }

    pub fn expect_verify_consensus_fault(
        &self,
        h1: Vec<u8>,
        h2: Vec<u8>,
        extra: Vec<u8>,
        fault: Option<ConsensusFault>,
        exit_code: ExitCode,
    ) {
        self.expectations.borrow_mut().expect_verify_consensus_fault =
            Some(ExpectVerifyConsensusFault {
                block_header_1: h1,
                block_header_2: h2,
                block_header_extra: extra,
                fault,
                exit_code,
            });
    }

    pub fn expect_delete_actor(&mut self, addr: Address) {
        self.expectations.borrow_mut().expect_delete_actor = Some(addr);
    }

    pub fn expect_send(
        &mut self,
        to: Address,
        method: MethodNum,
        params: RawBytes,
        value: TokenAmount,
        send_return: RawBytes,
        exit_code: ExitCode,
    ) {
        self.expectations.borrow_mut().expect_sends.push_back(ExpectedMessage {
            to,
            method,
            params,
            value,
            catching: false,
            send_return,
            exit_code,
        })
    }

    /// Expects a non-propagating send whose callee finishes with `exit_code`.
    pub fn expect_send_catching(
        &mut self,
        to: Address,
        method: MethodNum,
        params: RawBytes,
        value: TokenAmount,
        exit_code: ExitCode,
    ) {
        self.expectations.borrow_mut().expect_sends.push_back(ExpectedMessage {
            to,
            method,
            params,
            value,
            catching: true,
            send_return: RawBytes::default(),
            exit_code,
        })
    }

    pub fn expect_create_actor(&mut self, code_id: Cid, actor_id: ActorID) {
        let a = ExpectCreateActor { code_id, actor_id };
        self.expectations.borrow_mut().expect_create_actor = Some(a);
    }

    pub fn expect_verify_seal(&mut self, seal: SealVerifyInfo, exit_code: ExitCode) {
        let a = ExpectVerifySeal { seal, exit_code };
        self.expectations.borrow_mut().expect_verify_seal = Some(a);
    }

    pub fn expect_verify_post(&mut self, post: WindowPoStVerifyInfo, exit_code: ExitCode) {
        let a = ExpectVerifyPoSt { post, exit_code };
        self.expectations.borrow_mut().expect_verify_post = Some(a);
    }

    pub fn expect_get_randomness(
        &mut self,
        tag: DomainSeparationTag,
        epoch: ChainEpoch,
        entropy: Vec<u8>,
        out: [u8; RANDOMNESS_LENGTH],
    ) {
        let a = ExpectRandomness { tag, epoch, entropy, out };
        self.expectations.borrow_mut().expect_get_randomness.push_back(a);
    }

    ///// Private helpers /////

    fn require_in_call(&self) {
        assert!(self.in_call, "invalid runtime invocation outside of method call")
    }

    fn require_no_lease(&self) -> Result<(), ActorError> {
        if self.lease.borrow().is_some() {
            return Err(actor_error!(assertion_failed; "side-effect within transaction"));
        }
        Ok(())
    }

    fn mark_caller_validated(&self) -> Result<(), ActorError> {
        if self.caller_validated.replace(true) {
            return Err(actor_error!(runtime_api; "caller validated twice"));
        }
        Ok(())
    }

    fn check_lease(&self, handle: &StateHandle) -> Result<(), ActorError> {
        match *self.lease.borrow() {
            Some(id) if id == handle.lease_id() => Ok(()),
            _ => Err(actor_error!(runtime_api; "release of unknown state lease {}", handle.lease_id())),
        }
    }

    fn pop_send(&self, to: &Address, method: MethodNum, params: &RawBytes, value: &TokenAmount, catching: bool) -> ExpectedMessage {
        let expected_msg = self.expectations.borrow_mut().expect_sends.pop_front().unwrap_or_else(|| {
            panic!(
                "unexpected expectedMessage to: {:?} method: {:?}, value: {:?}, params: {:?}",
                to, method, value, params
            )
        });

        assert!(
            expected_msg.to == *to
                && expected_msg.method == method
                && expected_msg.params == *params
                && expected_msg.value == *value
                && expected_msg.catching == catching,
            "expectedMessage being sent does not match expectation.\n\
             Message  - to: {:?}, method: {:?}, value: {:?}, params: {:?}, catching: {}\n\
             Expected - to: {:?}, method: {:?}, value: {:?}, params: {:?}, catching: {}",
            to,
            method,
            value,
            params,
            catching,
            expected_msg.to,
            expected_msg.method,
            expected_msg.value,
            expected_msg.params,
            expected_msg.catching,
        );
        expected_msg
    }

    fn debit(&self, value: &TokenAmount) -> Result<(), ActorError> {
        let mut balance = self.balance.borrow_mut();
        if value > &*balance {
            return Err(ActorError::unchecked(
                ExitCode::SYS_INSUFFICIENT_FUNDS,
                format!("cannot send value: {:?} exceeds balance: {:?}", value, *balance),
            ));
        }
        *balance -= value.clone();
        Ok(())
    }

    fn store_put<T: Serialize>(&self, o: &T) -> Cid {
        self.store.put_cbor(o, Code::Blake2b256).unwrap()
    }

    fn store_get<T: DeserializeOwned>(&self, cid: &Cid) -> T {
        self.store.get_cbor(cid).unwrap().unwrap()
    }
}

impl MessageInfo for MockRuntime {
    fn caller(&self) -> Address {
        self.caller
    }
    fn receiver(&self) -> Address {
        self.receiver
    }
    fn value_received(&self) -> TokenAmount {
        self.value_received.clone()
    }
}

impl Runtime for MockRuntime {
    type Blockstore = MemoryBlockstore;

    fn message(&self) -> &dyn MessageInfo {
        self.require_in_call();
        self
    }

    fn curr_epoch(&self) -> ChainEpoch {
        self.require_in_call();
        self.epoch
    }

    fn validate_immediate_caller_accept_any(&self) -> Result<(), ActorError> {
        self.require_in_call();
        self.mark_caller_validated()?;
        assert!(
            self.expectations.borrow_mut().expect_validate_caller_any,
            "unexpected validate-caller-any"
        );
        self.expectations.borrow_mut().expect_validate_caller_any = false;
        Ok(())
    }

    fn validate_immediate_caller_is<'a, I>(&self, addresses: I) -> Result<(), ActorError>
    where
        I: IntoIterator<Item = &'a Address>,
    {
        self.require_in_call();
        self.mark_caller_validated()?;

        let addrs: Vec<Address> = addresses.into_iter().cloned().collect();

        let expected_addrs = self
            .expectations
            .borrow_mut()
            .expect_validate_caller_addr
            .take()
            .expect("unexpected validate caller addrs");
        assert_eq!(
            &addrs, &expected_addrs,
            "unexpected validate caller addrs {:?}, expected {:?}",
            addrs, &expected_addrs
        );

        if addrs.contains(&self.caller) {
            return Ok(());
        }
        Err(actor_error!(forbidden;
                "caller address {:?} forbidden, allowed: {:?}",
                self.caller, &addrs
        ))
    }

    fn validate_immediate_caller_type<'a, I>(&self, types: I) -> Result<(), ActorError>
    where
        I: IntoIterator<Item = &'a Type>,
    {
        self.require_in_call();
        self.mark_caller_validated()?;

        let types: Vec<Type> = types.into_iter().cloned().collect();
        let expected_caller_type = self
            .expectations
            .borrow_mut()
            .expect_validate_caller_type
            .take()
            .expect("unexpected validate caller code");
        assert_eq!(
            &types, &expected_caller_type,
            "unexpected validate caller code {:?}, expected {:?}",
            types, expected_caller_type,
        );

        if let Some(call_type) = ACTOR_TYPES.get(&self.caller_type) {
            if types.contains(call_type) {
                return Ok(());
            }
        }
        Err(actor_error!(forbidden; "caller type {:?} forbidden, allowed: {:?}",
                self.caller_type, types))
    }

    fn validate_immediate_caller_matches<P>(&self, pattern: &P) -> Result<(), ActorError>
    where
        P: CallerPattern + ?Sized,
    {
        self.require_in_call();
        self.mark_caller_validated()?;
        assert!(
            self.expectations.borrow().expect_validate_caller_matches,
            "unexpected validate caller matches"
        );
        self.expectations.borrow_mut().expect_validate_caller_matches = false;

        let caller_type = ACTOR_TYPES.get(&self.caller_type).cloned();
        if pattern.matches(&self.caller, caller_type) {
            return Ok(());
        }
        Err(actor_error!(forbidden; "caller {} does not match the required pattern", self.caller))
    }

    fn current_balance(&self) -> TokenAmount {
        self.require_in_call();
        self.balance.borrow().clone()
    }

    fn resolve_address(&self, address: &Address) -> Option<ActorID> {
        self.require_in_call();
        self.get_id_address(address).and_then(|a| a.id().ok())
    }

    fn get_actor_code_cid(&self, id: &ActorID) -> Option<Cid> {
        self.require_in_call();
        self.actor_code_cids.get(&Address::new_id(*id)).cloned()
    }

    fn resolve_builtin_actor_type(&self, code_id: &Cid) -> Option<Type> {
        self.require_in_call();
        ACTOR_TYPES.get(code_id).cloned()
    }

    fn get_code_cid_for_type(&self, typ: Type) -> Cid {
        self.require_in_call();
        ACTOR_CODES[&typ]
    }

    fn get_randomness(
        &self,
        tag: DomainSeparationTag,
        epoch: ChainEpoch,
        entropy: &[u8],
    ) -> Result<[u8; RANDOMNESS_LENGTH], ActorError> {
        let expected = self
            .expectations
            .borrow_mut()
            .expect_get_randomness
            .pop_front()
            .expect("unexpected call to get_randomness");

        assert!(epoch <= self.epoch, "attempt to get randomness from future");
        assert_eq!(
            expected.tag, tag,
            "unexpected domain separation tag, expected: {:?}, actual: {:?}",
            expected.tag, tag
        );
        assert_eq!(
            expected.epoch, epoch,
            "unexpected epoch, expected: {:?}, actual: {:?}",
            expected.epoch, epoch
        );
        assert_eq!(
            expected.entropy, *entropy,
            "unexpected entropy, expected {:?}, actual: {:?}",
            expected.entropy, entropy
        );

        Ok(expected.out)
    }

    fn acquire_state(&self) -> Result<StateHandle, ActorError> {
        self.require_in_call();
        let mut lease = self.lease.borrow_mut();
        if let Some(id) = *lease {
            return Err(actor_error!(runtime_api; "state already leased ({})", id));
        }
        let id = self.next_lease.get();
        self.next_lease.set(id + 1);
        *lease = Some(id);
        Ok(StateHandle::lease(*self.state.borrow(), id))
    }

    fn release_state(&self, handle: StateHandle, expected: &Cid) -> Result<(), ActorError> {
        self.check_lease(&handle)?;
        let head = *self.state.borrow();
        if head != *expected {
            return Err(actor_error!(runtime_api;
                "state released as unchanged with head {}, but current head is {}", expected, head));
        }
        self.lease.replace(None);
        Ok(())
    }

    fn update_release_state(&self, handle: StateHandle, new_head: &Cid) -> Result<(), ActorError> {
        self.check_lease(&handle)?;
        *self.state.borrow_mut() = *new_head;
        self.lease.replace(None);
        Ok(())
    }

    fn store(&self) -> &MemoryBlockstore {
        &self.store
    }

    fn send(
        &self,
        to: &Address,
        method: MethodNum,
        params: RawBytes,
        value: TokenAmount,
    ) -> Result<RawBytes, ActorError> {
        self.require_in_call();
        self.require_no_lease()?;

        let expected_msg = self.pop_send(to, method, &params, &value, false);

        let res = match expected_msg.exit_code {
            ExitCode::OK => {
                self.debit(&value)?;
                Ok(expected_msg.send_return)
            }
            x => Err(ActorError::unchecked(x, "Expected message Fail".to_string())),
        };
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
        self.require_in_call();
        if self.receiver != CRON_ACTOR_ADDR && self.caller != CRON_ACTOR_ADDR {
            return Err(actor_error!(runtime_api;
                "non-propagating send to {} outside the cron mechanism", to));
        }
        self.require_no_lease()?;

        let expected_msg = self.pop_send(to, method, &params, &value, true);
        if expected_msg.exit_code.is_success() {
            self.debit(&value)?;
        }
        Ok(expected_msg.exit_code)
    }

    fn new_actor_address(&self) -> Result<Address, ActorError> {
        self.require_in_call();
        Ok(self.new_actor_addr.expect("unexpected call to new actor address"))
    }

    fn create_actor(&self, code_id: Cid, actor_id: ActorID) -> Result<(), ActorError> {
        self.require_in_call();
        self.require_no_lease()?;
        if self.receiver != crate::INIT_ACTOR_ADDR {
            return Err(actor_error!(runtime_api; "only the init actor may create actors"));
        }
        let expect_create_actor = self
            .expectations
            .borrow_mut()
            .expect_create_actor
            .take()
            .expect("unexpected call to create actor");

        assert!(
            expect_create_actor.code_id == code_id && expect_create_actor.actor_id == actor_id,
            "unexpected actor being created, expected code: {:?} address: {:?}, actual code: {:?} address: {:?}",
            expect_create_actor.code_id,
            expect_create_actor.actor_id,
            code_id,
            actor_id
        );
        Ok(())
    }

    fn delete_actor(&self, addr: &Address) -> Result<(), ActorError> {
        self.require_in_call();
        self.require_no_lease()?;
        if *addr != self.receiver {
            return Err(actor_error!(runtime_api; "actor {} cannot delete {}", self.receiver, addr));
        }
        let exp_act = self.expectations.borrow_mut().expect_delete_actor.take();
        match exp_act {
            None => panic!("unexpected call to delete actor: {}", addr),
            Some(exp) if exp != *addr => {
                panic!("attempt to delete wrong actor. Expected: {}, got: {}", exp, addr)
            }
            Some(_) => {}
        }
        *self.balance.borrow_mut() = TokenAmount::default();
        Ok(())
    }

    fn curr_indices(&self) -> &dyn EconomicIndices {
        &self.indices
    }
}

impl Primitives for MockRuntime {
    fn verify_signature(
        &self,
        signature: &Signature,
        signer: &Address,
        plaintext: &[u8],
    ) -> anyhow::Result<()> {
        let exp = self.expectations.borrow_mut().expect_verify_sigs.pop_front();
        match exp {
            Some(exp) => {
                if exp.sig != *signature || exp.signer != *signer || exp.plaintext[..] != *plaintext {
                    panic!(
                        "unexpected signature verification\n\
                        sig: {:?}, signer: {}, plaintext: {}\n\
                        expected sig: {:?}, signer: {}, plaintext: {}",
                        signature,
                        signer,
                        hex::encode(plaintext),
                        exp.sig,
                        exp.signer,
                        hex::encode(exp.plaintext)
                    )
                }
                exp.result
            }
            None => panic!(
                "unexpected syscall to verify signature: {:?}, signer: {}, plaintext: {}",
                signature,
                signer,
                hex::encode(plaintext)
            ),
        }
    }

    fn hash_blake2b(&self, data: &[u8]) -> [u8; 32] {
        (*self.hash_func)(data)
    }

    fn compute_unsealed_sector_cid(
        &self,
        _reg: RegisteredSealProof,
        _pieces: &[PieceInfo],
    ) -> anyhow::Result<Cid> {
        panic!("unexpected syscall to compute unsealed sector cid")
    }
}

impl Verifier for MockRuntime {
    fn verify_seal(&self, seal: &SealVerifyInfo) -> anyhow::Result<()> {
        let exp = self
            .expectations
            .borrow_mut()
            .expect_verify_seal
            .take()
            .expect("Unexpected syscall to verify seal");

        assert_eq!(exp.seal, *seal, "Unexpected seal verification");
        if exp.exit_code != ExitCode::OK {
            return Err(anyhow!(ActorError::unchecked(
                exp.exit_code,
                "Expected Failure".to_string(),
            )));
        }
        Ok(())
    }

    fn verify_post(&self, post: &WindowPoStVerifyInfo) -> anyhow::Result<()> {
        let exp = self
            .expectations
            .borrow_mut()
            .expect_verify_post
            .take()
            .expect("Unexpected syscall to verify PoSt");

        assert_eq!(exp.post, *post, "Unexpected PoSt verification");
        if exp.exit_code != ExitCode::OK {
            return Err(anyhow!(ActorError::unchecked(
                exp.exit_code,
                "Expected Failure".to_string(),
            )));
        }
        Ok(())
    }

    fn verify_consensus_fault(
        &self,
        h1: &[u8],
        h2: &[u8],
        extra: &[u8],
    ) -> anyhow::Result<Option<ConsensusFault>> {
        let exp = self
            .expectations
            .borrow_mut()
            .expect_verify_consensus_fault
            .take()
            .expect("Unexpected syscall to verify_consensus_fault");

        assert_eq!(exp.block_header_1, h1, "Header 1 mismatch");
        assert_eq!(exp.block_header_2, h2, "Header 2 mismatch");
        assert_eq!(exp.block_header_extra, extra, "Header extra mismatch");
        if exp.exit_code != ExitCode::OK {
            return Err(anyhow!(ActorError::unchecked(
                exp.exit_code,
                "Expected Failure".to_string(),
            )));
        }
        Ok(exp.fault)
    }
}

impl RuntimePolicy for MockRuntime {
    fn policy(&self) -> &Policy {
        &self.policy
    }
}

pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    blake2b_simd::Params::new()
        .hash_length(32)
        .to_state()
        .update(data)
        .finalize()
        .as_bytes()
        .try_into()
        .unwrap()
}

/// A deterministic BLS address for tests.
pub fn new_bls_addr(s: u8) -> Address {
    Address::new_bls(&[s; 48]).unwrap()
}
