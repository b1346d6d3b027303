// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_encoding::RawBytes;
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::{ActorID, MethodNum};

/// A record of one invocation and everything it sent, in send order.
#[derive(Clone, Debug)]
pub struct InvocationTrace {
    pub from: ActorID,
    /// The receiver, normalized to its ID address when it could be resolved.
    pub to: Address,
    pub value: TokenAmount,
    pub method: MethodNum,
    pub params: RawBytes,
    pub exit_code: ExitCode,
    pub return_value: RawBytes,
    pub subinvocations: Vec<InvocationTrace>,
}

impl InvocationTrace {
    /// All invocations in this tree, depth first, starting with this one.
    pub fn flatten(&self) -> Vec<&InvocationTrace> {
        let mut out = vec![self];
        for sub in &self.subinvocations {
            out.extend(sub.flatten());
        }
        out
    }
}

/// A partial expectation of an invocation. Fields left `None` are not checked.
#[derive(Clone, Debug)]
pub struct ExpectInvocation {
    pub from: Address,
    pub to: Address,
    pub method: MethodNum,
    pub code: ExitCode,
    pub value: Option<TokenAmount>,
    pub params: Option<RawBytes>,
    pub ret: Option<RawBytes>,
    pub subinvocs: Option<Vec<ExpectInvocation>>,
}

impl Default for ExpectInvocation {
    fn default() -> Self {
        Self {
            from: Address::new_id(0),
            to: Address::new_id(0),
            method: 0,
            code: ExitCode::OK,
            value: None,
            params: None,
            ret: None,
            subinvocs: None,
        }
    }
}

impl ExpectInvocation {
    /// Asserts that `invoc` satisfies this expectation, recursing into subinvocations.
    pub fn matches(&self, invoc: &InvocationTrace) {
        let id = format!("[{}→{}:{}]", invoc.from, invoc.to, invoc.method);
        self.quick_match(invoc, String::new());
        assert_eq!(
            self.code, invoc.exit_code,
            "{} unexpected exit code: expected {}, was {}",
            id, self.code, invoc.exit_code
        );
        if let Some(v) = &self.value {
            assert_eq!(v, &invoc.value, "{} unexpected value: expected {}, was {}", id, v, invoc.value);
        }
        if let Some(p) = &self.params {
            assert_eq!(p, &invoc.params, "{} unexpected params", id);
        }
        if let Some(r) = &self.ret {
            assert_eq!(r, &invoc.return_value, "{} unexpected return value", id);
        }
        if let Some(expect_subinvocs) = &self.subinvocs {
            let subinvocs = &invoc.subinvocations;
            let panic_str = format!(
                "unexpected subinvocs:\n{:?}\nexpected:\n{:?}",
                subinvocs
                    .iter()
                    .map(|s| (s.from, s.to, s.method, s.exit_code))
                    .collect::<Vec<_>>(),
                expect_subinvocs.iter().map(|e| (e.from, e.to, e.method, e.code)).collect::<Vec<_>>(),
            );
            assert_eq!(subinvocs.len(), expect_subinvocs.len(), "{} {}", id, panic_str);
            for (expect, actual) in expect_subinvocs.iter().zip(subinvocs.iter()) {
                expect.matches(actual);
            }
        }
    }

    fn quick_match(&self, invoc: &InvocationTrace, extra_msg: String) {
        let id = format!("[{}→{}:{}]", invoc.from, invoc.to, invoc.method);
        assert_eq!(
            self.from,
            Address::new_id(invoc.from),
            "{} unexpected from addr: expected: {}, was: {} \n{}",
            id,
            self.from,
            invoc.from,
            extra_msg
        );
        assert_eq!(
            self.to, invoc.to,
            "{} unexpected to addr: expected: {}, was: {} \n{}",
            id, self.to, invoc.to, extra_msg
        );
        assert_eq!(
            self.method, invoc.method,
            "{} unexpected method: expected: {}, was: {} \n{}",
            id, self.method, invoc.method, extra_msg
        );
    }
}
