// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_encoding::RawBytes;
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::sector::StoragePower;
use fvm_shared::{MethodNum, METHOD_SEND};

use spc_actor_cron::Method as CronMethod;
use spc_actor_power::{Method as PowerMethod, ProcessPowerReportParams};
use spc_actors_runtime::{
    BURNT_FUNDS_ACTOR_ADDR, CRON_ACTOR_ADDR, STORAGE_POWER_ACTOR_ADDR, SYSTEM_ACTOR_ADDR,
};

use crate::trace::ExpectInvocation;

/// Static helper functions for creating invocation expectations.
pub struct Expect {}

impl Expect {
    pub fn send(from: Address, to: Address, v: Option<TokenAmount>) -> ExpectInvocation {
        ExpectInvocation { from, to, method: METHOD_SEND, value: v, ..Default::default() }
    }

    pub fn burn(from: Address, v: Option<TokenAmount>) -> ExpectInvocation {
        Self::send(from, BURNT_FUNDS_ACTOR_ADDR, v)
    }

    pub fn cron_tick(subinvocs: Vec<ExpectInvocation>) -> ExpectInvocation {
        ExpectInvocation {
            from: SYSTEM_ACTOR_ADDR,
            to: CRON_ACTOR_ADDR,
            method: CronMethod::EpochTick as MethodNum,
            params: Some(RawBytes::default()),
            subinvocs: Some(subinvocs),
            ..Default::default()
        }
    }

    /// A cron entry invocation, checked for its exit code only.
    pub fn cron_entry(to: Address, method: MethodNum, code: ExitCode) -> ExpectInvocation {
        ExpectInvocation { from: CRON_ACTOR_ADDR, to, method, code, ..Default::default() }
    }

    pub fn power_tick_end(subinvocs: Option<Vec<ExpectInvocation>>) -> ExpectInvocation {
        ExpectInvocation {
            from: CRON_ACTOR_ADDR,
            to: STORAGE_POWER_ACTOR_ADDR,
            method: PowerMethod::OnEpochTickEnd as MethodNum,
            subinvocs,
            ..Default::default()
        }
    }

    pub fn power_report(from: Address, active: StoragePower, inactive: StoragePower) -> ExpectInvocation {
        let params = RawBytes::serialize(ProcessPowerReportParams {
            active_power: active,
            inactive_power: inactive,
        })
        .unwrap();
        ExpectInvocation {
            from,
            to: STORAGE_POWER_ACTOR_ADDR,
            method: PowerMethod::ProcessPowerReport as MethodNum,
            params: Some(params),
            value: Some(TokenAmount::default()),
            subinvocs: Some(vec![]),
            ..Default::default()
        }
    }
}
