// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_blockstore::MemoryBlockstore;
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use num_traits::Zero;
use test_case::test_case;

use spc_actor_power::BalanceTable;

fn atto(v: i64) -> TokenAmount {
    TokenAmount::from_atto(v)
}

#[test]
fn updates_leave_previous_table_intact() {
    let store = MemoryBlockstore::default();
    let addr = Address::new_id(100);

    let empty = BalanceTable::empty(&store).unwrap();
    let one = empty.with_new_address_entry(&addr, &atto(5)).unwrap();
    let two = one.with_add(&addr, &atto(10)).unwrap().unwrap();

    assert_eq!(None, empty.get(&addr).unwrap());
    assert_eq!(Some(atto(5)), one.get(&addr).unwrap());
    assert_eq!(Some(atto(15)), two.get(&addr).unwrap());
    assert_ne!(one.root(), two.root());

    let reloaded = BalanceTable::from_root(&store, &two.root());
    assert_eq!(Some(atto(15)), reloaded.get(&addr).unwrap());
}

#[test]
fn add_creates_and_increments() {
    let store = MemoryBlockstore::default();
    let a = Address::new_id(100);
    let b = Address::new_id(101);

    let table = BalanceTable::empty(&store).unwrap();
    let table = table.with_add(&a, &atto(5)).unwrap().unwrap();
    let table = table.with_add(&a, &atto(7)).unwrap().unwrap();
    let table = table.with_add(&b, &atto(1)).unwrap().unwrap();

    assert_eq!(Some(atto(12)), table.get(&a).unwrap());
    assert_eq!(atto(13), table.total().unwrap());
    assert!(table.with_add(&a, &atto(-1)).unwrap().is_none());
}

#[test_case(100, 30, 0, 30, 70; "within available")]
#[test_case(100, 200, 0, 100, 0; "capped at balance")]
#[test_case(100, 80, 40, 60, 40; "capped at minimum")]
#[test_case(100, 50, 150, 0, 100; "already below minimum")]
#[test_case(100, 0, 0, 0, 100; "nothing requested")]
fn extract_partial(balance: i64, requested: i64, min: i64, extracted: i64, remaining: i64) {
    let store = MemoryBlockstore::default();
    let addr = Address::new_id(100);
    let table = BalanceTable::empty(&store).unwrap().with_add(&addr, &atto(balance)).unwrap().unwrap();

    let (table, amount) =
        table.with_extract_partial(&addr, &atto(requested), &atto(min)).unwrap().unwrap();
    assert_eq!(atto(extracted), amount);
    assert_eq!(Some(atto(remaining)), table.get(&addr).unwrap());
}

#[test]
fn extract_partial_rejects_missing_entry_and_negative_request() {
    let store = MemoryBlockstore::default();
    let addr = Address::new_id(100);
    let table = BalanceTable::empty(&store).unwrap();
    assert!(table.with_extract_partial(&addr, &atto(1), &atto(0)).unwrap().is_none());

    let table = table.with_add(&addr, &atto(10)).unwrap().unwrap();
    assert!(table.with_extract_partial(&addr, &atto(-1), &atto(0)).unwrap().is_none());
}

#[test]
fn subtract_clamps_at_zero() {
    let store = MemoryBlockstore::default();
    let addr = Address::new_id(100);
    let table = BalanceTable::empty(&store).unwrap().with_add(&addr, &atto(10)).unwrap().unwrap();

    let (table, taken) = table.with_subtract_clamped(&addr, &atto(4)).unwrap();
    assert_eq!(atto(4), taken);
    let (table, taken) = table.with_subtract_clamped(&addr, &atto(100)).unwrap();
    assert_eq!(atto(6), taken);
    assert_eq!(Some(TokenAmount::zero()), table.get(&addr).unwrap());
}

#[test]
fn entry_lifecycle_violations_are_assertion_failures() {
    let store = MemoryBlockstore::default();
    let addr = Address::new_id(100);
    let table = BalanceTable::empty(&store).unwrap();

    let err = table.with_deleted_address_entry(&addr).err().unwrap();
    assert_eq!(ExitCode::USR_ASSERTION_FAILED, err.exit_code());

    let table = table.with_new_address_entry(&addr, &TokenAmount::zero()).unwrap();
    let err = table.with_new_address_entry(&addr, &TokenAmount::zero()).err().unwrap();
    assert_eq!(ExitCode::USR_ASSERTION_FAILED, err.exit_code());

    let table = table.with_deleted_address_entry(&addr).unwrap();
    assert_eq!(None, table.get(&addr).unwrap());
}

#[test]
fn entry_sufficiency() {
    let store = MemoryBlockstore::default();
    let addr = Address::new_id(100);
    let table = BalanceTable::empty(&store).unwrap();
    assert_eq!(None, table.is_entry_sufficient(&addr, &atto(1)).unwrap());

    let table = table.with_add(&addr, &atto(10)).unwrap().unwrap();
    assert_eq!(Some(true), table.is_entry_sufficient(&addr, &atto(10)).unwrap());
    assert_eq!(Some(false), table.is_entry_sufficient(&addr, &atto(11)).unwrap());
}
