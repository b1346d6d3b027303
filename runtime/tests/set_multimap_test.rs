// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_blockstore::MemoryBlockstore;
use fvm_shared::address::Address;
use fvm_shared::clock::ChainEpoch;
use spc_actors_runtime::{SetMultimap, SetMultimapConfig};

#[test]
fn put_remove() {
    let store = MemoryBlockstore::new();
    let mut smm =
        SetMultimap::<_, ChainEpoch, Address>::empty(&store, SetMultimapConfig::default(), "t");

    let epoch: ChainEpoch = 100;
    assert!(smm.get(&epoch).unwrap().is_none());

    smm.put(&epoch, Address::new_id(101)).unwrap();
    smm.put(&epoch, Address::new_id(102)).unwrap();
    let set = smm.get(&epoch).unwrap().unwrap();
    assert!(set.has(&Address::new_id(101)).unwrap());
    assert!(set.has(&Address::new_id(102)).unwrap());

    assert!(smm.remove(&epoch, &Address::new_id(101)).unwrap());
    assert!(!smm.remove(&epoch, &Address::new_id(101)).unwrap());
    let set = smm.get(&epoch).unwrap().unwrap();
    assert!(!set.has(&Address::new_id(101)).unwrap());
    assert!(set.has(&Address::new_id(102)).unwrap());
}

#[test]
fn removing_last_member_drops_the_bucket() {
    let store = MemoryBlockstore::new();
    let mut smm =
        SetMultimap::<_, ChainEpoch, u64>::empty(&store, SetMultimapConfig::default(), "t");

    smm.put(&7, 1).unwrap();
    assert!(smm.remove(&7, &1).unwrap());
    assert!(smm.get(&7).unwrap().is_none());
    assert!(smm.is_empty());
}

#[test]
fn remove_all_returns_members_once() {
    let store = MemoryBlockstore::new();
    let mut smm =
        SetMultimap::<_, ChainEpoch, u64>::empty(&store, SetMultimapConfig::default(), "t");

    smm.put(&3, 10).unwrap();
    smm.put(&3, 11).unwrap();
    smm.put(&4, 12).unwrap();
    let root = smm.flush().unwrap();

    let mut reloaded =
        SetMultimap::<_, ChainEpoch, u64>::load(&store, &root, SetMultimapConfig::default(), "t")
            .unwrap();
    let mut taken = reloaded.remove_all(&3).unwrap();
    taken.sort();
    assert_eq!(vec![10, 11], taken);
    assert!(reloaded.remove_all(&3).unwrap().is_empty());
    assert!(reloaded.get(&4).unwrap().is_some());
}
