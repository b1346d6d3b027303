// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::BTreeSet;

use fvm_shared::ActorID;
use test_case::test_case;

use spc_actor_power::{challenge_count, draw_without_replacement, select_miners_to_surprise, SweepUpdate};
use spc_actors_runtime::test_utils::blake2b_256;

#[test_case(0, 2, 0; "no miners")]
#[test_case(1, 2, 1; "single miner")]
#[test_case(10, 2, 5; "even split")]
#[test_case(11, 2, 6; "rounds up")]
#[test_case(7, 1, 7; "period of one")]
fn challenge_count_is_ceiling(miners: usize, period: i64, expected: usize) {
    assert_eq!(expected, challenge_count(miners, period));
}

#[test]
fn draw_is_deterministic_and_distinct() {
    let candidates: Vec<ActorID> = (100..120).collect();
    let a = draw_without_replacement(blake2b_256, candidates.clone(), 8, &[3; 32]);
    let b = draw_without_replacement(blake2b_256, candidates.clone(), 8, &[3; 32]);
    assert_eq!(a, b);
    assert_eq!(8, a.iter().collect::<BTreeSet<_>>().len());
    assert!(a.iter().all(|id| candidates.contains(id)));

    let c = draw_without_replacement(blake2b_256, candidates, 8, &[4; 32]);
    assert_ne!(a, c);
}

#[test]
fn draw_caps_at_candidate_count() {
    let drawn = draw_without_replacement(blake2b_256, vec![1, 2, 3], 10, &[0; 32]);
    assert_eq!(3, drawn.len());
}

#[test]
fn selection_prefers_unswept_miners() {
    let registered: Vec<ActorID> = (100..110).collect();
    let swept: BTreeSet<ActorID> = (100..105).collect();

    let selection = select_miners_to_surprise(blake2b_256, &registered, &swept, 5, &[1; 32]);
    assert_eq!((105..110).collect::<Vec<_>>(), selection.selected);
    match selection.sweep {
        SweepUpdate::Extend(mut added) => {
            added.sort_unstable();
            assert_eq!(selection.selected, added);
        }
        other => panic!("expected sweep extension, got {:?}", other),
    }
}

#[test]
fn selection_restarts_sweep_when_exhausted() {
    let registered: Vec<ActorID> = (100..110).collect();
    let swept: BTreeSet<ActorID> = (100..108).collect();

    let selection = select_miners_to_surprise(blake2b_256, &registered, &swept, 5, &[2; 32]);
    assert_eq!(5, selection.selected.len());
    assert!(selection.selected.contains(&108));
    assert!(selection.selected.contains(&109));
    match selection.sweep {
        SweepUpdate::Restart(fresh) => {
            assert_eq!(3, fresh.len());
            assert!(fresh.iter().all(|id| *id < 108));
        }
        other => panic!("expected sweep restart, got {:?}", other),
    }
}

#[test]
fn selection_is_reproducible() {
    let registered: Vec<ActorID> = (100..150).collect();
    let swept = BTreeSet::new();
    let a = select_miners_to_surprise(blake2b_256, &registered, &swept, 25, &[9; 32]);
    let b = select_miners_to_surprise(blake2b_256, &registered, &swept, 25, &[9; 32]);
    assert_eq!(a, b);
    assert_eq!(25, a.selected.len());
}
