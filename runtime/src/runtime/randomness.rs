// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_shared::clock::ChainEpoch;
use fvm_shared::randomness::RANDOMNESS_LENGTH;
use num_derive::FromPrimitive;
use serde_repr::*;

/// Specifies a domain for randomness generation.
#[derive(PartialEq, Eq, Copy, Clone, FromPrimitive, Debug, Hash, Serialize_repr, Deserialize_repr)]
#[repr(i64)]
pub enum DomainSeparationTag {
    TicketProduction = 1,
    ElectionPoStChallengeSeed = 2,
    SurprisePoStChallengeSeed = 3,
    SurprisePoStSelectMiners = 4,
    SealRandomness = 5,
    InteractiveSealChallengeSeed = 6,
}

/// Derives domain-separated randomness from a base value drawn from chain history.
pub fn draw_randomness(
    hasher: impl FnOnce(&[u8]) -> [u8; 32],
    rbase: &[u8; RANDOMNESS_LENGTH],
    pers: DomainSeparationTag,
    round: ChainEpoch,
    entropy: &[u8],
) -> [u8; RANDOMNESS_LENGTH] {
    let mut data = Vec::with_capacity(RANDOMNESS_LENGTH + 8 + 8 + entropy.len());

    // Append the personalization value
    let i64_bytes = (pers as i64).to_be_bytes();
    data.extend_from_slice(&i64_bytes);

    // Append the randomness
    data.extend_from_slice(rbase);

    // Append the round
    let i64_bytes = round.to_be_bytes();
    data.extend_from_slice(&i64_bytes);

    // Append the entropy
    data.extend_from_slice(entropy);

    hasher(&data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::blake2b_256;

    #[test]
    fn draw_randomness_is_domain_separated() {
        let base = [7u8; RANDOMNESS_LENGTH];
        let a = draw_randomness(
            blake2b_256,
            &base,
            DomainSeparationTag::SurprisePoStSelectMiners,
            10,
            &[],
        );
        let b = draw_randomness(
            blake2b_256,
            &base,
            DomainSeparationTag::SurprisePoStChallengeSeed,
            10,
            &[],
        );
        let c = draw_randomness(
            blake2b_256,
            &base,
            DomainSeparationTag::SurprisePoStSelectMiners,
            11,
            &[],
        );
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(
            a,
            draw_randomness(
                blake2b_256,
                &base,
                DomainSeparationTag::SurprisePoStSelectMiners,
                10,
                &[]
            )
        );
    }
}
