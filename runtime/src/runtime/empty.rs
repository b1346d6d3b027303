// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_ipld_encoding::DAG_CBOR;
use lazy_static::lazy_static;
use multihash::{Code, MultihashDigest};

lazy_static! {
    /// CID of the DAG-CBOR empty list, the head of every actor before construction.
    pub static ref EMPTY_ARR_CID: Cid = Cid::new_v1(DAG_CBOR, Code::Blake2b256.digest(&[0x80]));
}
