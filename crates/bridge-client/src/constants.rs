// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::Duration;

/// Base gas price used when the fee market reports zero.
pub const DEFAULT_BASE_GAS_PRICE: u128 = 1_000_000;
/// Share of the base gas price system transactions pay.
pub const GAS_PRICE_REDUCTION_RATE: f64 = 0.01;
/// Headroom over the base gas price, absorbs block to block increases.
pub const GAS_PRICE_BUFFER: f64 = 1.5;

/// Gas limit of transactions without a dedicated one.
pub const DEFAULT_GAS_LIMIT: u64 = 200_000;
/// Gas limit of a gas price post.
pub const POST_GAS_PRICE_GAS_LIMIT: u64 = 1_500_000;
/// Gas limit of an outbound tracker report.
pub const ADD_TX_HASH_TO_OUT_TX_TRACKER_GAS_LIMIT: u64 = 200_000;
/// Gas limit of a keygen result vote.
pub const POST_TSS_GAS_LIMIT: u64 = 500_000;
/// Gas limit of a blame post.
pub const POST_BLAME_DATA_GAS_LIMIT: u64 = 200_000;
/// Gas limit of an inbound vote, sized for up to 256 events.
pub const POST_VOTE_INBOUND_GAS_LIMIT: u64 = 1_500_000 * 256;
/// Gas limit an inbound vote is resent with.
pub const POST_VOTE_INBOUND_RETRY_GAS_LIMIT: u64 = 1_500_000 * 256;
/// Gas limit of an outbound vote.
pub const POST_VOTE_OUTBOUND_GAS_LIMIT: u64 = 1_500_000;
/// Gas limit a failed outbound vote is resent with, the revert executes
/// more code on the coordination chain.
pub const POST_VOTE_OUTBOUND_REVERT_GAS_LIMIT: u64 = 1_500_000;
/// Gas limit of a balance recharge vote.
pub const POST_RECHARGE_GAS_LIMIT: u64 = 1_500_000;

/// ABCI code of an account sequence mismatch.
pub const SEQUENCE_MISMATCH_CODE: u32 = 32;

/// How often a vote result is polled.
pub const MONITOR_INTERVAL: Duration = Duration::from_secs(5);
/// How many times a vote result is polled before giving up.
pub const MONITOR_RETRY_COUNT: usize = 20;

/// Polls of the block height while waiting for the chain to produce blocks.
pub const WAIT_FOR_BLOCKS_RETRY_COUNT: usize = 15;
