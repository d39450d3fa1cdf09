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

/// The default port the metrics endpoint will listen on. Defaults to 9955.
pub const fn relayer_port() -> u16 {
    9955
}
/// Messages packed in one coordination chain transaction.
pub const fn max_msgs_per_tx() -> usize {
    13
}
/// Average coordination chain block time, in seconds.
pub const fn block_time_secs() -> u64 {
    6
}
/// How often the coordination chain snapshot is refreshed, in seconds.
pub const fn context_update_interval_secs() -> u64 {
    6
}
/// Broadcast attempts before a vote is given up.
pub const fn broadcast_retry_count() -> usize {
    5
}
/// Seconds between two broadcast attempts.
pub const fn broadcast_retry_interval_secs() -> u64 {
    5
}
/// Chains are enabled unless said otherwise.
pub const fn enabled() -> bool {
    true
}
/// How far the scan may run ahead of the coordination chain index.
pub const fn max_latest_indexed_block_gap() -> u64 {
    100
}
/// Gas prices are posted as suggested by the node.
pub const fn gas_price_multiplier() -> f64 {
    1.0
}
/// Age of the latest block after which the RPC is reported as lagging.
pub const fn rpc_latency_alert_secs() -> u64 {
    100
}
/// Keygen records are polled every second.
pub const fn keygen_poll_interval_ms() -> u64 {
    1_000
}
/// A test keysign runs after every successful keygen.
pub const fn test_keysign() -> bool {
    true
}
