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

use serde::{Deserialize, Serialize};
use webb_relayer_types::ChainId;

use crate::defaults;

/// EvmChainConfig is the configuration for the EVM based networks.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct EvmChainConfig {
    /// String that groups configuration for this chain on a human-readable name.
    pub name: String,
    /// Boolean indicating EVM based networks are enabled or not.
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
    /// Http(s) Endpoints for quick Req/Res, used round-robin.
    #[serde(skip_serializing)]
    pub http_endpoints: Vec<url::Url>,
    /// chain specific id (output of chainId opcode on EVM networks)
    #[serde(rename(serialize = "chainId"))]
    pub chain_id: ChainId,
    /// Forces both scan cursors to this height at startup. Zero disables it.
    #[serde(default)]
    pub force_start_height: u64,
    /// How far the scan may run ahead of the coordination chain index.
    #[serde(default = "defaults::max_latest_indexed_block_gap")]
    pub max_latest_indexed_block_gap: u64,
    /// Applied to the suggested gas price before it is posted.
    #[serde(default = "defaults::gas_price_multiplier")]
    pub gas_price_multiplier: f64,
    /// Age of the latest block after which the RPC is reported as lagging.
    #[serde(default = "defaults::rpc_latency_alert_secs")]
    pub rpc_latency_alert_secs: u64,
}
