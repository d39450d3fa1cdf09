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

use ethers::types::U256;
use serde::{Deserialize, Serialize};

use crate::outbound::OutboundJob;

/// Rate limiter configuration of the coordination chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimiterFlags {
    /// Whether the limiter is on.
    pub enabled: bool,
    /// Window size in coordination blocks.
    pub window: i64,
    /// Value allowed per block.
    pub rate: U256,
}

impl RateLimiterFlags {
    /// The limiter only makes sense with a positive window and a positive rate.
    pub fn is_usable(&self) -> bool {
        self.enabled && self.window > 0 && !self.rate.is_zero()
    }
}

/// Everything the limiter needs to pick the jobs of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimiterInput {
    /// Coordination height the input was computed at.
    pub height: i64,
    /// Jobs that fell behind the window and must be scheduled anyway.
    pub jobs_missed: Vec<OutboundJob>,
    /// Jobs pending inside the window, ascending by nonce.
    pub jobs_pending: Vec<OutboundJob>,
    /// Value already withdrawn inside the window.
    pub past_value: U256,
    /// Value of the pending jobs.
    pub pending_value: U256,
    /// Lowest height of a pending job, zero if none.
    pub lowest_pending_height: i64,
}
