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

use std::collections::VecDeque;

use ethers::types::U256;

/// Blocks the burn rate is averaged over.
pub const BURN_RATE_WINDOW: u64 = 100;

/// Fees burned by the operator key over the last blocks.
#[derive(Debug, Clone)]
pub struct BurnRate {
    window: u64,
    entries: VecDeque<(u64, U256)>,
    total: U256,
}

impl Default for BurnRate {
    fn default() -> Self {
        Self::new(BURN_RATE_WINDOW)
    }
}

impl BurnRate {
    /// Averages over `window` blocks.
    pub fn new(window: u64) -> Self {
        Self {
            window: window.max(1),
            entries: VecDeque::new(),
            total: U256::zero(),
        }
    }

    /// Records `fee` burned at `height`. Entries that left the window are
    /// dropped.
    pub fn add(&mut self, height: u64, fee: U256) {
        self.entries.push_back((height, fee));
        self.total = self.total.saturating_add(fee);
        while let Some(&(oldest, fee)) = self.entries.front() {
            if oldest + self.window > height {
                break;
            }
            self.entries.pop_front();
            self.total = self.total.saturating_sub(fee);
        }
    }

    /// Average fee per block inside the window.
    pub fn rate(&self) -> U256 {
        self.total / U256::from(self.window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn old_fees_leave_the_window() {
        let mut burn = BurnRate::new(10);
        burn.add(1, 50.into());
        burn.add(5, 30.into());
        assert_eq!(burn.rate(), U256::from(8));
        // height 1 is out once height 11 is recorded.
        burn.add(11, 20.into());
        assert_eq!(burn.rate(), U256::from(5));
        burn.add(40, 0.into());
        assert!(burn.rate().is_zero());
    }
}
