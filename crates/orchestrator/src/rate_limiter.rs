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

//! Bounds the value withdrawn through outbound jobs over a sliding window
//! of coordination blocks.

use std::collections::HashMap;

use ethers::types::U256;
use webb_relayer_types::rate_limit::RateLimiterInput;
use webb_relayer_types::{ChainId, OutboundJob};

/// The jobs the limiter lets through, grouped by destination chain.
#[derive(Debug, Clone, Default)]
pub struct RateLimiterOutput {
    /// Jobs to schedule, ascending by nonce on every chain.
    pub jobs: HashMap<ChainId, Vec<OutboundJob>>,
    /// Window the withdraw rate was computed over, in blocks.
    pub window: i64,
    /// Average value withdrawn per block inside `window`.
    pub current_rate: U256,
    /// Whether the pending jobs were held back.
    pub exceeded: bool,
}

impl RateLimiterOutput {
    /// `current_rate` as a percentage of `rate`.
    pub fn usage_percent(&self, rate: U256) -> f64 {
        if rate.is_zero() {
            return 0.0;
        }
        let basis_points =
            self.current_rate.saturating_mul(U256::from(10_000)) / rate;
        if basis_points > U256::from(u64::MAX) {
            return f64::MAX;
        }
        basis_points.as_u64() as f64 / 100.0
    }
}

/// Picks the jobs of one tick.
///
/// The limit is `rate` per block over `window` blocks. When the oldest
/// pending job is older than the window, the window is widened to reach
/// it and the limit grows with it. Missed jobs are always scheduled,
/// pending ones only while the withdrawn plus pending value stays within
/// the limit.
pub fn apply(input: &RateLimiterInput, window: i64, rate: U256) -> RateLimiterOutput {
    let mut withdraw_window = window;
    if input.lowest_pending_height != 0 {
        let pending_window = input.height - input.lowest_pending_height + 1;
        if pending_window > window {
            withdraw_window = pending_window;
        }
    }
    let blocks = U256::from(withdraw_window.max(1) as u64);
    let limit = rate.saturating_mul(blocks);
    let total = input.past_value.saturating_add(input.pending_value);
    let exceeded = total > limit;

    let mut jobs: HashMap<ChainId, Vec<OutboundJob>> = HashMap::new();
    let pending = if exceeded { 0 } else { input.jobs_pending.len() };
    for job in input.jobs_missed.iter().chain(&input.jobs_pending[..pending]) {
        jobs.entry(job.receiver_chain_id())
            .or_default()
            .push(job.clone());
    }
    for list in jobs.values_mut() {
        list.sort_by_key(OutboundJob::nonce);
    }

    RateLimiterOutput {
        jobs,
        window: withdraw_window,
        current_rate: total / blocks,
        exceeded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webb_relayer_types::outbound::OutboundParams;
    use webb_relayer_types::JobStatus;

    fn job(chain_id: ChainId, nonce: u64) -> OutboundJob {
        OutboundJob {
            index: format!("0x{nonce:064x}"),
            sender: String::new(),
            sender_chain_id: 97,
            status: JobStatus::PendingOutbound,
            value: U256::zero(),
            inbound_event: None,
            outbound: OutboundParams {
                receiver_chain_id: chain_id,
                tss_nonce: nonce,
                ..Default::default()
            },
        }
    }

    fn input(past: u64, pending: u64) -> RateLimiterInput {
        RateLimiterInput {
            height: 1_000,
            jobs_missed: vec![job(1, 3)],
            jobs_pending: vec![job(1, 5), job(1, 4), job(56, 9)],
            past_value: past.into(),
            pending_value: pending.into(),
            lowest_pending_height: 950,
        }
    }

    #[test]
    fn pending_jobs_pass_within_the_limit() {
        // 100 blocks at 10 per block.
        let out = apply(&input(600, 400), 100, 10.into());
        assert!(!out.exceeded);
        assert_eq!(out.window, 100);
        let nonces: Vec<_> = out.jobs[&1].iter().map(OutboundJob::nonce).collect();
        assert_eq!(nonces, vec![3, 4, 5]);
        assert_eq!(out.jobs[&56].len(), 1);
        assert_eq!(out.current_rate, U256::from(10));
        assert_eq!(out.usage_percent(10.into()), 100.0);
    }

    #[test]
    fn only_missed_jobs_pass_over_the_limit() {
        let out = apply(&input(600, 401), 100, 10.into());
        assert!(out.exceeded);
        assert_eq!(out.jobs.len(), 1);
        assert_eq!(out.jobs[&1].len(), 1);
        assert_eq!(out.jobs[&1][0].nonce(), 3);
    }

    #[test]
    fn old_pending_jobs_widen_the_window() {
        let mut input = input(1_500, 400);
        input.lowest_pending_height = 801;
        // 200 blocks now, so the limit is 2000.
        let out = apply(&input, 100, 10.into());
        assert_eq!(out.window, 200);
        assert!(!out.exceeded);
        // 1900 over 200 blocks, rounded down.
        assert_eq!(out.current_rate, U256::from(9));
        assert_eq!(out.usage_percent(10.into()), 90.0);
    }
}
