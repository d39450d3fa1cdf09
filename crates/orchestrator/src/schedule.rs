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

//! When an outbound job gets a signing attempt.

use std::collections::HashSet;

use webb_relayer_types::OutboundJob;

/// How far past the earliest pending nonce jobs are considered, as a
/// multiple of the lookahead.
pub const LOOKBACK_FACTOR: f64 = 1.0;
/// Retry interval of a job holding up the nonces after it.
pub const CRITICAL_INTERVAL: u64 = 10;
/// Nonces after the first pending one inspected to spot a stuck job.
pub const CRITICAL_SPAN: u64 = 10;
/// How many of them must already be tracked for the job to be critical.
pub const CRITICAL_TRACKED: usize = 5;

/// The jobs of one chain considered in one tick.
///
/// At most `lookahead` jobs are returned, and none whose nonce is further
/// than `lookahead * LOOKBACK_FACTOR` from the earliest pending nonce.
/// `jobs` must be ascending by nonce.
pub fn nonce_window(jobs: &[OutboundJob], lookahead: i64) -> &[OutboundJob] {
    let Some(first) = jobs.first() else {
        return jobs;
    };
    let lookahead = u64::try_from(lookahead).unwrap_or(0);
    let lookback = (lookahead as f64 * LOOKBACK_FACTOR) as u64;
    let highest = first.nonce().saturating_add(lookback);
    let end = jobs
        .iter()
        .take(lookahead as usize)
        .position(|job| job.nonce() > highest)
        .unwrap_or_else(|| jobs.len().min(lookahead as usize));
    if end < jobs.len().min(lookahead as usize) {
        tracing::warn!(
            nonce = jobs[end].nonce(),
            earliest = first.nonce(),
            "Nonce too high, the window ends here"
        );
    }
    &jobs[..end]
}

/// Retry interval of `nonce`, in coordination blocks.
///
/// The first pending nonce is retried every [`CRITICAL_INTERVAL`] blocks
/// when most of the nonces after it are already tracked. Tracked nonces are
/// retried half as often as the rest.
pub fn retry_interval(
    nonce: u64,
    first_pending: bool,
    tracked: &HashSet<u64>,
    interval: u64,
) -> u64 {
    if tracked.contains(&nonce) {
        return interval.saturating_mul(2);
    }
    if first_pending {
        let following = (nonce + 1..=nonce + CRITICAL_SPAN)
            .filter(|n| tracked.contains(n))
            .count();
        if following >= CRITICAL_TRACKED {
            return CRITICAL_INTERVAL;
        }
    }
    interval
}

/// Whether `nonce` gets a slot at coordination `height`.
pub fn is_due(nonce: u64, height: u64, interval: u64) -> bool {
    interval > 0 && nonce % interval == height % interval
}
