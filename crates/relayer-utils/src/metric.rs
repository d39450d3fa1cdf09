// Copyright (C) 2022-2024 Webb Technologies Inc.
//
// Tangle is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Tangle is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should receive a copy of the GNU General Public License
// If not, see <http://www.gnu.org/licenses/>.

use prometheus::{
    register_gauge_vec_with_registry, register_gauge_with_registry,
    register_int_counter_vec_with_registry,
    register_int_gauge_vec_with_registry, register_int_gauge_with_registry,
    Encoder, Gauge, GaugeVec, IntCounterVec, IntGauge, IntGaugeVec, Registry,
    TextEncoder,
};

/// A struct definition for collecting metrics in the relayer.
///
/// Every metric lives in the registry owned by this struct, so more than one
/// instance can exist in the same process (tests do that all the time).
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    /// Pending outbound jobs per destination chain.
    pub pending_outbound_jobs: GaugeVec,
    /// Last external block scanned by an observer.
    pub last_scanned_block: IntGaugeVec,
    /// Last external block whose proof was voted.
    pub last_inbound_block: IntGaugeVec,
    /// Last coordination chain block handled by the scheduler.
    pub last_coordinator_block: IntGauge,
    /// Age of the latest block reported by an external RPC.
    pub rpc_latency_seconds: GaugeVec,
    /// 1 when the external RPC looks healthy, 0 otherwise.
    pub rpc_up: IntGaugeVec,
    /// Number of times a TSS participant was blamed.
    pub tss_node_blame: IntCounterVec,
    /// Average operator fee burned per coordination block.
    pub hot_key_burn_rate: Gauge,
    /// Share of the rate limiter window already consumed.
    pub rate_limiter_usage_percent: Gauge,
    /// Outbound jobs currently being processed.
    pub outbound_active_jobs: IntGauge,
    /// Votes broadcast to the coordination chain, by kind.
    pub votes_broadcast: IntCounterVec,
    /// TSS balances watched on external chains.
    pub token_balance: GaugeVec,
}

impl Metrics {
    /// Instantiates the various metrics and their counters, also creates a registry for the counters and
    /// registers the counters
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("relayer".into()), None)?;

        let pending_outbound_jobs = register_gauge_vec_with_registry!(
            "pending_outbound_jobs",
            "Number of pending outbound jobs per chain",
            &["chain_id"],
            registry
        )?;

        let last_scanned_block = register_int_gauge_vec_with_registry!(
            "last_scanned_block",
            "Last block scanned by the observer",
            &["chain_id"],
            registry
        )?;

        let last_inbound_block = register_int_gauge_vec_with_registry!(
            "last_inbound_block",
            "Last block whose proof was voted by the observer",
            &["chain_id"],
            registry
        )?;

        let last_coordinator_block = register_int_gauge_with_registry!(
            "last_coordinator_block",
            "Last coordination chain block handled by the scheduler",
            registry
        )?;

        let rpc_latency_seconds = register_gauge_vec_with_registry!(
            "rpc_latency_seconds",
            "Age of the latest block reported by the chain RPC",
            &["chain_id"],
            registry
        )?;

        let rpc_up = register_int_gauge_vec_with_registry!(
            "rpc_up",
            "Whether the chain RPC is responsive",
            &["chain_id"],
            registry
        )?;

        let tss_node_blame = register_int_counter_vec_with_registry!(
            "tss_node_blame_total",
            "Number of times a TSS participant was blamed",
            &["pubkey"],
            registry
        )?;

        let hot_key_burn_rate = register_gauge_with_registry!(
            "hot_key_burn_rate",
            "Average fee burned by the operator key per block",
            registry
        )?;

        let rate_limiter_usage_percent = register_gauge_with_registry!(
            "rate_limiter_usage_percent",
            "Share of the rate limiter window already consumed",
            registry
        )?;

        let outbound_active_jobs = register_int_gauge_with_registry!(
            "outbound_active_jobs",
            "Outbound jobs currently being processed",
            registry
        )?;

        let votes_broadcast = register_int_counter_vec_with_registry!(
            "votes_broadcast_total",
            "Votes broadcast to the coordination chain",
            &["kind"],
            registry
        )?;

        let token_balance = register_gauge_vec_with_registry!(
            "token_balance",
            "TSS balance of a watched token",
            &["chain_id", "token"],
            registry
        )?;

        Ok(Self {
            registry,
            pending_outbound_jobs,
            last_scanned_block,
            last_inbound_block,
            last_coordinator_block,
            rpc_latency_seconds,
            rpc_up,
            tss_node_blame,
            hot_key_burn_rate,
            rate_limiter_usage_percent,
            outbound_active_jobs,
            votes_broadcast,
            token_balance,
        })
    }

    /// Gathers the whole relayer metrics
    pub fn gather_metrics(&self) -> Result<String, GatherMetricsError> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        // Gather the metrics.
        let metric_families = self.registry.gather();
        // Encode them to send.
        encoder.encode(&metric_families, &mut buffer)?;

        Ok(String::from_utf8(buffer)?)
    }
}

/// Errors raised while rendering the metrics page.
#[derive(Debug, thiserror::Error)]
pub enum GatherMetricsError {
    /// Encoding failed.
    #[error(transparent)]
    PrometheusError(#[from] prometheus::Error),
    /// The encoder produced invalid utf8.
    #[error(transparent)]
    FromUtf8Error(#[from] std::string::FromUtf8Error),
}
