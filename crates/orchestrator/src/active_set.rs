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

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use prometheus::IntGauge;

/// Outbound ids with a signing attempt in flight.
///
/// An id enters the set through [`try_acquire`](Self::try_acquire) and
/// leaves it when the returned [`ActiveGuard`] is dropped, whatever way the
/// attempt ended.
#[derive(Debug, Clone)]
pub struct ActiveOutboundSet {
    active: Arc<Mutex<HashSet<String>>>,
    gauge: IntGauge,
}

impl ActiveOutboundSet {
    /// Creates an empty set reporting its size to `gauge`.
    pub fn new(gauge: IntGauge) -> Self {
        gauge.set(0);
        Self {
            active: Default::default(),
            gauge,
        }
    }

    /// Marks `outbound_id` active, unless it already is.
    pub fn try_acquire(&self, outbound_id: &str) -> Option<ActiveGuard> {
        let mut active = self.active.lock();
        if !active.insert(outbound_id.to_owned()) {
            return None;
        }
        self.gauge.set(active.len() as i64);
        Some(ActiveGuard {
            set: self.clone(),
            outbound_id: outbound_id.to_owned(),
        })
    }

    /// Whether a signing attempt of `outbound_id` is in flight.
    pub fn is_active(&self, outbound_id: &str) -> bool {
        self.active.lock().contains(outbound_id)
    }

    /// Number of attempts in flight.
    pub fn len(&self) -> usize {
        self.active.lock().len()
    }

    /// Whether nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, outbound_id: &str) {
        let mut active = self.active.lock();
        active.remove(outbound_id);
        self.gauge.set(active.len() as i64);
    }
}

/// Keeps one outbound id in the [`ActiveOutboundSet`] while alive.
#[derive(Debug)]
pub struct ActiveGuard {
    set: ActiveOutboundSet,
    outbound_id: String,
}

impl ActiveGuard {
    /// The guarded outbound id.
    pub fn outbound_id(&self) -> &str {
        &self.outbound_id
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.set.release(&self.outbound_id);
        tracing::trace!(outbound_id = %self.outbound_id, "Outbound released");
    }
}
