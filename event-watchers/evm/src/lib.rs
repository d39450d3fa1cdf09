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

#![warn(missing_docs)]
//! # EVM Observer Module 🕸️
//!
//! Watches an EVM chain for the events the bridge relays, votes them on
//! the coordination chain, and tracks the outbound transactions the TSS
//! sent to it.
//!
//! The [`handlers`] turn contract logs into inbound votes, one handler per
//! event kind, and the [`EvmObserver`] drives them block range by block
//! range through an [`EventReactor`](webb_event_watcher_traits::EventReactor).

/// Bindings of the restaking, registry and connector contracts.
pub mod contracts;
/// Inbound event handlers.
pub mod handlers;
/// The observer and its watch tasks.
pub mod observer;

#[cfg(test)]
mod tests;

pub use handlers::{default_handlers, HandlerContext};
pub use observer::{EvmObserver, ObserverOptions, Watch};
