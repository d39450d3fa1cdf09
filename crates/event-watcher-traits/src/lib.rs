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

#![warn(missing_docs)]
//! # Relayer Events Watcher Module 🕸️
//!
//! The seams between the per chain observers and signers and the rest of
//! the relayer.
//!
//! ## Overview
//!
//! An observer scans blocks of one external chain and hands every range to
//! an [`EventReactor`], which runs each registered [`EventHandler`] over it
//! and merges the votes they found. Handlers talk to the chain through
//! [`EvmRpcClient`], so the same code runs against a real node or the
//! [`MockedEvmClient`](mocked::MockedEvmClient). The orchestrator only sees
//! observers and signers through [`ChainObserver`] and [`ChainSigner`].

/// Observer and signer traits used by the orchestrator.
mod chain;
/// Restricted address checks on inbound votes.
pub mod compliance;
/// Event handler traits.
mod handler;
/// An in-memory EVM chain.
pub mod mocked;
/// Runs the handlers of one chain.
mod reactor;
/// The external chain RPC boundary.
mod rpc;

pub use chain::{ChainObserver, ChainSigner};
pub use handler::{
    EventHandler, EventHandlerWithRetry, EventsByHeight, HandledBlocks,
};
pub use reactor::{BoxedEventHandler, EventReactor};
pub use rpc::EvmRpcClient;
