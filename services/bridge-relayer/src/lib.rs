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

#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # Bridge Relayer 🌉
//!
//! Wires the relayer together: the coordination chain client, the core
//! context updater, the TSS keygen loop, one observer and one signer per
//! configured EVM chain, the orchestrator scheduling outbound work and the
//! metrics endpoint.

/// Chain factory, metrics endpoint and startup sequence.
pub mod service;

/// A type alias for the result type used across the service.
pub type Result<T> = std::result::Result<T, webb_relayer_utils::Error>;
