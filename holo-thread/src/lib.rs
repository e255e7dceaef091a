//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Thread Network Data Leader.
//!
//! Maintains the authoritative Network Data of a Thread partition: merges
//! the registrations of every router, allocates 6LoWPAN Context IDs and
//! Service IDs, tracks the data versions and stores the Commissioning Data.

pub mod commissioning;
pub mod config;
pub mod context_ids;
pub mod debug;
pub mod error;
pub mod instance;
pub mod leader;
pub mod mle;
pub mod packet;
pub mod route;
pub mod task;
pub mod tasks;
