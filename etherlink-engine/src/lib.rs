/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Neighbor discovery, text messaging, and reliable file transfer over a raw
//! Ethernet link (SPEC_FULL.md). [`Engine`] owns the worker threads and
//! shared state; [`RuntimeConfig`] resolves the process environment into
//! the values an engine needs to start.

pub mod clock;
pub mod commands;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod file_recv;
pub mod file_send;
mod kv;
pub mod messaging;
pub mod neighbor;
pub mod pipeline;
pub mod raw;

pub use commands::{Command, CommandResponse};
pub use config::RuntimeConfig;
pub use error::Error;
pub use events::{Event, NeighborInfo};
pub use pipeline::Engine;
pub use raw::{LoopbackInterface, RawInterface};
