/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use serde::Serialize;

use etherlink_wire::MacAddr;

/// One row of the neighbor roster, as published to front-ends.
#[derive(Serialize, Clone, Debug)]
pub struct NeighborInfo {
    pub mac: String,
    pub alias: String,
    pub last_seen_ms: i64,
}

/// Events published on the event channel (SPEC_FULL.md §4.9). Clients must
/// tolerate event types not in this set, since it is allowed to grow.
#[derive(Serialize, Clone, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    NeighborsChanged { neighbors: Vec<NeighborInfo> },
    Chat { src: String, text: String },

    FileTxStarted { file_id: String, dst: String, name: String, total: u64 },
    FileTxProgress { file_id: String, acked: u64, total: u64, progress: f64 },
    FileTxFinished { file_id: String, status: &'static str },
    FileTxError { file_id: String, reason: String },

    FileRxStarted { file_id: String, src: String, name: String, total: u64 },
    FileRxProgress { file_id: String, received: u64, total: u64, progress: f64 },
    FileRxFinished { file_id: String, status: &'static str },
    FileRxError { file_id: String, error: String },
}

impl Event {
    pub fn neighbors_changed(roster: &[(MacAddr, crate::neighbor::NeighborEntry)]) -> Self {
        Self::NeighborsChanged {
            neighbors: roster
                .iter()
                .map(|(mac, e)| NeighborInfo { mac: mac.to_string(), alias: e.alias.clone(), last_seen_ms: e.last_seen })
                .collect(),
        }
    }

    pub fn tx_progress(file_id: &str, acked: u64, total: u64) -> Self {
        let progress = if total == 0 { 1.0 } else { acked as f64 / total as f64 };
        Self::FileTxProgress { file_id: file_id.to_string(), acked, total, progress }
    }

    pub fn rx_progress(file_id: &str, received: u64, total: u64) -> Self {
        let progress = if total == 0 { 1.0 } else { received as f64 / total as f64 };
        Self::FileRxProgress { file_id: file_id.to_string(), received, total, progress }
    }
}
