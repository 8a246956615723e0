/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use etherlink_wire::{Frame, MacAddr, MessageType};

use crate::events::Event;
use crate::kv;
use crate::pipeline::Engine;

pub const DISCOVER_INTERVAL_MS: i64 = 5_000;

fn alias_payload(alias: &str) -> Vec<u8> {
    kv::build(&[("alias", alias)]).into_bytes()
}

/// Scheduled task: broadcast a DISCOVER_REQUEST announcing our alias.
pub fn broadcast_request(engine: &Engine) {
    let payload = alias_payload(&engine.config.alias);
    engine.enqueue_to(MacAddr::BROADCAST, MessageType::DiscoverRequest, payload);
}

/// A peer is asking who's out there; reply directly to them. The neighbor
/// table is only ever populated from a DISCOVER_REPLY (SPEC_FULL.md §3), so
/// this does not touch it.
pub fn on_request(engine: &Engine, frame: &Frame) {
    let payload = alias_payload(&engine.config.alias);
    engine.enqueue_to(frame.src, MessageType::DiscoverReply, payload);
}

/// A peer replied to our broadcast; record the sighting.
pub fn on_reply(engine: &Engine, frame: &Frame) {
    let kv = kv::parse(&String::from_utf8_lossy(&frame.payload));
    let alias = kv.get("alias").cloned().unwrap_or_default();
    observe(engine, frame.src, alias);
}

fn observe(engine: &Engine, src: MacAddr, alias: String) {
    let changed = engine.neighbors.observe(src, alias, crate::clock::now_ms());
    if changed {
        let roster = engine.neighbors.snapshot();
        engine.publish_event(Event::neighbors_changed(&roster));
    }
}
