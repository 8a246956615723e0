/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use etherlink_wire::{Frame, MacAddr, MessageType};

use crate::clock::now_ms;
use crate::events::Event;
use crate::pipeline::Engine;

/// Neighbors are considered "active" for broadcast purposes if heard from
/// within this many milliseconds (SPEC_FULL.md §4.6).
pub const DEFAULT_ACTIVE_SINCE_MS: i64 = 60_000;

pub fn send_text(engine: &Engine, dst: MacAddr, body: &str) {
    engine.enqueue_to(dst, MessageType::AppMessage, body.as_bytes().to_vec());
}

/// Send `body` to every neighbor last seen within `active_since_ms` of now.
pub fn send_text_all(engine: &Engine, body: &str, active_since_ms: Option<i64>) {
    let window = active_since_ms.unwrap_or(DEFAULT_ACTIVE_SINCE_MS);
    let now = now_ms();
    for dst in engine.neighbors.active_since(now, window) {
        send_text(engine, dst, body);
    }
}

/// Inbound APP_MESSAGE handler: surface it as a chat event.
pub fn on_message(engine: &Engine, frame: &Frame) {
    let text = String::from_utf8_lossy(&frame.payload).to_string();
    engine.publish_event(Event::Chat { src: frame.src.to_string(), text });
}
