/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::sync::OnceLock;
use std::time::Instant;

static START: OnceLock<Instant> = OnceLock::new();

/// Monotonic milliseconds since the first call in this process. Used
/// throughout for `last_seen`, retransmission timers, and scheduled tasks —
/// never wall-clock time, which can jump backward.
pub fn now_ms() -> i64 {
    let start = START.get_or_init(Instant::now);
    start.elapsed().as_millis() as i64
}
