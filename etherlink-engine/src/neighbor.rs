/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::collections::HashMap;

use parking_lot::RwLock;

use etherlink_wire::MacAddr;

/// One observed peer: its last-known alias and the last time it was heard
/// from. SPEC_FULL.md §3: an entry exists iff a DISCOVER_REPLY has been
/// observed from that address; `last_seen` is monotonically non-decreasing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NeighborEntry {
    pub alias: String,
    pub last_seen: i64,
}

/// Append/update-only table of observed peers, keyed by hardware address.
pub struct NeighborTable {
    entries: RwLock<HashMap<MacAddr, NeighborEntry>>,
}

impl Default for NeighborTable {
    fn default() -> Self {
        Self::new()
    }
}

impl NeighborTable {
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }

    /// Record a sighting of `addr` with `alias` at `now`. Returns `true` if
    /// the entry was created or its alias changed — the trigger for a
    /// `neighbors_changed` event (SPEC_FULL.md §4.5).
    pub fn observe(&self, addr: MacAddr, alias: String, now: i64) -> bool {
        let mut entries = self.entries.write();
        match entries.get_mut(&addr) {
            Some(existing) => {
                let alias_changed = existing.alias != alias;
                existing.alias = alias;
                existing.last_seen = existing.last_seen.max(now);
                alias_changed
            }
            None => {
                entries.insert(addr, NeighborEntry { alias, last_seen: now });
                true
            }
        }
    }

    pub fn get(&self, addr: &MacAddr) -> Option<NeighborEntry> {
        self.entries.read().get(addr).cloned()
    }

    /// A consistent point-in-time snapshot for command handlers (`roster_get`)
    /// and broadcast filtering (`send_text_all`).
    pub fn snapshot(&self) -> Vec<(MacAddr, NeighborEntry)> {
        self.entries.read().iter().map(|(addr, e)| (*addr, e.clone())).collect()
    }

    /// Addresses last seen within `active_since` milliseconds of `now`
    /// (SPEC_FULL.md §4.6, §8 property 8).
    pub fn active_since(&self, now: i64, active_since_ms: i64) -> Vec<MacAddr> {
        self.entries
            .read()
            .iter()
            .filter(|(_, e)| now - e.last_seen <= active_since_ms)
            .map(|(addr, _)| *addr)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creating_an_entry_reports_change() {
        let table = NeighborTable::new();
        assert!(table.observe(MacAddr([1; 6]), "alice".to_string(), 100));
        assert_eq!(table.get(&MacAddr([1; 6])).unwrap().alias, "alice");
    }

    #[test]
    fn same_alias_again_reports_no_change() {
        let table = NeighborTable::new();
        table.observe(MacAddr([1; 6]), "alice".to_string(), 100);
        assert!(!table.observe(MacAddr([1; 6]), "alice".to_string(), 200));
    }

    #[test]
    fn alias_change_is_reported() {
        let table = NeighborTable::new();
        table.observe(MacAddr([1; 6]), "alice".to_string(), 100);
        assert!(table.observe(MacAddr([1; 6]), "alice2".to_string(), 200));
    }

    #[test]
    fn last_seen_never_rewinds() {
        let table = NeighborTable::new();
        table.observe(MacAddr([1; 6]), "alice".to_string(), 500);
        table.observe(MacAddr([1; 6]), "alice".to_string(), 100);
        assert_eq!(table.get(&MacAddr([1; 6])).unwrap().last_seen, 500);
    }

    #[test]
    fn active_since_filters_by_freshness() {
        let table = NeighborTable::new();
        table.observe(MacAddr([1; 6]), "fresh".to_string(), 1000);
        table.observe(MacAddr([2; 6]), "stale".to_string(), 0);
        let active = table.active_since(1000, 60);
        assert_eq!(active, vec![MacAddr([1; 6])]);
    }
}
