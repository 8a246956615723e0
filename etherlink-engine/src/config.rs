/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::path::{Path, PathBuf};

use crate::error::Error;

const DEFAULT_ETHERTYPE: u16 = 0x88b5;
const DEFAULT_CHUNK_SIZE: usize = 900;
const DEFAULT_ALIAS: &str = "node";

/// Interface name prefixes auto-selection skips (loopback, bridges, tunnels,
/// virtual/tailnet interfaces) — SPEC_FULL.md §6.
const VIRTUAL_PREFIXES: &[&str] = &["lo", "docker", "br-", "veth", "tun", "tap", "vmnet", "tailscale", "wg"];

/// The resolved, immutable view of the engine's runtime configuration
/// (SPEC_FULL.md §1c/§3). Built once at startup and shared read-only.
pub struct RuntimeConfig {
    pub interface_name: String,
    pub ethertype: u16,
    pub alias: String,
    pub psk: Vec<u8>,
    pub base_dir: PathBuf,
    pub chunk_size: usize,
}

/// A minimal view over `/sys/class/net`-style interface state, abstracted so
/// tests can substitute a fake interface list without touching a real NIC.
pub trait InterfaceLister {
    fn list(&self) -> Vec<String>;
    fn operstate_up(&self, ifname: &str) -> bool;
    fn is_wireless(&self, ifname: &str) -> bool;
}

pub struct SysClassNet;

impl InterfaceLister for SysClassNet {
    fn list(&self) -> Vec<String> {
        std::fs::read_dir("/sys/class/net")
            .map(|entries| entries.filter_map(|e| e.ok()).filter_map(|e| e.file_name().into_string().ok()).collect())
            .unwrap_or_default()
    }

    fn operstate_up(&self, ifname: &str) -> bool {
        std::fs::read_to_string(format!("/sys/class/net/{}/operstate", ifname))
            .map(|s| s.trim() == "up")
            .unwrap_or(false)
    }

    fn is_wireless(&self, ifname: &str) -> bool {
        Path::new(&format!("/sys/class/net/{}/wireless", ifname)).exists()
    }
}

fn is_candidate(_lister: &dyn InterfaceLister, ifname: &str) -> bool {
    !VIRTUAL_PREFIXES.iter().any(|p| ifname.starts_with(p))
}

/// Wired-up, then wireless-up, then any-up, then the first candidate interface at all.
fn pick_interface(lister: &dyn InterfaceLister) -> Option<String> {
    let candidates: Vec<String> = lister.list().into_iter().filter(|i| is_candidate(lister, i)).collect();

    let wired_up: Vec<&String> = candidates.iter().filter(|i| !lister.is_wireless(i) && lister.operstate_up(i)).collect();
    if let Some(i) = wired_up.first() {
        return Some((*i).clone());
    }
    let wifi_up: Vec<&String> = candidates.iter().filter(|i| lister.is_wireless(i) && lister.operstate_up(i)).collect();
    if let Some(i) = wifi_up.first() {
        return Some((*i).clone());
    }
    let any_up: Vec<&String> = candidates.iter().filter(|i| lister.operstate_up(i)).collect();
    if let Some(i) = any_up.first() {
        return Some((*i).clone());
    }
    candidates.into_iter().next()
}

fn resolve_interface(lister: &dyn InterfaceLister, env_override: Option<String>) -> String {
    if let Some(name) = env_override {
        if name != "auto" && is_candidate(lister, &name) {
            return name;
        }
    }
    pick_interface(lister).unwrap_or_else(|| "eth0".to_string())
}

fn parse_ethertype(raw: &str) -> Option<u16> {
    let raw = raw.trim();
    let (digits, radix) = if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        (hex, 16)
    } else {
        (raw, 10)
    };
    u16::from_str_radix(digits, radix).ok()
}

fn parse_psk(raw: &str) -> Vec<u8> {
    let trimmed = raw.trim().to_lowercase();
    if let Some(hex) = trimmed.strip_prefix("0x") {
        if let Ok(bytes) = hex::decode(hex) {
            return bytes;
        }
    } else if trimmed.len() % 2 == 0 && trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        if let Ok(bytes) = hex::decode(&trimmed) {
            return bytes;
        }
    }
    raw.as_bytes().to_vec()
}

fn default_alias() -> String {
    hostname_or_default()
}

#[cfg(unix)]
fn hostname_or_default() -> String {
    std::process::Command::new("hostname")
        .output()
        .ok()
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_ALIAS.to_string())
}

#[cfg(not(unix))]
fn hostname_or_default() -> String {
    DEFAULT_ALIAS.to_string()
}

impl RuntimeConfig {
    /// Resolve configuration from the process environment, per SPEC_FULL.md §6.
    pub fn from_env() -> Result<Self, Error> {
        Self::resolve(&SysClassNet, &std::env::vars().collect())
    }

    /// Resolve configuration from an explicit environment map and interface
    /// lister, so tests can pin every input without touching the real OS
    /// environment or network stack.
    pub fn resolve(lister: &dyn InterfaceLister, env: &std::collections::HashMap<String, String>) -> Result<Self, Error> {
        let interface_name = resolve_interface(lister, env.get("INTERFACE").cloned());

        let ethertype = env
            .get("ETHER_TYPE")
            .and_then(|v| parse_ethertype(v))
            .unwrap_or(DEFAULT_ETHERTYPE);

        let alias = env
            .get("ALIAS")
            .cloned()
            .or_else(|| env.get("NODE_ALIAS").cloned())
            .unwrap_or_else(default_alias);

        let psk_raw = env.get("PSK").cloned().ok_or(Error::PermissionDenied)?;
        let psk = parse_psk(&psk_raw);
        if psk.is_empty() {
            return Err(Error::PermissionDenied);
        }

        let base_dir = env.get("BASE_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));

        let chunk_size = env
            .get("CHUNK_SIZE")
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_CHUNK_SIZE);

        Ok(Self { interface_name, ethertype, alias, psk, base_dir, chunk_size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeLister {
        ifaces: Vec<(&'static str, bool, bool)>, // (name, is_wireless, is_up)
    }

    impl InterfaceLister for FakeLister {
        fn list(&self) -> Vec<String> {
            self.ifaces.iter().map(|(n, _, _)| n.to_string()).collect()
        }
        fn operstate_up(&self, ifname: &str) -> bool {
            self.ifaces.iter().find(|(n, _, _)| *n == ifname).map(|(_, _, up)| *up).unwrap_or(false)
        }
        fn is_wireless(&self, ifname: &str) -> bool {
            self.ifaces.iter().find(|(n, _, _)| *n == ifname).map(|(_, w, _)| *w).unwrap_or(false)
        }
    }

    #[test]
    fn prefers_wired_over_wireless_over_any() {
        let lister = FakeLister { ifaces: vec![("lo", false, true), ("wlan0", true, true), ("eth0", false, true)] };
        assert_eq!(pick_interface(&lister), Some("eth0".to_string()));
    }

    #[test]
    fn falls_back_to_wireless_when_no_wired_is_up() {
        let lister = FakeLister { ifaces: vec![("eth0", false, false), ("wlan0", true, true)] };
        assert_eq!(pick_interface(&lister), Some("wlan0".to_string()));
    }

    #[test]
    fn falls_back_to_eth0_default_when_nothing_is_up() {
        let lister = FakeLister { ifaces: vec![] };
        assert_eq!(resolve_interface(&lister, None), "eth0");
    }

    #[test]
    fn ethertype_parses_hex_and_decimal() {
        assert_eq!(parse_ethertype("0x88B5"), Some(0x88b5));
        assert_eq!(parse_ethertype("34933"), Some(34933));
        assert_eq!(parse_ethertype("not a number"), None);
    }

    #[test]
    fn psk_parses_0x_hex_plain_hex_and_raw_utf8() {
        assert_eq!(parse_psk("0xdeadbeef"), vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(parse_psk("deadbeef"), vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(parse_psk("hello world"), b"hello world".to_vec());
        // odd-length hex-looking string is not valid hex, falls back to utf8 bytes
        assert_eq!(parse_psk("abc"), b"abc".to_vec());
    }

    #[test]
    fn missing_psk_is_rejected() {
        let mut env = HashMap::new();
        env.insert("BASE_DIR".to_string(), "/tmp".to_string());
        let lister = FakeLister { ifaces: vec![] };
        assert!(RuntimeConfig::resolve(&lister, &env).is_err());
    }

    #[test]
    fn alias_prefers_alias_then_node_alias_then_default() {
        let lister = FakeLister { ifaces: vec![] };
        let mut env = HashMap::new();
        env.insert("PSK".to_string(), "k".to_string());
        env.insert("NODE_ALIAS".to_string(), "from-node-alias".to_string());
        let cfg = RuntimeConfig::resolve(&lister, &env).unwrap();
        assert_eq!(cfg.alias, "from-node-alias");

        env.insert("ALIAS".to_string(), "from-alias".to_string());
        let cfg = RuntimeConfig::resolve(&lister, &env).unwrap();
        assert_eq!(cfg.alias, "from-alias");
    }
}
