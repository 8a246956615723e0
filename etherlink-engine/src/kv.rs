/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::collections::HashMap;

/// Parse a newline-separated `key=value` block, same shape used by ACK,
/// FILE_META, and FILE_FIN payloads (SPEC_FULL.md §6). Blank lines and lines
/// without `=` are skipped rather than treated as errors.
pub fn parse(s: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in s.split('\n') {
        if line.is_empty() {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            out.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
    out
}

/// Render `pairs` as `k=v\n` lines, in the order given.
pub fn build(pairs: &[(&str, &str)]) -> String {
    let mut out = String::new();
    for (k, v) in pairs {
        out.push_str(k);
        out.push('=');
        out.push_str(v);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_block() {
        let kv = parse("file_id=abc\nnext_needed=3\n");
        assert_eq!(kv.get("file_id").map(String::as_str), Some("abc"));
        assert_eq!(kv.get("next_needed").map(String::as_str), Some("3"));
    }

    #[test]
    fn skips_blank_and_malformed_lines() {
        let kv = parse("a=1\n\nnotkv\nb=2\n");
        assert_eq!(kv.len(), 2);
    }
}
