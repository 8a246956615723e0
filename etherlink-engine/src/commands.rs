/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use serde::{Deserialize, Serialize};

/// Commands accepted on the JSONL command channel (SPEC_FULL.md §4.9).
#[derive(Deserialize, Clone, Debug)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    Ping,
    Echo { text: String },
    SendText { dst: String, body: String },
    SendTextAll { body: String, active_since: Option<u64> },
    RosterGet,
    FileSend { path: String, dst: String, rel_path: Option<String> },
    FolderSend { folder: String, dst: String },
}

/// The single JSON object returned for a given [`Command`] on the same channel.
#[derive(Serialize, Clone, Debug)]
pub struct CommandResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResponse {
    pub fn ok(value: serde_json::Value) -> Self {
        Self { ok: true, data: Some(value), error: None }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self { ok: false, data: None, error: Some(msg.into()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_text() {
        let json = r#"{"cmd":"send_text","dst":"aa:bb:cc:dd:ee:ff","body":"hi"}"#;
        let cmd: Command = serde_json::from_str(json).unwrap();
        assert!(matches!(cmd, Command::SendText { .. }));
    }

    #[test]
    fn parses_send_text_all_without_active_since() {
        let json = r#"{"cmd":"send_text_all","body":"hi"}"#;
        let cmd: Command = serde_json::from_str(json).unwrap();
        match cmd {
            Command::SendTextAll { active_since, .. } => assert_eq!(active_since, None),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn rejects_unknown_command() {
        let json = r#"{"cmd":"self_destruct"}"#;
        assert!(serde_json::from_str::<Command>(json).is_err());
    }
}
