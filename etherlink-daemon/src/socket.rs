/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! The local command/event surface (SPEC_FULL.md §4.9): a Unix domain
//! stream socket carrying newline-delimited JSON in both directions.
//! Each accepted connection gets a reader thread (decodes [`Command`]s,
//! writes back a [`CommandResponse`] per line) and a writer thread (drains
//! the engine's event subscription onto the same socket). A connection
//! whose event backlog overflows is disconnected rather than slowed down
//! for — [`Engine::publish_event`] already enforces that upstream.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use etherlink_engine::{Command, CommandResponse, Engine};
use etherlink_wire::MacAddr;

pub fn serve(engine: Arc<Engine>, socket_path: &Path, shutdown: Arc<AtomicBool>) -> std::io::Result<()> {
    let _ = std::fs::remove_file(socket_path);
    let listener = UnixListener::bind(socket_path)?;
    listener.set_nonblocking(true)?;

    tracing::info!(path = %socket_path.display(), "listening for commands");

    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _addr)) => {
                let engine = engine.clone();
                thread::Builder::new()
                    .name("etherlink-conn".into())
                    .spawn(move || handle_connection(engine, stream))
                    .expect("failed to spawn connection handler thread");
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(std::time::Duration::from_millis(50));
            }
            Err(e) => {
                tracing::warn!(error = %e, "command socket accept failed");
                break;
            }
        }
    }

    let _ = std::fs::remove_file(socket_path);
    Ok(())
}

fn handle_connection(engine: Arc<Engine>, stream: UnixStream) {
    let write_half = match stream.try_clone() {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "failed to clone connection for event writer");
            return;
        }
    };

    let events = engine.subscribe();
    let writer_handle = thread::Builder::new()
        .name("etherlink-conn-events".into())
        .spawn(move || write_events(write_half, events))
        .expect("failed to spawn event writer thread");

    let mut reader = BufReader::new(stream.try_clone().expect("stream clone for reading"));
    let mut writer = stream;
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let response = handle_line(&engine, trimmed);
                let Ok(mut out) = serde_json::to_string(&response) else { continue };
                out.push('\n');
                if writer.write_all(out.as_bytes()).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    }

    let _ = writer_handle.join();
}

fn handle_line(engine: &Engine, line: &str) -> CommandResponse {
    let command: Command = match serde_json::from_str(line) {
        Ok(c) => c,
        Err(e) => return CommandResponse::err(format!("bad command: {}", e)),
    };

    match command {
        Command::Ping => CommandResponse::ok(serde_json::json!("pong")),
        Command::Echo { text } => CommandResponse::ok(serde_json::json!(text)),
        Command::RosterGet => CommandResponse::ok(serde_json::json!(engine.roster())),
        Command::SendText { dst, body } => match MacAddr::from_str(&dst) {
            Ok(mac) => {
                engine.send_text(mac, &body);
                CommandResponse::ok(serde_json::json!(null))
            }
            Err(e) => CommandResponse::err(format!("bad dst: {}", e)),
        },
        Command::SendTextAll { body, active_since } => {
            engine.send_text_all(&body, active_since.map(|s| s as i64 * 1000));
            CommandResponse::ok(serde_json::json!(null))
        }
        Command::FileSend { path, dst, rel_path } => match MacAddr::from_str(&dst) {
            Ok(mac) => match engine.file_send(Path::new(&path), mac, rel_path) {
                Ok(file_id) => CommandResponse::ok(serde_json::json!({ "file_id": file_id })),
                Err(e) => CommandResponse::err(e.wire_code()),
            },
            Err(e) => CommandResponse::err(format!("bad dst: {}", e)),
        },
        Command::FolderSend { folder, dst } => match MacAddr::from_str(&dst) {
            Ok(mac) => match engine.folder_send(Path::new(&folder), mac) {
                Ok(file_ids) => CommandResponse::ok(serde_json::json!({ "file_ids": file_ids })),
                Err(e) => CommandResponse::err(e.wire_code()),
            },
            Err(e) => CommandResponse::err(format!("bad dst: {}", e)),
        },
    }
}

fn write_events(mut writer: UnixStream, events: crossbeam_channel::Receiver<etherlink_engine::Event>) {
    for event in events.iter() {
        let Ok(mut line) = serde_json::to_string(&event) else { continue };
        line.push('\n');
        if writer.write_all(line.as_bytes()).is_err() {
            return;
        }
    }
}
