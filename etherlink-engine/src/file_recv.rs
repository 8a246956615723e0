/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use etherlink_wire::{Frame, MessageType};

use crate::error::Error;
use crate::events::Event;
use crate::kv;
use crate::pipeline::Engine;

struct RecvState {
    received: std::collections::HashSet<u64>,
    next_needed: u64,
    finished: bool,
}

/// One inbound transfer in progress (SPEC_FULL.md §4.8).
pub struct ReceiveContext {
    pub file_id: String,
    pub src: etherlink_wire::MacAddr,
    pub name: String,
    pub size: u64,
    pub sha256_expected: String,
    pub chunk_size: usize,
    pub total_chunks: u64,
    pub temp_path: PathBuf,
    pub dest_path: PathBuf,
    file: Mutex<File>,
    state: Mutex<RecvState>,
}

#[derive(Default)]
pub struct ReceiveRegistry {
    contexts: Mutex<HashMap<String, std::sync::Arc<ReceiveContext>>>,
}

impl ReceiveRegistry {
    pub fn get(&self, file_id: &str) -> Option<std::sync::Arc<ReceiveContext>> {
        self.contexts.lock().get(file_id).cloned()
    }

    pub fn remove(&self, file_id: &str) {
        self.contexts.lock().remove(file_id);
    }
}

struct ParsedMeta {
    file_id: String,
    name: String,
    size: u64,
    sha256: String,
    chunk_size: usize,
    total: u64,
    rel: Option<String>,
}

fn require(kv: &HashMap<String, String>, key: &'static str) -> Result<String, Error> {
    kv.get(key).cloned().ok_or(Error::BadMetaMissing(key))
}

fn parse_meta(kv: &HashMap<String, String>) -> Result<ParsedMeta, Error> {
    let file_id = require(kv, "file_id")?;
    let name = require(kv, "name")?;
    let size_raw = require(kv, "size")?;
    let sha256 = require(kv, "sha256")?;
    let chunk_size_raw = require(kv, "chunk_size")?;
    let total_raw = require(kv, "total")?;

    let size: u64 = size_raw.parse().map_err(|_| Error::BadMetaNonNumeric("size"))?;
    let chunk_size: usize = chunk_size_raw.parse().map_err(|_| Error::BadMetaNonNumeric("chunk_size"))?;
    let total: u64 = total_raw.parse().map_err(|_| Error::BadMetaNonNumeric("total"))?;

    if file_id.is_empty() {
        return Err(Error::BadMetaEmptyStr("file_id"));
    }
    if name.is_empty() {
        return Err(Error::BadMetaEmptyStr("name"));
    }
    if sha256.is_empty() {
        return Err(Error::BadMetaEmptyStr("sha256"));
    }

    if chunk_size == 0 {
        return Err(Error::BadMetaRanges("chunk_size"));
    }

    // `path` is the documented key; `rel` is accepted too for senders that
    // still emit it. Both name the file's destination path relative to the
    // receiver's base directory.
    let rel = kv.get("path").or_else(|| kv.get("rel")).cloned();

    Ok(ParsedMeta { file_id, name, size, sha256: sha256.to_lowercase(), chunk_size, total, rel })
}

/// Rejects absolute paths and any `.`/`..`/empty segment, the way
/// `_sanitize_relative_path` keeps a transfer from writing outside the base
/// directory (SPEC_FULL.md §8 property 7).
fn sanitize_relative_path(raw: &str) -> Result<PathBuf, Error> {
    if raw.starts_with('/') {
        return Err(Error::PathOutsideBase);
    }
    let mut out = PathBuf::new();
    for segment in raw.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(Error::PathOutsideBase);
        }
        out.push(segment);
    }
    Ok(out)
}

fn resolve_dest(base_dir: &Path, rel: &Path) -> Result<PathBuf, Error> {
    let dest = base_dir.join(rel);
    let parent = dest.parent().unwrap_or(base_dir);
    fs::create_dir_all(parent)?;

    let base_real = base_dir.canonicalize()?;
    let parent_real = parent.canonicalize()?;
    if parent_real == base_real || parent_real.starts_with(&base_real) {
        Ok(dest)
    } else {
        Err(Error::PathOutsideBase)
    }
}

fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn send_ack(engine: &Engine, dst: etherlink_wire::MacAddr, file_id: &str, next_needed: u64) {
    let payload = kv::build(&[("file_id", file_id), ("next_needed", &next_needed.to_string())]).into_bytes();
    engine.enqueue_to(dst, MessageType::Ack, payload);
}

fn send_fin(engine: &Engine, dst: etherlink_wire::MacAddr, file_id: &str, status: &str, reason: Option<&str>) {
    let mut pairs = vec![("file_id", file_id), ("status", status)];
    if let Some(r) = reason {
        pairs.push(("reason", r));
    }
    let payload = kv::build(&pairs).into_bytes();
    engine.enqueue_to(dst, MessageType::FileFin, payload);
}

/// Handle an inbound FILE_META frame: validate, create the receive context
/// (or handle the zero-length special case), and ACK or reject.
pub fn on_meta(engine: &Engine, frame: &Frame) {
    let kv = kv::parse(&String::from_utf8_lossy(&frame.payload));
    let meta = match parse_meta(&kv) {
        Ok(m) => m,
        Err(e) => {
            if let Some(file_id) = kv.get("file_id").filter(|s| !s.is_empty()) {
                send_fin(engine, frame.src, file_id, "error", Some(e.wire_code()));
            }
            tracing::debug!(error = %e, "rejecting FILE_META");
            return;
        }
    };

    let rel_path = meta.rel.as_deref().map(sanitize_relative_path).transpose();
    let rel_path = match rel_path {
        Ok(p) => p,
        Err(e) => {
            send_fin(engine, frame.src, &meta.file_id, "error", Some(e.wire_code()));
            engine.publish_event(Event::FileRxError { file_id: meta.file_id.clone(), error: e.wire_code().to_string() });
            return;
        }
    };
    let dest_rel = rel_path.unwrap_or_else(|| PathBuf::from(&meta.name));

    let dest_path = match resolve_dest(&engine.config.base_dir, &dest_rel) {
        Ok(p) => p,
        Err(e) => {
            send_fin(engine, frame.src, &meta.file_id, "error", Some(e.wire_code()));
            engine.publish_event(Event::FileRxError { file_id: meta.file_id.clone(), error: e.wire_code().to_string() });
            return;
        }
    };

    engine.publish_event(Event::FileRxStarted { file_id: meta.file_id.clone(), src: frame.src.to_string(), name: meta.name.clone(), total: meta.total });

    if meta.total == 0 {
        handle_empty_file(engine, frame.src, &meta, &dest_path);
        return;
    }

    let temp_path = PathBuf::from(format!("{}.part", dest_path.display()));
    let file = match File::create(&temp_path) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(error = %e, "failed to create temp file for transfer");
            send_fin(engine, frame.src, &meta.file_id, "error", Some("io_error"));
            return;
        }
    };

    let ctx = std::sync::Arc::new(ReceiveContext {
        file_id: meta.file_id.clone(),
        src: frame.src,
        name: meta.name,
        size: meta.size,
        sha256_expected: meta.sha256,
        chunk_size: meta.chunk_size,
        total_chunks: meta.total,
        temp_path,
        dest_path,
        file: Mutex::new(file),
        state: Mutex::new(RecvState { received: std::collections::HashSet::new(), next_needed: 0, finished: false }),
    });
    engine.recv_registry.contexts.lock().insert(meta.file_id.clone(), ctx);

    send_ack(engine, frame.src, &meta.file_id, 0);
}

fn handle_empty_file(engine: &Engine, src: etherlink_wire::MacAddr, meta: &ParsedMeta, dest_path: &Path) {
    let empty_sha256 = hex::encode(Sha256::digest(b""));
    if empty_sha256.eq_ignore_ascii_case(&meta.sha256) {
        if let Err(e) = File::create(dest_path) {
            tracing::warn!(error = %e, "failed to create empty destination file");
            send_fin(engine, src, &meta.file_id, "error", Some("io_error"));
            return;
        }
        engine.publish_event(Event::FileRxProgress { file_id: meta.file_id.clone(), received: 0, total: 0, progress: 1.0 });
        engine.publish_event(Event::FileRxFinished { file_id: meta.file_id.clone(), status: "ok" });
    } else {
        send_fin(engine, src, &meta.file_id, "error", Some("hash_mismatch"));
        engine.publish_event(Event::FileRxError { file_id: meta.file_id.clone(), error: "hash_mismatch".to_string() });
    }
}

/// Handle an inbound FILE_DATA frame. Malformed or unrecognized chunks are
/// dropped silently — the sender's own retry policy, not a receiver-side
/// timeout, is what terminates a persistently malformed transfer.
pub fn on_data(engine: &Engine, frame: &Frame) {
    let Some(sep) = find_subslice(&frame.payload, b"\n\n") else {
        tracing::debug!("dropping FILE_DATA with no header separator");
        return;
    };
    let (header_bytes, rest) = frame.payload.split_at(sep);
    let data = &rest[2..];

    let header = kv::parse(&String::from_utf8_lossy(header_bytes));
    let Some(file_id) = header.get("file_id") else { return };
    let Some(ctx) = engine.recv_registry.get(file_id) else { return };

    let (Some(idx), Some(total)) = (header.get("idx").and_then(|v| v.parse::<u64>().ok()), header.get("total").and_then(|v| v.parse::<u64>().ok())) else {
        return;
    };
    if total == 0 || idx >= ctx.total_chunks {
        return;
    }

    let next_needed;
    {
        let start = idx * ctx.chunk_size as u64;
        let mut file = ctx.file.lock();
        if file.seek(SeekFrom::Start(start)).and_then(|_| file.write_all(data)).is_err() {
            tracing::warn!(file_id = %file_id, idx, "failed to write chunk to temp file");
            return;
        }
    }
    let received_count;
    {
        let mut state = ctx.state.lock();
        state.received.insert(idx);
        while state.received.contains(&state.next_needed) {
            state.next_needed += 1;
        }
        next_needed = state.next_needed;
        received_count = state.received.len() as u64;
    }

    send_ack(engine, ctx.src, &ctx.file_id, next_needed);
    engine.publish_event(Event::rx_progress(&ctx.file_id, received_count, ctx.total_chunks));

    let just_finished = {
        let mut state = ctx.state.lock();
        if !state.finished && received_count >= ctx.total_chunks {
            state.finished = true;
            true
        } else {
            false
        }
    };

    if just_finished {
        finalize(engine, &ctx);
    }
}

fn finalize(engine: &Engine, ctx: &std::sync::Arc<ReceiveContext>) {
    engine.recv_registry.remove(&ctx.file_id);

    let actual = match sha256_file(&ctx.temp_path) {
        Ok(h) => h,
        Err(e) => {
            tracing::warn!(file_id = %ctx.file_id, error = %e, "failed to hash completed transfer");
            engine.publish_event(Event::FileRxError { file_id: ctx.file_id.clone(), error: "io_error".to_string() });
            return;
        }
    };

    if actual.eq_ignore_ascii_case(&ctx.sha256_expected) {
        if let Err(e) = fs::rename(&ctx.temp_path, &ctx.dest_path) {
            tracing::warn!(file_id = %ctx.file_id, error = %e, "failed to move completed transfer into place");
            engine.publish_event(Event::FileRxError { file_id: ctx.file_id.clone(), error: "io_error".to_string() });
            return;
        }
        engine.publish_event(Event::FileRxFinished { file_id: ctx.file_id.clone(), status: "ok" });
    } else {
        let _ = fs::remove_file(&ctx.temp_path);
        send_fin(engine, ctx.src, &ctx.file_id, "error", Some("hash_mismatch"));
        engine.publish_event(Event::FileRxError { file_id: ctx.file_id.clone(), error: "hash_mismatch".to_string() });
    }
}

/// FIN handler for FINs a peer's file sender sent us (meta timeout, retry
/// exhaustion, or a courtesy completion notice we can otherwise ignore).
pub fn on_fin(engine: &Engine, frame: &Frame) {
    let kv = kv::parse(&String::from_utf8_lossy(&frame.payload));
    let Some(file_id) = kv.get("file_id") else { return };
    let Some(ctx) = engine.recv_registry.get(file_id) else { return };

    let status = kv.get("status").map(String::as_str).unwrap_or("error");
    if status == "ok" {
        return;
    }

    {
        let mut state = ctx.state.lock();
        if state.finished {
            return;
        }
        state.finished = true;
    }
    engine.recv_registry.remove(file_id);
    let _ = fs::remove_file(&ctx.temp_path);
    let reason = kv.get("reason").cloned().unwrap_or_else(|| "unknown".to_string());
    engine.publish_event(Event::FileRxError { file_id: file_id.clone(), error: reason });
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
