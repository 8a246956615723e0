/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use etherlink_wire::{MacAddr, MessageType};

use crate::clock::now_ms;
use crate::error::Error;
use crate::events::Event;
use crate::kv;
use crate::pipeline::Engine;

const DEFAULT_WINDOW_SIZE: usize = 16;
const DEFAULT_TIMEOUT_MS: i64 = 600;
const DEFAULT_MAX_RETRIES: u32 = 10;
const META_RETRY_INTERVAL_MS: i64 = 1500;
const META_GIVE_UP_MS: i64 = 30_000;

struct SendState {
    next_to_send: u64,
    last_acked: i64,
    inflight: HashMap<u64, (i64, u32)>,
    acked: HashSet<u64>,
    finished: bool,
    meta_acked: bool,
    meta_first_sent_at: i64,
    meta_last_sent_at: i64,
}

/// One outgoing transfer in progress (SPEC_FULL.md §4.7).
pub struct SendContext {
    pub file_id: String,
    pub dst: MacAddr,
    pub path: PathBuf,
    pub rel_path: Option<String>,
    pub size: u64,
    pub sha256_hex: String,
    pub chunk_size: usize,
    pub total_chunks: u64,
    pub window_size: usize,
    pub timeout_ms: i64,
    pub max_retries: u32,
    file: Mutex<File>,
    state: Mutex<SendState>,
}

#[derive(Default)]
pub struct SendRegistry {
    contexts: Mutex<HashMap<String, std::sync::Arc<SendContext>>>,
}

impl SendRegistry {
    pub fn get(&self, file_id: &str) -> Option<std::sync::Arc<SendContext>> {
        self.contexts.lock().get(file_id).cloned()
    }

    pub fn remove(&self, file_id: &str) {
        self.contexts.lock().remove(file_id);
    }

    /// Every context still in flight, for the pump thread to drive forward.
    pub fn active(&self) -> Vec<std::sync::Arc<SendContext>> {
        self.contexts.lock().values().cloned().collect()
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

fn meta_payload(ctx: &SendContext, name: &str) -> Vec<u8> {
    let mut pairs = vec![
        ("file_id", ctx.file_id.as_str()),
        ("name", name),
        ("size", &ctx.size.to_string()),
        ("sha256", ctx.sha256_hex.as_str()),
        ("chunk_size", &ctx.chunk_size.to_string()),
        ("total", &ctx.total_chunks.to_string()),
    ];
    if let Some(rel) = ctx.rel_path.as_deref() {
        pairs.push(("path", rel));
    }
    kv::build(&pairs).into_bytes()
}

/// Register and start a single-file transfer, returning its `file_id`.
pub fn send_file(engine: &Engine, path: &Path, dst: MacAddr, rel_path: Option<String>) -> Result<String, Error> {
    let metadata = std::fs::metadata(path)?;
    let size = metadata.len();
    let sha256_hex = sha256_file(path)?;
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("file").to_string();
    let file_id = format!("{}-{}", name, &sha256_hex[..12.min(sha256_hex.len())]);

    let chunk_size = engine.config.chunk_size;
    let total_chunks = if size == 0 { 0 } else { (size + chunk_size as u64 - 1) / chunk_size as u64 };

    let file = File::open(path)?;
    let now = now_ms();
    let ctx = std::sync::Arc::new(SendContext {
        file_id: file_id.clone(),
        dst,
        path: path.to_path_buf(),
        rel_path,
        size,
        sha256_hex,
        chunk_size,
        total_chunks,
        window_size: DEFAULT_WINDOW_SIZE,
        timeout_ms: DEFAULT_TIMEOUT_MS,
        max_retries: DEFAULT_MAX_RETRIES,
        file: Mutex::new(file),
        state: Mutex::new(SendState {
            next_to_send: 0,
            last_acked: -1,
            inflight: HashMap::new(),
            acked: HashSet::new(),
            finished: false,
            meta_acked: false,
            meta_first_sent_at: now,
            meta_last_sent_at: now,
        }),
    });

    engine.send_registry.contexts.lock().insert(file_id.clone(), ctx.clone());

    let payload = meta_payload(&ctx, &name);
    engine.enqueue_to(dst, MessageType::FileMeta, payload);

    engine.publish_event(Event::FileTxStarted { file_id: file_id.clone(), dst: dst.to_string(), name, total: total_chunks });

    Ok(file_id)
}

/// Walk `folder` and send every regular file under it serially, each one
/// waiting for the previous to finish before starting (SPEC_FULL.md §9: this
/// is an intentional design choice, not a missed optimization).
pub fn send_folder(engine: &Engine, folder: &Path, dst: MacAddr) -> Result<Vec<String>, Error> {
    let mut file_ids = Vec::new();
    for entry in WalkDir::new(folder).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(folder).unwrap_or(entry.path());
        let rel_str = rel.components().map(|c| c.as_os_str().to_string_lossy().to_string()).collect::<Vec<_>>().join("/");
        let file_id = send_file(engine, entry.path(), dst, Some(rel_str))?;
        wait_until_finished(engine, &file_id);
        file_ids.push(file_id);
    }
    Ok(file_ids)
}

fn wait_until_finished(engine: &Engine, file_id: &str) {
    while let Some(ctx) = engine.send_registry.get(file_id) {
        if ctx.state.lock().finished {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(20));
    }
}

/// ACK handler: `next_needed` advances the window cumulatively, and any ACK
/// at all confirms the initial META was received (file_sender.py `_on_ack`).
pub fn on_ack(engine: &Engine, frame: &etherlink_wire::Frame) {
    let kv = kv::parse(&String::from_utf8_lossy(&frame.payload));
    let (Some(file_id), Some(next_needed)) = (kv.get("file_id"), kv.get("next_needed").and_then(|v| v.parse::<u64>().ok())) else {
        return;
    };
    let Some(ctx) = engine.send_registry.get(file_id) else { return };

    let acked_count;
    {
        let mut state = ctx.state.lock();
        state.meta_acked = true;
        let newly_acked: Vec<u64> = state.inflight.keys().copied().filter(|idx| *idx < next_needed).collect();
        for idx in newly_acked {
            state.inflight.remove(&idx);
            state.acked.insert(idx);
        }
        if next_needed > 0 {
            state.last_acked = state.last_acked.max(next_needed as i64 - 1);
        }
        acked_count = state.acked.len() as u64;
    }
    engine.publish_event(Event::tx_progress(&ctx.file_id, acked_count, ctx.total_chunks));
}

/// FIN handler for FINs a peer's file receiver sent back to us (error aborts).
pub fn on_fin(engine: &Engine, frame: &etherlink_wire::Frame) {
    let kv = kv::parse(&String::from_utf8_lossy(&frame.payload));
    let Some(file_id) = kv.get("file_id") else { return };
    let Some(ctx) = engine.send_registry.get(file_id) else { return };

    let already_finished = {
        let mut state = ctx.state.lock();
        let was = state.finished;
        state.finished = true;
        was
    };
    if already_finished {
        return;
    }
    engine.send_registry.remove(file_id);

    let status = kv.get("status").map(String::as_str).unwrap_or("error");
    if status == "ok" {
        engine.publish_event(Event::FileTxFinished { file_id: file_id.clone(), status: "ok" });
    } else {
        let reason = kv.get("reason").cloned().unwrap_or_else(|| "unknown".to_string());
        engine.publish_event(Event::FileTxError { file_id: file_id.clone(), reason });
    }
}

fn read_chunk(ctx: &SendContext, idx: u64) -> std::io::Result<Vec<u8>> {
    let start = idx * ctx.chunk_size as u64;
    let end = (start + ctx.chunk_size as u64).min(ctx.size);
    let len = (end - start) as usize;
    let mut buf = vec![0u8; len];
    let mut file = ctx.file.lock();
    file.seek(SeekFrom::Start(start))?;
    file.read_exact(&mut buf)?;
    Ok(buf)
}

fn data_payload(ctx: &SendContext, idx: u64, data: &[u8]) -> Vec<u8> {
    let header = kv::build(&[("file_id", ctx.file_id.as_str()), ("idx", &idx.to_string()), ("total", &ctx.total_chunks.to_string())]);
    let mut payload = header.into_bytes();
    payload.push(b'\n');
    payload.extend_from_slice(data);
    payload
}

fn send_chunk(engine: &Engine, ctx: &SendContext, idx: u64) {
    match read_chunk(ctx, idx) {
        Ok(data) => {
            let payload = data_payload(ctx, idx, &data);
            engine.enqueue_to(ctx.dst, MessageType::FileData, payload);
        }
        Err(e) => tracing::warn!(file_id = %ctx.file_id, idx, error = %e, "failed to read chunk for retransmit"),
    }
}

fn send_fin(engine: &Engine, ctx: &SendContext, status: &str, reason: Option<&str>) {
    let mut pairs = vec![("file_id", ctx.file_id.as_str()), ("status", status)];
    if let Some(r) = reason {
        pairs.push(("reason", r));
    }
    let payload = kv::build(&pairs).into_bytes();
    engine.enqueue_to(ctx.dst, MessageType::FileFin, payload);
}

/// Drive every active transfer forward one tick (invoked every ~20ms by the
/// pump thread): META retry, retransmission of expired chunks, window
/// refill, and completion detection.
pub fn pump(engine: &Engine) {
    for ctx in engine.send_registry.active() {
        pump_one(engine, &ctx);
    }
}

fn pump_one(engine: &Engine, ctx: &std::sync::Arc<SendContext>) {
    let now = now_ms();

    let meta_outcome = {
        let mut state = ctx.state.lock();
        if state.finished {
            return;
        }
        if !state.meta_acked {
            if now - state.meta_first_sent_at >= META_GIVE_UP_MS {
                state.finished = true;
                MetaOutcome::TimedOut
            } else if now - state.meta_last_sent_at >= META_RETRY_INTERVAL_MS {
                state.meta_last_sent_at = now;
                MetaOutcome::Retry
            } else {
                MetaOutcome::Wait
            }
        } else {
            MetaOutcome::Acked
        }
    };

    match meta_outcome {
        MetaOutcome::TimedOut => {
            engine.send_registry.remove(&ctx.file_id);
            send_fin(engine, ctx, "error", Some("meta_timeout"));
            engine.publish_event(Event::FileTxError { file_id: ctx.file_id.clone(), reason: "meta_timeout".to_string() });
            return;
        }
        MetaOutcome::Retry => {
            let name = ctx.path.file_name().and_then(|n| n.to_str()).unwrap_or("file").to_string();
            let payload = meta_payload(ctx, &name);
            engine.enqueue_to(ctx.dst, MessageType::FileMeta, payload);
            return;
        }
        MetaOutcome::Wait => return,
        MetaOutcome::Acked => {}
    }

    let timed_out_idx = retransfer_expired(engine, ctx, now);
    if timed_out_idx.is_some() {
        engine.send_registry.remove(&ctx.file_id);
        send_fin(engine, ctx, "error", Some("timeout"));
        engine.publish_event(Event::FileTxError { file_id: ctx.file_id.clone(), reason: "timeout".to_string() });
        return;
    }

    let finished_now = refill_window_and_check_completion(engine, ctx, now);
    if finished_now {
        engine.send_registry.remove(&ctx.file_id);
        send_fin(engine, ctx, "ok", None);
        engine.publish_event(Event::FileTxFinished { file_id: ctx.file_id.clone(), status: "ok" });
    }
}

enum MetaOutcome {
    Wait,
    Retry,
    TimedOut,
    Acked,
}

/// Mirrors `_retransfer_expired`: walks inflight chunks in index order and
/// retransmits any that have timed out. The moment one has exhausted its
/// retries, the whole pass stops — later inflight indices are left alone
/// this tick, matching the original's `break`.
fn retransfer_expired(engine: &Engine, ctx: &std::sync::Arc<SendContext>, now: i64) -> Option<u64> {
    let mut state = ctx.state.lock();
    let mut expired: Vec<u64> = state.inflight.iter().filter(|(_, (sent_at, _))| now - sent_at >= ctx.timeout_ms).map(|(idx, _)| *idx).collect();
    expired.sort_unstable();

    for idx in expired.drain(..) {
        let (_, retries) = *state.inflight.get(&idx).unwrap();
        if retries >= ctx.max_retries {
            state.finished = true;
            return Some(idx);
        }
        state.inflight.insert(idx, (now, retries + 1));
        drop(state);
        send_chunk(engine, ctx, idx);
        state = ctx.state.lock();
    }
    None
}

fn refill_window_and_check_completion(engine: &Engine, ctx: &std::sync::Arc<SendContext>, now: i64) -> bool {
    loop {
        let next_idx = {
            let mut state = ctx.state.lock();
            if state.finished {
                return false;
            }
            if state.inflight.len() >= ctx.window_size || state.next_to_send >= ctx.total_chunks {
                break;
            }
            let idx = state.next_to_send;
            state.inflight.insert(idx, (now, 0));
            state.next_to_send += 1;
            idx
        };
        send_chunk(engine, ctx, next_idx);
    }

    let mut state = ctx.state.lock();
    if !state.finished && state.last_acked + 1 >= ctx.total_chunks as i64 {
        state.finished = true;
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::pipeline::Engine;
    use crate::raw::LoopbackInterface;
    use etherlink_wire::{MacAddr, MessageType};

    fn test_engine() -> std::sync::Arc<Engine> {
        let (a, _b) = LoopbackInterface::pair(MacAddr([1; 6]), MacAddr([2; 6]));
        let config = RuntimeConfig {
            interface_name: "test0".to_string(),
            ethertype: 0x88b5,
            alias: "tester".to_string(),
            psk: b"shared secret".to_vec(),
            base_dir: std::env::temp_dir(),
            chunk_size: 10,
        };
        Engine::new(config, Box::new(a))
    }

    fn ack_frame(engine: &Engine, file_id: &str, next_needed: u64) -> etherlink_wire::Frame {
        etherlink_wire::Frame {
            dst: engine.local_mac(),
            src: MacAddr([9; 6]),
            ethertype: 0x88b5,
            message_type: MessageType::Ack,
            sequence: 0,
            payload: format!("file_id={}\nnext_needed={}\n", file_id, next_needed).into_bytes(),
        }
    }

    /// SPEC_FULL.md §8 property 6: receiving the same cumulative ACK twice
    /// does not rewind `last_acked` or reinsert already-acked indices.
    #[test]
    fn duplicate_ack_does_not_regress_progress() {
        let engine = test_engine();
        let path = std::env::temp_dir().join(format!("etherlink-ack-idem-{}.bin", std::process::id()));
        std::fs::write(&path, b"0123456789abcdefghij01234567890").unwrap(); // 32 bytes / chunk_size 10 = 4 chunks

        let file_id = engine.file_send(&path, MacAddr([2; 6]), None).unwrap();
        let events = engine.subscribe();

        on_ack(&engine, &ack_frame(&engine, &file_id, 0));
        let first = events.recv_timeout(std::time::Duration::from_secs(1)).unwrap();
        assert!(matches!(first, Event::FileTxProgress { acked: 0, total: 4, .. }));

        pump(&engine); // meta is acked now, so this refills the window with all 4 chunks

        on_ack(&engine, &ack_frame(&engine, &file_id, 2));
        let second = events.recv_timeout(std::time::Duration::from_secs(1)).unwrap();
        assert!(matches!(second, Event::FileTxProgress { acked: 2, total: 4, .. }));

        on_ack(&engine, &ack_frame(&engine, &file_id, 2));
        let third = events.recv_timeout(std::time::Duration::from_secs(1)).unwrap();
        assert!(matches!(third, Event::FileTxProgress { acked: 2, total: 4, .. }), "a repeated ACK must not change the acked count");

        let _ = std::fs::remove_file(&path);
    }
}
