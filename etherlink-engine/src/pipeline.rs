/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use etherlink_wire::{Frame, MacAddr, MessageType};

use crate::clock::now_ms;
use crate::config::RuntimeConfig;
use crate::discovery;
use crate::error::Error;
use crate::events::{Event, NeighborInfo};
use crate::file_recv::{self, ReceiveRegistry};
use crate::file_send::{self, SendRegistry};
use crate::messaging;
use crate::neighbor::NeighborTable;
use crate::raw::RawInterface;

const QUEUE_CAPACITY: usize = 1024;
const EVENT_CAPACITY: usize = 256;
const PUMP_INTERVAL: Duration = Duration::from_millis(20);
const QUEUE_RECV_TIMEOUT: Duration = Duration::from_secs(1);
const SCHEDULER_TICK: Duration = Duration::from_secs(1);

/// A periodic job run by the scheduler thread (SPEC_FULL.md §4.10): discovery
/// broadcasts are the only built-in task, registered in [`Engine::new`], but
/// the registry is general so future periodic work has somewhere to live.
struct ScheduledTask {
    interval_ms: i64,
    last_run: Mutex<i64>,
    run: Box<dyn Fn(&Engine) + Send + Sync>,
}

/// The running node: owns the raw link, the four worker threads plus the
/// file-transfer pump, and every piece of shared state they coordinate
/// through (SPEC_FULL.md §4.4, §5).
pub struct Engine {
    pub config: Arc<RuntimeConfig>,
    iface: Arc<dyn RawInterface>,
    local_mac: MacAddr,
    sequence: AtomicU32,
    outgoing_tx: Sender<Frame>,
    outgoing_rx: Mutex<Option<Receiver<Frame>>>,
    incoming_tx: Sender<Frame>,
    incoming_rx: Mutex<Option<Receiver<Frame>>>,
    pub neighbors: NeighborTable,
    pub send_registry: SendRegistry,
    pub recv_registry: ReceiveRegistry,
    tasks: Mutex<Vec<ScheduledTask>>,
    subscribers: Mutex<Vec<Sender<Event>>>,
    shutdown: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Build an engine bound to `iface`. Does not start any threads; call
    /// [`Engine::start`] once the caller is ready to go live.
    pub fn new(config: RuntimeConfig, iface: Box<dyn RawInterface>) -> Arc<Self> {
        let local_mac = iface.local_mac();
        let (outgoing_tx, outgoing_rx) = crossbeam_channel::bounded(QUEUE_CAPACITY);
        let (incoming_tx, incoming_rx) = crossbeam_channel::bounded(QUEUE_CAPACITY);

        let engine = Arc::new(Engine {
            config: Arc::new(config),
            iface: Arc::from(iface),
            local_mac,
            sequence: AtomicU32::new(0),
            outgoing_tx,
            outgoing_rx: Mutex::new(Some(outgoing_rx)),
            incoming_tx,
            incoming_rx: Mutex::new(Some(incoming_rx)),
            neighbors: NeighborTable::new(),
            send_registry: SendRegistry::default(),
            recv_registry: ReceiveRegistry::default(),
            tasks: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
            shutdown: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
        });

        engine.register_task(discovery::DISCOVER_INTERVAL_MS, discovery::broadcast_request);
        engine
    }

    pub fn local_mac(&self) -> MacAddr {
        self.local_mac
    }

    fn register_task<F>(&self, interval_ms: i64, run: F)
    where
        F: Fn(&Engine) + Send + Sync + 'static,
    {
        self.tasks.lock().push(ScheduledTask { interval_ms, last_run: Mutex::new(0), run: Box::new(run) });
    }

    /// Build, sequence, and enqueue an outgoing frame addressed to `dst`.
    /// Discovery frames are left in the clear downstream; everything else
    /// passes through the security envelope before it hits the wire.
    pub fn enqueue_to(&self, dst: MacAddr, message_type: MessageType, payload: Vec<u8>) {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let frame = Frame { dst, src: self.local_mac, ethertype: self.config.ethertype, message_type, sequence, payload };
        if self.outgoing_tx.send(frame).is_err() {
            tracing::warn!("outgoing queue closed, dropping frame");
        }
    }

    /// Publish an event to every subscriber. A subscriber whose queue is full
    /// is dropped rather than allowed to apply backpressure (SPEC_FULL.md §4.9).
    pub fn publish_event(&self, event: Event) {
        let mut subs = self.subscribers.lock();
        let before = subs.len();
        subs.retain(|tx| tx.try_send(event.clone()).is_ok());
        if subs.len() < before {
            tracing::debug!(dropped = before - subs.len(), "disconnected slow event subscriber(s)");
        }
    }

    pub fn subscribe(&self) -> Receiver<Event> {
        let (tx, rx) = crossbeam_channel::bounded(EVENT_CAPACITY);
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn roster(&self) -> Vec<NeighborInfo> {
        self.neighbors
            .snapshot()
            .into_iter()
            .map(|(mac, e)| NeighborInfo { mac: mac.to_string(), alias: e.alias, last_seen_ms: e.last_seen })
            .collect()
    }

    pub fn send_text(&self, dst: MacAddr, body: &str) {
        messaging::send_text(self, dst, body);
    }

    pub fn send_text_all(&self, body: &str, active_since_ms: Option<i64>) {
        messaging::send_text_all(self, body, active_since_ms);
    }

    pub fn file_send(&self, path: &Path, dst: MacAddr, rel_path: Option<String>) -> Result<String, Error> {
        file_send::send_file(self, path, dst, rel_path)
    }

    pub fn folder_send(&self, folder: &Path, dst: MacAddr) -> Result<Vec<String>, Error> {
        file_send::send_folder(self, folder, dst)
    }

    fn dispatch(&self, frame: Frame) {
        match frame.message_type {
            MessageType::DiscoverRequest => discovery::on_request(self, &frame),
            MessageType::DiscoverReply => discovery::on_reply(self, &frame),
            MessageType::AppMessage => messaging::on_message(self, &frame),
            MessageType::Ack => file_send::on_ack(self, &frame),
            MessageType::FileMeta => file_recv::on_meta(self, &frame),
            MessageType::FileData => file_recv::on_data(self, &frame),
            // Either side may have sent this; whichever registry actually
            // owns the file_id handles it; the other is a silent no-op. This
            // plain match is this implementation's handler registry
            // (SPEC_FULL.md §9) — unknown types never reach here, since
            // `Frame::decode` already rejects them.
            MessageType::FileFin => {
                file_send::on_fin(self, &frame);
                file_recv::on_fin(self, &frame);
            }
        }
    }

    /// Spawn the receiver, sender, dispatcher, scheduler, and file-pump
    /// threads. May only be called once per engine.
    pub fn start(self: &Arc<Self>) {
        let outgoing_rx = self.outgoing_rx.lock().take().expect("Engine::start called more than once");
        let incoming_rx = self.incoming_rx.lock().take().expect("Engine::start called more than once");

        let sender_engine = self.clone();
        let sender_iface = self.iface.clone();
        let sender_psk = self.config.psk.clone();
        let sender_handle = thread::Builder::new()
            .name("etherlink-sender".into())
            .spawn(move || sender_loop(&sender_engine, &*sender_iface, &sender_psk, &outgoing_rx))
            .expect("failed to spawn sender thread");

        let receiver_engine = self.clone();
        let receiver_iface = self.iface.clone();
        let receiver_psk = self.config.psk.clone();
        let incoming_tx = self.incoming_tx.clone();
        let receiver_handle = thread::Builder::new()
            .name("etherlink-receiver".into())
            .spawn(move || receiver_loop(&receiver_engine, &*receiver_iface, &receiver_psk, &incoming_tx))
            .expect("failed to spawn receiver thread");

        let dispatcher_engine = self.clone();
        let dispatcher_handle = thread::Builder::new()
            .name("etherlink-dispatcher".into())
            .spawn(move || dispatcher_loop(&dispatcher_engine, &incoming_rx))
            .expect("failed to spawn dispatcher thread");

        let scheduler_engine = self.clone();
        let scheduler_handle = thread::Builder::new()
            .name("etherlink-scheduler".into())
            .spawn(move || scheduler_loop(&scheduler_engine))
            .expect("failed to spawn scheduler thread");

        let pump_engine = self.clone();
        let pump_handle = thread::Builder::new()
            .name("etherlink-file-pump".into())
            .spawn(move || pump_loop(&pump_engine))
            .expect("failed to spawn file-pump thread");

        let mut handles = self.handles.lock();
        handles.push(sender_handle);
        handles.push(receiver_handle);
        handles.push(dispatcher_handle);
        handles.push(scheduler_handle);
        handles.push(pump_handle);
    }

    /// Signal every worker thread to exit and wait for them to do so.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.iface.close();
        for handle in self.handles.lock().drain(..) {
            let _ = handle.join();
        }
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

fn sender_loop(engine: &Engine, iface: &dyn RawInterface, psk: &[u8], outgoing_rx: &Receiver<Frame>) {
    loop {
        match outgoing_rx.recv_timeout(QUEUE_RECV_TIMEOUT) {
            Ok(frame) => {
                let wire_frame = if frame.message_type.is_discovery() { frame } else { etherlink_crypto::wrap(psk, &frame) };
                let encoded = wire_frame.encode();
                if let Err(e) = iface.send(&encoded) {
                    tracing::warn!(error = %e, "failed to send frame");
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if engine.is_shutting_down() {
                    return;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn receiver_loop(engine: &Engine, iface: &dyn RawInterface, psk: &[u8], incoming_tx: &Sender<Frame>) {
    loop {
        if engine.is_shutting_down() {
            return;
        }
        match iface.recv() {
            Ok(Some(bytes)) => {
                let frame = match Frame::decode(&bytes) {
                    Ok(f) => f,
                    Err(e) => {
                        tracing::debug!(error = %e, "dropping frame that failed to decode");
                        continue;
                    }
                };
                if frame.ethertype != engine.config.ethertype {
                    continue;
                }
                let plain = if frame.message_type.is_discovery() {
                    Some(frame)
                } else {
                    match etherlink_crypto::unwrap(psk, &frame) {
                        Ok(f) => Some(f),
                        Err(e) => {
                            tracing::debug!(error = %e, "dropping frame that failed authentication");
                            None
                        }
                    }
                };
                if let Some(f) = plain {
                    if incoming_tx.send(f).is_err() {
                        return;
                    }
                }
            }
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "raw interface read failed");
                return;
            }
        }
    }
}

fn dispatcher_loop(engine: &Engine, incoming_rx: &Receiver<Frame>) {
    loop {
        match incoming_rx.recv_timeout(QUEUE_RECV_TIMEOUT) {
            Ok(frame) => engine.dispatch(frame),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if engine.is_shutting_down() {
                    return;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn scheduler_loop(engine: &Engine) {
    loop {
        thread::sleep(SCHEDULER_TICK);
        if engine.is_shutting_down() {
            return;
        }
        let now = now_ms();
        for task in engine.tasks.lock().iter() {
            let mut last_run = task.last_run.lock();
            if now - *last_run >= task.interval_ms {
                *last_run = now;
                drop(last_run);
                (task.run)(engine);
            }
        }
    }
}

fn pump_loop(engine: &Engine) {
    loop {
        thread::sleep(PUMP_INTERVAL);
        if engine.is_shutting_down() {
            return;
        }
        file_send::pump(engine);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::LoopbackInterface;

    fn test_config() -> RuntimeConfig {
        RuntimeConfig {
            interface_name: "test0".to_string(),
            ethertype: 0x88b5,
            alias: "tester".to_string(),
            psk: b"shared secret".to_vec(),
            base_dir: std::env::temp_dir(),
            chunk_size: 900,
        }
    }

    #[test]
    fn enqueue_to_builds_an_addressed_sequenced_frame() {
        let (a, _b) = LoopbackInterface::pair(MacAddr([1; 6]), MacAddr([2; 6]));
        let engine = Engine::new(test_config(), Box::new(a));
        let rx = engine.outgoing_rx.lock().take().unwrap();

        let dst = MacAddr([9; 6]);
        engine.enqueue_to(dst, MessageType::AppMessage, b"hi".to_vec());
        engine.enqueue_to(dst, MessageType::AppMessage, b"there".to_vec());

        let first = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(first.dst, dst);
        assert_eq!(first.src, MacAddr([1; 6]));
        assert_eq!(second.sequence, first.sequence + 1);
    }

    #[test]
    fn slow_subscriber_is_dropped_not_backpressured() {
        let (a, _b) = LoopbackInterface::pair(MacAddr([1; 6]), MacAddr([2; 6]));
        let engine = Engine::new(test_config(), Box::new(a));
        let rx = engine.subscribe();
        for _ in 0..(EVENT_CAPACITY + 10) {
            engine.publish_event(Event::Chat { src: "x".to_string(), text: "y".to_string() });
        }
        assert_eq!(engine.subscribers.lock().len(), 0);
        drop(rx);
    }

    #[test]
    fn two_engines_discover_each_other_over_loopback() {
        let (a_link, b_link) = LoopbackInterface::pair(MacAddr([0xaa; 6]), MacAddr([0xbb; 6]));
        let mut cfg_a = test_config();
        cfg_a.alias = "alice".to_string();
        let mut cfg_b = test_config();
        cfg_b.alias = "bob".to_string();

        let engine_a = Engine::new(cfg_a, Box::new(a_link));
        let engine_b = Engine::new(cfg_b, Box::new(b_link));
        engine_a.start();
        engine_b.start();

        engine_a.enqueue_to(MacAddr::BROADCAST, MessageType::DiscoverRequest, b"alias=alice".to_vec());

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while std::time::Instant::now() < deadline {
            if engine_a.roster().iter().any(|n| n.alias == "bob") {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert!(engine_a.roster().iter().any(|n| n.alias == "bob"));

        engine_a.stop();
        engine_b.stop();
    }

    /// SPEC_FULL.md §8 property 8: `send_text_all` enqueues exactly one
    /// APP_MESSAGE per neighbor last seen within the active window, and none
    /// for a neighbor that has gone stale.
    #[test]
    fn send_text_all_enqueues_only_to_active_neighbors() {
        let (a, _b) = LoopbackInterface::pair(MacAddr([1; 6]), MacAddr([2; 6]));
        let engine = Engine::new(test_config(), Box::new(a));
        let rx = engine.outgoing_rx.lock().take().unwrap();

        let now = now_ms();
        let fresh = MacAddr([0xaa; 6]);
        let stale = MacAddr([0xbb; 6]);
        engine.neighbors.observe(fresh, "fresh".to_string(), now - 1_000);
        engine.neighbors.observe(stale, "stale".to_string(), now - 120_000);

        engine.send_text_all("hello", Some(60_000));

        let first = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(first.dst, fresh);
        assert_eq!(first.message_type, MessageType::AppMessage);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err(), "the stale neighbor must not receive a broadcast message");
    }
}
