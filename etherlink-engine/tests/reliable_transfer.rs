/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! SPEC_FULL.md §8 property 5: a transfer completes with a byte-identical,
//! hash-verified result even when the underlying link drops individual
//! frames, as long as the loss rate stays within what `max_retries` can
//! absorb. Exercised end to end with two real engines talking over an
//! in-memory link that drops every Nth frame in either direction.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use proptest::prelude::*;

use etherlink_engine::config::RuntimeConfig;
use etherlink_engine::raw::{LoopbackInterface, RawInterface};
use etherlink_engine::{Engine, Error, Event};
use etherlink_wire::MacAddr;

/// Wraps a [`LoopbackInterface`] and silently drops every `drop_every`-th
/// frame handed to `send`, standing in for a lossy physical link.
struct LossyLink {
    inner: LoopbackInterface,
    counter: AtomicU64,
    drop_every: u64,
}

impl RawInterface for LossyLink {
    fn local_mac(&self) -> MacAddr {
        self.inner.local_mac()
    }

    fn send(&self, frame: &[u8]) -> Result<(), Error> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        if self.drop_every != 0 && n % self.drop_every == 0 {
            return Ok(());
        }
        self.inner.send(frame)
    }

    fn recv(&self) -> Result<Option<Vec<u8>>, Error> {
        self.inner.recv()
    }

    fn close(&self) {
        self.inner.close()
    }
}

static CASE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn unique_dir(tag: &str) -> std::path::PathBuf {
    let n = CASE_COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!("etherlink-reliable-{}-{}-{}", tag, std::process::id(), n))
}

fn test_config(alias: &str, base_dir: std::path::PathBuf) -> RuntimeConfig {
    RuntimeConfig {
        interface_name: "test0".to_string(),
        ethertype: 0x88b5,
        alias: alias.to_string(),
        psk: b"shared secret".to_vec(),
        base_dir,
        chunk_size: 16,
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 6, .. ProptestConfig::default() })]

    #[test]
    fn reliable_transfer_survives_dropped_frames(drop_every in 3u64..8, payload_len in 40usize..400) {
        let payload: Vec<u8> = (0..payload_len).map(|i| (i % 251) as u8).collect();

        let src_dir = unique_dir("src");
        std::fs::create_dir_all(&src_dir).unwrap();
        let src_path = src_dir.join("payload.bin");
        std::fs::write(&src_path, &payload).unwrap();

        let dst_dir = unique_dir("dst");
        std::fs::create_dir_all(&dst_dir).unwrap();

        let (link_a, link_b) = LoopbackInterface::pair(MacAddr([0x10; 6]), MacAddr([0x20; 6]));
        let lossy_a = LossyLink { inner: link_a, counter: AtomicU64::new(0), drop_every };
        let lossy_b = LossyLink { inner: link_b, counter: AtomicU64::new(0), drop_every };

        let engine_a = Engine::new(test_config("a", src_dir.clone()), Box::new(lossy_a));
        let engine_b = Engine::new(test_config("b", dst_dir.clone()), Box::new(lossy_b));
        let b_events = engine_b.subscribe();
        engine_a.start();
        engine_b.start();

        engine_a.file_send(&src_path, engine_b.local_mac(), None).unwrap();

        let deadline = Instant::now() + Duration::from_secs(20);
        let mut finished = false;
        while Instant::now() < deadline {
            match b_events.recv_timeout(Duration::from_millis(100)) {
                Ok(Event::FileRxFinished { status, .. }) => {
                    prop_assert_eq!(status, "ok");
                    finished = true;
                    break;
                }
                Ok(Event::FileRxError { error, .. }) => {
                    prop_assert!(false, "receiver reported an error: {}", error);
                }
                _ => {}
            }
        }
        prop_assert!(finished, "transfer did not complete within the deadline");

        let received = std::fs::read(dst_dir.join("payload.bin")).unwrap();
        prop_assert_eq!(received, payload);

        engine_a.stop();
        engine_b.stop();
        let _ = std::fs::remove_dir_all(&src_dir);
        let _ = std::fs::remove_dir_all(&dst_dir);
    }
}
