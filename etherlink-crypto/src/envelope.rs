/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use etherlink_wire::Frame;

use crate::error::Error;

pub const VERSION: u8 = 1;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const MIN_WRAPPED_LEN: usize = 1 + NONCE_LEN + TAG_LEN;

type HmacSha256 = Hmac<Sha256>;

/// `src_mac | dst_mac | ethertype | message_type | sequence`, joined with `|`.
///
/// The exact textual rendering (lowercase colon-hex MACs, decimal integers)
/// is this implementation's own choice — see SPEC_FULL.md §4.3 — and only
/// needs to be identical between [`wrap`] and [`unwrap`].
fn build_aad(frame: &Frame) -> Vec<u8> {
    format!(
        "{}|{}|{}|{}|{}",
        frame.src,
        frame.dst,
        frame.ethertype,
        frame.message_type.as_u16(),
        frame.sequence
    )
    .into_bytes()
}

fn derive_subkeys(psk: &[u8], nonce: &[u8; NONCE_LEN]) -> ([u8; 32], [u8; 32]) {
    let hk = Hkdf::<Sha256>::new(Some(nonce), psk);
    let mut enc_key = [0u8; 32];
    let mut mac_key = [0u8; 32];
    hk.expand(b"enc", &mut enc_key).expect("32 bytes is a valid HKDF-SHA256 output length");
    hk.expand(b"mac", &mut mac_key).expect("32 bytes is a valid HKDF-SHA256 output length");
    (enc_key, mac_key)
}

/// Keystream via iterated HMAC-SHA256(key, nonce || BE32 counter), counter starting at 0.
fn keystream(key: &[u8; 32], nonce: &[u8; NONCE_LEN], len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len + 32);
    let mut counter: u32 = 0;
    while out.len() < len {
        let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
        mac.update(nonce);
        mac.update(&counter.to_be_bytes());
        out.extend_from_slice(&mac.finalize().into_bytes());
        counter = counter.wrapping_add(1);
    }
    out.truncate(len);
    out
}

fn xor_into(data: &[u8], stream: &[u8]) -> Vec<u8> {
    data.iter().zip(stream.iter()).map(|(a, b)| a ^ b).collect()
}

fn compute_tag(mac_key: &[u8; 32], aad: &[u8], nonce: &[u8; NONCE_LEN], ciphertext: &[u8]) -> [u8; TAG_LEN] {
    let mut mac = HmacSha256::new_from_slice(mac_key).expect("HMAC accepts keys of any length");
    mac.update(aad);
    mac.update(nonce);
    mac.update(ciphertext);
    let full = mac.finalize().into_bytes();
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&full[..TAG_LEN]);
    tag
}

/// Wrap a non-discovery frame's payload in the per-frame envelope (SPEC_FULL.md §4.3).
///
/// Callers are responsible for never calling this on discovery frames; the
/// envelope itself has no notion of which types are exempt.
pub fn wrap(psk: &[u8], frame: &Frame) -> Frame {
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let (enc_key, mac_key) = derive_subkeys(psk, &nonce);
    let aad = build_aad(frame);

    let stream = keystream(&enc_key, &nonce, frame.payload.len());
    let ciphertext = xor_into(&frame.payload, &stream);
    let tag = compute_tag(&mac_key, &aad, &nonce, &ciphertext);

    let mut payload = Vec::with_capacity(MIN_WRAPPED_LEN + ciphertext.len());
    payload.push(VERSION);
    payload.extend_from_slice(&nonce);
    payload.extend_from_slice(&ciphertext);
    payload.extend_from_slice(&tag);

    Frame { payload, ..frame.clone() }
}

/// Unwrap a protected frame, returning a new frame whose payload is the
/// recovered plaintext. Rejects with [`Error::AuthFailure`] on a version
/// mismatch, a too-short payload, or a failed tag check.
pub fn unwrap(psk: &[u8], frame: &Frame) -> Result<Frame, Error> {
    let payload = &frame.payload;
    if payload.len() < MIN_WRAPPED_LEN || payload[0] != VERSION {
        return Err(Error::AuthFailure);
    }

    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&payload[1..1 + NONCE_LEN]);

    let body = &payload[1 + NONCE_LEN..];
    let (ciphertext, tag) = body.split_at(body.len() - TAG_LEN);

    let (enc_key, mac_key) = derive_subkeys(psk, &nonce);
    let aad = build_aad(frame);

    let mut mac = HmacSha256::new_from_slice(&mac_key).expect("HMAC accepts keys of any length");
    mac.update(&aad);
    mac.update(&nonce);
    mac.update(ciphertext);
    mac.verify_slice(tag).map_err(|_| Error::AuthFailure)?;

    let stream = keystream(&enc_key, &nonce, ciphertext.len());
    let plaintext = xor_into(ciphertext, &stream);

    Ok(Frame { payload: plaintext, ..frame.clone() })
}
