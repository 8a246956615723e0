/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::error::Error;
use crate::mac::MacAddr;
use crate::message_type::MessageType;

/// `dst(6) + src(6) + ethertype(2)`.
pub const ETH_HEADER_LEN: usize = 14;

/// `message_type(2) + sequence(4) + payload_length(4) + crc32(4)`.
pub const PROTO_HEADER_LEN: usize = 14;

pub const MIN_FRAME_LEN: usize = ETH_HEADER_LEN + PROTO_HEADER_LEN;

/// Frames larger than this are never produced and never accepted.
pub const MAX_FRAME_LEN: usize = 65535;

/// A decoded Ethernet frame carrying the protocol header and payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub ethertype: u16,
    pub message_type: MessageType,
    pub sequence: u32,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Pack `eth_header || header_with_checksum || payload`.
    ///
    /// The checksum covers the protocol header without its own checksum
    /// field concatenated with the payload, never the Ethernet header.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(MIN_FRAME_LEN + self.payload.len());

        out.extend_from_slice(self.dst.as_bytes());
        out.extend_from_slice(self.src.as_bytes());
        out.extend_from_slice(&self.ethertype.to_be_bytes());

        let header_without_checksum_start = out.len();
        out.extend_from_slice(&self.message_type.as_u16().to_be_bytes());
        out.extend_from_slice(&self.sequence.to_be_bytes());
        out.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&out[header_without_checksum_start..]);
        hasher.update(&self.payload);
        let crc = hasher.finalize();
        out.extend_from_slice(&crc.to_be_bytes());

        out.extend_from_slice(&self.payload);
        out
    }

    /// Inverse of [`Frame::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < MIN_FRAME_LEN {
            return Err(Error::Truncated);
        }

        let dst = MacAddr::from_bytes(&bytes[0..6]).unwrap();
        let src = MacAddr::from_bytes(&bytes[6..12]).unwrap();
        let ethertype = u16::from_be_bytes([bytes[12], bytes[13]]);

        let header_without_checksum = &bytes[14..24];
        let message_type_raw = u16::from_be_bytes([bytes[14], bytes[15]]);
        let sequence = u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
        let payload_length = u32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]) as usize;
        let crc_received = u32::from_be_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]);

        if MIN_FRAME_LEN + payload_length > bytes.len() {
            return Err(Error::Truncated);
        }
        let payload = &bytes[MIN_FRAME_LEN..MIN_FRAME_LEN + payload_length];

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(header_without_checksum);
        hasher.update(payload);
        if hasher.finalize() != crc_received {
            return Err(Error::BadChecksum);
        }

        let message_type = MessageType::from_u16(message_type_raw).ok_or(Error::UnknownMessageType(message_type_raw))?;

        Ok(Self { dst, src, ethertype, message_type, sequence, payload: payload.to_vec() })
    }
}
