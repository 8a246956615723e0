/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Ethernet-level frame codec: the wire format shared by every node.
//!
//! A frame is an Ethernet header (destination, source, EtherType) followed by
//! a fixed protocol header (message type, sequence, payload length, CRC-32)
//! and the payload itself. [`Frame::encode`] / [`Frame::decode`] are exact
//! inverses for any frame that round-trips without bit corruption.

mod error;
mod frame;
mod mac;
mod message_type;

pub use error::Error;
pub use frame::{Frame, ETH_HEADER_LEN, MAX_FRAME_LEN, MIN_FRAME_LEN, PROTO_HEADER_LEN};
pub use mac::MacAddr;
pub use message_type::MessageType;
