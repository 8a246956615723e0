/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

/// The closed set of message types carried in the protocol header.
///
/// New values require a source change; the wire format does not support
/// forward-compatible extension.
#[repr(u16)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MessageType {
    DiscoverRequest = 0,
    DiscoverReply = 1,
    AppMessage = 2,
    Ack = 3,
    FileMeta = 4,
    FileData = 5,
    FileFin = 6,
}

impl MessageType {
    #[inline(always)]
    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0 => Some(Self::DiscoverRequest),
            1 => Some(Self::DiscoverReply),
            2 => Some(Self::AppMessage),
            3 => Some(Self::Ack),
            4 => Some(Self::FileMeta),
            5 => Some(Self::FileData),
            6 => Some(Self::FileFin),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Discovery frames bypass the security envelope (§4.3).
    #[inline(always)]
    pub fn is_discovery(&self) -> bool {
        matches!(self, Self::DiscoverRequest | Self::DiscoverReply)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::DiscoverRequest => "DISCOVER_REQUEST",
            Self::DiscoverReply => "DISCOVER_REPLY",
            Self::AppMessage => "APP_MESSAGE",
            Self::Ack => "ACK",
            Self::FileMeta => "FILE_META",
            Self::FileData => "FILE_DATA",
            Self::FileFin => "FILE_FIN",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_u16() {
        for v in 0..7u16 {
            let mt = MessageType::from_u16(v).unwrap();
            assert_eq!(mt.as_u16(), v);
        }
        assert!(MessageType::from_u16(7).is_none());
    }

    #[test]
    fn only_discovery_bypasses_envelope() {
        assert!(MessageType::DiscoverRequest.is_discovery());
        assert!(MessageType::DiscoverReply.is_discovery());
        assert!(!MessageType::AppMessage.is_discovery());
        assert!(!MessageType::FileData.is_discovery());
    }
}
