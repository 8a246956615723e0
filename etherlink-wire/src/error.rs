/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

/// Errors produced while decoding a wire-format frame.
pub enum Error {
    /// Fewer bytes than the minimum header size, or the declared payload
    /// length runs past the end of the buffer.
    Truncated,

    /// Recomputed CRC-32 did not match the one carried in the header.
    BadChecksum,

    /// `message_type` is not one of the closed set of known values.
    UnknownMessageType(u16),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated => f.write_str("Truncated"),
            Self::BadChecksum => f.write_str("BadChecksum"),
            Self::UnknownMessageType(v) => f.write_str(format!("UnknownMessageType({})", v).as_str()),
        }
    }
}

impl std::error::Error for Error {}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}
