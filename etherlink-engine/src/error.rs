/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;

/// Closed error taxonomy for the engine crate boundary (SPEC_FULL.md §1b/§7).
pub enum Error {
    PermissionDenied,
    InterfaceUnavailable(String),

    BadMetaMissing(&'static str),
    BadMetaNonNumeric(&'static str),
    BadMetaEmptyStr(&'static str),
    BadMetaRanges(&'static str),
    PathOutsideBase,
    BadPayload,
    HashMismatch,
    MetaTimeout,
    Timeout,

    Codec(etherlink_wire::Error),
    Crypto(etherlink_crypto::Error),
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PermissionDenied => f.write_str("PermissionDenied"),
            Self::InterfaceUnavailable(name) => f.write_str(format!("InterfaceUnavailable({})", name).as_str()),
            Self::BadMetaMissing(k) => f.write_str(format!("BadMetaMissing({})", k).as_str()),
            Self::BadMetaNonNumeric(k) => f.write_str(format!("BadMetaNonNumeric({})", k).as_str()),
            Self::BadMetaEmptyStr(k) => f.write_str(format!("BadMetaEmptyStr({})", k).as_str()),
            Self::BadMetaRanges(k) => f.write_str(format!("BadMetaRanges({})", k).as_str()),
            Self::PathOutsideBase => f.write_str("PathOutsideBase"),
            Self::BadPayload => f.write_str("BadPayload"),
            Self::HashMismatch => f.write_str("HashMismatch"),
            Self::MetaTimeout => f.write_str("MetaTimeout"),
            Self::Timeout => f.write_str("Timeout"),
            Self::Codec(e) => f.write_str(format!("Codec({})", e).as_str()),
            Self::Crypto(e) => f.write_str(format!("Crypto({})", e).as_str()),
            Self::Io(e) => f.write_str(format!("Io({})", e).as_str()),
        }
    }
}

impl std::error::Error for Error {}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<etherlink_wire::Error> for Error {
    fn from(e: etherlink_wire::Error) -> Self {
        Self::Codec(e)
    }
}

impl From<etherlink_crypto::Error> for Error {
    fn from(e: etherlink_crypto::Error) -> Self {
        Self::Crypto(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Stable error-code strings used on the wire (FILE_FIN `reason`) and in
/// command/event JSON (`error`) — matching the taxonomy names in SPEC_FULL.md §7.
impl Error {
    pub fn wire_code(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "permission_denied",
            Self::InterfaceUnavailable(_) => "interface_unavailable",
            Self::BadMetaMissing(_) => "bad_meta_missing",
            Self::BadMetaNonNumeric(_) => "bad_meta_non_numeric",
            Self::BadMetaEmptyStr(_) => "bad_meta_empty_str",
            Self::BadMetaRanges(_) => "bad_meta_ranges",
            Self::PathOutsideBase => "path_outside_base",
            Self::BadPayload => "bad_payload",
            Self::HashMismatch => "hash_mismatch",
            Self::MetaTimeout => "meta_timeout",
            Self::Timeout => "timeout",
            Self::Codec(_) => "bad_payload",
            Self::Crypto(_) => "auth_failure",
            Self::Io(_) => "io_error",
        }
    }
}
