/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Per-frame authenticated encryption derived from a pre-shared key.
//!
//! Subkeys are derived fresh per frame with HKDF-SHA256, salted by a random
//! nonce carried in the payload; confidentiality comes from an HMAC-SHA256
//! keystream, integrity from a truncated HMAC-SHA256 tag over the
//! associated data, nonce, and ciphertext. Discovery frames never pass
//! through here.

mod envelope;
mod error;

pub use envelope::{unwrap, wrap, MIN_WRAPPED_LEN, NONCE_LEN, TAG_LEN, VERSION};
pub use error::Error;
