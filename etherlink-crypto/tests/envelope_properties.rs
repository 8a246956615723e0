/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use etherlink_crypto::{unwrap, wrap};
use etherlink_wire::{Frame, MacAddr, MessageType};
use proptest::prelude::*;

fn mac_strategy() -> impl Strategy<Value = MacAddr> {
    any::<[u8; 6]>().prop_map(MacAddr)
}

fn non_discovery_message_type() -> impl Strategy<Value = MessageType> {
    (2u16..7).prop_map(|v| MessageType::from_u16(v).unwrap())
}

proptest! {
    /// Property 2 (§8): unwrap(wrap(f)) preserves addressing, sequence, message
    /// type, and payload for any PSK.
    #[test]
    fn round_trip(
        dst in mac_strategy(),
        src in mac_strategy(),
        ethertype in any::<u16>(),
        message_type in non_discovery_message_type(),
        sequence in any::<u32>(),
        payload in proptest::collection::vec(any::<u8>(), 0..512),
        psk in proptest::collection::vec(any::<u8>(), 1..64),
    ) {
        let frame = Frame { dst, src, ethertype, message_type, sequence, payload };
        let wrapped = wrap(&psk, &frame);
        let unwrapped = unwrap(&psk, &wrapped).expect("matching psk must unwrap");
        prop_assert_eq!(unwrapped.dst, frame.dst);
        prop_assert_eq!(unwrapped.src, frame.src);
        prop_assert_eq!(unwrapped.ethertype, frame.ethertype);
        prop_assert_eq!(unwrapped.message_type, frame.message_type);
        prop_assert_eq!(unwrapped.sequence, frame.sequence);
        prop_assert_eq!(unwrapped.payload, frame.payload);
    }

    /// Property 2 (§8): wrapping under PSK A can never be unwrapped under PSK B.
    #[test]
    fn cross_psk_fails(
        dst in mac_strategy(),
        src in mac_strategy(),
        ethertype in any::<u16>(),
        message_type in non_discovery_message_type(),
        sequence in any::<u32>(),
        payload in proptest::collection::vec(any::<u8>(), 0..512),
        psk_a in proptest::collection::vec(any::<u8>(), 1..64),
        psk_b in proptest::collection::vec(any::<u8>(), 1..64),
    ) {
        prop_assume!(psk_a != psk_b);
        let frame = Frame { dst, src, ethertype, message_type, sequence, payload };
        let wrapped = wrap(&psk_a, &frame);
        prop_assert!(unwrap(&psk_b, &wrapped).is_err());
    }
}
