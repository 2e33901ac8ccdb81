// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Property-based tests using proptest
//!
//! These tests check the prefix types, the peer set tracker and the covering
//! prefix index against straightforward reference computations.

#[cfg(test)]
mod proptest {
    use crate::bitmap::PeerBitmap;
    use crate::index::RoaIndex;
    use crate::tracker::{PeerSetTracker, TrackerConfig};
    use crate::trie::CoveringPrefixIndex;
    use crate::types::{Prefix, Prefix4, Prefix6, Roa, RpkiStatus};
    use crate::validate::classify;
    use proptest::prelude::*;
    use rv_common::log::discard;
    use std::collections::{BTreeMap, BTreeSet};
    use std::net::{Ipv4Addr, Ipv6Addr};

    // Strategy for generating valid IPv4 prefixes
    fn ipv4_prefix_strategy() -> impl Strategy<Value = Prefix4> {
        (any::<u32>(), 0u8..=32u8).prop_map(|(addr_bits, length)| {
            Prefix4::new(Ipv4Addr::from(addr_bits), length)
        })
    }

    // Strategy for generating valid IPv6 prefixes
    fn ipv6_prefix_strategy() -> impl Strategy<Value = Prefix6> {
        (any::<u128>(), 0u8..=128u8).prop_map(|(addr_bits, length)| {
            Prefix6::new(Ipv6Addr::from(addr_bits), length)
        })
    }

    // IPv4 prefixes squeezed into 10.0.0.0/8 so that generated sets nest.
    fn nested_v4_strategy() -> impl Strategy<Value = Prefix4> {
        (any::<u32>(), 8u8..=24u8).prop_map(|(bits, length)| {
            let addr = (10u32 << 24) | (bits & 0x00ff_ff00);
            Prefix4::new(Ipv4Addr::from(addr), length)
        })
    }

    fn roa_strategy() -> impl Strategy<Value = Roa> {
        (nested_v4_strategy(), 1u32..=4u32, 8u8..=28u8).prop_map(
            |(prefix, asn, max_length)| Roa {
                prefix: Prefix::V4(prefix),
                asn,
                max_length,
                ta: "ripencc".into(),
            },
        )
    }

    /// Classification computed directly from the ROA list.
    fn reference_status(roas: &[Roa], q: &Prefix, origin: u32) -> RpkiStatus {
        let covering: Vec<&Roa> =
            roas.iter().filter(|r| q.within(&r.prefix)).collect();
        if covering.is_empty() {
            return RpkiStatus::Unknown;
        }
        let matching: Vec<&&Roa> =
            covering.iter().filter(|r| r.asn == origin).collect();
        if matching.is_empty() {
            return RpkiStatus::InvalidAsn;
        }
        if matching.iter().any(|r| q.length() <= r.max_length) {
            RpkiStatus::Valid
        } else {
            RpkiStatus::InvalidLength
        }
    }

    proptest! {
        /// Property: IPv4 host bits are always unset after construction
        #[test]
        fn prop_ipv4_host_bits_always_unset(prefix in ipv4_prefix_strategy()) {
            prop_assert!(
                prefix.host_bits_are_unset(),
                "IPv4 prefix {prefix} should have host bits unset"
            );
        }

        /// Property: IPv6 host bits are always unset after construction
        #[test]
        fn prop_ipv6_host_bits_always_unset(prefix in ipv6_prefix_strategy()) {
            prop_assert!(
                prefix.host_bits_are_unset(),
                "IPv6 prefix {prefix} should have host bits unset"
            );
        }

        /// Property: display and parse agree for normalized prefixes
        #[test]
        fn prop_prefix_display_parse(p4 in ipv4_prefix_strategy(), p6 in ipv6_prefix_strategy()) {
            let v4 = Prefix::V4(p4);
            let v6 = Prefix::V6(p6);
            prop_assert_eq!(v4.to_string().parse::<Prefix>().ok(), Some(v4));
            prop_assert_eq!(v6.to_string().parse::<Prefix>().ok(), Some(v6));
        }

        /// Property: Prefix enum V4 is never within V6 and vice versa
        #[test]
        fn prop_prefix_enum_no_cross_family(p4 in ipv4_prefix_strategy(), p6 in ipv6_prefix_strategy()) {
            let v4 = Prefix::V4(p4);
            let v6 = Prefix::V6(p6);

            prop_assert!(!v4.within(&v6), "IPv4 should not be within IPv6");
            prop_assert!(!v6.within(&v4), "IPv6 should not be within IPv4");
        }

        /// Property: a bitmap holds exactly the distinct ids inserted
        #[test]
        fn prop_bitmap_matches_set(ids in proptest::collection::vec(0u32..500, 0..200)) {
            let mut bitmap = PeerBitmap::new(500);
            let mut set = BTreeSet::new();
            for id in &ids {
                prop_assert_eq!(bitmap.insert(*id), set.insert(*id));
            }
            prop_assert_eq!(bitmap.len(), set.len());
            prop_assert_eq!(bitmap.iter().collect::<BTreeSet<_>>(), set);
        }

        /// Property: peer set size is the number of distinct peers added per key
        #[test]
        fn prop_tracker_distinct_peers(
            adds in proptest::collection::vec((0u8..8, 0u8..20), 0..300)
        ) {
            let mut tracker = PeerSetTracker::new(TrackerConfig { max_peers: 20 });
            let mut expected: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
            for (k, p) in &adds {
                let key = format!("key{k}");
                let peer = format!("peer{p}");
                tracker.add_peer(&key, &peer).unwrap();
                expected.entry(key).or_default().insert(peer);
            }
            prop_assert_eq!(tracker.len(), expected.len());
            for (key, peers) in &expected {
                prop_assert_eq!(&tracker.get_peers(key), peers);
            }
            prop_assert!(tracker.get_peers("never-added").is_empty());
        }

        /// Property: registering past capacity fails and loses nothing
        #[test]
        fn prop_tracker_capacity(max_peers in 1usize..64) {
            let mut tracker = PeerSetTracker::new(TrackerConfig { max_peers });
            for i in 0..max_peers {
                tracker.add_peer("k", &format!("p{i}")).unwrap();
            }
            prop_assert!(tracker.add_peer("k", "one-too-many").is_err());
            prop_assert_eq!(tracker.get_peers("k").len(), max_peers);
        }

        /// Property: the trie's covering walk agrees with a linear scan
        #[test]
        fn prop_trie_covering_matches_scan(
            present in proptest::collection::vec(nested_v4_strategy(), 0..40),
            query in nested_v4_strategy(),
        ) {
            let mut trie = CoveringPrefixIndex::<Prefix4>::new();
            for p in &present {
                trie.insert(*p, Roa {
                    prefix: Prefix::V4(*p),
                    asn: 1,
                    max_length: p.length,
                    ta: "lacnic".into(),
                });
            }

            let covering: BTreeSet<Prefix4> =
                present.iter().copied().filter(|p| query.within(p)).collect();
            let longest = covering.iter().max_by_key(|p| p.length).copied();
            prop_assert_eq!(trie.exact_or_ancestor(&query), longest);

            let expected_count = present.iter().filter(|p| query.within(p)).count();
            prop_assert_eq!(trie.candidate_roas(&query).len(), expected_count);

            // parent chain visits every covering prefix exactly once
            let mut chain = BTreeSet::new();
            let mut cur = trie.exact_or_ancestor(&query);
            while let Some(p) = cur {
                prop_assert!(chain.insert(p));
                cur = trie.parent(&p);
            }
            prop_assert_eq!(chain, covering);
        }

        /// Property: classification agrees with the reference and is pure
        #[test]
        fn prop_classify_matches_reference(
            roas in proptest::collection::vec(roa_strategy(), 0..30),
            query in nested_v4_strategy(),
            origin in 1u32..=5u32,
        ) {
            let index = RoaIndex::build(roas.clone(), discard());
            let q = Prefix::V4(query);
            let status = classify(&q, origin, &index);
            prop_assert_eq!(status, reference_status(&roas, &q, origin));
            prop_assert_eq!(status, classify(&q, origin, &index));
        }
    }
}
