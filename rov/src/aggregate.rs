// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per peer status aggregation.
//!
//! Triples are parsed and merged on their normalized (prefix, origin) pair
//! before anything is counted, so each peer receives exactly one count per
//! distinct pair it observed, however many raw observations or textual
//! spellings of that pair there were. Classification of the distinct pairs
//! is the only parallel step.

use crate::log::rov_log;
use crate::types::{parse_origin, Prefix, RpkiStatus, StatusCounts, Triple};
use crate::validate::Classify;
use crate::MOD_AGGREGATE;
use rv_common::PROGRESS_INTERVAL;
use slog::Logger;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateStats {
    /// Triples handed to the aggregator.
    pub triples: u64,
    /// Triples dropped for a malformed prefix or origin.
    pub skipped: u64,
    /// Distinct (prefix, origin) pairs classified.
    pub pairs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregate {
    /// Per peer counts of distinct pairs.
    pub counts: BTreeMap<String, StatusCounts>,
    /// Counts of distinct pairs, regardless of how many peers saw them.
    pub totals: StatusCounts,
    pub stats: AggregateStats,
}

impl Aggregate {
    /// Rows of peer and counters in report order, sorted by peer.
    pub fn rows(&self) -> impl Iterator<Item = (&str, [u64; 8])> + '_ {
        self.counts.iter().map(|(peer, c)| (peer.as_str(), c.row()))
    }
}

pub struct StatusAggregator {
    workers: usize,
    log: Logger,
}

type Pair = (Prefix, u32);

impl StatusAggregator {
    pub fn new(log: Logger) -> Self {
        Self { workers: 1, log }
    }

    /// Classify distinct pairs on `workers` threads. Zero is treated as one.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn aggregate<I, V>(&self, triples: I, validator: &V) -> Aggregate
    where
        I: IntoIterator<Item = Triple>,
        V: Classify + Sync,
    {
        let mut stats = AggregateStats::default();
        let merged = self.merge(triples, &mut stats);
        stats.pairs = merged.len() as u64;

        let statuses = self.classify_all(&merged, validator);

        let mut counts: BTreeMap<String, StatusCounts> = BTreeMap::new();
        let mut totals = StatusCounts::default();
        for (((prefix, _origin), peers), status) in
            merged.into_iter().zip(statuses)
        {
            let family = prefix.family();
            totals.increment(family, status);
            for peer in peers {
                counts.entry(peer).or_default().increment(family, status);
            }
        }

        rov_log!(self, MOD_AGGREGATE, info, "assigned rpki status";
            "triples" => stats.triples,
            "pairs" => stats.pairs,
            "skipped" => stats.skipped,
            "peers" => counts.len()
        );

        Aggregate {
            counts,
            totals,
            stats,
        }
    }

    fn merge<I>(
        &self,
        triples: I,
        stats: &mut AggregateStats,
    ) -> Vec<(Pair, BTreeSet<String>)>
    where
        I: IntoIterator<Item = Triple>,
    {
        let mut merged: HashMap<Pair, BTreeSet<String>> = HashMap::new();
        for t in triples {
            stats.triples += 1;
            if stats.triples % PROGRESS_INTERVAL == 0 {
                rov_log!(self, MOD_AGGREGATE, info, "processed {} triples",
                    stats.triples);
            }

            let parsed = t.prefix.parse::<Prefix>().and_then(|prefix| {
                parse_origin(&t.origin).map(|origin| (prefix, origin))
            });
            match parsed {
                Ok(pair) => merged.entry(pair).or_default().extend(t.peers),
                Err(e) => {
                    rov_log!(self, MOD_AGGREGATE, warn, "skipping triple: {e}";
                        "prefix" => t.prefix,
                        "origin" => t.origin
                    );
                    stats.skipped += 1;
                }
            }
        }
        merged.into_iter().collect()
    }

    fn classify_all<V>(
        &self,
        pairs: &[(Pair, BTreeSet<String>)],
        validator: &V,
    ) -> Vec<RpkiStatus>
    where
        V: Classify + Sync,
    {
        let classify = |chunk: &[(Pair, BTreeSet<String>)]| -> Vec<RpkiStatus> {
            chunk
                .iter()
                .map(|((prefix, origin), _)| validator.classify(prefix, *origin))
                .collect()
        };

        if self.workers <= 1 || pairs.len() < 2 {
            return classify(pairs);
        }

        let chunk_size = pairs.len().div_ceil(self.workers);
        std::thread::scope(|s| {
            let handles: Vec<_> = pairs
                .chunks(chunk_size)
                .map(|chunk| s.spawn(move || classify(chunk)))
                .collect();

            let mut statuses = Vec::with_capacity(pairs.len());
            for h in handles {
                match h.join() {
                    Ok(part) => statuses.extend(part),
                    Err(e) => std::panic::resume_unwind(e),
                }
            }
            statuses
        })
    }
}

#[cfg(test)]
mod test {
    use super::StatusAggregator;
    use crate::index::RoaIndex;
    use crate::tracker::PeerSetTracker;
    use crate::types::{
        AddressFamily, Prefix, PrefixOriginKey, Roa, RpkiStatus, Triple,
    };
    use crate::validate::{Classify, RouteValidator};
    use pretty_assertions::assert_eq;
    use rv_common::cidr;
    use rv_common::log::discard;

    fn triple(prefix: &str, origin: &str, peers: &[&str]) -> Triple {
        Triple {
            prefix: prefix.into(),
            origin: origin.into(),
            peers: peers.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn index(roas: &[(&str, u32, u8)]) -> RoaIndex {
        RoaIndex::build(
            roas.iter()
                .map(|(p, asn, max_length)| Roa {
                    prefix: cidr!(*p),
                    asn: *asn,
                    max_length: *max_length,
                    ta: "arin".into(),
                })
                .collect(),
            discard(),
        )
    }

    /// Classifies everything as one fixed status.
    struct Always(RpkiStatus);

    impl Classify for Always {
        fn classify(&self, _prefix: &Prefix, _origin: u32) -> RpkiStatus {
            self.0
        }
    }

    #[test]
    fn duplicate_observations_count_once() {
        let mut tracker = PeerSetTracker::default();
        let key = PrefixOriginKey::new("192.0.2.0/24", "1").to_string();
        for peer in ["P1", "P2", "P1", "P3"] {
            tracker.add_peer(&key, peer).unwrap();
        }

        let idx = index(&[("192.0.2.0/24", 1, 24)]);
        let agg = StatusAggregator::new(discard())
            .aggregate(tracker.triples(), &RouteValidator::new(&idx));

        assert_eq!(agg.counts.len(), 3);
        for peer in ["P1", "P2", "P3"] {
            assert_eq!(agg.counts[peer].row(), [1, 0, 0, 0, 0, 0, 0, 0]);
        }
        assert_eq!(agg.stats.pairs, 1);
        assert_eq!(agg.stats.skipped, 0);
    }

    #[test]
    fn families_and_statuses_are_bucketed() {
        let idx = index(&[
            ("10.0.0.0/8", 100, 16),
            ("2001:db8::/32", 100, 48),
        ]);
        let triples = vec![
            triple("10.0.0.0/16", "100", &["A", "B"]),
            triple("10.0.0.0/24", "100", &["A"]),
            triple("10.0.0.0/16", "200", &["A"]),
            triple("11.0.0.0/16", "100", &["B"]),
            triple("2001:db8::/48", "100", &["A"]),
            triple("2001:db8::/64", "100", &["B"]),
            triple("2001:db8::/48", "300", &["B"]),
            triple("2001:db9::/48", "100", &["A", "B"]),
        ];
        let agg = StatusAggregator::new(discard())
            .aggregate(triples, &RouteValidator::new(&idx));

        assert_eq!(agg.counts["A"].row(), [1, 1, 1, 0, 1, 0, 0, 1]);
        assert_eq!(agg.counts["B"].row(), [1, 0, 0, 1, 0, 1, 1, 1]);
        assert_eq!(agg.totals.row(), [1, 1, 1, 1, 1, 1, 1, 1]);
        assert_eq!(agg.stats.triples, 8);
        assert_eq!(agg.stats.pairs, 8);

        let rows: Vec<_> = agg.rows().map(|(peer, _)| peer).collect();
        assert_eq!(rows, vec!["A", "B"]);
    }

    #[test]
    fn malformed_triples_are_skipped() {
        let triples = vec![
            triple("10.0.0.0/8", "100", &["A"]),
            triple("2402:8100::/32", "{36040,38266,45271}", &["A"]),
            triple("10.0.0.0/8", "", &["A"]),
            triple("10.0.0.0/99", "100", &["A"]),
        ];
        let agg = StatusAggregator::new(discard())
            .aggregate(triples, &Always(RpkiStatus::Unknown));
        assert_eq!(agg.stats.skipped, 3);
        assert_eq!(agg.stats.pairs, 1);
        assert_eq!(
            agg.counts["A"].get(AddressFamily::Ipv4, RpkiStatus::Unknown),
            1
        );
        assert_eq!(agg.counts["A"].total(), 1);
    }

    #[test]
    fn equivalent_spellings_merge() {
        // Same pair written with host bits set and split across triples.
        let triples = vec![
            triple("10.0.0.0/8", "100", &["A", "B"]),
            triple("10.1.2.3/8", "100", &["A", "C"]),
        ];
        let agg = StatusAggregator::new(discard())
            .aggregate(triples, &Always(RpkiStatus::Valid));
        assert_eq!(agg.stats.pairs, 1);
        for peer in ["A", "B", "C"] {
            assert_eq!(agg.counts[peer].total(), 1);
        }
    }

    #[test]
    fn parallel_matches_sequential() {
        let idx = index(&[
            ("10.0.0.0/8", 100, 20),
            ("10.64.0.0/10", 200, 24),
            ("2001:db8::/32", 300, 48),
        ]);
        let mut triples = Vec::new();
        for i in 0..200u32 {
            let prefix = format!("10.{}.0.0/{}", i % 128, 16 + (i % 9));
            let peers = [format!("P{}", i % 7), format!("P{}", i % 5)];
            let peers: Vec<&str> = peers.iter().map(String::as_str).collect();
            triples.push(triple(&prefix, &(100 + (i % 3) * 100).to_string(), &peers));
            let prefix6 = format!("2001:db8:{:x}::/{}", i, 40 + (i % 16));
            triples.push(triple(&prefix6, "300", &peers));
        }

        let v = RouteValidator::new(&idx);
        let seq = StatusAggregator::new(discard()).aggregate(triples.clone(), &v);
        let par = StatusAggregator::new(discard())
            .with_workers(4)
            .aggregate(triples, &v);
        assert_eq!(seq, par);
        assert!(seq.stats.pairs > 0);
    }
}
