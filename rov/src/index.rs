// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The ROA index: one covering prefix trie per address family.

use crate::error::Error;
use crate::log::rov_log;
use crate::trie::CoveringPrefixIndex;
use crate::types::{Prefix, Prefix4, Prefix6, Roa, RoaRecord};
use crate::MOD_INDEX;
use itertools::{Either, Itertools};
use slog::Logger;

/// Outcome of loading raw ROA records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub loaded: u64,
    pub skipped: u64,
}

pub struct RoaIndex {
    v4: CoveringPrefixIndex<Prefix4>,
    v6: CoveringPrefixIndex<Prefix6>,
    log: Logger,
}

impl RoaIndex {
    pub fn new(log: Logger) -> Self {
        Self {
            v4: CoveringPrefixIndex::new(),
            v6: CoveringPrefixIndex::new(),
            log,
        }
    }

    /// Build an index from typed ROAs. The two families are loaded on
    /// separate threads.
    pub fn build(roas: Vec<Roa>, log: Logger) -> Self {
        let (v4, v6): (Vec<(Prefix4, Roa)>, Vec<(Prefix6, Roa)>) =
            roas.into_iter().partition_map(|roa| match roa.prefix {
                Prefix::V4(p) => Either::Left((p, roa)),
                Prefix::V6(p) => Either::Right((p, roa)),
            });

        let (v4, v6) = std::thread::scope(|s| {
            let h6 = s.spawn(move || {
                let mut trie = CoveringPrefixIndex::<Prefix6>::new();
                for (p, roa) in v6 {
                    trie.insert(p, roa);
                }
                trie
            });
            let mut v4_trie = CoveringPrefixIndex::<Prefix4>::new();
            for (p, roa) in v4 {
                v4_trie.insert(p, roa);
            }
            let v6_trie = match h6.join() {
                Ok(trie) => trie,
                Err(e) => std::panic::resume_unwind(e),
            };
            (v4_trie, v6_trie)
        });

        let index = Self { v4, v6, log };
        index.log_sizes();
        index
    }

    /// Convert raw ROA records and build an index from the ones that parse.
    /// Malformed records are logged and counted as skipped.
    pub fn from_records<I>(records: I, log: Logger) -> (Self, LoadStats)
    where
        I: IntoIterator<Item = RoaRecord>,
    {
        let mut stats = LoadStats::default();
        let mut roas = Vec::new();
        for rec in records {
            match rec.to_roa() {
                Ok(roa) => {
                    roas.push(roa);
                    stats.loaded += 1;
                }
                Err(e) => {
                    rov_log!(@log log, MOD_INDEX, warn, "skipping roa: {e}";
                        "prefix" => rec.prefix,
                        "asn" => rec.asn,
                        "ta" => rec.ta
                    );
                    stats.skipped += 1;
                }
            }
        }
        (Self::build(roas, log), stats)
    }

    /// Convert and load raw ROA records. Records with a malformed prefix or
    /// `asn` field are logged and skipped.
    pub fn load_records<I>(&mut self, records: I) -> LoadStats
    where
        I: IntoIterator<Item = RoaRecord>,
    {
        let mut stats = LoadStats::default();
        for rec in records {
            match self.try_load(&rec) {
                Ok(()) => stats.loaded += 1,
                Err(e) => {
                    rov_log!(self, MOD_INDEX, warn, "skipping roa: {e}";
                        "prefix" => rec.prefix,
                        "asn" => rec.asn,
                        "ta" => rec.ta
                    );
                    stats.skipped += 1;
                }
            }
        }
        self.log_sizes();
        stats
    }

    /// Convert and load a single raw record.
    pub fn try_load(&mut self, rec: &RoaRecord) -> Result<(), Error> {
        self.load(rec.to_roa()?);
        Ok(())
    }

    pub fn load(&mut self, roa: Roa) {
        match roa.prefix {
            Prefix::V4(p) => self.v4.insert(p, roa),
            Prefix::V6(p) => self.v6.insert(p, roa),
        }
    }

    fn log_sizes(&self) {
        rov_log!(self, MOD_INDEX, info, "roa index built";
            "v4_prefixes" => self.v4.len(),
            "v6_prefixes" => self.v6.len(),
            "roas" => self.roa_count()
        );
    }

    pub fn v4(&self) -> &CoveringPrefixIndex<Prefix4> {
        &self.v4
    }

    pub fn v6(&self) -> &CoveringPrefixIndex<Prefix6> {
        &self.v6
    }

    pub fn candidate_roas(&self, query: &Prefix) -> Vec<&Roa> {
        match query {
            Prefix::V4(p) => self.v4.candidate_roas(p),
            Prefix::V6(p) => self.v6.candidate_roas(p),
        }
    }

    pub fn exact_or_ancestor(&self, query: &Prefix) -> Option<Prefix> {
        match query {
            Prefix::V4(p) => self.v4.exact_or_ancestor(p).map(Prefix::V4),
            Prefix::V6(p) => self.v6.exact_or_ancestor(p).map(Prefix::V6),
        }
    }

    pub fn parent(&self, prefix: &Prefix) -> Option<Prefix> {
        match prefix {
            Prefix::V4(p) => self.v4.parent(p).map(Prefix::V4),
            Prefix::V6(p) => self.v6.parent(p).map(Prefix::V6),
        }
    }

    pub fn get(&self, prefix: &Prefix) -> Option<&[Roa]> {
        match prefix {
            Prefix::V4(p) => self.v4.get(p),
            Prefix::V6(p) => self.v6.get(p),
        }
    }

    /// Number of distinct prefixes across both families.
    pub fn len(&self) -> usize {
        self.v4.len() + self.v6.len()
    }

    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }

    pub fn roa_count(&self) -> usize {
        self.v4.roa_count() + self.v6.roa_count()
    }
}

impl Extend<Roa> for RoaIndex {
    fn extend<T: IntoIterator<Item = Roa>>(&mut self, iter: T) {
        for roa in iter {
            self.load(roa);
        }
    }
}
