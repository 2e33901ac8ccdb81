// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Route records to prefix-origin peer sets.

use crate::io::{self, ElemType, RouteRecord};
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use itertools::Itertools;
use rov::{
    filter::parse_bogons, AnnouncementFilter, FilterConfig, PeerSetTracker,
    Prefix, PrefixOriginKey, TrackerConfig, Triple,
};
use rv_common::PROGRESS_INTERVAL;
use slog::{debug, info, warn, Logger};
use std::path::{Path, PathBuf};

/// How observations are attributed to peers in the report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum PeerGrouping {
    /// One peer per BGP session, `<asn>:<collector>`.
    #[default]
    Session,
    /// One peer per AS, regardless of which collector saw it.
    Asn,
}

impl PeerGrouping {
    pub fn peer(self, session: &str) -> &str {
        match self {
            Self::Session => session,
            Self::Asn => session.split(':').next().unwrap_or(session),
        }
    }
}

#[derive(Args, Debug)]
pub struct TrackerArgs {
    /// Maximum number of distinct peers.
    #[arg(long, env = "ROVSTAT_MAX_PEERS", default_value_t = rov::DEFAULT_MAX_PEERS)]
    pub max_peers: usize,

    /// Drop observations from peers beyond --max-peers instead of failing.
    #[arg(long)]
    pub drop_over_capacity: bool,
}

#[derive(Args, Debug)]
pub struct FilterArgs {
    /// File of bogon prefixes, one per line.
    #[arg(long)]
    pub bogons: Option<PathBuf>,

    #[arg(long, default_value_t = 8)]
    pub v4_min_len: u8,

    #[arg(long, default_value_t = 24)]
    pub v4_max_len: u8,

    #[arg(long, default_value_t = 8)]
    pub v6_min_len: u8,

    #[arg(long, default_value_t = 64)]
    pub v6_max_len: u8,
}

impl FilterArgs {
    pub fn build(&self) -> Result<AnnouncementFilter> {
        let bogons = match &self.bogons {
            Some(path) => {
                let text = std::fs::read_to_string(path).with_context(|| {
                    format!("read bogons {}", path.display())
                })?;
                parse_bogons(&text)
                    .with_context(|| format!("parse bogons {}", path.display()))?
            }
            None => Vec::new(),
        };
        let config = FilterConfig {
            v4_lengths: self.v4_min_len..=self.v4_max_len,
            v6_lengths: self.v6_min_len..=self.v6_max_len,
        };
        Ok(AnnouncementFilter::new(config, bogons))
    }
}

#[derive(Args, Debug)]
pub struct CollectOpts {
    /// Route record files, one JSON object per line.
    #[arg(required = true)]
    pub records: Vec<PathBuf>,

    #[command(flatten)]
    pub tracker: TrackerArgs,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Peer attribution.
    #[arg(long, value_enum, default_value_t = PeerGrouping::Session)]
    pub group_by: PeerGrouping,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectStats {
    pub records: u64,
    pub accepted: u64,
    /// Withdrawals and records without an AS path.
    pub ignored: u64,
    pub malformed: u64,
    pub filtered: u64,
    pub over_capacity: u64,
}

impl CollectStats {
    fn merge(&mut self, other: &CollectStats) {
        self.records += other.records;
        self.accepted += other.accepted;
        self.ignored += other.ignored;
        self.malformed += other.malformed;
        self.filtered += other.filtered;
        self.over_capacity += other.over_capacity;
    }
}

/// Folds route records into a peer set tracker.
pub struct Collector<'a> {
    filter: &'a AnnouncementFilter,
    tracker: PeerSetTracker,
    drop_over_capacity: bool,
    stats: CollectStats,
    log: Logger,
}

impl<'a> Collector<'a> {
    pub fn new(
        filter: &'a AnnouncementFilter,
        config: TrackerConfig,
        drop_over_capacity: bool,
        log: Logger,
    ) -> Self {
        Self {
            filter,
            tracker: PeerSetTracker::new(config),
            drop_over_capacity,
            stats: CollectStats::default(),
            log,
        }
    }

    pub fn observe(&mut self, rec: &RouteRecord) -> Result<()> {
        self.stats.records += 1;
        if self.stats.records % PROGRESS_INTERVAL == 0 {
            info!(self.log, "processed {} records", self.stats.records;
                "keys" => self.tracker.len(),
                "peers" => self.tracker.peer_count()
            );
        }

        if rec.kind == ElemType::Withdrawal {
            self.stats.ignored += 1;
            return Ok(());
        }
        let Some(origin) = rec.origin() else {
            self.stats.ignored += 1;
            return Ok(());
        };
        let prefix: Prefix = match rec.prefix.parse() {
            Ok(p) => p,
            Err(e) => {
                debug!(self.log, "skipping record: {e}";
                    "collector" => &rec.collector,
                    "peer_asn" => rec.peer_asn
                );
                self.stats.malformed += 1;
                return Ok(());
            }
        };
        if !self.filter.accepts(&prefix) {
            self.stats.filtered += 1;
            return Ok(());
        }

        let key = PrefixOriginKey::new(prefix.to_string(), origin).to_string();
        match self.tracker.add_peer(&key, &rec.peer()) {
            Ok(()) => self.stats.accepted += 1,
            Err(rov::Error::CapacityExceeded { max_peers })
                if self.drop_over_capacity =>
            {
                if self.stats.over_capacity == 0 {
                    warn!(self.log, "peer limit reached, dropping new peers";
                        "max_peers" => max_peers,
                        "peer" => rec.peer()
                    );
                }
                self.stats.over_capacity += 1;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("tracking {} from {}", key, rec.peer())
                })
            }
        }
        Ok(())
    }

    pub fn finish(self) -> (PeerSetTracker, CollectStats) {
        (self.tracker, self.stats)
    }
}

/// Collect every record file into a single tracker. With more than one
/// worker, files are split across threads and the partial trackers merged in
/// file order. When dropping over-capacity peers, a merge keeps the same
/// peers a sequential run would; `over_capacity` then also counts the
/// (key, peer) memberships lost in the merge.
pub fn collect(
    opts: &CollectOpts,
    workers: usize,
    log: &Logger,
) -> Result<(PeerSetTracker, CollectStats)> {
    let filter = opts.filter.build()?;
    let config = TrackerConfig {
        max_peers: opts.tracker.max_peers,
    };
    let drop_over_capacity = opts.tracker.drop_over_capacity;

    let files = &opts.records;
    let workers = workers.clamp(1, files.len().max(1));
    let (tracker, stats) = if workers == 1 {
        collect_files(files, &filter, config, drop_over_capacity, log)?
    } else {
        let chunk_size = files.len().div_ceil(workers);
        let parts = std::thread::scope(|s| {
            let handles: Vec<_> = files
                .chunks(chunk_size)
                .map(|chunk| {
                    let filter = &filter;
                    s.spawn(move || {
                        collect_files(
                            chunk,
                            filter,
                            config,
                            drop_over_capacity,
                            log,
                        )
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(part) => part,
                    Err(e) => std::panic::resume_unwind(e),
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let mut tracker = PeerSetTracker::new(config);
        let mut stats = CollectStats::default();
        for (part, part_stats) in &parts {
            stats.merge(part_stats);
            if drop_over_capacity {
                let dropped = tracker.merge_within_capacity(part);
                if dropped > 0 {
                    warn!(log, "peer limit reached while merging";
                        "max_peers" => config.max_peers,
                        "dropped" => dropped
                    );
                }
                stats.over_capacity += dropped;
            } else {
                tracker
                    .merge(part)
                    .context("merging per-file peer sets")?;
            }
        }
        (tracker, stats)
    };

    let ts = tracker.stats();
    info!(log, "collected route records";
        "records" => stats.records,
        "accepted" => stats.accepted,
        "ignored" => stats.ignored,
        "malformed" => stats.malformed,
        "filtered" => stats.filtered,
        "over_capacity" => stats.over_capacity,
        "keys" => ts.keys,
        "peers" => ts.peers,
        "bitmap_bytes" => ts.bitmap_bytes
    );
    Ok((tracker, stats))
}

fn collect_files(
    files: &[PathBuf],
    filter: &AnnouncementFilter,
    config: TrackerConfig,
    drop_over_capacity: bool,
    log: &Logger,
) -> Result<(PeerSetTracker, CollectStats)> {
    let mut collector =
        Collector::new(filter, config, drop_over_capacity, log.clone());
    for path in files {
        collect_file(path, &mut collector, log)?;
    }
    Ok(collector.finish())
}

fn collect_file(
    path: &Path,
    collector: &mut Collector<'_>,
    log: &Logger,
) -> Result<()> {
    let file = path.display().to_string();
    let read = io::read_records(
        path,
        |rec| collector.observe(&rec),
        |line, e| {
            warn!(log, "undecodable route record: {e}";
                "file" => &file,
                "line" => line
            );
        },
    )?;
    info!(log, "read route records";
        "file" => &file,
        "lines" => read.lines,
        "malformed" => read.malformed
    );
    Ok(())
}

/// Tracked pairs as triples sorted by prefix and origin, with peers
/// attributed per `grouping`.
pub fn triples(tracker: &PeerSetTracker, grouping: PeerGrouping) -> Vec<Triple> {
    tracker
        .triples()
        .sorted_by(|a, b| (&a.prefix, &a.origin).cmp(&(&b.prefix, &b.origin)))
        .map(|mut t| {
            if grouping != PeerGrouping::Session {
                t.peers = t
                    .peers
                    .iter()
                    .map(|p| grouping.peer(p).to_string())
                    .collect();
            }
            t
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use rv_common::log::discard;
    use std::collections::BTreeSet;

    fn record(peer_asn: u32, collector: &str, prefix: &str, path: &str) -> RouteRecord {
        RouteRecord {
            collector: collector.into(),
            peer_asn,
            prefix: prefix.into(),
            as_path: path.into(),
            communities: vec![],
            kind: ElemType::Rib,
        }
    }

    fn peers(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn grouping() {
        assert_eq!(PeerGrouping::Session.peer("3333:rrc00"), "3333:rrc00");
        assert_eq!(PeerGrouping::Asn.peer("3333:rrc00"), "3333");
        assert_eq!(PeerGrouping::Asn.peer("3333"), "3333");
    }

    #[test]
    fn observe_filters_and_tracks() {
        let filter = AnnouncementFilter::new(
            FilterConfig::default(),
            vec!["10.0.0.0/8".parse().unwrap()],
        );
        let mut c =
            Collector::new(&filter, TrackerConfig::default(), false, discard());

        c.observe(&record(1, "rrc00", "193.0.0.0/21", "1 2 3333")).unwrap();
        c.observe(&record(2, "rrc01", "193.0.0.0/21", "2 3333")).unwrap();
        // host bits are normalized away
        c.observe(&record(1, "rrc00", "193.0.1.0/21", "1 3333")).unwrap();
        c.observe(&record(1, "rrc00", "10.1.0.0/16", "1 64500")).unwrap();
        c.observe(&record(1, "rrc00", "193.0.0.0/25", "1 64500")).unwrap();
        c.observe(&record(1, "rrc00", "not-a-prefix", "1 64500")).unwrap();
        c.observe(&record(1, "rrc00", "193.0.0.0/21", "")).unwrap();
        let mut w = record(1, "rrc00", "193.0.0.0/21", "1 64500");
        w.kind = ElemType::Withdrawal;
        c.observe(&w).unwrap();

        let (tracker, stats) = c.finish();
        assert_eq!(
            stats,
            CollectStats {
                records: 8,
                accepted: 3,
                ignored: 2,
                malformed: 1,
                filtered: 2,
                over_capacity: 0,
            }
        );
        assert_eq!(tracker.len(), 1);
        assert_eq!(
            tracker.get_peers("193.0.0.0/21|3333"),
            peers(&["1:rrc00", "2:rrc01"])
        );
    }

    #[test]
    fn capacity_fails_or_drops() {
        let filter = AnnouncementFilter::default();
        let config = TrackerConfig { max_peers: 1 };

        let mut c = Collector::new(&filter, config, false, discard());
        c.observe(&record(1, "rrc00", "193.0.0.0/21", "1")).unwrap();
        assert!(c.observe(&record(2, "rrc00", "193.0.0.0/21", "2")).is_err());

        let mut c = Collector::new(&filter, config, true, discard());
        c.observe(&record(1, "rrc00", "193.0.0.0/21", "1")).unwrap();
        c.observe(&record(2, "rrc00", "193.0.0.0/21", "2")).unwrap();
        let (tracker, stats) = c.finish();
        assert_eq!(stats.over_capacity, 1);
        assert_eq!(tracker.peer_count(), 1);
    }

    #[test]
    fn asn_grouping_collapses_sessions() {
        let filter = AnnouncementFilter::default();
        let mut c =
            Collector::new(&filter, TrackerConfig::default(), false, discard());
        c.observe(&record(1, "rrc00", "193.0.0.0/21", "1 3333")).unwrap();
        c.observe(&record(1, "rrc01", "193.0.0.0/21", "1 3333")).unwrap();
        c.observe(&record(2, "rrc01", "193.0.0.0/21", "2 3333")).unwrap();
        let (tracker, _) = c.finish();

        let by_session = triples(&tracker, PeerGrouping::Session);
        assert_eq!(by_session[0].peers, peers(&["1:rrc00", "1:rrc01", "2:rrc01"]));

        let by_asn = triples(&tracker, PeerGrouping::Asn);
        assert_eq!(by_asn.len(), 1);
        assert_eq!(by_asn[0].prefix, "193.0.0.0/21");
        assert_eq!(by_asn[0].origin, "3333");
        assert_eq!(by_asn[0].peers, peers(&["1", "2"]));
    }

    #[test]
    fn parallel_collect_merges_files() {
        let dir = std::env::temp_dir().join("rovstat-collect-parallel");
        std::fs::create_dir_all(&dir).unwrap();
        let mut files = Vec::new();
        for i in 0..4u32 {
            let path = dir.join(format!("records-{i}.jsonl"));
            let mut text = String::new();
            for j in 0..10u32 {
                text.push_str(&format!(
                    "{{\"collector\":\"rrc0{i}\",\"peer_asn\":{j},\
                     \"prefix\":\"193.{j}.0.0/16\",\"as_path\":\"{j} 3333\"}}\n"
                ));
            }
            std::fs::write(&path, text).unwrap();
            files.push(path);
        }

        let opts = CollectOpts {
            records: files,
            tracker: TrackerArgs {
                max_peers: 100,
                drop_over_capacity: false,
            },
            filter: FilterArgs {
                bogons: None,
                v4_min_len: 8,
                v4_max_len: 24,
                v6_min_len: 8,
                v6_max_len: 64,
            },
            group_by: PeerGrouping::Session,
        };
        let (seq, seq_stats) = collect(&opts, 1, &discard()).unwrap();
        let (par, par_stats) = collect(&opts, 3, &discard()).unwrap();

        assert_eq!(seq_stats, par_stats);
        assert_eq!(seq_stats.accepted, 40);
        assert_eq!(
            triples(&seq, PeerGrouping::Session),
            triples(&par, PeerGrouping::Session)
        );
        assert_eq!(par.len(), 10);
        assert_eq!(par.peer_count(), 40);
    }

    #[test]
    fn parallel_collect_drops_over_capacity() {
        let dir = std::env::temp_dir().join("rovstat-collect-capacity");
        std::fs::create_dir_all(&dir).unwrap();
        let mut files = Vec::new();
        for (i, collector) in ["rrc00", "rrc01"].iter().enumerate() {
            let path = dir.join(format!("records-{i}.jsonl"));
            let mut text = String::new();
            for asn in [2 * i + 1, 2 * i + 2] {
                text.push_str(&format!(
                    "{{\"collector\":\"{collector}\",\"peer_asn\":{asn},\
                     \"prefix\":\"193.0.0.0/21\",\"as_path\":\"{asn} 3333\"}}\n"
                ));
            }
            std::fs::write(&path, text).unwrap();
            files.push(path);
        }

        let opts = |drop_over_capacity| CollectOpts {
            records: files.clone(),
            tracker: TrackerArgs {
                max_peers: 2,
                drop_over_capacity,
            },
            filter: FilterArgs {
                bogons: None,
                v4_min_len: 8,
                v4_max_len: 24,
                v6_min_len: 8,
                v6_max_len: 64,
            },
            group_by: PeerGrouping::Session,
        };

        let (seq, seq_stats) = collect(&opts(true), 1, &discard()).unwrap();
        let (par, par_stats) = collect(&opts(true), 2, &discard()).unwrap();
        assert_eq!(seq_stats.over_capacity, 2);
        assert_eq!(par_stats.over_capacity, 2);
        assert_eq!(par.peer_count(), seq.peer_count());
        assert_eq!(
            triples(&par, PeerGrouping::Session),
            triples(&seq, PeerGrouping::Session)
        );
        assert_eq!(
            par.get_peers("193.0.0.0/21|3333"),
            peers(&["1:rrc00", "2:rrc00"])
        );

        assert!(collect(&opts(false), 1, &discard()).is_err());
        assert!(collect(&opts(false), 2, &discard()).is_err());
    }
}
