// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reading and writing the files rovstat works with.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use itertools::Itertools;
use rov::{Aggregate, RoaRecord, Triple};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const TRIPLES_FILE: &str = "prefix_origin_dps.json";
pub const REPORT_FILE: &str = "rpki_status_counts.csv";

/// Kind of a route collector record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElemType {
    /// Entry from a RIB dump.
    #[default]
    #[serde(rename = "R")]
    Rib,
    #[serde(rename = "A")]
    Announcement,
    #[serde(rename = "W")]
    Withdrawal,
}

/// One route observation from a collector, one per line of input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRecord {
    pub collector: String,
    pub peer_asn: u32,
    pub prefix: String,
    #[serde(default)]
    pub as_path: String,
    #[serde(default)]
    pub communities: Vec<String>,
    #[serde(rename = "type", default)]
    pub kind: ElemType,
}

impl RouteRecord {
    /// Right-most element of the AS path.
    pub fn origin(&self) -> Option<&str> {
        self.as_path.split_whitespace().next_back()
    }

    /// Peer session id, `"<peer-AS>:<collector>"`.
    pub fn peer(&self) -> String {
        format!("{}:{}", self.peer_asn, self.collector)
    }
}

/// Counters from reading a route record file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub lines: u64,
    pub malformed: u64,
}

/// Stream route records from a JSON lines file. Lines that do not decode,
/// including lines that are not valid UTF-8, are counted and handed to
/// `on_malformed`; I/O errors end the read.
pub fn read_records<F, E>(
    path: &Path,
    mut on_record: F,
    mut on_malformed: E,
) -> Result<ReadStats>
where
    F: FnMut(RouteRecord) -> Result<()>,
    E: FnMut(u64, &serde_json::Error),
{
    let file = File::open(path)
        .with_context(|| format!("open route records {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut stats = ReadStats::default();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("read route records {}", path.display()))?;
        if n == 0 {
            break;
        }
        stats.lines += 1;
        let line = buf.trim_ascii();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_slice::<RouteRecord>(line) {
            Ok(rec) => on_record(rec)?,
            Err(e) => {
                stats.malformed += 1;
                on_malformed(stats.lines, &e);
            }
        }
    }
    Ok(stats)
}

/// A validated ROA export: the `roas` array is all that is used.
#[derive(Debug, Deserialize)]
struct RoaExport {
    roas: Vec<RoaRecord>,
}

pub fn read_roas(path: &Path) -> Result<Vec<RoaRecord>> {
    let file = File::open(path)
        .with_context(|| format!("open roa export {}", path.display()))?;
    let export: RoaExport = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parse roa export {}", path.display()))?;
    Ok(export.roas)
}

pub fn read_triples(path: &Path) -> Result<Vec<Triple>> {
    let file = File::open(path)
        .with_context(|| format!("open triples {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parse triples {}", path.display()))
}

pub fn write_triples(path: &Path, triples: &[Triple]) -> Result<()> {
    let mut w = create(path)?;
    serde_json::to_writer(&mut w, triples)
        .with_context(|| format!("write triples {}", path.display()))?;
    w.flush()?;
    Ok(())
}

/// Write the per-peer report as CSV, one row per peer in peer order.
pub fn write_report<W: Write>(mut w: W, aggregate: &Aggregate) -> Result<()> {
    let header = rov::report_columns()
        .map(|(af, status)| format!("{}_{}", af.tag(), status.column()))
        .join(",");
    writeln!(w, "direct_peer,{header}")?;
    for (peer, row) in aggregate.rows() {
        write!(w, "{}", csv_field(peer))?;
        for n in row {
            write!(w, ",{n}")?;
        }
        writeln!(w)?;
    }
    w.flush()?;
    Ok(())
}

pub fn write_report_file(path: &Path, aggregate: &Aggregate) -> Result<()> {
    write_report(create(path)?, aggregate)
        .with_context(|| format!("write report {}", path.display()))
}

fn csv_field(s: &str) -> std::borrow::Cow<'_, str> {
    if s.contains([',', '"', '\n']) {
        format!("\"{}\"", s.replace('"', "\"\"")).into()
    } else {
        s.into()
    }
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create directory {}", dir.display()))?;
    }
    let file = File::create(path)
        .with_context(|| format!("create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

/// Parse a `YYYYMMDD` run date.
pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y%m%d")
        .map_err(|e| format!("expected YYYYMMDD: {e}"))
}

/// `<base>/data/BGPStream/<date>/prefix_origin_dps.json`
pub fn triples_path(base: &Path, date: NaiveDate) -> PathBuf {
    dated_dir(base, "BGPStream", date).join(TRIPLES_FILE)
}

/// `<base>/data/RPKI/<date>/rpki_status_counts.csv`
pub fn report_path(base: &Path, date: NaiveDate) -> PathBuf {
    dated_dir(base, "RPKI", date).join(REPORT_FILE)
}

fn dated_dir(base: &Path, source: &str, date: NaiveDate) -> PathBuf {
    base.join("data")
        .join(source)
        .join(date.format("%Y%m%d").to_string())
}
