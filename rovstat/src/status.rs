// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::io;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use rov::{
    Aggregate, AddressFamily, RoaIndex, RouteValidator, RpkiStatus,
    StatusAggregator, Triple,
};
use slog::{info, Logger};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tabwriter::TabWriter;

#[derive(Args, Debug)]
pub struct RoaArgs {
    /// Validated ROA export files, each with a top level `roas` array.
    #[arg(long = "roas", required = true, num_args = 1..)]
    pub roas: Vec<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Where to write the CSV report. Defaults to
    /// <base-path>/data/RPKI/<date>/rpki_status_counts.csv.
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Also print the per peer counts.
    #[arg(long)]
    pub peers: bool,
}

pub fn load_index(args: &RoaArgs, log: &Logger) -> Result<RoaIndex> {
    let mut records = Vec::new();
    for path in &args.roas {
        let roas = io::read_roas(path)?;
        info!(log, "read roa export";
            "file" => path.display().to_string(),
            "roas" => roas.len()
        );
        records.extend(roas);
    }
    let (index, stats) = RoaIndex::from_records(records, log.clone());
    info!(log, "loaded roas";
        "loaded" => stats.loaded,
        "skipped" => stats.skipped
    );
    Ok(index)
}

pub fn aggregate(
    index: &RoaIndex,
    triples: Vec<Triple>,
    workers: usize,
    log: &Logger,
) -> Aggregate {
    StatusAggregator::new(log.clone())
        .with_workers(workers)
        .aggregate(triples, &RouteValidator::new(index))
}

pub fn report(
    aggregate: &Aggregate,
    path: &Path,
    args: &ReportArgs,
    elapsed: Duration,
    log: &Logger,
) -> Result<()> {
    io::write_report_file(path, aggregate)?;
    info!(log, "wrote report";
        "file" => path.display().to_string(),
        "peers" => aggregate.counts.len()
    );
    summary(std::io::stdout(), aggregate, args.peers, elapsed)
}

/// Print totals of distinct pairs per family and status, optionally
/// followed by the per peer table.
pub fn summary<W: Write>(
    w: W,
    aggregate: &Aggregate,
    show_peers: bool,
    elapsed: Duration,
) -> Result<()> {
    let mut tw = TabWriter::new(w);

    write!(&mut tw, "{}", "Family".dimmed())?;
    for status in RpkiStatus::ALL {
        write!(&mut tw, "\t{}", status.to_string().dimmed())?;
    }
    writeln!(&mut tw)?;
    for af in AddressFamily::ALL {
        write!(&mut tw, "{}", af.tag())?;
        for status in RpkiStatus::ALL {
            write!(&mut tw, "\t{}", aggregate.totals.get(af, status))?;
        }
        writeln!(&mut tw)?;
    }
    writeln!(&mut tw)?;

    let stats = &aggregate.stats;
    writeln!(&mut tw, "{}\t{}", "Peers".dimmed(), aggregate.counts.len())?;
    writeln!(&mut tw, "{}\t{}", "Pairs".dimmed(), stats.pairs)?;
    writeln!(&mut tw, "{}\t{}", "Skipped".dimmed(), stats.skipped)?;
    let elapsed = Duration::from_millis(elapsed.as_millis() as u64);
    writeln!(
        &mut tw,
        "{}\t{}",
        "Elapsed".dimmed(),
        humantime::format_duration(elapsed)
    )?;

    if show_peers {
        writeln!(&mut tw)?;
        write!(&mut tw, "{}", "Peer".dimmed())?;
        for (af, status) in rov::report_columns() {
            write!(
                &mut tw,
                "\t{}",
                format!("{}_{}", af.tag(), status.column()).dimmed()
            )?;
        }
        writeln!(&mut tw)?;
        for (peer, row) in aggregate.rows() {
            write!(&mut tw, "{peer}")?;
            for n in row {
                write!(&mut tw, "\t{n}")?;
            }
            writeln!(&mut tw)?;
        }
    }

    tw.flush()?;
    Ok(())
}
