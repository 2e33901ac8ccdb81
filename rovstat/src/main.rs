// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use rv_common::cli::cli_style;
use rv_common::log::{init_file_logger, init_term_logger};
use slog::{info, Logger};
use std::path::PathBuf;
use std::time::Instant;

mod collect;
mod io;
mod status;

#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = None,
    styles = cli_style(),
    infer_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding the dated `data/` tree.
    #[arg(long, global = true, default_value = ".")]
    base_path: PathBuf,

    /// Collection date as YYYYMMDD. Defaults to today (UTC).
    #[arg(long, global = true, value_parser = io::parse_date)]
    date: Option<NaiveDate>,

    /// Worker threads for collection and classification.
    #[arg(long, global = true, env = "ROVSTAT_WORKERS", default_value_t = 1)]
    workers: usize,

    /// Write bunyan formatted logs to this file instead of the terminal.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Track the peers observing each prefix-origin pair and write them out
    /// as triples.
    Collect {
        #[command(flatten)]
        opts: collect::CollectOpts,

        /// Where to write the triples. Defaults to
        /// <base-path>/data/BGPStream/<date>/prefix_origin_dps.json.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Classify a triples file against ROA exports and write the per peer
    /// status report.
    Status {
        #[command(flatten)]
        roas: status::RoaArgs,

        /// Triples to classify. Defaults to the collect output location.
        #[arg(long)]
        triples: Option<PathBuf>,

        #[command(flatten)]
        report: status::ReportArgs,
    },

    /// Collect and classify in one pass, without the intermediate file.
    Run {
        #[command(flatten)]
        opts: collect::CollectOpts,

        #[command(flatten)]
        roas: status::RoaArgs,

        #[command(flatten)]
        report: status::ReportArgs,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let log = match &cli.log_file {
        Some(path) => init_file_logger(path)
            .with_context(|| format!("create log file {}", path.display()))?,
        None => init_term_logger(),
    };
    run(cli, &log)
}

fn run(cli: Cli, log: &Logger) -> Result<()> {
    let start = Instant::now();
    let date = cli.date.unwrap_or_else(|| Utc::now().date_naive());
    let base = cli.base_path.as_path();

    match cli.command {
        Commands::Collect { opts, out } => {
            let (tracker, _) = collect::collect(&opts, cli.workers, log)?;
            let triples = collect::triples(&tracker, opts.group_by);
            let out = out.unwrap_or_else(|| io::triples_path(base, date));
            io::write_triples(&out, &triples)?;
            info!(log, "wrote triples";
                "file" => out.display().to_string(),
                "triples" => triples.len()
            );
        }
        Commands::Status {
            roas,
            triples,
            report,
        } => {
            let index = status::load_index(&roas, log)?;
            let path = triples.unwrap_or_else(|| io::triples_path(base, date));
            let triples = io::read_triples(&path)?;
            let agg = status::aggregate(&index, triples, cli.workers, log);
            let out = report
                .out
                .clone()
                .unwrap_or_else(|| io::report_path(base, date));
            status::report(&agg, &out, &report, start.elapsed(), log)?;
        }
        Commands::Run { opts, roas, report } => {
            let index = status::load_index(&roas, log)?;
            let (tracker, _) = collect::collect(&opts, cli.workers, log)?;
            let triples = collect::triples(&tracker, opts.group_by);
            drop(tracker);
            let agg = status::aggregate(&index, triples, cli.workers, log);
            let out = report
                .out
                .clone()
                .unwrap_or_else(|| io::report_path(base, date));
            status::report(&agg, &out, &report, start.elapsed(), log)?;
        }
    }

    info!(log, "done";
        "elapsed" => humantime::format_duration(start.elapsed()).to_string()
    );
    Ok(())
}
