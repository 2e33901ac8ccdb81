// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Route origin validation (rov).
//!
//! Observed routes are folded into a [`PeerSetTracker`] keyed by
//! prefix-origin pair, published ROAs are loaded into a [`RoaIndex`], and a
//! [`StatusAggregator`] classifies every tracked pair with a
//! [`RouteValidator`] to produce per peer status counts. Nothing in this
//! crate performs I/O.

pub mod aggregate;
pub mod bitmap;
pub mod error;
pub mod filter;
pub mod index;
pub mod tracker;
pub mod trie;
pub mod types;
pub mod validate;

mod log;

#[cfg(test)]
mod proptest;

pub use aggregate::{Aggregate, AggregateStats, StatusAggregator};
pub use error::Error;
pub use filter::{AnnouncementFilter, FilterConfig};
pub use index::RoaIndex;
pub use tracker::{PeerSetTracker, TrackerConfig};
pub use types::*;
pub use validate::{classify, Classify, RouteValidator};

/// The default size of the peer id space.
pub const DEFAULT_MAX_PEERS: usize = 3000;

pub const COMPONENT_ROV: &str = "rov";
pub const MOD_INDEX: &str = "index";
pub const MOD_AGGREGATE: &str = "aggregate";
