// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Announcement pre-filtering.
//!
//! Prefixes reaching the tracker are expected to be routable and of a
//! sensible length. [`AnnouncementFilter`] drops anything inside a bogon
//! range and anything outside the configured length bounds for its family.

use crate::error::Error;
use crate::types::Prefix;
use std::ops::RangeInclusive;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterConfig {
    /// Accepted IPv4 prefix lengths.
    pub v4_lengths: RangeInclusive<u8>,
    /// Accepted IPv6 prefix lengths.
    pub v6_lengths: RangeInclusive<u8>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            v4_lengths: 8..=24,
            v6_lengths: 8..=64,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnnouncementFilter {
    config: FilterConfig,
    bogons: Vec<Prefix>,
}

impl AnnouncementFilter {
    pub fn new(config: FilterConfig, bogons: Vec<Prefix>) -> Self {
        Self { config, bogons }
    }

    /// True if `prefix` has an acceptable length and is not covered by any
    /// bogon range.
    pub fn accepts(&self, prefix: &Prefix) -> bool {
        let lengths = match prefix {
            Prefix::V4(_) => &self.config.v4_lengths,
            Prefix::V6(_) => &self.config.v6_lengths,
        };
        lengths.contains(&prefix.length())
            && !self.bogons.iter().any(|b| prefix.within(b))
    }
}

/// Parse a bogon list, one prefix per line. Blank lines and `#` comments are
/// ignored.
pub fn parse_bogons(text: &str) -> Result<Vec<Prefix>, Error> {
    text.lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .map(str::parse::<Prefix>)
        .collect()
}
