// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::index::RoaIndex;
use crate::types::{Prefix, RpkiStatus};

/// Something that can assign a route origin validation status to a
/// prefix-origin pair. Implementations must be pure: the same inputs always
/// produce the same status.
pub trait Classify {
    fn classify(&self, prefix: &Prefix, origin: u32) -> RpkiStatus;
}

/// Classifies routes against a read-only [`RoaIndex`].
#[derive(Clone, Copy)]
pub struct RouteValidator<'a> {
    index: &'a RoaIndex,
}

impl<'a> RouteValidator<'a> {
    pub fn new(index: &'a RoaIndex) -> Self {
        Self { index }
    }
}

impl Classify for RouteValidator<'_> {
    fn classify(&self, prefix: &Prefix, origin: u32) -> RpkiStatus {
        classify(prefix, origin, self.index)
    }
}

/// The route origin validation decision.
///
/// - No covering ROA at any level: `Unknown`.
/// - No covering ROA, at any level, names `origin`: `InvalidAsn`.
/// - Some covering ROA naming `origin` allows the announced length:
///   `Valid`. Otherwise `InvalidLength`.
///
/// ROAs for other origins never take part in the length decision.
pub fn classify(prefix: &Prefix, origin: u32, index: &RoaIndex) -> RpkiStatus {
    let candidates = index.candidate_roas(prefix);
    if candidates.is_empty() {
        return RpkiStatus::Unknown;
    }

    let mut matching = candidates.iter().filter(|r| r.asn == origin).peekable();
    if matching.peek().is_none() {
        return RpkiStatus::InvalidAsn;
    }

    let length = prefix.length();
    if matching.any(|r| length <= r.max_length) {
        RpkiStatus::Valid
    } else {
        RpkiStatus::InvalidLength
    }
}
