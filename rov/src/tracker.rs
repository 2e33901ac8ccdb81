// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Peer set tracking.
//!
//! The tracker records, for every key it is given (normally a
//! [`PrefixOriginKey`] in text form), the set of distinct peers that observed
//! it. Peers are assigned dense ids on first sighting and each key holds a
//! fixed-width [`PeerBitmap`] over that id space. The id space is bounded by
//! [`TrackerConfig::max_peers`]; running out of ids is an error rather than
//! a reason to grow.

use crate::bitmap::PeerBitmap;
use crate::error::Error;
use crate::types::{PrefixOriginKey, Triple};
use crate::DEFAULT_MAX_PEERS;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Size of the peer id space.
    pub max_peers: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_peers: DEFAULT_MAX_PEERS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerStats {
    pub peers: usize,
    pub keys: usize,
    pub bitmap_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct PeerSetTracker {
    max_peers: usize,

    /// Peer string to dense id. Append only for the life of a run.
    peer_ids: HashMap<String, u32>,

    /// Dense id to peer string, the inverse of `peer_ids`.
    peers: Vec<String>,

    sets: HashMap<String, PeerBitmap>,
}

impl Default for PeerSetTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl PeerSetTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            max_peers: config.max_peers,
            peer_ids: HashMap::new(),
            peers: Vec::new(),
            sets: HashMap::new(),
        }
    }

    /// Add `peer` to the peer set of `key`.
    ///
    /// Fails with [`Error::CapacityExceeded`] when `peer` has not been seen
    /// before and the id space is full. Nothing is modified in that case.
    pub fn add_peer(&mut self, key: &str, peer: &str) -> Result<(), Error> {
        let id = self.peer_id(peer)?;
        match self.sets.get_mut(key) {
            Some(set) => {
                set.insert(id);
            }
            None => {
                let mut set = PeerBitmap::new(self.max_peers);
                set.insert(id);
                self.sets.insert(key.to_string(), set);
            }
        }
        Ok(())
    }

    fn peer_id(&mut self, peer: &str) -> Result<u32, Error> {
        if let Some(id) = self.peer_ids.get(peer) {
            return Ok(*id);
        }
        if self.peers.len() >= self.max_peers {
            return Err(Error::CapacityExceeded {
                max_peers: self.max_peers,
            });
        }
        let id = self.peers.len() as u32;
        self.peer_ids.insert(peer.to_string(), id);
        self.peers.push(peer.to_string());
        Ok(id)
    }

    /// The peers that observed `key`. Empty if `key` was never added.
    pub fn get_peers(&self, key: &str) -> BTreeSet<String> {
        match self.sets.get(key) {
            Some(set) => self.resolve(set).map(str::to_string).collect(),
            None => BTreeSet::new(),
        }
    }

    fn resolve<'a>(
        &'a self,
        set: &'a PeerBitmap,
    ) -> impl Iterator<Item = &'a str> + 'a {
        set.iter()
            .filter_map(|id| self.peers.get(id as usize).map(String::as_str))
    }

    /// All tracked keys, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.sets.keys().map(String::as_str)
    }

    /// Every tracked key split into its prefix and origin parts along with
    /// its peer set. Keys without an origin part yield an empty origin.
    pub fn triples(&self) -> impl Iterator<Item = Triple> + '_ {
        self.sets.iter().map(|(key, set)| {
            let (prefix, origin) = key
                .split_once(PrefixOriginKey::SEPARATOR)
                .unwrap_or((key.as_str(), ""));
            Triple {
                prefix: prefix.to_string(),
                origin: origin.to_string(),
                peers: self.resolve(set).map(str::to_string).collect(),
            }
        })
    }

    /// Fold every key and peer of `other` into this tracker. Peer ids of
    /// `other` are translated into this tracker's id space.
    ///
    /// Peers are registered before any key is touched, so on
    /// [`Error::CapacityExceeded`] no key sets change, though peers
    /// registered before the failure keep their ids.
    pub fn merge(&mut self, other: &PeerSetTracker) -> Result<(), Error> {
        let mut translated = Vec::with_capacity(other.peers.len());
        for peer in &other.peers {
            translated.push(Some(self.peer_id(peer)?));
        }
        self.merge_translated(other, &translated);
        Ok(())
    }

    /// Like [`merge`](Self::merge), but peers of `other` that no longer fit
    /// are left out instead of failing. Peers are taken in `other`'s id
    /// order, which is the order it first saw them. Keys observed only by
    /// dropped peers are not created.
    ///
    /// Returns the number of (key, peer) memberships dropped.
    pub fn merge_within_capacity(&mut self, other: &PeerSetTracker) -> u64 {
        let translated: Vec<Option<u32>> =
            other.peers.iter().map(|p| self.peer_id(p).ok()).collect();
        self.merge_translated(other, &translated)
    }

    fn merge_translated(
        &mut self,
        other: &PeerSetTracker,
        translated: &[Option<u32>],
    ) -> u64 {
        let mut dropped = 0;
        for (key, theirs) in &other.sets {
            let mut set = PeerBitmap::new(self.max_peers);
            for id in theirs {
                match translated.get(id as usize).copied().flatten() {
                    Some(mine) => {
                        set.insert(mine);
                    }
                    None => dropped += 1,
                }
            }
            if set.is_empty() {
                continue;
            }
            match self.sets.get_mut(key) {
                Some(existing) => existing.union_with(&set),
                None => {
                    self.sets.insert(key.clone(), set);
                }
            }
        }
        dropped
    }

    /// Number of distinct keys tracked.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Number of distinct peers registered.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            peers: self.peers.len(),
            keys: self.sets.len(),
            bitmap_bytes: self.sets.values().map(PeerBitmap::size_bytes).sum(),
        }
    }

    /// Drop every key, peer and id.
    pub fn clear(&mut self) {
        self.peer_ids.clear();
        self.peers.clear();
        self.sets.clear();
    }
}
