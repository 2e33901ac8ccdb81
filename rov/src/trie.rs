// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Covering prefix index.
//!
//! A binary trie over address bits, one per address family. Each node on a
//! path from the root corresponds to the prefix spelled by that path; nodes
//! that had ROAs loaded at exactly their prefix are *present*, the others
//! exist only to connect present nodes. Walking the bits of a query prefix
//! from the root visits every present node that covers it, least specific
//! first, which gives exact lookup, longest covering match and the
//! ancestor walk from one traversal.

use crate::error::Error;
use crate::types::{Prefix, Prefix4, Prefix6, Roa};
use std::fmt::Display;

/// A prefix that can be addressed bit by bit, most significant bit first.
pub trait Bits: Copy + Eq + Display {
    /// Address width in bits.
    const WIDTH: u8;

    fn length(&self) -> u8;

    /// The address bit at `index`, counting from the most significant bit.
    fn bit(&self, index: u8) -> bool;

    /// Extract this family's prefix from a family-agnostic one.
    fn from_prefix(prefix: &Prefix) -> Option<Self>;
}

impl Bits for Prefix4 {
    const WIDTH: u8 = Prefix4::HOST_MASK;

    fn length(&self) -> u8 {
        self.length
    }

    fn bit(&self, index: u8) -> bool {
        (self.value.to_bits() >> (Self::WIDTH - 1 - index)) & 1 == 1
    }

    fn from_prefix(prefix: &Prefix) -> Option<Self> {
        match prefix {
            Prefix::V4(p) => Some(*p),
            Prefix::V6(_) => None,
        }
    }
}

impl Bits for Prefix6 {
    const WIDTH: u8 = Prefix6::HOST_MASK;

    fn length(&self) -> u8 {
        self.length
    }

    fn bit(&self, index: u8) -> bool {
        (self.value.to_bits() >> (Self::WIDTH - 1 - index)) & 1 == 1
    }

    fn from_prefix(prefix: &Prefix) -> Option<Self> {
        match prefix {
            Prefix::V6(p) => Some(*p),
            Prefix::V4(_) => None,
        }
    }
}

const ROOT: usize = 0;

#[derive(Debug, Clone)]
struct Node<P> {
    children: [Option<usize>; 2],
    entry: Option<Entry<P>>,
}

impl<P> Node<P> {
    fn empty() -> Self {
        Self {
            children: [None, None],
            entry: None,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry<P> {
    prefix: P,
    roas: Vec<Roa>,
}

#[derive(Debug, Clone)]
pub struct CoveringPrefixIndex<P> {
    /// Node arena, the root (the zero length prefix) is at index 0.
    nodes: Vec<Node<P>>,
    prefixes: usize,
    roas: usize,
}

impl<P: Bits> Default for CoveringPrefixIndex<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Bits> CoveringPrefixIndex<P> {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::empty()],
            prefixes: 0,
            roas: 0,
        }
    }

    /// Append `roa` to the list kept at its exact prefix.
    pub fn load(&mut self, roa: Roa) -> Result<(), Error> {
        let prefix = P::from_prefix(&roa.prefix).ok_or_else(|| {
            Error::AddressFamilyMismatch(roa.prefix.to_string())
        })?;
        self.insert(prefix, roa);
        Ok(())
    }

    /// Append `roa` under `prefix`, creating the path down to it as needed.
    pub fn insert(&mut self, prefix: P, roa: Roa) {
        let mut node = ROOT;
        for i in 0..prefix.length().min(P::WIDTH) {
            let b = usize::from(prefix.bit(i));
            node = match self.nodes[node].children[b] {
                Some(child) => child,
                None => {
                    let child = self.nodes.len();
                    self.nodes.push(Node::empty());
                    self.nodes[node].children[b] = Some(child);
                    child
                }
            };
        }

        let slot = &mut self.nodes[node].entry;
        if slot.is_none() {
            self.prefixes += 1;
        }
        slot.get_or_insert_with(|| Entry {
            prefix,
            roas: Vec::new(),
        })
        .roas
        .push(roa);
        self.roas += 1;
    }

    /// Present entries covering `query`, least specific first. Only the first
    /// `query.length()` bits of `query` are consulted.
    fn covering(&self, query: &P) -> Vec<&Entry<P>> {
        let mut found = Vec::new();
        let mut node = ROOT;
        if let Some(e) = &self.nodes[ROOT].entry {
            found.push(e);
        }
        for i in 0..query.length().min(P::WIDTH) {
            let b = usize::from(query.bit(i));
            match self.nodes[node].children[b] {
                Some(child) => node = child,
                None => break,
            }
            if let Some(e) = &self.nodes[node].entry {
                found.push(e);
            }
        }
        found
    }

    /// The ROAs loaded at exactly `prefix`.
    pub fn get(&self, prefix: &P) -> Option<&[Roa]> {
        self.covering(prefix)
            .last()
            .filter(|e| e.prefix.length() == prefix.length())
            .map(|e| e.roas.as_slice())
    }

    /// The most specific present prefix covering `query`, which is `query`
    /// itself when present.
    pub fn exact_or_ancestor(&self, query: &P) -> Option<P> {
        self.covering(query).last().map(|e| e.prefix)
    }

    /// The next less specific present prefix strictly covering `prefix`.
    pub fn parent(&self, prefix: &P) -> Option<P> {
        self.covering(prefix)
            .into_iter()
            .rev()
            .find(|e| e.prefix.length() < prefix.length())
            .map(|e| e.prefix)
    }

    /// Every ROA at the longest present prefix covering `query` and at each
    /// of its present ancestors, most specific first. Empty iff no present
    /// prefix covers `query`.
    pub fn candidate_roas(&self, query: &P) -> Vec<&Roa> {
        self.covering(query)
            .into_iter()
            .rev()
            .flat_map(|e| e.roas.iter())
            .collect()
    }

    /// Number of distinct prefixes holding ROAs.
    pub fn len(&self) -> usize {
        self.prefixes
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes == 0
    }

    /// Number of ROAs loaded.
    pub fn roa_count(&self) -> usize {
        self.roas
    }
}
