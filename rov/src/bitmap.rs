// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fixed-width peer membership bitmaps.
//!
//! A [`PeerBitmap`] holds one bit per dense peer id. Its width is fixed when
//! it is created and never changes, so every bitmap built for the same peer
//! capacity can be combined word by word.

const WORD_BITS: usize = u64::BITS as usize;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerBitmap {
    words: Box<[u64]>,
}

impl PeerBitmap {
    /// Create an empty bitmap able to hold ids `0..capacity`.
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0u64; capacity.div_ceil(WORD_BITS)].into_boxed_slice(),
        }
    }

    /// Number of ids this bitmap can represent, rounded up to a whole word.
    pub fn capacity(&self) -> usize {
        self.words.len() * WORD_BITS
    }

    /// Set the bit for `id`. Returns true if the id was not already present.
    /// Ids beyond the capacity are ignored and return false.
    pub fn insert(&mut self, id: u32) -> bool {
        let (word, bit) = Self::position(id);
        match self.words.get_mut(word) {
            Some(w) => {
                let was_set = *w & bit != 0;
                *w |= bit;
                !was_set
            }
            None => false,
        }
    }

    pub fn contains(&self, id: u32) -> bool {
        let (word, bit) = Self::position(id);
        self.words.get(word).is_some_and(|w| w & bit != 0)
    }

    /// Bitwise OR `other` into this bitmap. Words past this bitmap's width
    /// are dropped.
    pub fn union_with(&mut self, other: &PeerBitmap) {
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a |= b;
        }
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Heap bytes held by this bitmap.
    pub fn size_bytes(&self) -> usize {
        std::mem::size_of_val(&*self.words)
    }

    /// Iterate over the set ids in ascending order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            words: &self.words,
            index: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }

    fn position(id: u32) -> (usize, u64) {
        let id = id as usize;
        (id / WORD_BITS, 1u64 << (id % WORD_BITS))
    }
}

pub struct Iter<'a> {
    words: &'a [u64],
    index: usize,
    current: u64,
}

impl Iterator for Iter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some((self.index * WORD_BITS + bit) as u32);
            }
            self.index += 1;
            self.current = *self.words.get(self.index)?;
        }
    }
}

impl<'a> IntoIterator for &'a PeerBitmap {
    type Item = u32;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
