// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

#[derive(
    Debug, Copy, Clone, Serialize, Deserialize, Eq, Hash, PartialEq,
)]
pub struct Prefix4 {
    pub value: Ipv4Addr,
    pub length: u8,
}

impl PartialOrd for Prefix4 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Prefix4 {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.value != other.value {
            return self.value.cmp(&other.value);
        }
        self.length.cmp(&other.length)
    }
}

impl Prefix4 {
    pub const HOST_MASK: u8 = 32;

    /// Create a new `Prefix4` from an IP address and net mask.
    /// The newly created `Prefix4` will have its host bits zeroed upon creation
    /// e.g.
    /// ```
    /// use rov::types::Prefix4;
    /// use std::net::Ipv4Addr;
    /// use std::str::FromStr;
    /// let p4 = Prefix4::new(Ipv4Addr::from_str("10.0.0.10").unwrap(), 24);
    /// assert_eq!(p4.value, Ipv4Addr::from_str("10.0.0.0").unwrap());
    /// ```
    pub fn new(ip: Ipv4Addr, length: u8) -> Self {
        let mut new = Self::new_unchecked(ip, length);
        new.unset_host_bits();
        new
    }

    /// Create a `Prefix4` keeping the address exactly as given.
    pub fn new_unchecked(ip: Ipv4Addr, length: u8) -> Self {
        Self { value: ip, length }
    }

    fn mask(length: u8) -> u32 {
        match length {
            0 => 0,
            l if l >= Self::HOST_MASK => !0u32,
            l => (!0u32) << (32 - l),
        }
    }

    pub fn host_bits_are_unset(&self) -> bool {
        self.value.to_bits() & Self::mask(self.length) == self.value.to_bits()
    }

    pub fn unset_host_bits(&mut self) {
        self.value =
            Ipv4Addr::from_bits(self.value.to_bits() & Self::mask(self.length))
    }

    /// Check if this prefix is contained within another prefix.
    /// Returns true if this prefix is equal to or more specific than the other.
    pub fn within(&self, other: &Prefix4) -> bool {
        if self.length < other.length {
            return false;
        }
        let mask = Self::mask(other.length);
        self.value.to_bits() & mask == other.value.to_bits() & mask
    }
}

impl fmt::Display for Prefix4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.value, self.length)
    }
}

impl FromStr for Prefix4 {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, length) =
            s.split_once('/').ok_or("malformed prefix".to_string())?;

        let value: Ipv4Addr = value
            .trim()
            .parse()
            .map_err(|_| "malformed ip addr".to_string())?;
        let length: u8 = length
            .trim()
            .parse()
            .map_err(|_| "malformed length".to_string())?;
        if length > Self::HOST_MASK {
            return Err(format!("prefix length {length} exceeds 32"));
        }

        Ok(Self::new(value, length))
    }
}

#[derive(
    Debug, Copy, Clone, Serialize, Deserialize, Hash, Eq, PartialEq,
)]
pub struct Prefix6 {
    pub value: Ipv6Addr,
    pub length: u8,
}

impl PartialOrd for Prefix6 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Prefix6 {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.value != other.value {
            return self.value.cmp(&other.value);
        }
        self.length.cmp(&other.length)
    }
}

impl fmt::Display for Prefix6 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.value, self.length)
    }
}

impl Prefix6 {
    pub const HOST_MASK: u8 = 128;

    /// Create a new `Prefix6` from an IP address and net mask.
    /// The newly created `Prefix6` will have its host bits zeroed upon creation
    /// e.g.
    /// ```
    /// use rov::types::Prefix6;
    /// use std::net::Ipv6Addr;
    /// use std::str::FromStr;
    /// let p6 = Prefix6::new(Ipv6Addr::from_str("2001:db8::1").unwrap(), 64);
    /// assert_eq!(p6.value, Ipv6Addr::from_str("2001:db8::").unwrap());
    /// ```
    pub fn new(ip: Ipv6Addr, length: u8) -> Self {
        let mut new = Self::new_unchecked(ip, length);
        new.unset_host_bits();
        new
    }

    /// Create a `Prefix6` keeping the address exactly as given.
    pub fn new_unchecked(ip: Ipv6Addr, length: u8) -> Self {
        Self { value: ip, length }
    }

    fn mask(length: u8) -> u128 {
        match length {
            0 => 0,
            l if l >= Self::HOST_MASK => !0u128,
            l => (!0u128) << (128 - l),
        }
    }

    pub fn host_bits_are_unset(&self) -> bool {
        self.value.to_bits() & Self::mask(self.length) == self.value.to_bits()
    }

    pub fn unset_host_bits(&mut self) {
        self.value =
            Ipv6Addr::from_bits(self.value.to_bits() & Self::mask(self.length))
    }

    /// Check if this prefix is contained within another prefix.
    /// Returns true if this prefix is equal to or more specific than the other.
    pub fn within(&self, other: &Prefix6) -> bool {
        if self.length < other.length {
            return false;
        }
        let mask = Self::mask(other.length);
        self.value.to_bits() & mask == other.value.to_bits() & mask
    }
}

impl FromStr for Prefix6 {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, length) =
            s.split_once('/').ok_or("malformed prefix".to_string())?;

        let value: Ipv6Addr = value
            .trim()
            .parse()
            .map_err(|_| "malformed ip addr".to_string())?;
        let length: u8 = length
            .trim()
            .parse()
            .map_err(|_| "malformed length".to_string())?;
        if length > Self::HOST_MASK {
            return Err(format!("prefix length {length} exceeds 128"));
        }

        Ok(Self::new(value, length))
    }
}

#[derive(
    Debug,
    Copy,
    Clone,
    Serialize,
    Deserialize,
    Eq,
    Hash,
    PartialEq,
    PartialOrd,
    Ord,
)]
pub enum Prefix {
    V4(Prefix4),
    V6(Prefix6),
}

impl std::fmt::Display for Prefix {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Prefix::V4(p) => p.fmt(f),
            Prefix::V6(p) => p.fmt(f),
        }
    }
}

impl FromStr for Prefix {
    type Err = Error;

    /// The family is chosen by syntax: anything carrying a ':' is IPv6.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = if s.contains(':') {
            s.parse::<Prefix6>().map(Self::V6)
        } else {
            s.parse::<Prefix4>().map(Self::V4)
        };
        parsed.map_err(|e| Error::MalformedPrefix(format!("{s}: {e}")))
    }
}

impl Prefix {
    pub fn length(&self) -> u8 {
        match self {
            Self::V4(p4) => p4.length,
            Self::V6(p6) => p6.length,
        }
    }

    pub fn family(&self) -> AddressFamily {
        match self {
            Self::V4(_) => AddressFamily::Ipv4,
            Self::V6(_) => AddressFamily::Ipv6,
        }
    }

    /// Check if this prefix is contained within another prefix.
    /// Returns true if this prefix is equal to or more specific than the other.
    /// Returns false for cross-family comparisons.
    pub fn within(&self, other: &Prefix) -> bool {
        match (self, other) {
            (Prefix::V4(a), Prefix::V4(b)) => a.within(b),
            (Prefix::V6(a), Prefix::V6(b)) => a.within(b),
            _ => false,
        }
    }
}

/// Represents the address family (protocol version) of a prefix. Status
/// counts are kept separately per family and never shared.
#[derive(
    Clone, Copy, Eq, Debug, Hash, Ord, PartialEq, PartialOrd, Serialize,
    Deserialize,
)]
pub enum AddressFamily {
    /// Internet Protocol Version 4 (IPv4)
    Ipv4,
    /// Internet Protocol Version 6 (IPv6)
    Ipv6,
}

impl AddressFamily {
    pub const ALL: [AddressFamily; 2] =
        [AddressFamily::Ipv4, AddressFamily::Ipv6];

    fn index(self) -> usize {
        match self {
            Self::Ipv4 => 0,
            Self::Ipv6 => 1,
        }
    }

    /// Short tag used in report column names.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Ipv4 => "v4",
            Self::Ipv6 => "v6",
        }
    }
}

/// Route origin validation outcome for a single prefix-origin pair.
#[derive(
    Clone, Copy, Eq, Debug, Hash, Ord, PartialEq, PartialOrd, Serialize,
    Deserialize,
)]
pub enum RpkiStatus {
    /// A covering ROA authorizes the origin at this length.
    Valid,
    /// The origin is authorized, but only for shorter prefixes.
    InvalidLength,
    /// Covering ROAs exist, none of them for this origin.
    InvalidAsn,
    /// No covering ROA exists.
    Unknown,
}

impl RpkiStatus {
    pub const ALL: [RpkiStatus; 4] = [
        RpkiStatus::Valid,
        RpkiStatus::InvalidLength,
        RpkiStatus::InvalidAsn,
        RpkiStatus::Unknown,
    ];

    fn index(self) -> usize {
        match self {
            Self::Valid => 0,
            Self::InvalidLength => 1,
            Self::InvalidAsn => 2,
            Self::Unknown => 3,
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::InvalidLength => "invalidLength",
            Self::InvalidAsn => "invalidASN",
            Self::Unknown => "unknown",
        }
    }
}

impl Display for RpkiStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Valid => "valid",
            Self::InvalidLength => "invalid-length",
            Self::InvalidAsn => "invalid-asn",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Per peer counters, one per (address family, status) bucket.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize,
)]
pub struct StatusCounts {
    buckets: [[u64; 4]; 2],
}

impl StatusCounts {
    pub fn increment(&mut self, family: AddressFamily, status: RpkiStatus) {
        self.buckets[family.index()][status.index()] += 1;
    }

    pub fn get(&self, family: AddressFamily, status: RpkiStatus) -> u64 {
        self.buckets[family.index()][status.index()]
    }

    pub fn merge(&mut self, other: &StatusCounts) {
        for (mine, theirs) in self.buckets.iter_mut().zip(other.buckets.iter())
        {
            for (a, b) in mine.iter_mut().zip(theirs.iter()) {
                *a += b;
            }
        }
    }

    pub fn total(&self) -> u64 {
        self.buckets.iter().flatten().sum()
    }

    /// Counters in report order: v4 valid, v4 invalid-length,
    /// v4 invalid-asn, v4 unknown, then the same four for v6.
    pub fn row(&self) -> [u64; 8] {
        let mut row = [0u64; 8];
        for (i, (af, status)) in report_columns().enumerate() {
            row[i] = self.get(af, status);
        }
        row
    }
}

/// The (family, status) pairs in report column order.
pub fn report_columns() -> impl Iterator<Item = (AddressFamily, RpkiStatus)> {
    AddressFamily::ALL
        .into_iter()
        .flat_map(|af| RpkiStatus::ALL.into_iter().map(move |s| (af, s)))
}

/// A validated ROA payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roa {
    pub prefix: Prefix,
    pub asn: u32,
    pub max_length: u8,
    pub ta: String,
}

/// A ROA as published in a validated ROA export, e.g.
/// `{"prefix": "10.0.0.0/8", "asn": "AS100", "maxLength": 24, "ta": "ripe"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoaRecord {
    pub prefix: String,
    pub asn: String,
    /// Kept wide so that an out of range value rejects only this record.
    /// Absent means the prefix length.
    #[serde(rename = "maxLength", default)]
    pub max_length: Option<i64>,
    #[serde(default)]
    pub ta: String,
}

impl RoaRecord {
    pub fn to_roa(&self) -> Result<Roa, Error> {
        let prefix: Prefix = self.prefix.parse()?;
        let asn = parse_roa_asn(&self.asn)?;
        let width = match prefix {
            Prefix::V4(_) => Prefix4::HOST_MASK,
            Prefix::V6(_) => Prefix6::HOST_MASK,
        };
        let max_length = match self.max_length {
            None => prefix.length(),
            Some(n) => u8::try_from(n)
                .ok()
                .filter(|m| *m <= width)
                .ok_or_else(|| {
                    Error::MalformedMaxLength(format!("{}: {n}", self.prefix))
                })?,
        };
        Ok(Roa {
            prefix,
            asn,
            max_length,
            ta: self.ta.clone(),
        })
    }
}

impl TryFrom<RoaRecord> for Roa {
    type Error = Error;

    fn try_from(value: RoaRecord) -> Result<Self, Self::Error> {
        value.to_roa()
    }
}

/// Parse the `AS<number>` form used by ROA exports.
pub fn parse_roa_asn(s: &str) -> Result<u32, Error> {
    let digits = s
        .strip_prefix("AS")
        .or_else(|| s.strip_prefix("as"))
        .ok_or_else(|| Error::MalformedOrigin(s.to_string()))?;
    parse_origin(digits)
}

/// Parse a bare origin AS number. AS sets such as `{1,2}` are rejected.
pub fn parse_origin(s: &str) -> Result<u32, Error> {
    s.trim()
        .parse()
        .map_err(|_| Error::MalformedOrigin(s.to_string()))
}

/// The `<prefix>|<origin>` key under which peers are tracked. The origin is
/// kept as text so that unparseable origins are only rejected at
/// aggregation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrefixOriginKey {
    pub prefix: String,
    pub origin: String,
}

impl PrefixOriginKey {
    pub const SEPARATOR: char = '|';

    pub fn new(prefix: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            origin: origin.into(),
        }
    }
}

impl Display for PrefixOriginKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.prefix, Self::SEPARATOR, self.origin)
    }
}

impl FromStr for PrefixOriginKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, origin) = s
            .split_once(Self::SEPARATOR)
            .ok_or_else(|| Error::MalformedOrigin(s.to_string()))?;
        Ok(Self::new(prefix, origin))
    }
}

/// A prefix-origin pair together with every peer that observed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triple {
    pub prefix: String,
    pub origin: String,
    pub peers: BTreeSet<String>,
}
