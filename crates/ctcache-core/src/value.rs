//! Cached values and their canonical form
//!
//! Everything the cache stores goes through [`normalize_ip_range`] or
//! [`normalize_fqdn`] first. Both are pure functions: they never touch the
//! store and fail with [`Error::InvalidValue`] on malformed input.
//!
//! ## Canonical keys
//!
//! ```text
//! v4:0a000001-0a0000ff                                    10.0.0.1 - 10.0.0.255
//! v6:20010db8000000000000000000000001-2001...0001         2001:db8::1
//! fqdn:example.com                                        Example.COM.
//! ```
//!
//! IP keys are fixed-width lowercase hex, so lexical order of the key equals
//! numeric order within a family and every IPv4 range sorts before IPv6.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use crate::error::{Error, Result};

/// The two logical record types a container can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    /// IP address ranges (IPv4 or IPv6)
    #[serde(alias = "ip")]
    IpRange,
    /// Fully-qualified domain names
    Fqdn,
}

impl EntryType {
    /// Stable lowercase name, as used in config and output
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::IpRange => "ip_range",
            EntryType::Fqdn => "fqdn",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ip" | "ip_range" | "iprange" => Ok(EntryType::IpRange),
            "fqdn" => Ok(EntryType::Fqdn),
            other => Err(Error::invalid_value(format!(
                "unknown entry type '{other}' (expected ip_range or fqdn)"
            ))),
        }
    }
}

/// A normalized, inclusive IP range. Both ends are in the same family and
/// `from <= to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "IpRangeRepr")]
pub struct IpRange {
    from: IpAddr,
    to: IpAddr,
}

impl IpRange {
    /// First address of the range
    pub fn from(&self) -> IpAddr {
        self.from
    }

    /// Last address of the range
    pub fn to(&self) -> IpAddr {
        self.to
    }

    /// Whether the range covers exactly one address
    pub fn is_single_host(&self) -> bool {
        self.from == self.to
    }

    fn key(&self) -> String {
        let family = if self.from.is_ipv4() { "v4" } else { "v6" };
        format!("{family}:{}-{}", fixed_width_hex(self.from), fixed_width_hex(self.to))
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.from, self.to)
    }
}

/// A normalized FQDN: lowercase, no trailing dot, never empty
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "FqdnRepr")]
pub struct Fqdn {
    name: String,
}

impl Fqdn {
    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Fqdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Unvalidated wire shape; deserialized values are re-normalized
#[derive(Deserialize)]
struct IpRangeRepr {
    from: IpAddr,
    to: IpAddr,
}

impl TryFrom<IpRangeRepr> for IpRange {
    type Error = Error;

    fn try_from(repr: IpRangeRepr) -> Result<Self> {
        checked_range(repr.from, repr.to)
    }
}

#[derive(Deserialize)]
struct FqdnRepr {
    name: String,
}

impl TryFrom<FqdnRepr> for Fqdn {
    type Error = Error;

    fn try_from(repr: FqdnRepr) -> Result<Self> {
        normalize_fqdn(&repr.name)
    }
}

/// One cached value, in canonical form
///
/// Ordered IP ranges first (IPv4, then IPv6, by numeric start address),
/// then FQDNs (lexical).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheValue {
    IpRange(IpRange),
    Fqdn(Fqdn),
}

impl CacheValue {
    /// Normalize an IP range into a cache value
    pub fn ip_range(from_ip: &str, to_ip: &str) -> Result<Self> {
        normalize_ip_range(from_ip, to_ip).map(CacheValue::IpRange)
    }

    /// Normalize a domain name into a cache value
    pub fn fqdn(name: &str) -> Result<Self> {
        normalize_fqdn(name).map(CacheValue::Fqdn)
    }

    pub fn entry_type(&self) -> EntryType {
        match self {
            CacheValue::IpRange(_) => EntryType::IpRange,
            CacheValue::Fqdn(_) => EntryType::Fqdn,
        }
    }

    /// Canonical storage key. Two values are the same cache entry iff their
    /// keys are equal.
    pub fn key(&self) -> String {
        match self {
            CacheValue::IpRange(range) => range.key(),
            CacheValue::Fqdn(fqdn) => format!("fqdn:{}", fqdn.name),
        }
    }
}

impl fmt::Display for CacheValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheValue::IpRange(range) => range.fmt(f),
            CacheValue::Fqdn(fqdn) => fqdn.fmt(f),
        }
    }
}

/// Parse and canonicalize an IP range
///
/// Both endpoints must parse as the same address family. Surrounding
/// whitespace is ignored and IPv4 octets may carry leading zeros
/// (`010.000.000.001` is `10.0.0.1`, never octal). A reversed range is
/// rejected.
pub fn normalize_ip_range(from_ip: &str, to_ip: &str) -> Result<IpRange> {
    checked_range(parse_ip(from_ip)?, parse_ip(to_ip)?)
}

fn checked_range(from: IpAddr, to: IpAddr) -> Result<IpRange> {
    if from.is_ipv4() != to.is_ipv4() {
        return Err(Error::invalid_value(format!(
            "IP range mixes address families: {from} - {to}"
        )));
    }

    if from > to {
        return Err(Error::invalid_value(format!(
            "IP range start {from} is after its end {to}"
        )));
    }

    Ok(IpRange { from, to })
}

/// Canonicalize a domain name
///
/// Lowercases, strips one trailing dot and surrounding whitespace. Wildcard
/// labels such as `*.` are kept as literal text.
pub fn normalize_fqdn(name: &str) -> Result<Fqdn> {
    let trimmed = name.trim();
    let trimmed = trimmed.strip_suffix('.').unwrap_or(trimmed);

    if trimmed.is_empty() {
        return Err(Error::invalid_value(format!(
            "FQDN '{name}' is empty after normalization"
        )));
    }

    Ok(Fqdn {
        name: trimmed.to_ascii_lowercase(),
    })
}

fn fixed_width_hex(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => format!("{:08x}", u32::from(v4)),
        IpAddr::V6(v6) => format!("{:032x}", u128::from(v6)),
    }
}

fn parse_ip(text: &str) -> Result<IpAddr> {
    let text = text.trim();
    if let Ok(ip) = text.parse::<IpAddr>() {
        return Ok(ip);
    }

    parse_zero_padded_ipv4(text)
        .map(IpAddr::V4)
        .ok_or_else(|| Error::invalid_value(format!("'{text}' is not a valid IP address")))
}

/// std rejects `010.0.0.1`; the remote side and its users do not
fn parse_zero_padded_ipv4(text: &str) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    let mut parts = text.split('.');

    for octet in &mut octets {
        let part = parts.next()?;
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *octet = part.parse().ok()?;
    }

    if parts.next().is_some() {
        return None;
    }

    Some(Ipv4Addr::from(octets))
}
