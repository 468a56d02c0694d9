//! IPv4 range expansion for peer targets.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// Largest range expanded in one go (a /16). Anything bigger is a configuration error.
pub const MAX_RANGE_LEN: u64 = 65_536;

/// Inclusive address range with exclusions.
///
/// `subnet_mask` is carried for the operator's reference only; it is not checked
/// against `start_ip`/`end_ip`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpRange {
    pub enabled: bool,
    pub start_ip: Ipv4Addr,
    pub end_ip: Ipv4Addr,
    pub exclude_ips: Vec<Ipv4Addr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnet_mask: Option<String>,
}

impl Default for IpRange {
    fn default() -> Self {
        Self {
            enabled: false,
            start_ip: Ipv4Addr::new(192, 168, 1, 100),
            end_ip: Ipv4Addr::new(192, 168, 1, 200),
            exclude_ips: Vec::new(),
            subnet_mask: None,
        }
    }
}

/// Expand `[start, end]` into ascending addresses, minus `excluded`.
pub fn expand(
    start: Ipv4Addr,
    end: Ipv4Addr,
    excluded: &[Ipv4Addr],
) -> Result<Vec<Ipv4Addr>, RangeError> {
    let (s, e) = (u32::from(start), u32::from(end));
    if s > e {
        return Err(RangeError::Inverted { start, end });
    }
    let len = u64::from(e - s) + 1;
    if len > MAX_RANGE_LEN {
        return Err(RangeError::TooLarge { len });
    }
    let excluded: HashSet<u32> = excluded.iter().map(|&ip| u32::from(ip)).collect();
    Ok((s..=e)
        .filter(|ip| !excluded.contains(ip))
        .map(Ipv4Addr::from)
        .collect())
}

/// Where a target list came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Targets {
    /// Expanded from an enabled range.
    Range(Vec<Ipv4Addr>),
    /// Range disabled; the explicit list.
    Configured(Vec<Ipv4Addr>),
    /// Range enabled but invalid; the explicit list.
    Fallback(RangeError, Vec<Ipv4Addr>),
}

impl Targets {
    pub fn addrs(&self) -> &[Ipv4Addr] {
        match self {
            Targets::Range(v) | Targets::Configured(v) | Targets::Fallback(_, v) => v,
        }
    }

    pub fn into_addrs(self) -> Vec<Ipv4Addr> {
        match self {
            Targets::Range(v) | Targets::Configured(v) | Targets::Fallback(_, v) => v,
        }
    }

    pub fn from_range(&self) -> bool {
        matches!(self, Targets::Range(_))
    }
}

impl IpRange {
    pub fn expand(&self) -> Result<Vec<Ipv4Addr>, RangeError> {
        expand(self.start_ip, self.end_ip, &self.exclude_ips)
    }

    /// Resolve candidate targets: the expanded range when enabled and valid,
    /// otherwise `configured` unchanged.
    pub fn targets(&self, configured: &[Ipv4Addr]) -> Targets {
        if !self.enabled {
            return Targets::Configured(configured.to_vec());
        }
        match self.expand() {
            Ok(v) => Targets::Range(v),
            Err(e) => Targets::Fallback(e, configured.to_vec()),
        }
    }
}

/// Error expanding a configured range.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("range start {start} is after end {end}")]
    Inverted { start: Ipv4Addr, end: Ipv4Addr },
    #[error("range of {len} addresses exceeds the limit of {MAX_RANGE_LEN}")]
    TooLarge { len: u64 },
}
