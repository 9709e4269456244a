//! Network topology: an isolated virtual network across availability zones.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::{Error, Result};

/// An IPv4 CIDR block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cidr {
    base: Ipv4Addr,
    prefix: u8,
}

impl Cidr {
    pub fn new(base: Ipv4Addr, prefix: u8) -> Result<Self> {
        if prefix > 32 {
            return Err(Error::invalid_value(
                "cidr",
                format!("prefix /{} is longer than 32 bits", prefix),
            ));
        }
        let mask = Self::mask(prefix);
        if u32::from(base) & !mask != 0 {
            return Err(Error::invalid_value(
                "cidr",
                format!("{}/{} has host bits set", base, prefix),
            ));
        }
        Ok(Self { base, prefix })
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Split into `count` equally sized sub-blocks (`count` rounded up to a power of two).
    pub fn split(&self, count: usize) -> Result<Vec<Cidr>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let too_small = || {
            Error::invalid_value(
                "cidr",
                format!("{} is too small to hold {} subnets", self, count),
            )
        };
        let extra_bits = count
            .checked_next_power_of_two()
            .ok_or_else(too_small)?
            .trailing_zeros() as u8;
        let prefix = self.prefix + extra_bits;
        if prefix > 28 {
            return Err(too_small());
        }
        let step = 1u32 << (32 - prefix);
        let base = u32::from(self.base);
        (0..count as u32)
            .map(|i| Cidr::new(Ipv4Addr::from(base + i * step), prefix))
            .collect()
    }

    fn mask(prefix: u8) -> u32 {
        if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - prefix)
        }
    }
}

impl std::fmt::Display for Cidr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.prefix)
    }
}

impl FromStr for Cidr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| Error::invalid_value("cidr", format!("'{}' has no prefix length", s)))?;
        let base = addr
            .parse::<Ipv4Addr>()
            .map_err(|e| Error::invalid_value("cidr", format!("'{}': {}", s, e)))?;
        let prefix = prefix
            .parse::<u8>()
            .map_err(|e| Error::invalid_value("cidr", format!("'{}': {}", s, e)))?;
        Cidr::new(base, prefix)
    }
}

impl TryFrom<String> for Cidr {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Cidr> for String {
    fn from(cidr: Cidr) -> Self {
        cidr.to_string()
    }
}

/// Kind of subnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubnetKind {
    /// Routes to the internet gateway; instances may get public IPs.
    Public,
    /// Egress-only through the NAT gateway of its zone.
    Private,
}

impl std::fmt::Display for SubnetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubnetKind::Public => write!(f, "Public"),
            SubnetKind::Private => write!(f, "Private"),
        }
    }
}

/// A subnet pinned to one availability zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub kind: SubnetKind,
    /// Zero-based availability zone index.
    pub zone: usize,
    pub cidr: Cidr,
}

impl Subnet {
    /// Construct-path name, e.g. `PublicSubnet1`.
    pub fn name(&self) -> String {
        format!("{}Subnet{}", self.kind, self.zone + 1)
    }
}

/// Declared network parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub name: String,
    pub cidr: Cidr,
    pub max_azs: usize,
}

/// A declared network, with its subnets laid out.
///
/// Each zone gets one public and one private subnet. The block is split
/// evenly, public subnets first, and every zone gets its own NAT gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    spec: NetworkSpec,
    subnets: Vec<Subnet>,
}

impl Network {
    pub fn new(spec: NetworkSpec) -> Result<Self> {
        if spec.max_azs == 0 {
            return Err(Error::invalid_value(
                "network max-azs",
                "at least one availability zone is required",
            ));
        }
        let subnet_count = spec.max_azs.checked_mul(2).ok_or_else(|| {
            Error::invalid_value("network max-azs", format!("{} zones is too many", spec.max_azs))
        })?;
        let blocks = spec.cidr.split(subnet_count)?;
        let mut subnets = Vec::with_capacity(blocks.len());
        for (i, cidr) in blocks.into_iter().enumerate() {
            let kind = if i < spec.max_azs {
                SubnetKind::Public
            } else {
                SubnetKind::Private
            };
            subnets.push(Subnet {
                kind,
                zone: i % spec.max_azs,
                cidr,
            });
        }
        Ok(Self { spec, subnets })
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn cidr(&self) -> Cidr {
        self.spec.cidr
    }

    pub fn zone_count(&self) -> usize {
        self.spec.max_azs
    }

    pub fn subnets(&self) -> &[Subnet] {
        &self.subnets
    }

    pub fn subnets_of(&self, kind: SubnetKind) -> impl Iterator<Item = &Subnet> {
        self.subnets.iter().filter(move |s| s.kind == kind)
    }
}
