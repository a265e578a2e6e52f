//! IPv4 CIDR blocks

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use keel_common::Error;

/// An IPv4 network in CIDR notation
///
/// Host bits are masked off on parse, so `10.0.0.7/24` equals `10.0.0.0/24`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ipv4Cidr {
    network: u32,
    prefix: u8,
}

impl Ipv4Cidr {
    /// Build from an address and prefix length
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self, Error> {
        if prefix > 32 {
            return Err(Error::validation_for_field(
                format!("{addr}/{prefix}"),
                "cidr",
                "prefix length must be between 0 and 32",
            ));
        }
        let network = u32::from(addr) & mask(prefix);
        Ok(Self { network, prefix })
    }

    /// Network address
    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.network)
    }

    /// Prefix length
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Number of addresses in the block
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix))
    }

    /// Whether `other` lies entirely inside this block
    pub fn contains(&self, other: &Ipv4Cidr) -> bool {
        self.prefix <= other.prefix && (other.network & mask(self.prefix)) == self.network
    }

    /// Whether the two blocks share any address
    ///
    /// Two CIDR blocks either nest or are disjoint, so overlap is containment
    /// in one direction or the other.
    pub fn overlaps(&self, other: &Ipv4Cidr) -> bool {
        self.contains(other) || other.contains(self)
    }
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

impl FromStr for Ipv4Cidr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::validation_for_field(s, "cidr", "invalid IPv4 CIDR block");
        let (addr, prefix) = s.trim().split_once('/').ok_or_else(invalid)?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
        Self::new(addr, prefix)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network(), self.prefix)
    }
}
