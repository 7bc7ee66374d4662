// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Configuration-owned lookup rows: subnets and allocation pools.

use std::net::IpAddr;

use ipnet::IpNet;
use netbind_utils::span::Span;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    addr::{AddrFamily, ip_key},
    ids::{PoolId, ScopeName},
};

/// A configured subnet. Keyed by its CIDR network in the dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    /// Human-readable subnet name.
    pub name: String,
    /// The CIDR network.
    pub cidr: IpNet,
}

impl Subnet {
    /// Creates a subnet.
    pub fn new(name: impl Into<String>, cidr: IpNet) -> Self {
        Self {
            name: name.into(),
            cidr,
        }
    }
}

/// Pool definition errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    /// Range bounds out of order.
    #[error("range low {low} is above range high {high}")]
    BoundsOutOfOrder {
        /// The low bound.
        low: IpAddr,
        /// The high bound.
        high: IpAddr,
    },
    /// Range bound outside the pool's network.
    #[error("{addr} is not inside the network {network}")]
    OutsideNetwork {
        /// The offending bound.
        addr: IpAddr,
        /// The pool's network.
        network: IpNet,
    },
    /// Range bound of a different family than the network.
    #[error("{addr} is not an {family} address")]
    MixedFamily {
        /// The offending bound.
        addr: IpAddr,
        /// The network's family.
        family: AddrFamily,
    },
    /// IPv6 range bound inside the IPv4-mapped block, which is reserved for
    /// keying IPv4 addresses.
    #[error("{addr} lies in the IPv4-mapped IPv6 block")]
    Ipv4Mapped {
        /// The offending bound.
        addr: IpAddr,
    },
}

/// One administratively defined allocation pool: a subnet's network split
/// into an inclusive static range and an inclusive dynamic sub-range.
///
/// Bounds are validated on construction, so the span accessors are
/// infallible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    /// Row identifier, assigned by the dataset on insert.
    pub id: PoolId,
    /// The allocation scope this pool is observed and reconciled under.
    pub scope: ScopeName,
    /// The network, identical to the owning subnet's CIDR.
    pub network: IpNet,
    /// Low bound of the static range.
    pub static_low: IpAddr,
    /// High bound of the static range.
    pub static_high: IpAddr,
    /// Low bound of the dynamic range, reserved for DHCP.
    pub dynamic_low: IpAddr,
    /// High bound of the dynamic range, reserved for DHCP.
    pub dynamic_high: IpAddr,
}

impl Pool {
    /// Creates a pool, validating that both ranges are ordered, match the
    /// network's family, and lie inside the network.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scope: ScopeName,
        network: IpNet,
        static_low: IpAddr,
        static_high: IpAddr,
        dynamic_low: IpAddr,
        dynamic_high: IpAddr,
    ) -> Result<Self, PoolError> {
        let family = match network {
            IpNet::V4(_) => AddrFamily::V4,
            IpNet::V6(_) => AddrFamily::V6,
        };
        for (low, high) in [(static_low, static_high), (dynamic_low, dynamic_high)] {
            for addr in [low, high] {
                if AddrFamily::of(addr) != family {
                    return Err(PoolError::MixedFamily { addr, family });
                }
                // The numeric key space maps IPv4 into the IPv4-mapped IPv6
                // block, so genuine IPv6 bounds must stay out of it or the
                // keys of a free search would decode as IPv4 addresses.
                if let IpAddr::V6(v6) = addr {
                    if v6.to_ipv4_mapped().is_some() {
                        return Err(PoolError::Ipv4Mapped { addr });
                    }
                }
                if !network.contains(&addr) {
                    return Err(PoolError::OutsideNetwork { addr, network });
                }
            }
            if ip_key(low) > ip_key(high) {
                return Err(PoolError::BoundsOutOfOrder { low, high });
            }
        }
        Ok(Self {
            id: PoolId::default(),
            scope,
            network,
            static_low,
            static_high,
            dynamic_low,
            dynamic_high,
        })
    }

    /// Returns the pool's address family.
    pub fn family(&self) -> AddrFamily {
        match self.network {
            IpNet::V4(_) => AddrFamily::V4,
            IpNet::V6(_) => AddrFamily::V6,
        }
    }

    /// Returns the static range as a key span.
    pub fn static_span(&self) -> Span<u128> {
        Span {
            first: ip_key(self.static_low),
            last: ip_key(self.static_high),
        }
    }

    /// Returns the dynamic range as a key span.
    pub fn dynamic_span(&self) -> Span<u128> {
        Span {
            first: ip_key(self.dynamic_low),
            last: ip_key(self.dynamic_high),
        }
    }

    /// Returns the statically allocatable key spans in ascending order: the
    /// static range with the dynamic sub-range punched out.
    pub fn allocatable_spans(&self) -> Vec<Span<u128>> {
        self.static_span().without(&self.dynamic_span())
    }

    /// Returns true if the address lies in the statically allocatable part
    /// of the pool.
    pub fn allocatable_contains(&self, addr: IpAddr) -> bool {
        let key = ip_key(addr);
        self.static_span().contains(key) && !self.dynamic_span().contains(key)
    }
}
