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
//! Address records and allocation kinds.

use std::{fmt, net::IpAddr};

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::{
    addr::AddrFamily,
    ids::{Principal, RecordId},
};

/// How an address record came to exist and how long it is meant to live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationKind {
    /// Automatically assigned static address.
    Auto,
    /// Persistent static address.
    Sticky,
    /// Static address reserved by a principal.
    UserReserved,
    /// Marker that an interface configures itself over DHCP; carries no
    /// address value.
    Dhcp,
    /// Ephemeral address learned from an observed DHCP lease.
    Discovered,
}

impl AllocationKind {
    /// Returns true if records of this kind may be handed out by the
    /// allocator. DHCP markers and discovered leases may not.
    pub fn is_allocatable(&self) -> bool {
        matches!(self, Self::Auto | Self::Sticky | Self::UserReserved)
    }

    /// Returns true if records of this kind must carry a principal.
    pub fn requires_principal(&self) -> bool {
        matches!(self, Self::UserReserved)
    }
}

impl fmt::Display for AllocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auto => "AUTO",
            Self::Sticky => "STICKY",
            Self::UserReserved => "USER_RESERVED",
            Self::Dhcp => "DHCP",
            Self::Discovered => "DISCOVERED",
        };
        write!(f, "{name}")
    }
}

/// One address binding: a value (possibly still unset), the kind of binding,
/// and the subnet it belongs to.
///
/// Attachment to interfaces is stored on the interface side; a record does
/// not know its holders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    /// Row identifier, assigned by the dataset on insert.
    pub id: RecordId,
    /// The bound address, or None for placeholders and DHCP markers.
    pub value: Option<IpAddr>,
    /// The allocation kind.
    pub kind: AllocationKind,
    /// The owning principal; required for USER_RESERVED, absent otherwise.
    pub principal: Option<Principal>,
    /// The subnet this binding belongs to. Survives value clearing.
    pub subnet: IpNet,
}

impl AddressRecord {
    /// Creates a record of the given kind in the given subnet, with no value
    /// and no principal.
    pub fn new(kind: AllocationKind, subnet: IpNet) -> Self {
        Self {
            id: RecordId::default(),
            value: None,
            kind,
            principal: None,
            subnet,
        }
    }

    /// Sets the address value.
    pub fn with_value(mut self, value: IpAddr) -> Self {
        self.value = Some(value);
        self
    }

    /// Sets the owning principal.
    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Returns the address family of this record's subnet.
    pub fn family(&self) -> AddrFamily {
        match self.subnet {
            IpNet::V4(_) => AddrFamily::V4,
            IpNet::V6(_) => AddrFamily::V6,
        }
    }

    /// Returns true if the record currently holds an address value.
    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }
}
