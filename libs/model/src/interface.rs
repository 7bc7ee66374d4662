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
//! Network interfaces and the tagged interface kind.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    addr::MacAddr,
    ids::{HostId, InterfaceId, RecordId},
};

/// The kind of a network interface.
///
/// Composite kinds carry their parent references in the variant; parent
/// resolution is [InterfaceKind::parents], not dynamic dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InterfaceKind {
    /// A NIC with its own hardware.
    Physical,
    /// Placeholder for a hardware address observed in leases but not
    /// configured on any host.
    Unknown,
    /// Link aggregate over several parent interfaces.
    Bond {
        /// The aggregated interfaces.
        parents: BTreeSet<InterfaceId>,
    },
    /// Layer-2 bridge over several parent interfaces.
    Bridge {
        /// The bridged interfaces.
        parents: BTreeSet<InterfaceId>,
    },
    /// Tagged sub-interface layered on a single parent.
    Vlan {
        /// The underlying interface.
        parent: InterfaceId,
    },
}

impl InterfaceKind {
    /// Returns the resolved parent set. Empty for kinds that own their
    /// hardware.
    pub fn parents(&self) -> Vec<InterfaceId> {
        match self {
            Self::Physical | Self::Unknown => Vec::new(),
            Self::Bond { parents } | Self::Bridge { parents } => parents.iter().copied().collect(),
            Self::Vlan { parent } => vec![*parent],
        }
    }

    /// Returns true for kinds whose reachability derives from parents.
    pub fn is_composite(&self) -> bool {
        !matches!(self, Self::Physical | Self::Unknown)
    }

    /// Returns true for link aggregates (bond, bridge). VLANs are composite
    /// but not aggregates.
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Self::Bond { .. } | Self::Bridge { .. })
    }

    /// Returns true for the lease placeholder kind.
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Returns true for configured NICs with their own hardware.
    pub fn is_physical(&self) -> bool {
        matches!(self, Self::Physical)
    }
}

/// One network interface and its attached address records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    /// Row identifier, assigned by the dataset on insert.
    pub id: InterfaceId,
    /// Interface name, e.g. `eth0` or `bond0`.
    pub name: String,
    /// Hardware address the interface transmits with.
    pub mac: MacAddr,
    /// The tagged kind, carrying parent references for composites.
    pub kind: InterfaceKind,
    /// The owning host; None for "unknown" placeholders.
    pub host: Option<HostId>,
    /// Records attached to this interface.
    pub records: BTreeSet<RecordId>,
    /// Whether the interface is administratively enabled.
    pub enabled: bool,
}

impl Interface {
    /// Creates an enabled interface with no host and no records.
    pub fn new(name: impl Into<String>, mac: MacAddr, kind: InterfaceKind) -> Self {
        Self {
            id: InterfaceId::default(),
            name: name.into(),
            mac,
            kind,
            host: None,
            records: BTreeSet::new(),
            enabled: true,
        }
    }

    /// Sets the owning host.
    pub fn with_host(mut self, host: HostId) -> Self {
        self.host = Some(host);
        self
    }

    /// Marks the interface administratively disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}
