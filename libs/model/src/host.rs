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
//! Hosts and fully-qualified names.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{DomainName, HostId, InterfaceId};

/// A provisioned machine: a hostname in a domain plus its interfaces
/// (referenced from the interface side).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// Row identifier, assigned by the dataset on insert.
    pub id: HostId,
    /// Unqualified hostname, unique within the domain.
    pub hostname: String,
    /// The DNS domain the host belongs to.
    pub domain: DomainName,
    /// The interface the host was provisioned from, if known.
    pub boot_interface: Option<InterfaceId>,
    /// Whether IPv4 addressing is administratively disabled for this host.
    pub disable_ipv4: bool,
}

impl Host {
    /// Creates a host with no boot interface and IPv4 enabled.
    pub fn new(hostname: impl Into<String>, domain: DomainName) -> Self {
        Self {
            id: HostId::default(),
            hostname: hostname.into(),
            domain,
            boot_interface: None,
            disable_ipv4: false,
        }
    }

    /// Disables IPv4 addressing for this host.
    pub fn without_ipv4(mut self) -> Self {
        self.disable_ipv4 = true;
        self
    }

    /// Returns the host's fully-qualified name.
    pub fn fqdn(&self) -> Fqdn {
        Fqdn {
            hostname: self.hostname.clone(),
            domain: self.domain.clone(),
        }
    }
}

/// A fully-qualified DNS name: hostname plus domain.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fqdn {
    /// The unqualified hostname.
    pub hostname: String,
    /// The domain.
    pub domain: DomainName,
}

impl Fqdn {
    /// Creates a fully-qualified name.
    pub fn new(hostname: impl Into<String>, domain: DomainName) -> Self {
        Self {
            hostname: hostname.into(),
            domain,
        }
    }
}

impl fmt::Display for Fqdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.hostname, self.domain)
    }
}
