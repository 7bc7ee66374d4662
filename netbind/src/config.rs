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
//! Loading of the administrator-defined configuration.
//!
//! The configuration is one JSON document listing domains, subnets, pools,
//! and optionally hosts with their interfaces. Loading validates the
//! references between them and seeds a fresh store in one transaction.

use std::{collections::BTreeMap, fs, net::IpAddr, path::Path};

use anyhow::{Context, bail};
use ipnet::IpNet;
use netbind_model::{
    DomainName, Host, Interface, InterfaceId, InterfaceKind, MacAddr, Pool, ScopeName, Subnet,
};
use netbind_store::store::MemStore;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigDto {
    #[serde(default)]
    domains: Vec<String>,
    #[serde(default)]
    subnets: Vec<SubnetDto>,
    #[serde(default)]
    pools: Vec<PoolDto>,
    #[serde(default)]
    hosts: Vec<HostDto>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SubnetDto {
    name: String,
    cidr: IpNet,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PoolDto {
    scope: String,
    subnet: String,
    static_low: IpAddr,
    static_high: IpAddr,
    dynamic_low: IpAddr,
    dynamic_high: IpAddr,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HostDto {
    hostname: String,
    domain: String,
    #[serde(default)]
    disable_ipv4: bool,
    #[serde(default)]
    interfaces: Vec<InterfaceDto>,
    #[serde(default)]
    boot_interface: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InterfaceDto {
    name: String,
    mac: MacAddr,
    #[serde(default)]
    kind: InterfaceKindDto,
    /// Parent interface names; only valid for composite kinds. Parents must
    /// be declared before the composites referencing them.
    #[serde(default)]
    parents: Vec<String>,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum InterfaceKindDto {
    #[default]
    Physical,
    Bond,
    Bridge,
    Vlan,
}

fn default_enabled() -> bool {
    true
}

/// Loads a configuration document and seeds a fresh store with it.
pub fn load_str(raw: &str) -> anyhow::Result<MemStore> {
    let dto: ConfigDto = serde_json::from_str(raw).context("parse configuration")?;
    let store = MemStore::new();
    seed(&store, &dto)?;
    debug!(
        domains = dto.domains.len(),
        subnets = dto.subnets.len(),
        pools = dto.pools.len(),
        hosts = dto.hosts.len(),
        "configuration loaded"
    );
    Ok(store)
}

/// Loads a configuration document from a file.
pub fn load_path(path: impl AsRef<Path>) -> anyhow::Result<MemStore> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read configuration file {}", path.display()))?;
    load_str(&raw)
}

fn seed(store: &MemStore, dto: &ConfigDto) -> anyhow::Result<()> {
    let mut txn = store.begin();

    for domain in &dto.domains {
        txn.add_domain(DomainName::from(domain.as_str()));
    }

    let mut subnets: BTreeMap<&str, IpNet> = BTreeMap::new();
    for subnet in &dto.subnets {
        if subnets.insert(&subnet.name, subnet.cidr).is_some() {
            bail!("subnet {} declared twice", subnet.name);
        }
        txn.add_subnet(Subnet::new(&subnet.name, subnet.cidr));
    }

    for pool in &dto.pools {
        let network = subnets.get(pool.subnet.as_str()).with_context(|| {
            format!(
                "pool in scope {} references unknown subnet {}",
                pool.scope, pool.subnet
            )
        })?;
        let pool = Pool::new(
            ScopeName::from(pool.scope.as_str()),
            *network,
            pool.static_low,
            pool.static_high,
            pool.dynamic_low,
            pool.dynamic_high,
        )
        .with_context(|| format!("invalid pool in scope {}", pool.scope))?;
        txn.add_pool(pool);
    }

    for host in &dto.hosts {
        let domain = DomainName::from(host.domain.as_str());
        if !txn.data().has_domain(&domain) {
            bail!(
                "host {} references unknown domain {}",
                host.hostname,
                host.domain
            );
        }
        let mut row = Host::new(&host.hostname, domain);
        row.disable_ipv4 = host.disable_ipv4;
        let host_id = txn.add_host(row);

        let mut by_name: BTreeMap<&str, InterfaceId> = BTreeMap::new();
        for iface in &host.interfaces {
            if iface.kind == InterfaceKindDto::Physical && !iface.parents.is_empty() {
                bail!(
                    "physical interface {} on host {} must not declare parents",
                    iface.name,
                    host.hostname
                );
            }
            let mut parents = Vec::new();
            for parent in &iface.parents {
                let id = by_name.get(parent.as_str()).with_context(|| {
                    format!(
                        "interface {} on host {} references unknown parent {}",
                        iface.name, host.hostname, parent
                    )
                })?;
                parents.push(*id);
            }
            let kind = match iface.kind {
                InterfaceKindDto::Physical => InterfaceKind::Physical,
                InterfaceKindDto::Bond => InterfaceKind::Bond {
                    parents: parents.iter().copied().collect(),
                },
                InterfaceKindDto::Bridge => InterfaceKind::Bridge {
                    parents: parents.iter().copied().collect(),
                },
                InterfaceKindDto::Vlan => match parents.as_slice() {
                    [parent] => InterfaceKind::Vlan { parent: *parent },
                    _ => bail!(
                        "VLAN interface {} on host {} needs exactly one parent",
                        iface.name,
                        host.hostname
                    ),
                },
            };
            let mut row = Interface::new(&iface.name, iface.mac, kind).with_host(host_id);
            row.enabled = iface.enabled;
            let id = txn.add_interface(row);
            if by_name.insert(&iface.name, id).is_some() {
                bail!(
                    "interface {} declared twice on host {}",
                    iface.name,
                    host.hostname
                );
            }
        }

        if let Some(boot) = &host.boot_interface {
            let id = by_name.get(boot.as_str()).with_context(|| {
                format!(
                    "host {} references unknown boot interface {}",
                    host.hostname, boot
                )
            })?;
            if let Some(row) = txn.host_mut(host_id) {
                row.boot_interface = Some(*id);
            }
        }
    }

    txn.commit().context("commit configuration")?;
    Ok(())
}
