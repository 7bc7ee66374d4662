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
//! Resolution of the canonical addresses to publish under DNS names.

use std::{
    collections::{BTreeMap, BTreeSet},
    net::IpAddr,
};

use ipnet::IpNet;
use netbind_model::{
    AddrFamily, AllocationKind, DomainName, Fqdn, Host, Interface, InterfaceKind, RecordId,
    addr::address_label,
};
use netbind_store::{dataset::Dataset, store::MemStore};

/// What to resolve the mapping for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingScope {
    /// All hosts of a domain, plus synthetic entries for reserved-but-
    /// unattached addresses.
    Domain(DomainName),
    /// Hosts with a winning address inside the subnet; the published sets are
    /// restricted to that subnet and no synthetic entries are included.
    Subnet(IpNet),
}

/// Resolves hostname/address mappings from one point-in-time snapshot.
///
/// Read-only; takes no locks and raises no domain errors. A host without a
/// resolvable address is simply absent from the result.
#[derive(Debug, Clone)]
pub struct Resolver {
    store: MemStore,
}

impl Resolver {
    /// Creates a resolver over the given store.
    pub fn new(store: MemStore) -> Self {
        Self { store }
    }

    /// Computes the mapping from fully-qualified name to published addresses.
    pub fn resolve_mapping(&self, scope: &MappingScope) -> BTreeMap<Fqdn, BTreeSet<IpAddr>> {
        resolve_mapping_in(&self.store.snapshot(), scope)
    }
}

/// [Resolver::resolve_mapping] over an explicit snapshot.
pub fn resolve_mapping_in(
    data: &Dataset,
    scope: &MappingScope,
) -> BTreeMap<Fqdn, BTreeSet<IpAddr>> {
    let mut mapping: BTreeMap<Fqdn, BTreeSet<IpAddr>> = BTreeMap::new();

    let hosts: Vec<&Host> = match scope {
        MappingScope::Domain(domain) => data.hosts_in_domain(domain).collect(),
        MappingScope::Subnet(_) => data.hosts().collect(),
    };
    for host in hosts {
        let mut winners = BTreeSet::new();
        for family in [AddrFamily::V4, AddrFamily::V6] {
            if family == AddrFamily::V4 && host.disable_ipv4 {
                continue;
            }
            if let Some(addr) = family_winner(data, host, family) {
                winners.insert(addr);
            }
        }
        if let MappingScope::Subnet(net) = scope {
            winners.retain(|addr| net.contains(addr));
        }
        if !winners.is_empty() {
            mapping.insert(host.fqdn(), winners);
        }
    }

    // Reserved addresses nobody claimed yet stay visible under a name derived
    // from the address itself, independent of subnet.
    if let MappingScope::Domain(domain) = scope {
        for record in data.records() {
            if record.kind != AllocationKind::UserReserved {
                continue;
            }
            let Some(value) = record.value else {
                continue;
            };
            let attached_to_host = data.holders_of(record.id).any(|iface| iface.host.is_some());
            if !attached_to_host {
                mapping
                    .entry(Fqdn::new(address_label(value), domain.clone()))
                    .or_default()
                    .insert(value);
            }
        }
    }

    mapping
}

/// Picks the host's winning address of one family: best interface tier, then
/// best kind tier, then the oldest record.
fn family_winner(data: &Dataset, host: &Host, family: AddrFamily) -> Option<IpAddr> {
    let mut best: Option<((u8, u8, RecordId), IpAddr)> = None;
    for iface in data.interfaces() {
        if !iface.enabled {
            continue;
        }
        let Some(iface_tier) = interface_tier(data, host, iface) else {
            continue;
        };
        for record in data.records_on(iface) {
            let Some(value) = record.value else {
                continue;
            };
            if AddrFamily::of(value) != family {
                continue;
            }
            let Some(kind_tier) = kind_tier(record.kind) else {
                continue;
            };
            let rank = (iface_tier, kind_tier, record.id);
            if best.as_ref().is_none_or(|(leader, _)| rank < *leader) {
                best = Some((rank, value));
            }
        }
    }
    best.map(|(_, value)| value)
}

/// Ranks an interface as an address candidate for the host, or rules it out.
///
/// Tiers, best first: an aggregate carrying the boot interface, the boot
/// interface itself, other fully-owned aggregates, other physical interfaces,
/// VLANs on the host's interfaces. Composites with foreign parents are ruled
/// out entirely.
fn interface_tier(data: &Dataset, host: &Host, iface: &Interface) -> Option<u8> {
    let boot = host.boot_interface;
    match &iface.kind {
        InterfaceKind::Physical => {
            if iface.host != Some(host.id) {
                return None;
            }
            if boot == Some(iface.id) { Some(1) } else { Some(3) }
        }
        InterfaceKind::Unknown => None,
        InterfaceKind::Bond { parents } | InterfaceKind::Bridge { parents } => {
            if parents.is_empty() {
                return None;
            }
            let fully_owned = parents.iter().all(|parent| {
                data.interface(*parent)
                    .is_some_and(|parent| parent.host == Some(host.id))
            });
            if !fully_owned {
                return None;
            }
            let carries_boot =
                boot.is_some_and(|boot| parents.contains(&boot) || boot == iface.id);
            if carries_boot { Some(0) } else { Some(2) }
        }
        InterfaceKind::Vlan { parent } => {
            let owned = data
                .interface(*parent)
                .is_some_and(|parent| parent.host == Some(host.id));
            if owned { Some(4) } else { None }
        }
    }
}

/// Ranks an address record kind, or rules it out as a candidate.
fn kind_tier(kind: AllocationKind) -> Option<u8> {
    match kind {
        AllocationKind::Sticky | AllocationKind::UserReserved => Some(0),
        AllocationKind::Auto => Some(1),
        AllocationKind::Discovered => Some(2),
        AllocationKind::Dhcp => None,
    }
}

#[cfg(test)]
mod tests {
    use netbind_model::{AddressRecord, MacAddr, Principal, Subnet};
    use netbind_store::store::Transaction;
    use pretty_assertions::assert_eq;
    use test_log::test;

    use crate::graph;

    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().expect("Should parse address")
    }

    fn net(s: &str) -> IpNet {
        s.parse().expect("Should parse network")
    }

    fn mac(i: u8) -> MacAddr {
        MacAddr::new([0xaa, 0, 0, 0, 0, i])
    }

    fn domain() -> DomainName {
        DomainName::from("example.com")
    }

    fn seeded_store() -> MemStore {
        let store = MemStore::new();
        let mut txn = store.begin();
        txn.add_domain(domain());
        txn.add_subnet(Subnet::new("lab", net("10.0.0.0/24")));
        txn.add_subnet(Subnet::new("lab6", net("2001:db8::/64")));
        txn.commit().expect("Should commit seed");
        store
    }

    fn add_record(
        txn: &mut Transaction,
        iface: netbind_model::InterfaceId,
        kind: AllocationKind,
        value: &str,
    ) -> RecordId {
        let value = ip(value);
        let subnet = match value {
            IpAddr::V4(_) => net("10.0.0.0/24"),
            IpAddr::V6(_) => net("2001:db8::/64"),
        };
        let mut record = AddressRecord::new(kind, subnet).with_value(value);
        if kind == AllocationKind::UserReserved {
            record = record.with_principal(Principal::from("admin"));
        }
        let record = txn.add_record(record);
        graph::attach(txn, iface, record);
        record
    }

    fn fqdn(hostname: &str) -> Fqdn {
        Fqdn::new(hostname, domain())
    }

    fn addrs(values: &[&str]) -> BTreeSet<IpAddr> {
        values.iter().map(|v| ip(v)).collect()
    }

    #[test]
    fn test_boot_interface_beats_other_physical() {
        let store = seeded_store();
        let mut txn = store.begin();
        let host = txn.add_host(Host::new("node01", domain()));
        let boot = txn.add_interface(
            Interface::new("eth0", mac(1), InterfaceKind::Physical).with_host(host),
        );
        let other = txn.add_interface(
            Interface::new("eth1", mac(2), InterfaceKind::Physical).with_host(host),
        );
        txn.host_mut(host).expect("Should find host").boot_interface = Some(boot);
        add_record(&mut txn, boot, AllocationKind::Sticky, "10.0.0.90");
        add_record(&mut txn, other, AllocationKind::Auto, "10.0.0.91");
        txn.commit().expect("Should commit");

        let mapping = Resolver::new(store).resolve_mapping(&MappingScope::Domain(domain()));
        assert_eq!(
            mapping,
            BTreeMap::from([(fqdn("node01"), addrs(&["10.0.0.90"]))])
        );
    }

    #[test]
    fn test_interface_tier_dominates_kind_tier() {
        let store = seeded_store();
        let mut txn = store.begin();
        let host = txn.add_host(Host::new("node01", domain()));
        let boot = txn.add_interface(
            Interface::new("eth0", mac(1), InterfaceKind::Physical).with_host(host),
        );
        let other = txn.add_interface(
            Interface::new("eth1", mac(2), InterfaceKind::Physical).with_host(host),
        );
        txn.host_mut(host).expect("Should find host").boot_interface = Some(boot);
        // The boot interface only has a lease-discovered address, the other a
        // STICKY one. The boot interface still wins.
        add_record(&mut txn, boot, AllocationKind::Discovered, "10.0.0.50");
        add_record(&mut txn, other, AllocationKind::Sticky, "10.0.0.91");
        txn.commit().expect("Should commit");

        let mapping = Resolver::new(store).resolve_mapping(&MappingScope::Domain(domain()));
        assert_eq!(
            mapping,
            BTreeMap::from([(fqdn("node01"), addrs(&["10.0.0.50"]))])
        );
    }

    #[test]
    fn test_fully_owned_bond_with_boot_parent_beats_boot() {
        let store = seeded_store();
        let mut txn = store.begin();
        let host = txn.add_host(Host::new("node01", domain()));
        let a = txn.add_interface(
            Interface::new("eth0", mac(1), InterfaceKind::Physical).with_host(host),
        );
        let b = txn.add_interface(
            Interface::new("eth1", mac(2), InterfaceKind::Physical).with_host(host),
        );
        let bond = txn.add_interface(
            Interface::new(
                "bond0",
                mac(1),
                InterfaceKind::Bond {
                    parents: BTreeSet::from([a, b]),
                },
            )
            .with_host(host),
        );
        txn.host_mut(host).expect("Should find host").boot_interface = Some(a);
        add_record(&mut txn, bond, AllocationKind::Sticky, "10.0.0.92");
        add_record(&mut txn, a, AllocationKind::Sticky, "10.0.0.90");
        add_record(&mut txn, b, AllocationKind::Sticky, "10.0.0.91");
        txn.commit().expect("Should commit");

        let mapping = Resolver::new(store).resolve_mapping(&MappingScope::Domain(domain()));
        assert_eq!(
            mapping,
            BTreeMap::from([(fqdn("node01"), addrs(&["10.0.0.92"]))])
        );
    }

    #[test]
    fn test_bond_with_foreign_parent_is_ignored() {
        let store = seeded_store();
        let mut txn = store.begin();
        let host = txn.add_host(Host::new("node01", domain()));
        let neighbor = txn.add_host(Host::new("node02", domain()));
        let own = txn.add_interface(
            Interface::new("eth0", mac(1), InterfaceKind::Physical).with_host(host),
        );
        let foreign = txn.add_interface(
            Interface::new("eth0", mac(2), InterfaceKind::Physical).with_host(neighbor),
        );
        let bond = txn.add_interface(
            Interface::new(
                "bond0",
                mac(1),
                InterfaceKind::Bond {
                    parents: BTreeSet::from([own, foreign]),
                },
            )
            .with_host(host),
        );
        txn.host_mut(host).expect("Should find host").boot_interface = Some(own);
        add_record(&mut txn, bond, AllocationKind::Sticky, "10.0.0.92");
        add_record(&mut txn, own, AllocationKind::Auto, "10.0.0.90");
        txn.commit().expect("Should commit");

        let mapping = Resolver::new(store).resolve_mapping(&MappingScope::Domain(domain()));
        assert_eq!(
            mapping.get(&fqdn("node01")),
            Some(&addrs(&["10.0.0.90"])),
            "A bond with a foreign parent never represents the host"
        );
    }

    #[test]
    fn test_vlan_ranks_last() {
        let store = seeded_store();
        let mut txn = store.begin();
        let host = txn.add_host(Host::new("node01", domain()));
        let phys = txn.add_interface(
            Interface::new("eth0", mac(1), InterfaceKind::Physical).with_host(host),
        );
        let vlan = txn.add_interface(
            Interface::new("eth0.100", mac(1), InterfaceKind::Vlan { parent: phys })
                .with_host(host),
        );
        add_record(&mut txn, vlan, AllocationKind::Sticky, "10.0.0.91");
        add_record(&mut txn, phys, AllocationKind::Discovered, "10.0.0.50");
        txn.commit().expect("Should commit");

        let mapping = Resolver::new(store).resolve_mapping(&MappingScope::Domain(domain()));
        assert_eq!(
            mapping,
            BTreeMap::from([(fqdn("node01"), addrs(&["10.0.0.50"]))]),
            "Even a discovered address on a physical interface beats a VLAN"
        );
    }

    #[test]
    fn test_oldest_record_breaks_ties() {
        let store = seeded_store();
        let mut txn = store.begin();
        let host = txn.add_host(Host::new("node01", domain()));
        let iface = txn.add_interface(
            Interface::new("eth0", mac(1), InterfaceKind::Physical).with_host(host),
        );
        add_record(&mut txn, iface, AllocationKind::Sticky, "10.0.0.91");
        add_record(&mut txn, iface, AllocationKind::Sticky, "10.0.0.90");
        txn.commit().expect("Should commit");

        let mapping = Resolver::new(store).resolve_mapping(&MappingScope::Domain(domain()));
        assert_eq!(
            mapping,
            BTreeMap::from([(fqdn("node01"), addrs(&["10.0.0.91"]))]),
            "The first-created record wins, not the numerically lowest value"
        );
    }

    #[test]
    fn test_per_family_winners_union() {
        let store = seeded_store();
        let mut txn = store.begin();
        let host = txn.add_host(Host::new("node01", domain()));
        let iface = txn.add_interface(
            Interface::new("eth0", mac(1), InterfaceKind::Physical).with_host(host),
        );
        add_record(&mut txn, iface, AllocationKind::Sticky, "10.0.0.90");
        add_record(&mut txn, iface, AllocationKind::Sticky, "2001:db8::90");
        txn.commit().expect("Should commit");

        let mapping = Resolver::new(store).resolve_mapping(&MappingScope::Domain(domain()));
        assert_eq!(
            mapping,
            BTreeMap::from([(fqdn("node01"), addrs(&["10.0.0.90", "2001:db8::90"]))])
        );
    }

    #[test]
    fn test_disable_ipv4_suppresses_v4_only() {
        let store = seeded_store();
        let mut txn = store.begin();
        let host = txn.add_host(Host::new("node01", domain()).without_ipv4());
        let iface = txn.add_interface(
            Interface::new("eth0", mac(1), InterfaceKind::Physical).with_host(host),
        );
        add_record(&mut txn, iface, AllocationKind::Sticky, "10.0.0.90");
        add_record(&mut txn, iface, AllocationKind::Sticky, "2001:db8::90");
        txn.commit().expect("Should commit");

        let mapping = Resolver::new(store).resolve_mapping(&MappingScope::Domain(domain()));
        assert_eq!(
            mapping,
            BTreeMap::from([(fqdn("node01"), addrs(&["2001:db8::90"]))])
        );
    }

    #[test]
    fn test_host_without_addresses_is_omitted() {
        let store = seeded_store();
        let mut txn = store.begin();
        let host = txn.add_host(Host::new("node01", domain()));
        let iface = txn.add_interface(
            Interface::new("eth0", mac(1), InterfaceKind::Physical).with_host(host),
        );
        // A DHCP marker and an empty placeholder are not candidates.
        let marker = txn.add_record(AddressRecord::new(AllocationKind::Dhcp, net("10.0.0.0/24")));
        graph::attach(&mut txn, iface, marker);
        let empty = txn.add_record(AddressRecord::new(
            AllocationKind::Discovered,
            net("10.0.0.0/24"),
        ));
        graph::attach(&mut txn, iface, empty);
        txn.commit().expect("Should commit");

        let mapping = Resolver::new(store).resolve_mapping(&MappingScope::Domain(domain()));
        assert_eq!(mapping, BTreeMap::new());
    }

    #[test]
    fn test_unattached_user_reserved_gets_synthetic_name() {
        let store = seeded_store();
        let mut txn = store.begin();
        txn.add_record(
            AddressRecord::new(AllocationKind::UserReserved, net("10.0.0.0/24"))
                .with_value(ip("10.0.0.1"))
                .with_principal(Principal::from("admin")),
        );
        txn.commit().expect("Should commit");

        let mapping = Resolver::new(store.clone()).resolve_mapping(&MappingScope::Domain(domain()));
        assert_eq!(
            mapping,
            BTreeMap::from([(fqdn("10-0-0-1"), addrs(&["10.0.0.1"]))])
        );

        let subnet_mapping =
            Resolver::new(store).resolve_mapping(&MappingScope::Subnet(net("10.0.0.0/24")));
        assert_eq!(
            subnet_mapping,
            BTreeMap::new(),
            "Subnet-scoped queries omit synthetic entries"
        );
    }

    #[test]
    fn test_attached_user_reserved_uses_the_hostname() {
        let store = seeded_store();
        let mut txn = store.begin();
        let host = txn.add_host(Host::new("node01", domain()));
        let iface = txn.add_interface(
            Interface::new("eth0", mac(1), InterfaceKind::Physical).with_host(host),
        );
        add_record(&mut txn, iface, AllocationKind::UserReserved, "10.0.0.1");
        txn.commit().expect("Should commit");

        let mapping = Resolver::new(store).resolve_mapping(&MappingScope::Domain(domain()));
        assert_eq!(
            mapping,
            BTreeMap::from([(fqdn("node01"), addrs(&["10.0.0.1"]))]),
            "No synthetic entry once a host-owned interface holds the address"
        );
    }

    #[test]
    fn test_subnet_scope_restricts_addresses() {
        let store = seeded_store();
        let mut txn = store.begin();
        let host = txn.add_host(Host::new("node01", domain()));
        let iface = txn.add_interface(
            Interface::new("eth0", mac(1), InterfaceKind::Physical).with_host(host),
        );
        add_record(&mut txn, iface, AllocationKind::Sticky, "10.0.0.90");
        add_record(&mut txn, iface, AllocationKind::Sticky, "2001:db8::90");
        txn.commit().expect("Should commit");

        let resolver = Resolver::new(store);
        assert_eq!(
            resolver.resolve_mapping(&MappingScope::Subnet(net("10.0.0.0/24"))),
            BTreeMap::from([(fqdn("node01"), addrs(&["10.0.0.90"]))])
        );
        assert_eq!(
            resolver.resolve_mapping(&MappingScope::Subnet(net("192.168.0.0/24"))),
            BTreeMap::new(),
            "Hosts without a winner in the subnet are omitted"
        );
    }

    #[test]
    fn test_disabled_interface_is_not_a_candidate() {
        let store = seeded_store();
        let mut txn = store.begin();
        let host = txn.add_host(Host::new("node01", domain()));
        let down = txn.add_interface(
            Interface::new("eth0", mac(1), InterfaceKind::Physical)
                .with_host(host)
                .disabled(),
        );
        let up = txn.add_interface(
            Interface::new("eth1", mac(2), InterfaceKind::Physical).with_host(host),
        );
        txn.host_mut(host).expect("Should find host").boot_interface = Some(down);
        add_record(&mut txn, down, AllocationKind::Sticky, "10.0.0.90");
        add_record(&mut txn, up, AllocationKind::Auto, "10.0.0.91");
        txn.commit().expect("Should commit");

        let mapping = Resolver::new(store).resolve_mapping(&MappingScope::Domain(domain()));
        assert_eq!(
            mapping,
            BTreeMap::from([(fqdn("node01"), addrs(&["10.0.0.91"]))])
        );
    }
}
