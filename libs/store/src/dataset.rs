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
//! The tabular dataset and its query helpers.

use std::{
    collections::{BTreeMap, BTreeSet},
    net::IpAddr,
};

use ipnet::IpNet;
use netbind_model::{
    AddressRecord, DomainName, Host, HostId, Id, Interface, InterfaceId, MacAddr, Pool, PoolId,
    RecordId, ScopeName, Subnet,
    addr::ip_key,
};

/// All rows of the control plane, keyed the way callers look them up.
///
/// Rows with numeric identifiers get them assigned sequentially on insert;
/// identifier order is creation order. The dataset is a plain value: cloning
/// it yields an independent snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    domains: BTreeSet<DomainName>,
    subnets: BTreeMap<IpNet, Subnet>,
    pools: BTreeMap<PoolId, Pool>,
    hosts: BTreeMap<HostId, Host>,
    interfaces: BTreeMap<InterfaceId, Interface>,
    records: BTreeMap<RecordId, AddressRecord>,
    next_pool: usize,
    next_host: usize,
    next_interface: usize,
    next_record: usize,
}

// Reads
impl Dataset {
    /// Returns true if the domain exists.
    pub fn has_domain(&self, name: &DomainName) -> bool {
        self.domains.contains(name)
    }

    /// Iterates all subnets.
    pub fn subnets(&self) -> impl Iterator<Item = &Subnet> {
        self.subnets.values()
    }

    /// Returns the subnet with the given network.
    pub fn subnet(&self, cidr: &IpNet) -> Option<&Subnet> {
        self.subnets.get(cidr)
    }

    /// Returns the most specific subnet containing the address.
    pub fn subnet_containing(&self, addr: IpAddr) -> Option<&Subnet> {
        self.subnets
            .values()
            .filter(|subnet| subnet.cidr.contains(&addr))
            .max_by_key(|subnet| subnet.cidr.prefix_len())
    }

    /// Iterates all pools.
    pub fn pools(&self) -> impl Iterator<Item = &Pool> {
        self.pools.values()
    }

    /// Returns the pool with the given identifier.
    pub fn pool(&self, id: PoolId) -> Option<&Pool> {
        self.pools.get(&id)
    }

    /// Iterates the pools of one allocation scope.
    pub fn pools_in_scope<'a>(&'a self, scope: &'a ScopeName) -> impl Iterator<Item = &'a Pool> {
        self.pools.values().filter(move |pool| pool.scope == *scope)
    }

    /// Iterates all hosts.
    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }

    /// Returns the host with the given identifier.
    pub fn host(&self, id: HostId) -> Option<&Host> {
        self.hosts.get(&id)
    }

    /// Iterates the hosts of one domain.
    pub fn hosts_in_domain<'a>(&'a self, domain: &'a DomainName) -> impl Iterator<Item = &'a Host> {
        self.hosts.values().filter(move |host| host.domain == *domain)
    }

    /// Iterates all interfaces in creation order.
    pub fn interfaces(&self) -> impl Iterator<Item = &Interface> {
        self.interfaces.values()
    }

    /// Returns the interface with the given identifier.
    pub fn interface(&self, id: InterfaceId) -> Option<&Interface> {
        self.interfaces.get(&id)
    }

    /// Iterates the interfaces carrying the given hardware address, in
    /// creation order.
    pub fn interfaces_by_mac(&self, mac: MacAddr) -> impl Iterator<Item = &Interface> {
        self.interfaces.values().filter(move |iface| iface.mac == mac)
    }

    /// Iterates the interfaces owned by the given host.
    pub fn host_interfaces(&self, host: HostId) -> impl Iterator<Item = &Interface> {
        self.interfaces
            .values()
            .filter(move |iface| iface.host == Some(host))
    }

    /// Iterates all address records in creation order.
    pub fn records(&self) -> impl Iterator<Item = &AddressRecord> {
        self.records.values()
    }

    /// Returns the record with the given identifier.
    pub fn record(&self, id: RecordId) -> Option<&AddressRecord> {
        self.records.get(&id)
    }

    /// Iterates the records attached to the given interface, in creation
    /// order.
    pub fn records_on<'a>(
        &'a self,
        iface: &'a Interface,
    ) -> impl Iterator<Item = &'a AddressRecord> {
        self.records
            .values()
            .filter(move |record| iface.records.contains(&record.id))
    }

    /// Iterates the interfaces the given record is attached to, in creation
    /// order.
    pub fn holders_of(&self, record: RecordId) -> impl Iterator<Item = &Interface> {
        self.interfaces
            .values()
            .filter(move |iface| iface.records.contains(&record))
    }

    /// Returns the first record holding the given value, regardless of
    /// subnet.
    pub fn record_holding(&self, value: IpAddr) -> Option<&AddressRecord> {
        self.records
            .values()
            .find(|record| record.value == Some(value))
    }

    /// Returns the first record holding the given value within the given
    /// subnet.
    pub fn record_with_value_in(&self, subnet: &IpNet, value: IpAddr) -> Option<&AddressRecord> {
        self.records
            .values()
            .find(|record| record.subnet == *subnet && record.value == Some(value))
    }

    /// Returns the numeric keys of all values bound within the given subnet.
    pub fn taken_keys(&self, subnet: &IpNet) -> BTreeSet<u128> {
        self.records
            .values()
            .filter(|record| record.subnet == *subnet)
            .filter_map(|record| record.value.map(ip_key))
            .collect()
    }
}

// Writes
impl Dataset {
    /// Adds a domain.
    pub fn add_domain(&mut self, name: DomainName) {
        self.domains.insert(name);
    }

    /// Adds a subnet, keyed by its network.
    pub fn add_subnet(&mut self, subnet: Subnet) {
        self.subnets.insert(subnet.cidr, subnet);
    }

    /// Adds a pool, assigning its identifier.
    pub fn add_pool(&mut self, mut pool: Pool) -> PoolId {
        self.next_pool += 1;
        let id = PoolId::from_usize(self.next_pool);
        pool.id = id;
        self.pools.insert(id, pool);
        id
    }

    /// Adds a host, assigning its identifier.
    pub fn add_host(&mut self, mut host: Host) -> HostId {
        self.next_host += 1;
        let id = HostId::from_usize(self.next_host);
        host.id = id;
        self.hosts.insert(id, host);
        id
    }

    /// Returns a mutable reference to the host with the given identifier.
    pub fn host_mut(&mut self, id: HostId) -> Option<&mut Host> {
        self.hosts.get_mut(&id)
    }

    /// Adds an interface, assigning its identifier.
    pub fn add_interface(&mut self, mut iface: Interface) -> InterfaceId {
        self.next_interface += 1;
        let id = InterfaceId::from_usize(self.next_interface);
        iface.id = id;
        self.interfaces.insert(id, iface);
        id
    }

    /// Returns a mutable reference to the interface with the given
    /// identifier.
    pub fn interface_mut(&mut self, id: InterfaceId) -> Option<&mut Interface> {
        self.interfaces.get_mut(&id)
    }

    /// Removes the interface with the given identifier.
    pub fn remove_interface(&mut self, id: InterfaceId) -> Option<Interface> {
        self.interfaces.remove(&id)
    }

    /// Adds a record, assigning its identifier.
    pub fn add_record(&mut self, mut record: AddressRecord) -> RecordId {
        self.next_record += 1;
        let id = RecordId::from_usize(self.next_record);
        record.id = id;
        self.records.insert(id, record);
        id
    }

    /// Returns a mutable reference to the record with the given identifier.
    pub fn record_mut(&mut self, id: RecordId) -> Option<&mut AddressRecord> {
        self.records.get_mut(&id)
    }

    /// Removes the record with the given identifier.
    pub fn remove_record(&mut self, id: RecordId) -> Option<AddressRecord> {
        self.records.remove(&id)
    }
}

/// Keys written by a transaction, per table.
#[derive(Debug, Default, Clone)]
pub(crate) struct Touched {
    pub(crate) domains: BTreeSet<DomainName>,
    pub(crate) subnets: BTreeSet<IpNet>,
    pub(crate) pools: BTreeSet<PoolId>,
    pub(crate) hosts: BTreeSet<HostId>,
    pub(crate) interfaces: BTreeSet<InterfaceId>,
    pub(crate) records: BTreeSet<RecordId>,
}

impl Dataset {
    /// Copies the touched rows from a committed snapshot into this dataset.
    /// A touched key absent from the snapshot is a deletion.
    pub(crate) fn apply_from(&mut self, snap: &Dataset, touched: &Touched) {
        for name in &touched.domains {
            if snap.domains.contains(name) {
                self.domains.insert(name.clone());
            } else {
                self.domains.remove(name);
            }
        }
        for cidr in &touched.subnets {
            match snap.subnets.get(cidr) {
                Some(row) => self.subnets.insert(*cidr, row.clone()),
                None => self.subnets.remove(cidr),
            };
        }
        for id in &touched.pools {
            match snap.pools.get(id) {
                Some(row) => self.pools.insert(*id, row.clone()),
                None => self.pools.remove(id),
            };
        }
        for id in &touched.hosts {
            match snap.hosts.get(id) {
                Some(row) => self.hosts.insert(*id, row.clone()),
                None => self.hosts.remove(id),
            };
        }
        for id in &touched.interfaces {
            match snap.interfaces.get(id) {
                Some(row) => self.interfaces.insert(*id, row.clone()),
                None => self.interfaces.remove(id),
            };
        }
        for id in &touched.records {
            match snap.records.get(id) {
                Some(row) => self.records.insert(*id, row.clone()),
                None => self.records.remove(id),
            };
        }
        self.next_pool = self.next_pool.max(snap.next_pool);
        self.next_host = self.next_host.max(snap.next_host);
        self.next_interface = self.next_interface.max(snap.next_interface);
        self.next_record = self.next_record.max(snap.next_record);
    }

    /// Returns true if a row with the given domain key exists.
    pub(crate) fn contains_domain(&self, name: &DomainName) -> bool {
        self.domains.contains(name)
    }

    /// Returns true if a row with the given subnet key exists.
    pub(crate) fn contains_subnet(&self, cidr: &IpNet) -> bool {
        self.subnets.contains_key(cidr)
    }
}
