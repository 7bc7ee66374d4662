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
//! The in-memory store and its snapshot-isolated transactions.
//!
//! A [Transaction] works on a full clone of the dataset and tracks the rows
//! it writes together with their versions at begin time. [Transaction::commit]
//! revalidates every written row against the shared state under the write
//! lock: a version mismatch is a [StoreError::WriteConflict] (retryable), a
//! duplicate key under a uniqueness constraint is a
//! [StoreError::UniqueViolation] (not retryable). Note that two transactions
//! inserting into the same table allocate the same identifier from their
//! snapshots; the later commit observes a write conflict and succeeds on
//! retry with a fresh snapshot.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    net::IpAddr,
    sync::{Arc, RwLock},
};

use ipnet::IpNet;
use netbind_model::{
    AddressRecord, DomainName, Host, HostId, Interface, InterfaceId, Pool, PoolId, RecordId,
    Subnet,
};
use thiserror::Error;
use tracing::debug;

use crate::{
    dataset::{Dataset, Touched},
    locks::AdvisoryLocks,
    retry::Retryable,
};

/// Store failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A concurrent transaction committed a competing write.
    #[error("write conflict on {table} row {key}")]
    WriteConflict {
        /// The table the conflicting row belongs to.
        table: &'static str,
        /// The conflicting row key.
        key: String,
    },
    /// Committing would violate a uniqueness constraint.
    #[error("{constraint} uniqueness violated by {value}")]
    UniqueViolation {
        /// The violated constraint.
        constraint: &'static str,
        /// The duplicated value.
        value: String,
    },
}

impl StoreError {
    /// Returns true if the failed operation can succeed when re-run on a
    /// fresh snapshot.
    pub fn is_write_conflict(&self) -> bool {
        matches!(self, Self::WriteConflict { .. })
    }
}

impl Retryable for StoreError {
    fn is_retryable(&self) -> bool {
        self.is_write_conflict()
    }
}

/// Per-row versions, advanced on every commit that writes the row.
#[derive(Debug, Default, Clone)]
struct Versions {
    domains: BTreeMap<DomainName, u64>,
    subnets: BTreeMap<IpNet, u64>,
    pools: BTreeMap<PoolId, u64>,
    hosts: BTreeMap<HostId, u64>,
    interfaces: BTreeMap<InterfaceId, u64>,
    records: BTreeMap<RecordId, u64>,
}

#[derive(Debug, Default)]
struct Shared {
    data: Dataset,
    versions: Versions,
    tick: u64,
}

/// Shared handle to the in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    shared: Arc<RwLock<Shared>>,
    locks: AdvisoryLocks,
}

impl MemStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begins a transaction on a snapshot of the current state.
    pub fn begin(&self) -> Transaction {
        let shared = self.shared.read().unwrap();
        Transaction {
            snap: shared.data.clone(),
            base: shared.versions.clone(),
            touched: Touched::default(),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Returns a point-in-time snapshot of the dataset for read-only work.
    pub fn snapshot(&self) -> Dataset {
        self.shared.read().unwrap().data.clone()
    }

    /// Returns the store's advisory lock registry.
    pub fn locks(&self) -> &AdvisoryLocks {
        &self.locks
    }
}

/// One snapshot-isolated unit of work. Dropping it without committing
/// discards all writes.
#[derive(Debug)]
pub struct Transaction {
    snap: Dataset,
    base: Versions,
    touched: Touched,
    shared: Arc<RwLock<Shared>>,
}

impl Transaction {
    /// Read access to the transaction's view of the dataset, including its
    /// own uncommitted writes.
    pub fn data(&self) -> &Dataset {
        &self.snap
    }

    /// Adds a domain.
    pub fn add_domain(&mut self, name: DomainName) {
        self.touched.domains.insert(name.clone());
        self.snap.add_domain(name);
    }

    /// Adds a subnet.
    pub fn add_subnet(&mut self, subnet: Subnet) {
        self.touched.subnets.insert(subnet.cidr);
        self.snap.add_subnet(subnet);
    }

    /// Adds a pool, returning its assigned identifier.
    pub fn add_pool(&mut self, pool: Pool) -> PoolId {
        let id = self.snap.add_pool(pool);
        self.touched.pools.insert(id);
        id
    }

    /// Adds a host, returning its assigned identifier.
    pub fn add_host(&mut self, host: Host) -> HostId {
        let id = self.snap.add_host(host);
        self.touched.hosts.insert(id);
        id
    }

    /// Mutable access to a host row.
    pub fn host_mut(&mut self, id: HostId) -> Option<&mut Host> {
        self.touched.hosts.insert(id);
        self.snap.host_mut(id)
    }

    /// Adds an interface, returning its assigned identifier.
    pub fn add_interface(&mut self, iface: Interface) -> InterfaceId {
        let id = self.snap.add_interface(iface);
        self.touched.interfaces.insert(id);
        id
    }

    /// Mutable access to an interface row.
    pub fn interface_mut(&mut self, id: InterfaceId) -> Option<&mut Interface> {
        self.touched.interfaces.insert(id);
        self.snap.interface_mut(id)
    }

    /// Removes an interface row.
    pub fn remove_interface(&mut self, id: InterfaceId) -> Option<Interface> {
        self.touched.interfaces.insert(id);
        self.snap.remove_interface(id)
    }

    /// Adds a record, returning its assigned identifier.
    pub fn add_record(&mut self, record: AddressRecord) -> RecordId {
        let id = self.snap.add_record(record);
        self.touched.records.insert(id);
        id
    }

    /// Mutable access to a record row.
    pub fn record_mut(&mut self, id: RecordId) -> Option<&mut AddressRecord> {
        self.touched.records.insert(id);
        self.snap.record_mut(id)
    }

    /// Removes a record row.
    pub fn remove_record(&mut self, id: RecordId) -> Option<AddressRecord> {
        self.touched.records.insert(id);
        self.snap.remove_record(id)
    }

    /// Discards the transaction's writes.
    pub fn rollback(self) {}

    /// Publishes the transaction's writes.
    ///
    /// Fails with [StoreError::WriteConflict] if any written row was
    /// committed by another transaction since this one began, and with
    /// [StoreError::UniqueViolation] if the resulting state would break a
    /// uniqueness constraint. On failure nothing is published.
    pub fn commit(self) -> Result<(), StoreError> {
        let mut shared = self.shared.write().unwrap();
        let shared = &mut *shared;

        check_table(
            "domain",
            &shared.versions.domains,
            &self.base.domains,
            &self.touched.domains,
        )?;
        check_table(
            "subnet",
            &shared.versions.subnets,
            &self.base.subnets,
            &self.touched.subnets,
        )?;
        check_table(
            "pool",
            &shared.versions.pools,
            &self.base.pools,
            &self.touched.pools,
        )?;
        check_table(
            "host",
            &shared.versions.hosts,
            &self.base.hosts,
            &self.touched.hosts,
        )?;
        check_table(
            "interface",
            &shared.versions.interfaces,
            &self.base.interfaces,
            &self.touched.interfaces,
        )?;
        check_table(
            "record",
            &shared.versions.records,
            &self.base.records,
            &self.touched.records,
        )?;

        let mut next = shared.data.clone();
        next.apply_from(&self.snap, &self.touched);
        check_unique(&next)?;

        let tick = shared.tick + 1;
        bump(&mut shared.versions.domains, &self.touched.domains, tick, |k| {
            next.contains_domain(k)
        });
        bump(&mut shared.versions.subnets, &self.touched.subnets, tick, |k| {
            next.contains_subnet(k)
        });
        bump(&mut shared.versions.pools, &self.touched.pools, tick, |k| {
            next.pool(*k).is_some()
        });
        bump(&mut shared.versions.hosts, &self.touched.hosts, tick, |k| {
            next.host(*k).is_some()
        });
        bump(
            &mut shared.versions.interfaces,
            &self.touched.interfaces,
            tick,
            |k| next.interface(*k).is_some(),
        );
        bump(&mut shared.versions.records, &self.touched.records, tick, |k| {
            next.record(*k).is_some()
        });
        shared.data = next;
        shared.tick = tick;
        debug!(tick, "transaction committed");
        Ok(())
    }
}

/// Verifies that no touched row moved since the transaction's snapshot.
fn check_table<K: Ord + fmt::Display>(
    table: &'static str,
    current: &BTreeMap<K, u64>,
    base: &BTreeMap<K, u64>,
    touched: &BTreeSet<K>,
) -> Result<(), StoreError> {
    for key in touched {
        if current.get(key) != base.get(key) {
            return Err(StoreError::WriteConflict {
                table,
                key: key.to_string(),
            });
        }
    }
    Ok(())
}

fn bump<K: Ord + Clone>(
    versions: &mut BTreeMap<K, u64>,
    touched: &BTreeSet<K>,
    tick: u64,
    exists: impl Fn(&K) -> bool,
) {
    for key in touched {
        if exists(key) {
            versions.insert(key.clone(), tick);
        } else {
            versions.remove(key);
        }
    }
}

/// Enforces the commit-time uniqueness constraints: (subnet, value) over
/// non-empty records and (hostname, domain) over hosts.
fn check_unique(data: &Dataset) -> Result<(), StoreError> {
    let mut values: BTreeSet<(IpNet, IpAddr)> = BTreeSet::new();
    for record in data.records() {
        if let Some(value) = record.value {
            if !values.insert((record.subnet, value)) {
                return Err(StoreError::UniqueViolation {
                    constraint: "(subnet, value)",
                    value: format!("{value} in {}", record.subnet),
                });
            }
        }
    }
    let mut names: BTreeSet<(&str, &DomainName)> = BTreeSet::new();
    for host in data.hosts() {
        if !names.insert((host.hostname.as_str(), &host.domain)) {
            return Err(StoreError::UniqueViolation {
                constraint: "(hostname, domain)",
                value: host.fqdn().to_string(),
            });
        }
    }
    Ok(())
}
