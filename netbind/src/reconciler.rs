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
//! Reconciliation of observed DHCP leases into the address/interface graph.

use std::{
    collections::BTreeSet,
    net::IpAddr,
};

use ipnet::IpNet;
use netbind_model::{
    AddressRecord, AllocationKind, Interface, InterfaceKind, MacAddr, ScopeName,
};
use netbind_store::store::{MemStore, StoreError, Transaction};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::graph;

/// One observed DHCP assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// The leased address.
    pub address: IpAddr,
    /// The hardware address it was leased to.
    pub mac: MacAddr,
}

/// The full current set of observed leases for one allocation scope. Not a
/// delta: an address absent from the snapshot is no longer leased.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseSnapshot(pub Vec<Lease>);

impl FromIterator<(IpAddr, MacAddr)> for LeaseSnapshot {
    fn from_iter<I: IntoIterator<Item = (IpAddr, MacAddr)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(address, mac)| Lease { address, mac })
                .collect(),
        )
    }
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// DISCOVERED records created.
    pub records_created: usize,
    /// Empty DISCOVERED placeholders rebound to an observed value.
    pub records_reused: usize,
    /// DISCOVERED records whose value was cleared.
    pub records_cleared: usize,
    /// DISCOVERED records deleted.
    pub records_deleted: usize,
    /// Placeholder interfaces created.
    pub interfaces_created: usize,
    /// Placeholder interfaces deleted.
    pub interfaces_deleted: usize,
}

/// Brings the stored graph into agreement with observed lease snapshots.
///
/// A reconciliation runs in one transaction; it either commits whole or
/// rolls back. Conflicting commits surface as [StoreError::WriteConflict]
/// and the caller re-runs the whole call, typically through a
/// [netbind_store::retry::RetryPolicy].
#[derive(Debug, Clone)]
pub struct Reconciler {
    store: MemStore,
}

impl Reconciler {
    /// Creates a reconciler over the given store.
    pub fn new(store: MemStore) -> Self {
        Self { store }
    }

    /// Reconciles the scope's DISCOVERED records against the snapshot.
    ///
    /// First sweeps records whose (value, holder) pair is no longer observed:
    /// values are cleared, or the record deleted outright when only unknown
    /// placeholder interfaces reference it. Then applies the snapshot,
    /// resolving interfaces by hardware address globally and creating
    /// placeholder interfaces for hardware addresses never seen before.
    pub fn reconcile(
        &self,
        scope: &ScopeName,
        snapshot: &LeaseSnapshot,
    ) -> Result<ReconcileSummary, StoreError> {
        let mut txn = self.store.begin();
        let mut summary = ReconcileSummary::default();

        let scope_nets: BTreeSet<IpNet> = txn
            .data()
            .pools_in_scope(scope)
            .map(|pool| pool.network)
            .collect();
        let pairs: BTreeSet<(IpAddr, MacAddr)> = snapshot
            .0
            .iter()
            .map(|lease| (lease.address, lease.mac))
            .collect();
        let leased_values: BTreeSet<IpAddr> =
            snapshot.0.iter().map(|lease| lease.address).collect();

        sweep(&mut txn, &scope_nets, &pairs, &leased_values, &mut summary);
        for lease in &snapshot.0 {
            apply(&mut txn, lease, &mut summary);
        }

        txn.commit()?;
        debug!(%scope, ?summary, "reconciled lease snapshot");
        Ok(summary)
    }
}

/// Retires DISCOVERED values in the scope that the snapshot no longer backs.
fn sweep(
    txn: &mut Transaction,
    scope_nets: &BTreeSet<IpNet>,
    pairs: &BTreeSet<(IpAddr, MacAddr)>,
    leased_values: &BTreeSet<IpAddr>,
    summary: &mut ReconcileSummary,
) {
    let targets: Vec<(netbind_model::RecordId, IpAddr, IpNet)> = txn
        .data()
        .records()
        .filter(|record| record.kind == AllocationKind::Discovered)
        .filter(|record| scope_nets.contains(&record.subnet))
        .filter_map(|record| record.value.map(|value| (record.id, value, record.subnet)))
        .collect();

    for (record, value, subnet) in targets {
        let holders: Vec<Interface> = txn.data().holders_of(record).cloned().collect();
        // Lease state on composite interfaces is not swept; only unknown
        // placeholders and physical interfaces participate.
        if !holders
            .iter()
            .all(|iface| iface.kind.is_unknown() || iface.kind.is_physical())
        {
            continue;
        }
        let (live, stale): (Vec<&Interface>, Vec<&Interface>) = holders
            .iter()
            .partition(|iface| pairs.contains(&(value, iface.mac)));

        if live.is_empty() {
            let all_unknown = holders.iter().all(|iface| iface.kind.is_unknown());
            if !leased_values.contains(&value) && all_unknown {
                // Nothing but placeholders remembers this address.
                for holder in &holders {
                    graph::detach(txn, holder.id, record);
                }
                txn.remove_record(record);
                summary.records_deleted += 1;
                for holder in &holders {
                    let orphaned = txn
                        .data()
                        .interface(holder.id)
                        .is_some_and(|iface| iface.records.is_empty());
                    if orphaned {
                        graph::delete_interface(txn, holder.id);
                        summary.interfaces_deleted += 1;
                    }
                }
            } else if let Some(row) = txn.record_mut(record) {
                // The subnet link survives so a later lease for the same pool
                // reuses the record without a fresh subnet lookup.
                row.value = None;
                summary.records_cleared += 1;
            }
        } else {
            for holder in stale {
                graph::detach(txn, holder.id, record);
                let placeholder =
                    txn.add_record(AddressRecord::new(AllocationKind::Discovered, subnet));
                graph::attach(txn, holder.id, placeholder);
                summary.records_created += 1;
            }
        }
    }
}

/// Folds one observed lease into the graph.
fn apply(txn: &mut Transaction, lease: &Lease, summary: &mut ReconcileSummary) {
    let Some(subnet) = txn
        .data()
        .subnet_containing(lease.address)
        .map(|subnet| subnet.cidr)
    else {
        warn!(address = %lease.address, mac = %lease.mac, "no configured subnet contains lease, skipping");
        return;
    };

    // Hardware addresses resolve globally; the scope only limits the sweep.
    let existing_iface = txn.data().interfaces_by_mac(lease.mac).next().map(|i| i.id);
    let iface = match existing_iface {
        Some(id) => id,
        None => {
            let id = txn.add_interface(Interface::new(
                format!("unknown-{}", lease.mac),
                lease.mac,
                InterfaceKind::Unknown,
            ));
            summary.interfaces_created += 1;
            id
        }
    };

    if let Some(existing) = txn
        .data()
        .record_with_value_in(&subnet, lease.address)
        .cloned()
    {
        if existing.kind == AllocationKind::Discovered {
            // One address observed behind several hardware addresses shares
            // one record.
            graph::attach(txn, iface, existing.id);
        } else {
            debug!(address = %lease.address, mac = %lease.mac, kind = %existing.kind,
                "address statically bound, lease ignored");
        }
        return;
    }

    let Some(snapshot) = txn.data().interface(iface).cloned() else {
        return;
    };
    let placeholder = txn
        .data()
        .records_on(&snapshot)
        .find(|record| {
            record.kind == AllocationKind::Discovered
                && !record.has_value()
                && record.subnet.contains(&lease.address)
        })
        .map(|record| record.id);
    match placeholder {
        Some(record) => {
            if let Some(row) = txn.record_mut(record) {
                row.value = Some(lease.address);
                summary.records_reused += 1;
            }
        }
        None => {
            let record = txn.add_record(
                AddressRecord::new(AllocationKind::Discovered, subnet).with_value(lease.address),
            );
            graph::attach(txn, iface, record);
            summary.records_created += 1;
        }
    }
}
