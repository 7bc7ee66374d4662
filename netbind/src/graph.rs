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
//! Maintenance of the address/interface graph.
//!
//! Shared helpers over a single transaction, used by the allocator and the
//! reconciler. All functions tolerate rows that have already disappeared
//! within the transaction.

use std::collections::BTreeSet;

use netbind_model::{AddrFamily, AllocationKind, InterfaceId, InterfaceKind, RecordId};
use netbind_store::store::Transaction;
use tracing::debug;

/// Attaches the record to the interface.
pub fn attach(txn: &mut Transaction, iface: InterfaceId, record: RecordId) {
    if let Some(iface) = txn.interface_mut(iface) {
        iface.records.insert(record);
    }
}

/// Detaches the record from the interface.
pub fn detach(txn: &mut Transaction, iface: InterfaceId, record: RecordId) {
    if let Some(iface) = txn.interface_mut(iface) {
        iface.records.remove(&record);
    }
}

/// Returns the identifiers of the interfaces referencing the record, in
/// creation order.
pub fn holder_ids(txn: &Transaction, record: RecordId) -> Vec<InterfaceId> {
    txn.data().holders_of(record).map(|iface| iface.id).collect()
}

/// Detaches the record from every interface referencing it and removes the
/// row.
pub fn delete_record(txn: &mut Transaction, record: RecordId) {
    for holder in holder_ids(txn, record) {
        detach(txn, holder, record);
    }
    txn.remove_record(record);
}

/// Detaches and garbage-collects the DISCOVERED records of the given family
/// on the interface.
///
/// Records named in `keep` are left alone. A detached record still referenced
/// by another interface survives; otherwise it is removed. Family-scoped so
/// an IPv6 lease survives an IPv4 claim.
pub fn clean_discovered(
    txn: &mut Transaction,
    iface: InterfaceId,
    family: AddrFamily,
    keep: &BTreeSet<RecordId>,
) {
    let Some(snapshot) = txn.data().interface(iface).cloned() else {
        return;
    };
    let targets: Vec<RecordId> = txn
        .data()
        .records_on(&snapshot)
        .filter(|record| record.kind == AllocationKind::Discovered && record.family() == family)
        .map(|record| record.id)
        .filter(|id| !keep.contains(id))
        .collect();
    for record in targets {
        detach(txn, iface, record);
        if holder_ids(txn, record).is_empty() {
            txn.remove_record(record);
            debug!(%record, "removed orphaned discovered record");
        }
    }
}

/// Deletes an interface and cascades over the graph.
///
/// Records left without a referencing interface are removed, except
/// USER_RESERVED records, which fall back to the synthetic-name mapping. The
/// owning host's boot-interface pointer is cleared if it pointed here. The
/// interface is removed from bond and bridge parent sets; a VLAN layered on
/// the deleted interface is deleted along with it.
pub fn delete_interface(txn: &mut Transaction, iface: InterfaceId) {
    let Some(removed) = txn.remove_interface(iface) else {
        return;
    };
    for record in &removed.records {
        let Some(kind) = txn.data().record(*record).map(|r| r.kind) else {
            continue;
        };
        if kind != AllocationKind::UserReserved && holder_ids(txn, *record).is_empty() {
            txn.remove_record(*record);
        }
    }
    if let Some(host) = removed.host {
        if let Some(host) = txn.host_mut(host) {
            if host.boot_interface == Some(iface) {
                host.boot_interface = None;
            }
        }
    }
    let composites: Vec<InterfaceId> = txn
        .data()
        .interfaces()
        .filter(|candidate| candidate.kind.parents().contains(&iface))
        .map(|candidate| candidate.id)
        .collect();
    for composite in composites {
        let Some(kind) = txn.data().interface(composite).map(|c| c.kind.clone()) else {
            continue;
        };
        match kind {
            InterfaceKind::Bond { .. } | InterfaceKind::Bridge { .. } => {
                if let Some(composite) = txn.interface_mut(composite) {
                    if let InterfaceKind::Bond { parents } | InterfaceKind::Bridge { parents } =
                        &mut composite.kind
                    {
                        parents.remove(&iface);
                    }
                }
            }
            // A VLAN cannot outlive its only parent.
            InterfaceKind::Vlan { .. } => delete_interface(txn, composite),
            InterfaceKind::Physical | InterfaceKind::Unknown => {}
        }
    }
    debug!(%iface, "deleted interface");
}
