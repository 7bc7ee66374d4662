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
//! Static address allocation from administratively defined pools.

use std::{collections::BTreeSet, net::IpAddr};

use ipnet::IpNet;
use netbind_model::{
    AddressRecord, AllocationKind, InterfaceId, Pool, Principal, RecordId,
    addr::{ip_key, key_ip},
};
use netbind_store::{
    retry::Retryable,
    store::{MemStore, StoreError, Transaction},
};
use thiserror::Error;
use tracing::debug;

use crate::graph;

/// Name of the advisory lock serializing free-address searches.
pub const ALLOCATION_LOCK: &str = "address-allocation";

/// Address allocation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocationError {
    /// The kind cannot be handed out by the allocator. DHCP markers carry no
    /// value and DISCOVERED records are owned by the lease reconciler.
    #[error("{0} records cannot be allocated")]
    InvalidAllocationKind(AllocationKind),
    /// USER_RESERVED allocation without a principal.
    #[error("USER_RESERVED allocation requires a principal")]
    MissingPrincipal,
    /// Principal supplied for a kind that must not carry one.
    #[error("{0} allocation must not carry a principal")]
    UnexpectedPrincipal(AllocationKind),
    /// The requested address is not inside the pool's network.
    #[error("{addr} is not within the network {network}")]
    OutOfNetwork {
        /// The requested address.
        addr: IpAddr,
        /// The pool's network.
        network: IpNet,
    },
    /// The requested address is inside the dynamic range, which is reserved
    /// for DHCP assignment.
    #[error("{addr} is within the dynamic range {low}-{high}, which is reserved for DHCP")]
    InDynamicRange {
        /// The requested address.
        addr: IpAddr,
        /// Low bound of the dynamic range.
        low: IpAddr,
        /// High bound of the dynamic range.
        high: IpAddr,
    },
    /// The requested address is not inside the static range.
    #[error("{addr} is not within the static range {low}-{high}")]
    OutOfStaticRange {
        /// The requested address.
        addr: IpAddr,
        /// Low bound of the static range.
        low: IpAddr,
        /// High bound of the static range.
        high: IpAddr,
    },
    /// The requested address is already bound.
    #[error("{0} is already allocated")]
    AddressUnavailable(IpAddr),
    /// The free-address search found no unbound address.
    #[error("no free addresses in the static range {low}-{high}")]
    AddressesExhausted {
        /// Low bound of the static range.
        low: IpAddr,
        /// High bound of the static range.
        high: IpAddr,
    },
    /// The interface to claim for does not exist.
    #[error("interface {0} does not exist")]
    UnknownInterface(InterfaceId),
    /// The store rejected the transaction. Write conflicts are retryable; the
    /// caller re-runs the whole operation.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Retryable for AllocationError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_retryable())
    }
}

/// Allocates static addresses from pools and manages record lifecycle.
///
/// Every operation runs in its own transaction; on failure nothing is
/// published and the caller may re-run retryable failures, typically through
/// a [netbind_store::retry::RetryPolicy].
#[derive(Debug, Clone)]
pub struct Allocator {
    store: MemStore,
}

impl Allocator {
    /// Creates an allocator over the given store.
    pub fn new(store: MemStore) -> Self {
        Self { store }
    }

    /// Allocates an address from the pool.
    ///
    /// With `requested`, binds that specific address: it must lie in the
    /// statically allocatable part of the pool and be unbound. This path
    /// takes no advisory lock; the commit-time uniqueness constraint is the
    /// safety net against races, surfaced as
    /// [AllocationError::AddressUnavailable].
    ///
    /// Without `requested`, searches the static range (minus the dynamic
    /// sub-range) in ascending order for the first unbound address, under the
    /// [ALLOCATION_LOCK] advisory lock.
    pub fn allocate(
        &self,
        pool: &Pool,
        kind: AllocationKind,
        principal: Option<Principal>,
        requested: Option<IpAddr>,
    ) -> Result<AddressRecord, AllocationError> {
        validate_request(kind, principal.as_ref())?;
        match requested {
            Some(addr) => self.allocate_requested(pool, kind, principal, addr, None),
            None => self.allocate_free(pool, kind, principal, None),
        }
    }

    /// Allocates an address and attaches it to the interface in the same
    /// transaction.
    ///
    /// DISCOVERED records of the pool's address family on the interface are
    /// cleaned, so the static claim supersedes observed lease state. A
    /// DISCOVERED record on the interface that already holds the requested
    /// address is converted in place instead of being replaced.
    pub fn claim(
        &self,
        iface: InterfaceId,
        pool: &Pool,
        kind: AllocationKind,
        principal: Option<Principal>,
        requested: Option<IpAddr>,
    ) -> Result<AddressRecord, AllocationError> {
        validate_request(kind, principal.as_ref())?;
        match requested {
            Some(addr) => self.allocate_requested(pool, kind, principal, addr, Some(iface)),
            None => self.allocate_free(pool, kind, principal, Some(iface)),
        }
    }

    /// Removes a record and detaches it from every interface referencing it.
    /// No range logic; removing an already absent record is not an error.
    pub fn deallocate(&self, record: RecordId) -> Result<(), AllocationError> {
        let mut txn = self.store.begin();
        if txn.data().record(record).is_none() {
            return Ok(());
        }
        graph::delete_record(&mut txn, record);
        txn.commit()?;
        debug!(%record, "deallocated record");
        Ok(())
    }

    /// Deletes an interface, cascading per [graph::delete_interface].
    pub fn delete_interface(&self, iface: InterfaceId) -> Result<(), AllocationError> {
        let mut txn = self.store.begin();
        if txn.data().interface(iface).is_none() {
            return Ok(());
        }
        graph::delete_interface(&mut txn, iface);
        txn.commit()?;
        Ok(())
    }

    fn allocate_requested(
        &self,
        pool: &Pool,
        kind: AllocationKind,
        principal: Option<Principal>,
        addr: IpAddr,
        attach_to: Option<InterfaceId>,
    ) -> Result<AddressRecord, AllocationError> {
        check_range(pool, addr)?;
        let mut txn = self.store.begin();

        if let Some(existing) = txn.data().record_with_value_in(&pool.network, addr).cloned() {
            // A claim may convert the interface's own discovered lease of the
            // requested address in place.
            let convertible = attach_to.is_some_and(|iface| {
                existing.kind == AllocationKind::Discovered
                    && graph::holder_ids(&txn, existing.id).contains(&iface)
            });
            if !convertible {
                return Err(AllocationError::AddressUnavailable(addr));
            }
            let iface = attach_to.ok_or(AllocationError::AddressUnavailable(addr))?;
            graph::clean_discovered(
                &mut txn,
                iface,
                pool.family(),
                &BTreeSet::from([existing.id]),
            );
            let mut record = existing;
            record.kind = kind;
            record.principal = principal;
            if let Some(row) = txn.record_mut(record.id) {
                row.kind = record.kind;
                row.principal = record.principal.clone();
            }
            self.commit_requested(txn, addr)?;
            debug!(%addr, %kind, "converted discovered record into static claim");
            return Ok(record);
        }

        let record = self.insert_record(&mut txn, pool, kind, principal, addr, attach_to)?;
        self.commit_requested(txn, addr)?;
        debug!(%addr, %kind, "allocated requested address");
        Ok(record)
    }

    fn allocate_free(
        &self,
        pool: &Pool,
        kind: AllocationKind,
        principal: Option<Principal>,
        attach_to: Option<InterfaceId>,
    ) -> Result<AddressRecord, AllocationError> {
        // Serializes the search+insert window across all allocators, so the
        // commit-time uniqueness constraint is a last line of defense rather
        // than the primary mechanism.
        let _guard = self.store.locks().acquire(ALLOCATION_LOCK);
        let mut txn = self.store.begin();

        let taken = txn.data().taken_keys(&pool.network);
        let key = pool
            .allocatable_spans()
            .into_iter()
            .flat_map(|span| span.iter())
            .find(|key| !taken.contains(key))
            .ok_or(AllocationError::AddressesExhausted {
                low: pool.static_low,
                high: pool.static_high,
            })?;
        let addr = key_ip(key);

        let record = self.insert_record(&mut txn, pool, kind, principal, addr, attach_to)?;
        txn.commit()?;
        debug!(%addr, %kind, "allocated free address");
        Ok(record)
    }

    /// Creates the record in the transaction, attaching it to the interface
    /// if the operation is a claim.
    fn insert_record(
        &self,
        txn: &mut Transaction,
        pool: &Pool,
        kind: AllocationKind,
        principal: Option<Principal>,
        addr: IpAddr,
        attach_to: Option<InterfaceId>,
    ) -> Result<AddressRecord, AllocationError> {
        let mut record = AddressRecord::new(kind, pool.network).with_value(addr);
        if let Some(principal) = principal {
            record = record.with_principal(principal);
        }
        if let Some(iface) = attach_to {
            if txn.data().interface(iface).is_none() {
                return Err(AllocationError::UnknownInterface(iface));
            }
            graph::clean_discovered(txn, iface, pool.family(), &BTreeSet::new());
            record.id = txn.add_record(record.clone());
            graph::attach(txn, iface, record.id);
        } else {
            record.id = txn.add_record(record.clone());
        }
        Ok(record)
    }

    /// Commits the requested-address path. Somebody racing us to the same
    /// specific address surfaces as a uniqueness violation, which a retry
    /// cannot fix.
    fn commit_requested(&self, txn: Transaction, addr: IpAddr) -> Result<(), AllocationError> {
        txn.commit().map_err(|err| match err {
            StoreError::UniqueViolation { .. } => AllocationError::AddressUnavailable(addr),
            other => other.into(),
        })
    }
}

/// Rejects kinds the allocator must not hand out and bad kind/principal
/// combinations.
fn validate_request(
    kind: AllocationKind,
    principal: Option<&Principal>,
) -> Result<(), AllocationError> {
    if !kind.is_allocatable() {
        return Err(AllocationError::InvalidAllocationKind(kind));
    }
    match (kind.requires_principal(), principal) {
        (true, None) => Err(AllocationError::MissingPrincipal),
        (false, Some(_)) => Err(AllocationError::UnexpectedPrincipal(kind)),
        _ => Ok(()),
    }
}

/// Validates that the requested address is statically allocatable: inside the
/// network, outside the dynamic range, inside the static range.
fn check_range(pool: &Pool, addr: IpAddr) -> Result<(), AllocationError> {
    if !pool.network.contains(&addr) {
        return Err(AllocationError::OutOfNetwork {
            addr,
            network: pool.network,
        });
    }
    if pool.dynamic_span().contains(ip_key(addr)) {
        return Err(AllocationError::InDynamicRange {
            addr,
            low: pool.dynamic_low,
            high: pool.dynamic_high,
        });
    }
    if !pool.static_span().contains(ip_key(addr)) {
        return Err(AllocationError::OutOfStaticRange {
            addr,
            low: pool.static_low,
            high: pool.static_high,
        });
    }
    Ok(())
}
