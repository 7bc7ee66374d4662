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
//! End-to-end lifecycle: configuration, allocation, lease reconciliation,
//! and hostname mapping over one shared store.

use std::{
    collections::{BTreeMap, BTreeSet},
    net::IpAddr,
};

use ipnet::IpNet;
use netbind::{
    AllocationError, Allocator, LeaseSnapshot, MappingScope, Reconciler, Resolver, config,
};
use netbind_model::{AllocationKind, DomainName, Fqdn, MacAddr, Pool, Principal, ScopeName};
use netbind_store::retry::RetryPolicy;
use pretty_assertions::assert_eq;
use test_log::test;

const CONFIG: &str = r#"{
    "domains": ["example.com"],
    "subnets": [{"name": "lab", "cidr": "10.0.0.0/24"}],
    "pools": [{
        "scope": "rack1",
        "subnet": "lab",
        "static_low": "10.0.0.90",
        "static_high": "10.0.0.100",
        "dynamic_low": "10.0.0.101",
        "dynamic_high": "10.0.0.105"
    }],
    "hosts": [{
        "hostname": "node01",
        "domain": "example.com",
        "boot_interface": "eth0",
        "interfaces": [
            {"name": "eth0", "mac": "aa:aa:aa:aa:aa:01"},
            {"name": "eth1", "mac": "aa:aa:aa:aa:aa:02"}
        ]
    }]
}"#;

fn ip(s: &str) -> IpAddr {
    s.parse().expect("Should parse address")
}

fn net(s: &str) -> IpNet {
    s.parse().expect("Should parse network")
}

fn mac(s: &str) -> MacAddr {
    s.parse().expect("Should parse MAC")
}

fn scope() -> ScopeName {
    ScopeName::from("rack1")
}

fn leases(pairs: &[(&str, &str)]) -> LeaseSnapshot {
    pairs.iter().map(|(a, m)| (ip(a), mac(m))).collect()
}

#[test]
fn test_allocate_reconcile_resolve() {
    let store = config::load_str(CONFIG).expect("Should load configuration");
    let pool = store
        .snapshot()
        .pools_in_scope(&scope())
        .next()
        .expect("Should find pool")
        .clone();
    let allocator = Allocator::new(store.clone());
    let reconciler = Reconciler::new(store.clone());
    let resolver = Resolver::new(store.clone());

    // Claim a static address on the boot interface.
    let data = store.snapshot();
    let boot = data
        .hosts()
        .next()
        .expect("Should find host")
        .boot_interface
        .expect("Should have boot interface");
    let sticky = RetryPolicy::new()
        .run(|| allocator.claim(boot, &pool, AllocationKind::Sticky, None, Some(ip("10.0.0.98"))))
        .expect("Should claim");
    assert_eq!(sticky.value, Some(ip("10.0.0.98")));

    // A lease for the second interface lands in the dynamic range.
    reconciler
        .reconcile(&scope(), &leases(&[("10.0.0.101", "aa:aa:aa:aa:aa:02")]))
        .expect("Should reconcile");

    // The boot interface's static address wins over the discovered lease.
    let mapping = resolver.resolve_mapping(&MappingScope::Domain(DomainName::from("example.com")));
    assert_eq!(
        mapping,
        BTreeMap::from([(
            Fqdn::new("node01", DomainName::from("example.com")),
            BTreeSet::from([ip("10.0.0.98")]),
        )])
    );

    // The lease disappears; the discovered record keeps its subnet link on
    // the physical interface.
    reconciler
        .reconcile(&scope(), &LeaseSnapshot::default())
        .expect("Should reconcile");
    let data = store.snapshot();
    let discovered = data
        .records()
        .find(|record| record.kind == AllocationKind::Discovered)
        .expect("Should keep the discovered record");
    assert_eq!(discovered.value, None);
    assert_eq!(discovered.subnet, net("10.0.0.0/24"));

    // Deallocating the static address removes it from the mapping.
    allocator.deallocate(sticky.id).expect("Should deallocate");
    let mapping = resolver.resolve_mapping(&MappingScope::Domain(DomainName::from("example.com")));
    assert_eq!(mapping, BTreeMap::new());
}

#[test]
fn test_requested_address_twice_across_handles() {
    let store = config::load_str(CONFIG).expect("Should load configuration");
    let pool = store
        .snapshot()
        .pools_in_scope(&scope())
        .next()
        .expect("Should find pool")
        .clone();
    let allocator = Allocator::new(store);

    allocator
        .allocate(&pool, AllocationKind::Sticky, None, Some(ip("10.0.0.98")))
        .expect("Should allocate the first time");
    assert_eq!(
        allocator.allocate(&pool, AllocationKind::Sticky, None, Some(ip("10.0.0.98"))),
        Err(AllocationError::AddressUnavailable(ip("10.0.0.98")))
    );
}

#[test]
fn test_free_search_fills_pool_in_ascending_order() {
    let store = config::load_str(CONFIG).expect("Should load configuration");
    let pool = store
        .snapshot()
        .pools_in_scope(&scope())
        .next()
        .expect("Should find pool")
        .clone();
    let allocator = Allocator::new(store);

    let mut granted = Vec::new();
    loop {
        match allocator.allocate(&pool, AllocationKind::Auto, None, None) {
            Ok(record) => granted.push(record.value.expect("Should have value")),
            Err(AllocationError::AddressesExhausted { .. }) => break,
            Err(err) => panic!("Unexpected error: {err}"),
        }
    }
    let expected: Vec<IpAddr> = (90..=100).map(|i| ip(&format!("10.0.0.{i}"))).collect();
    assert_eq!(granted, expected, "The dynamic range is never handed out");
}

#[test]
fn test_reserved_addresses_stay_visible_until_claimed() {
    let store = config::load_str(CONFIG).expect("Should load configuration");
    let pool = store
        .snapshot()
        .pools_in_scope(&scope())
        .next()
        .expect("Should find pool")
        .clone();
    let allocator = Allocator::new(store.clone());
    let resolver = Resolver::new(store.clone());
    let domain = DomainName::from("example.com");

    let reserved = allocator
        .allocate(
            &pool,
            AllocationKind::UserReserved,
            Some(Principal::from("admin")),
            Some(ip("10.0.0.99")),
        )
        .expect("Should reserve");

    let mapping = resolver.resolve_mapping(&MappingScope::Domain(domain.clone()));
    assert_eq!(
        mapping.get(&Fqdn::new("10-0-0-99", domain.clone())),
        Some(&BTreeSet::from([ip("10.0.0.99")])),
        "Unattached reservations publish under a synthetic name"
    );

    // Attach the reservation to the host's boot interface; the synthetic
    // entry disappears in favor of the hostname.
    let data = store.snapshot();
    let boot = data
        .hosts()
        .next()
        .expect("Should find host")
        .boot_interface
        .expect("Should have boot interface");
    let mut txn = store.begin();
    netbind::graph::attach(&mut txn, boot, reserved.id);
    txn.commit().expect("Should commit");

    let mapping = resolver.resolve_mapping(&MappingScope::Domain(domain.clone()));
    assert_eq!(
        mapping,
        BTreeMap::from([(
            Fqdn::new("node01", domain),
            BTreeSet::from([ip("10.0.0.99")]),
        )])
    );
}

#[test]
fn test_reconciliation_survives_interleaved_allocation() {
    let store = config::load_str(CONFIG).expect("Should load configuration");
    let pool = store
        .snapshot()
        .pools_in_scope(&scope())
        .next()
        .expect("Should find pool")
        .clone();
    let allocator = Allocator::new(store.clone());
    let reconciler = Reconciler::new(store.clone());

    reconciler
        .reconcile(&scope(), &leases(&[("10.0.0.101", "bb:bb:bb:bb:bb:01")]))
        .expect("Should reconcile");
    allocator
        .allocate(&pool, AllocationKind::Auto, None, None)
        .expect("Should allocate");
    let summary = reconciler
        .reconcile(&scope(), &leases(&[("10.0.0.101", "bb:bb:bb:bb:bb:01")]))
        .expect("Should reconcile");
    assert_eq!(
        summary,
        netbind::ReconcileSummary::default(),
        "Static allocations do not disturb lease state"
    );
}

#[test]
fn test_contended_pool_grants_unique_addresses() {
    let store = config::load_str(CONFIG).expect("Should load configuration");
    let base = store
        .snapshot()
        .pools_in_scope(&scope())
        .next()
        .expect("Should find pool")
        .clone();
    // Narrow the pool to three free slots and race six workers for them.
    let pool = Pool::new(
        scope(),
        base.network,
        ip("10.0.0.90"),
        ip("10.0.0.92"),
        base.dynamic_low,
        base.dynamic_high,
    )
    .expect("Should create pool");
    let allocator = Allocator::new(store);

    let outcomes: Vec<Result<IpAddr, AllocationError>> = std::thread::scope(|threads| {
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let allocator = allocator.clone();
                let pool = pool.clone();
                threads.spawn(move || {
                    RetryPolicy::new()
                        .run(|| allocator.allocate(&pool, AllocationKind::Auto, None, None))
                        .map(|record| record.value.expect("Should have value"))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("Worker should finish"))
            .collect()
    });

    let granted: BTreeSet<IpAddr> = outcomes
        .iter()
        .filter_map(|outcome| outcome.as_ref().ok())
        .copied()
        .collect();
    assert_eq!(
        granted,
        BTreeSet::from([ip("10.0.0.90"), ip("10.0.0.91"), ip("10.0.0.92")]),
        "Every free slot granted exactly once"
    );
    assert_eq!(
        outcomes
            .iter()
            .filter(|outcome| matches!(
                outcome,
                Err(AllocationError::AddressesExhausted { .. })
            ))
            .count(),
        3,
        "The losers see exhaustion"
    );
}
