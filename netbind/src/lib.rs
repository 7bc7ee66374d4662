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

//! # NetBind
//!
//! The address-binding core of a network-provisioning control plane.
//!
//! Three subsystems cooperate over one transactional store:
//!
//! - the [allocator::Allocator] hands out unique static addresses from
//!   administrator-defined pools;
//! - the [reconciler::Reconciler] merges observed DHCP leases into the
//!   address/interface graph;
//! - the [resolver::Resolver] picks the canonical address(es) to publish
//!   under each host's DNS name.
//!
//! Mutating operations run in one transaction each and surface write
//! conflicts as retryable errors; callers wrap them in a
//! [netbind_store::retry::RetryPolicy]. Stores are seeded from a JSON
//! configuration document through [config::load_str] or [config::load_path].

pub mod allocator;
pub mod config;
pub mod graph;
pub mod reconciler;
pub mod resolver;

pub use allocator::{ALLOCATION_LOCK, AllocationError, Allocator};
pub use reconciler::{Lease, LeaseSnapshot, ReconcileSummary, Reconciler};
pub use resolver::{MappingScope, Resolver};
